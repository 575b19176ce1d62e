//! Per-key mutual exclusion for record access.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

/// Registry of per-key locks serializing all disk access to a record.
///
/// [`acquire`](FileGate::acquire) blocks the calling thread until no
/// other holder exists for that exact key string; different keys never
/// block each other. The returned guard releases on drop, on every exit
/// path. Slots are reference-counted under the registry lock and
/// reclaimed once the last holder or waiter is gone, so the registry
/// does not grow with the set of keys ever seen.
///
/// No fairness guarantee is made: the next holder among waiters is
/// whichever thread the condition variable wakes first.
#[derive(Debug, Default)]
pub struct FileGate {
    slots: Mutex<HashMap<String, GateEntry>>,
}

#[derive(Debug)]
struct GateEntry {
    slot: Arc<GateSlot>,
    /// Holders plus waiters; maintained under the registry lock.
    refs: usize,
}

#[derive(Debug, Default)]
struct GateSlot {
    locked: Mutex<bool>,
    released: Condvar,
}

impl FileGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free, then take it.
    #[must_use = "the gate is held only while the guard is alive"]
    pub fn acquire(&self, key: &str) -> GateGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            let entry = slots.entry(key.to_string()).or_insert_with(|| GateEntry {
                slot: Arc::new(GateSlot::default()),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.slot)
        };

        let mut locked = slot.locked.lock().unwrap();
        while *locked {
            locked = slot.released.wait(locked).unwrap();
        }
        *locked = true;
        drop(locked);

        GateGuard {
            gate: self,
            key: key.to_string(),
            slot,
        }
    }

    fn release(&self, key: &str, slot: &GateSlot) {
        {
            let mut locked = slot.locked.lock().unwrap();
            *locked = false;
        }
        slot.released.notify_one();

        // Check-and-remove under the registry lock: a new acquirer for
        // the same key either found this entry (refs > 0, not removed)
        // or will create a fresh slot after removal.
        let mut slots = self.slots.lock().unwrap();
        if let Some(entry) = slots.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                slots.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

/// Scoped hold on one key; releases when dropped.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a FileGate,
    key: String,
    slot: Arc<GateSlot>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release(&self.key, &self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_and_release() {
        let gate = FileGate::new();
        {
            let _guard = gate.acquire("key");
            assert_eq!(gate.slot_count(), 1);
        }
        assert_eq!(gate.slot_count(), 0);
    }

    #[test]
    fn test_different_keys_do_not_block() {
        let gate = FileGate::new();
        let _a = gate.acquire("a");
        let _b = gate.acquire("b");
        assert_eq!(gate.slot_count(), 2);
    }

    #[test]
    fn test_same_key_serializes_threads() {
        let gate = Arc::new(FileGate::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard = gate.acquire("shared");
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(gate.slot_count(), 0);
    }

    #[test]
    fn test_slot_reclaimed_after_waiters_finish() {
        let gate = Arc::new(FileGate::new());
        let guard = gate.acquire("key");

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _guard = gate.acquire("key");
            })
        };

        // Give the waiter time to block on the held slot.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(gate.slot_count(), 1);

        drop(guard);
        waiter.join().unwrap();
        assert_eq!(gate.slot_count(), 0);
    }
}
