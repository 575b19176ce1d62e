//! Bounded pool of background write workers.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Upper bound on write worker threads.
pub const MAX_WRITE_THREADS: usize = 8;

/// Shared slot for the store-wide write pool. Bins hold a clone, so a
/// pool replaced via [`crate::cache::CacheStore::set_num_threads`] is
/// observed by every bin.
pub(crate) type SharedPool = Arc<RwLock<Option<Arc<WritePool>>>>;

type WriteTask = Box<dyn FnOnce() + Send + 'static>;

/// Pool of worker threads executing queued cache-write tasks.
///
/// [`submit`](WritePool::submit) enqueues and returns immediately; tasks
/// may run on any worker, so tasks for different keys run concurrently.
/// Two tasks for the same key are ordered only by the per-key gate: the
/// second acquisition happens-after the first release, which need not
/// match submission order when the tasks land on different workers.
///
/// Dropping the last handle to the pool closes the queue; workers finish
/// everything already submitted and are then joined, so the drop doubles
/// as a flush point.
pub struct WritePool {
    sender: Option<Sender<WriteTask>>,
    workers: Vec<JoinHandle<()>>,
}

impl WritePool {
    /// Spawn a pool with `threads` workers, clamped to
    /// `1..=MAX_WRITE_THREADS`.
    pub fn new(threads: usize) -> Self {
        let threads = threads.clamp(1, MAX_WRITE_THREADS);
        let (sender, receiver) = unbounded::<WriteTask>();

        let workers = (0..threads)
            .map(|i| {
                let receiver: Receiver<WriteTask> = receiver.clone();
                thread::Builder::new()
                    .name(format!("tilevault-write-{i}"))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            task();
                        }
                    })
                    .expect("failed to spawn cache write worker")
            })
            .collect();

        debug!(threads, "write pool started");

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Enqueue a task; never blocks.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(task)).is_err() {
                warn!("write pool queue closed; task dropped");
            }
        }
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WritePool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain the remaining queue and
        // exit; join so callers can rely on the drop as a flush point.
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("write worker panicked");
            }
        }
        debug!("write pool stopped");
    }
}
