//! The object encode/decode boundary.
//!
//! The cache never interprets object bytes itself; a codec is injected
//! into the store and invoked under the per-key gate. [`BinaryCodec`] is
//! the default implementation; callers with their own serialization
//! format implement [`ObjectCodec`] and pass it to
//! [`crate::cache::CacheStore::with_codec`].

use crate::cache::path::OBJECT_EXT;
use crate::cache::types::{CacheObject, ObjectKind};
use crate::config::Compressor;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

/// Errors produced by an object codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Too few bytes for the codec header.
    #[error("payload too short for codec header")]
    Truncated,

    /// The magic bytes do not match the expected format.
    #[error("unrecognized codec magic")]
    BadMagic,

    /// The header names an object kind this codec does not know.
    #[error("unknown object kind tag {0}")]
    UnknownKind(u8),

    /// The header names a compressor this codec does not know.
    #[error("unknown compressor tag {0}")]
    UnknownCompressor(u8),

    /// A text object's payload is not valid UTF-8.
    #[error("text payload is not valid UTF-8")]
    InvalidText,

    /// Compression or decompression failed.
    #[error("codec I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialization capability for cached objects, keyed by a format
/// identifier.
pub trait ObjectCodec: Send + Sync {
    /// Identifier of the on-disk format this codec produces.
    fn format(&self) -> &str;

    /// File extension for primary object files, including the dot.
    fn extension(&self) -> &str;

    /// Turn an in-memory object into its durable byte representation.
    fn encode(&self, object: &CacheObject) -> Result<Vec<u8>, CodecError>;

    /// Reconstruct an object from its durable byte representation.
    fn decode(&self, bytes: &[u8]) -> Result<CacheObject, CodecError>;
}

const MAGIC: &[u8; 4] = b"TVB1";
const HEADER_LEN: usize = 6;
const COMP_NONE: u8 = 0;
const COMP_ZLIB: u8 = 1;

/// Default object codec.
///
/// Layout: 4-byte magic, object-kind tag byte, compressor tag byte,
/// payload. The compressor tag makes each file self-describing, so a
/// store reconfigured from `zlib` to `none` still decodes its existing
/// records.
#[derive(Debug, Clone)]
pub struct BinaryCodec {
    compressor: Compressor,
}

impl BinaryCodec {
    pub fn new(compressor: Compressor) -> Self {
        Self { compressor }
    }
}

impl Default for BinaryCodec {
    fn default() -> Self {
        Self::new(Compressor::default())
    }
}

impl ObjectCodec for BinaryCodec {
    fn format(&self) -> &str {
        "tvb"
    }

    fn extension(&self) -> &str {
        OBJECT_EXT
    }

    fn encode(&self, object: &CacheObject) -> Result<Vec<u8>, CodecError> {
        let payload = object.payload();
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(MAGIC);
        out.push(object.kind().tag());

        match self.compressor {
            Compressor::None => {
                out.push(COMP_NONE);
                out.extend_from_slice(payload);
            }
            Compressor::Zlib => {
                out.push(COMP_ZLIB);
                let mut encoder = ZlibEncoder::new(out, Compression::default());
                encoder.write_all(payload)?;
                out = encoder.finish()?;
            }
        }

        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<CacheObject, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated);
        }
        if &bytes[..4] != MAGIC {
            return Err(CodecError::BadMagic);
        }

        let kind = ObjectKind::from_tag(bytes[4]).ok_or(CodecError::UnknownKind(bytes[4]))?;

        let payload = match bytes[5] {
            COMP_NONE => bytes[HEADER_LEN..].to_vec(),
            COMP_ZLIB => {
                let mut payload = Vec::new();
                ZlibDecoder::new(&bytes[HEADER_LEN..]).read_to_end(&mut payload)?;
                payload
            }
            other => return Err(CodecError::UnknownCompressor(other)),
        };

        Ok(match kind {
            ObjectKind::Image => CacheObject::Image(payload),
            ObjectKind::Text => {
                CacheObject::Text(String::from_utf8(payload).map_err(|_| CodecError::InvalidText)?)
            }
            ObjectKind::Node => CacheObject::Node(payload),
            ObjectKind::Generic => CacheObject::Generic(payload),
        })
    }
}
