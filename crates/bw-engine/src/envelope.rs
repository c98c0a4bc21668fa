//! Engine Blob Envelope v1
//!
//! The engine's serialized payload is opaque to this system. The envelope is
//! the durable framing wrapped around it whenever a serialized engine is
//! cached or shipped as a bundled asset: magic bytes, a format version, and
//! an XxHash64 checksum of the payload. All values are little-endian.
//!
//! A blob that fails any of these checks is treated as corrupt engine data
//! and never handed to the engine collaborator.

use std::hash::Hasher;

use twox_hash::XxHash64;

use crate::engine::EngineError;

/// Magic bytes: "BWE1"
pub const ENVELOPE_MAGIC: [u8; 4] = [0x42, 0x57, 0x45, 0x31];

/// Current envelope format version
pub const ENVELOPE_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 16;

/// Header field byte offsets.
pub mod header {
    /// u8[4] magic = "BWE1"
    pub const MAGIC: usize = 0;
    /// u16 envelope version
    pub const VERSION: usize = 4;
    /// u16 reserved (zero)
    pub const RESERVED: usize = 6;
    /// u64 XxHash64 of the payload
    pub const CHECKSUM: usize = 8;
}

const CHECKSUM_SEED: u64 = 0;

fn checksum(payload: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(CHECKSUM_SEED);
    hasher.write(payload);
    hasher.finish()
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u64_le(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Wrap a serialized engine payload in the envelope.
pub fn seal(payload: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(HEADER_SIZE + payload.len());
    blob.extend_from_slice(&ENVELOPE_MAGIC);
    blob.extend_from_slice(&ENVELOPE_VERSION.to_le_bytes());
    blob.extend_from_slice(&0u16.to_le_bytes());
    blob.extend_from_slice(&checksum(payload).to_le_bytes());
    blob.extend_from_slice(payload);
    blob
}

/// Validate the envelope and return a view of the engine payload.
pub fn open(blob: &[u8]) -> Result<&[u8], EngineError> {
    if blob.len() < HEADER_SIZE {
        return Err(EngineError::CorruptData);
    }

    if blob[header::MAGIC..header::MAGIC + 4] != ENVELOPE_MAGIC {
        return Err(EngineError::CorruptData);
    }

    let version = read_u16_le(blob, header::VERSION);
    if version != ENVELOPE_VERSION {
        return Err(EngineError::UnsupportedVersion(version));
    }

    let stored = read_u64_le(blob, header::CHECKSUM);
    let payload = &blob[HEADER_SIZE..];
    let computed = checksum(payload);
    if stored != computed {
        return Err(EngineError::CorruptData);
    }

    Ok(payload)
}
