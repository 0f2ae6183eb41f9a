//! Geometry block: the fixed 64-byte header written once at volume
//! creation and never rewritten afterward (spec §6 "Geometry block").
//! Grounded on the teacher's `meta.rs` header (magic + fields + CRC-32
//! trailer packed with `byteorder`).

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ErrorKind, IndexError};

const MAGIC: u32 = 0x4745_4f31; // "GEO1"
pub const BLOCK_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBlock {
    pub release_version: u32,
    pub nonce: u64,
    pub uuid: [u8; 16],
    pub bio_offset: u64,
    pub memory_size: u64,
    pub sparse_chapters_per_volume: u64,
}

impl GeometryBlock {
    pub fn encode(&self) -> [u8; BLOCK_LEN] {
        let mut buf = [0u8; BLOCK_LEN];
        LittleEndian::write_u32(&mut buf[0..4], MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.release_version);
        LittleEndian::write_u64(&mut buf[8..16], self.nonce);
        buf[16..32].copy_from_slice(&self.uuid);
        LittleEndian::write_u64(&mut buf[32..40], self.bio_offset);
        LittleEndian::write_u64(&mut buf[40..48], self.memory_size);
        LittleEndian::write_u64(&mut buf[48..56], self.sparse_chapters_per_volume);
        let crc = crc32fast::hash(&buf[0..56]);
        LittleEndian::write_u32(&mut buf[56..60], crc);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < BLOCK_LEN {
            return Err(IndexError::new(ErrorKind::ShortRead, "geometry block truncated"));
        }
        let magic = LittleEndian::read_u32(&bytes[0..4]);
        if magic != MAGIC {
            return Err(IndexError::new(ErrorKind::CorruptComponent, "geometry block magic mismatch"));
        }
        let crc_stored = LittleEndian::read_u32(&bytes[56..60]);
        let crc_actual = crc32fast::hash(&bytes[0..56]);
        if crc_stored != crc_actual {
            return Err(IndexError::new(ErrorKind::CorruptComponent, "geometry block checksum mismatch"));
        }
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&bytes[16..32]);
        Ok(Self {
            release_version: LittleEndian::read_u32(&bytes[4..8]),
            nonce: LittleEndian::read_u64(&bytes[8..16]),
            uuid,
            bio_offset: LittleEndian::read_u64(&bytes[32..40]),
            memory_size: LittleEndian::read_u64(&bytes[40..48]),
            sparse_chapters_per_volume: LittleEndian::read_u64(&bytes[48..56]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let b = GeometryBlock {
            release_version: 3,
            nonce: 12345,
            uuid: [9u8; 16],
            bio_offset: 4096,
            memory_size: 1024,
            sparse_chapters_per_volume: 768,
        };
        let bytes = b.encode();
        let back = GeometryBlock::decode(&bytes).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn rejects_corrupted_crc() {
        let b = GeometryBlock {
            release_version: 1,
            nonce: 0,
            uuid: [0u8; 16],
            bio_offset: 0,
            memory_size: 0,
            sparse_chapters_per_volume: 0,
        };
        let mut bytes = b.encode();
        bytes[10] ^= 0xff;
        assert!(GeometryBlock::decode(&bytes).is_err());
    }
}
