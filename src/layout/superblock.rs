//! Superblock: component id, ABI version, and the A/B save-slot pointers
//! whose sequence numbers decide which slot is current (spec §6
//! "Superblock"). Grounded on the teacher's `meta.rs` header shape,
//! supplemented by `original_source`'s save-slot generation counters.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ErrorKind, IndexError};

const MAGIC: u32 = 0x5342_4b31; // "SBK1"
pub const BLOCK_LEN: usize = 40;

pub const CURRENT_MAJOR: u16 = 8;
pub const CURRENT_MINOR: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub component_id: u32,
    pub major: u16,
    pub minor: u16,
    /// 0 or 1, selecting which of the two slot files is the current one.
    pub active_slot: u8,
    pub slot_a_seq: u64,
    pub slot_b_seq: u64,
}

impl Superblock {
    /// Only the major version gates compatibility; a newer minor on disk
    /// is still readable by an older build, a newer major is not.
    pub fn is_compatible(&self, supported_major: u16) -> bool {
        self.major == supported_major
    }

    pub fn encode(&self) -> [u8; BLOCK_LEN] {
        let mut buf = [0u8; BLOCK_LEN];
        LittleEndian::write_u32(&mut buf[0..4], MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.component_id);
        LittleEndian::write_u16(&mut buf[8..10], self.major);
        LittleEndian::write_u16(&mut buf[10..12], self.minor);
        buf[12] = self.active_slot;
        LittleEndian::write_u64(&mut buf[16..24], self.slot_a_seq);
        LittleEndian::write_u64(&mut buf[24..32], self.slot_b_seq);
        let crc = crc32fast::hash(&buf[0..32]);
        LittleEndian::write_u32(&mut buf[32..36], crc);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < BLOCK_LEN {
            return Err(IndexError::new(ErrorKind::ShortRead, "superblock truncated"));
        }
        let magic = LittleEndian::read_u32(&bytes[0..4]);
        if magic != MAGIC {
            return Err(IndexError::new(ErrorKind::CorruptComponent, "superblock magic mismatch"));
        }
        let crc_stored = LittleEndian::read_u32(&bytes[32..36]);
        let crc_actual = crc32fast::hash(&bytes[0..32]);
        if crc_stored != crc_actual {
            return Err(IndexError::new(ErrorKind::CorruptComponent, "superblock checksum mismatch"));
        }
        let active_slot = bytes[12];
        if active_slot > 1 {
            return Err(IndexError::new(ErrorKind::CorruptComponent, "superblock active_slot out of range"));
        }
        Ok(Self {
            component_id: LittleEndian::read_u32(&bytes[4..8]),
            major: LittleEndian::read_u16(&bytes[8..10]),
            minor: LittleEndian::read_u16(&bytes[10..12]),
            active_slot,
            slot_a_seq: LittleEndian::read_u64(&bytes[16..24]),
            slot_b_seq: LittleEndian::read_u64(&bytes[24..32]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let sb = Superblock {
            component_id: 7,
            major: CURRENT_MAJOR,
            minor: CURRENT_MINOR,
            active_slot: 1,
            slot_a_seq: 3,
            slot_b_seq: 4,
        };
        let bytes = sb.encode();
        let back = Superblock::decode(&bytes).unwrap();
        assert_eq!(back, sb);
    }

    #[test]
    fn major_version_mismatch_is_incompatible() {
        let sb = Superblock {
            component_id: 0,
            major: CURRENT_MAJOR + 1,
            minor: 0,
            active_slot: 0,
            slot_a_seq: 0,
            slot_b_seq: 0,
        };
        assert!(!sb.is_compatible(CURRENT_MAJOR));
    }

    #[test]
    fn rejects_out_of_range_active_slot() {
        let sb = Superblock {
            component_id: 0,
            major: CURRENT_MAJOR,
            minor: CURRENT_MINOR,
            active_slot: 0,
            slot_a_seq: 0,
            slot_b_seq: 0,
        };
        let mut bytes = sb.encode();
        bytes[12] = 5;
        let crc = crc32fast::hash(&bytes[0..32]);
        LittleEndian::write_u32(&mut bytes[32..36], crc);
        assert!(Superblock::decode(&bytes).is_err());
    }
}
