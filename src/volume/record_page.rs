//! Packs/unpacks the first record page of a chapter: a magic marker and
//! the chapter's virtual chapter number, followed by a little-endian
//! record count and up to `records_per_page` 32-byte records (spec §3
//! "Record", §4.4, §4.6 "scan every physical chapter's first record page
//! to find the min/max VCN written"). Plain byte packing (records are
//! already byte-aligned), in the teacher's `byteorder` idiom
//! (`page_rh/header.rs`).

use byteorder::{ByteOrder, LittleEndian};

use crate::fingerprint::Record;

const MAGIC: u32 = 0x4348_5052; // "CHPR"
const HEADER_LEN: usize = 4 + 8 + 4; // magic + vcn + count

/// Encode a record page. `vcn` is only meaningful (and only written) for
/// the chapter's first record page; subsequent pages still carry it so a
/// partial chapter write can be identified, but rebuild only consults
/// page 0.
pub fn encode(vcn: u64, records: &[Record], records_per_page: u32, bytes_per_page: u32) -> Vec<u8> {
    debug_assert!(records.len() <= records_per_page as usize);
    let mut buf = vec![0u8; bytes_per_page as usize];
    LittleEndian::write_u32(&mut buf[0..4], MAGIC);
    LittleEndian::write_u64(&mut buf[4..12], vcn);
    LittleEndian::write_u32(&mut buf[12..16], records.len() as u32);
    let mut off = HEADER_LEN;
    for r in records {
        buf[off..off + 32].copy_from_slice(&r.to_bytes());
        off += 32;
    }
    buf
}

/// Read just the header, useful for the boundary scan in
/// `find_volume_chapter_boundaries`/rebuild without decoding every record.
pub fn read_header(buf: &[u8]) -> Option<u64> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    if LittleEndian::read_u32(&buf[0..4]) != MAGIC {
        return None;
    }
    Some(LittleEndian::read_u64(&buf[4..12]))
}

pub fn decode(buf: &[u8]) -> Vec<Record> {
    if buf.len() < HEADER_LEN || LittleEndian::read_u32(&buf[0..4]) != MAGIC {
        return Vec::new();
    }
    let count = LittleEndian::read_u32(&buf[12..16]) as usize;
    let mut out = Vec::with_capacity(count);
    let mut off = HEADER_LEN;
    for _ in 0..count {
        if off + 32 > buf.len() {
            break;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&buf[off..off + 32]);
        out.push(Record::from_bytes(&bytes));
        off += 32;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Fingerprint, Metadata};

    #[test]
    fn round_trips_records_and_vcn() {
        let records = vec![
            Record::new(Fingerprint([1; 16]), Metadata([2; 16])),
            Record::new(Fingerprint([3; 16]), Metadata([4; 16])),
        ];
        let buf = encode(42, &records, 256, 4096);
        assert_eq!(decode(&buf), records);
        assert_eq!(read_header(&buf), Some(42));
    }

    #[test]
    fn unwritten_page_has_no_header() {
        let buf = vec![0u8; 4096];
        assert_eq!(read_header(&buf), None);
        assert_eq!(decode(&buf), Vec::new());
    }

    #[test]
    fn empty_page_decodes_empty() {
        let buf = encode(0, &[], 256, 4096);
        assert_eq!(decode(&buf), Vec::new());
    }
}
