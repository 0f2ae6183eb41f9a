//! Packs a sealed chapter's record locations into the delta-encoded
//! chapter-index pages that precede its record pages on disk (spec §3
//! "Chapter", §4.4 "Chapter writer"). Reuses the same bit-packed
//! delta-list format the volume index uses for its own save-slot
//! snapshots (`volume_index::delta_list`) — both are "sorted keys with a
//! small payload", just with a different payload meaning (record-page
//! index here, virtual chapter there).
//!
//! Each page carries a 4-byte slot-count header before the bit-packed
//! stream so a fixed-size, zero-padded page (padded out to `bytes_per_page`
//! to keep every index page the same size on disk) can be decoded without
//! mistaking trailing padding for zero-gap entries.

use byteorder::{ByteOrder, LittleEndian};

use crate::fingerprint::Fingerprint;
use crate::volume_index::delta_list::{self, DeltaEntry, ENTRY_BITS};

const HEADER_BYTES: usize = 4;
const HEADER_BITS: u64 = HEADER_BYTES as u64 * 8;

/// A cheap, deterministic 64-bit projection of a fingerprint used as the
/// chapter-index's sort key. Collisions are resolved by the caller reading
/// the candidate record page and comparing the full 16-byte fingerprint.
pub fn index_key(fp: &Fingerprint) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&fp.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Split `entries` (fingerprint index-key -> record-page index, already
/// deduplicated per key) across `index_pages_per_chapter` pages of
/// `bytes_per_page` bytes each. Returns one encoded byte buffer per page
/// plus, for each page, the highest key it contains — this crate's
/// rendition of spec §4.4's "index page map... records, for each chapter
/// index page, the highest delta list it contains".
pub fn pack(
    mut entries: Vec<DeltaEntry>,
    index_pages_per_chapter: u32,
    bytes_per_page: u32,
) -> (Vec<Vec<u8>>, Vec<u64>) {
    entries.sort_by_key(|e| e.key);
    let pages = index_pages_per_chapter.max(1) as usize;
    let per_page = (entries.len() + pages - 1) / pages.max(1);
    let per_page = per_page.max(1);

    let mut page_bytes = Vec::with_capacity(pages);
    let mut highest_per_page = Vec::with_capacity(pages);
    let mut start = 0;
    for _ in 0..pages {
        let end = (start + per_page).min(entries.len());
        let chunk = &entries[start..end];
        let mut body = Vec::new();
        let bits = delta_list::encode(&mut body, chunk);
        let slots = bits / ENTRY_BITS;

        let mut buf = vec![0u8; bytes_per_page as usize];
        LittleEndian::write_u32(&mut buf[0..4], slots as u32);
        let copy_len = body.len().min(buf.len() - HEADER_BYTES);
        buf[HEADER_BYTES..HEADER_BYTES + copy_len].copy_from_slice(&body[..copy_len]);

        let highest = chunk.last().map(|e| e.key).unwrap_or(0);
        page_bytes.push(buf);
        highest_per_page.push(highest);
        start = end;
    }
    (page_bytes, highest_per_page)
}

/// Decode one packed chapter-index page produced by [`pack`].
pub fn decode_page(buf: &[u8]) -> Vec<(u64, u32)> {
    if buf.len() < HEADER_BYTES {
        return Vec::new();
    }
    let slots = LittleEndian::read_u32(&buf[0..4]) as usize;
    delta_list::decode_n(buf, HEADER_BITS, slots)
        .into_iter()
        .map(|e| (e.key, e.payload as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(b: u8) -> Fingerprint {
        Fingerprint([b; 16])
    }

    #[test]
    fn pack_then_decode_finds_every_entry() {
        let entries: Vec<DeltaEntry> = (0..20u8)
            .map(|b| DeltaEntry {
                key: index_key(&fp(b)),
                payload: (b % 4) as u64,
            })
            .collect();
        let (pages, highest) = pack(entries.clone(), 3, 4096);
        assert_eq!(pages.len(), 3);
        assert_eq!(highest.len(), 3);

        let mut all = Vec::new();
        for page in &pages {
            all.extend(decode_page(page));
        }
        all.sort();
        let mut expect: Vec<(u64, u32)> = entries.iter().map(|e| (e.key, e.payload as u32)).collect();
        expect.sort();
        assert_eq!(all, expect);
    }

    #[test]
    fn empty_chunk_decodes_to_no_entries() {
        let (pages, _) = pack(Vec::new(), 2, 256);
        for page in &pages {
            assert!(decode_page(page).is_empty());
        }
    }

    #[test]
    fn index_key_is_deterministic() {
        assert_eq!(index_key(&fp(7)), index_key(&fp(7)));
    }
}
