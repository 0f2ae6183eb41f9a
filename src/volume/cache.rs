//! Fixed-capacity LRU page cache keyed by `(physical_chapter, page_index)`
//! (spec §4.2). O(1) intrusive LRU via `HashMap` + prev/next-by-key
//! pointers, the same shape as the teacher's `pager/cache.rs`, generalized
//! from raw page bytes to a key carrying a [`PageKind`] so eviction can
//! honor the probe hint.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub physical_chapter: u64,
    pub page_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Index,
    Record,
}

/// Tie-breaker for LRU eviction when the cache is full (spec §4.2):
/// `IndexFirst` prefers evicting record pages over index pages and vice
/// versa for `RecordFirst`, falling back to true LRU order within the
/// preferred kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeHint {
    IndexFirst,
    RecordFirst,
}

struct Entry {
    data: Vec<u8>,
    kind: PageKind,
    prev: Option<PageKey>,
    next: Option<PageKey>,
}

pub struct PageCache {
    cap: usize,
    map: HashMap<PageKey, Entry>,
    head: Option<PageKey>,
    tail: Option<PageKey>,
}

impl PageCache {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            map: HashMap::with_capacity(cap.max(1)),
            head: None,
            tail: None,
        }
    }

    pub fn get(&mut self, key: PageKey) -> Option<Vec<u8>> {
        if !self.map.contains_key(&key) {
            return None;
        }
        self.detach(key);
        self.attach_front(key);
        self.map.get(&key).map(|e| e.data.clone())
    }

    pub fn contains(&self, key: PageKey) -> bool {
        self.map.contains_key(&key)
    }

    pub fn put(&mut self, key: PageKey, kind: PageKind, data: Vec<u8>, hint: ProbeHint) {
        if self.cap == 0 {
            return;
        }
        if self.map.contains_key(&key) {
            if let Some(e) = self.map.get_mut(&key) {
                e.data = data;
                e.kind = kind;
            }
            self.detach(key);
            self.attach_front(key);
            return;
        }
        if self.map.len() >= self.cap {
            self.evict_one(hint);
        }
        self.map.insert(
            key,
            Entry {
                data,
                kind,
                prev: None,
                next: None,
            },
        );
        self.attach_front(key);
    }

    /// Drop every cached page belonging to `physical_chapter` (spec §4.2
    /// `forget_chapter`, called after a chapter leaves the window).
    pub fn forget_chapter(&mut self, physical_chapter: u64) {
        let victims: Vec<PageKey> = self
            .map
            .keys()
            .copied()
            .filter(|k| k.physical_chapter == physical_chapter)
            .collect();
        for k in victims {
            self.detach(k);
            self.map.remove(&k);
        }
    }

    fn evict_one(&mut self, hint: ProbeHint) {
        let preferred_kind = match hint {
            ProbeHint::IndexFirst => PageKind::Record,
            ProbeHint::RecordFirst => PageKind::Index,
        };
        // Walk from the LRU end looking for the preferred kind first;
        // fall back to the strict LRU tail if none of that kind exists.
        let mut cursor = self.tail;
        let mut fallback = None;
        while let Some(k) = cursor {
            let entry = match self.map.get(&k) {
                Some(e) => e,
                None => break,
            };
            if fallback.is_none() {
                fallback = Some(k);
            }
            if entry.kind == preferred_kind {
                self.detach(k);
                self.map.remove(&k);
                return;
            }
            cursor = entry.prev;
        }
        if let Some(k) = fallback {
            self.detach(k);
            self.map.remove(&k);
        }
    }

    fn detach(&mut self, key: PageKey) {
        let (prev, next) = match self.map.get(&key) {
            Some(e) => (e.prev, e.next),
            None => return,
        };
        if self.head == Some(key) {
            self.head = next;
        }
        if self.tail == Some(key) {
            self.tail = prev;
        }
        if let Some(p) = prev {
            if let Some(pe) = self.map.get_mut(&p) {
                pe.next = next;
            }
        }
        if let Some(n) = next {
            if let Some(ne) = self.map.get_mut(&n) {
                ne.prev = prev;
            }
        }
        if let Some(e) = self.map.get_mut(&key) {
            e.prev = None;
            e.next = None;
        }
    }

    fn attach_front(&mut self, key: PageKey) {
        if self.head == Some(key) {
            return;
        }
        if let Some(e) = self.map.get_mut(&key) {
            e.prev = None;
            e.next = self.head;
        }
        if let Some(old_head) = self.head {
            if let Some(he) = self.map.get_mut(&old_head) {
                he.prev = Some(key);
            }
        }
        self.head = Some(key);
        if self.tail.is_none() {
            self.tail = Some(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(chapter: u64, page: u32) -> PageKey {
        PageKey {
            physical_chapter: chapter,
            page_index: page,
        }
    }

    #[test]
    fn put_then_get_hits() {
        let mut c = PageCache::new(2);
        c.put(key(0, 0), PageKind::Record, vec![1, 2, 3], ProbeHint::IndexFirst);
        assert_eq!(c.get(key(0, 0)), Some(vec![1, 2, 3]));
    }

    #[test]
    fn eviction_prefers_record_pages_under_index_first_hint() {
        let mut c = PageCache::new(2);
        c.put(key(0, 0), PageKind::Index, vec![0], ProbeHint::IndexFirst);
        c.put(key(0, 1), PageKind::Record, vec![1], ProbeHint::IndexFirst);
        // Cache full; inserting a third page should evict the record page,
        // not the index page, under IndexFirst.
        c.put(key(0, 2), PageKind::Record, vec![2], ProbeHint::IndexFirst);
        assert!(c.contains(key(0, 0)));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn forget_chapter_drops_only_its_pages() {
        let mut c = PageCache::new(4);
        c.put(key(0, 0), PageKind::Index, vec![0], ProbeHint::IndexFirst);
        c.put(key(1, 0), PageKind::Index, vec![1], ProbeHint::IndexFirst);
        c.forget_chapter(0);
        assert!(!c.contains(key(0, 0)));
        assert!(c.contains(key(1, 0)));
    }
}
