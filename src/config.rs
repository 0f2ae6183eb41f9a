//! Centralized configuration: tunables, a builder, environment-variable
//! loading, and the device-opening parameter-string parser.
//!
//! Grounded on the teacher's `config.rs` (`QuiverConfig`, `from_env()`
//! reading `P1_*` vars, builder methods returning `Self`), generalized to
//! this index's own fields (spec §6) and `DEDUP_*` environment variables.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ErrorKind, IndexError};
use crate::fingerprint::RECORD_BYTES;
use crate::geometry::{Geometry, Remap};
use crate::volume_index::delta_list::ENTRY_BITS;

/// Record-pages-per-chapter presets named in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterSize {
    Small,
    Medium,
    Large,
}

impl ChapterSize {
    pub fn record_pages(self) -> u32 {
        match self {
            ChapterSize::Small => 16,
            ChapterSize::Medium => 64,
            ChapterSize::Large => 256,
        }
    }
}

/// How `Session::open` should treat the on-disk state (spec §6, supplement
/// grounded on `original_source/utils/uds/loadType.c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadType {
    /// Start from nothing; fail if a volume already exists at this path.
    Create,
    /// Require a clean save slot; fail otherwise.
    Load,
    /// Accept rebuild-from-volume-scan if no clean save slot is present.
    Rebuild,
}

/// Top-level configuration, covering every field spec §6 enumerates.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub memory_size: u64,
    pub offset: u64,
    pub record_pages_per_chapter: u32,
    pub chapters_per_volume: u64,
    pub sparse_chapters_per_volume: u64,
    pub bytes_per_page: u32,
    pub cache_chapters: u32,
    pub volume_index_mean_delta: u32,
    pub sparse_sample_rate: u32,
    pub zone_count: u32,
    pub nonce: u64,
    pub remapped_virtual: u64,
    pub remapped_physical: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            memory_size: 0,
            offset: 0,
            record_pages_per_chapter: ChapterSize::Medium.record_pages(),
            chapters_per_volume: 1024,
            sparse_chapters_per_volume: 0,
            bytes_per_page: 4096,
            cache_chapters: 7,
            volume_index_mean_delta: 4096,
            sparse_sample_rate: 32,
            zone_count: 1,
            nonce: 0,
            remapped_virtual: 0,
            remapped_physical: 0,
        }
    }
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder(Configuration::default())
    }

    /// Load overrides from `DEDUP_*` environment variables, starting from
    /// `Default`. Unset variables leave the default in place.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_u64("DEDUP_CHAPTERS_PER_VOLUME") {
            cfg.chapters_per_volume = v;
        }
        if let Some(v) = env_u64("DEDUP_SPARSE_CHAPTERS_PER_VOLUME") {
            cfg.sparse_chapters_per_volume = v;
        }
        if let Some(v) = env_u32("DEDUP_CACHE_CHAPTERS") {
            cfg.cache_chapters = v;
        }
        if let Some(v) = env_u32("DEDUP_VOLUME_INDEX_MEAN_DELTA") {
            cfg.volume_index_mean_delta = v;
        }
        if let Some(v) = env_u32("DEDUP_SPARSE_SAMPLE_RATE") {
            cfg.sparse_sample_rate = v;
        }
        if let Some(v) = env_u32("DEDUP_ZONE_COUNT") {
            cfg.zone_count = v;
        }
        cfg
    }

    /// How many fixed-size [`crate::fingerprint::Record`]s fit in one page,
    /// derived from `bytes_per_page` rather than stored as its own field —
    /// spec.md §6 only enumerates `bytes_per_page`.
    pub fn records_per_page(&self) -> u32 {
        (self.bytes_per_page / RECORD_BYTES).max(1)
    }

    /// How many chapter-index pages a chapter needs to hold one delta-list
    /// entry per record slot, sized the same way `VolumeIndex::new` sizes a
    /// zone's dense/sparse budget: bits needed divided by page capacity.
    pub fn index_pages_per_chapter(&self) -> u32 {
        let slots_per_chapter = self.record_pages_per_chapter as u64 * self.records_per_page() as u64;
        let bits_needed = slots_per_chapter * ENTRY_BITS;
        let bits_per_page = self.bytes_per_page as u64 * 8;
        (((bits_needed + bits_per_page - 1) / bits_per_page.max(1)) as u32).max(1)
    }

    /// Build the immutable [`Geometry`] this configuration describes,
    /// applying the one-shot remap pair when either half is non-zero (spec
    /// §6: "0/0 if unused").
    pub fn to_geometry(&self) -> Result<Geometry, IndexError> {
        let mut geometry = Geometry::new(
            self.records_per_page(),
            self.record_pages_per_chapter,
            self.index_pages_per_chapter(),
            self.chapters_per_volume,
            self.sparse_chapters_per_volume,
            self.bytes_per_page,
        )?;
        if self.remapped_virtual != 0 || self.remapped_physical != 0 {
            geometry.set_remap(Remap {
                remapped_virtual: self.remapped_virtual,
                remapped_physical: self.remapped_physical,
            });
        }
        Ok(geometry)
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.zone_count == 0 || self.zone_count > 16 {
            return Err(IndexError::new(
                ErrorKind::InvalidArgument,
                "zone_count must be in 1..=16",
            ));
        }
        if self.sparse_chapters_per_volume > self.chapters_per_volume {
            return Err(IndexError::new(
                ErrorKind::InvalidArgument,
                "sparse_chapters_per_volume cannot exceed chapters_per_volume",
            ));
        }
        if self.bytes_per_page == 0 || self.bytes_per_page % 4096 != 0 {
            return Err(IndexError::new(
                ErrorKind::InvalidArgument,
                "bytes_per_page must be a positive multiple of 4096",
            ));
        }
        if self.sparse_sample_rate == 0 {
            return Err(IndexError::new(
                ErrorKind::InvalidArgument,
                "sparse_sample_rate must be >= 1",
            ));
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Fluent builder mirroring the teacher's `QuiverConfig` builder methods.
pub struct ConfigurationBuilder(Configuration);

impl ConfigurationBuilder {
    pub fn with_chapter_size(mut self, size: ChapterSize) -> Self {
        self.0.record_pages_per_chapter = size.record_pages();
        self
    }
    pub fn with_chapters_per_volume(mut self, n: u64) -> Self {
        self.0.chapters_per_volume = n;
        self
    }
    pub fn with_sparse_chapters_per_volume(mut self, n: u64) -> Self {
        self.0.sparse_chapters_per_volume = n;
        self
    }
    pub fn with_cache_chapters(mut self, n: u32) -> Self {
        self.0.cache_chapters = n;
        self
    }
    pub fn with_volume_index_mean_delta(mut self, n: u32) -> Self {
        self.0.volume_index_mean_delta = n;
        self
    }
    pub fn with_sparse_sample_rate(mut self, n: u32) -> Self {
        self.0.sparse_sample_rate = n;
        self
    }
    pub fn with_zone_count(mut self, n: u32) -> Self {
        self.0.zone_count = n;
        self
    }
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.0.nonce = nonce;
        self
    }
    pub fn with_memory_size(mut self, bytes: u64) -> Self {
        self.0.memory_size = bytes;
        self
    }
    pub fn with_offset(mut self, bytes: u64) -> Self {
        self.0.offset = bytes;
        self
    }
    pub fn build(self) -> Result<Configuration, IndexError> {
        self.0.validate()?;
        Ok(self.0)
    }
}

/// The handful of keys the device-opening parameter string recognizes
/// (spec §6): `file` is the default/bare key, `size` and `offset` are
/// `uint64`. Unknown keys and duplicate keys both fail with
/// `InvalidArgument`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceParams {
    pub file: Option<PathBuf>,
    pub size: Option<u64>,
    pub offset: Option<u64>,
}

/// Parse a whitespace-separated `key=value` parameter string. A bare token
/// with no `=` is treated as the `file` key's value.
pub fn parse_device_params(s: &str) -> Result<DeviceParams, IndexError> {
    let mut seen: HashMap<&str, ()> = HashMap::new();
    let mut params = DeviceParams::default();

    for token in s.split_whitespace() {
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k, v),
            None => ("file", token),
        };
        if seen.insert(key, ()).is_some() {
            return Err(IndexError::new(
                ErrorKind::InvalidArgument,
                format!("duplicate parameter key '{key}'"),
            ));
        }
        match key {
            "file" => params.file = Some(PathBuf::from(value)),
            "size" => {
                params.size = Some(value.parse::<u64>().map_err(|_| {
                    IndexError::new(
                        ErrorKind::InvalidArgument,
                        format!("'size' must be a uint64, got '{value}'"),
                    )
                })?)
            }
            "offset" => {
                params.offset = Some(value.parse::<u64>().map_err(|_| {
                    IndexError::new(
                        ErrorKind::InvalidArgument,
                        format!("'offset' must be a uint64, got '{value}'"),
                    )
                })?)
            }
            other => {
                return Err(IndexError::new(
                    ErrorKind::InvalidArgument,
                    format!("unrecognized parameter key '{other}'"),
                ))
            }
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_roundtrips_fields() {
        let cfg = Configuration::builder()
            .with_zone_count(4)
            .with_chapters_per_volume(1024)
            .with_sparse_chapters_per_volume(768)
            .build()
            .unwrap();
        assert_eq!(cfg.zone_count, 4);
        assert_eq!(cfg.sparse_chapters_per_volume, 768);
    }

    #[test]
    fn validate_rejects_zone_count_out_of_range() {
        let cfg = Configuration {
            zone_count: 0,
            ..Configuration::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = Configuration {
            zone_count: 17,
            ..Configuration::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_bare_file_token() {
        let p = parse_device_params("/var/lib/index.bin").unwrap();
        assert_eq!(p.file, Some(PathBuf::from("/var/lib/index.bin")));
    }

    #[test]
    fn parse_key_value_tokens() {
        let p = parse_device_params("file=/dev/sdb size=1048576 offset=4096").unwrap();
        assert_eq!(p.file, Some(PathBuf::from("/dev/sdb")));
        assert_eq!(p.size, Some(1048576));
        assert_eq!(p.offset, Some(4096));
    }

    #[test]
    fn parse_rejects_unknown_key() {
        assert!(parse_device_params("bogus=1").is_err());
    }

    #[test]
    fn parse_rejects_duplicate_key() {
        assert!(parse_device_params("size=1 size=2").is_err());
    }

    #[test]
    fn parse_rejects_non_numeric_size() {
        assert!(parse_device_params("size=abc").is_err());
    }
}
