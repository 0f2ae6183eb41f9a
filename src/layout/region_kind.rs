//! Region kind discriminants, distinguishing the logical sub-regions a
//! save slot (or the volume file) can hold, independent of where that
//! region happens to live on disk (`original_source/utils/uds/
//! regionIdentifiers.h`).
//!
//! The geometry block and superblock already carry their own magic
//! numbers (`"GEO1"`, `"SBK1"`) as an implicit kind tag; this enum gives
//! the same treatment to the variable-length save-slot body, whose
//! sections are otherwise only distinguishable by JSON field name.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    Config,
    Index,
    Volume,
    Save,
    IndexPageMap,
    VolumeIndex,
    OpenChapter,
}
