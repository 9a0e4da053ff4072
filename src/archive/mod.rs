//! Package archive reading and sandbox extraction.
//!
//! Archives are zip containers. Opening one checks every resource ceiling
//! and entry name, then parses `manifest.json` and `signature.sig`, all
//! without touching the filesystem beyond reading the archive itself.

mod zip;

use crate::config::EngineConfig;

pub use self::zip::PackageArchive;

/// Resource ceilings applied while opening and extracting an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Largest archive file accepted, checked before decompression.
    pub max_archive_size: u64,
    /// Largest sum of declared uncompressed entry sizes.
    pub max_uncompressed_size: u64,
    pub max_entry_count: usize,
}

impl From<&EngineConfig> for ArchiveLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_archive_size: config.max_archive_size,
            max_uncompressed_size: config.max_uncompressed_size,
            max_entry_count: config.max_entry_count,
        }
    }
}
