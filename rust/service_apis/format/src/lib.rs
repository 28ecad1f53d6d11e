//! Format detection and the `Handler` contract (§4.3): the registry chooses
//! a factory for an ingested buffer, and the resulting `Handler` drives both
//! extraction (ingest) and, for RECONSTRUCTABLE formats, reconstruction.

mod detection;
mod error;
mod gzip_format;
mod handler;
mod raw_format;
mod tar_format;
mod zip_format;

pub use detection::{DetectionCriteria, FormatHandlerFactory, FormatRegistry};
pub use error::FormatError;
pub use handler::{
    ContainerCapabilities, ContainerChild, EntryKind, EntryMetadata, Handler, ReconstructChild,
    ReconstructionTier, ReconstructionTierOpt,
};
pub use gzip_format::GzipFactory;
pub use raw_format::RawFactory;
pub use tar_format::TarFactory;
pub use zip_format::ZipFactory;

/// The registry shipped by default: ZIP and TAR (RECONSTRUCTABLE), gzip
/// (STORED), and the raw catch-all (leaf, priority 0). Order matters only
/// as a tie-breaker — magic-byte and extension matching already separate
/// these in the common case.
pub fn default_registry() -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    registry.register(Box::new(ZipFactory));
    registry.register(Box::new(TarFactory));
    registry.register(Box::new(GzipFactory));
    registry.register(Box::new(RawFactory));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_resolves_every_format_key() {
        let registry = default_registry();
        for key in ["zip", "tar", "gzip", "raw"] {
            assert!(registry.by_format_key(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn zip_magic_bytes_select_zip_over_raw() {
        let registry = default_registry();
        let zip_magic = [b'P', b'K', 0x03, 0x04, 0, 0];
        let hit = registry.detect(&zip_magic, "archive.bin", None).unwrap();
        assert_eq!(hit.format_key(), "zip");
    }

    #[test]
    fn unrecognized_bytes_fall_back_to_raw() {
        let registry = default_registry();
        let hit = registry.detect(&[1, 2, 3, 4], "data.bin", None).unwrap();
        assert_eq!(hit.format_key(), "raw");
    }
}
