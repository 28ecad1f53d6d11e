//! The `Handler` contract (§4.3): one concrete type per format, implementing
//! a narrow capability set rather than a deep class hierarchy.

use crate::error::FormatError;

/// Reconstruction guarantee a container format declares (§4.3, Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstructionTier {
    /// Original bytes derivable from children + manifest.
    Reconstructable,
    /// Original cannot be rebuilt; store the whole container as a leaf and
    /// additionally decompose it for indexing (a "bonus ingest").
    Stored,
    /// Contents are extracted but the envelope is discarded.
    ContentsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerCapabilities {
    pub reconstruction_tier: ReconstructionTierOpt,
    pub preserves_timestamps: bool,
    pub preserves_permissions: bool,
    pub preserves_order: bool,
}

/// `Option<ReconstructionTier>` with a `Default` that reads naturally at a
/// call site (`capabilities().reconstruction_tier`) without an `unwrap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructionTierOpt(pub Option<ReconstructionTier>);

impl Default for ReconstructionTierOpt {
    fn default() -> Self {
        ReconstructionTierOpt(None)
    }
}

impl From<ReconstructionTier> for ReconstructionTierOpt {
    fn from(tier: ReconstructionTier) -> Self {
        ReconstructionTierOpt(Some(tier))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Portable per-entry metadata, independent of the archive format.
#[derive(Debug, Clone, Default)]
pub struct EntryMetadata {
    pub mtime_ms: Option<i64>,
    pub unix_mode: Option<u32>,
}

/// One child discovered while extracting a container, per §4.3's
/// `extractChildren`.
#[derive(Debug, Clone)]
pub struct ContainerChild {
    pub path: String,
    pub content: Vec<u8>,
    pub kind: EntryKind,
    pub metadata: EntryMetadata,
    /// Opaque, format-specific bytes handed back verbatim to
    /// [`Handler::reconstruct`] — compression method, extra fields, whatever
    /// the format needs to reproduce this entry exactly.
    pub format_metadata: Vec<u8>,
}

/// A child handed back to [`Handler::reconstruct`]: either freshly fetched
/// leaf bytes, or the recursively reconstructed bytes of a nested container.
#[derive(Debug, Clone)]
pub struct ReconstructChild {
    pub path: String,
    pub content: Vec<u8>,
    pub kind: EntryKind,
    pub metadata: EntryMetadata,
    pub format_metadata: Vec<u8>,
}

/// One concrete type per format (§4.3, §9 "Polymorphism").
pub trait Handler: Send {
    /// Discriminates leaf vs container.
    fn has_children(&self) -> bool;

    /// Advisory hint to the storage backend; Vault's backends ignore it
    /// today but a future compressing backend would read it.
    fn is_compressible(&self) -> bool {
        true
    }

    /// Only meaningful if [`Handler::has_children`].
    fn capabilities(&self) -> Option<ContainerCapabilities> {
        None
    }

    /// Lazily-produced children, in the order a reconstructing `Handler`
    /// must reproduce.
    fn extract_children(&self, buffer: &[u8]) -> Result<Vec<ContainerChild>, FormatError>;

    /// Required only for [`ReconstructionTier::Reconstructable`] formats.
    /// Must produce bit-identical output from children + their
    /// format-specific metadata.
    fn reconstruct(&self, children: &[ReconstructChild]) -> Result<Vec<u8>, FormatError> {
        let _ = children;
        Err(FormatError::NotReconstructable {
            format_key: "unknown".to_string(),
        })
    }

    /// Advisory; used by observers/indexing, never by the core pipeline.
    fn extract_metadata(&self, _buffer: &[u8]) -> serde_json::Value {
        serde_json::Value::Null
    }
}
