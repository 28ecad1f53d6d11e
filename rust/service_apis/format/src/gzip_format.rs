//! Gzip: a Tier-2 STORED container. Gzip's own header carries an OS byte,
//! an optional mtime, and encoder-specific flags that vary across zlib
//! versions — re-compressing identical bytes is not guaranteed to reproduce
//! the original stream, so the envelope is stored whole and only its single
//! member is decomposed for the bonus index (§4.3, §4.6 point 3).

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::FormatError;
use crate::handler::{
    ContainerCapabilities, ContainerChild, EntryKind, EntryMetadata, Handler, ReconstructChild,
    ReconstructionTier,
};

pub struct GzipFactory;

impl crate::detection::FormatHandlerFactory for GzipFactory {
    fn criteria(&self) -> crate::detection::DetectionCriteria {
        crate::detection::DetectionCriteria {
            extensions: vec![".gz".to_string()],
            magic_bytes: vec![(0, vec![0x1f, 0x8b])],
            priority: 100,
            ..Default::default()
        }
    }

    fn create(&self) -> Box<dyn Handler> {
        Box::new(GzipHandler)
    }

    fn format_key(&self) -> &'static str {
        "gzip"
    }
}

pub struct GzipHandler;

impl Handler for GzipHandler {
    fn has_children(&self) -> bool {
        true
    }

    fn capabilities(&self) -> Option<ContainerCapabilities> {
        Some(ContainerCapabilities {
            reconstruction_tier: ReconstructionTier::Stored.into(),
            preserves_timestamps: false,
            preserves_permissions: false,
            preserves_order: true,
        })
    }

    fn extract_children(&self, buffer: &[u8]) -> Result<Vec<ContainerChild>, FormatError> {
        let mut decoder = GzDecoder::new(buffer);
        let inner_name = decoder
            .header()
            .and_then(|h| h.filename())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_else(|| "decompressed".to_string());
        let mtime_ms = decoder
            .header()
            .map(|h| h.mtime())
            .filter(|&mtime| mtime != 0)
            .map(|mtime| (mtime as i64) * 1000);

        let mut content = Vec::new();
        decoder
            .read_to_end(&mut content)
            .map_err(|e| FormatError::Corrupt(e.to_string()))?;

        Ok(vec![ContainerChild {
            path: inner_name,
            content,
            kind: EntryKind::File,
            metadata: EntryMetadata { mtime_ms, unix_mode: None },
            format_metadata: Vec::new(),
        }])
    }

    fn reconstruct(&self, _children: &[ReconstructChild]) -> Result<Vec<u8>, FormatError> {
        Err(FormatError::NotReconstructable {
            format_key: "gzip".to_string(),
        })
    }
}
