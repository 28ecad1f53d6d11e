//! TAR: a Tier-1 RECONSTRUCTABLE container. Simpler than ZIP — no
//! compression table to preserve — but mode and mtime still round-trip
//! through `format_metadata` so reconstruction matches the original header.

use std::io::Read;

use crate::error::FormatError;
use crate::handler::{
    ContainerCapabilities, ContainerChild, EntryKind, EntryMetadata, Handler, ReconstructChild,
    ReconstructionTier,
};

pub struct TarFactory;

impl crate::detection::FormatHandlerFactory for TarFactory {
    fn criteria(&self) -> crate::detection::DetectionCriteria {
        crate::detection::DetectionCriteria {
            extensions: vec![".tar".to_string()],
            magic_bytes: vec![(257, b"ustar".to_vec())],
            priority: 100,
            ..Default::default()
        }
    }

    fn create(&self) -> Box<dyn Handler> {
        Box::new(TarHandler)
    }

    fn format_key(&self) -> &'static str {
        "tar"
    }
}

pub struct TarHandler;

fn encode_format_metadata(mode: u32) -> Vec<u8> {
    mode.to_le_bytes().to_vec()
}

fn decode_mode(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    let n = bytes.len().min(4);
    raw[..n].copy_from_slice(&bytes[..n]);
    u32::from_le_bytes(raw)
}

impl Handler for TarHandler {
    fn has_children(&self) -> bool {
        true
    }

    fn capabilities(&self) -> Option<ContainerCapabilities> {
        Some(ContainerCapabilities {
            reconstruction_tier: ReconstructionTier::Reconstructable.into(),
            preserves_timestamps: true,
            preserves_permissions: true,
            preserves_order: true,
        })
    }

    fn extract_children(&self, buffer: &[u8]) -> Result<Vec<ContainerChild>, FormatError> {
        let mut archive = tar::Archive::new(buffer);
        let mut children = Vec::new();

        for entry in archive.entries().map_err(FormatError::Io)? {
            let mut entry = entry.map_err(FormatError::Io)?;
            let header = entry.header();
            let path = entry
                .path()
                .map_err(FormatError::Io)?
                .to_string_lossy()
                .into_owned();
            let mode = header.mode().unwrap_or(0o644);
            let mtime_ms = header.mtime().ok().map(|secs| (secs as i64) * 1000);
            let kind = match header.entry_type() {
                tar::EntryType::Directory => EntryKind::Directory,
                tar::EntryType::Symlink => EntryKind::Symlink,
                _ => EntryKind::File,
            };

            let mut content = Vec::new();
            if kind == EntryKind::File {
                entry.read_to_end(&mut content).map_err(FormatError::Io)?;
            }

            children.push(ContainerChild {
                path,
                content,
                kind,
                metadata: EntryMetadata {
                    mtime_ms,
                    unix_mode: Some(mode),
                },
                format_metadata: encode_format_metadata(mode),
            });
        }

        Ok(children)
    }

    fn reconstruct(&self, children: &[ReconstructChild]) -> Result<Vec<u8>, FormatError> {
        let mut builder = tar::Builder::new(Vec::new());
        for child in children {
            let mode = decode_mode(&child.format_metadata);
            let mut header = tar::Header::new_gnu();
            header.set_mode(mode);
            if let Some(mtime_ms) = child.metadata.mtime_ms {
                header.set_mtime((mtime_ms / 1000).max(0) as u64);
            }
            header.set_size(child.content.len() as u64);
            header.set_entry_type(match child.kind {
                EntryKind::Directory => tar::EntryType::Directory,
                EntryKind::Symlink => tar::EntryType::Symlink,
                EntryKind::File => tar::EntryType::Regular,
            });
            header.set_cksum();
            builder
                .append_data(&mut header, &child.path, child.content.as_slice())
                .map_err(FormatError::Io)?;
        }
        builder.into_inner().map_err(FormatError::Io)
    }
}
