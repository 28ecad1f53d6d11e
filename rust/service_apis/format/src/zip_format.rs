//! ZIP: a Tier-1 RECONSTRUCTABLE container (§4.3). Each entry's compression
//! method and Unix permissions travel in `format_metadata` so reconstruction
//! can reproduce them exactly.

use std::io::{Cursor, Read, Write};

use chrono::{Datelike, Timelike};

use crate::error::FormatError;
use crate::handler::{
    ContainerCapabilities, ContainerChild, EntryKind, EntryMetadata, Handler, ReconstructChild,
    ReconstructionTier,
};

pub struct ZipFactory;

impl crate::detection::FormatHandlerFactory for ZipFactory {
    fn criteria(&self) -> crate::detection::DetectionCriteria {
        crate::detection::DetectionCriteria {
            extensions: vec![".zip".to_string()],
            magic_bytes: vec![(0, vec![b'P', b'K', 0x03, 0x04])],
            priority: 100,
            ..Default::default()
        }
    }

    fn create(&self) -> Box<dyn Handler> {
        Box::new(ZipHandler)
    }

    fn format_key(&self) -> &'static str {
        "zip"
    }
}

pub struct ZipHandler;

/// `format_metadata` layout: 1 byte compression tag, 4 bytes unix mode
/// (0 if absent), little-endian.
fn encode_format_metadata(compression: zip::CompressionMethod, unix_mode: Option<u32>) -> Vec<u8> {
    let tag: u8 = match compression {
        zip::CompressionMethod::Stored => 0,
        zip::CompressionMethod::Deflated => 1,
        zip::CompressionMethod::Bzip2 => 2,
        zip::CompressionMethod::Zstd => 3,
        _ => 1,
    };
    let mut out = vec![tag];
    out.extend_from_slice(&unix_mode.unwrap_or(0).to_le_bytes());
    out
}

/// ZIP's MS-DOS timestamp only covers 1980-2107; a timestamp outside that
/// range (or no timestamp at all) is dropped rather than clamped.
fn mtime_ms_to_zip_datetime(mtime_ms: i64) -> Option<zip::DateTime> {
    let naive = chrono::DateTime::from_timestamp(mtime_ms / 1000, 0)?.naive_utc();
    zip::DateTime::from_date_and_time(
        naive.year().try_into().ok()?,
        naive.month() as u8,
        naive.day() as u8,
        naive.hour() as u8,
        naive.minute() as u8,
        naive.second() as u8,
    )
    .ok()
}

fn decode_format_metadata(bytes: &[u8]) -> (zip::CompressionMethod, Option<u32>) {
    let tag = bytes.first().copied().unwrap_or(1);
    let compression = match tag {
        0 => zip::CompressionMethod::Stored,
        2 => zip::CompressionMethod::Bzip2,
        3 => zip::CompressionMethod::Zstd,
        _ => zip::CompressionMethod::Deflated,
    };
    let mode = if bytes.len() >= 5 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[1..5]);
        let mode = u32::from_le_bytes(raw);
        if mode == 0 {
            None
        } else {
            Some(mode)
        }
    } else {
        None
    };
    (compression, mode)
}

impl Handler for ZipHandler {
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
        let reader = Cursor::new(buffer);
        let mut archive = zip::ZipArchive::new(reader).map_err(|e| FormatError::Corrupt(e.to_string()))?;
        let mut children = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| FormatError::Corrupt(e.to_string()))?;
            let path = entry.name().to_string();
            let is_dir = entry.is_dir();
            let mtime_ms = entry
                .last_modified()
                .and_then(|t| t.to_time().ok())
                .map(|t| (t.unix_timestamp() as i64) * 1000);
            let unix_mode = entry.unix_mode();

            let mut content = Vec::new();
            if !is_dir {
                entry
                    .read_to_end(&mut content)
                    .map_err(|e| FormatError::Corrupt(e.to_string()))?;
            }

            children.push(ContainerChild {
                path,
                content,
                kind: if is_dir { EntryKind::Directory } else { EntryKind::File },
                metadata: EntryMetadata { mtime_ms, unix_mode },
                format_metadata: encode_format_metadata(entry.compression(), unix_mode),
            });
        }

        Ok(children)
    }

    fn reconstruct(&self, children: &[ReconstructChild]) -> Result<Vec<u8>, FormatError> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            for child in children {
                let (compression, unix_mode) = decode_format_metadata(&child.format_metadata);
                let mut options = zip::write::SimpleFileOptions::default().compression_method(compression);
                if let Some(mode) = unix_mode {
                    options = options.unix_permissions(mode);
                }
                if let Some(mtime_ms) = child.metadata.mtime_ms {
                    if let Some(dt) = mtime_ms_to_zip_datetime(mtime_ms) {
                        options = options.last_modified_time(dt);
                    }
                }

                let name = if child.kind == EntryKind::Directory && !child.path.ends_with('/') {
                    format!("{}/", child.path)
                } else {
                    child.path.clone()
                };

                if child.kind == EntryKind::Directory {
                    writer
                        .add_directory(name, options)
                        .map_err(|e| FormatError::Corrupt(e.to_string()))?;
                } else {
                    writer
                        .start_file(name, options)
                        .map_err(|e| FormatError::Corrupt(e.to_string()))?;
                    writer
                        .write_all(&child.content)
                        .map_err(FormatError::Io)?;
                }
            }
            writer.finish().map_err(|e| FormatError::Corrupt(e.to_string()))?;
        }
        Ok(buffer.into_inner())
    }
}
