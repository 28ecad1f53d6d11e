//! Encode/decode a [`Manifest`] to the bytes stored at the container's
//! BlobRef key. One version byte precedes the `postcard` payload so a
//! future format change can be detected before parsing.

use crate::error::ManifestError;
use crate::model::Manifest;

const CURRENT_VERSION: u8 = 1;

pub fn encode(manifest: &Manifest) -> Result<Vec<u8>, ManifestError> {
    let mut out = vec![CURRENT_VERSION];
    out.extend(postcard::to_allocvec(manifest)?);
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<Manifest, ManifestError> {
    let (version, body) = bytes.split_first().ok_or(ManifestError::Empty)?;
    if *version != CURRENT_VERSION {
        return Err(ManifestError::UnsupportedVersion(*version));
    }
    Ok(postcard::from_bytes(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ManifestEntry, ManifestEntryType};
    use vault_core::{BlobRef, ContentHash};

    fn sample_manifest() -> Manifest {
        let container_ref = BlobRef::new(ContentHash::of(b"container"), 99, true).unwrap();
        Manifest::build(
            container_ref,
            "zip",
            None,
            vec![ManifestEntry {
                path: "hello.txt".to_string(),
                hash: *ContentHash::of(b"hello").as_bytes(),
                leaf_size: 5,
                is_container: false,
                entry_type: ManifestEntryType::File,
                mtime_ms: Some(0),
                format_metadata: vec![1, 2, 3],
            }],
        )
    }

    #[test]
    fn round_trips_through_bytes() {
        let manifest = sample_manifest();
        let bytes = encode(&manifest).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = encode(&sample_manifest()).unwrap();
        bytes[0] = 77;
        assert!(matches!(decode(&bytes), Err(ManifestError::UnsupportedVersion(77))));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(decode(&[]), Err(ManifestError::Empty)));
    }
}
