use std::fmt;

use crate::hash::ContentHash;

/// Compound identity of a blob: its content hash, its decompressed size, and
/// whether it is a container (a manifest) or a leaf (opaque data).
///
/// `isContainer` is carried on the value itself rather than inferred — once
/// callers hold a `BlobRef` they know exactly which storage key to read and how
/// to interpret the bytes, without a second lookup.
///
/// Canonical string form is `{hex32}-{size}` for leaves and `{hex32}-{size}_`
/// (trailing underscore) for containers. This is also the literal storage key:
/// see [`BlobRef::storage_key`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlobRef {
    hash: ContentHash,
    leaf_size: u64,
    is_container: bool,
}

/// A `BlobRef` was constructed or parsed with an invalid size.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("blob size must be greater than zero")]
pub struct ZeroSizeBlob;

impl BlobRef {
    /// Construct a new `BlobRef`. Rejects `leaf_size == 0` — size zero is
    /// illegal for any blob, leaf or container.
    pub fn new(hash: ContentHash, leaf_size: u64, is_container: bool) -> Result<Self, ZeroSizeBlob> {
        if leaf_size == 0 {
            return Err(ZeroSizeBlob);
        }
        Ok(Self {
            hash,
            leaf_size,
            is_container,
        })
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn leaf_size(&self) -> u64 {
        self.leaf_size
    }

    pub fn is_container(&self) -> bool {
        self.is_container
    }

    /// The literal key this blob is stored under, in every backend: the
    /// canonical string form. See §6 of the spec for the grammar.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }

    /// Parse the canonical string form. The strict inverse of `Display`: any
    /// string not produced by `to_string` fails to parse.
    pub fn parse(s: &str) -> Option<Self> {
        let (body, is_container) = match s.strip_suffix('_') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let (hex_part, size_part) = body.rsplit_once('-')?;
        let hash = ContentHash::parse_hex(hex_part)?;
        if size_part.is_empty() || !size_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if size_part.len() > 1 && size_part.starts_with('0') {
            return None;
        }
        let leaf_size: u64 = size_part.parse().ok()?;
        BlobRef::new(hash, leaf_size, is_container).ok()
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.leaf_size)?;
        if self.is_container {
            write!(f, "_")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash() -> ContentHash {
        ContentHash::of(b"a fixed sample payload")
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(BlobRef::new(sample_hash(), 0, false).is_err());
    }

    #[test]
    fn leaf_round_trips() {
        let r = BlobRef::new(sample_hash(), 42, false).unwrap();
        let s = r.to_string();
        assert!(!s.ends_with('_'));
        assert_eq!(BlobRef::parse(&s), Some(r));
    }

    #[test]
    fn container_round_trips_with_trailing_underscore() {
        let r = BlobRef::new(sample_hash(), 7, true).unwrap();
        let s = r.to_string();
        assert!(s.ends_with('_'));
        assert_eq!(BlobRef::parse(&s), Some(r));
    }

    #[test]
    fn equality_is_structural_not_by_container_flag_alone() {
        let leaf = BlobRef::new(sample_hash(), 7, false).unwrap();
        let container = BlobRef::new(sample_hash(), 7, true).unwrap();
        assert_ne!(leaf, container);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(BlobRef::parse(""), None);
        assert_eq!(BlobRef::parse("not-a-hash-1"), None);
        assert_eq!(BlobRef::parse(&format!("{}-0", sample_hash())), None);
        assert_eq!(BlobRef::parse(&format!("{}-01", sample_hash())), None);
        assert_eq!(BlobRef::parse(&format!("{}--5", sample_hash())), None);
    }
}
