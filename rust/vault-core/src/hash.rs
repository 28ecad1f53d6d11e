use std::fmt;

/// A 128-bit BLAKE3 content hash.
///
/// Vault truncates the full 256-bit BLAKE3 digest to its first 16 bytes. This is
/// an explicit tradeoff: half the collision resistance of full BLAKE3, in
/// exchange for a storage key that fits comfortably in a fixed-width database
/// column and a 32-character hex string. Hex serialization is always lowercase.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Hash `bytes` with BLAKE3, truncated to 128 bits.
    pub fn of(bytes: &[u8]) -> Self {
        let full = blake3::hash(bytes);
        let mut truncated = [0u8; 16];
        truncated.copy_from_slice(&full.as_bytes()[..16]);
        Self(truncated)
    }

    /// View the raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Construct from exactly 16 raw bytes (e.g. read back from storage).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Lowercase 32-character hex encoding.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase 32-character hex string. Rejects wrong length or
    /// non-hex/uppercase input — hex encoding of a `ContentHash` is always
    /// canonical lowercase, so anything else cannot have been produced by
    /// `to_hex`.
    pub fn parse_hex(s: &str) -> Option<Self> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()) {
            return None;
        }
        let decoded = hex::decode(s).ok()?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&decoded);
        Some(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incrementally hashes bytes as they are written through any [`std::io::Write`]
/// sink. Mutating the sink before the current write position invalidates the
/// cached digest; the next call to [`HashingWriter::digest`] recomputes it from
/// the accumulated hasher state rather than re-reading the sink.
pub struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
}

impl<W: std::io::Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
        }
    }

    /// Truncated BLAKE3-128 digest of everything written so far.
    pub fn digest(&self) -> ContentHash {
        let full = self.hasher.finalize();
        let mut truncated = [0u8; 16];
        truncated.copy_from_slice(&full.as_bytes()[..16]);
        ContentHash(truncated)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: std::io::Write> std::io::Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_hash() {
        let a = ContentHash::of(b"hello world");
        let b = ContentHash::of(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn hex_round_trip() {
        let h = ContentHash::of(b"round trip me");
        let hex = h.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(ContentHash::parse_hex(&hex), Some(h));
    }

    #[test]
    fn rejects_uppercase_and_bad_length() {
        let h = ContentHash::of(b"x");
        let upper = h.to_hex().to_uppercase();
        assert_eq!(ContentHash::parse_hex(&upper), None);
        assert_eq!(ContentHash::parse_hex("abcd"), None);
    }

    #[test]
    fn hashing_writer_matches_direct_hash() {
        let mut w = HashingWriter::new(Vec::new());
        std::io::Write::write_all(&mut w, b"chunk one ").unwrap();
        std::io::Write::write_all(&mut w, b"chunk two").unwrap();
        assert_eq!(w.digest(), ContentHash::of(b"chunk one chunk two"));
    }
}
