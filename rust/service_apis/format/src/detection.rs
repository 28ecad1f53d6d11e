//! Detection registry (§4.3): picks the highest-priority factory whose
//! criteria match a candidate buffer and filename. Magic match beats MIME
//! match beats extension match; a catch-all factory at priority 0 is always
//! present; ties are broken by registration order.

use crate::handler::Handler;

#[derive(Debug, Clone, Default)]
pub struct DetectionCriteria {
    pub mime_types: Vec<String>,
    pub extensions: Vec<String>,
    /// `(offset, expected bytes)` pairs; all must match for a magic hit.
    pub magic_bytes: Vec<(usize, Vec<u8>)>,
    pub priority: i32,
}

impl DetectionCriteria {
    pub fn catch_all() -> Self {
        Self {
            priority: 0,
            ..Default::default()
        }
    }

    fn is_catch_all(&self) -> bool {
        self.mime_types.is_empty() && self.extensions.is_empty() && self.magic_bytes.is_empty()
    }

    fn magic_matches(&self, buffer: &[u8]) -> bool {
        !self.magic_bytes.is_empty()
            && self.magic_bytes.iter().all(|(offset, expected)| {
                buffer.len() >= offset + expected.len() && &buffer[*offset..*offset + expected.len()] == expected.as_slice()
            })
    }

    fn extension_matches(&self, filename: &str) -> bool {
        let lower = filename.to_ascii_lowercase();
        self.extensions.iter().any(|ext| lower.ends_with(ext))
    }

    fn mime_matches(&self, mime_hint: Option<&str>) -> bool {
        mime_hint.is_some_and(|mime| self.mime_types.iter().any(|m| m == mime))
    }

    /// 3 = magic, 2 = mime, 1 = extension, 0 = catch-all, `None` = no match.
    fn match_rank(&self, buffer: &[u8], filename: &str, mime_hint: Option<&str>) -> Option<u8> {
        if self.magic_matches(buffer) {
            return Some(3);
        }
        if self.mime_matches(mime_hint) {
            return Some(2);
        }
        if self.extension_matches(filename) {
            return Some(1);
        }
        if self.is_catch_all() {
            return Some(0);
        }
        None
    }
}

pub trait FormatHandlerFactory: Send + Sync {
    fn criteria(&self) -> DetectionCriteria;
    fn create(&self) -> Box<dyn Handler>;
    /// The string persisted on `BlobRefRecord.format_key` / the manifest, and
    /// used by §4.9 reconstruction to look a factory back up by key.
    fn format_key(&self) -> &'static str;
}

#[derive(Default)]
pub struct FormatRegistry {
    factories: Vec<Box<dyn FormatHandlerFactory>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Box<dyn FormatHandlerFactory>) {
        self.factories.push(factory);
    }

    /// Pick the best-matching factory for `buffer`/`filename`, per the
    /// ranking above. Registration order breaks ties in rank and priority.
    pub fn detect(&self, buffer: &[u8], filename: &str, mime_hint: Option<&str>) -> Option<&dyn FormatHandlerFactory> {
        self.factories
            .iter()
            .enumerate()
            .filter_map(|(index, factory)| {
                let criteria = factory.criteria();
                let rank = criteria.match_rank(buffer, filename, mime_hint)?;
                Some((rank, criteria.priority, index, factory.as_ref()))
            })
            .max_by(|a, b| {
                a.0.cmp(&b.0)
                    .then(a.1.cmp(&b.1))
                    .then(b.2.cmp(&a.2))
            })
            .map(|(_, _, _, factory)| factory)
    }

    pub fn by_format_key(&self, format_key: &str) -> Option<&dyn FormatHandlerFactory> {
        self.factories
            .iter()
            .map(|f| f.as_ref())
            .find(|f| f.format_key() == format_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ContainerChild;
    use crate::FormatError;

    struct LeafFactory;
    struct MagicFactory;

    struct LeafHandler;
    impl Handler for LeafHandler {
        fn has_children(&self) -> bool {
            false
        }
        fn extract_children(&self, _buffer: &[u8]) -> Result<Vec<ContainerChild>, FormatError> {
            Ok(vec![])
        }
    }

    impl FormatHandlerFactory for LeafFactory {
        fn criteria(&self) -> DetectionCriteria {
            DetectionCriteria::catch_all()
        }
        fn create(&self) -> Box<dyn Handler> {
            Box::new(LeafHandler)
        }
        fn format_key(&self) -> &'static str {
            "leaf"
        }
    }

    impl FormatHandlerFactory for MagicFactory {
        fn criteria(&self) -> DetectionCriteria {
            DetectionCriteria {
                magic_bytes: vec![(0, vec![0xCA, 0xFE])],
                priority: 10,
                ..Default::default()
            }
        }
        fn create(&self) -> Box<dyn Handler> {
            Box::new(LeafHandler)
        }
        fn format_key(&self) -> &'static str {
            "magic"
        }
    }

    #[test]
    fn magic_match_beats_catch_all() {
        let mut registry = FormatRegistry::new();
        registry.register(Box::new(LeafFactory));
        registry.register(Box::new(MagicFactory));

        let hit = registry.detect(&[0xCA, 0xFE, 0x00], "whatever.bin", None).unwrap();
        assert_eq!(hit.format_key(), "magic");
    }

    #[test]
    fn falls_back_to_catch_all() {
        let mut registry = FormatRegistry::new();
        registry.register(Box::new(LeafFactory));
        registry.register(Box::new(MagicFactory));

        let hit = registry.detect(&[0x00, 0x01], "whatever.bin", None).unwrap();
        assert_eq!(hit.format_key(), "leaf");
    }
}
