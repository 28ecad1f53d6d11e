//! The catch-all leaf handler, always registered at priority 0 (§4.3).
//! Matches anything no other factory claimed; opaque data, no children.

use crate::detection::{DetectionCriteria, FormatHandlerFactory};
use crate::error::FormatError;
use crate::handler::{ContainerChild, Handler};

pub struct RawFactory;

impl FormatHandlerFactory for RawFactory {
    fn criteria(&self) -> DetectionCriteria {
        DetectionCriteria::catch_all()
    }

    fn create(&self) -> Box<dyn Handler> {
        Box::new(RawHandler)
    }

    fn format_key(&self) -> &'static str {
        "raw"
    }
}

pub struct RawHandler;

impl Handler for RawHandler {
    fn has_children(&self) -> bool {
        false
    }

    fn extract_children(&self, _buffer: &[u8]) -> Result<Vec<ContainerChild>, FormatError> {
        Ok(vec![])
    }
}
