//! The manifest protocol (§4.8): the structured, self-describing recipe
//! that makes reconstruction possible from object storage alone.

mod codec;
mod error;
mod model;
mod store;

pub use codec::{decode, encode};
pub use error::ManifestError;
pub use model::{Manifest, ManifestEntry, ManifestEntryType};
pub use store::{load, store};
