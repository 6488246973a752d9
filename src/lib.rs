pub mod error;
pub mod whitelist;
pub mod manifest;
pub mod archive;
pub mod codec;
pub mod differ;
pub mod session;

pub use error::{ArchiveError, Result};
pub use archive::{Archive, ContentEntry, Identity};
pub use manifest::{AddonType, MetadataField, Tag, TagsTruncated};
pub use codec::{decode, encode};
pub use differ::{StreamDiffer, BackingStore};
pub use session::{Session, SessionOptions};
