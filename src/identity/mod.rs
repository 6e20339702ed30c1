//! Content addressing: canonical hashing and identity resolution.
//!
//! Identity flows one way: the hash is computed from the document's content
//! (never from its id), and the id is derived from the hash.

pub mod hasher;
pub mod resolver;

pub use hasher::{HashDigest, HashOptions, canonical_string, content_hash};
pub use resolver::{DocumentId, ID_HASH_PREFIX_LEN, IdentifiedDocument, resolve_id};
