//! Document identity derived from the content hash.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ExportResult;
use crate::core::CanonicalDocument;

use super::hasher::{HashDigest, HashOptions, content_hash};

/// Hex characters of the digest kept in the identifier.
pub const ID_HASH_PREFIX_LEN: usize = 16;

/// External identifier of a document: `{test_name}_{hash prefix}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the identifier for `test_name` content hashed to `digest`.
pub fn resolve_id(test_name: &str, digest: &HashDigest) -> DocumentId {
    DocumentId(format!("{}_{}", test_name, digest.prefix(ID_HASH_PREFIX_LEN)))
}

/// A document whose identity has been resolved.
///
/// Holds the document read-only; the id written into its metadata is the one
/// derived from its own content.
#[derive(Debug, Clone)]
pub struct IdentifiedDocument {
    id: DocumentId,
    digest: HashDigest,
    document: CanonicalDocument,
}

impl IdentifiedDocument {
    /// Hash `document`, derive its id and record the id in its metadata.
    pub fn resolve(mut document: CanonicalDocument, options: HashOptions) -> ExportResult<Self> {
        let digest = content_hash(&document, options)?;
        let id = resolve_id(&document.test.name, &digest);
        document.metadata.document_id = id.as_str().to_string();
        Ok(IdentifiedDocument {
            id,
            digest,
            document,
        })
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn digest(&self) -> &HashDigest {
        &self.digest
    }

    pub fn document(&self) -> &CanonicalDocument {
        &self.document
    }

    pub fn test_name(&self) -> &str {
        &self.document.test.name
    }
}
