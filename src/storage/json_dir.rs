//! One pretty-printed JSON file per document, named after its id.

use std::path::{Path, PathBuf};

use crate::core::{CanonicalDocument, SCHEMA_VERSION};
use crate::identity::{DocumentId, IdentifiedDocument};
use crate::{ExportError, ExportResult};

const EXTENSION: &str = "json";

/// Writer/reader for a directory of `{document_id}.json` files.
///
/// Writing the same document twice overwrites the file; since the name is
/// content derived, the directory holds one file per distinct content.
#[derive(Debug, Clone)]
pub struct JsonDirWriter {
    dir: PathBuf,
}

impl JsonDirWriter {
    /// The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        JsonDirWriter {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.dir.join(format!("{id}.{EXTENSION}"))
    }

    /// Write the full document, time series included.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The document's schema_version doesn't match SCHEMA_VERSION
    /// - The directory cannot be created or the file written
    pub fn write(&self, document: &IdentifiedDocument) -> ExportResult<PathBuf> {
        let version = &document.document().metadata.schema_version;
        if version != SCHEMA_VERSION {
            return Err(ExportError::Message(format!(
                "schema version mismatch: document has v{version}, expected v{SCHEMA_VERSION}"
            )));
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(document.id());
        let json = serde_json::to_string_pretty(document.document())?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn read(&self, id: &DocumentId) -> ExportResult<CanonicalDocument> {
        let path = self.path_for(id);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| ExportError::Message(format!("failed to read {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Ids of every stored document, sorted. An absent directory holds none.
    pub fn list_ids(&self) -> ExportResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
