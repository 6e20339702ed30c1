//! Format adapters: turn one tool's raw result archive into a
//! [`CanonicalDocument`].
//!
//! A result directory holds one archive per benchmark, named
//! `results_<tag>.zip` or already extracted as `results_<tag>/`. The tag
//! selects the adapter from a static table; unknown tags are skipped.

pub mod pyperf;

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

use crate::core::CanonicalDocument;
use crate::{ExportError, ExportResult};

pub use pyperf::PyPerfAdapter;

/// Filename prefix shared by every result archive.
pub const ARCHIVE_PREFIX: &str = "results_";

const ZIP_SUFFIX: &str = ".zip";

/// Parser for one benchmark tool's output.
pub trait FormatAdapter: Send + Sync {
    /// Test name written into `test.name`; also the identity prefix.
    fn test_name(&self) -> &str;

    /// Parse `archive` found in `result_dir`.
    ///
    /// Every call builds a fresh document, so `processing_timestamp` differs
    /// between calls while all content fields stay equal.
    fn parse(&self, result_dir: &Path, archive: &ResultArchive) -> ExportResult<CanonicalDocument>;
}

pub type AdapterFactory = fn() -> Box<dyn FormatAdapter>;

/// A tag → adapter table.
pub type AdapterRegistry = [(&'static str, AdapterFactory)];

fn pyperf_adapter() -> Box<dyn FormatAdapter> {
    Box::new(PyPerfAdapter)
}

/// Adapters shipped with the crate.
pub static BUILTIN_ADAPTERS: &AdapterRegistry = &[("pyperf", pyperf_adapter)];

/// Find the adapter registered for `tag`. Unknown tags yield `None`.
pub fn lookup(registry: &AdapterRegistry, tag: &str) -> Option<Box<dyn FormatAdapter>> {
    registry
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, factory)| factory())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Directory,
}

/// One `results_<tag>` entry of a result directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultArchive {
    pub tag: String,
    pub path: PathBuf,
    pub kind: ArchiveKind,
}

impl ResultArchive {
    /// File or directory name, for reporting.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Make the archive contents readable.
    ///
    /// A directory archive is read in place, and so is a zip whose extracted
    /// `results_<tag>/` sibling exists. Any other zip is unpacked into a
    /// scratch directory that lives as long as the returned value.
    pub fn open(&self, result_dir: &Path) -> ExportResult<ArchiveContents> {
        let mut contents = ArchiveContents {
            dirs: Vec::with_capacity(3),
            extracted_from: None,
            _scratch: None,
        };
        match self.kind {
            ArchiveKind::Directory => contents.dirs.push(self.path.clone()),
            ArchiveKind::Zip => {
                let extracted = result_dir.join(format!("{ARCHIVE_PREFIX}{}", self.tag));
                if extracted.is_dir() {
                    contents.dirs.push(extracted);
                } else {
                    let scratch = extract_zip(&self.path)?;
                    contents.dirs.push(scratch.path().to_path_buf());
                    // archives usually wrap everything in one top-level folder
                    let mut nested: Vec<PathBuf> = std::fs::read_dir(scratch.path())?
                        .filter_map(|e| e.ok().map(|e| e.path()))
                        .filter(|p| p.is_dir())
                        .collect();
                    nested.sort();
                    contents.dirs.extend(nested);
                    contents.extracted_from = Some(self.path.clone());
                    contents._scratch = Some(scratch);
                }
            }
        }
        contents.dirs.push(result_dir.to_path_buf());
        Ok(contents)
    }
}

/// Readable view of one archive.
#[derive(Debug)]
pub struct ArchiveContents {
    dirs: Vec<PathBuf>,
    extracted_from: Option<PathBuf>,
    _scratch: Option<TempDir>,
}

impl ArchiveContents {
    /// Directories to search for output files, most specific first.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// File whose modification time dates `found`.
    ///
    /// Files unpacked from a zip carry the unpack time, so the zip itself
    /// stands in for them.
    pub fn dated_by<'a>(&'a self, found: &'a Path) -> &'a Path {
        self.extracted_from.as_deref().unwrap_or(found)
    }
}

fn extract_zip(path: &Path) -> ExportResult<TempDir> {
    let bad_zip = |e: zip::result::ZipError| ExportError::Format(format!("{}: {e}", path.display()));
    let scratch = tempfile::Builder::new().prefix("result-export-").tempdir()?;
    let mut archive = ZipArchive::new(File::open(path)?).map_err(bad_zip)?;
    archive.extract(scratch.path()).map_err(bad_zip)?;
    debug!("Unpacked {} into {}", path.display(), scratch.path().display());
    Ok(scratch)
}

/// Parse `results_<tag>.zip` or a `results_<tag>` directory into an archive.
pub fn detect_test_type(path: &Path) -> Option<ResultArchive> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(ARCHIVE_PREFIX)?;
    let (tag, kind) = if path.is_dir() {
        (rest, ArchiveKind::Directory)
    } else {
        (rest.strip_suffix(ZIP_SUFFIX)?, ArchiveKind::Zip)
    };
    if tag.is_empty() {
        return None;
    }
    Some(ResultArchive {
        tag: tag.to_string(),
        path: path.to_path_buf(),
        kind,
    })
}

/// List the archives directly inside `result_dir`, sorted by tag.
///
/// When both `results_<tag>.zip` and its extracted directory exist, only the
/// directory is returned.
pub fn list_archives(result_dir: &Path) -> ExportResult<Vec<ResultArchive>> {
    let mut archives: Vec<ResultArchive> = Vec::new();
    for entry in std::fs::read_dir(result_dir)? {
        let Some(archive) = detect_test_type(&entry?.path()) else {
            continue;
        };
        match archives.iter_mut().find(|a| a.tag == archive.tag) {
            Some(existing) if archive.kind == ArchiveKind::Directory => *existing = archive,
            Some(_) => {}
            None => archives.push(archive),
        }
    }
    archives.sort_by(|a, b| a.tag.cmp(&b.tag));
    Ok(archives)
}

/// Environment tags read from the `<scenario>/<os>/<cloud>/<instance>_<n>`
/// layout of result directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentTags {
    pub scenario_name: Option<String>,
    pub os_vendor: Option<String>,
    pub cloud_provider: Option<String>,
    pub instance_type: Option<String>,
}

impl EnvironmentTags {
    /// Tags from the last four components of the resolved path of
    /// `result_dir`.
    ///
    /// All tags are empty unless the directory exists, its resolved path has
    /// at least four named components, and the last one ends in `_<digits>`.
    pub fn from_result_dir(result_dir: &Path) -> Self {
        let Ok(resolved) = std::fs::canonicalize(result_dir) else {
            return EnvironmentTags::default();
        };
        let names: Vec<&str> = resolved
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .collect();
        let [.., scenario, os, cloud, last] = names.as_slice() else {
            return EnvironmentTags::default();
        };
        let Some(instance) = strip_instance_suffix(last) else {
            return EnvironmentTags::default();
        };
        EnvironmentTags {
            scenario_name: Some(scenario.to_string()),
            os_vendor: Some(os.to_string()),
            cloud_provider: Some(cloud.to_string()),
            instance_type: Some(instance),
        }
    }

    pub fn apply(&self, doc: &mut CanonicalDocument) {
        let meta = &mut doc.metadata;
        meta.scenario_name = self.scenario_name.clone();
        meta.os_vendor = self.os_vendor.clone();
        meta.cloud_provider = self.cloud_provider.clone();
        meta.instance_type = self.instance_type.clone();
    }
}

fn strip_instance_suffix(dir: &str) -> Option<String> {
    let (name, n) = dir.rsplit_once('_')?;
    if name.is_empty() || n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(name.to_string())
}
