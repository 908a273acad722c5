//! Output snapshots
//!
//! Captures the declared outputs of a unit of work as an immutable mapping
//! from property name to [`FileSystemSnapshot`]. The mapping is total (every
//! declared property has an entry, possibly empty) and sorted by property
//! name, so two snapshots of the same work compare equal across runs.

use kiln_types::{Identity, TreeType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// BLAKE3 digest of a file's contents (or of a directory's path)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Hash raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        ContentHash(*blake3::hash(bytes).as_bytes())
    }

    /// Hash a file's contents without loading it into memory
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(ContentHash(*hasher.finalize().as_bytes()))
    }

    /// Get the hash as a hex string
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Kind of a snapshotted filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// One file or directory as it was at capture time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub hash: ContentHash,
}

/// Entries captured under a single physical root, in walk order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RootSnapshot {
    pub root: PathBuf,
    pub entries: Vec<SnapshotEntry>,
}

/// Immutable description of one or more file trees.
///
/// A snapshot composed from several roots keeps the roots in the order they
/// were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSystemSnapshot {
    roots: Vec<RootSnapshot>,
}

impl FileSystemSnapshot {
    /// The explicit empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of a single root
    pub fn of_root(root: PathBuf, entries: Vec<SnapshotEntry>) -> Self {
        FileSystemSnapshot {
            roots: vec![RootSnapshot { root, entries }],
        }
    }

    /// Concatenate snapshots, preserving root order
    pub fn composite(snapshots: Vec<FileSystemSnapshot>) -> Self {
        FileSystemSnapshot {
            roots: snapshots.into_iter().flat_map(|s| s.roots).collect(),
        }
    }

    pub fn roots(&self) -> &[RootSnapshot] {
        &self.roots
    }

    /// All entries across roots
    pub fn entries(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.roots.iter().flat_map(|r| r.entries.iter())
    }

    /// Regular files only
    pub fn files(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries().filter(|e| e.kind == EntryKind::File)
    }

    /// Number of entries across roots, directory entries included
    pub fn len(&self) -> usize {
        self.roots.iter().map(|r| r.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered collection of physical roots backing an output property
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCollection {
    roots: Vec<PathBuf>,
}

impl FileCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        FileCollection {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Errors raised while capturing filesystem state.
///
/// These are returned from the snapshot call itself and never memoized.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("output root {path} does not exist")]
    MissingRoot { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("output property `{name}` declared more than once")]
    DuplicateProperty { name: String },
}

/// Capability to snapshot a file collection, one snapshot per root
pub trait FileCollectionSnapshotter: Send + Sync {
    fn snapshot(&self, files: &FileCollection) -> Result<Vec<FileSystemSnapshot>, SnapshotError>;
}

/// Default snapshotter: walks each root in file-name order and hashes files with BLAKE3
#[derive(Debug, Clone, Copy, Default)]
pub struct HashingSnapshotter;

impl HashingSnapshotter {
    pub fn new() -> Self {
        HashingSnapshotter
    }

    fn snapshot_root(&self, root: &Path) -> Result<FileSystemSnapshot, SnapshotError> {
        let metadata = fs::metadata(root).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SnapshotError::MissingRoot {
                    path: root.to_path_buf(),
                }
            } else {
                SnapshotError::Io {
                    path: root.to_path_buf(),
                    source,
                }
            }
        })?;

        if metadata.is_file() {
            let entry = file_entry(root)?;
            return Ok(FileSystemSnapshot::of_root(root.to_path_buf(), vec![entry]));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|source| SnapshotError::Walk {
                path: root.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_dir() {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                entries.push(SnapshotEntry {
                    path: entry.path().to_path_buf(),
                    kind: EntryKind::Directory,
                    hash: ContentHash::from_bytes(relative.as_os_str().as_encoded_bytes()),
                });
            } else {
                entries.push(file_entry(entry.path())?);
            }
        }
        trace!(root = %root.display(), entries = entries.len(), "snapshotted root");
        Ok(FileSystemSnapshot::of_root(root.to_path_buf(), entries))
    }
}

fn file_entry(path: &Path) -> Result<SnapshotEntry, SnapshotError> {
    let hash = ContentHash::of_file(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(SnapshotEntry {
        path: path.to_path_buf(),
        kind: EntryKind::File,
        hash,
    })
}

impl FileCollectionSnapshotter for HashingSnapshotter {
    fn snapshot(&self, files: &FileCollection) -> Result<Vec<FileSystemSnapshot>, SnapshotError> {
        files
            .roots()
            .iter()
            .map(|root| self.snapshot_root(root))
            .collect()
    }
}

/// A declared output property, as reported by [`UnitOfWork::visit_outputs`]
#[derive(Debug, Clone, Copy)]
pub struct OutputProperty<'a> {
    pub name: &'a str,
    pub tree_type: TreeType,
    pub root: &'a Path,
    pub contents: &'a FileCollection,
}

/// An executable step with declared outputs
pub trait UnitOfWork {
    fn identity(&self) -> &Identity;

    fn display_name(&self) -> String;

    /// Report every declared output property once, resolved against `workspace`
    fn visit_outputs(&self, workspace: &Path, visitor: &mut dyn FnMut(OutputProperty<'_>));
}

/// Sorted, total mapping from output property name to snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSnapshot(BTreeMap<String, FileSystemSnapshot>);

impl OutputSnapshot {
    pub fn get(&self, property: &str) -> Option<&FileSystemSnapshot> {
        self.0.get(property)
    }

    /// Properties in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileSystemSnapshot)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Snapshots the outputs of a unit of work
#[derive(Clone)]
pub struct OutputSnapshotter {
    snapshotter: Arc<dyn FileCollectionSnapshotter>,
}

impl OutputSnapshotter {
    pub fn new(snapshotter: Arc<dyn FileCollectionSnapshotter>) -> Self {
        OutputSnapshotter { snapshotter }
    }

    /// Snapshot every declared output of `work`.
    ///
    /// The first error stops snapshotting of later properties and is returned.
    pub fn snapshot_outputs<W>(&self, work: &W, workspace: &Path) -> Result<OutputSnapshot, SnapshotError>
    where
        W: UnitOfWork + ?Sized,
    {
        let mut properties = BTreeMap::new();
        let mut error = None;

        work.visit_outputs(workspace, &mut |property: OutputProperty<'_>| {
            if error.is_some() {
                return;
            }
            let snapshot = match self.snapshotter.snapshot(property.contents) {
                Ok(results) => FileSystemSnapshot::composite(results),
                Err(err) => {
                    error = Some(err);
                    return;
                }
            };
            if properties
                .insert(property.name.to_string(), snapshot)
                .is_some()
            {
                error = Some(SnapshotError::DuplicateProperty {
                    name: property.name.to_string(),
                });
            }
        });

        if let Some(err) = error {
            debug!(work = %work.display_name(), error = %err, "output snapshot failed");
            return Err(err);
        }
        debug!(
            work = %work.display_name(),
            identity = %work.identity(),
            properties = properties.len(),
            "snapshotted outputs"
        );
        Ok(OutputSnapshot(properties))
    }
}

impl Default for OutputSnapshotter {
    fn default() -> Self {
        OutputSnapshotter::new(Arc::new(HashingSnapshotter))
    }
}

impl fmt::Debug for OutputSnapshotter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSnapshotter").finish_non_exhaustive()
    }
}
