//! Resolved artifacts flowing through the transform graph

use kiln_types::ComponentId;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single resolved file plus the component it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvableArtifact {
    owner: ComponentId,
    name: String,
    file: PathBuf,
}

impl ResolvableArtifact {
    /// Artifact named after its file
    pub fn new(owner: ComponentId, file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        ResolvableArtifact {
            owner,
            name: file_name(&file),
            file,
        }
    }

    pub fn owner(&self) -> &ComponentId {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// The artifact produced by transforming this one into `file`
    pub fn transformed_to(&self, file: impl Into<PathBuf>) -> ResolvableArtifact {
        ResolvableArtifact::new(self.owner.clone(), file)
    }

    pub fn display_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResolvableArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.owner)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
