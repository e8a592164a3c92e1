//! Existence-check collaborator for the orphan sweep

use crate::graph::NodeId;
use crate::weave::CollaboratorError;
use std::path::{Path, PathBuf};

/// Reports whether a node's backing source still exists
pub trait ExistenceCheck: Send + Sync {
    fn exists(&self, id: &NodeId) -> Result<bool, CollaboratorError>;
}

impl<F> ExistenceCheck for F
where
    F: Fn(&NodeId) -> Result<bool, CollaboratorError> + Send + Sync,
{
    fn exists(&self, id: &NodeId) -> Result<bool, CollaboratorError> {
        self(id)
    }
}

/// Node ids are paths relative to a corpus root
#[derive(Debug, Clone)]
pub struct FsExistence {
    root: PathBuf,
}

impl FsExistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ExistenceCheck for FsExistence {
    fn exists(&self, id: &NodeId) -> Result<bool, CollaboratorError> {
        Ok(self.root.join(id.as_str()).try_exists()?)
    }
}
