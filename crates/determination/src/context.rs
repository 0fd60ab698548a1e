//! Run-scoped state: the output workspace and the scratch arena
//!
//! Intermediate datasets live in a [`ScratchArena`] under generated unique
//! names. Each pipeline stage releases the datasets it has consumed, and
//! whatever is left is released when the run ends or the arena is dropped,
//! including on error paths.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use heldet_core::raster::Raster;
use heldet_core::vector::FeatureCollection;
use heldet_core::Error;
use tracing::debug;

/// Handle to a dataset held in a [`ScratchArena`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScratchId(String);

impl ScratchId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScratchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Temporary dataset kinds
#[derive(Debug, Clone)]
pub enum ScratchData {
    Surface(Raster<f64>),
    Directions(Raster<u8>),
    Layer(FeatureCollection),
}

impl From<Raster<f64>> for ScratchData {
    fn from(r: Raster<f64>) -> Self {
        ScratchData::Surface(r)
    }
}

impl From<Raster<u8>> for ScratchData {
    fn from(r: Raster<u8>) -> Self {
        ScratchData::Directions(r)
    }
}

impl From<FeatureCollection> for ScratchData {
    fn from(fc: FeatureCollection) -> Self {
        ScratchData::Layer(fc)
    }
}

/// Named temporary datasets with explicit release
#[derive(Debug, Default)]
pub struct ScratchArena {
    next: usize,
    items: BTreeMap<ScratchId, ScratchData>,
}

impl ScratchArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under a fresh id derived from `name`.
    pub fn put(&mut self, name: &str, data: impl Into<ScratchData>) -> ScratchId {
        self.next += 1;
        let id = ScratchId(format!("{}_{}", name, self.next));
        debug!("scratch: created {}", id);
        self.items.insert(id.clone(), data.into());
        id
    }

    fn missing(id: &ScratchId) -> Error {
        Error::Other(format!("scratch dataset {} is not available", id))
    }

    pub fn surface(&self, id: &ScratchId) -> Result<&Raster<f64>, Error> {
        match self.items.get(id) {
            Some(ScratchData::Surface(r)) => Ok(r),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn directions(&self, id: &ScratchId) -> Result<&Raster<u8>, Error> {
        match self.items.get(id) {
            Some(ScratchData::Directions(r)) => Ok(r),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn layer(&self, id: &ScratchId) -> Result<&FeatureCollection, Error> {
        match self.items.get(id) {
            Some(ScratchData::Layer(fc)) => Ok(fc),
            _ => Err(Self::missing(id)),
        }
    }

    /// Remove a surface from the arena, handing ownership to the caller
    pub fn take_surface(&mut self, id: &ScratchId) -> Result<Raster<f64>, Error> {
        match self.items.remove(id) {
            Some(ScratchData::Surface(r)) => {
                debug!("scratch: took {}", id);
                Ok(r)
            }
            Some(other) => {
                self.items.insert(id.clone(), other);
                Err(Self::missing(id))
            }
            None => Err(Self::missing(id)),
        }
    }

    pub fn release(&mut self, id: &ScratchId) {
        if self.items.remove(id).is_some() {
            debug!("scratch: released {}", id);
        }
    }

    pub fn release_all(&mut self) {
        if !self.items.is_empty() {
            debug!("scratch: releasing {} dataset(s)", self.items.len());
        }
        self.items.clear();
    }

    pub fn contains(&self, id: &ScratchId) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Drop for ScratchArena {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Output directory owned by one run
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open (creating if needed) an output directory
    pub fn create(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for an output named `name`, with any existing file removed
    pub fn prepare_output(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.root.join(name);
        if path.exists() {
            debug!("removing existing output {}", path.display());
            fs::remove_file(&path)?;
        }
        Ok(path)
    }
}

/// Everything a determination run mutates besides its result
#[derive(Debug, Default)]
pub struct ProcessingContext {
    pub scratch: ScratchArena,
    workspace: Option<Workspace>,
}

impl ProcessingContext {
    /// Context that keeps results in memory only
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Context writing result layers into `workspace`
    pub fn with_workspace(workspace: Workspace) -> Self {
        Self {
            scratch: ScratchArena::new(),
            workspace: Some(workspace),
        }
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }
}
