use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::face_embedder::euclidean_distance;
use crate::shared::constants::{APP_DIR_NAME, KNOWN_FACES_FILE};

#[derive(Error, Debug)]
pub enum KnownFacesError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed known-faces file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnownFace {
    pub name: String,
    pub embedding: Vec<f32>,
}

/// Named face embeddings persisted as a JSON array.
#[derive(Debug, Default)]
pub struct KnownFacesStore {
    path: Option<PathBuf>,
    faces: Vec<KnownFace>,
}

impl KnownFacesStore {
    /// In-memory store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// `<data dir>/SafeView/known_faces.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR_NAME).join(KNOWN_FACES_FILE))
    }

    /// Load from `path`; a missing file yields an empty store bound to it.
    pub fn load(path: &Path) -> Result<Self, KnownFacesError> {
        let faces = if path.exists() {
            let json = fs::read_to_string(path).map_err(|e| KnownFacesError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            serde_json::from_str(&json).map_err(|e| KnownFacesError::Json {
                path: path.to_path_buf(),
                source: e,
            })?
        } else {
            Vec::new()
        };
        log::info!("Loaded {} known faces from {}", faces.len(), path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            faces,
        })
    }

    pub fn save(&self) -> Result<(), KnownFacesError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |e: std::io::Error| KnownFacesError::Io {
            path: path.clone(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.faces).map_err(|e| KnownFacesError::Json {
            path: path.clone(),
            source: e,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    /// Add or replace the embedding stored under `name`, then save.
    pub fn add(&mut self, name: &str, embedding: Vec<f32>) -> Result<(), KnownFacesError> {
        self.faces.retain(|f| f.name != name);
        self.faces.push(KnownFace {
            name: name.to_string(),
            embedding,
        });
        self.save()
    }

    /// Returns whether a face was removed.
    pub fn remove(&mut self, name: &str) -> Result<bool, KnownFacesError> {
        let before = self.faces.len();
        self.faces.retain(|f| f.name != name);
        if self.faces.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// First known face (in insertion order) within `tolerance`.
    pub fn find_match(&self, embedding: &[f32], tolerance: f64) -> Option<&str> {
        self.faces
            .iter()
            .find(|f| euclidean_distance(&f.embedding, embedding) <= tolerance)
            .map(|f| f.name.as_str())
    }

    pub fn names(&self) -> Vec<&str> {
        self.faces.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
