//! Face identity store: known faces, unknown-face counters and promotion.
//!
//! The store owns three pieces of state that must agree: the in-memory
//! name/embedding lists, the JSON face cache on disk, and the per-identity
//! folders under the faces root. Every mutation renames/copies on disk
//! first, then updates memory, then rewrites the cache before returning.
//!
//! The store is not internally synchronised; callers share it behind a
//! mutex so match/record/promote run under a single writer.

use crate::adapter::FaceAnalyzer;
use crate::types::{Embedding, Matcher, NearestMatcher};
use crate::{is_image_path, IMAGE_EXTENSIONS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const UNKNOWN_PREFIX: &str = "unknown";
pub const PERSON_PREFIX: &str = "person";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("reading face cache {path}: {source}")]
    ReadCache { path: PathBuf, source: io::Error },
    #[error("writing face cache {path}: {source}")]
    WriteCache { path: PathBuf, source: io::Error },
    #[error("serializing face cache: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("face cache is corrupt: {0}")]
    Corrupt(String),
    #[error("copying {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("renaming {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("creating {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("scanning {path}: {source}")]
    Scan { path: PathBuf, source: io::Error },
    #[error("identity store lock poisoned")]
    Poisoned,
}

/// On-disk locations the store keeps in sync.
#[derive(Debug, Clone)]
pub struct IdentityPaths {
    /// One seed/model image per identity, named `<identity>.<ext>`.
    pub models_dir: PathBuf,
    /// Routed photos, one folder per identity.
    pub faces_root: PathBuf,
    /// Serialized [`FaceCache`].
    pub cache_path: PathBuf,
}

/// Tuning knobs for matching and promotion.
#[derive(Debug, Clone, Copy)]
pub struct IdentityPolicy {
    /// Maximum cosine distance (exclusive) for a match.
    pub tolerance: f32,
    /// Sightings after which an unknown identity becomes permanent.
    pub promotion_threshold: u32,
}

/// Persisted form of the store: parallel name/embedding lists plus counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceCache {
    pub names: Vec<String>,
    pub embeddings: Vec<Embedding>,
    #[serde(default)]
    pub unknown_counts: BTreeMap<String, u32>,
}

impl FaceCache {
    /// Read and validate a cache file.
    pub fn read(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path).map_err(|source| StoreError::ReadCache {
            path: path.to_path_buf(),
            source,
        })?;
        let cache: FaceCache =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if cache.names.len() != cache.embeddings.len() {
            return Err(StoreError::Corrupt(format!(
                "{} names but {} embeddings",
                cache.names.len(),
                cache.embeddings.len()
            )));
        }
        Ok(cache)
    }

    /// Write atomically: temp file in the same directory, then rename over.
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_vec(self)?;
        let tmp = path.with_extension("json.tmp");
        let write_err = |source| StoreError::WriteCache {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, path).map_err(write_err)
    }
}

/// Known identities (ordered) plus counters for identities still unknown.
pub struct FaceIdentityStore {
    cache: FaceCache,
    paths: IdentityPaths,
    policy: IdentityPolicy,
}

impl FaceIdentityStore {
    /// Load from the cache, or rebuild it by scanning the models directory.
    ///
    /// A missing or corrupt cache triggers the rescan; failing to write the
    /// rebuilt cache is an error.
    pub fn load(
        paths: IdentityPaths,
        policy: IdentityPolicy,
        analyzer: &dyn FaceAnalyzer,
    ) -> Result<Self, StoreError> {
        let cache = match FaceCache::read(&paths.cache_path) {
            Ok(cache) => {
                tracing::info!(
                    path = %paths.cache_path.display(),
                    identities = cache.names.len(),
                    "loaded face cache"
                );
                cache
            }
            Err(err) => {
                if !matches!(&err, StoreError::ReadCache { source, .. } if source.kind() == io::ErrorKind::NotFound)
                {
                    tracing::warn!(error = %err, "face cache unusable, rescanning models");
                }
                let mut cache = scan_models(&paths.models_dir, analyzer)?;
                restore_unknown_counts(&mut cache, &paths.faces_root, policy.promotion_threshold);
                cache.write(&paths.cache_path)?;
                tracing::info!(
                    dir = %paths.models_dir.display(),
                    identities = cache.names.len(),
                    "built face cache from model images"
                );
                cache
            }
        };

        Ok(Self { cache, paths, policy })
    }

    /// Start from an explicit cache, persisting it immediately.
    pub fn from_cache(
        cache: FaceCache,
        paths: IdentityPaths,
        policy: IdentityPolicy,
    ) -> Result<Self, StoreError> {
        cache.write(&paths.cache_path)?;
        Ok(Self { cache, paths, policy })
    }

    pub fn names(&self) -> &[String] {
        &self.cache.names
    }

    pub fn len(&self) -> usize {
        self.cache.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.names.is_empty()
    }

    /// Sightings so far for an identity that is still unknown.
    pub fn unknown_count(&self, name: &str) -> Option<u32> {
        self.cache.unknown_counts.get(name).copied()
    }

    pub fn is_unknown(&self, name: &str) -> bool {
        self.cache.unknown_counts.contains_key(name)
    }

    /// Nearest identity under the tolerance; ties go to the oldest identity.
    pub fn find_match(&self, embedding: &Embedding) -> Option<&str> {
        let result = NearestMatcher.compare(embedding, &self.cache.embeddings, self.policy.tolerance);
        tracing::trace!(distance = ?result.distance, "nearest identity");
        result.index.map(|i| self.cache.names[i].as_str())
    }

    /// Create a new unknown identity for a face with no acceptable match.
    ///
    /// Copies `source_image` into the models directory as the identity's
    /// model image, creates its folder, appends the embedding and persists.
    /// The counter starts at zero; the caller records the sighting with
    /// [`bump_and_maybe_promote`](Self::bump_and_maybe_promote).
    pub fn record_unknown(
        &mut self,
        embedding: &Embedding,
        source_image: &Path,
    ) -> Result<String, StoreError> {
        let name = self.next_name(UNKNOWN_PREFIX)?;

        let folder = self.paths.faces_root.join(&name);
        fs::create_dir_all(&folder).map_err(|source| StoreError::CreateDir {
            path: folder.clone(),
            source,
        })?;

        let ext = source_image
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
            .unwrap_or_else(|| "jpg".to_string());
        let model_path = self.paths.models_dir.join(format!("{name}.{ext}"));
        fs::copy(source_image, &model_path).map_err(|source| StoreError::Copy {
            from: source_image.to_path_buf(),
            to: model_path.clone(),
            source,
        })?;

        self.cache.names.push(name.clone());
        self.cache.embeddings.push(embedding.clone());
        self.cache.unknown_counts.insert(name.clone(), 0);
        self.cache.write(&self.paths.cache_path)?;

        tracing::info!(name = %name, model = %model_path.display(), "new unknown identity");
        Ok(name)
    }

    /// Count one sighting of an unknown identity, promoting it at the threshold.
    ///
    /// Promotion renames the model image and the identity folder, then the
    /// in-memory name, then rewrites the cache. Returns the permanent name
    /// if promotion happened. Names without a counter (known identities,
    /// or an unknown already promoted) are left untouched.
    pub fn bump_and_maybe_promote(&mut self, name: &str) -> Result<Option<String>, StoreError> {
        let Some(count) = self.cache.unknown_counts.get_mut(name) else {
            tracing::debug!(name, "not an unknown identity, nothing to count");
            return Ok(None);
        };
        *count += 1;
        let count = *count;
        tracing::info!(name, sightings = count, "unknown identity sighted");

        if count < self.policy.promotion_threshold {
            self.cache.write(&self.paths.cache_path)?;
            return Ok(None);
        }

        let new_name = self.next_name(PERSON_PREFIX)?;
        self.rename_on_disk(name, &new_name)?;

        if let Some(slot) = self.cache.names.iter_mut().find(|n| n.as_str() == name) {
            *slot = new_name.clone();
        }
        self.cache.unknown_counts.remove(name);
        self.cache.write(&self.paths.cache_path)?;

        tracing::info!(from = name, to = %new_name, "promoted unknown identity");
        Ok(Some(new_name))
    }

    /// Rename model image and identity folder together, undoing the first on failure.
    fn rename_on_disk(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let model_rename = match find_model_image(&self.paths.models_dir, old)? {
            Some(from) => {
                let ext = from.extension().and_then(|e| e.to_str()).unwrap_or("jpg");
                let to = self.paths.models_dir.join(format!("{new}.{ext}"));
                rename(&from, &to)?;
                Some((from, to))
            }
            None => {
                tracing::warn!(name = old, "no model image to rename");
                None
            }
        };

        let old_folder = self.paths.faces_root.join(old);
        let new_folder = self.paths.faces_root.join(new);
        let folder_result = if old_folder.is_dir() {
            rename(&old_folder, &new_folder)
        } else {
            fs::create_dir_all(&new_folder).map_err(|source| StoreError::CreateDir {
                path: new_folder.clone(),
                source,
            })
        };

        if let Err(err) = folder_result {
            if let Some((from, to)) = model_rename {
                if let Err(undo) = fs::rename(&to, &from) {
                    tracing::error!(error = %undo, "could not undo model image rename");
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// `<prefix>{N}` with N one past the highest index in use, in memory or on disk.
    fn next_name(&self, prefix: &str) -> Result<String, StoreError> {
        let mut highest = self
            .cache
            .names
            .iter()
            .filter_map(|n| name_index(n, prefix))
            .max()
            .unwrap_or(0);

        if self.paths.faces_root.is_dir() {
            let entries = fs::read_dir(&self.paths.faces_root).map_err(|source| StoreError::Scan {
                path: self.paths.faces_root.clone(),
                source,
            })?;
            for entry in entries.flatten() {
                if let Some(n) = entry.file_name().to_str().and_then(|n| name_index(n, prefix)) {
                    highest = highest.max(n);
                }
            }
        }

        Ok(format!("{prefix}{}", highest + 1))
    }
}

fn rename(from: &Path, to: &Path) -> Result<(), StoreError> {
    fs::rename(from, to).map_err(|source| StoreError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

fn name_index(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.parse().ok()
}

fn find_model_image(models_dir: &Path, name: &str) -> Result<Option<PathBuf>, StoreError> {
    Ok(list_model_images(models_dir)?
        .into_iter()
        .find(|p| p.file_stem().and_then(|s| s.to_str()) == Some(name)))
}

/// Image files in the models directory, sorted by file name.
fn list_model_images(models_dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if !models_dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(models_dir).map_err(|source| StoreError::Scan {
        path: models_dir.to_path_buf(),
        source,
    })?;
    let mut images: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_image_path(p))
        .collect();
    images.sort();
    Ok(images)
}

/// One identity per model image whose first detected face yields an embedding.
fn scan_models(models_dir: &Path, analyzer: &dyn FaceAnalyzer) -> Result<FaceCache, StoreError> {
    let mut cache = FaceCache::default();

    for path in list_model_images(models_dir)? {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };

        let image = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable model image");
                continue;
            }
        };

        match analyzer.detect_faces(&image) {
            Ok(faces) => match faces.into_iter().next() {
                Some(face) => {
                    cache.names.push(name);
                    cache.embeddings.push(face.embedding);
                }
                None => tracing::warn!(path = %path.display(), "no face in model image"),
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "face analysis failed on model image")
            }
        }
    }

    Ok(cache)
}

/// Give rescanned `unknown*` identities their counters back.
///
/// The sighting count is estimated from the photos already routed into the
/// identity folder, at least one and below the promotion threshold.
fn restore_unknown_counts(cache: &mut FaceCache, faces_root: &Path, threshold: u32) {
    let ceiling = threshold.saturating_sub(1).max(1);
    for name in &cache.names {
        if name_index(name, UNKNOWN_PREFIX).is_none() {
            continue;
        }
        let routed = fs::read_dir(faces_root.join(name))
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| is_image_path(&e.path()))
                    .count()
            })
            .unwrap_or(0);
        let count = u32::try_from(routed).unwrap_or(u32::MAX).clamp(1, ceiling);
        tracing::info!(name = %name, sightings = count, "restored unknown identity counter");
        cache.unknown_counts.insert(name.clone(), count);
    }
}
