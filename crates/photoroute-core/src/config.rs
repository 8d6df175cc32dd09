use crate::identity::{IdentityPaths, IdentityPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("creating {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What to do with a photo in which nothing could be detected (or that failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndetectedPolicy {
    /// Leave it in the intake directory for inspection or a retry.
    Keep,
    /// Remove it from the intake directory.
    Delete,
}

impl FromStr for UndetectedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "delete" => Ok(Self::Delete),
            other => Err(other.to_string()),
        }
    }
}

/// Service configuration.
///
/// Resolved from defaults, then an optional TOML file named by
/// `PHOTOROUTE_CONFIG`, then `PHOTOROUTE_*` environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Watched upload directory.
    pub intake_dir: PathBuf,
    /// Routed photos per face identity.
    pub faces_root: PathBuf,
    /// Routed photos per digit string.
    pub digits_root: PathBuf,
    /// One model image per known identity.
    pub models_dir: PathBuf,
    /// Face cache artifact.
    pub cache_path: PathBuf,
    /// Directory holding `det_10g.onnx` and `w600k_r50.onnx`.
    pub onnx_dir: PathBuf,
    /// SQLite database of processed photos.
    pub db_path: PathBuf,
    /// Maximum cosine distance (exclusive) for a face match.
    pub tolerance: f32,
    /// Sightings before an unknown face gets a permanent name.
    pub promotion_threshold: u32,
    /// Worker threads draining the intake queue.
    pub workers: usize,
    /// Files at or below this size are assumed to be still uploading.
    pub min_file_bytes: u64,
    /// Files above this size are rejected.
    pub max_file_bytes: u64,
    /// Photos wider than this are downscaled before detection.
    pub max_width: u32,
    pub undetected_policy: UndetectedPolicy,
    pub ocr_command: String,
    pub ocr_lang: String,
    /// Quiet period before a filesystem event is delivered.
    pub debounce_ms: u64,
}

/// TOML overlay; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    intake_dir: Option<PathBuf>,
    faces_root: Option<PathBuf>,
    digits_root: Option<PathBuf>,
    models_dir: Option<PathBuf>,
    cache_path: Option<PathBuf>,
    onnx_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    tolerance: Option<f32>,
    promotion_threshold: Option<u32>,
    workers: Option<usize>,
    min_file_bytes: Option<u64>,
    max_file_bytes: Option<u64>,
    max_width: Option<u32>,
    undetected_policy: Option<UndetectedPolicy>,
    ocr_command: Option<String>,
    ocr_lang: Option<String>,
    debounce_ms: Option<u64>,
}

/// `$XDG_DATA_HOME/photoroute`, falling back to `~/.local/share/photoroute`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("photoroute")
}

impl Config {
    /// Built-in defaults rooted at `data_dir`.
    pub fn defaults(data_dir: &Path) -> Self {
        let models_dir = data_dir.join("models/wajah");
        Self {
            intake_dir: data_dir.join("uploads"),
            faces_root: data_dir.join("output/wajah"),
            digits_root: data_dir.join("output/angka"),
            cache_path: models_dir.join("face_cache.json"),
            models_dir,
            onnx_dir: data_dir.join("onnx"),
            db_path: data_dir.join("photos.db"),
            tolerance: 0.55,
            promotion_threshold: 3,
            workers: 2,
            min_file_bytes: 50_000,
            max_file_bytes: 10_000_000,
            max_width: 800,
            undetected_policy: UndetectedPolicy::Keep,
            ocr_command: "tesseract".to_string(),
            ocr_lang: "eng".to_string(),
            debounce_ms: 500,
        }
    }

    /// Load configuration from defaults, the optional file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::defaults(&default_data_dir());
        if let Ok(path) = std::env::var("PHOTOROUTE_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        // A models_dir override moves the default cache with it.
        let cache_follows_models = self.cache_path == self.models_dir.join("face_cache.json");

        macro_rules! overlay {
            ($($field:ident),*) => { $( if let Some(v) = file.$field { self.$field = v; } )* };
        }
        overlay!(
            intake_dir, faces_root, digits_root, models_dir, onnx_dir, db_path, tolerance,
            promotion_threshold, workers, min_file_bytes, max_file_bytes, max_width,
            undetected_policy, ocr_command, ocr_lang, debounce_ms
        );
        match file.cache_path {
            Some(p) => self.cache_path = p,
            None if cache_follows_models => self.cache_path = self.models_dir.join("face_cache.json"),
            None => {}
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let cache_follows_models = self.cache_path == self.models_dir.join("face_cache.json");

        let path = |key: &str| lookup(key).map(PathBuf::from);
        if let Some(p) = path("PHOTOROUTE_INTAKE_DIR") {
            self.intake_dir = p;
        }
        if let Some(p) = path("PHOTOROUTE_FACES_ROOT") {
            self.faces_root = p;
        }
        if let Some(p) = path("PHOTOROUTE_DIGITS_ROOT") {
            self.digits_root = p;
        }
        if let Some(p) = path("PHOTOROUTE_MODELS_DIR") {
            self.models_dir = p;
        }
        match path("PHOTOROUTE_CACHE_PATH") {
            Some(p) => self.cache_path = p,
            None if cache_follows_models => self.cache_path = self.models_dir.join("face_cache.json"),
            None => {}
        }
        if let Some(p) = path("PHOTOROUTE_ONNX_DIR") {
            self.onnx_dir = p;
        }
        if let Some(p) = path("PHOTOROUTE_DB_PATH") {
            self.db_path = p;
        }

        parse_env(&lookup, "PHOTOROUTE_TOLERANCE", &mut self.tolerance)?;
        parse_env(&lookup, "PHOTOROUTE_PROMOTION_THRESHOLD", &mut self.promotion_threshold)?;
        parse_env(&lookup, "PHOTOROUTE_WORKERS", &mut self.workers)?;
        parse_env(&lookup, "PHOTOROUTE_MIN_FILE_BYTES", &mut self.min_file_bytes)?;
        parse_env(&lookup, "PHOTOROUTE_MAX_FILE_BYTES", &mut self.max_file_bytes)?;
        parse_env(&lookup, "PHOTOROUTE_MAX_WIDTH", &mut self.max_width)?;
        parse_env(&lookup, "PHOTOROUTE_UNDETECTED_POLICY", &mut self.undetected_policy)?;
        parse_env(&lookup, "PHOTOROUTE_DEBOUNCE_MS", &mut self.debounce_ms)?;

        if let Some(v) = lookup("PHOTOROUTE_OCR_COMMAND") {
            self.ocr_command = v;
        }
        if let Some(v) = lookup("PHOTOROUTE_OCR_LANG") {
            self.ocr_lang = v;
        }

        self.validate()
    }

    /// Reject settings that would stall or misroute the pipeline.
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: String| -> Result<(), ConfigError> {
            Err(ConfigError::InvalidValue { key, value })
        };
        if self.workers == 0 {
            return invalid("PHOTOROUTE_WORKERS", self.workers.to_string());
        }
        if self.promotion_threshold == 0 {
            return invalid("PHOTOROUTE_PROMOTION_THRESHOLD", self.promotion_threshold.to_string());
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return invalid("PHOTOROUTE_TOLERANCE", self.tolerance.to_string());
        }
        Ok(())
    }

    /// Create every directory the service writes into.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.intake_dir, &self.faces_root, &self.digits_root, &self.models_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.onnx_dir.join("det_10g.onnx").to_string_lossy().into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.onnx_dir.join("w600k_r50.onnx").to_string_lossy().into_owned()
    }

    pub fn identity_paths(&self) -> IdentityPaths {
        IdentityPaths {
            models_dir: self.models_dir.clone(),
            faces_root: self.faces_root.clone(),
            cache_path: self.cache_path.clone(),
        }
    }

    pub fn identity_policy(&self) -> IdentityPolicy {
        IdentityPolicy {
            tolerance: self.tolerance,
            promotion_threshold: self.promotion_threshold,
        }
    }
}

fn parse_env<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw.clone() })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::defaults(Path::new("/data"));
        assert_eq!(config.intake_dir, PathBuf::from("/data/uploads"));
        assert_eq!(config.cache_path, PathBuf::from("/data/models/wajah/face_cache.json"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.promotion_threshold, 3);
        assert_eq!(config.undetected_policy, UndetectedPolicy::Keep);
        assert_eq!(config.scrfd_model_path(), "/data/onnx/det_10g.onnx");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::defaults(Path::new("/data"));
        config
            .apply_env(env(&[
                ("PHOTOROUTE_TOLERANCE", "0.45"),
                ("PHOTOROUTE_WORKERS", "4"),
                ("PHOTOROUTE_UNDETECTED_POLICY", "Delete"),
                ("PHOTOROUTE_MODELS_DIR", "/m"),
            ]))
            .unwrap();
        assert!((config.tolerance - 0.45).abs() < 1e-6);
        assert_eq!(config.workers, 4);
        assert_eq!(config.undetected_policy, UndetectedPolicy::Delete);
        assert_eq!(config.cache_path, PathBuf::from("/m/face_cache.json"));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = Config::defaults(Path::new("/data"));
        let err = config
            .apply_env(env(&[("PHOTOROUTE_MAX_WIDTH", "wide")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PHOTOROUTE_MAX_WIDTH", .. }));

        let err = config.apply_env(env(&[("PHOTOROUTE_WORKERS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_env_rejects_unusable_matching_settings() {
        for (key, value) in [
            ("PHOTOROUTE_PROMOTION_THRESHOLD", "0"),
            ("PHOTOROUTE_TOLERANCE", "-0.2"),
            ("PHOTOROUTE_TOLERANCE", "NaN"),
            ("PHOTOROUTE_TOLERANCE", "0"),
        ] {
            let mut config = Config::defaults(Path::new("/data"));
            let err = config.apply_env(env(&[(key, value)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { key: k, .. } if k == key),
                "{key}={value} gave {err}"
            );
        }
    }

    #[test]
    fn test_file_overlay() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("photoroute.toml");
        std::fs::write(
            &file,
            "intake_dir = \"/srv/in\"\nmax_width = 1024\nundetected_policy = \"delete\"\n",
        )
        .unwrap();

        let mut config = Config::defaults(Path::new("/data"));
        config.apply_file(&file).unwrap();
        assert_eq!(config.intake_dir, PathBuf::from("/srv/in"));
        assert_eq!(config.max_width, 1024);
        assert_eq!(config.undetected_policy, UndetectedPolicy::Delete);
        assert_eq!(config.digits_root, PathBuf::from("/data/output/angka"));
    }

    #[test]
    fn test_file_unknown_key_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("photoroute.toml");
        std::fs::write(&file, "wokers = 3\n").unwrap();
        let mut config = Config::defaults(Path::new("/data"));
        assert!(matches!(config.apply_file(&file), Err(ConfigError::Parse { .. })));
    }
}
