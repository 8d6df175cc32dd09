//! Classification engine: one photo in, one routing decision and one record out.
//!
//! Per file: validate size → decode and downscale → face pass → text pass →
//! route. Every path through [`Engine::process`] writes exactly one record,
//! except a vanished file and a file still being uploaded, which write none.

use crate::pool::FileProcessor;
use image::imageops::FilterType;
use image::DynamicImage;
use photoroute_core::{
    Config, DetectionAdapter, DetectionError, DetectionKind, Embedding, FaceIdentityStore,
    PhotoRecorder, RecordError, RecordStatus, StoreError, UndetectedPolicy,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("cannot decode image: {0}")]
    Validation(#[from] image::ImageError),
    #[error("detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("identity store: {0}")]
    Store(#[from] StoreError),
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("recording outcome: {0}")]
    Record(#[from] RecordError),
}

impl ClassifyError {
    /// Store failures leave memory and disk out of step; intake must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClassifyError::Store(_))
    }
}

/// How one file left the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Copied to at least one destination; source removed.
    Routed {
        kind: DetectionKind,
        destination: PathBuf,
    },
    /// Neither a face nor digits found.
    Undetected,
    /// Larger than the size limit; never reached detection.
    Skipped,
    /// Decode, detection or copy failed.
    Failed,
    /// Below the size floor, probably still uploading. Not recorded.
    Deferred,
    /// Gone before it could be processed. Not recorded.
    Missing,
}

/// Engine knobs, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct ClassifySettings {
    pub faces_root: PathBuf,
    pub digits_root: PathBuf,
    pub min_file_bytes: u64,
    pub max_file_bytes: u64,
    pub max_width: u32,
    pub undetected_policy: UndetectedPolicy,
}

impl ClassifySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            faces_root: config.faces_root.clone(),
            digits_root: config.digits_root.clone(),
            min_file_bytes: config.min_file_bytes,
            max_file_bytes: config.max_file_bytes,
            max_width: config.max_width,
            undetected_policy: config.undetected_policy,
        }
    }
}

/// Where the detection passes sent copies of the photo.
#[derive(Debug, Default)]
struct Routing {
    face_destinations: Vec<PathBuf>,
    digit_destination: Option<PathBuf>,
}

impl Routing {
    fn kind(&self) -> DetectionKind {
        DetectionKind::from_flags(
            !self.face_destinations.is_empty(),
            self.digit_destination.is_some(),
        )
    }

    /// The destination written to the record: first face copy, else the digit copy.
    fn primary(&self) -> Option<&PathBuf> {
        self.face_destinations
            .first()
            .or(self.digit_destination.as_ref())
    }
}

pub struct Engine {
    adapter: DetectionAdapter,
    store: Arc<Mutex<FaceIdentityStore>>,
    recorder: Arc<PhotoRecorder>,
    settings: ClassifySettings,
}

impl Engine {
    pub fn new(
        adapter: DetectionAdapter,
        store: Arc<Mutex<FaceIdentityStore>>,
        recorder: Arc<PhotoRecorder>,
        settings: ClassifySettings,
    ) -> Self {
        Self {
            adapter,
            store,
            recorder,
            settings,
        }
    }

    fn run(&self, path: &Path, filename: &str) -> Result<Outcome, ClassifyError> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "file vanished before processing");
                return Ok(Outcome::Missing);
            }
            Err(source) => {
                let err = ClassifyError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                return self.fail(path, filename, err);
            }
        };

        if size > self.settings.max_file_bytes {
            tracing::warn!(path = %path.display(), size, "file too large, skipped");
            self.recorder
                .record(filename, DetectionKind::Skipped, path, RecordStatus::Failed)?;
            remove_source(path);
            return Ok(Outcome::Skipped);
        }
        if size <= self.settings.min_file_bytes {
            tracing::warn!(path = %path.display(), size, "file too small or still uploading, left in place");
            return Ok(Outcome::Deferred);
        }

        let image = match image::open(path) {
            Ok(img) => downscale(img, self.settings.max_width),
            Err(e) => {
                let outcome = self.fail(path, filename, ClassifyError::Validation(e));
                self.apply_policy(path);
                return outcome;
            }
        };

        match self.classify(path, filename, &image) {
            Ok(routing) => self.finish(path, filename, routing),
            Err(err) => self.fail(path, filename, err),
        }
    }

    /// Face pass then text pass; copies the photo into every matching folder.
    fn classify(
        &self,
        path: &Path,
        filename: &str,
        image: &DynamicImage,
    ) -> Result<Routing, ClassifyError> {
        let mut routing = Routing::default();

        for face in self.adapter.detect_faces(image)? {
            let dest = self.route_face(&face.embedding, path, filename)?;
            routing.face_destinations.push(dest);
        }

        let fragments = self.adapter.detect_text(image)?;
        if let Some(digits) = digit_key(&fragments) {
            let dest = copy_into(&self.settings.digits_root.join(&digits), path, filename)?;
            tracing::info!(digits = %digits, "digits detected");
            routing.digit_destination = Some(dest);
        }

        Ok(routing)
    }

    /// Resolve the identity folder for one face and copy the photo there.
    ///
    /// Runs entirely under the store lock, so a concurrent promotion can
    /// never rename the folder between resolving the name and copying.
    fn route_face(
        &self,
        embedding: &Embedding,
        path: &Path,
        filename: &str,
    ) -> Result<PathBuf, ClassifyError> {
        let mut store = self.store.lock().map_err(|_| StoreError::Poisoned)?;

        let folder = match store.find_match(embedding).map(str::to_owned) {
            Some(name) if store.is_unknown(&name) => {
                store.bump_and_maybe_promote(&name)?.unwrap_or(name)
            }
            Some(name) => {
                tracing::info!(name = %name, "face recognized");
                name
            }
            None => {
                let name = store.record_unknown(embedding, path)?;
                store.bump_and_maybe_promote(&name)?.unwrap_or(name)
            }
        };

        copy_into(&self.settings.faces_root.join(&folder), path, filename)
    }

    fn finish(&self, path: &Path, filename: &str, routing: Routing) -> Result<Outcome, ClassifyError> {
        let kind = routing.kind();
        let Some(destination) = routing.primary().cloned() else {
            tracing::info!(path = %path.display(), "no face or digits detected");
            self.recorder
                .record(filename, DetectionKind::None, path, RecordStatus::Failed)?;
            self.apply_policy(path);
            return Ok(Outcome::Undetected);
        };

        self.recorder
            .record(filename, kind, &destination, RecordStatus::Success)?;
        remove_source(path);
        Ok(Outcome::Routed { kind, destination })
    }

    /// Record a failed outcome. Only store failures propagate.
    fn fail(&self, path: &Path, filename: &str, err: ClassifyError) -> Result<Outcome, ClassifyError> {
        if err.is_fatal() {
            tracing::error!(path = %path.display(), error = %err, "identity store failure");
        } else {
            tracing::warn!(path = %path.display(), error = %err, "processing failed");
        }
        let recorded = self
            .recorder
            .record(filename, DetectionKind::Error, path, RecordStatus::Failed);
        if err.is_fatal() {
            // the store error must reach the pool even if the record is lost
            if let Err(record_err) = recorded {
                tracing::error!(path = %path.display(), error = %record_err, "could not record store failure");
            }
            return Err(err);
        }
        recorded?;
        Ok(Outcome::Failed)
    }

    fn apply_policy(&self, path: &Path) {
        if self.settings.undetected_policy == UndetectedPolicy::Delete {
            remove_source(path);
        }
    }
}

impl FileProcessor for Engine {
    fn process(&self, path: &Path) -> Result<Outcome, ClassifyError> {
        let started = Instant::now();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let result = self.run(path, &filename);
        match &result {
            Ok(outcome) => tracing::info!(
                file = %filename,
                ?outcome,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "processed"
            ),
            Err(e) => tracing::error!(file = %filename, error = %e, "processing aborted"),
        }
        result
    }
}

/// Shrink to `max_width` keeping aspect ratio; height is floored.
fn downscale(image: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width <= max_width {
        return image;
    }
    let ratio = max_width as f64 / width as f64;
    let new_height = ((height as f64 * ratio).floor() as u32).max(1);
    tracing::debug!(width, height, new_width = max_width, new_height, "downscaling");
    image.resize_exact(max_width, new_height, FilterType::Triangle)
}

/// Digits of the first fragment that has any, with everything else stripped.
fn digit_key(fragments: &[String]) -> Option<String> {
    fragments.iter().find_map(|text| {
        let digits: String = text.chars().filter(char::is_ascii_digit).collect();
        (!digits.is_empty()).then_some(digits)
    })
}

fn copy_into(dir: &Path, source: &Path, filename: &str) -> Result<PathBuf, ClassifyError> {
    let io_err = |path: &Path, source| ClassifyError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let dest = dir.join(filename);
    fs::copy(source, &dest).map_err(|e| io_err(&dest, e))?;
    Ok(dest)
}

fn remove_source(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed from intake"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::error!(path = %path.display(), error = %e, "could not remove from intake"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb, RgbImage};
    use photoroute_core::{
        BoundingBox, DetectedFace, FaceAnalyzer, FaceCache, IdentityPaths, IdentityPolicy,
        TextReader,
    };
    use crate::intake;
    use crate::pool::{HaltSignal, WorkerPool};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedFaces {
        embeddings: Vec<Embedding>,
        calls: AtomicUsize,
    }

    impl FaceAnalyzer for FixedFaces {
        fn detect_faces(&self, _image: &RgbImage) -> Result<Vec<DetectedFace>, DetectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .embeddings
                .iter()
                .map(|e| DetectedFace {
                    bbox: BoundingBox {
                        x: 0.0,
                        y: 0.0,
                        width: 10.0,
                        height: 10.0,
                        confidence: 0.9,
                        landmarks: None,
                    },
                    embedding: e.clone(),
                })
                .collect())
        }
    }

    struct FixedText {
        fragments: Option<Vec<String>>,
        calls: AtomicUsize,
    }

    impl TextReader for FixedText {
        fn read_text(&self, _image: &GrayImage) -> Result<Vec<String>, DetectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.fragments
                .clone()
                .ok_or_else(|| DetectionError::Unavailable("ocr down".into()))
        }
    }

    struct Harness {
        dir: TempDir,
        engine: Arc<Engine>,
        faces: Arc<FixedFaces>,
        text: Arc<FixedText>,
        recorder: Arc<PhotoRecorder>,
    }

    impl Harness {
        fn new(faces: Vec<Embedding>, text: Option<&[&str]>) -> Self {
            Self::with(faces, text, |_| {})
        }

        fn with(
            faces: Vec<Embedding>,
            text: Option<&[&str]>,
            tweak: impl FnOnce(&mut ClassifySettings),
        ) -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path();
            let paths = IdentityPaths {
                models_dir: root.join("models"),
                faces_root: root.join("out/wajah"),
                cache_path: root.join("cache/face_cache.json"),
            };
            fs::create_dir_all(&paths.models_dir).unwrap();
            fs::create_dir_all(root.join("uploads")).unwrap();

            let cache = FaceCache {
                names: vec!["alice".into()],
                embeddings: vec![Embedding::new(vec![1.0, 0.0])],
                unknown_counts: Default::default(),
            };
            let policy = IdentityPolicy {
                tolerance: 0.45,
                promotion_threshold: 3,
            };
            let store = FaceIdentityStore::from_cache(cache, paths.clone(), policy).unwrap();

            let mut settings = ClassifySettings {
                faces_root: paths.faces_root.clone(),
                digits_root: root.join("out/angka"),
                min_file_bytes: 0,
                max_file_bytes: 10_000_000,
                max_width: 800,
                undetected_policy: UndetectedPolicy::Keep,
            };
            tweak(&mut settings);

            let faces = Arc::new(FixedFaces {
                embeddings: faces,
                calls: AtomicUsize::new(0),
            });
            let text = Arc::new(FixedText {
                fragments: text.map(|t| t.iter().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
            });
            let recorder = Arc::new(PhotoRecorder::open(&root.join("photos.db")).unwrap());
            let engine = Arc::new(Engine::new(
                DetectionAdapter::new(faces.clone(), text.clone()),
                Arc::new(Mutex::new(store)),
                recorder.clone(),
                settings,
            ));

            Self {
                dir,
                engine,
                faces,
                text,
                recorder,
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn upload(&self, name: &str) -> PathBuf {
            let path = self.root().join("uploads").join(name);
            RgbImage::from_pixel(100, 100, Rgb([40, 90, 200]))
                .save(&path)
                .unwrap();
            path
        }
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_blank_image_is_undetected_and_kept() {
        let h = Harness::new(vec![], Some(&[]));
        let src = h.upload("blank.png");

        assert_eq!(h.engine.process(&src).unwrap(), Outcome::Undetected);
        assert!(src.exists());
        let rows = h.recorder.list_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].kind.as_str(), rows[0].status.as_str()), ("none", "failed"));
    }

    #[test]
    fn test_undetected_delete_policy_removes_source() {
        let h = Harness::with(vec![], Some(&["no numbers here"]), |s| {
            s.undetected_policy = UndetectedPolicy::Delete
        });
        let src = h.upload("blank.png");

        assert_eq!(h.engine.process(&src).unwrap(), Outcome::Undetected);
        assert!(!src.exists());
    }

    #[test]
    fn test_known_face_routes_to_identity_folder() {
        // cos = 0.8 → distance 0.2
        let h = Harness::new(vec![emb(&[0.8, 0.6])], Some(&[]));
        let src = h.upload("IMG_0001.png");

        let outcome = h.engine.process(&src).unwrap();
        let expected = h.root().join("out/wajah/alice/IMG_0001.png");
        assert_eq!(
            outcome,
            Outcome::Routed {
                kind: DetectionKind::Face,
                destination: expected.clone()
            }
        );
        assert!(expected.exists());
        assert!(!src.exists());

        let rows = h.recorder.list_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, "wajah");
        assert_eq!(rows[0].status, "success");
        assert_eq!(rows[0].path.as_deref(), Some(expected.to_string_lossy().as_ref()));
    }

    #[test]
    fn test_repeated_new_face_is_promoted_on_third_sighting() {
        let h = Harness::new(vec![emb(&[0.0, 1.0])], Some(&[]));

        for (i, expected_folder) in ["unknown1", "unknown1", "person1"].iter().enumerate() {
            let src = h.upload(&format!("shot{i}.png"));
            match h.engine.process(&src).unwrap() {
                Outcome::Routed { kind, destination } => {
                    assert_eq!(kind, DetectionKind::Face);
                    assert!(destination.starts_with(h.root().join("out/wajah").join(expected_folder)));
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        let person = h.root().join("out/wajah/person1");
        for i in 0..3 {
            assert!(person.join(format!("shot{i}.png")).exists());
        }
        assert!(!h.root().join("out/wajah/unknown1").exists());
        assert!(h.root().join("models/person1.png").exists());

        let cache = FaceCache::read(&h.root().join("cache/face_cache.json")).unwrap();
        assert_eq!(cache.names, vec!["alice".to_string(), "person1".to_string()]);
        assert!(cache.unknown_counts.is_empty());
    }

    #[test]
    fn test_face_and_digits_is_mixed() {
        let h = Harness::new(vec![emb(&[1.0, 0.0])], Some(&["Welcome", "Order 42", "Table 7"]));
        let src = h.upload("party.png");

        let outcome = h.engine.process(&src).unwrap();
        assert!(matches!(outcome, Outcome::Routed { kind: DetectionKind::Mixed, .. }));
        assert!(h.root().join("out/wajah/alice/party.png").exists());
        assert!(h.root().join("out/angka/42/party.png").exists());
        assert!(!h.root().join("out/angka/7").exists());
        assert_eq!(h.recorder.list_by_kind(DetectionKind::Mixed).unwrap().len(), 1);
    }

    #[test]
    fn test_digits_only() {
        let h = Harness::new(vec![], Some(&["No. A-12-3"]));
        let src = h.upload("bib.png");

        let outcome = h.engine.process(&src).unwrap();
        let expected = h.root().join("out/angka/123/bib.png");
        assert_eq!(
            outcome,
            Outcome::Routed {
                kind: DetectionKind::Digits,
                destination: expected.clone()
            }
        );
        assert!(expected.exists());
    }

    #[test]
    fn test_oversize_never_reaches_detection() {
        let h = Harness::with(vec![emb(&[1.0, 0.0])], Some(&["1"]), |s| s.max_file_bytes = 1_000);
        let src = h.root().join("uploads/huge.jpg");
        fs::write(&src, vec![0u8; 4_096]).unwrap();

        assert_eq!(h.engine.process(&src).unwrap(), Outcome::Skipped);
        assert_eq!(h.faces.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.text.calls.load(Ordering::SeqCst), 0);
        assert!(!src.exists());
        let rows = h.recorder.list_all().unwrap();
        assert_eq!((rows[0].kind.as_str(), rows[0].status.as_str()), ("skipped", "failed"));
    }

    #[test]
    fn test_small_file_is_deferred_without_record() {
        let h = Harness::with(vec![], Some(&[]), |s| s.min_file_bytes = 1_000_000);
        let src = h.upload("partial.png");

        assert_eq!(h.engine.process(&src).unwrap(), Outcome::Deferred);
        assert!(src.exists());
        assert_eq!(h.faces.calls.load(Ordering::SeqCst), 0);
        assert!(h.recorder.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_skipped_quietly() {
        let h = Harness::new(vec![], Some(&[]));
        let src = h.root().join("uploads/gone.jpg");

        assert_eq!(h.engine.process(&src).unwrap(), Outcome::Missing);
        assert!(h.recorder.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_detection_error_is_recorded_once() {
        let h = Harness::new(vec![], None);
        let src = h.upload("ocr_fail.png");

        assert_eq!(h.engine.process(&src).unwrap(), Outcome::Failed);
        assert!(src.exists());
        let rows = h.recorder.list_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].kind.as_str(), rows[0].status.as_str()), ("error", "failed"));
    }

    #[test]
    fn test_corrupt_image_is_recorded_as_error() {
        let h = Harness::new(vec![], Some(&[]));
        let src = h.root().join("uploads/broken.jpg");
        fs::write(&src, b"definitely not a jpeg").unwrap();

        assert_eq!(h.engine.process(&src).unwrap(), Outcome::Failed);
        assert_eq!(h.faces.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.recorder.list_by_kind(DetectionKind::Error).unwrap().len(), 1);
    }

    #[test]
    fn test_store_failure_is_fatal() {
        let h = Harness::new(vec![emb(&[0.0, 1.0])], Some(&[]));
        // replace the cache directory with a plain file so the next persist fails
        let cache_dir = h.root().join("cache");
        fs::remove_dir_all(&cache_dir).unwrap();
        fs::write(&cache_dir, b"").unwrap();
        let src = h.upload("new_face.png");

        let err = h.engine.process(&src).unwrap_err();
        assert!(err.is_fatal(), "got {err}");
        assert!(src.exists());
        assert_eq!(h.recorder.list_by_kind(DetectionKind::Error).unwrap().len(), 1);
    }

    #[test]
    fn test_store_failure_stays_fatal_when_record_fails() {
        let h = Harness::new(vec![emb(&[0.0, 1.0])], Some(&[]));
        let cache_dir = h.root().join("cache");
        fs::remove_dir_all(&cache_dir).unwrap();
        fs::write(&cache_dir, b"").unwrap();
        rusqlite::Connection::open(h.root().join("photos.db"))
            .unwrap()
            .execute_batch("DROP TABLE photos")
            .unwrap();
        let src = h.upload("new_face.png");

        let err = h.engine.process(&src).unwrap_err();
        assert!(matches!(err, ClassifyError::Store(_)), "got {err}");
    }

    #[test]
    fn test_pool_creates_one_identity_for_repeated_new_face() {
        let h = Harness::new(vec![emb(&[0.0, 1.0])], Some(&[]));
        let (queue, receiver) = intake::channel();
        let uploads: Vec<PathBuf> = (0..6).map(|i| h.upload(&format!("guest{i}.png"))).collect();
        for path in &uploads {
            assert!(queue.enqueue(path.clone()));
        }
        drop(queue);

        let halt = Arc::new(HaltSignal::default());
        WorkerPool::start(3, h.engine.clone(), Arc::new(receiver), halt.clone())
            .unwrap()
            .join();
        assert!(!halt.is_tripped());

        let cache = FaceCache::read(&h.root().join("cache/face_cache.json")).unwrap();
        assert_eq!(cache.names, vec!["alice".to_string(), "person1".to_string()]);
        assert!(cache.unknown_counts.is_empty());

        let faces_root = h.root().join("out/wajah");
        let mut folders: Vec<String> = fs::read_dir(&faces_root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        folders.sort();
        assert_eq!(folders, vec!["person1".to_string()]);
        for i in 0..6 {
            assert!(faces_root.join(format!("person1/guest{i}.png")).exists());
        }

        let rows = h.recorder.list_all().unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.kind == "wajah" && r.status == "success"));
        let mut files: Vec<&str> = rows.iter().map(|r| r.filename.as_str()).collect();
        files.sort();
        files.dedup();
        assert_eq!(files.len(), 6);
        assert!(uploads.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_downscale_keeps_aspect() {
        let img = DynamicImage::new_rgb8(1600, 1200);
        let out = downscale(img, 800);
        assert_eq!((out.width(), out.height()), (800, 600));

        let img = DynamicImage::new_rgb8(1000, 333);
        let out = downscale(img, 800);
        assert_eq!((out.width(), out.height()), (800, 266));

        let img = DynamicImage::new_rgb8(640, 480);
        let out = downscale(img, 800);
        assert_eq!((out.width(), out.height()), (640, 480));
    }

    #[test]
    fn test_digit_key_takes_first_numeric_fragment() {
        let frags: Vec<String> = ["Hello", "Order 42", "99"].iter().map(|s| s.to_string()).collect();
        assert_eq!(digit_key(&frags).as_deref(), Some("42"));
        assert_eq!(digit_key(&["A1B2".to_string()]).as_deref(), Some("12"));
        assert_eq!(digit_key(&["none".to_string()]), None);
        assert_eq!(digit_key(&[]), None);
    }
}
