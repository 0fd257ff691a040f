// src/review/queue.rs
//! Image queue: the authoritative list of images in a processing session.
//!
//! Per-image state machine:
//!
//! ```text
//! Pending --start--> Processing --complete--> Completed
//!                    Processing --fail-----> Error
//! Completed --retry--> Processing
//! Error     --retry--> Processing
//! ```
//!
//! Every mutation replaces the whole list (copy-on-write) and is keyed by
//! [`ImageId`]; positions are never used as identity because retries and
//! commits reorder and shrink the list while calls are in flight.

use bevy::log::{debug, info, warn};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::error::{ReviewError, TransitionError};
use super::extraction::ExtractionResult;
use super::grid::ReviewGrid;
use super::normalize::normalize;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(Uuid);

impl ImageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A picked file, shared cheaply between the queue, tasks and previews.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub id: ImageId,
    pub file_name: String,
    pub bytes: Arc<[u8]>,
    pub mime: &'static str,
    /// Where the file was read from; `None` for in-memory uploads.
    pub source_path: Option<PathBuf>,
}

impl UploadedImage {
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        Self {
            id: ImageId::new(),
            mime: mime_for(&file_name),
            file_name,
            bytes: bytes.into(),
            source_path: None,
        }
    }

    /// Same file on disk, or the same name and contents when either side has no path.
    pub fn is_same_file(&self, other: &UploadedImage) -> bool {
        match (&self.source_path, &other.source_path) {
            (Some(a), Some(b)) => a == b,
            _ => self.file_name == other.file_name && self.bytes == other.bytes,
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut upload = Self::from_bytes(file_name, bytes);
        upload.source_path = Some(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
        Ok(upload)
    }
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl ImageStatus {
    pub fn label(self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Processing => "processing",
            ImageStatus::Completed => "completed",
            ImageStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub id: ImageId,
    pub source: UploadedImage,
    pub status: ImageStatus,
    pub extraction: Option<Arc<ExtractionResult>>,
    /// Normalized once per extraction result.
    pub grid: Option<Arc<ReviewGrid>>,
    pub error_message: Option<String>,
    /// Set while a retry call is in flight; the image is read-only meanwhile.
    pub retrying: bool,
    pub attempts: u32,
}

impl ProcessedImage {
    fn pending(source: UploadedImage) -> Self {
        Self {
            id: source.id,
            source,
            status: ImageStatus::Pending,
            extraction: None,
            grid: None,
            error_message: None,
            retrying: false,
            attempts: 0,
        }
    }

    /// Completed images, plus completed images whose retry is in flight.
    pub fn in_carousel(&self) -> bool {
        match self.status {
            ImageStatus::Completed => true,
            ImageStatus::Processing => self.retrying && self.grid.is_some(),
            _ => false,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.status != ImageStatus::Completed || self.retrying
    }

    pub fn remote_image_id(&self) -> Option<&str> {
        self.extraction
            .as_ref()
            .and_then(|e| e.remote_image_id.as_deref())
    }

    pub fn display_name(&self) -> &str {
        &self.source.file_name
    }
}

/// A result coming back for one image, correlated by id.
#[derive(Debug, Clone)]
pub enum QueueUpdate {
    Started { id: ImageId },
    Completed {
        id: ImageId,
        result: Arc<ExtractionResult>,
    },
    Failed { id: ImageId, message: String },
}

impl QueueUpdate {
    pub fn id(&self) -> ImageId {
        match self {
            QueueUpdate::Started { id }
            | QueueUpdate::Completed { id, .. }
            | QueueUpdate::Failed { id, .. } => *id,
        }
    }
}

/// What an applied update did, so callers can react (attention markers, feedback).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Started,
    Completed { was_retry: bool },
    Failed { was_retry: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueStats {
    pub total: usize,
    pub processed: usize,
    pub errors: usize,
    pub in_flight: usize,
    pub total_containers: u32,
    pub average_confidence: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ImageQueue {
    images: Arc<Vec<ProcessedImage>>,
}

impl ImageQueue {
    /// Resets the queue to one pending entry per upload, order preserved.
    pub fn enqueue_all(&mut self, uploads: Vec<UploadedImage>) {
        info!("ImageQueue: enqueuing {} image(s).", uploads.len());
        self.images = Arc::new(uploads.into_iter().map(ProcessedImage::pending).collect());
    }

    pub fn clear(&mut self) {
        self.images = Arc::new(Vec::new());
    }

    pub fn images(&self) -> &[ProcessedImage] {
        &self.images
    }

    /// Cheap handle on the current list; stays valid across later mutations.
    pub fn snapshot(&self) -> Arc<Vec<ProcessedImage>> {
        Arc::clone(&self.images)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, id: ImageId) -> Option<&ProcessedImage> {
        self.images.iter().find(|img| img.id == id)
    }

    pub fn uploads(&self) -> Vec<UploadedImage> {
        self.images.iter().map(|img| img.source.clone()).collect()
    }

    /// Ids of the images currently navigable in the verification carousel.
    pub fn carousel_ids(&self) -> Vec<ImageId> {
        self.images
            .iter()
            .filter(|img| img.in_carousel())
            .map(|img| img.id)
            .collect()
    }

    pub fn start(&mut self, id: ImageId) -> Result<Applied, TransitionError> {
        self.transition(id, ImageStatus::Processing, &[ImageStatus::Pending], |img| {
            img.attempts += 1;
        })?;
        Ok(Applied::Started)
    }

    pub fn complete(
        &mut self,
        id: ImageId,
        result: Arc<ExtractionResult>,
    ) -> Result<Applied, TransitionError> {
        let grid = Arc::new(normalize(&result.payload));
        let mut was_retry = false;
        self.transition(id, ImageStatus::Completed, &[ImageStatus::Processing], |img| {
            was_retry = img.retrying;
            img.retrying = false;
            img.extraction = Some(result);
            img.grid = Some(grid);
            img.error_message = None;
        })?;
        Ok(Applied::Completed { was_retry })
    }

    pub fn fail(&mut self, id: ImageId, message: String) -> Result<Applied, TransitionError> {
        let mut was_retry = false;
        self.transition(id, ImageStatus::Error, &[ImageStatus::Processing], |img| {
            was_retry = img.retrying;
            img.retrying = false;
            img.extraction = None;
            img.grid = None;
            img.error_message = Some(message);
        })?;
        Ok(Applied::Failed { was_retry })
    }

    /// Re-enters `Processing` for a completed or failed image and hands back
    /// its source so the caller can dispatch the extraction call.
    pub fn begin_retry(&mut self, id: ImageId) -> Result<UploadedImage, TransitionError> {
        self.transition(
            id,
            ImageStatus::Processing,
            &[ImageStatus::Completed, ImageStatus::Error],
            |img| {
                img.retrying = true;
                img.attempts += 1;
                img.error_message = None;
            },
        )?;
        self.get(id)
            .map(|img| img.source.clone())
            .ok_or(TransitionError::UnknownImage(id))
    }

    pub fn remove(&mut self, id: ImageId) -> Option<ProcessedImage> {
        let removed = self.get(id).cloned()?;
        let remaining = self.images.iter().filter(|img| img.id != id).cloned().collect();
        self.images = Arc::new(remaining);
        debug!("ImageQueue: removed {} ({}).", removed.display_name(), id);
        Some(removed)
    }

    pub fn apply_update(&mut self, update: QueueUpdate) -> Result<Applied, TransitionError> {
        match update {
            QueueUpdate::Started { id } => self.start(id),
            QueueUpdate::Completed { id, result } => self.complete(id, result),
            QueueUpdate::Failed { id, message } => self.fail(id, message),
        }
    }

    /// Every image reached `Completed` or `Error` and no retry is running.
    pub fn is_batch_complete(&self) -> bool {
        !self.images.is_empty()
            && self.images.iter().all(|img| {
                matches!(img.status, ImageStatus::Completed | ImageStatus::Error) && !img.retrying
            })
    }

    pub fn stats(&self) -> QueueStats {
        let completed: Vec<&ProcessedImage> = self
            .images
            .iter()
            .filter(|img| img.status == ImageStatus::Completed)
            .collect();
        let total_containers = completed
            .iter()
            .filter_map(|img| img.extraction.as_ref())
            .map(|e| e.total_containers)
            .sum();
        let average_confidence = if completed.is_empty() {
            0
        } else {
            let sum: f32 = completed
                .iter()
                .filter_map(|img| img.extraction.as_ref())
                .map(|e| e.average_confidence)
                .sum();
            (sum / completed.len() as f32).round() as u32
        };
        QueueStats {
            total: self.images.len(),
            processed: completed.len(),
            errors: self
                .images
                .iter()
                .filter(|img| img.status == ImageStatus::Error)
                .count(),
            in_flight: self
                .images
                .iter()
                .filter(|img| img.status == ImageStatus::Processing)
                .count(),
            total_containers,
            average_confidence,
        }
    }

    fn transition(
        &mut self,
        id: ImageId,
        to: ImageStatus,
        allowed_from: &[ImageStatus],
        update: impl FnOnce(&mut ProcessedImage),
    ) -> Result<(), TransitionError> {
        let current = self.get(id).ok_or(TransitionError::UnknownImage(id))?;
        let from = current.status;
        if !allowed_from.contains(&from) {
            return Err(TransitionError::Invalid { id, from, to });
        }
        let mut next = current.clone();
        next.status = to;
        update(&mut next);

        let images = self
            .images
            .iter()
            .map(|img| if img.id == id { next.clone() } else { img.clone() })
            .collect();
        self.images = Arc::new(images);
        Ok(())
    }
}

/// The remote AI extraction endpoint.
pub trait ExtractionBackend: Send + Sync {
    fn extract_containers(
        &self,
        project_id: &str,
        image: &UploadedImage,
    ) -> impl Future<Output = Result<ExtractionResult, ReviewError>> + Send;
}

/// Receives queue updates as they happen. In the app this hops to the main
/// thread; in tests and the CLI it is the queue itself.
pub trait QueueSink: Send {
    fn push(&mut self, update: QueueUpdate) -> impl Future<Output = ()> + Send;
}

impl QueueSink for ImageQueue {
    async fn push(&mut self, update: QueueUpdate) {
        if let Err(e) = self.apply_update(update) {
            warn!("ImageQueue: ignoring update: {}", e);
        }
    }
}

/// Runs one extraction call and turns its outcome into an update.
pub async fn extract_one<B: ExtractionBackend>(
    backend: &B,
    project_id: &str,
    image: &UploadedImage,
) -> QueueUpdate {
    match backend.extract_containers(project_id, image).await {
        Ok(result) => {
            info!(
                "Extraction succeeded for '{}' ({} containers).",
                image.file_name, result.total_containers
            );
            QueueUpdate::Completed {
                id: image.id,
                result: Arc::new(result),
            }
        }
        Err(err) => {
            warn!("Extraction failed for '{}': {}", image.file_name, err);
            QueueUpdate::Failed {
                id: image.id,
                message: err.to_string(),
            }
        }
    }
}

/// Processes images strictly one at a time, in order. A failing image is
/// recorded and the run moves on; nothing escapes.
pub async fn run_sequentially<B, S>(
    backend: &B,
    project_id: &str,
    images: &[UploadedImage],
    pause: Duration,
    sink: &mut S,
) -> BatchSummary
where
    B: ExtractionBackend,
    S: QueueSink,
{
    let mut summary = BatchSummary::default();
    for (index, image) in images.iter().enumerate() {
        info!(
            "Processing image {} of {}: {}",
            index + 1,
            images.len(),
            image.file_name
        );
        sink.push(QueueUpdate::Started { id: image.id }).await;
        let update = extract_one(backend, project_id, image).await;
        match &update {
            QueueUpdate::Completed { .. } => summary.completed += 1,
            QueueUpdate::Failed { .. } => summary.failed += 1,
            QueueUpdate::Started { .. } => {}
        }
        sink.push(update).await;

        if index + 1 < images.len() && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    info!(
        "Batch finished: {} completed, {} failed.",
        summary.completed, summary.failed
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::test_support::sample_result;
    use std::sync::Mutex;

    struct ScriptedBackend {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn failing(names: &[&'static str]) -> Self {
            Self {
                failing: names.to_vec(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ExtractionBackend for ScriptedBackend {
        async fn extract_containers(
            &self,
            _project_id: &str,
            image: &UploadedImage,
        ) -> Result<ExtractionResult, ReviewError> {
            self.calls.lock().unwrap().push(image.file_name.clone());
            if self.failing.contains(&image.file_name.as_str()) {
                Err(ReviewError::ExtractionFailed("HTTP error! status: 500".into()))
            } else {
                Ok(sample_result(&format!("remote-{}", image.file_name), &[&["S1", "S2"]]))
            }
        }
    }

    fn uploads(names: &[&str]) -> Vec<UploadedImage> {
        names
            .iter()
            .map(|n| UploadedImage::from_bytes(*n, vec![0u8; 4]))
            .collect()
    }

    #[tokio::test]
    async fn failing_image_does_not_abort_the_batch() {
        let images = uploads(&["1.jpg", "2.jpg", "3.jpg"]);
        let mut queue = ImageQueue::default();
        queue.enqueue_all(images.clone());
        let backend = ScriptedBackend::failing(&["2.jpg"]);

        let summary = run_sequentially(&backend, "p-1", &images, Duration::ZERO, &mut queue).await;

        assert_eq!(summary, BatchSummary { completed: 2, failed: 1 });
        let statuses: Vec<_> = queue.images().iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![ImageStatus::Completed, ImageStatus::Error, ImageStatus::Completed]
        );
        assert_eq!(
            queue.get(images[1].id).unwrap().error_message.as_deref(),
            Some("Extraction failed: HTTP error! status: 500")
        );
        assert_eq!(*backend.calls.lock().unwrap(), vec!["1.jpg", "2.jpg", "3.jpg"]);
        assert!(queue.is_batch_complete());
    }

    #[test]
    fn retry_leaves_other_images_alone() {
        let images = uploads(&["1.jpg", "2.jpg", "3.jpg"]);
        let (first, third) = (images[0].id, images[2].id);
        let mut queue = ImageQueue::default();
        queue.enqueue_all(images);

        queue.start(first).unwrap();
        queue
            .complete(first, Arc::new(sample_result("r-1", &[&["OLD"]])))
            .unwrap();
        queue.start(third).unwrap();

        queue.begin_retry(first).unwrap();
        let retried = queue.get(first).unwrap();
        assert_eq!(retried.status, ImageStatus::Processing);
        assert!(retried.retrying && retried.is_read_only() && retried.in_carousel());

        let applied = queue
            .complete(first, Arc::new(sample_result("r-1b", &[&["NEW", "NEW2"]])))
            .unwrap();
        assert_eq!(applied, Applied::Completed { was_retry: true });

        let third_img = queue.get(third).unwrap();
        assert_eq!(third_img.status, ImageStatus::Processing);
        assert!(third_img.extraction.is_none());

        let first_img = queue.get(first).unwrap();
        assert!(!first_img.retrying);
        assert_eq!(first_img.remote_image_id(), Some("r-1b"));
        assert_eq!(first_img.grid.as_ref().unwrap().get(1, 1).unwrap().serial_number, "NEW");
    }

    struct RetryBackend;

    impl ExtractionBackend for RetryBackend {
        async fn extract_containers(
            &self,
            _project_id: &str,
            image: &UploadedImage,
        ) -> Result<ExtractionResult, ReviewError> {
            let serial = format!("{}-NEW", image.file_name);
            Ok(sample_result(
                &format!("retry-{}", image.file_name),
                &[&[serial.as_str(), "X"], &["Y", serial.as_str()]],
            ))
        }
    }

    #[tokio::test]
    async fn concurrent_retries_land_on_their_own_images() {
        let images = uploads(&["a.jpg", "b.jpg", "c.jpg"]);
        let (a, b, c) = (images[0].id, images[1].id, images[2].id);
        let mut queue = ImageQueue::default();
        queue.enqueue_all(images);
        for (id, remote) in [(a, "r-a"), (b, "r-b")] {
            queue.start(id).unwrap();
            queue.complete(id, Arc::new(sample_result(remote, &[&["OLD"]]))).unwrap();
        }
        queue.start(c).unwrap();

        let source_a = queue.begin_retry(a).unwrap();
        let source_b = queue.begin_retry(b).unwrap();
        let backend = RetryBackend;
        let (update_a, update_b) = tokio::join!(
            extract_one(&backend, "p-1", &source_a),
            extract_one(&backend, "p-1", &source_b),
        );

        assert_eq!(queue.apply_update(update_b), Ok(Applied::Completed { was_retry: true }));
        assert!(queue.get(a).unwrap().retrying);
        assert_eq!(queue.get(a).unwrap().remote_image_id(), Some("r-a"));
        assert_eq!(queue.apply_update(update_a), Ok(Applied::Completed { was_retry: true }));

        for (id, name) in [(a, "a.jpg"), (b, "b.jpg")] {
            let image = queue.get(id).unwrap();
            assert!(!image.retrying);
            assert_eq!(image.status, ImageStatus::Completed);
            assert_eq!(image.attempts, 2);
            assert_eq!(image.remote_image_id(), Some(format!("retry-{}", name).as_str()));
            let grid = image.grid.as_ref().unwrap();
            assert_eq!((grid.rows(), grid.columns()), (2, 2));
            assert_eq!(grid.get(1, 1).unwrap().serial_number, format!("{}-NEW", name));
            assert_eq!(grid.get(2, 2).unwrap().serial_number, format!("{}-NEW", name));
        }

        let untouched = queue.get(c).unwrap();
        assert_eq!(untouched.status, ImageStatus::Processing);
        assert_eq!(untouched.attempts, 1);
        assert!(!untouched.retrying && untouched.extraction.is_none());
        assert_eq!(queue.carousel_ids(), vec![a, b]);
    }

    #[test]
    fn error_image_can_be_retried() {
        let images = uploads(&["a.png"]);
        let id = images[0].id;
        let mut queue = ImageQueue::default();
        queue.enqueue_all(images);
        queue.start(id).unwrap();
        queue.fail(id, "boom".into()).unwrap();
        assert!(!queue.get(id).unwrap().in_carousel());

        let source = queue.begin_retry(id).unwrap();
        assert_eq!(source.file_name, "a.png");
        assert_eq!(queue.get(id).unwrap().error_message, None);
        assert_eq!(queue.get(id).unwrap().attempts, 2);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let images = uploads(&["a.png"]);
        let id = images[0].id;
        let mut queue = ImageQueue::default();
        queue.enqueue_all(images);

        assert!(matches!(
            queue.complete(id, Arc::new(sample_result("x", &[&["A"]]))),
            Err(TransitionError::Invalid { from: ImageStatus::Pending, .. })
        ));
        assert!(queue.begin_retry(id).is_err());
        let stranger = ImageId::new();
        assert_eq!(queue.start(stranger), Err(TransitionError::UnknownImage(stranger)));
    }

    #[test]
    fn late_result_for_removed_image_is_rejected() {
        let images = uploads(&["a.png", "b.png"]);
        let (a, b) = (images[0].id, images[1].id);
        let mut queue = ImageQueue::default();
        queue.enqueue_all(images);
        queue.start(a).unwrap();
        queue.remove(a);

        let err = queue
            .apply_update(QueueUpdate::Failed { id: a, message: "late".into() })
            .unwrap_err();
        assert_eq!(err, TransitionError::UnknownImage(a));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.images()[0].id, b);
    }

    #[test]
    fn mutations_replace_the_list() {
        let images = uploads(&["a.png", "b.png"]);
        let a = images[0].id;
        let mut queue = ImageQueue::default();
        queue.enqueue_all(images);
        let before = queue.snapshot();

        queue.start(a).unwrap();

        assert_eq!(before[0].status, ImageStatus::Pending);
        assert_eq!(queue.images()[0].status, ImageStatus::Processing);
        assert_eq!(queue.images()[1].id, before[1].id);
    }

    #[test]
    fn stats_cover_completed_images_only() {
        let images = uploads(&["a.png", "b.png", "c.png"]);
        let ids: Vec<_> = images.iter().map(|i| i.id).collect();
        let mut queue = ImageQueue::default();
        queue.enqueue_all(images);
        for id in &ids {
            queue.start(*id).unwrap();
        }
        queue.complete(ids[0], Arc::new(sample_result("a", &[&["A", "B"]]))).unwrap();
        queue.fail(ids[1], "nope".into()).unwrap();

        let stats = queue.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.total_containers, 2);
        assert_eq!(stats.average_confidence, 90);
        assert!(!queue.is_batch_complete());
    }

    #[test]
    fn supported_extensions() {
        assert!(is_supported_image(Path::new("/tmp/label.JPG")));
        assert!(is_supported_image(Path::new("pallet.webp")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert_eq!(UploadedImage::from_bytes("x.png", vec![]).mime, "image/png");
    }
}
