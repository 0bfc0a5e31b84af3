use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Instant;

use log::debug;
use pixseek_application::{
    ApplicationError, ImageFetcher, SearchBackend, SearchDelivery, SearchJob, SearchPipeline,
};
use pixseek_domain::{PreviewImage, ResultImageRef, SearchFailure, SearchMetrics};

use crate::preview::decode_rgba;

const METRIC_WINDOW_SIZE: usize = 64;

#[derive(Default)]
struct MetricsState {
    submitted_jobs: u64,
    completed_jobs: u64,
    canceled_jobs: u64,
    last_roundtrip_ms: Option<u64>,
    roundtrip_samples_ms: Vec<u64>,
}

impl MetricsState {
    fn snapshot(&self) -> SearchMetrics {
        SearchMetrics {
            submitted_jobs: self.submitted_jobs,
            completed_jobs: self.completed_jobs,
            canceled_jobs: self.canceled_jobs,
            last_roundtrip_ms: self.last_roundtrip_ms,
            p95_roundtrip_ms: percentile_95(&self.roundtrip_samples_ms),
        }
    }

    fn push_roundtrip_sample(&mut self, sample_ms: u64) {
        self.last_roundtrip_ms = Some(sample_ms);
        self.roundtrip_samples_ms.push(sample_ms);
        if self.roundtrip_samples_ms.len() > METRIC_WINDOW_SIZE {
            let drain_count = self.roundtrip_samples_ms.len() - METRIC_WINDOW_SIZE;
            self.roundtrip_samples_ms.drain(0..drain_count);
        }
    }
}

fn percentile_95(samples: &[u64]) -> Option<u64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let index = (((sorted.len() - 1) as f64) * 0.95).round() as usize;
    sorted.get(index).copied()
}

/// Runs backend searches on a worker thread. Submissions carry the session's
/// monotonic token; the worker skips any job that has already been
/// superseded and drops any result that went stale during the round trip, so
/// at most the newest submission's outcome is ever delivered.
pub struct BackgroundSearchPipeline {
    latest_token: Arc<AtomicU64>,
    submit_tx: mpsc::Sender<SearchJob>,
    result_rx: Mutex<mpsc::Receiver<SearchDelivery>>,
    metrics: Arc<Mutex<MetricsState>>,
}

impl BackgroundSearchPipeline {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel::<SearchJob>();
        let (result_tx, result_rx) = mpsc::channel::<SearchDelivery>();
        let latest_token = Arc::new(AtomicU64::new(0));
        let metrics = Arc::new(Mutex::new(MetricsState::default()));

        spawn_search_worker(
            submit_rx,
            result_tx,
            Arc::clone(&latest_token),
            Arc::clone(&metrics),
            backend,
        );

        Self {
            latest_token,
            submit_tx,
            result_rx: Mutex::new(result_rx),
            metrics,
        }
    }
}

impl SearchPipeline for BackgroundSearchPipeline {
    fn submit(&self, job: SearchJob) -> Result<(), ApplicationError> {
        self.latest_token.store(job.token, Ordering::SeqCst);
        {
            let mut metrics = self
                .metrics
                .lock()
                .map_err(|_| ApplicationError::Io("search metrics lock poisoned".to_string()))?;
            metrics.submitted_jobs += 1;
        }
        self.submit_tx
            .send(job)
            .map_err(|error| ApplicationError::Io(format!("failed to enqueue search job: {error}")))
    }

    fn try_receive(&self) -> Result<Option<SearchDelivery>, ApplicationError> {
        let receiver = self
            .result_rx
            .lock()
            .map_err(|_| ApplicationError::Io("search result lock poisoned".to_string()))?;
        match receiver.try_recv() {
            Ok(delivery) => Ok(Some(delivery)),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => Err(ApplicationError::Io(
                "search result channel disconnected".to_string(),
            )),
        }
    }

    fn metrics(&self) -> Result<SearchMetrics, ApplicationError> {
        let metrics = self
            .metrics
            .lock()
            .map_err(|_| ApplicationError::Io("search metrics lock poisoned".to_string()))?;
        Ok(metrics.snapshot())
    }
}

fn spawn_search_worker(
    submit_rx: mpsc::Receiver<SearchJob>,
    result_tx: mpsc::Sender<SearchDelivery>,
    latest_token: Arc<AtomicU64>,
    metrics: Arc<Mutex<MetricsState>>,
    backend: Arc<dyn SearchBackend>,
) {
    thread::spawn(move || {
        while let Ok(mut job) = submit_rx.recv() {
            // Collapse the queue to the newest pending job.
            while let Ok(next) = submit_rx.try_recv() {
                mark_canceled(&metrics, 1);
                job = next;
            }

            if job.token < latest_token.load(Ordering::SeqCst) {
                mark_canceled(&metrics, 1);
                continue;
            }

            let token = job.token;
            let started = Instant::now();
            let outcome = backend.search_similar(&job.image);
            let elapsed = started.elapsed().as_millis() as u64;

            // The selection may have changed while the request was in
            // flight; a stale outcome is dropped here, and the session
            // re-checks the token on receipt.
            if token < latest_token.load(Ordering::SeqCst) {
                mark_canceled(&metrics, 1);
                continue;
            }

            if let Err(failure) = &outcome {
                debug!("search {token} failed after {elapsed}ms: {failure}");
            }
            if result_tx
                .send(SearchDelivery {
                    token,
                    outcome,
                    roundtrip_ms: elapsed,
                })
                .is_err()
            {
                return;
            }

            if let Ok(mut m) = metrics.lock() {
                m.completed_jobs += 1;
                m.push_roundtrip_sample(elapsed);
            }
        }
    });
}

fn mark_canceled(metrics: &Arc<Mutex<MetricsState>>, count: u64) {
    if let Ok(mut m) = metrics.lock() {
        m.canceled_jobs += count;
    }
}

/// A fetched-and-decoded grid thumbnail, or the reason the cell falls back
/// to the placeholder glyph.
#[derive(Debug, Clone)]
pub struct LoadedResultImage {
    pub reference: ResultImageRef,
    pub outcome: Result<PreviewImage, SearchFailure>,
}

/// Fetches result-image bytes off the UI thread and decodes them for the
/// grid. Requests are served in order; one bad URL only affects its own
/// cell.
pub struct BackgroundImageLoader {
    request_tx: mpsc::Sender<ResultImageRef>,
    loaded_rx: Mutex<mpsc::Receiver<LoadedResultImage>>,
}

impl BackgroundImageLoader {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<ResultImageRef>();
        let (loaded_tx, loaded_rx) = mpsc::channel::<LoadedResultImage>();

        thread::spawn(move || {
            while let Ok(reference) = request_rx.recv() {
                let outcome = fetcher.fetch(&reference).and_then(|bytes| {
                    decode_rgba(&bytes).map_err(|error| {
                        debug!("result image {reference} did not decode: {error}");
                        SearchFailure::Network
                    })
                });
                if loaded_tx
                    .send(LoadedResultImage { reference, outcome })
                    .is_err()
                {
                    return;
                }
            }
        });

        Self {
            request_tx,
            loaded_rx: Mutex::new(loaded_rx),
        }
    }

    pub fn request(&self, reference: ResultImageRef) -> Result<(), ApplicationError> {
        self.request_tx
            .send(reference)
            .map_err(|error| ApplicationError::Io(format!("failed to enqueue image load: {error}")))
    }

    pub fn try_receive(&self) -> Result<Option<LoadedResultImage>, ApplicationError> {
        let receiver = self
            .loaded_rx
            .lock()
            .map_err(|_| ApplicationError::Io("image load lock poisoned".to_string()))?;
        match receiver.try_recv() {
            Ok(loaded) => Ok(Some(loaded)),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => Err(ApplicationError::Io(
                "image load channel disconnected".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pixseek_domain::{ImageFormat, SelectedImage};

    use super::*;
    use crate::http::MockSearchBackend;

    struct SlowTaggingBackend {
        delay: Duration,
    }

    impl SearchBackend for SlowTaggingBackend {
        fn search_similar(
            &self,
            image: &SelectedImage,
        ) -> Result<Vec<ResultImageRef>, SearchFailure> {
            thread::sleep(self.delay);
            Ok(vec![ResultImageRef::new(image.name.clone())])
        }
    }

    struct FailingBackend;

    impl SearchBackend for FailingBackend {
        fn search_similar(
            &self,
            _image: &SelectedImage,
        ) -> Result<Vec<ResultImageRef>, SearchFailure> {
            Err(SearchFailure::Service {
                status: 503,
                message: "Search failed: unavailable".to_string(),
            })
        }
    }

    fn job(token: u64, name: &str) -> SearchJob {
        SearchJob {
            token,
            image: SelectedImage::new(name, ImageFormat::Jpeg, vec![1]),
        }
    }

    fn wait_for_delivery(pipeline: &BackgroundSearchPipeline) -> SearchDelivery {
        let deadline = Instant::now() + Duration::from_millis(2000);
        loop {
            if let Some(delivery) = pipeline.try_receive().expect("poll") {
                return delivery;
            }
            assert!(Instant::now() < deadline, "timed out waiting for delivery");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn latest_submission_wins_and_older_jobs_cancel() {
        let pipeline = BackgroundSearchPipeline::new(Arc::new(SlowTaggingBackend {
            delay: Duration::from_millis(30),
        }));

        for token in 1..=4 {
            pipeline
                .submit(job(token, &format!("image-{token}")))
                .expect("submit");
        }

        let delivery = wait_for_delivery(&pipeline);
        assert_eq!(delivery.token, 4);
        assert_eq!(delivery.outcome.expect("success")[0].url(), "image-4");

        let metrics = pipeline.metrics().expect("metrics");
        assert_eq!(metrics.submitted_jobs, 4);
        assert!(metrics.canceled_jobs >= 1);
        assert_eq!(metrics.completed_jobs, 1);
        assert!(metrics.last_roundtrip_ms.is_some());
    }

    #[test]
    fn failures_are_delivered_not_swallowed() {
        let pipeline = BackgroundSearchPipeline::new(Arc::new(FailingBackend));
        pipeline.submit(job(1, "doomed")).expect("submit");

        let delivery = wait_for_delivery(&pipeline);
        assert_eq!(delivery.token, 1);
        match delivery.outcome {
            Err(SearchFailure::Service { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected service failure, got {other:?}"),
        }
    }

    #[test]
    fn loader_decodes_mock_thumbnails_and_reports_bad_ones() {
        let fetcher = Arc::new(MockSearchBackend::with_delay(Duration::from_millis(0)));
        let loader = BackgroundImageLoader::new(fetcher);

        loader
            .request(ResultImageRef::new("https://example.com/ok.png"))
            .expect("request");

        let deadline = Instant::now() + Duration::from_millis(2000);
        let loaded = loop {
            if let Some(loaded) = loader.try_receive().expect("poll") {
                break loaded;
            }
            assert!(Instant::now() < deadline, "timed out waiting for thumbnail");
            thread::sleep(Duration::from_millis(10));
        };

        assert_eq!(loaded.reference.url(), "https://example.com/ok.png");
        let preview = loaded.outcome.expect("decodes");
        assert_eq!(preview.width, 64);
        assert_eq!(preview.height, 64);
        assert_eq!(preview.rgba.len(), 64 * 64 * 4);
    }
}
