use pixseek_domain::{
    PreviewImage, PreviewTicket, ResultImageRef, SearchFailure, SearchMetrics, SelectedImage,
};

use crate::ApplicationError;

/// One submission to the search pipeline. The token is allocated by the
/// session, strictly increasing across submissions, and travels back with
/// the delivery so stale results can be told apart from current ones.
#[derive(Debug, Clone)]
pub struct SearchJob {
    pub token: u64,
    pub image: SelectedImage,
}

/// The outcome of one search round trip.
#[derive(Debug, Clone)]
pub struct SearchDelivery {
    pub token: u64,
    pub outcome: Result<Vec<ResultImageRef>, SearchFailure>,
    pub roundtrip_ms: u64,
}

/// The one network operation this application performs: submit an image,
/// receive ranked references to similar images.
pub trait SearchBackend: Send + Sync {
    fn search_similar(&self, image: &SelectedImage) -> Result<Vec<ResultImageRef>, SearchFailure>;
}

/// Fetches the bytes behind a result reference so the grid can show real
/// thumbnails. A failure here only degrades one grid cell.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, reference: &ResultImageRef) -> Result<Vec<u8>, SearchFailure>;
}

/// Transport between the session and the backend call running off the UI
/// thread. Submissions never block; deliveries are polled.
pub trait SearchPipeline {
    fn submit(&self, job: SearchJob) -> Result<(), ApplicationError>;

    fn try_receive(&self) -> Result<Option<SearchDelivery>, ApplicationError>;

    fn metrics(&self) -> Result<SearchMetrics, ApplicationError>;
}

/// Owns decoded preview pixels keyed by ticket. Acquire and release are
/// paired one-to-one by the session; `live_count` exists so that pairing is
/// observable.
pub trait PreviewStore {
    fn acquire(&self, image: &SelectedImage) -> Result<PreviewTicket, ApplicationError>;

    fn release(&self, ticket: PreviewTicket);

    fn preview(&self, ticket: PreviewTicket) -> Option<PreviewImage>;

    fn live_count(&self) -> usize;
}
