pub mod http;
pub mod pipeline;
pub mod presenters;
pub mod preview;

pub use http::{HttpSearchBackend, MockSearchBackend};
pub use pipeline::{BackgroundImageLoader, BackgroundSearchPipeline, LoadedResultImage};
pub use presenters::{
    present_metrics, present_result_row, present_results, ResultsView, LOADING_SLOT_COUNT,
};
pub use preview::{decode_rgba, DecodedPreviewStore};
