mod error;
mod ports;
mod session;

pub use error::ApplicationError;
pub use ports::{ImageFetcher, PreviewStore, SearchBackend, SearchDelivery, SearchJob, SearchPipeline};
pub use session::SearchSession;
