mod error;
mod image;
mod notice;
mod preview;
mod search;

pub use error::DomainError;
pub use image::{ImageFormat, SelectedImage};
pub use notice::{Notice, NoticeSeverity};
pub use preview::{PreviewImage, PreviewTicket};
pub use search::{
    ResultImageRef, SearchFailure, SearchMetrics, SearchState, NETWORK_FAILURE_MESSAGE,
};
