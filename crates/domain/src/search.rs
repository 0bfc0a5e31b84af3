use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Fixed user-facing message for any failure that happens before a response
/// arrives; the underlying transport detail is deliberately not surfaced.
pub const NETWORK_FAILURE_MESSAGE: &str =
    "Network error. Please check your connection and try again.";

/// Opaque reference (URL) to one similar image, in the backend's rank order.
/// Duplicates are allowed and preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultImageRef(String);

impl ResultImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

impl Display for ResultImageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a search attempt failed, normalized to the two shapes the UI reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFailure {
    /// No response was received at all (DNS, refused connection, broken
    /// stream, unreadable success body).
    Network,
    /// The backend answered with a non-2xx status.
    Service { status: u16, message: String },
}

impl Display for SearchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => f.write_str(NETWORK_FAILURE_MESSAGE),
            Self::Service { message, .. } => f.write_str(message),
        }
    }
}

impl std::error::Error for SearchFailure {}

/// Lifecycle of the one search the session may have outstanding. Exactly one
/// value is live at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Loading,
    Succeeded(Vec<ResultImageRef>),
    Failed(SearchFailure),
}

impl SearchState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// The current result list; empty for every state except a non-empty
    /// success.
    pub fn results(&self) -> &[ResultImageRef] {
        match self {
            Self::Succeeded(results) => results,
            _ => &[],
        }
    }
}

impl Default for SearchState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Counters reported by the background search pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchMetrics {
    pub submitted_jobs: u64,
    pub completed_jobs: u64,
    pub canceled_jobs: u64,
    pub last_roundtrip_ms: Option<u64>,
    pub p95_roundtrip_ms: Option<u64>,
}
