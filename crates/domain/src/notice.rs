#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    Info,
    Error,
}

/// A dismissible, user-facing message. Every failure the session catches is
/// converted into one of these; none propagate further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub title: String,
    pub detail: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: NoticeSeverity::Info,
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn error(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: NoticeSeverity::Error,
            title: title.into(),
            detail: detail.into(),
        }
    }
}
