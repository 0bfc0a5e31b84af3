use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    UnsupportedMediaType(String),
}

impl Display for DomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedMediaType(mime) => write!(f, "unsupported media type: {mime}"),
        }
    }
}

impl std::error::Error for DomainError {}
