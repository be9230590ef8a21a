//! Error types for the publish pipeline.
//!
//! Variants split into two classes. Hard errors abort the whole run: the
//! pipeline cannot decide how to treat a file, or the document tree itself is
//! malformed. Soft errors only fail the file they belong to and end up in the
//! [`PublishReport`](crate::publish::PublishReport).
//!
//! The type is `Clone` because a single upload outcome is shared by every
//! document that references the same path.

/// Errors produced while publishing or checking documentation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("content type not understood: {path}")]
    UnknownContentType { path: String },

    #[error("cannot read {path}: {message}")]
    Read { path: String, message: String },

    #[error("file name has to start with {root}/: {arg}")]
    InvalidPath { root: String, arg: String },

    #[error("reference cycle: {}", chain.join(" -> "))]
    ReferenceCycle { chain: Vec<String> },

    #[error("cannot list {root}: {message}")]
    Walk { root: String, message: String },

    #[error("invalid reference pattern: {0}")]
    Pattern(String),

    #[error("cannot upload {path} - {message}")]
    Store { path: String, message: String },

    #[error("{path}: reference {reference} could not be resolved")]
    UnresolvedReference { path: String, reference: String },

    #[error("{path}: unrecognized blob url {url}")]
    UnrecognizedBlobUrl { path: String, url: String },
}

impl PublishError {
    /// Whether this error aborts the entire run instead of a single file.
    pub fn is_fatal(&self) -> bool {
        match self {
            PublishError::UnknownContentType { .. }
            | PublishError::Read { .. }
            | PublishError::InvalidPath { .. }
            | PublishError::ReferenceCycle { .. }
            | PublishError::Walk { .. }
            | PublishError::Pattern(_) => true,
            PublishError::Store { .. }
            | PublishError::UnresolvedReference { .. }
            | PublishError::UnrecognizedBlobUrl { .. } => false,
        }
    }
}

impl From<regex::Error> for PublishError {
    fn from(e: regex::Error) -> Self {
        PublishError::Pattern(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_soft() {
        let err = PublishError::Store {
            path: "/a.md".into(),
            message: "503".into(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "cannot upload /a.md - 503");
    }

    #[test]
    fn cycle_message_lists_chain() {
        let err = PublishError::ReferenceCycle {
            chain: vec!["/static/a.css".into(), "/static/b.css".into(), "/static/a.css".into()],
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "reference cycle: /static/a.css -> /static/b.css -> /static/a.css"
        );
    }
}
