use thiserror::Error;

/// Errors raised by the encode/decode pipeline, the renderer and capture glue.
#[derive(Error, Debug)]
pub enum AvError {
    /// The codec session could not be created; the owning instance is unusable.
    #[error("session creation failed: {0}")]
    SessionCreation(String),

    /// A single unit could not be submitted to (or processed by) the session.
    #[error("submission failed: {0}")]
    Submission(String),

    /// Bad start code or length framing, truncated parameter sets, and similar.
    #[error("malformed bitstream: {0}")]
    MalformedBitstream(String),

    /// A slice arrived before any parameter sets.
    #[error("decoder not configured: {0}")]
    NotConfigured(String),

    /// The stream uses a feature the pipeline does not handle.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An image does not match the renderer's backing store.
    #[error(
        "resize mismatch: image is {image_width}x{image_height}, backing store is {store_width}x{store_height}"
    )]
    ResizeMismatch {
        /// Width of the image presented
        image_width: u32,
        /// Height of the image presented
        image_height: u32,
        /// Width of the backing store
        store_width: u32,
        /// Height of the backing store
        store_height: u32,
    },

    /// A config field is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The instance hit a fatal error earlier and rejects further work.
    #[error("instance unusable: {0}")]
    Unusable(String),

    /// The instance was stopped.
    #[error("instance stopped")]
    Closed,

    /// The capture source failed.
    #[error("capture error: {0}")]
    Capture(String),
}

/// Coarse classification of [`AvError`] used for propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// [`AvError::SessionCreation`]
    SessionCreationFailure,
    /// [`AvError::Submission`]
    SubmissionFailure,
    /// [`AvError::MalformedBitstream`] and [`AvError::NotConfigured`]
    MalformedBitstream,
    /// [`AvError::UnsupportedFormat`]
    UnsupportedFormat,
    /// [`AvError::ResizeMismatch`]
    ResizeMismatch,
    /// [`AvError::InvalidConfig`]
    InvalidConfig,
    /// Unusable or stopped instances and capture failures
    Lifecycle,
}

impl AvError {
    /// The kind this error is propagated as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AvError::SessionCreation(_) => ErrorKind::SessionCreationFailure,
            AvError::Submission(_) => ErrorKind::SubmissionFailure,
            AvError::MalformedBitstream(_) | AvError::NotConfigured(_) => {
                ErrorKind::MalformedBitstream
            }
            AvError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            AvError::ResizeMismatch { .. } => ErrorKind::ResizeMismatch,
            AvError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            AvError::Unusable(_) | AvError::Closed | AvError::Capture(_) => ErrorKind::Lifecycle,
        }
    }

    /// True for errors that leave the reporting instance in its terminal
    /// state. Only a session that cannot be built does that; an unsupported
    /// format is fatal by being returned from a constructor, and per-unit
    /// errors of any kind are reported and skipped.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::SessionCreationFailure
    }
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, AvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(AvError::SessionCreation("no encoder".into()).is_fatal());
        assert!(!AvError::UnsupportedFormat("B slices".into()).is_fatal());
        assert!(!AvError::Submission("busy".into()).is_fatal());

        let err = AvError::NotConfigured("slice before SPS".into());
        assert_eq!(err.kind(), ErrorKind::MalformedBitstream);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_resize_mismatch_message() {
        let err = AvError::ResizeMismatch {
            image_width: 320,
            image_height: 240,
            store_width: 640,
            store_height: 480,
        };
        assert_eq!(
            err.to_string(),
            "resize mismatch: image is 320x240, backing store is 640x480"
        );
    }
}
