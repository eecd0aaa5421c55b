// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for ScanMaster.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all ScanMaster operations.
///
/// Every batch item that fails carries one of these, so the variants are
/// grouped by the pipeline stage that raised them.
#[derive(Debug, Error)]
pub enum ProcessingError {
    // -- Input --
    #[error("failed to decode image: {0}")]
    Decode(String),

    // -- Geometry --
    #[error("no document boundary found")]
    GeometryNotFound,

    #[error("rectification failed: {0}")]
    Rectification(String),

    // -- Enhancement / output --
    #[error("enhancement failed: {0}")]
    Enhancement(String),

    #[error("canvas composition failed: {0}")]
    Canvas(String),

    #[error("image encoding failed: {0}")]
    Encode(String),

    // -- Collaborators --
    #[error("OCR failed: {0}")]
    Ocr(String),

    // -- Scheduling --
    #[error("cancelled before completion")]
    Cancelled,

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Machine-readable discriminant of a [`ProcessingError`].
///
/// This is what crosses the service boundary; the `Display` text of the error
/// is for logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DecodeError,
    GeometryNotFound,
    RectificationError,
    EnhancementError,
    CanvasError,
    EncodeError,
    OcrError,
    Cancelled,
    Internal,
    ConfigError,
    IoError,
}

impl ErrorKind {
    /// Whether an error of this kind terminates processing of the item.
    ///
    /// A missing boundary is an expected photographic condition and the
    /// pipeline passes the original image through instead.
    pub fn is_fatal_for_item(&self) -> bool {
        !matches!(self, Self::GeometryNotFound)
    }
}

impl ProcessingError {
    /// Machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::GeometryNotFound => ErrorKind::GeometryNotFound,
            Self::Rectification(_) => ErrorKind::RectificationError,
            Self::Enhancement(_) => ErrorKind::EnhancementError,
            Self::Canvas(_) => ErrorKind::CanvasError,
            Self::Encode(_) => ErrorKind::EncodeError,
            Self::Ocr(_) => ErrorKind::OcrError,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::WorkerPanicked(_) => ErrorKind::Internal,
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Io(_) => ErrorKind::IoError,
            Self::Serialization(_) => ErrorKind::ConfigError,
        }
    }

    /// Shorthand for `self.kind() == ErrorKind::Cancelled`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ProcessingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_each_stage() {
        assert_eq!(
            ProcessingError::Decode("bad magic".into()).kind(),
            ErrorKind::DecodeError
        );
        assert_eq!(
            ProcessingError::Enhancement("16-bit".into()).kind(),
            ErrorKind::EnhancementError
        );
        assert_eq!(ProcessingError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            ProcessingError::WorkerPanicked("boom".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn only_geometry_not_found_is_recoverable() {
        assert!(!ErrorKind::GeometryNotFound.is_fatal_for_item());
        assert!(ErrorKind::DecodeError.is_fatal_for_item());
        assert!(ErrorKind::Cancelled.is_fatal_for_item());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RectificationError).unwrap();
        assert_eq!(json, "\"rectification_error\"");
    }
}
