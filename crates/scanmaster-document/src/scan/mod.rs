// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline: boundary detection, perspective rectification,
// enhancement, and the text recognition seam.

pub mod detect;
pub mod enhance;
pub mod ocr;
pub mod pipeline;
pub mod rectify;

pub use detect::{BoundaryDetector, DetectionResult};
pub use enhance::ImageEnhancer;
pub use ocr::{RecognizedText, RecognizerFactory, RecognizerRegistry, TextRecognizer, TextSpan};
pub use pipeline::{Checkpoint, NeverCancelled, NormalizationPipeline, PipelineOutcome};
pub use rectify::PerspectiveRectifier;

#[cfg(feature = "ocr")]
pub use ocr::{OcrConfig, OcrsFactory, OcrsRecognizer};
