// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanmaster-document: Document geometry and image normalization.
//
// Finds a photographed page's outer quadrilateral, flattens it with a
// homography, enhances the result, and composes finished pages onto a single
// canvas. Text recognition is reached through the `TextRecognizer` seam.

pub mod canvas;
pub mod geometry;
pub mod image;
pub mod scan;

pub use self::canvas::{Canvas, CanvasCompositor, CanvasFormat};
pub use self::geometry::{Homography, Point2D, Quadrilateral, order_corners};
pub use self::image::{PixelFormat, RasterImage};
pub use self::scan::{
    BoundaryDetector, Checkpoint, DetectionResult, ImageEnhancer, NeverCancelled,
    NormalizationPipeline, PerspectiveRectifier, PipelineOutcome, RecognizedText,
    RecognizerFactory, RecognizerRegistry, TextRecognizer, TextSpan,
};

#[cfg(feature = "ocr")]
pub use self::scan::{OcrConfig, OcrsFactory, OcrsRecognizer};
