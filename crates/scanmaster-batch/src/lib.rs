// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanmaster-batch: concurrent fan-out/fan-in of per-image operations.
//
// `BatchOrchestrator` is generic over the item operation; `ScanService`
// binds it to normalization, enhancement, cropping, OCR, and the combined
// normalize-then-recognise scan.

pub mod orchestrator;
pub mod service;

pub use orchestrator::{
    BatchItem, BatchOrchestrator, BatchReport, BatchResult, CancellationCheckpoint,
};
pub use service::{ScanRequest, ScanService, ScannedDocument};
