// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan service: the per-image operations offered to callers, each available
// for one image or as an order-preserving batch.

use std::sync::Arc;

use scanmaster_core::config::AppConfig;
use scanmaster_core::error::{ProcessingError, Result};
use scanmaster_core::types::{LanguageTag, PipelineOptions};
use scanmaster_document::{
    Checkpoint, NormalizationPipeline, PipelineOutcome, RasterImage, RecognizedText,
    RecognizerRegistry,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::orchestrator::{BatchOrchestrator, BatchReport};

/// Encoded image bytes plus the stages requested for them.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub data: Vec<u8>,
    pub options: PipelineOptions,
}

impl ScanRequest {
    pub fn new(data: Vec<u8>, options: PipelineOptions) -> Self {
        Self { data, options }
    }
}

/// A normalized page together with the text recognised on it.
#[derive(Debug, Clone)]
pub struct ScannedDocument {
    pub outcome: PipelineOutcome,
    pub text: RecognizedText,
}

/// Entry point for scan processing.
///
/// Cheap to clone; the pipeline and recogniser registry are shared.
#[derive(Debug, Clone)]
pub struct ScanService {
    pipeline: Arc<NormalizationPipeline>,
    orchestrator: BatchOrchestrator,
    recognizers: Option<Arc<RecognizerRegistry>>,
    default_language: LanguageTag,
}

impl ScanService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            pipeline: Arc::new(NormalizationPipeline::from_config(config)),
            orchestrator: BatchOrchestrator::from_settings(&config.batch),
            recognizers: None,
            default_language: config.ocr.default_language.clone(),
        }
    }

    /// Attach the recogniser registry used by [`ocr_batch`](Self::ocr_batch).
    pub fn with_recognizers(mut self, registry: Arc<RecognizerRegistry>) -> Self {
        self.recognizers = Some(registry);
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: BatchOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }

    /// Normalize one image on the calling thread.
    #[instrument(skip_all, fields(data_len = data.len()))]
    pub fn process_one(&self, data: &[u8], options: PipelineOptions) -> Result<PipelineOutcome> {
        self.pipeline.process_bytes(data, options)
    }

    /// Run the normalization pipeline over each request.
    pub async fn normalize_batch(
        &self,
        requests: Vec<ScanRequest>,
        cancel: CancellationToken,
    ) -> BatchReport<PipelineOutcome> {
        info!(items = requests.len(), "Normalize batch submitted");
        let pipeline = Arc::clone(&self.pipeline);
        self.orchestrator
            .run_with_cancel(
                requests,
                move |request: ScanRequest, checkpoint: &dyn Checkpoint| {
                    let image = RasterImage::from_bytes(&request.data)?;
                    pipeline.run_with_checkpoint(image, request.options, checkpoint)
                },
                cancel,
            )
            .await
    }

    /// Enhancement only, no boundary detection.
    pub async fn enhance_batch(
        &self,
        images: Vec<Vec<u8>>,
        cancel: CancellationToken,
    ) -> BatchReport<RasterImage> {
        info!(items = images.len(), "Enhance batch submitted");
        let pipeline = Arc::clone(&self.pipeline);
        self.orchestrator
            .run_with_cancel(
                images,
                move |data: Vec<u8>, checkpoint: &dyn Checkpoint| {
                    let image = RasterImage::from_bytes(&data)?;
                    checkpoint.check()?;
                    pipeline.enhancer().enhance(&image)
                },
                cancel,
            )
            .await
    }

    /// Boundary detection and rectification only.
    pub async fn crop_batch(
        &self,
        images: Vec<Vec<u8>>,
        cancel: CancellationToken,
    ) -> BatchReport<PipelineOutcome> {
        let requests = images
            .into_iter()
            .map(|data| ScanRequest::new(data, PipelineOptions::crop_only()))
            .collect();
        self.normalize_batch(requests, cancel).await
    }

    /// Normalize each request, then recognise text on the resulting page.
    ///
    /// A missing recogniser fails every item before any pixel work is done.
    pub async fn scan_batch(
        &self,
        requests: Vec<ScanRequest>,
        language: Option<LanguageTag>,
        cancel: CancellationToken,
    ) -> BatchReport<ScannedDocument> {
        let language = language.unwrap_or_else(|| self.default_language.clone());
        info!(items = requests.len(), %language, "Scan batch submitted");
        let pipeline = Arc::clone(&self.pipeline);
        let recognizers = self.recognizers.clone();
        self.orchestrator
            .run_with_cancel(
                requests,
                move |request: ScanRequest, checkpoint: &dyn Checkpoint| {
                    let registry = recognizers.as_deref().ok_or_else(no_recognizer)?;
                    let image = RasterImage::from_bytes(&request.data)?;
                    let outcome = pipeline.run_with_checkpoint(image, request.options, checkpoint)?;
                    checkpoint.check()?;
                    let text = registry.recognize(&outcome.image, &language)?;
                    Ok(ScannedDocument { outcome, text })
                },
                cancel,
            )
            .await
    }

    /// Recognise text on each image with the engine for `language` (or the
    /// configured default). Images are used as decoded; see
    /// [`scan_batch`](Self::scan_batch) to normalize first.
    pub async fn ocr_batch(
        &self,
        images: Vec<Vec<u8>>,
        language: Option<LanguageTag>,
        cancel: CancellationToken,
    ) -> BatchReport<RecognizedText> {
        let language = language.unwrap_or_else(|| self.default_language.clone());
        info!(items = images.len(), %language, "OCR batch submitted");
        let recognizers = self.recognizers.clone();
        self.orchestrator
            .run_with_cancel(
                images,
                move |data: Vec<u8>, checkpoint: &dyn Checkpoint| {
                    let registry = recognizers.as_deref().ok_or_else(no_recognizer)?;
                    let image = RasterImage::from_bytes(&data)?;
                    checkpoint.check()?;
                    registry.recognize(&image, &language)
                },
                cancel,
            )
            .await
    }
}

fn no_recognizer() -> ProcessingError {
    ProcessingError::Ocr("no text recognizer is configured".into())
}
