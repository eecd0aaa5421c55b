// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `scanmaster ocr`: recognise text on each input with the ocrs engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use scanmaster_batch::{ScanRequest, ScanService};
use scanmaster_core::{LanguageTag, PipelineOptions};
use scanmaster_document::{OcrsFactory, RecognizerRegistry};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Args, Debug)]
pub struct OcrArgs {
    /// Input image files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Language tag selecting the model directory (defaults to the configured one)
    #[arg(long)]
    pub lang: Option<String>,

    /// Directory holding `<lang>/text-detection.rten` and
    /// `<lang>/text-recognition.rten`
    #[arg(long, env = "SCANMASTER_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Crop and enhance each page before recognition
    #[arg(long)]
    pub normalize: bool,

    /// JSON configuration file
    #[arg(long, env = "SCANMASTER_CONFIG")]
    pub config: Option<PathBuf>,
}

pub async fn run(args: OcrArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let model_root = args.model_dir.or_else(|| config.ocr.model_dir.clone());
    let registry = Arc::new(RecognizerRegistry::new(OcrsFactory::new(model_root)));
    let service = ScanService::new(&config).with_recognizers(registry);

    let images = super::read_inputs(&args.inputs).await?;
    let language = args.lang.as_deref().map(LanguageTag::new);
    let outcomes: Vec<_> = if args.normalize {
        let requests = images
            .into_iter()
            .map(|data| ScanRequest::new(data, PipelineOptions::default()))
            .collect();
        service
            .scan_batch(requests, language, CancellationToken::new())
            .await
            .into_results()
            .into_iter()
            .map(|result| result.outcome.map(|scanned| scanned.text))
            .collect()
    } else {
        service
            .ocr_batch(images, language, CancellationToken::new())
            .await
            .into_results()
            .into_iter()
            .map(|result| result.outcome)
            .collect()
    };

    let mut failed = 0usize;
    for (outcome, input) in outcomes.into_iter().zip(&args.inputs) {
        match outcome {
            Ok(text) => println!("== {}\n{}", input.display(), text.text),
            Err(err) => {
                failed += 1;
                warn!(input = %input.display(), kind = ?err.kind(), error = %err, "Recognition failed");
                eprintln!("{}: {err}", input.display());
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} inputs failed", args.inputs.len());
    }
    Ok(())
}
