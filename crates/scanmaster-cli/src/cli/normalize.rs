// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `scanmaster normalize`: run the normalization pipeline over many files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use scanmaster_batch::{ScanRequest, ScanService};
use scanmaster_core::PipelineOptions;
use scanmaster_document::{PipelineOutcome, RasterImage};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// JPEG quality of normalized pages.
const OUTPUT_JPEG_QUALITY: u8 = 95;

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Input image files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory receiving one JPEG per successful input
    #[arg(long)]
    pub out_dir: PathBuf,

    /// Skip contrast, sharpening, and denoise
    #[arg(long)]
    pub no_enhance: bool,

    /// Skip boundary detection and rectification
    #[arg(long)]
    pub no_crop: bool,

    /// Maximum number of images processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Cancel whatever is unfinished after this many milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Downscale results whose longer side exceeds this many pixels
    #[arg(long, default_value_t = 1920)]
    pub max_side: u32,

    /// JSON configuration file
    #[arg(long, env = "SCANMASTER_CONFIG")]
    pub config: Option<PathBuf>,
}

pub async fn run(args: NormalizeArgs) -> Result<()> {
    let mut config = super::load_config(args.config.as_deref())?;
    if let Some(limit) = args.concurrency {
        config.batch.concurrency_limit = limit;
    }
    if let Some(ms) = args.deadline_ms {
        config.batch.deadline_ms = Some(ms);
    }
    config.validate().context("invalid settings")?;

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let options = PipelineOptions::new(!args.no_enhance, !args.no_crop);
    let requests: Vec<ScanRequest> = super::read_inputs(&args.inputs)
        .await?
        .into_iter()
        .map(|data| ScanRequest::new(data, options))
        .collect();

    let service = ScanService::new(&config);
    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt_handler(cancel.clone());
    let report = service.normalize_batch(requests, cancel).await;
    interrupt.abort();

    let names = output_names(&args.inputs);
    let pages = report
        .into_results()
        .into_iter()
        .zip(args.inputs.iter().zip(names))
        .map(|(result, (input, name))| Page {
            input: input.clone(),
            output: args.out_dir.join(name),
            outcome: result.outcome,
        });
    let failed = write_pages(pages, args.max_side).await;

    if failed > 0 {
        bail!("{failed} of {} inputs failed", args.inputs.len());
    }
    Ok(())
}

/// One batch result paired with where it came from and where it goes.
struct Page {
    input: PathBuf,
    output: PathBuf,
    outcome: scanmaster_core::error::Result<PipelineOutcome>,
}

/// Write every successful page; returns how many pages failed, counting
/// pages that normalized but could not be encoded or written.
async fn write_pages(pages: impl IntoIterator<Item = Page>, max_side: u32) -> usize {
    let mut failed = 0usize;
    for Page { input, output, outcome } in pages {
        let written = match outcome {
            Ok(outcome) => {
                let cropped = outcome.cropped();
                write_page(outcome.image, max_side, &output)
                    .await
                    .map(|()| cropped)
            }
            Err(err) => Err(err.into()),
        };
        match written {
            Ok(cropped) => {
                info!(input = %input.display(), output = %output.display(), cropped, "Page written")
            }
            Err(err) => {
                failed += 1;
                warn!(input = %input.display(), error = %format!("{err:#}"), "Page failed");
                eprintln!("{}: {err:#}", input.display());
            }
        }
    }
    failed
}

async fn write_page(image: RasterImage, max_side: u32, path: &Path) -> Result<()> {
    let bytes = image
        .fit_within(max_side)
        .to_jpeg_bytes(OUTPUT_JPEG_QUALITY)
        .context("failed to encode page")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

/// `<stem>.jpg` for each input, suffixed with the input position when two
/// inputs share a stem.
fn output_names(inputs: &[PathBuf]) -> Vec<String> {
    let mut seen = HashSet::new();
    inputs
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let stem = file_stem(path);
            if seen.insert(stem.clone()) {
                format!("{stem}.jpg")
            } else {
                format!("{stem}-{index}.jpg")
            }
        })
        .collect()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string())
}

/// Cancel the batch on Ctrl-C; in-flight pages stop at their next stage.
fn spawn_interrupt_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining pages");
            cancel.cancel();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanmaster_core::{ProcessingError, StageStatus};
    use scanmaster_document::PixelFormat;

    fn normalized(width: u32, height: u32) -> scanmaster_core::error::Result<PipelineOutcome> {
        let image = RasterImage::from_raw(
            width,
            height,
            PixelFormat::Gray,
            vec![128; (width * height) as usize],
        )?;
        Ok(PipelineOutcome {
            image,
            crop: StageStatus::FellBack,
            enhance: StageStatus::Applied,
            boundary: None,
        })
    }

    #[tokio::test]
    async fn write_failure_does_not_stop_later_pages() {
        let dir = std::env::temp_dir().join(format!("scanmaster-pages-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let pages = vec![
            Page {
                input: PathBuf::from("a.png"),
                output: dir.join("missing").join("a.jpg"),
                outcome: normalized(8, 8),
            },
            Page {
                input: PathBuf::from("b.png"),
                output: dir.join("b.jpg"),
                outcome: Err(ProcessingError::Decode("truncated".into())),
            },
            Page {
                input: PathBuf::from("c.png"),
                output: dir.join("c.jpg"),
                outcome: normalized(40, 20),
            },
        ];
        let failed = write_pages(pages, 16).await;

        assert_eq!(failed, 2);
        let written = RasterImage::from_bytes(&tokio::fs::read(dir.join("c.jpg")).await.unwrap()).unwrap();
        assert_eq!(written.dimensions(), (16, 8));
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn duplicate_stems_get_index_suffix() {
        let inputs = vec![
            PathBuf::from("a/page.jpg"),
            PathBuf::from("b/page.png"),
            PathBuf::from("cover.heic"),
        ];
        assert_eq!(
            output_names(&inputs),
            vec!["page.jpg", "page-1.jpg", "cover.jpg"]
        );
    }
}
