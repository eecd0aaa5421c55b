// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommand definitions and dispatch.

pub mod compose;
pub mod normalize;
#[cfg(feature = "ocr")]
pub mod ocr;

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scanmaster_core::AppConfig;
use tracing::info;

/// Normalize photographed documents and compose them into long images.
#[derive(Parser, Debug)]
#[command(name = "scanmaster")]
#[command(version)]
#[command(about = "Detect, flatten, and enhance photographed paper documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crop, rectify, and enhance each input image
    Normalize(normalize::NormalizeArgs),

    /// Stack images onto one strip or grid canvas
    Compose(compose::ComposeArgs),

    /// Recognise text on each input image
    #[cfg(feature = "ocr")]
    Ocr(ocr::OcrArgs),
}

pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Normalize(args) => normalize::run(args).await,
        Commands::Compose(args) => compose::run(args).await,
        #[cfg(feature = "ocr")]
        Commands::Ocr(args) => ocr::run(args).await,
    }
}

/// Defaults, overlaid with the JSON file at `path` when given.
pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let config = AppConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => Ok(AppConfig::default()),
    }
}

/// Read every input file, failing on the first unreadable one.
pub(crate) async fn read_inputs(paths: &[std::path::PathBuf]) -> Result<Vec<Vec<u8>>> {
    let mut data = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        data.push(bytes);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_normalize_flags() {
        let cli = Cli::try_parse_from([
            "scanmaster",
            "normalize",
            "a.jpg",
            "b.jpg",
            "--out-dir",
            "out",
            "--no-crop",
            "--concurrency",
            "3",
            "--deadline-ms",
            "5000",
        ])
        .unwrap();
        let Commands::Normalize(args) = cli.command else {
            panic!("expected normalize");
        };
        assert_eq!(args.inputs.len(), 2);
        assert!(args.no_crop);
        assert!(!args.no_enhance);
        assert_eq!(args.concurrency, Some(3));
        assert_eq!(args.deadline_ms, Some(5000));
        assert_eq!(args.max_side, 1920);
    }

    #[test]
    fn parses_compose_grid() {
        let cli = Cli::try_parse_from([
            "scanmaster",
            "compose",
            "a.png",
            "--out",
            "long.png",
            "--grid",
            "--columns",
            "3",
            "--background",
            "ff000080",
        ])
        .unwrap();
        let Commands::Compose(args) = cli.command else {
            panic!("expected compose");
        };
        assert!(args.grid);
        assert_eq!(args.columns, Some(3));
        assert_eq!(args.background, Some([255, 0, 0, 128]));
    }

    #[test]
    fn missing_inputs_are_rejected() {
        assert!(Cli::try_parse_from(["scanmaster", "normalize", "--out-dir", "out"]).is_err());
    }
}
