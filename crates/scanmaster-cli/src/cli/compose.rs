// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `scanmaster compose`: lay several images onto one long canvas.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use scanmaster_core::CanvasMode;
use scanmaster_document::{CanvasCompositor, RasterImage};
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Input image files, in canvas order
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output file
    #[arg(long)]
    pub out: PathBuf,

    /// Use a grid instead of a vertical strip
    #[arg(long)]
    pub grid: bool,

    /// Grid column count
    #[arg(long, requires = "grid")]
    pub columns: Option<u32>,

    /// Gap between images in pixels
    #[arg(long)]
    pub spacing: Option<u32>,

    /// Background colour as RRGGBB or RRGGBBAA hex
    #[arg(long, value_parser = parse_rgba)]
    pub background: Option<[u8; 4]>,

    /// JSON configuration file
    #[arg(long, env = "SCANMASTER_CONFIG")]
    pub config: Option<PathBuf>,
}

pub async fn run(args: ComposeArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let mut layout = config.canvas;
    if args.grid {
        layout.mode = CanvasMode::Grid;
    }
    if let Some(columns) = args.columns {
        layout.columns = columns;
    }
    if let Some(spacing) = args.spacing {
        layout.spacing = spacing;
    }
    if let Some(background) = args.background {
        layout.background = background;
    }

    let mut images = Vec::with_capacity(args.inputs.len());
    for (path, data) in args.inputs.iter().zip(super::read_inputs(&args.inputs).await?) {
        let image = RasterImage::from_bytes(&data)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        images.push(image);
    }

    let canvas = CanvasCompositor::new(layout).compose(&images)?;
    let format = canvas.format();
    let matches_extension = args
        .out
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ext.eq_ignore_ascii_case(format.extension())
                || (format.extension() == "jpg" && ext.eq_ignore_ascii_case("jpeg"))
        });
    if !matches_extension {
        warn!(
            out = %args.out.display(),
            format = format.mime_type(),
            "Output extension does not match the encoded format"
        );
    }

    let bytes = canvas.encode()?;
    tokio::fs::write(&args.out, &bytes)
        .await
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    let (width, height) = canvas.dimensions();
    info!(
        out = %args.out.display(),
        width,
        height,
        format = format.mime_type(),
        bytes = bytes.len(),
        "Canvas written"
    );
    Ok(())
}

/// Parse `RRGGBB` (opaque) or `RRGGBBAA`, with an optional leading `#`.
fn parse_rgba(raw: &str) -> std::result::Result<[u8; 4], String> {
    let hex = raw.trim().trim_start_matches('#');
    if !matches!(hex.len(), 6 | 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("expected RRGGBB or RRGGBBAA hex, got {raw:?}"));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
    let alpha = if hex.len() == 8 { channel(6)? } else { u8::MAX };
    Ok([channel(0)?, channel(2)?, channel(4)?, alpha])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_hex_parsing() {
        assert_eq!(parse_rgba("ffffff00").unwrap(), [255, 255, 255, 0]);
        assert_eq!(parse_rgba("#102030").unwrap(), [16, 32, 48, 255]);
        assert!(parse_rgba("fff").is_err());
        assert!(parse_rgba("gg0000").is_err());
    }
}
