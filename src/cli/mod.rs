//! CLI Module
//!
//! Command-line interface for the model workbench core.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::view::Size;

/// Modelbench - local ML model workbench
#[derive(Parser, Debug)]
#[command(name = "modelbench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the settings record
    #[arg(long, global = true)]
    pub settings_dir: Option<PathBuf>,

    /// Directory of module manifests
    #[arg(long, global = true)]
    pub manifests_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report availability and variants of every module
    #[command(name = "scan")]
    Scan {
        /// Models folder (overrides the configured one)
        models_dir: Option<PathBuf>,
    },

    /// Group weight file names into variants
    #[command(name = "variants")]
    Variants {
        /// File names, e.g. model.onnx model_fp16.onnx
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Compute a contain-fit rectangle
    #[command(name = "fit")]
    Fit {
        /// Display box, WxH
        #[arg(long, value_parser = parse_size)]
        display: Size,

        /// Native asset size, WxH
        #[arg(long, value_parser = parse_size)]
        native: Size,
    },

    /// Print the persisted settings record
    #[command(name = "settings")]
    Settings,

    /// Download a module's model files
    #[command(name = "download")]
    Download {
        /// Module id, e.g. Xenova/modnet
        module: String,

        /// Models folder (overrides the configured one)
        #[arg(short, long)]
        models_dir: Option<PathBuf>,
    },
}

/// Parse `WxH` (e.g. `640x480`)
pub fn parse_size(s: &str) -> std::result::Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{}'", s))?;
    let width: f64 = w.trim().parse().map_err(|_| format!("invalid width '{}'", w))?;
    let height: f64 = h.trim().parse().map_err(|_| format!("invalid height '{}'", h))?;
    if width < 0.0 || height < 0.0 {
        return Err("sizes must not be negative".to_string());
    }
    Ok(Size::new(width, height))
}
