// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use examcut_core::config::{DetectionConfig, OcrEngineKind, RemoteProvider};

#[derive(Debug, Parser)]
#[command(
    name = "examcut",
    version,
    about = "Extract exam questions from scanned documents into cropped images"
)]
pub struct Cli {
    /// Data directory holding the database, crops and settings
    /// (default: $XDG_DATA_HOME/examcut)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Detection settings file (default: config.json in the data directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a PDF or a directory of page images
    Import {
        path: PathBuf,
    },
    /// Extract questions from a document, importing it first if needed
    Extract(ExtractArgs),
    /// List documents, or the questions of one document
    List {
        /// Document id or unique id prefix
        document: Option<String>,
    },
    /// Mark a question as checked by a person
    Verify {
        /// Question id or unique id prefix
        question: String,
        /// Clear the mark instead
        #[arg(long)]
        undo: bool,
    },
    /// Replace a question's boundary and re-crop it
    Correct(CorrectArgs),
    /// Show the edge biases learned from corrections
    Learn {
        /// Document id or prefix; all documents when omitted
        document: Option<String>,
        /// Freeze the learned biases into the settings file. Later runs use
        /// them as fixed padding instead of learning per run
        #[arg(long)]
        save: bool,
    },
    /// Show accuracy metrics derived from verification and corrections
    Metrics {
        /// Document id or prefix; all documents when omitted
        document: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy a document's crops into a folder with readable names
    Export(ExportArgs),
    /// Delete a document with its questions, corrections and crops
    Delete {
        document: String,
    },
}

#[derive(Debug, Args)]
pub struct PageSource {
    /// Directory of pre-rendered page images (page_001.png, ...).
    /// Defaults to the document path when it is such a directory
    #[arg(long, value_name = "DIR")]
    pub pages: Option<PathBuf>,

    /// Resolution the page images were scanned or rendered at
    #[arg(long, default_value_t = 300)]
    pub source_dpi: u32,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// PDF, page image directory, or the id of an imported document
    pub source: String,

    #[command(flatten)]
    pub pages: PageSource,

    /// Recognition engine
    #[arg(long, value_enum)]
    pub engine: Option<EngineArg>,

    /// Resolution pages are processed at
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Treat every page as a single column
    #[arg(long)]
    pub single_column: bool,

    /// Ignore learned edge biases for this run
    #[arg(long)]
    pub no_learning: bool,

    /// Directory holding the ocrs model files
    #[arg(long, value_name = "DIR")]
    pub models: Option<PathBuf>,

    /// Store the effective settings for later runs
    #[arg(long)]
    pub save_config: bool,
}

#[derive(Debug, Args)]
pub struct CorrectArgs {
    /// Question id or unique id prefix
    pub question: String,

    /// New boundary as left,top,right,bottom in the question's page space
    #[arg(long = "box", value_name = "L,T,R,B", value_parser = parse_box)]
    pub bounds: [i32; 4],

    #[command(flatten)]
    pub pages: PageSource,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Document id or unique id prefix
    pub document: String,

    /// Destination folder
    pub destination: PathBuf,

    /// File name prefix
    #[arg(long, default_value = "soru")]
    pub prefix: String,

    /// Group files into page_N folders
    #[arg(long)]
    pub per_page: bool,

    /// Also bundle the files into one zip archive
    #[arg(long)]
    pub zip: bool,

    /// JPEG quality (0-100); defaults to the configured export quality
    #[arg(long)]
    pub quality: Option<u8>,

    /// Only export verified questions
    #[arg(long)]
    pub verified_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineArg {
    Fast,
    Accurate,
    Hybrid,
    Openai,
    Gemini,
}

impl From<EngineArg> for OcrEngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Fast => OcrEngineKind::LocalFast,
            EngineArg::Accurate => OcrEngineKind::LocalAccurate,
            EngineArg::Hybrid => OcrEngineKind::Hybrid,
            EngineArg::Openai => OcrEngineKind::RemoteVision(RemoteProvider::OpenAi),
            EngineArg::Gemini => OcrEngineKind::RemoteVision(RemoteProvider::Gemini),
        }
    }
}

impl ExtractArgs {
    /// Apply the flags given on the command line over `config`.
    pub fn apply_to(&self, mut config: DetectionConfig) -> DetectionConfig {
        if let Some(engine) = self.engine {
            config.ocr_engine = engine.into();
        }
        if let Some(dpi) = self.dpi {
            config.render_dpi = dpi;
        }
        if self.single_column {
            config.multi_column = false;
        }
        if self.no_learning {
            config.adaptive_learning = false;
        }
        config
    }
}

fn parse_box(value: &str) -> Result<[i32; 4], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected four comma-separated numbers, got `{value}`"));
    }
    let mut edges = [0i32; 4];
    for (edge, part) in edges.iter_mut().zip(parts) {
        *edge = part
            .parse()
            .map_err(|_| format!("`{part}` is not a whole number"))?;
    }
    Ok(edges)
}
