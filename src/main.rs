use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use roman_ocr_rust::{init_tracing, Config, EncodedImage, PredictionService};

/// Recognize hand-drawn Roman numerals (I–X).
#[derive(Debug, Parser)]
#[command(name = "roman-ocr", version)]
struct Args {
    /// JSON file with model paths
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Primary 10-class ONNX model
    #[arg(long)]
    primary: Option<PathBuf>,
    /// Secondary II/V ONNX model
    #[arg(long, conflicts_with = "no_secondary")]
    secondary: Option<PathBuf>,
    /// Skip II/V disambiguation
    #[arg(long)]
    no_secondary: bool,
    /// Image files, or text files holding base64 / data URIs
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

impl Args {
    fn config(&self) -> roman_ocr_rust::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(primary) = &self.primary {
            config.primary_model = Some(primary.clone());
        }
        if let Some(secondary) = &self.secondary {
            config.secondary_model = Some(secondary.clone());
        }
        if self.no_secondary {
            config.secondary_model = None;
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let config = match args.config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };
    let service = PredictionService::from_config(&config);

    for path in &args.images {
        let prediction = match fs::read(path) {
            Ok(bytes) => service.predict(EncodedImage::sniff(bytes)),
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot read image");
                roman_ocr_rust::Prediction::failed()
            }
        };
        println!("{}: {prediction}", path.display());
    }
    ExitCode::SUCCESS
}
