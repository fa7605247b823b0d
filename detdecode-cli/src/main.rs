use clap::Parser;
use detdecode::{
    load_predictions, Backend, DecodeConfig, Decoder, DetectionBox, DeviceConfig, HostDevice,
    PredictionView,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Detection decode CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BackendConfig {
    Sequential,
    Parallel,
}

impl From<BackendConfig> for Backend {
    fn from(value: BackendConfig) -> Self {
        match value {
            BackendConfig::Sequential => Backend::Sequential,
            BackendConfig::Parallel => Backend::Parallel,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DecodeConfigJson {
    confidence_threshold: f32,
    nms_threshold: f32,
    max_objects: usize,
    backend: BackendConfig,
}

impl Default for DecodeConfigJson {
    fn default() -> Self {
        let cfg = DecodeConfig::default();
        Self {
            confidence_threshold: cfg.confidence_threshold,
            nms_threshold: cfg.nms_threshold,
            max_objects: cfg.max_objects,
            backend: BackendConfig::Sequential,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeviceConfigJson {
    memory_limit: Option<usize>,
    pinned_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    prediction_path: String,
    cols: usize,
    output_path: Option<String>,
    decode: DecodeConfigJson,
    device: DeviceConfigJson,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prediction_path: String::new(),
            cols: 85,
            output_path: None,
            decode: DecodeConfigJson::default(),
            device: DeviceConfigJson::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct BoxRecord {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    confidence: f32,
    label: usize,
}

impl From<DetectionBox> for BoxRecord {
    fn from(value: DetectionBox) -> Self {
        Self {
            left: value.left,
            top: value.top,
            right: value.right,
            bottom: value.bottom,
            confidence: value.confidence,
            label: value.label,
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    count: usize,
    boxes: Vec<BoxRecord>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("detdecode=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.prediction_path.is_empty() {
        return Err("prediction_path must be set in the config".into());
    }

    let predictions = load_predictions(&config.prediction_path)?;
    let view = PredictionView::from_flat(&predictions, config.cols)?;
    tracing::info!(rows = view.rows(), cols = view.cols(), "loaded predictions");

    let device = HostDevice::with_config(DeviceConfig {
        memory_limit: config.device.memory_limit,
        pinned_limit: config.device.pinned_limit,
    });
    let decoder = Decoder::with_device(
        DecodeConfig {
            confidence_threshold: config.decode.confidence_threshold,
            nms_threshold: config.decode.nms_threshold,
            max_objects: config.decode.max_objects,
            backend: config.decode.backend.into(),
        },
        device,
    );

    let boxes = decoder.decode_view(view)?;
    let output = Output {
        count: boxes.len(),
        boxes: boxes.into_iter().map(BoxRecord::from).collect(),
    };
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
