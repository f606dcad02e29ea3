use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use hazard_redact_core::detection::infrastructure::model_provider::ModelProvider;
use hazard_redact_core::detection::infrastructure::onnx_models::shared_onnx_provider;
use hazard_redact_core::imaging::infrastructure::image_file_reader::ImageFileReader;
use hazard_redact_core::imaging::infrastructure::image_file_writer::ImageFileWriter;
use hazard_redact_core::pipeline::infrastructure::batch_redactor::{
    BatchJob, BatchOutcome, BatchRedactor,
};
use hazard_redact_core::pipeline::privacy_protector::{
    FallbackMode, PrivacyProtector, ProtectionSummary,
};
use hazard_redact_core::pipeline::redaction_config::RedactionConfig;
use hazard_redact_core::shared::constants::IMAGE_EXTENSIONS;

const REDACTED_SUFFIX: &str = "-redacted";

/// Blur faces, heads and license plates in road hazard photos.
#[derive(Parser)]
#[command(name = "hazard-redact")]
struct Cli {
    /// Input image files or directories of images.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file (single input image only).
    #[arg(short, long, conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Directory for redacted images. Defaults to writing `<name>-redacted.<ext>`
    /// next to each input.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// JSON file with pipeline settings; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Face model (.onnx) to use instead of the cached download.
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// COCO object model (.onnx) for people and vehicles.
    #[arg(long)]
    object_model: Option<PathBuf>,

    /// Skip the learned detectors and rely on the classical fallbacks.
    #[arg(long)]
    no_models: bool,

    /// Images redacted in parallel (default: one per CPU).
    #[arg(long)]
    workers: Option<usize>,

    /// Detection confidence threshold for both models (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Skin-tone face fallback: disabled, when-empty or always.
    #[arg(long)]
    skin_fallback: Option<FallbackMode>,

    /// Edge-based plate fallback: disabled, when-empty or always.
    #[arg(long)]
    plate_fallback: Option<FallbackMode>,

    /// Print one JSON object per image instead of text.
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = build_config(&cli)?;
    let jobs = collect_jobs(&cli)?;
    if jobs.is_empty() {
        return Err("No images found in the given inputs".into());
    }

    let models: Arc<dyn ModelProvider> = shared_onnx_provider(&config.models);
    let redactor = match cli.workers {
        Some(n) => BatchRedactor::with_workers(n),
        None => BatchRedactor::default(),
    };

    let total = jobs.len();
    let outcomes = redactor.run(
        jobs,
        Box::new(ImageFileReader::new()),
        Box::new(ImageFileWriter::new()),
        || PrivacyProtector::new(Arc::clone(&models), &config),
    );

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(summary) => report(outcome, summary, cli.json)?,
            Err(e) => {
                failed += 1;
                eprintln!("{}: {e}", outcome.job.input.display());
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {total} image(s) could not be redacted").into());
    }
    Ok(())
}

fn report(
    outcome: &BatchOutcome,
    summary: &ProtectionSummary,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let line = serde_json::json!({
            "input": outcome.job.input,
            "output": outcome.job.output,
            "summary": summary,
        });
        println!("{}", serde_json::to_string(&line)?);
    } else {
        println!(
            "{} -> {}: {} face(s), {} person(s), {} vehicle(s), {} region(s) blurred",
            outcome.job.input.display(),
            outcome.job.output.display(),
            summary.faces_detected,
            summary.people_detected,
            summary.vehicles_detected,
            summary.total_blurred
        );
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<RedactionConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => RedactionConfig::load(path)?,
        None => RedactionConfig::default(),
    };

    if cli.no_models {
        config.models.enabled = false;
    }
    if let Some(path) = &cli.face_model {
        config.models.face_model = Some(path.clone());
    }
    if let Some(path) = &cli.object_model {
        config.models.object_model = Some(path.clone());
    }
    if let Some(confidence) = cli.confidence {
        config.models.face_confidence = confidence;
        config.models.object_confidence = confidence;
    }
    if let Some(mode) = cli.skin_fallback {
        config.fallback.skin = mode;
    }
    if let Some(mode) = cli.plate_fallback {
        config.fallback.plates = mode;
    }

    config.validate()?;
    Ok(config)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
    }
    if cli.output.is_some() && (cli.inputs.len() != 1 || cli.inputs[0].is_dir()) {
        return Err("--output needs exactly one input image; use --output-dir for batches".into());
    }
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("Confidence must be between 0.0 and 1.0, got {confidence}").into());
        }
    }
    if cli.workers == Some(0) {
        return Err("Workers must be at least 1".into());
    }
    for model in [&cli.face_model, &cli.object_model].into_iter().flatten() {
        if !model.exists() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    Ok(())
}

/// Expands directories (non-recursively) and pairs every image with its output path.
fn collect_jobs(cli: &Cli) -> Result<Vec<BatchJob>, Box<dyn std::error::Error>> {
    let mut jobs = Vec::new();
    for input in &cli.inputs {
        let images = if input.is_dir() {
            images_in(input)?
        } else if is_image(input) {
            vec![input.clone()]
        } else {
            return Err(format!("Not a supported image: {}", input.display()).into());
        };
        for image in images {
            let output = match (&cli.output, &cli.output_dir) {
                (Some(output), _) => output.clone(),
                (None, dir) => output_path_for(&image, dir.as_deref()),
            };
            jobs.push(BatchJob {
                input: image,
                output,
            });
        }
    }
    Ok(jobs)
}

fn images_in(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) && !is_redacted(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn output_path_for(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    match output_dir {
        Some(dir) => dir.join(input.file_name().unwrap_or(input.as_os_str())),
        None => {
            let stem = input.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
            let name = match input.extension() {
                Some(ext) => format!("{stem}{REDACTED_SUFFIX}.{}", ext.to_string_lossy()),
                None => format!("{stem}{REDACTED_SUFFIX}"),
            };
            input.with_file_name(name)
        }
    }
}

/// Earlier outputs written next to their inputs.
fn is_redacted(path: &Path) -> bool {
    path.file_stem()
        .map(|s| s.to_string_lossy().ends_with(REDACTED_SUFFIX))
        .unwrap_or(false)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
