use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use speech_emotion::batch::{self, BatchReport, FileOutcome};
use speech_emotion::config::Config;
use speech_emotion::emotion::{PredictionResult, Predictor};
use speech_emotion::model::{load_model, EmotionModel, LoadPath, ModelCache};
use speech_emotion::server::{self, AppState};

/// Speech emotion recognition from WAV files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.ser/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict the emotion of a WAV file or of every WAV file in a directory
    Predict(PredictArgs),
    /// Load the model and describe it
    Info {
        /// Model file (overrides config)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Start the HTTP interface
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// WAV file, or directory with --directory
    input: Option<PathBuf>,

    /// Treat INPUT as a directory of WAV files
    #[arg(short, long)]
    directory: bool,

    /// Model file (overrides config)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Run over the bundled example clips
    #[arg(long, conflicts_with = "input")]
    examples: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Fail the batch if any file fails
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Model file (overrides config)
    #[arg(short, long)]
    model: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Predict(args) => predict(&config, args),
        Command::Info { model } => info_command(&config, model),
        Command::Serve(args) => serve(&config, args),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {:?}", path);
            }
            path.to_path_buf()
        }
        None => match Config::default_config_path() {
            Ok(path) => path,
            Err(e) => {
                warn!("{}; using default configuration", e);
                return Ok(Config::default());
            }
        },
    };
    debug!("Loading config from {:?}", path);
    Config::load(&path).context("Failed to load configuration")
}

fn resolve_model_path(config: &Config, explicit: Option<PathBuf>) -> Result<PathBuf> {
    let config = Config {
        model_path: explicit.or_else(|| config.model_path.clone()),
        ..config.clone()
    };
    config
        .get_model_path()
        .context("No model file; pass --model or place it under the models directory")
}

fn predict(config: &Config, args: PredictArgs) -> Result<ExitCode> {
    let (input, is_dir) = if args.examples {
        (config.examples_path(), true)
    } else {
        match args.input {
            Some(input) => {
                let is_dir = args.directory || input.is_dir();
                (input, is_dir)
            }
            None => bail!("No input given; pass a WAV file, a directory with --directory, or --examples"),
        }
    };

    if !input.exists() {
        bail!("Input not found: {:?}", input);
    }

    let model_path = resolve_model_path(config, args.model)?;
    info!("Model: {:?}", model_path);
    let model = ModelCache::global()
        .get_or_load(&model_path)
        .with_context(|| format!("Failed to load model {:?}", model_path))?;
    let predictor = Predictor::new(model)?;

    if !is_dir {
        let result = predictor
            .predict(&input)
            .with_context(|| format!("Prediction failed for {:?}", input))?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_result(&result);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = batch::predict_directory(&predictor, &input)
        .with_context(|| format!("Cannot read directory {:?}", input))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.outcomes.is_empty() {
        warn!("No WAV files found in {:?}", input);
    }
    Ok(if report.is_success(args.strict) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn info_command(config: &Config, model: Option<PathBuf>) -> Result<ExitCode> {
    let model_path = resolve_model_path(config, model)?;
    let model = load_model(&model_path)?;

    println!("Model:        {}", model.source().display());
    println!("Input shape:  {}", model.input_shape());
    println!("Output width: {}", model.output_width());
    match model.load_path() {
        LoadPath::Direct => println!("Loaded:       directly"),
        LoadPath::Fallback {
            loaded,
            skipped,
            zeroed,
        } => {
            println!(
                "Loaded:       reference architecture ({} tensors loaded, {} skipped)",
                loaded, skipped
            );
            if !zeroed.is_empty() {
                println!("Zero weights: {}", zeroed.join(", "));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn serve(config: &Config, args: ServeArgs) -> Result<ExitCode> {
    let model_path = resolve_model_path(config, args.model)?;
    let model = ModelCache::global()
        .get_or_load(&model_path)
        .with_context(|| format!("Failed to load model {:?}", model_path))?;
    let predictor = Arc::new(Predictor::new(model)?);

    let host = args.host.unwrap_or_else(|| config.host.clone());
    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let examples_dir = config.examples_path();
    if !examples_dir.is_dir() {
        warn!("Examples directory {:?} does not exist", examples_dir);
    }
    let state = AppState::new(predictor, examples_dir);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime
        .block_on(server::serve(addr, state, config.max_upload_bytes))
        .context("Server error")?;
    Ok(ExitCode::SUCCESS)
}

fn print_result(result: &PredictionResult) {
    println!("File:       {}", result.file.display());
    println!(
        "Emotion:    {} ({:.1}%)",
        result.pred_label,
        result.confidence * 100.0
    );
    println!();
    for (label, p) in result.ranked() {
        let bar = "#".repeat((p * 40.0).round() as usize);
        println!("  {:<10} {:>5.1}%  {}", label, p * 100.0, bar);
    }
}

fn print_report(report: &BatchReport) {
    for outcome in &report.outcomes {
        let name = outcome
            .file()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| outcome.file().display().to_string());
        match outcome {
            FileOutcome::Ok(result) => println!(
                "{:<40} {:<10} {:>5.1}%",
                name,
                result.pred_label,
                result.confidence * 100.0
            ),
            FileOutcome::Error { error, .. } => println!("{:<40} ERROR      {}", name, error),
        }
    }

    println!();
    println!(
        "{} succeeded, {} failed in {}",
        report.succeeded,
        report.failed,
        report.directory.display()
    );
    for (label, count) in &report.histogram {
        println!("  {:<10} {:>3}  ({:.1}%)", label, count.count, count.percent);
    }
}
