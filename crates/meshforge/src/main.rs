//! Meshforge launcher.
//!
//! Two mutually exclusive entry points over the same job invoker: `watch`
//! observes the model/reference directories and dispatches jobs for complete
//! pairs; `batch` runs a manifest sequentially and reports the aggregate.
//!
//! Fatal errors exit with a distinguishing code (2 configuration, 3 worker
//! unavailable) so the external supervisor can tell restart-worthy failures
//! from clean shutdown.

use clap::{Args, Parser, Subcommand, ValueEnum};
use meshforge_core::{
    run_manifest, BatchConfig, ForgeError, ManifestMode, WatchConfig, WorkerConfig,
};
use meshforge_invoker::WorkerInvoker;
use meshforge_logging::LogConfig;
use meshforge_sentinel::{NotifyEventSource, WatchDispatcher};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "meshforge", about = "Automation layer for an external 3D render worker")]
struct Cli {
    /// Mirror info/debug logging to stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the model and reference directories, dispatching a job whenever
    /// a same-named pair is complete
    Watch {
        /// Directory receiving model files
        #[arg(long)]
        models: PathBuf,

        /// Directory receiving reference images
        #[arg(long)]
        references: PathBuf,

        /// Output root; each pair renders into a subdirectory named after
        /// its stem
        #[arg(long)]
        output: PathBuf,

        /// Accepted model extension, in priority order (repeatable;
        /// default: fbx, obj, dae)
        #[arg(long = "model-ext")]
        model_exts: Vec<String>,

        /// Accepted reference extension, in priority order (repeatable;
        /// default: png, jpg, jpeg)
        #[arg(long = "reference-ext")]
        reference_exts: Vec<String>,

        #[command(flatten)]
        worker: WorkerOpts,
    },

    /// Run every entry of a pipe-delimited manifest sequentially
    Batch {
        /// Manifest file, one entry per line
        #[arg(long)]
        manifest: PathBuf,

        /// Output directory for all entries
        #[arg(long)]
        output: PathBuf,

        /// Entry shape: prompt|description|referencePath or
        /// modelPath|referencePath
        #[arg(long, value_enum, default_value = "generate")]
        mode: Mode,

        /// Model type hint forwarded to the worker for generation entries
        /// (e.g. weapon, prop, character)
        #[arg(long = "type")]
        model_type: Option<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        worker: WorkerOpts,
    },
}

/// Worker options shared by both entry points.
#[derive(Args, Debug, Clone)]
struct WorkerOpts {
    /// Worker program: an explicit path or a name resolved on PATH
    #[arg(long, default_value = "blender")]
    worker: PathBuf,

    /// Argument placed before the job arguments, e.g. for a
    /// `blender --background --python render.py --` wrapper (repeatable)
    #[arg(long = "worker-arg")]
    worker_args: Vec<String>,

    /// Ask the worker not to save a scene file
    #[arg(long)]
    no_save: bool,

    /// Ask the worker not to export a model
    #[arg(long)]
    no_export: bool,

    /// Ask the worker not to render a preview
    #[arg(long)]
    no_render: bool,
}

impl WorkerOpts {
    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::new(self.worker.clone()).with_prefix_args(self.worker_args.clone())
    }

    fn extra_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.no_save {
            flags.push("--no-save".to_string());
        }
        if self.no_export {
            flags.push("--no-export".to_string());
        }
        if self.no_render {
            flags.push("--no-render".to_string());
        }
        flags
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Mode {
    Generate,
    Process,
}

impl From<Mode> for ManifestMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Generate => ManifestMode::Generate,
            Mode::Process => ManifestMode::Process,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = meshforge_logging::init_logging(LogConfig {
        app_name: "meshforge",
        verbose: cli.verbose,
    }) {
        eprintln!("Failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(command: Commands) -> Result<(), ForgeError> {
    match command {
        Commands::Watch {
            models,
            references,
            output,
            model_exts,
            reference_exts,
            worker,
        } => run_watch(models, references, output, model_exts, reference_exts, worker),
        Commands::Batch {
            manifest,
            output,
            mode,
            model_type,
            json,
            worker,
        } => run_batch(manifest, output, mode, model_type, json, worker),
    }
}

fn run_watch(
    models: PathBuf,
    references: PathBuf,
    output: PathBuf,
    model_exts: Vec<String>,
    reference_exts: Vec<String>,
    worker: WorkerOpts,
) -> Result<(), ForgeError> {
    // Worker availability is checked once here; the dispatcher never enters
    // observation without a resolvable worker.
    let invoker = WorkerInvoker::resolve(&worker.worker_config())?;

    let mut config = WatchConfig::new(models, references, output);
    if !model_exts.is_empty() {
        config.model_extensions = model_exts;
    }
    if !reference_exts.is_empty() {
        config.reference_extensions = reference_exts;
    }
    config.extra_flags = worker.extra_flags();

    let mut dispatcher = WatchDispatcher::new(&config, invoker)?;
    let source = NotifyEventSource::subscribe(&[
        config.models_dir.as_path(),
        config.references_dir.as_path(),
    ])?;

    let (stop_tx, stop_rx) = mpsc::channel();
    install_signal_handler(stop_tx)?;

    info!(
        models = %config.models_dir.display(),
        references = %config.references_dir.display(),
        output = %config.output_dir.display(),
        "Watching for model/reference pairs"
    );
    dispatcher.run_with_shutdown(source, stop_rx)
}

fn run_batch(
    manifest: PathBuf,
    output: PathBuf,
    mode: Mode,
    model_type: Option<String>,
    json: bool,
    worker: WorkerOpts,
) -> Result<(), ForgeError> {
    let mut invoker = WorkerInvoker::resolve(&worker.worker_config())?;

    let mut config = BatchConfig::new(manifest, output, mode.into());
    config.extra_flags = batch_flags(&worker, model_type);

    let run = run_manifest(&mut invoker, &config)?;

    if json {
        match serde_json::to_string_pretty(&run) {
            Ok(text) => println!("{text}"),
            Err(err) => warn!(%err, "Failed to render JSON summary"),
        }
    } else {
        println!(
            "Batch complete: {}/{} succeeded ({} failed)",
            run.succeeded,
            run.total,
            run.failed()
        );
    }
    // Per-entry failures are reported in the summary; only fatal errors
    // change the exit code.
    Ok(())
}

/// Pass-through flags for a batch run: suppression flags plus the optional
/// model type hint.
fn batch_flags(worker: &WorkerOpts, model_type: Option<String>) -> Vec<String> {
    let mut flags = worker.extra_flags();
    if let Some(kind) = model_type {
        flags.push("--type".to_string());
        flags.push(kind);
    }
    flags
}

#[cfg(unix)]
fn install_signal_handler(stop_tx: mpsc::Sender<()>) -> Result<(), ForgeError> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {sig}, finishing in-flight job before stopping");
            let _ = stop_tx.send(());
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handler(stop_tx: mpsc::Sender<()>) -> Result<(), ForgeError> {
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|err| ForgeError::Configuration(format!("cannot install signal handler: {err}")))?;
    Ok(())
}
