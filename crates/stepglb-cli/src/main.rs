//! stepglb CLI - batch STEP to GLB converter
//!
//! Converts every `.stp`/`.step` file in a directory (the working directory
//! by default) into a `.glb` file next to it.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::env;
use std::path::{Path, PathBuf};
use stepglb::{
    run_batch_with, BatchEvent, ConfigOverrides, ConversionMode, ConvertConfig, StepKernel,
};

#[derive(Parser)]
#[command(name = "stepglb", version)]
#[command(about = "Convert STEP assemblies into binary glTF scenes", long_about = None)]
struct Cli {
    /// Directory to scan (default: current directory)
    dir: Option<PathBuf>,

    /// Scene layout
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// TOML file with conversion settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum chordal deviation, in STEP length units
    #[arg(long)]
    linear_deflection: Option<f64>,

    /// Maximum angular deviation, in radians
    #[arg(long)]
    angular_deflection: Option<f64>,

    /// Factor from STEP length units to meters
    #[arg(long)]
    unit_scale: Option<f64>,

    /// Keep materials single-sided
    #[arg(long)]
    no_double_sided: bool,

    /// Log per-occurrence and kernel details
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// One node per occurrence, shared meshes
    Occurrence,
    /// Everything merged into one mesh
    SingleShape,
}

impl From<ModeArg> for ConversionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Occurrence => ConversionMode::Occurrence,
            ModeArg::SingleShape => ConversionMode::SingleShape,
        }
    }
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            mode: self.mode.map(Into::into),
            unit_scale_to_meters: self.unit_scale,
            linear_deflection: self.linear_deflection,
            angular_deflection: self.angular_deflection,
            force_double_sided: self.no_double_sided.then_some(false),
            rezero: None,
        }
    }

    /// Config file values, then flags on top.
    fn resolve_config(&self) -> Result<ConvertConfig> {
        let file = match &self.config {
            Some(path) => ConfigOverrides::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ConfigOverrides::default(),
        };
        let config = file.merge(self.overrides()).apply(ConvertConfig::default());
        config.validate()?;
        tracing::debug!(
            mode = %config.mode,
            unit_scale = config.unit_scale_to_meters,
            linear_deflection = config.linear_deflection,
            angular_deflection = ?config.angular_deflection,
            double_sided = config.force_double_sided,
            rezero = config.rezero,
            "resolved configuration"
        );
        Ok(config)
    }
}

fn mode_label(mode: ConversionMode) -> &'static str {
    match mode {
        ConversionMode::Occurrence => "occurrence-shape",
        ConversionMode::SingleShape => "single-shape",
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.resolve_config()?;
    let dir = match &cli.dir {
        Some(dir) => dir.clone(),
        None => env::current_dir().context("resolving working directory")?,
    };

    println!("Scanning for STEP files in: {}", dir.display());
    let mode = config.mode;
    let report = run_batch_with(&StepKernel::new(), &dir, &config, |event| match event {
        BatchEvent::Started { input, output } => println!(
            "Converting ({} mode): {} → {}",
            mode_label(mode),
            file_name(input),
            file_name(output)
        ),
        BatchEvent::Finished(outcome) => match &outcome.result {
            Ok(summary) => {
                if mode == ConversionMode::Occurrence {
                    println!("Occurrence shapes exported: {}", summary.instances);
                }
                println!("✅ Converted: {}", file_name(&outcome.output));
            }
            Err(err) => {
                println!("❌ Failed: {}", file_name(&outcome.input));
                println!("   Reason: {err}");
            }
        },
    })
    .with_context(|| format!("scanning {}", dir.display()))?;

    if report.is_empty() {
        println!("No STEP files found in this directory.");
        return Ok(());
    }

    println!(
        "All conversions completed ({} converted, {} failed).",
        report.converted(),
        report.failed()
    );
    Ok(())
}
