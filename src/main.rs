// THEORY:
// Command-line front end for the `motion_chunks` library. Frames are given as
// arguments or piped in one name per line; flags override a TOML
// configuration file, which overrides the built-in defaults.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use motion_chunks::core_modules::components::DEFAULT_MAX_COMPONENTS;
use motion_chunks::core_modules::{files, imaging};
use motion_chunks::{
    BinaryMask, ConnectedComponents, DetectionPipeline, ParallelSurvey, PipelineConfig,
};
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a frame sequence into chunks of target activity
    Detect(FrameArgs),
    /// List the blobs of every consecutive frame delta, computed in parallel
    Blobs(FrameArgs),
    /// Label a single mask image and print its components
    Label {
        /// Single-channel 8-bit mask image
        mask: PathBuf,
        /// Where to write the label visualization
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_MAX_COMPONENTS)]
        max_components: usize,
    },
}

#[derive(Args)]
struct FrameArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Delta intensity band counted as motion, e.g. `-t 40 60`
    #[arg(short, long, num_args = 2, value_names = ["LOW", "HIGH"])]
    threshold: Option<Vec<u8>>,
    /// Erosion and dilation radii, e.g. `-m 2 20`
    #[arg(short, long, num_args = 2, value_names = ["ERODE", "DILATE"])]
    morphology: Option<Vec<u8>>,
    /// Shrink frames by this factor before differencing
    #[arg(short, long)]
    shrink: Option<u32>,
    /// Prefix for written files
    #[arg(short = 'f', long)]
    prefix: Option<String>,
    #[arg(long)]
    max_components: Option<usize>,
    /// Draw the tracked position on each active frame
    #[arg(long)]
    overlays: bool,
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Frame files; read from stdin when omitted
    frames: Vec<PathBuf>,
}

impl FrameArgs {
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some([low, high]) = self.threshold.as_deref() {
            config.threshold_low = *low;
            config.threshold_high = *high;
        }
        if let Some([erode, dilate]) = self.morphology.as_deref() {
            config.erode = *erode;
            config.dilate = *dilate;
        }
        if let Some(shrink) = self.shrink {
            config.shrink_factor = shrink;
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        if let Some(max) = self.max_components {
            config.max_components = max;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        config.write_overlays |= self.overlays;

        config.validate()?;
        Ok(config)
    }

    fn frames(&self) -> Result<Vec<PathBuf>> {
        let frames = if self.frames.is_empty() {
            files::read_frame_names(io::stdin().lock())?
        } else {
            files::prepare_frames(self.frames.clone())
        };
        if frames.len() < 2 {
            bail!("need at least two readable frames, got {}", frames.len());
        }
        Ok(frames)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect(args) => detect(&args)?,
        Commands::Blobs(args) => blobs(&args).await?,
        Commands::Label {
            mask,
            output,
            max_components,
        } => label(mask, output, max_components)?,
    }
    Ok(())
}

fn detect(args: &FrameArgs) -> Result<()> {
    let config = args.config()?;
    let frames = args.frames()?;
    info!(frames = frames.len(), ?config, "starting detection");

    let mut pipeline = DetectionPipeline::new(config, frames)?;
    pipeline.run()?;
    print!("{}", pipeline.report());
    Ok(())
}

async fn blobs(args: &FrameArgs) -> Result<()> {
    let config = args.config()?;
    let frames = args.frames()?;
    let survey = ParallelSurvey::new(&config, frames)?;
    info!(workers = survey.worker_count(), "starting survey");

    for report in survey.run().await? {
        println!(
            "{} {} -> {}: {} blob(s)",
            report.index,
            report.previous.display(),
            report.current.display(),
            report.blobs.len()
        );
        for blob in &report.blobs {
            println!("  {}", blob.scale(config.shrink_factor));
        }
    }
    Ok(())
}

fn label(mask: PathBuf, output: Option<PathBuf>, max_components: usize) -> Result<()> {
    let image = image::open(&mask).with_context(|| format!("reading {}", mask.display()))?;
    let mask = BinaryMask::from_dynamic(&image)?;
    let components = ConnectedComponents::new(&mask, max_components)?;
    print!("{components}");

    if let Some(path) = output {
        imaging::save_gray(&components.labelled_image(), &path)?;
        info!(path = %path.display(), "label visualization written");
    }
    Ok(())
}
