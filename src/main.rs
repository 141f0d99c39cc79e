use std::path::PathBuf;
use std::process::ExitCode;

use bagviz::batch::{BatchContext, BatchOrchestrator, JobDescriptor};
use bagviz::collab::{BatchSubmitter, SpoolSubmitter};
use bagviz::combine::{
    scan_clips, ClipRef, CombineOptions, DividerStyle, GroupingMode, VideoCombiner,
};
use bagviz::config::Configuration;
use bagviz::error::AppError;
use bagviz::media::{Codec, FfmpegBackend};
use bagviz::model::ModelPackage;
use bagviz::pipeline::{run_render, RenderOptions};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Renders recorded driving sessions into annotated review videos.
#[derive(Parser, Debug)]
#[command(name = "bagviz", version, about)]
struct Cli {
    /// Configuration file (defaults to ./bagviz.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one bag into an MP4
    Render(RenderArgs),
    /// Concatenate rendered clips into grouped videos
    Combine(CombineArgs),
    /// Print the bag analysis as JSON
    Analyze {
        /// Bag directory or .db3 file
        #[arg(long)]
        bag: PathBuf,
        /// Model package supplying the action space
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        topic: Option<String>,
    },
    /// Run a batch job: render, combine, upload and register
    Batch(BatchArgs),
    /// Queue a batch job for later execution
    Submit {
        /// Job description (JSON)
        #[arg(long)]
        job: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Bag directory or .db3 file
    #[arg(long)]
    bag: PathBuf,
    /// Model directory or .tar.gz package
    #[arg(long)]
    model: PathBuf,
    #[arg(short, long)]
    output: PathBuf,
    /// avc1, mp4v, hevc or vp9
    #[arg(long)]
    codec: Option<String>,
    #[arg(long)]
    frame_limit: Option<u64>,
    /// Label speeds as a share of the maximum speed
    #[arg(long)]
    relative_labels: bool,
    #[arg(long)]
    background: Option<PathBuf>,
    /// Also write a JSON step summary next to the video
    #[arg(long)]
    describe: bool,
    #[arg(long, default_value = "")]
    subject: String,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
}

#[derive(Args, Debug)]
struct CombineArgs {
    /// Clip files or directories of clips
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[arg(short, long)]
    output_dir: PathBuf,
    /// subject-model-date, subject-model or subject
    #[arg(long)]
    grouping: Option<GroupingMode>,
    /// Skip clips shorter than this many seconds
    #[arg(long)]
    skip_duration: Option<f64>,
    #[arg(long)]
    divider_seconds: Option<f64>,
    #[arg(long)]
    divider_background: Option<PathBuf>,
    #[arg(long)]
    vehicle: Option<String>,
    #[arg(long)]
    codec: Option<String>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Job description (JSON)
    #[arg(long)]
    job: PathBuf,
    #[arg(long)]
    codec: Option<String>,
    #[arg(long)]
    frame_limit: Option<u64>,
    #[arg(long)]
    relative_labels: bool,
    /// Storage reference of a background image
    #[arg(long)]
    background: Option<String>,
    #[arg(long)]
    grouping: Option<GroupingMode>,
    #[arg(long)]
    vehicle: Option<String>,
    #[arg(long)]
    skip_duration: Option<f64>,
    /// Root directory of the source storage
    #[arg(long)]
    storage_root: Option<PathBuf>,
    /// Destination prefix for uploads
    #[arg(long)]
    destination: Option<String>,
    #[arg(long)]
    catalog_endpoint: Option<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping");
            interrupt.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), AppError> {
    let configuration = Configuration::load(cli.config.as_deref())?;

    match cli.command {
        Command::Render(args) => render(&configuration, args, cancel).await,
        Command::Combine(args) => combine(&configuration, args, cancel).await,
        Command::Analyze { bag, model, topic } => {
            let metadata = model
                .as_deref()
                .map(ModelPackage::open)
                .transpose()?
                .map(|package| package.metadata);
            let topic = topic.unwrap_or(configuration.render.topic);
            let info = bagviz::analyze_bag(&bag, &topic, metadata.as_ref())?;
            print_json(&info)
        }
        Command::Batch(args) => batch(configuration, args, cancel).await,
        Command::Submit { job } => {
            let job = JobDescriptor::from_file(&job)?;
            let id = SpoolSubmitter::new(configuration.batch.spool_dir)
                .submit_batch_job(&job)
                .await?;
            println!("{id}");
            Ok(())
        }
    }
}

async fn render(
    configuration: &Configuration,
    args: RenderArgs,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let mut options = RenderOptions::from_settings(&configuration.render);
    if let Some(width) = args.width {
        options.width = width;
    }
    if let Some(height) = args.height {
        options.height = height;
    }
    if let Some(workers) = args.workers {
        options.worker_count = workers;
    }
    if args.background.is_some() {
        options.background = args.background;
    }
    options.codec = parse_codec(args.codec.as_deref(), &configuration.render.codec)?;
    options.frame_limit = args.frame_limit;
    options.relative_labels = args.relative_labels;
    options.subject = args.subject;
    options.describe = args.describe;

    let outcome = tokio::task::spawn_blocking(move || {
        run_render(&args.bag, &args.model, &args.output, &options, &cancel)
    })
    .await??;

    tracing::info!(
        "Rendered {} frames ({} dropped) into {}",
        outcome.frames_written,
        outcome.frames_dropped,
        outcome.output.display()
    );
    Ok(())
}

async fn combine(
    configuration: &Configuration,
    args: CombineArgs,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let mut clips = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            clips.extend(scan_clips(input)?);
        } else {
            clips.push(ClipRef::from_path(input)?);
        }
    }
    if clips.is_empty() {
        return Err(AppError::Usage("no clips to combine".to_string()));
    }

    let codec = parse_codec(args.codec.as_deref(), &configuration.render.codec)?;
    let mut options =
        CombineOptions::from_settings(&configuration.combine, codec, args.output_dir)
            .with_vehicle(args.vehicle);
    if let Some(grouping) = args.grouping {
        options.grouping = grouping;
    }
    if let Some(skip) = args.skip_duration {
        options.skip_duration_secs = skip;
    }
    if let Some(seconds) = args.divider_seconds {
        options.divider_seconds = seconds.max(0.0);
    }
    let divider = args
        .divider_background
        .or_else(|| configuration.combine.divider_background.clone());

    let videos = tokio::task::spawn_blocking(move || {
        let backend = FfmpegBackend::default();
        let mut combiner = VideoCombiner::new(&backend, options);
        if let Some(path) = divider {
            combiner = combiner.with_divider(
                DividerStyle::with_background(&path).map_err(bagviz::CombineError::from)?,
            );
        }
        combiner.combine(clips, &cancel)
    })
    .await??;

    print_json(&videos)
}

async fn batch(
    mut configuration: Configuration,
    args: BatchArgs,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let mut job = JobDescriptor::from_file(&args.job)?;
    let options = &mut job.options;
    if args.codec.is_some() {
        options.codec = args.codec;
    }
    if args.frame_limit.is_some() {
        options.frame_limit = args.frame_limit;
    }
    options.relative_labels |= args.relative_labels;
    if args.background.is_some() {
        options.background = args.background;
    }
    if args.grouping.is_some() {
        options.grouping = args.grouping;
    }
    if args.vehicle.is_some() {
        options.vehicle = args.vehicle;
    }
    if args.skip_duration.is_some() {
        options.skip_duration_secs = args.skip_duration;
    }
    if let Some(root) = args.storage_root {
        configuration.batch.storage_root = root;
    }
    if let Some(destination) = args.destination {
        configuration.batch.destination = destination;
    }
    if args.catalog_endpoint.is_some() {
        configuration.batch.catalog_endpoint = args.catalog_endpoint;
    }

    let orchestrator = BatchOrchestrator::new(BatchContext::from_configuration(configuration));
    let uploaded = orchestrator.run(&job, &cancel).await?;
    print_json(&uploaded)
}

fn parse_codec(flag: Option<&str>, configured: &str) -> Result<Codec, AppError> {
    Ok(flag.unwrap_or(configured).parse()?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{json}");
    Ok(())
}
