mod cli;
mod config;
mod database;
mod discovery;
mod io;
mod logging;
mod outside;
mod pipeline;
mod result;
mod types;

use std::path::{Path, PathBuf};

use miette::{miette, Context, IntoDiagnostic, Result};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::{
    cli::Action,
    config::Settings,
    database::{CandidateStore, Sqlite},
    discovery::Discovery,
    outside::{Ffmpeg, Ytdl},
    pipeline::{
        select, AwaitingReview, Checkpoint, FetchOutcome, Pipeline, Proceed, StdinCheckpoint,
        Tools,
    },
    types::Container,
};

fn main() -> Result<()> {
    // Initialize the environment & CLI
    let args = cli::parse();
    logging::init_logging(logging::level_from_verbosity(args.verbose, args.quiet))?;

    let settings = Settings::load(args.config.as_deref(), &args.overrides)?;
    debug!("{settings:?}");

    match args.action {
        Action::Discover => discover(&settings),
        Action::Assemble { yes } => assemble(&settings, yes),
        Action::Run { yes } => {
            discover(&settings)?;
            assemble(&settings, yes)
        }
        Action::List => list(&settings),
    }
}

/// Find the candidates and replace the store content with them
fn discover(settings: &Settings) -> Result<()> {
    if settings.channels.is_empty() {
        return Err(miette!(
            "No channel to discover clips from. Give some on the command line or in the configuration"
        ));
    }

    let ytdl = Ytdl::new()?;
    let clip_regex = settings.clip_regex()?;
    let discovery = Discovery::new(
        &ytdl,
        settings.min_views,
        Duration::hours(settings.max_age_hours.into()),
        &clip_regex,
    );

    let candidates = discovery.discover(&settings.channels, OffsetDateTime::now_utc());
    if candidates.is_empty() {
        warn!("No clip matches the thresholds");
    }

    let mut store = open_store(&settings.cache)?;
    store
        .replace_all(&candidates)
        .wrap_err("Could not record the discovered candidates")?;
    info!(
        "{} candidates recorded in {}",
        store.count()?,
        settings.cache.display()
    );

    Ok(())
}

/// Select, fetch and assemble the recorded candidates
fn assemble(settings: &Settings, yes: bool) -> Result<()> {
    let (ytdl, ffmpeg) = load_external_components()?;

    let store = open_store(&settings.cache)?;
    let candidates = store
        .load_all()
        .wrap_err("Could not read the recorded candidates")?;
    info!("{} candidates recorded", candidates.len());

    std::fs::create_dir_all(&settings.out_dir)
        .into_diagnostic()
        .wrap_err("Could not create out directory")?;
    let output = output_path(&settings.out_dir, settings.container, today());

    let tools = Tools {
        downloader: &ytdl,
        probe: &ffmpeg,
        stream_tsf: &ffmpeg,
    };
    let pipeline = Pipeline::new(
        tools,
        &settings.work_dir,
        &output,
        settings.container,
        settings.budget,
    );

    let planned = pipeline.plan(candidates)?;
    if let Some(top) = planned.plan().first() {
        info!(
            "{} candidates ranked, the most viewed being {top}",
            planned.plan().len()
        );
    }

    let review = planned.fetch()?;
    log_fetch_summary(&review, settings.budget);

    let checkpoint: &dyn Checkpoint = if yes { &Proceed } else { &StdinCheckpoint };
    let confirmed = review.resume(checkpoint)?;

    info!(
        "Assembling {} clips ({:.1}s)",
        confirmed.batch().len(),
        confirmed.batch().total_duration()
    );
    for clip in confirmed.batch().clips() {
        debug!("{clip}");
    }

    let output = confirmed.assemble(&mut fastrand::Rng::new())?;
    info!("Highlight video written to {}", output.display());

    Ok(())
}

fn log_fetch_summary(review: &AwaitingReview, budget: f64) {
    let report = review.report();
    let batch = review.batch();

    for failure in &report.failures {
        warn!("Not fetched: {} ({})", failure.candidate, failure.reason);
    }

    match report.outcome {
        FetchOutcome::BudgetReached => info!(
            "Budget reached with {} clips ({:.1}s)",
            batch.len(),
            batch.total_duration()
        ),
        FetchOutcome::PlanExhausted if batch.is_empty() => {
            warn!("No clip could be fetched, the batch is empty")
        }
        FetchOutcome::PlanExhausted => warn!(
            "All candidates fetched without reaching the budget: {:.1}s out of {budget:.1}s",
            batch.total_duration()
        ),
    }
}

/// Print the candidates in the order they would be fetched
fn list(settings: &Settings) -> Result<()> {
    let store = open_store(&settings.cache)?;
    info!("{} candidates recorded", store.count()?);
    let plan = select(store.load_all()?)?;

    for (rank, candidate) in plan.iter().enumerate() {
        println!("{:>4}. {candidate}", rank + 1);
    }

    Ok(())
}

fn open_store(path: &Path) -> Result<Sqlite> {
    if let Some(p) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(p)
            .into_diagnostic()
            .wrap_err("Could not create cache parent directories")?;
    }

    Sqlite::read_or_create(path).wrap_err("Could not create or read cache file")
}

/// Load the external components
fn load_external_components() -> Result<(Ytdl, Ffmpeg)> {
    // Construct the handles concurrently as executing an external program
    // is not instantaneous. That way we can avoid adding the costs
    let ytdl_thread = std::thread::spawn(Ytdl::new);
    let ffmpeg_thread = std::thread::spawn(Ffmpeg::new);

    let ytdl = ytdl_thread
        .join()
        .map_err(|_| miette!("Could not join thread"))??;
    let ffmpeg = ffmpeg_thread
        .join()
        .map_err(|_| miette!("Could not join thread"))??;

    Ok((ytdl, ffmpeg))
}

fn today() -> time::Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

/// `<out_dir>/highlights-YYYY-MM-DD.<ext>`
fn output_path(out_dir: &Path, container: Container, date: time::Date) -> PathBuf {
    out_dir.join(format!(
        "highlights-{:04}-{:02}-{:02}{}",
        date.year(),
        u8::from(date.month()),
        date.day(),
        container.with_dot()
    ))
}
