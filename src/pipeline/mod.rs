//! Selection and assembly of the highlight video.
//!
//! The pipeline goes through named stages, each one consuming the previous:
//! [`Pipeline::plan`] ranks the candidates, [`Planned::fetch`] downloads them
//! until the budget is reached, [`AwaitingReview::resume`] waits for the
//! operator and [`Confirmed::assemble`] writes the output file.

mod assembler;
mod checkpoint;
mod fetcher;
mod selector;

#[cfg(test)]
mod fake;

use std::path::{Path, PathBuf};

use miette::{miette, Result};
use tracing::info;

pub use assembler::Assembler;
pub use checkpoint::{Checkpoint, Proceed, StdinCheckpoint};
pub use fetcher::{FetchOutcome, FetchReport, Fetcher};
pub use selector::{select, SelectionPlan};

use crate::{
    io::reset_dir,
    outside::{ClipDownloader, MediaProbe, StreamTransformer},
    types::{AssemblyBatch, ClipCandidate, Container},
};

/// External tools used by the pipeline
#[derive(Clone, Copy)]
pub struct Tools<'a> {
    pub downloader: &'a dyn ClipDownloader,
    pub probe: &'a dyn MediaProbe,
    pub stream_tsf: &'a dyn StreamTransformer,
}

pub struct Pipeline<'a> {
    tools: Tools<'a>,
    work_dir: &'a Path,
    output: &'a Path,
    container: Container,
    /// Target runtime in seconds
    budget: f64,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        tools: Tools<'a>,
        work_dir: &'a Path,
        output: &'a Path,
        container: Container,
        budget: f64,
    ) -> Self {
        Self {
            tools,
            work_dir,
            output,
            container,
            budget,
        }
    }

    /// Rank the candidates into the fetch plan
    pub fn plan(&self, candidates: Vec<ClipCandidate>) -> Result<Planned<'_>> {
        let plan = select(candidates)?;
        Ok(Planned {
            pipeline: self,
            plan,
        })
    }
}

/// The fetch plan is fixed, nothing has been downloaded yet
pub struct Planned<'p> {
    pipeline: &'p Pipeline<'p>,
    plan: SelectionPlan,
}

impl<'p> Planned<'p> {
    pub fn plan(&self) -> &SelectionPlan {
        &self.plan
    }

    /// Empty the work directory then fetch clips until the budget is reached
    pub fn fetch(self) -> Result<AwaitingReview<'p>> {
        let p = self.pipeline;
        reset_dir(p.work_dir)?;

        let fetcher = Fetcher::new(p.tools.downloader, p.tools.probe, p.work_dir, p.budget);
        let report = fetcher.run(&self.plan);

        Ok(AwaitingReview {
            pipeline: p,
            report,
        })
    }
}

/// The batch is fetched and waits for the operator's confirmation
pub struct AwaitingReview<'p> {
    pipeline: &'p Pipeline<'p>,
    report: FetchReport,
}

impl<'p> AwaitingReview<'p> {
    pub fn batch(&self) -> &AssemblyBatch {
        &self.report.batch
    }

    pub fn report(&self) -> &FetchReport {
        &self.report
    }

    /// Block on the checkpoint, then leave out the clips whose file was removed.
    ///
    /// Fails without reaching the checkpoint if nothing was fetched.
    pub fn resume(self, checkpoint: &dyn Checkpoint) -> Result<Confirmed<'p>> {
        let mut batch = self.report.batch;
        if batch.is_empty() {
            return Err(miette!(
                "None of the {} candidates could be fetched, nothing to assemble",
                self.report.failures.len()
            ));
        }

        checkpoint.confirm(&batch, self.pipeline.work_dir)?;

        for clip in batch.retain_existing() {
            info!("Clip #{} removed during review: {}", clip.index, clip.candidate);
        }

        Ok(Confirmed {
            pipeline: self.pipeline,
            batch,
        })
    }
}

/// The batch is final and ready to be assembled
pub struct Confirmed<'p> {
    pipeline: &'p Pipeline<'p>,
    batch: AssemblyBatch,
}

impl Confirmed<'_> {
    pub fn batch(&self) -> &AssemblyBatch {
        &self.batch
    }

    pub fn assemble(self, rng: &mut fastrand::Rng) -> Result<PathBuf> {
        let p = self.pipeline;
        Assembler::new(p.tools.stream_tsf, p.work_dir, p.output, p.container)
            .assemble(self.batch, rng)
    }
}
