use std::{ops::ControlFlow, path::Path};

use tracing::{debug, info, warn};

use super::SelectionPlan;
use crate::{
    io::remove_leftover,
    outside::{ClipDownloader, MediaProbe},
    result::{bail, Result},
    types::{AssemblyBatch, ClipCandidate, Container, FetchedClip},
};

/// Why the fetch loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The cumulative measured duration reached the budget
    BudgetReached,
    /// Every candidate was tried before reaching the budget
    PlanExhausted,
}

/// A candidate that was skipped because it could not be fetched or measured
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub candidate: ClipCandidate,
    pub reason: String,
}

/// Result of consuming a [`SelectionPlan`]
#[derive(Debug)]
pub struct FetchReport {
    pub batch: AssemblyBatch,
    pub failures: Vec<FetchFailure>,
    pub outcome: FetchOutcome,
}

/// Accumulator of the fetch fold
#[derive(Debug, Default)]
struct FetchState {
    fetched: Vec<FetchedClip>,
    failures: Vec<FetchFailure>,
    cumulative: f64,
}

/// Downloads the planned candidates one after the other until their
/// measured durations add up to the budget.
pub struct Fetcher<'a> {
    downloader: &'a dyn ClipDownloader,
    probe: &'a dyn MediaProbe,
    work_dir: &'a Path,
    /// Target runtime in seconds
    budget: f64,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        downloader: &'a dyn ClipDownloader,
        probe: &'a dyn MediaProbe,
        work_dir: &'a Path,
        budget: f64,
    ) -> Self {
        Self {
            downloader,
            probe,
            work_dir,
            budget,
        }
    }

    /// Fetch the plan candidates in order.
    ///
    /// The loop stops right after the clip that makes the cumulative duration
    /// reach the budget, that clip being kept whole. A candidate that fails is
    /// recorded and skipped, it never stops the loop.
    pub fn run(&self, plan: &SelectionPlan) -> FetchReport {
        let flow = plan
            .iter()
            .try_fold(FetchState::default(), |mut state, candidate| {
                let index = state.fetched.len();
                match self.fetch_one(index, candidate) {
                    Ok(clip) => {
                        state.cumulative += clip.duration;
                        info!(
                            "Fetched clip #{index} ({:.1}s, {:.1}/{:.1}s): {candidate}",
                            clip.duration, state.cumulative, self.budget
                        );
                        state.fetched.push(clip);

                        if state.cumulative >= self.budget {
                            ControlFlow::Break(state)
                        } else {
                            ControlFlow::Continue(state)
                        }
                    }
                    Err(err) => {
                        warn!("Skipping {candidate}: {err}");
                        state.failures.push(FetchFailure {
                            candidate: candidate.clone(),
                            reason: err.to_string(),
                        });
                        ControlFlow::Continue(state)
                    }
                }
            });

        let (state, outcome) = match flow {
            ControlFlow::Break(state) => (state, FetchOutcome::BudgetReached),
            ControlFlow::Continue(state) => (state, FetchOutcome::PlanExhausted),
        };

        FetchReport {
            batch: AssemblyBatch::new(state.fetched),
            failures: state.failures,
            outcome,
        }
    }

    /// Get the duration of a downloaded clip, making sure it can be joined to the others
    fn measure(&self, path: &Path) -> Result<f64> {
        let duration = self
            .probe
            .duration(path)
            .map_err(|err| err.wrap_err_with(|| "Could not measure clip duration"))?;

        let streams = self
            .probe
            .streams(path)
            .map_err(|err| err.wrap_err_with(|| "Could not read clip streams"))?;
        if !streams.is_complete() {
            return bail("The clip lacks a video or an audio stream");
        }

        Ok(duration)
    }

    /// Download and measure a single candidate
    fn fetch_one(&self, index: usize, candidate: &ClipCandidate) -> Result<FetchedClip> {
        let path = self
            .work_dir
            .join(format!("{index}{}", Container::Mkv.with_dot()));
        debug!("Downloading {} to {}", candidate.clip_ref, path.display());

        let res = self
            .downloader
            .download(&candidate.clip_ref, &path)
            .map_err(|err| err.wrap_err_with(|| "Could not download clip"))
            .and_then(|()| self.measure(&path));

        match res {
            Ok(duration) => Ok(FetchedClip {
                index,
                path,
                duration,
                candidate: candidate.clone(),
            }),
            Err(err) => {
                // The next candidate will reuse the same file name
                remove_leftover(&path);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{fake::FakeMedia, selector::plan_of};

    fn cand(name: &str, views: u64) -> ClipCandidate {
        ClipCandidate::new("chan", name, views)
    }

    fn fetched_refs(report: &FetchReport) -> Vec<&str> {
        report
            .batch
            .clips()
            .iter()
            .map(|c| c.candidate.clip_ref.as_str())
            .collect()
    }

    #[test]
    fn stops_at_the_clip_crossing_the_budget() {
        let dir = tempfile::tempdir().unwrap();
        let media = FakeMedia::default()
            .with_clip("B", 30.0)
            .with_clip("A", 20.0)
            .with_clip("C", 15.0);
        let plan = plan_of(vec![cand("B", 200), cand("A", 50), cand("C", 10)]);

        let fetcher = Fetcher::new(&media, &media, dir.path(), 30.0 + 20.0 - 1.0);
        let report = fetcher.run(&plan);

        assert_eq!(report.outcome, FetchOutcome::BudgetReached);
        assert_eq!(fetched_refs(&report), ["B", "A"]);
        assert_eq!(*media.downloads.borrow(), ["B", "A"]);
        // The crossing clip is kept whole
        assert_eq!(report.batch.total_duration(), 50.0);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn exact_budget_counts_as_reached() {
        let dir = tempfile::tempdir().unwrap();
        let media = FakeMedia::default().with_clip("A", 10.0).with_clip("B", 10.0);
        let plan = plan_of(vec![cand("A", 2), cand("B", 1)]);

        let report = Fetcher::new(&media, &media, dir.path(), 10.0).run(&plan);

        assert_eq!(report.outcome, FetchOutcome::BudgetReached);
        assert_eq!(fetched_refs(&report), ["A"]);
    }

    #[test]
    fn failures_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let media = FakeMedia::default()
            .with_clip("A", 10.0)
            .with_clip("broken", 0.0)
            .with_clip("C", 10.0);
        let plan = plan_of(vec![
            cand("A", 4),
            cand("gone", 3),
            cand("broken", 2),
            cand("C", 1),
        ]);

        let report = Fetcher::new(&media, &media, dir.path(), 15.0).run(&plan);

        assert_eq!(report.outcome, FetchOutcome::BudgetReached);
        assert_eq!(fetched_refs(&report), ["A", "C"]);
        let failed: Vec<_> = report
            .failures
            .iter()
            .map(|f| f.candidate.clip_ref.as_str())
            .collect();
        assert_eq!(failed, ["gone", "broken"]);

        // Indexes stay contiguous and the failed download left nothing behind
        let indexes: Vec<_> = report.batch.clips().iter().map(|c| c.index).collect();
        assert_eq!(indexes, [0, 1]);
        assert_eq!(report.batch.clips()[1].path, dir.path().join("1.mkv"));
        assert_eq!(dir.path().read_dir().unwrap().count(), 2);
    }

    #[test]
    fn clips_without_sound_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let media = FakeMedia::default()
            .with_silent_clip("mute", 30.0)
            .with_clip("B", 10.0);
        let plan = plan_of(vec![cand("mute", 9), cand("B", 1)]);

        let report = Fetcher::new(&media, &media, dir.path(), 20.0).run(&plan);

        assert_eq!(fetched_refs(&report), ["B"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].candidate.clip_ref, "mute");
        assert!(report.failures[0].reason.contains("audio stream"));
        // Its duration never counted towards the budget
        assert_eq!(report.outcome, FetchOutcome::PlanExhausted);
        assert_eq!(report.batch.clips()[0].path, dir.path().join("0.mkv"));
    }

    #[test]
    fn exhausted_plan_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let media = FakeMedia::default().with_clip("A", 10.0).with_clip("B", 5.0);
        let plan = plan_of(vec![cand("A", 2), cand("B", 1)]);

        let report = Fetcher::new(&media, &media, dir.path(), 1200.0).run(&plan);

        assert_eq!(report.outcome, FetchOutcome::PlanExhausted);
        assert_eq!(fetched_refs(&report), ["A", "B"]);
    }

    #[test]
    fn every_failure_gives_an_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let media = FakeMedia::default().with_clip("A", 0.0).with_clip("B", -1.0);
        let plan = plan_of(vec![cand("A", 2), cand("B", 1)]);

        let report = Fetcher::new(&media, &media, dir.path(), 60.0).run(&plan);

        assert_eq!(report.outcome, FetchOutcome::PlanExhausted);
        assert!(report.batch.is_empty());
        assert_eq!(report.failures.len(), 2);
    }

    #[test]
    fn zero_budget_keeps_the_first_successful_clip() {
        let dir = tempfile::tempdir().unwrap();
        let media = FakeMedia::default().with_clip("B", 3.0).with_clip("C", 4.0);
        let plan = plan_of(vec![cand("gone", 3), cand("B", 2), cand("C", 1)]);

        let report = Fetcher::new(&media, &media, dir.path(), 0.0).run(&plan);

        assert_eq!(report.outcome, FetchOutcome::BudgetReached);
        assert_eq!(fetched_refs(&report), ["B"]);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn batch_is_the_minimal_prefix_reaching_the_budget() {
        let mut rng = fastrand::Rng::with_seed(42);

        for _ in 0..100 {
            let dir = tempfile::tempdir().unwrap();
            let mut media = FakeMedia::default();
            let mut candidates = Vec::new();
            for i in 0..rng.usize(1..12) {
                let name = format!("clip/{i}");
                // Roughly one clip out of four is unavailable
                if rng.u8(0..4) > 0 {
                    media = media.with_clip(&name, rng.u32(1..60) as f64);
                }
                candidates.push(cand(&name, 100 - i as u64));
            }
            let budget = rng.u32(1..200) as f64;

            let report = Fetcher::new(&media, &media, dir.path(), budget).run(&plan_of(candidates));
            let durations: Vec<f64> = report.batch.clips().iter().map(|c| c.duration).collect();
            let total: f64 = durations.iter().sum();

            match report.outcome {
                FetchOutcome::BudgetReached => {
                    let before_last: f64 = durations[..durations.len() - 1].iter().sum();
                    assert!(before_last < budget);
                    assert!(total >= budget);
                }
                FetchOutcome::PlanExhausted => assert!(total < budget),
            }
        }
    }
}
