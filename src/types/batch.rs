use std::{fmt::Display, path::PathBuf};

use super::ClipCandidate;

/// A candidate that has been downloaded and measured
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedClip {
    /// Position among the successful fetches, in selection order
    pub index: usize,
    pub path: PathBuf,
    /// Measured duration in seconds, always > 0
    pub duration: f64,
    pub candidate: ClipCandidate,
}

impl Display for FetchedClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{:<3} {:>7.1}s  {}",
            self.index,
            self.duration,
            self.candidate
        )
    }
}

/// The clips that will be concatenated together.
///
/// Built once by the fetch loop, the membership only shrinks afterwards
/// when the operator removes files during review.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyBatch {
    clips: Vec<FetchedClip>,
}

impl AssemblyBatch {
    pub fn new(clips: Vec<FetchedClip>) -> Self {
        Self { clips }
    }

    pub fn clips(&self) -> &[FetchedClip] {
        &self.clips
    }

    pub fn into_clips(self) -> Vec<FetchedClip> {
        self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Sum of the measured durations, in seconds
    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(|clip| clip.duration).sum()
    }

    /// Drop the clips whose file does not exist anymore.
    /// Return the dropped clips.
    pub fn retain_existing(&mut self) -> Vec<FetchedClip> {
        let (kept, dropped) = std::mem::take(&mut self.clips)
            .into_iter()
            .partition(|clip| clip.path.exists());
        self.clips = kept;
        dropped
    }
}

impl Display for AssemblyBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for clip in &self.clips {
            writeln!(f, "\t{clip}")?;
        }
        write!(
            f,
            "\t{} clips, {:.1}s in total",
            self.len(),
            self.total_duration()
        )
    }
}
