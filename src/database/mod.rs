mod sqlite;

use std::path::Path;

use miette::Result;

pub use sqlite::Sqlite;

use crate::types::ClipCandidate;

/// Durable handoff between discovery and selection.
///
/// Keeping the discovered candidates between executions allows the
/// selection and fetch steps to be run again without re-discovering.
pub trait CandidateStore
where
    Self: Sized,
{
    /// Read the store at the given path or create it if it does not exist.
    ///
    /// If the file does exist but does not correspond to a valid store,
    /// an error **should** be returned.
    fn read_or_create(p: &Path) -> Result<Self>;

    /// Replace the previous discovery with the given candidates.
    ///
    /// This **must** be atomic: on failure, the previous candidates are kept.
    fn replace_all(&mut self, candidates: &[ClipCandidate]) -> Result<()>;

    /// Load all the candidates, in discovery order.
    ///
    /// A malformed record is an error, it is never silently dropped.
    fn load_all(&self) -> Result<Vec<ClipCandidate>>;

    /// Count the number of candidates in the store.
    fn count(&self) -> Result<usize>;
}
