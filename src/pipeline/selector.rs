use std::{collections::HashSet, ops::Deref};

use miette::{miette, Result};

use crate::types::ClipCandidate;

/// Candidates in the order they should be fetched, most viewed first.
///
/// Built once before fetching starts, it is never reordered afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPlan(Vec<ClipCandidate>);

impl Deref for SelectionPlan {
    type Target = [ClipCandidate];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Rank the candidates by view count, descending.
///
/// The sort is stable: candidates with the same view count keep their discovery order.
/// An empty list or a clip reference found twice is a data error.
pub fn select(mut candidates: Vec<ClipCandidate>) -> Result<SelectionPlan> {
    if candidates.is_empty() {
        return Err(miette!("No candidate to select from, run the discovery first"));
    }

    {
        let mut seen = HashSet::with_capacity(candidates.len());
        if let Some(dup) = candidates.iter().find(|c| !seen.insert(c.clip_ref.as_str())) {
            return Err(miette!("Clip '{}' was recorded twice", dup.clip_ref));
        }
    }

    candidates.sort_by(|a, b| b.views.cmp(&a.views));

    Ok(SelectionPlan(candidates))
}

#[cfg(test)]
pub(crate) fn plan_of(candidates: Vec<ClipCandidate>) -> SelectionPlan {
    SelectionPlan(candidates)
}
