use std::fmt::Display;

use miette::{miette, Result};

/// A clip found during discovery, eligible for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipCandidate {
    pub channel: String,
    /// Locator the downloader can resolve, usually the clip URL
    pub clip_ref: String,
    pub views: u64,
}

impl ClipCandidate {
    pub fn new<C: Into<String>, R: Into<String>>(channel: C, clip_ref: R, views: u64) -> Self {
        Self {
            channel: channel.into(),
            clip_ref: clip_ref.into(),
            views,
        }
    }

    /// Build a candidate out of raw recorded values, rejecting malformed ones.
    pub fn from_record(channel: String, clip_ref: String, views: i64) -> Result<Self> {
        if clip_ref.trim().is_empty() {
            return Err(miette!("Candidate of channel '{channel}' has no clip reference"));
        }

        let views = u64::try_from(views)
            .map_err(|_| miette!("Candidate '{clip_ref}' has a negative view count ({views})"))?;

        Ok(Self::new(channel, clip_ref, views))
    }
}

impl Display for ClipCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} views, {})", self.clip_ref, self.views, self.channel)
    }
}
