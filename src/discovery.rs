use std::collections::HashSet;

use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::{
    outside::{ClipInfo, ClipSource},
    result::Error,
    types::ClipCandidate,
};

const DEFAULT_HOST: &str = "https://www.twitch.tv";

/// Finds the recent and popular enough clips of a set of channels
pub struct Discovery<'a> {
    source: &'a dyn ClipSource,
    min_views: u64,
    max_age: Duration,
    clip_regex: &'a Regex,
}

impl<'a> Discovery<'a> {
    pub fn new(
        source: &'a dyn ClipSource,
        min_views: u64,
        max_age: Duration,
        clip_regex: &'a Regex,
    ) -> Self {
        Self {
            source,
            min_views,
            max_age,
            clip_regex,
        }
    }

    /// Walk the channels in order and return the eligible clips in discovery order.
    ///
    /// A channel or clip that cannot be read is skipped.
    pub fn discover(&self, channels: &[String], now: OffsetDateTime) -> Vec<ClipCandidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for channel in channels {
            let url = channel_url(channel);
            info!("Looking for clips of {url}");

            let clips = match self.source.list_clips(&url) {
                Ok(clips) => clips,
                Err(Error::UnavailableStream) => {
                    warn!("Channel {url} is unavailable. Skipping it");
                    continue;
                }
                Err(err) => {
                    warn!("Could not list the clips of {url}: {err}");
                    continue;
                }
            };
            debug!("{} links found for {url}", clips.len());

            for clip_ref in clips {
                if !self.clip_regex.is_match(&clip_ref) {
                    debug!("Ignoring {clip_ref}, it is not a clip link");
                    continue;
                }
                if !seen.insert(clip_ref.clone()) {
                    continue;
                }

                let info = match self.source.clip_info(&clip_ref) {
                    Ok(info) => info,
                    Err(err) => {
                        warn!("Could not read the info of {clip_ref}: {err}");
                        continue;
                    }
                };

                if self.is_eligible(&info, now) {
                    debug!("Keeping {clip_ref} ({} views)", info.views);
                    candidates.push(ClipCandidate::new(url.as_str(), clip_ref, info.views));
                } else {
                    debug!("Dropping {clip_ref} ({} views, {:?})", info.views, info.created_at);
                }
            }
        }

        info!("{} candidates discovered", candidates.len());
        candidates
    }

    /// Popular enough and recent enough.
    /// Clips without a creation date are trusted to be recent.
    fn is_eligible(&self, info: &ClipInfo, now: OffsetDateTime) -> bool {
        let recent = info
            .created_at
            .map_or(true, |created_at| now - created_at <= self.max_age);

        info.views >= self.min_views && recent
    }
}

/// Expand a bare channel name to its full URL
pub fn channel_url(channel: &str) -> String {
    let channel = channel.trim().trim_end_matches('/');
    if channel.contains("://") {
        channel.to_string()
    } else {
        format!("{DEFAULT_HOST}/{channel}")
    }
}
