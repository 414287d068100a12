use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, Output},
};

use miette::{Context, IntoDiagnostic};
use serde::Deserialize;
use time::OffsetDateTime;

use super::command::{assert_success_command, check_status, run_command, Capture, YT_DL, YT_DLP};
use crate::result::{bail, Error, Result};

/// Popularity and recency facts of a published clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipInfo {
    pub views: u64,
    pub created_at: Option<OffsetDateTime>,
}

/// Interface for finding the clips published by a channel
pub trait ClipSource {
    /// Get the locators of the recent clips of the channel.
    ///
    /// The locators are returned in the order the source lists them.
    fn list_clips(&self, channel_url: &str) -> Result<Vec<String>>;

    /// Get the view count and creation date of the clip
    fn clip_info(&self, clip_ref: &str) -> Result<ClipInfo>;
}

/// Interface for retrieving the media of a clip
pub trait ClipDownloader {
    /// Download the clip to the given path.
    ///
    /// A leftover file may exist at the path if the download failed.
    fn download(&self, clip_ref: &str, path: &Path) -> Result<()>;
}

/// Interface for the [yt-dlp](https://github.com/yt-dlp/yt-dlp) program
#[derive(Debug)]
pub struct Ytdl {
    program: &'static str,
}

impl Ytdl {
    /// Verify that the `yt-dlp` or `youtube-dl` binaries are reachable
    pub fn new() -> Result<Self> {
        // Check `yt-dlp`
        if assert_success_command(YT_DLP, |cmd| cmd.arg("--version")).is_ok() {
            Ok(Self { program: YT_DLP })
        } else if assert_success_command(YT_DL, |cmd| cmd.arg("--version")).is_ok() {
            // Check `youtube-dl`
            Ok(Self { program: YT_DL })
        } else {
            bail("Neither yt-dlp nor youtube-dl found")
        }
    }

    /// Run the command and check if it failed with saying the stream is unavailable.
    /// In that case, return [`Error::UnavailableStream`].
    ///
    /// In other cases, return the output handle.
    pub fn run_check_availability<F>(&self, f: F, capture: Capture) -> Result<Output>
    where
        F: FnOnce(&mut Command) -> &mut Command,
    {
        let res = run_command(self.program, f, capture | Capture::STDERR)?;

        let stderr = String::from_utf8_lossy(&res.stderr);
        if is_unavailable(&stderr) {
            Err(Error::UnavailableStream)
        } else {
            Ok(res)
        }
    }
}

impl ClipSource for Ytdl {
    fn list_clips(&self, channel_url: &str) -> Result<Vec<String>> {
        let url = format!("{}/clips?filter=clips&range=24hr", channel_url.trim_end_matches('/'));
        let res = self.run_check_availability(
            |cmd| {
                cmd.arg("-q")
                    .arg("--flat-playlist")
                    .args(["--print", "url"])
                    .arg("--")
                    .arg(&url)
            },
            Capture::STDOUT,
        )?;
        check_status(self.program, &res)?;

        let output = String::from_utf8_lossy(&res.stdout);
        Ok(output.split_whitespace().map(String::from).collect())
    }

    fn clip_info(&self, clip_ref: &str) -> Result<ClipInfo> {
        let res = self.run_check_availability(
            |cmd| {
                cmd.arg("-q")
                    .arg("--skip-download")
                    .arg("-j")
                    .arg("--")
                    .arg(clip_ref)
            },
            Capture::STDOUT,
        )?;
        check_status(self.program, &res)?;

        parse_clip_info(&String::from_utf8_lossy(&res.stdout))
    }
}

impl ClipDownloader for Ytdl {
    fn download(&self, clip_ref: &str, path: &Path) -> Result<()> {
        let res = self.run_check_availability(
            |cmd| {
                cmd.arg("-q")
                    .args([OsStr::new("-o"), path.as_os_str()])
                    .arg("--no-continue") // Or else fails when file already exists, even an empty one
                    .arg("--no-part")
                    .arg("--")
                    .arg(clip_ref)
            },
            Capture::empty(),
        )?;
        check_status(self.program, &res)?;

        if path.exists() {
            Ok(())
        } else {
            bail(format!(
                "{} succeeded but did not write {}",
                self.program,
                path.display()
            ))
        }
    }
}

/// yt-dlp prints its errors as `ERROR: ...` lines
fn is_unavailable(stderr: &str) -> bool {
    stderr
        .lines()
        .any(|line| line.starts_with("ERROR:") && line.to_lowercase().contains("unavailable"))
}

#[derive(Debug, Deserialize)]
struct ClipJson {
    view_count: Option<i64>,
    timestamp: Option<i64>,
}

fn parse_clip_info(output: &str) -> Result<ClipInfo> {
    let json: ClipJson = serde_json::from_str(output.trim())
        .into_diagnostic()
        .wrap_err("Could not parse clip JSON")?;

    let views = json
        .view_count
        .ok_or_else(|| miette::miette!("Key 'view_count' not found in JSON"))?;
    let views = u64::try_from(views)
        .into_diagnostic()
        .wrap_err_with(|| format!("View count {views} is not a whole number >= 0"))?;

    let created_at = json
        .timestamp
        .map(OffsetDateTime::from_unix_timestamp)
        .transpose()
        .into_diagnostic()
        .wrap_err("Value of key 'timestamp' is out of range")?;

    Ok(ClipInfo { views, created_at })
}
