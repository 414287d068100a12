use std::{ffi::OsStr, fmt::Debug, path::Path};

use miette::{miette, Context, IntoDiagnostic};
use serde::Deserialize;

use super::command::{
    assert_success_command, check_status, run_command, Capture, FFMPEG, FFPROBE,
    FFXXX_DEFAULT_ARGS,
};
use crate::{
    result::Result,
    types::{AudioStream, Container, StreamSignature, VideoStream},
};

/// How the inputs are joined together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatMode {
    /// Inputs share the same stream layout, copy the packets as-is
    StreamCopy,
    /// Re-encode everything to a common format of the given resolution
    Transcode { width: u32, height: u32 },
}

/// How the intermediate container is turned into the distribution file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    StreamCopy,
    Transcode,
}

/// Interface for measuring media files
pub trait MediaProbe {
    /// Get the duration of the media, in seconds.
    ///
    /// Fails if the file is unreadable or if the duration is not a positive number.
    fn duration(&self, path: &Path) -> Result<f64>;

    /// Get the properties of the first video and audio streams
    fn streams(&self, path: &Path) -> Result<StreamSignature>;
}

/// Interface for concatenating and converting media files
pub trait StreamTransformer: MediaProbe + Debug {
    /// Concatenate the video and audio streams of all inputs, in order, into the output.
    fn concat(&self, inputs: &[&Path], output: &Path, mode: ConcatMode) -> Result<()>;

    /// Convert the input into the given container.
    fn normalize(
        &self,
        input: &Path,
        output: &Path,
        container: Container,
        mode: NormalizeMode,
    ) -> Result<()>;
}

/// Interface for the [ffmpeg & ffprobe](https://ffmpeg.org) programs
#[derive(Debug)]
pub struct Ffmpeg;

impl Ffmpeg {
    /// Verify that the `ffmpeg` and `ffprobe` binaries are reachable
    pub fn new() -> Result<Self> {
        assert_success_command(FFMPEG, |cmd| cmd.arg("-version"))?;
        assert_success_command(FFPROBE, |cmd| cmd.arg("-version"))?;

        Ok(Self)
    }

    fn probe(&self, path: &Path) -> Result<ProbeJson> {
        let res = run_command(
            FFPROBE,
            |cmd| {
                cmd.args(["-v", "error"])
                    .args([
                        "-show_entries",
                        "format=duration:stream=codec_type,codec_name,width,height,pix_fmt,sample_rate,channels",
                    ])
                    .args(["-of", "json"])
                    .arg(path)
            },
            Capture::STDOUT | Capture::STDERR,
        )?;
        check_status(FFPROBE, &res)?;

        parse_probe(&String::from_utf8_lossy(&res.stdout))
    }
}

impl MediaProbe for Ffmpeg {
    fn duration(&self, path: &Path) -> Result<f64> {
        let probe = self
            .probe(path)
            .map_err(|err| err.wrap_err_with(|| format!("Could not probe {}", path.display())))?;
        Ok(probe.duration()?)
    }

    fn streams(&self, path: &Path) -> Result<StreamSignature> {
        let probe = self
            .probe(path)
            .map_err(|err| err.wrap_err_with(|| format!("Could not probe {}", path.display())))?;
        Ok(probe.signature())
    }
}

impl StreamTransformer for Ffmpeg {
    fn concat(&self, inputs: &[&Path], output: &Path, mode: ConcatMode) -> Result<()> {
        match mode {
            ConcatMode::StreamCopy => {
                // The concat demuxer reads the inputs from a list file,
                // relative paths in it would be resolved from the list location
                let mut absolute = Vec::with_capacity(inputs.len());
                for input in inputs {
                    absolute.push(input.canonicalize().into_diagnostic().wrap_err_with(|| {
                        format!("Could not resolve the path of {}", input.display())
                    })?);
                }

                let list = output.with_extension("txt");
                std::fs::write(&list, concat_list(&absolute))
                    .into_diagnostic()
                    .wrap_err("Could not write the concat list file")?;

                assert_success_command(FFMPEG, |cmd| {
                    cmd.args(FFXXX_DEFAULT_ARGS)
                        .arg("-y")
                        .args(["-f", "concat", "-safe", "0"])
                        .args([OsStr::new("-i"), list.as_os_str()])
                        .args(["-c", "copy"])
                        .arg(output)
                })
            }
            ConcatMode::Transcode { width, height } => {
                let filter = concat_filter(inputs.len(), width, height);

                assert_success_command(FFMPEG, |cmd| {
                    cmd.args(FFXXX_DEFAULT_ARGS).arg("-y");
                    for input in inputs {
                        cmd.args([OsStr::new("-i"), input.as_os_str()]);
                    }
                    cmd.args(["-filter_complex", &filter])
                        .args(["-map", "[v]", "-map", "[a]"])
                        .args(["-c:v", "libx264", "-preset", "veryfast", "-crf", "20"])
                        .args(["-c:a", "aac", "-b:a", "160k"])
                        .arg(output)
                })
            }
        }
    }

    fn normalize(
        &self,
        input: &Path,
        output: &Path,
        container: Container,
        mode: NormalizeMode,
    ) -> Result<()> {
        assert_success_command(FFMPEG, |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .arg("-y")
                .args([OsStr::new("-i"), input.as_os_str()])
                .args(["-map", "0:v:0", "-map", "0:a:0"]);

            match mode {
                NormalizeMode::StreamCopy => cmd.args(["-c", "copy"]),
                NormalizeMode::Transcode => cmd
                    .args(["-c:v", "libx264", "-preset", "veryfast", "-crf", "20"])
                    .args(["-c:a", "aac", "-b:a", "160k"]),
            };

            if container == Container::Mp4 {
                cmd.args(["-movflags", "+faststart"]);
            }

            // The output may be a tempfile without the right extension
            cmd.args(["-f", container_format(container)]).arg(output)
        })
    }
}

fn container_format(container: Container) -> &'static str {
    match container {
        Container::Mp4 => "mp4",
        Container::Mkv => "matroska",
    }
}

/// Build the content of a concat demuxer list file
fn concat_list<P: AsRef<Path>>(inputs: &[P]) -> String {
    inputs
        .iter()
        .map(|p| {
            // Quotes are escaped by closing the string, adding an escaped quote and reopening it
            let path = p.as_ref().to_string_lossy().replace('\'', r"'\''");
            format!("file '{path}'\n")
        })
        .collect()
}

/// Build the `concat` filter graph joining `n` inputs with one video and one audio stream each.
///
/// Every video is fitted into `width`x`height` and every audio resampled
/// so that inputs of different formats can be joined.
fn concat_filter(n: usize, width: u32, height: u32) -> String {
    let mut filter = String::new();

    for i in 0..n {
        filter.push_str(&format!(
            "[{i}:v:0]scale={width}:{height}:force_original_aspect_ratio=decrease,\
            pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1[v{i}];\
            [{i}:a:0]aresample=48000[a{i}];"
        ));
    }
    for i in 0..n {
        filter.push_str(&format!("[v{i}][a{i}]"));
    }
    filter.push_str(&format!("concat=n={n}:v=1:a=1[v][a]"));

    filter
}

#[derive(Debug, Deserialize)]
struct ProbeJson {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe(output: &str) -> Result<ProbeJson> {
    Ok(serde_json::from_str(output)
        .into_diagnostic()
        .wrap_err("Could not parse ffprobe JSON output")?)
}

impl ProbeJson {
    fn duration(&self) -> miette::Result<f64> {
        let raw = self
            .format
            .as_ref()
            .and_then(|format| format.duration.as_deref())
            .ok_or_else(|| miette!("No duration in ffprobe output"))?;

        let duration: f64 = raw
            .trim()
            .parse()
            .into_diagnostic()
            .wrap_err_with(|| format!("Duration '{raw}' is not a number"))?;

        if duration.is_finite() && duration > 0.0 {
            Ok(duration)
        } else {
            Err(miette!("Duration '{raw}' is not a positive number"))
        }
    }

    fn signature(&self) -> StreamSignature {
        let of_type = |ty: &str| {
            self.streams
                .iter()
                .find(|s| s.codec_type.as_deref() == Some(ty) && s.codec_name.is_some())
        };

        let video = of_type("video").map(|s| VideoStream {
            codec: s.codec_name.clone().unwrap_or_default(),
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            pix_fmt: s.pix_fmt.clone(),
        });

        let audio = of_type("audio").map(|s| AudioStream {
            codec: s.codec_name.clone().unwrap_or_default(),
            sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
            channels: s.channels,
        });

        StreamSignature { video, audio }
    }
}
