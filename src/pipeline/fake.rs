//! In-memory stand-ins for the external tools.

use std::{
    cell::RefCell,
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    outside::{ClipDownloader, ConcatMode, MediaProbe, NormalizeMode, StreamTransformer},
    result::{bail, Error, Result},
    types::{AudioStream, Container, StreamSignature, VideoStream},
};

/// Fake media files are text files holding `<duration>\n<video codec>\n<audio codec>`,
/// an empty audio codec standing for a clip without sound
#[derive(Debug, Default)]
pub struct FakeMedia {
    /// Known clips and their duration, any other clip is unavailable
    clips: HashMap<String, (f64, String, String)>,
    pub fail_concat: bool,
    pub fail_normalize: bool,

    pub downloads: RefCell<Vec<String>>,
    pub concats: RefCell<Vec<(Vec<PathBuf>, ConcatMode)>>,
    pub normalizations: RefCell<Vec<NormalizeMode>>,
}

impl FakeMedia {
    pub fn with_clip(self, clip_ref: &str, duration: f64) -> Self {
        self.with_codec_clip(clip_ref, duration, "h264")
    }

    pub fn with_codec_clip(mut self, clip_ref: &str, duration: f64, codec: &str) -> Self {
        self.clips.insert(
            clip_ref.to_string(),
            (duration, codec.to_string(), "aac".to_string()),
        );
        self
    }

    pub fn with_silent_clip(mut self, clip_ref: &str, duration: f64) -> Self {
        self.clips.insert(
            clip_ref.to_string(),
            (duration, "h264".to_string(), String::new()),
        );
        self
    }

    fn read(path: &Path) -> Result<(f64, String, String)> {
        let content = std::fs::read_to_string(path)?;
        let mut lines = content.lines();
        let duration = lines.next().and_then(|l| l.parse().ok()).unwrap_or(0.0);
        let codec = lines.next().unwrap_or_default().to_string();
        let audio = lines.next().unwrap_or_default().to_string();
        Ok((duration, codec, audio))
    }
}

impl ClipDownloader for FakeMedia {
    fn download(&self, clip_ref: &str, path: &Path) -> Result<()> {
        self.downloads.borrow_mut().push(clip_ref.to_string());
        match self.clips.get(clip_ref) {
            Some((duration, codec, audio)) => {
                Ok(std::fs::write(path, format!("{duration}\n{codec}\n{audio}"))?)
            }
            None => Err(Error::UnavailableStream),
        }
    }
}

impl MediaProbe for FakeMedia {
    fn duration(&self, path: &Path) -> Result<f64> {
        let (duration, _, _) = Self::read(path)?;
        if duration > 0.0 {
            Ok(duration)
        } else {
            bail("Not a positive duration")
        }
    }

    fn streams(&self, path: &Path) -> Result<StreamSignature> {
        let (_, codec, audio) = Self::read(path)?;
        let audio = (!audio.is_empty()).then(|| AudioStream {
            codec: audio,
            sample_rate: Some(48000),
            channels: Some(2),
        });
        Ok(StreamSignature {
            video: Some(VideoStream {
                codec,
                width: 1920,
                height: 1080,
                pix_fmt: Some("yuv420p".into()),
            }),
            audio,
        })
    }
}

impl StreamTransformer for FakeMedia {
    fn concat(&self, inputs: &[&Path], output: &Path, mode: ConcatMode) -> Result<()> {
        self.concats
            .borrow_mut()
            .push((inputs.iter().map(|p| p.to_path_buf()).collect(), mode));
        if self.fail_concat {
            return bail("ffmpeg did run but was not successful (exit status: 1)");
        }

        let mut total = 0.0;
        let mut codec = "h264".to_string();
        for (i, input) in inputs.iter().enumerate() {
            let (duration, input_codec, _) = Self::read(input)?;
            total += duration;
            if i == 0 && mode == ConcatMode::StreamCopy {
                codec = input_codec;
            }
        }
        Ok(std::fs::write(output, format!("{total}\n{codec}\naac"))?)
    }

    fn normalize(
        &self,
        input: &Path,
        output: &Path,
        _container: Container,
        mode: NormalizeMode,
    ) -> Result<()> {
        self.normalizations.borrow_mut().push(mode);
        if self.fail_normalize {
            // Like ffmpeg, a failing run may leave a partial output behind
            std::fs::write(output, "partial")?;
            return bail("ffmpeg did run but was not successful (exit status: 1)");
        }
        std::fs::copy(input, output)?;
        Ok(())
    }
}
