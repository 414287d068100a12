/// Properties of a video stream that must match for stream-copy concatenation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStream {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub pix_fmt: Option<String>,
}

/// Properties of an audio stream that must match for stream-copy concatenation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStream {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// The first video and audio streams of a media file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamSignature {
    pub video: Option<VideoStream>,
    pub audio: Option<AudioStream>,
}

impl StreamSignature {
    pub fn is_complete(&self) -> bool {
        self.video.is_some() && self.audio.is_some()
    }

    /// Return the `(video, audio)` codec names if both streams exist
    pub fn codecs(&self) -> Option<(&str, &str)> {
        match (&self.video, &self.audio) {
            (Some(v), Some(a)) => Some((&v.codec, &a.codec)),
            _ => None,
        }
    }
}
