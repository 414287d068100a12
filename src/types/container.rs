use serde::Deserialize;

/// Media container used for files written by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Mkv,
}

impl Container {
    /// Return the extension with the leading dot.
    /// e.g. ".ext"
    pub fn with_dot(self) -> &'static str {
        match self {
            Container::Mp4 => ".mp4",
            Container::Mkv => ".mkv",
        }
    }

    /// Return the extension without the leading dot.
    /// e.g. "ext"
    pub fn with_no_dot(self) -> &'static str {
        &self.with_dot()[1..]
    }

    /// Whether the container can hold streams of these codecs as-is.
    ///
    /// Matroska accepts nearly everything, MP4 is only considered
    /// for the usual H.264/AAC pairing.
    pub fn accepts_codecs(self, video_codec: &str, audio_codec: &str) -> bool {
        match self {
            Container::Mkv => true,
            Container::Mp4 => video_codec == "h264" && audio_codec == "aac",
        }
    }
}
