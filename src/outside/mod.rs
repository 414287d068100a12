mod command;
mod ffmpeg;
mod ytdl;

pub use ffmpeg::{ConcatMode, Ffmpeg, MediaProbe, NormalizeMode, StreamTransformer};
pub use ytdl::{ClipDownloader, ClipInfo, ClipSource, Ytdl};
