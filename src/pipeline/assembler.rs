use std::path::{Path, PathBuf};

use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::{debug, info};

use crate::{
    io::named_tempfile_in,
    outside::{ConcatMode, NormalizeMode, StreamTransformer},
    types::{AssemblyBatch, Container, FetchedClip, StreamSignature},
};

/// Resolution used when the first input has no usable video size
const FALLBACK_RESOLUTION: (u32, u32) = (1920, 1080);

/// Name of the concatenated file in the work directory
const INTERMEDIATE_NAME: &str = "combined";

/// Concatenates a batch of clips into a single distribution file.
pub struct Assembler<'a> {
    stream_tsf: &'a dyn StreamTransformer,
    work_dir: &'a Path,
    output: &'a Path,
    container: Container,
}

impl<'a> Assembler<'a> {
    pub fn new(
        stream_tsf: &'a dyn StreamTransformer,
        work_dir: &'a Path,
        output: &'a Path,
        container: Container,
    ) -> Self {
        Self {
            stream_tsf,
            work_dir,
            output,
            container,
        }
    }

    /// Shuffle the batch, concatenate it into an intermediate file of the
    /// work directory, then convert that file into the output.
    ///
    /// The output path is only written if every step succeeded.
    pub fn assemble(&self, batch: AssemblyBatch, rng: &mut fastrand::Rng) -> Result<PathBuf> {
        if batch.is_empty() {
            return Err(miette!("The batch is empty, there is nothing to assemble"));
        }

        let clips = presentation_order(batch.into_clips(), rng);
        debug!(
            "Presentation order: {:?}",
            clips.iter().map(|c| c.index).collect::<Vec<_>>()
        );
        let inputs: Vec<&Path> = clips.iter().map(|c| c.path.as_path()).collect();

        let mut signatures = Vec::with_capacity(inputs.len());
        for input in &inputs {
            signatures.push(
                self.stream_tsf
                    .streams(input)
                    .map_err(miette::Report::from)
                    .wrap_err_with(|| format!("Could not probe {}", input.display()))?,
            );
        }

        let intermediate = self
            .work_dir
            .join(format!("{INTERMEDIATE_NAME}{}", Container::Mkv.with_dot()));
        let mode = concat_mode(&signatures);
        info!("Concatenating {} clips ({mode:?})", inputs.len());
        self.stream_tsf
            .concat(&inputs, &intermediate, mode)
            .map_err(miette::Report::from)
            .wrap_err("Could not concatenate the clips")?;

        let signature = self
            .stream_tsf
            .streams(&intermediate)
            .map_err(miette::Report::from)
            .wrap_err("Could not probe the concatenated file")?;

        let out_dir = self
            .output
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let tmp = named_tempfile_in(out_dir, self.container)?;
        let mode = normalize_mode(&signature, self.container);
        info!("Converting to {} ({mode:?})", self.container.with_no_dot());
        self.stream_tsf
            .normalize(&intermediate, tmp.path(), self.container, mode)
            .map_err(miette::Report::from)
            .wrap_err("Could not convert the concatenated file")?;

        tmp.persist(self.output)
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not write {}", self.output.display()))?;

        Ok(self.output.to_path_buf())
    }
}

/// Uniformly random order of the clips, unrelated to their ranking
pub fn presentation_order(
    mut clips: Vec<FetchedClip>,
    rng: &mut fastrand::Rng,
) -> Vec<FetchedClip> {
    rng.shuffle(&mut clips);
    clips
}

/// Packets can only be copied if every input has the exact same stream layout
pub fn concat_mode(signatures: &[StreamSignature]) -> ConcatMode {
    let all_same = signatures
        .first()
        .map(|first| {
            first.is_complete() && signatures.iter().all(|signature| signature == first)
        })
        .unwrap_or(false);

    if all_same {
        return ConcatMode::StreamCopy;
    }

    let (width, height) = signatures
        .first()
        .and_then(|s| s.video.as_ref())
        .filter(|v| v.width > 0 && v.height > 0)
        .map(|v| (v.width, v.height))
        .unwrap_or(FALLBACK_RESOLUTION);

    ConcatMode::Transcode { width, height }
}

/// Re-encode only if the container cannot hold the current codecs
pub fn normalize_mode(signature: &StreamSignature, container: Container) -> NormalizeMode {
    match signature.codecs() {
        Some((video, audio)) if container.accepts_codecs(video, audio) => {
            NormalizeMode::StreamCopy
        }
        _ => NormalizeMode::Transcode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::fake::FakeMedia,
        types::{AudioStream, ClipCandidate, VideoStream},
    };

    fn signature(video_codec: &str, width: u32) -> StreamSignature {
        StreamSignature {
            video: Some(VideoStream {
                codec: video_codec.into(),
                width,
                height: 720,
                pix_fmt: Some("yuv420p".into()),
            }),
            audio: Some(AudioStream {
                codec: "aac".into(),
                sample_rate: Some(48000),
                channels: Some(2),
            }),
        }
    }

    /// Write fake media files for the given durations, as the fetcher would
    fn fetched(dir: &Path, media: &FakeMedia, durations: &[f64]) -> AssemblyBatch {
        use crate::outside::ClipDownloader;

        let clips = durations
            .iter()
            .enumerate()
            .map(|(index, &duration)| {
                let clip_ref = format!("clip/{index}");
                let path = dir.join(format!("{index}.mkv"));
                assert!(duration > 0.0);
                media.download(&clip_ref, &path).unwrap();
                FetchedClip {
                    index,
                    path,
                    duration,
                    candidate: ClipCandidate::new("chan", clip_ref, 100),
                }
            })
            .collect();
        AssemblyBatch::new(clips)
    }

    fn media_for(durations: &[f64]) -> FakeMedia {
        durations
            .iter()
            .enumerate()
            .fold(FakeMedia::default(), |media, (i, &d)| {
                media.with_clip(&format!("clip/{i}"), d)
            })
    }

    #[test]
    fn order_is_a_permutation() {
        let clips: Vec<FetchedClip> = (0..20)
            .map(|index| FetchedClip {
                index,
                path: format!("{index}.mkv").into(),
                duration: 1.0,
                candidate: ClipCandidate::new("chan", format!("clip/{index}"), 1),
            })
            .collect();

        let mut rng = fastrand::Rng::with_seed(3);
        let mut orders = Vec::new();
        for _ in 0..5 {
            let order = presentation_order(clips.clone(), &mut rng);
            let mut indexes: Vec<_> = order.iter().map(|c| c.index).collect();
            orders.push(indexes.clone());
            indexes.sort_unstable();
            assert_eq!(indexes, (0..20).collect::<Vec<_>>());
        }

        // 20! orders, five identical draws would mean the shuffle does nothing
        assert!(orders.iter().any(|o| o != &orders[0]));
    }

    #[test]
    fn identical_inputs_are_copied() {
        let sigs = vec![signature("h264", 1280); 3];
        assert_eq!(concat_mode(&sigs), ConcatMode::StreamCopy);
    }

    #[test]
    fn mismatched_inputs_are_transcoded() {
        let sigs = vec![signature("h264", 1280), signature("h264", 1920)];
        assert_eq!(
            concat_mode(&sigs),
            ConcatMode::Transcode {
                width: 1280,
                height: 720
            }
        );

        let sigs = vec![signature("h264", 1280), signature("vp9", 1280)];
        assert!(matches!(concat_mode(&sigs), ConcatMode::Transcode { .. }));
    }

    #[test]
    fn inputs_without_audio_are_transcoded() {
        let mut silent = signature("h264", 1280);
        silent.audio = None;
        let sigs = vec![silent.clone(), silent];
        assert!(matches!(concat_mode(&sigs), ConcatMode::Transcode { .. }));
    }

    #[test]
    fn missing_resolution_falls_back() {
        let sigs = vec![StreamSignature::default(), signature("h264", 1280)];
        assert_eq!(
            concat_mode(&sigs),
            ConcatMode::Transcode {
                width: FALLBACK_RESOLUTION.0,
                height: FALLBACK_RESOLUTION.1
            }
        );
    }

    #[test]
    fn normalization_copies_compatible_codecs() {
        assert_eq!(
            normalize_mode(&signature("h264", 1280), Container::Mp4),
            NormalizeMode::StreamCopy
        );
        assert_eq!(
            normalize_mode(&signature("vp9", 1280), Container::Mp4),
            NormalizeMode::Transcode
        );
        assert_eq!(
            normalize_mode(&signature("vp9", 1280), Container::Mkv),
            NormalizeMode::StreamCopy
        );
        assert_eq!(
            normalize_mode(&StreamSignature::default(), Container::Mkv),
            NormalizeMode::Transcode
        );
    }

    #[test]
    fn assembles_every_clip_once() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let durations = [10.0, 20.0, 30.0, 40.0];
        let media = media_for(&durations);
        let batch = fetched(work.path(), &media, &durations);
        let output = out.path().join("highlights.mp4");

        let res = Assembler::new(&media, work.path(), &output, Container::Mp4)
            .assemble(batch, &mut fastrand::Rng::with_seed(1))
            .unwrap();

        assert_eq!(res, output);
        assert!(output.exists());
        assert_eq!(out.path().read_dir().unwrap().count(), 1);

        let concats = media.concats.borrow();
        assert_eq!(concats.len(), 1);
        let (inputs, mode) = &concats[0];
        assert_eq!(*mode, ConcatMode::StreamCopy);
        let mut names: Vec<_> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["0.mkv", "1.mkv", "2.mkv", "3.mkv"]);
        assert_eq!(*media.normalizations.borrow(), [NormalizeMode::StreamCopy]);

        // The intermediate file stays in the work directory
        assert!(work.path().join("combined.mkv").exists());
    }

    #[test]
    fn mixed_codecs_are_transcoded() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let media = FakeMedia::default()
            .with_clip("clip/0", 10.0)
            .with_codec_clip("clip/1", 10.0, "vp9");
        let batch = fetched(work.path(), &media, &[10.0, 10.0]);
        let output = out.path().join("highlights.mp4");

        Assembler::new(&media, work.path(), &output, Container::Mp4)
            .assemble(batch, &mut fastrand::Rng::with_seed(1))
            .unwrap();

        let concats = media.concats.borrow();
        assert!(matches!(concats[0].1, ConcatMode::Transcode { .. }));
    }

    #[test]
    fn empty_batch_produces_nothing() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let media = FakeMedia::default();
        let output = out.path().join("highlights.mp4");

        let res = Assembler::new(&media, work.path(), &output, Container::Mp4)
            .assemble(AssemblyBatch::default(), &mut fastrand::Rng::with_seed(1));

        assert!(res.is_err());
        assert!(media.concats.borrow().is_empty());
        assert_eq!(out.path().read_dir().unwrap().count(), 0);
    }

    #[test]
    fn failed_concatenation_is_fatal() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut media = media_for(&[10.0, 20.0]);
        media.fail_concat = true;
        let batch = fetched(work.path(), &media, &[10.0, 20.0]);
        let output = out.path().join("highlights.mp4");

        let res = Assembler::new(&media, work.path(), &output, Container::Mp4)
            .assemble(batch, &mut fastrand::Rng::with_seed(1));

        assert!(res.is_err());
        assert!(media.normalizations.borrow().is_empty());
        assert_eq!(out.path().read_dir().unwrap().count(), 0);
        // Fetched media is left in place for inspection
        assert!(work.path().join("0.mkv").exists());
    }

    #[test]
    fn failed_normalization_publishes_nothing() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut media = media_for(&[10.0, 20.0]);
        media.fail_normalize = true;
        let batch = fetched(work.path(), &media, &[10.0, 20.0]);
        let output = out.path().join("highlights.mp4");

        let res = Assembler::new(&media, work.path(), &output, Container::Mp4)
            .assemble(batch, &mut fastrand::Rng::with_seed(1));

        assert!(res.is_err());
        assert!(!output.exists());
        assert_eq!(out.path().read_dir().unwrap().count(), 0);
    }
}
