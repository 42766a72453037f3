use crate::error::{ConvertError, ConvertResult};
use crate::types::{StreamFormat, StreamSelection, TargetFormat};
use std::cmp::Ordering;
use tracing::debug;

/// Picks source streams for a target format
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamResolver;

impl StreamResolver {
    pub fn new() -> Self {
        Self
    }

    /// Select the best source stream(s) for the requested format.
    ///
    /// mp3 prefers an audio-only stream and falls back to a combined one.
    /// mp4 prefers a combined MP4 that can be passed through untouched, then a
    /// video-only + audio-only pair, then any combined stream to re-encode.
    pub fn resolve(
        &self,
        formats: &[StreamFormat],
        target: TargetFormat,
    ) -> ConvertResult<StreamSelection> {
        let candidates: Vec<&StreamFormat> =
            formats.iter().filter(|f| f.is_directly_fetchable()).collect();

        debug!(
            "Resolving {} stream from {} fetchable formats",
            target,
            candidates.len()
        );

        let selection = match target {
            TargetFormat::Mp3 => Self::best_audio(&candidates)
                .map(|audio| StreamSelection::AudioOnly {
                    audio: audio.clone(),
                })
                .or_else(|| {
                    Self::best_combined(&candidates, |_| true).map(|source| {
                        StreamSelection::Combined {
                            source: source.clone(),
                        }
                    })
                }),
            TargetFormat::Mp4 => Self::best_combined(&candidates, StreamFormat::is_mp4_compatible)
                .map(|source| StreamSelection::Combined {
                    source: source.clone(),
                })
                .or_else(|| {
                    let video = Self::best_video(&candidates)?;
                    let audio = Self::best_audio(&candidates)?;
                    Some(StreamSelection::Separate {
                        video: video.clone(),
                        audio: audio.clone(),
                    })
                })
                .or_else(|| {
                    Self::best_combined(&candidates, |_| true).map(|source| {
                        StreamSelection::Combined {
                            source: source.clone(),
                        }
                    })
                }),
        };

        let selection = selection.ok_or_else(|| ConvertError::NoSuitableStream {
            format: target.to_string(),
        })?;

        debug!("Selected {} source for {}", selection.kind(), target);
        Ok(selection)
    }

    fn best_audio<'a>(candidates: &[&'a StreamFormat]) -> Option<&'a StreamFormat> {
        candidates
            .iter()
            .copied()
            .filter(|f| f.is_audio_only())
            .max_by(|a, b| compare_bitrate(a, b))
    }

    /// H.264 first since it is copied into the output, then resolution
    fn best_video<'a>(candidates: &[&'a StreamFormat]) -> Option<&'a StreamFormat> {
        candidates
            .iter()
            .copied()
            .filter(|f| f.is_video_only())
            .max_by(|a, b| {
                a.is_h264()
                    .cmp(&b.is_h264())
                    .then_with(|| compare_video(a, b))
            })
    }

    fn best_combined<'a>(
        candidates: &[&'a StreamFormat],
        accept: impl Fn(&StreamFormat) -> bool,
    ) -> Option<&'a StreamFormat> {
        candidates
            .iter()
            .copied()
            .filter(|f| f.is_combined() && accept(*f))
            .max_by(|a, b| compare_video(a, b))
    }
}

/// Higher declared bitrate wins; ties go to the later platform order
fn compare_bitrate(a: &StreamFormat, b: &StreamFormat) -> Ordering {
    let a_rate = a.bitrate_kbps.unwrap_or(0.0);
    let b_rate = b.bitrate_kbps.unwrap_or(0.0);
    a_rate
        .total_cmp(&b_rate)
        .then_with(|| a.order.cmp(&b.order))
}

fn compare_video(a: &StreamFormat, b: &StreamFormat) -> Ordering {
    a.height
        .unwrap_or(0)
        .cmp(&b.height.unwrap_or(0))
        .then_with(|| compare_bitrate(a, b))
}
