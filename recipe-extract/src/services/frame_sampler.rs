//! Scene-change frame sampling

use std::path::Path;

use crate::models::SampledFrame;
use crate::types::{CapabilityError, MediaTranscoder};

/// Extract scene-change frames and attach approximate timestamps
pub async fn sample_frames(
    transcoder: &dyn MediaTranscoder,
    video: &Path,
    output_dir: &Path,
    threshold: f32,
    duration_seconds: u64,
) -> Result<Vec<SampledFrame>, CapabilityError> {
    let paths = transcoder.extract_scene_frames(video, output_dir, threshold).await?;
    let count = paths.len();

    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| SampledFrame {
            path,
            index,
            timestamp_seconds: approximate_timestamp(index, count, duration_seconds),
        })
        .collect())
}

/// Timestamp from ordinal position, spreading frames evenly over the duration
///
/// Scene detection does not report seek times, so this is an estimate. With
/// an unknown (zero) duration the index itself is used.
pub fn approximate_timestamp(index: usize, count: usize, duration_seconds: u64) -> f64 {
    if duration_seconds == 0 || count == 0 {
        return index as f64;
    }
    index as f64 * (duration_seconds as f64 / count as f64)
}
