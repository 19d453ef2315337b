//! ffmpeg backed [`MediaTranscoder`]

use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::process_runner::run_tool;
use crate::types::{CapabilityError, MediaTranscoder};

const TOOL: &str = "ffmpeg";

/// 32 kbit/s mono keeps an hour of audio near 14 MB, under the 25 MB upload limit
const AUDIO_BITRATE: &str = "32k";
const AUDIO_SAMPLE_RATE: &str = "16000";
const AUDIO_FILE: &str = "audio.mp3";
const FRAME_PREFIX: &str = "frame_";

pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(["-hide_banner", "-loglevel", "error", "-y"]);
        command
    }
}

#[async_trait::async_trait]
impl MediaTranscoder for FfmpegTranscoder {
    async fn extract_audio(&self, video: &Path, output_dir: &Path) -> Result<PathBuf, CapabilityError> {
        let audio_path = output_dir.join(AUDIO_FILE);

        let mut command = self.base_command();
        command
            .arg("-i")
            .arg(video)
            .args(["-vn", "-ac", "1", "-ar", AUDIO_SAMPLE_RATE, "-b:a", AUDIO_BITRATE])
            .arg(&audio_path);

        run_tool(TOOL, command).await?;
        Ok(audio_path)
    }

    async fn extract_scene_frames(
        &self,
        video: &Path,
        output_dir: &Path,
        threshold: f32,
    ) -> Result<Vec<PathBuf>, CapabilityError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let pattern = output_dir.join(format!("{}%04d.jpg", FRAME_PREFIX));

        let mut command = self.base_command();
        command
            .arg("-i")
            .arg(video)
            .arg("-vf")
            .arg(scene_filter(threshold))
            .args(["-vsync", "vfr", "-q:v", "2"])
            .arg(&pattern);

        run_tool(TOOL, command).await?;
        list_frames(output_dir).await
    }
}

/// Select filter keeping frames whose scene-change score exceeds `threshold`
pub fn scene_filter(threshold: f32) -> String {
    format!("select='gt(scene,{:.2})'", threshold)
}

/// Frame files in numeric order (`frame_0001.jpg`, `frame_0002.jpg`, ...)
async fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, CapabilityError> {
    let mut numbered: Vec<(u32, PathBuf)> = Vec::new();

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(number) = frame_number(&path) {
            numbered.push((number, path));
        }
    }

    numbered.sort_by_key(|(number, _)| *number);
    Ok(numbered.into_iter().map(|(_, path)| path).collect())
}

fn frame_number(path: &Path) -> Option<u32> {
    if path.extension().and_then(|e| e.to_str()) != Some("jpg") {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(FRAME_PREFIX)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_filter_expression() {
        assert_eq!(scene_filter(0.3), "select='gt(scene,0.30)'");
    }

    #[tokio::test]
    async fn test_frames_listed_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_0010.jpg", "frame_0002.jpg", "frame_0001.jpg", "notes.txt", "frame_x.jpg"] {
            tokio::fs::write(dir.path().join(name), b"").await.unwrap();
        }

        let frames = list_frames(dir.path()).await.unwrap();
        let names: Vec<_> = frames
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["frame_0001.jpg", "frame_0002.jpg", "frame_0010.jpg"]);
    }
}
