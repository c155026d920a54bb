//! External video tools: `yt-dlp` for downloads, `ffmpeg` for re-encoding.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::MediaError;

/// WebM encoding preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPreset {
    Low,
    High,
}

impl VideoPreset {
    pub fn for_quality(low_quality: bool) -> Self {
        if low_quality {
            Self::Low
        } else {
            Self::High
        }
    }

    /// ffmpeg arguments placed between input and output.
    pub fn ffmpeg_args(&self) -> Vec<&'static str> {
        let mut args = vec!["-codec:v", "libvpx-vp9", "-b:v", "0"];
        match self {
            Self::Low => args.extend([
                "-crf",
                "40",
                "-vf",
                "scale=-2:'min(480,ih)'",
                "-codec:a",
                "libopus",
                "-b:a",
                "48k",
            ]),
            Self::High => args.extend(["-crf", "30", "-codec:a", "libopus", "-b:a", "128k"]),
        }
        args.extend(["-ar", "48000", "-max_muxing_queue_size", "9999"]);
        args
    }
}

/// Download and re-encode collaborators used by the video pipeline.
#[async_trait]
pub trait VideoTools: Send + Sync {
    /// Download `url` into `output_dir` as `<stem>.<ext>`; the extension is
    /// chosen by the downloader.
    async fn download(&self, url: &str, output_dir: &Path, stem: &str) -> Result<(), MediaError>;

    async fn reencode(&self, src: &Path, dst: &Path, preset: VideoPreset) -> Result<(), MediaError>;
}

/// `yt-dlp` + `ffmpeg` located in PATH.
#[derive(Debug, Clone)]
pub struct ExternalTools {
    ytdlp: PathBuf,
    ffmpeg: PathBuf,
}

impl ExternalTools {
    /// Find both binaries, failing when one is missing.
    pub fn locate() -> Result<Self, MediaError> {
        let find = |name: &str| {
            which::which(name).map_err(|_| MediaError::MissingBinary(name.to_string()))
        };
        Ok(Self {
            ytdlp: find("yt-dlp")?,
            ffmpeg: find("ffmpeg")?,
        })
    }
}

async fn run(mut cmd: Command, tool: &str) -> Result<(), MediaError> {
    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("{} stderr: {}", tool, stderr);
        return Err(MediaError::Tool {
            tool: tool.to_string(),
            message: stderr.lines().last().unwrap_or_default().to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl VideoTools for ExternalTools {
    async fn download(&self, url: &str, output_dir: &Path, stem: &str) -> Result<(), MediaError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let output_template = output_dir
            .join(format!("{}.%(ext)s", stem))
            .to_string_lossy()
            .to_string();

        let mut cmd = Command::new(&self.ytdlp);
        cmd.args([
            "--no-playlist",
            "--no-progress",
            "--no-check-certificates",
            "--retries",
            "20",
            "--fragment-retries",
            "50",
            "--skip-unavailable-fragments",
            "--format",
            "best[ext=webm]/bestvideo[ext=webm]+bestaudio[ext=webm]/best",
            "--output",
            &output_template,
        ]);
        cmd.arg(url);
        debug!("Downloading video {}", url);
        run(cmd, "yt-dlp").await
    }

    async fn reencode(&self, src: &Path, dst: &Path, preset: VideoPreset) -> Result<(), MediaError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-loglevel", "error", "-i"]);
        cmd.arg(src);
        cmd.args(preset.ffmpeg_args());
        cmd.arg(dst);
        debug!("Re-encoding {} with {:?}", src.display(), preset);
        run(cmd, "ffmpeg").await
    }
}

/// Pick the downloaded file for `stem` among the directory entries.
///
/// Thumbnails and partial downloads are ignored. An exact `<stem>.<ext>`
/// match wins over `<stem>.<format>.<ext>` leftovers; ties are broken by name
/// and logged.
pub fn pick_candidate(entries: &[PathBuf], stem: &str) -> Option<PathBuf> {
    let usable = |p: &&PathBuf| {
        let ext = p.extension().and_then(|e| e.to_str()).unwrap_or_default();
        !matches!(ext, "jpg" | "webp" | "part" | "ytdl" | "png")
    };
    let name_of = |p: &PathBuf| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    let mut exact: Vec<&PathBuf> = entries
        .iter()
        .filter(usable)
        .filter(|p| p.file_stem().is_some_and(|s| s.to_string_lossy() == stem))
        .collect();
    if exact.is_empty() {
        let prefix = format!("{}.", stem);
        exact = entries
            .iter()
            .filter(usable)
            .filter(|p| name_of(*p).starts_with(&prefix))
            .collect();
    }
    exact.sort_by_key(|p| name_of(*p));

    if exact.len() > 1 {
        warn!(
            "Multiple video file candidates for {}. Picking {} out of {:?}",
            stem,
            exact[0].display(),
            exact
        );
    }
    exact.first().map(|p| (*p).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_args() {
        let low = VideoPreset::for_quality(true).ffmpeg_args();
        assert!(low.windows(2).any(|w| w == ["-crf", "40"]));
        assert!(low.windows(2).any(|w| w == ["-b:a", "48k"]));
        let high = VideoPreset::for_quality(false).ffmpeg_args();
        assert!(high.windows(2).any(|w| w == ["-crf", "30"]));
        assert!(!high.contains(&"-vf"));
    }

    #[test]
    fn test_pick_candidate_prefers_exact_stem() {
        let entries = vec![
            PathBuf::from("/b/123.webp"),
            PathBuf::from("/b/123.f251.webm"),
            PathBuf::from("/b/123.mp4"),
            PathBuf::from("/b/456.webm"),
        ];
        assert_eq!(
            pick_candidate(&entries, "123"),
            Some(PathBuf::from("/b/123.mp4"))
        );
    }

    #[test]
    fn test_pick_candidate_is_deterministic() {
        let entries = vec![PathBuf::from("/b/9.webm"), PathBuf::from("/b/9.mkv")];
        assert_eq!(pick_candidate(&entries, "9"), Some(PathBuf::from("/b/9.mkv")));
        let reversed = vec![PathBuf::from("/b/9.mkv"), PathBuf::from("/b/9.webm")];
        assert_eq!(pick_candidate(&reversed, "9"), Some(PathBuf::from("/b/9.mkv")));
    }

    #[test]
    fn test_pick_candidate_falls_back_to_format_suffix() {
        let entries = vec![PathBuf::from("/b/7.f22.webm"), PathBuf::from("/b/7.jpg")];
        assert_eq!(
            pick_candidate(&entries, "7"),
            Some(PathBuf::from("/b/7.f22.webm"))
        );
        assert_eq!(pick_candidate(&entries, "8"), None);
    }
}
