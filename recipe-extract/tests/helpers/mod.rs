//! Test helpers for recipe-extract integration tests
//!
//! Fake capabilities stand in for yt-dlp, ffmpeg, tesseract and the
//! inference API so the whole pipeline runs against a temporary database.

#![allow(dead_code)]

use recipe_common::events::EventBus;
use recipe_extract::config::ExtractConfig;
use recipe_extract::models::{JobStatus, VideoMetadata};
use recipe_extract::services::ExtractionService;
use recipe_extract::types::{
    Capabilities, CapabilityError, ChatModel, ChatRequest, MediaTranscoder, OcrEngine,
    ProgressCallback, SpeechToText, VideoSource,
};
use recipe_extract::utils::RetryPolicy;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use uuid::Uuid;

pub const USER: &str = "user-1";
pub const OTHER_USER: &str = "user-2";
pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const VIDEO_ID: &str = "dQw4w9WgXcQ";

/// Three recipes, the last with no components (filtered out)
pub const THREE_RECIPES_ONE_INVALID: &str = r#"```json
[
  {
    "title": "Fluffy Pancakes",
    "servings": "4",
    "components": [
      {
        "name": "Batter",
        "ingredients": [{"quantity": 2, "unit": "cups", "name": "flour"}],
        "steps": [{"instruction": "Whisk everything together"}, {"instruction": "Cook on a hot griddle"}]
      }
    ],
    "confidence": 0.9
  },
  {
    "title": "Maple Butter",
    "components": [
      {"name": "Butter", "ingredients": [{"name": "butter"}, {"name": "maple syrup"}], "steps": []}
    ]
  },
  {"title": "Serving Suggestions", "components": []}
]
```"#;

/// Only invalid recipes
pub const NO_VALID_RECIPES: &str = r#"[{"title": "", "components": []}]"#;

const VISION_RESPONSE: &str =
    r#"{"ingredients": ["2 cups flour"], "steps": ["Whisk the batter"], "other_text": ""}"#;

/// Video tool fake
pub struct FakeVideoSource {
    pub duration_seconds: u64,
    pub fail_metadata: bool,
    pub fail_download: bool,
    /// Download never returns (until the run is cancelled)
    pub block_download: bool,
    pub metadata_calls: AtomicU32,
    pub download_calls: AtomicU32,
}

impl Default for FakeVideoSource {
    fn default() -> Self {
        Self {
            duration_seconds: 600,
            fail_metadata: false,
            fail_download: false,
            block_download: false,
            metadata_calls: AtomicU32::new(0),
            download_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl VideoSource for FakeVideoSource {
    async fn fetch_metadata(&self, _video_id: &str) -> Result<VideoMetadata, CapabilityError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_metadata {
            return Err(CapabilityError::ToolFailed {
                tool: "yt-dlp".to_string(),
                stderr: "ERROR: Video unavailable".to_string(),
            });
        }
        Ok(VideoMetadata {
            title: "Sunday Pancakes".to_string(),
            duration_seconds: self.duration_seconds,
            channel: "Test Kitchen".to_string(),
            thumbnail_url: "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".to_string(),
            description: Some("Ingredients: 2 cups flour, 2 eggs, 1 cup milk".to_string()),
        })
    }

    async fn download(
        &self,
        _video_id: &str,
        output_dir: &Path,
        on_progress: ProgressCallback,
    ) -> Result<PathBuf, CapabilityError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.block_download {
            std::future::pending::<()>().await;
        }
        if self.fail_download {
            return Err(CapabilityError::ToolFailed {
                tool: "yt-dlp".to_string(),
                stderr: "ERROR: HTTP Error 403: Forbidden".to_string(),
            });
        }

        on_progress(50.0);
        on_progress(100.0);

        let path = output_dir.join("video.mp4");
        tokio::fs::write(&path, b"fake video").await?;
        Ok(path)
    }
}

/// ffmpeg fake writing placeholder files
pub struct FakeTranscoder {
    pub frame_count: usize,
}

#[async_trait::async_trait]
impl MediaTranscoder for FakeTranscoder {
    async fn extract_audio(&self, _video: &Path, output_dir: &Path) -> Result<PathBuf, CapabilityError> {
        let path = output_dir.join("audio.mp3");
        tokio::fs::write(&path, b"fake audio").await?;
        Ok(path)
    }

    async fn extract_scene_frames(
        &self,
        _video: &Path,
        output_dir: &Path,
        _threshold: f32,
    ) -> Result<Vec<PathBuf>, CapabilityError> {
        let mut frames = Vec::with_capacity(self.frame_count);
        for i in 1..=self.frame_count {
            let path = output_dir.join(format!("frame_{:04}.jpg", i));
            tokio::fs::write(&path, b"fake jpeg").await?;
            frames.push(path);
        }
        Ok(frames)
    }
}

/// OCR fake: odd frames carry recipe text, even frames a channel logo
pub struct FakeOcr;

#[async_trait::async_trait]
impl OcrEngine for FakeOcr {
    async fn recognize(&self, image: &Path) -> Result<String, CapabilityError> {
        let name = image.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let number: usize = name
            .trim_start_matches("frame_")
            .trim_end_matches(".jpg")
            .parse()
            .unwrap_or(0);
        if number % 2 == 1 {
            Ok("Add 2 cups flour and 1 tsp salt".to_string())
        } else {
            Ok("Test Kitchen".to_string())
        }
    }
}

/// Speech fake; `pause` holds transcription until `release` is notified
#[derive(Default)]
pub struct FakeSpeech {
    pub pause: bool,
    pub panic: bool,
    pub entered: Notify,
    pub release: Notify,
    pub calls: AtomicU32,
}

#[async_trait::async_trait]
impl SpeechToText for FakeSpeech {
    async fn transcribe(&self, _audio: &Path) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.pause {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.panic {
            panic!("speech backend crashed");
        }
        Ok("Today we make pancakes. Whisk the flour with the milk.".to_string())
    }
}

/// Chat fake: image requests get a vision answer, text requests the synthesis answer
pub struct FakeChat {
    pub synthesis_response: String,
    pub vision_calls: AtomicU32,
    pub synthesis_calls: AtomicU32,
}

impl FakeChat {
    pub fn new(synthesis_response: &str) -> Self {
        Self {
            synthesis_response: synthesis_response.to_string(),
            vision_calls: AtomicU32::new(0),
            synthesis_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, request: ChatRequest) -> Result<String, CapabilityError> {
        if request.image.is_some() {
            self.vision_calls.fetch_add(1, Ordering::SeqCst);
            Ok(VISION_RESPONSE.to_string())
        } else {
            self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.synthesis_response.clone())
        }
    }
}

/// Knobs for a test service
pub struct Setup {
    pub video: FakeVideoSource,
    pub speech: FakeSpeech,
    pub frame_count: usize,
    pub synthesis_response: String,
    pub config: ExtractConfig,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            video: FakeVideoSource::default(),
            speech: FakeSpeech::default(),
            frame_count: 6,
            synthesis_response: THREE_RECIPES_ONE_INVALID.to_string(),
            config: ExtractConfig::default(),
        }
    }
}

/// Service wired to fakes; keep `_temp` alive for the test's duration
pub struct TestContext {
    pub _temp: TempDir,
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub service: ExtractionService,
    pub jobs_root: PathBuf,
    pub video: Arc<FakeVideoSource>,
    pub speech: Arc<FakeSpeech>,
    pub chat: Arc<FakeChat>,
}

pub async fn setup(setup: Setup) -> TestContext {
    let temp = TempDir::new().unwrap();
    let pool = recipe_extract::db::init_database_pool(&temp.path().join("recipes.db"))
        .await
        .unwrap();
    let jobs_root = temp.path().join("jobs");
    std::fs::create_dir_all(&jobs_root).unwrap();

    let video = Arc::new(setup.video);
    let speech = Arc::new(setup.speech);
    let chat = Arc::new(FakeChat::new(&setup.synthesis_response));

    let capabilities = Capabilities {
        video_source: video.clone(),
        transcoder: Arc::new(FakeTranscoder {
            frame_count: setup.frame_count,
        }),
        ocr: Arc::new(FakeOcr),
        speech_to_text: speech.clone(),
        chat: chat.clone(),
    };

    let event_bus = EventBus::new(100);
    let service = ExtractionService::new(
        pool.clone(),
        event_bus.clone(),
        setup.config,
        capabilities,
        jobs_root.clone(),
    )
    .with_transcription_policy(RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
    });

    TestContext {
        _temp: temp,
        pool,
        event_bus,
        service,
        jobs_root,
        video,
        speech,
        chat,
    }
}

pub async fn default_context() -> TestContext {
    setup(Setup::default()).await
}

/// Wait until the job's background run has fully unwound
pub async fn wait_until_finished(service: &ExtractionService, job_id: Uuid) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while service.is_running(job_id).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("background run did not finish in time");
}

/// Poll the job until it reaches `status`
pub async fn wait_for_status(service: &ExtractionService, job_id: Uuid, status: JobStatus) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let view = service.get_status(USER, job_id).await.unwrap();
            if view.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not reach expected status in time");
}

/// Submit and run one job to completion
pub async fn completed_job(ctx: &TestContext) -> Uuid {
    let outcome = ctx.service.submit(USER, VIDEO_URL).await.unwrap();
    wait_until_finished(&ctx.service, outcome.job_id).await;
    outcome.job_id
}
