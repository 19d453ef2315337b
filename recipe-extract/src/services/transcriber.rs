//! Speech-to-text with bounded retry on transient failures

use std::path::Path;
use std::sync::Arc;

use crate::types::{CapabilityError, SpeechToText};
use crate::utils::{retry_with_backoff, RetryPolicy};

pub struct Transcriber {
    speech_to_text: Arc<dyn SpeechToText>,
    policy: RetryPolicy,
}

impl Transcriber {
    pub fn new(speech_to_text: Arc<dyn SpeechToText>, policy: RetryPolicy) -> Self {
        Self { speech_to_text, policy }
    }

    /// Transcribe, retrying connection failures and timeouts (2s, 4s, ...)
    pub async fn transcribe(&self, audio: &Path) -> Result<String, CapabilityError> {
        retry_with_backoff(
            "transcription",
            self.policy,
            || self.speech_to_text.transcribe(audio),
            CapabilityError::is_transient,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakySpeech {
        calls: AtomicU32,
        failures: u32,
        transient: bool,
    }

    #[async_trait::async_trait]
    impl SpeechToText for FlakySpeech {
        async fn transcribe(&self, _audio: &Path) -> Result<String, CapabilityError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.transient {
                    Err(CapabilityError::Network("connection reset by peer".into()))
                } else {
                    Err(CapabilityError::Api { status: 400, message: "bad audio".into() })
                }
            } else {
                Ok("add the flour".to_string())
            }
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let speech = Arc::new(FlakySpeech { calls: AtomicU32::new(0), failures: 2, transient: true });
        let transcriber = Transcriber::new(speech.clone(), policy());

        let text = transcriber.transcribe(Path::new("audio.mp3")).await.unwrap();
        assert_eq!(text, "add the flour");
        assert_eq!(speech.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_attempts() {
        let speech = Arc::new(FlakySpeech { calls: AtomicU32::new(0), failures: 10, transient: true });
        let transcriber = Transcriber::new(speech.clone(), policy());

        assert!(transcriber.transcribe(Path::new("audio.mp3")).await.is_err());
        assert_eq!(speech.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let speech = Arc::new(FlakySpeech { calls: AtomicU32::new(0), failures: 1, transient: false });
        let transcriber = Transcriber::new(speech.clone(), policy());

        let err = transcriber.transcribe(Path::new("audio.mp3")).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Api { status: 400, .. }));
        assert_eq!(speech.calls.load(Ordering::SeqCst), 1);
    }
}
