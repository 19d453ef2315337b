//! tesseract backed [`OcrEngine`]

use std::path::Path;
use tokio::process::Command;

use super::process_runner::run_tool;
use crate::types::{CapabilityError, OcrEngine};

const TOOL: &str = "tesseract";

pub struct TesseractOcr {
    binary: String,
    /// e.g. "eng+spa"
    languages: String,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>, languages: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            languages: languages.into(),
        }
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &Path) -> Result<String, CapabilityError> {
        let mut command = Command::new(&self.binary);
        command
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages);

        let text = run_tool(TOOL, command).await?;
        Ok(text.trim().to_string())
    }
}
