//! Tesseract OCR engine.
//!
//! Runs the `tesseract` binary per recognition, piping the image through
//! stdin and reading text from stdout. The CLI reports no progress of its own,
//! so ticks are estimated while the process runs.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use labelscan_core::{EngineHandle, EngineProgress, ImageAsset, OcrEngine, ProgressSender};

const TICK_INTERVAL: Duration = Duration::from_millis(250);
/// Estimated progress never passes this until the process exits.
const ESTIMATE_CEILING: f32 = 0.95;

pub struct TesseractEngine {
    binary: String,
    page_segmentation: u8,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            page_segmentation: 3,
        }
    }

    async fn installed_languages(&self) -> Result<Vec<String>> {
        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .output()
            .await
            .with_context(|| format!("failed to run {} --list-langs", self.binary))?;
        if !output.status.success() {
            bail!(
                "{} --list-langs exited with {}",
                self.binary,
                output.status
            );
        }
        // Older releases print the list on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_language_list(&listing))
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

/// Parse `tesseract --list-langs` output, skipping the header line.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .map(String::from)
        .collect()
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn initialize(&self, language: &str) -> Result<EngineHandle> {
        let version = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("tesseract binary '{}' is not runnable", self.binary))?;
        if !version.status.success() {
            bail!("'{} --version' exited with {}", self.binary, version.status);
        }

        let installed = self.installed_languages().await?;
        for lang in language.split('+') {
            if !installed.iter().any(|l| l == lang) {
                bail!("tesseract language pack '{}' is not installed", lang);
            }
        }

        let first_line = String::from_utf8_lossy(&version.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        info!(version = %first_line, language, "Tesseract ready");
        Ok(EngineHandle::new("tesseract", language))
    }

    async fn recognize(
        &self,
        handle: &EngineHandle,
        image: &ImageAsset,
        progress: ProgressSender,
    ) -> Result<String> {
        let _ = progress.try_send(EngineProgress::new("loading image", 0.05));

        let mut child = Command::new(&self.binary)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&handle.language)
            .arg("--psm")
            .arg(self.page_segmentation.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.binary))?;

        let mut stdin = child.stdin.take().context("tesseract stdin unavailable")?;
        stdin
            .write_all(&image.data)
            .await
            .context("failed to stream image to tesseract")?;
        drop(stdin);

        let mut estimate = 0.1;
        let _ = progress.try_send(EngineProgress::new("recognizing text", estimate));

        let wait = child.wait_with_output();
        tokio::pin!(wait);
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.tick().await;

        let output = loop {
            tokio::select! {
                out = &mut wait => break out.context("tesseract did not finish")?,
                _ = ticker.tick() => {
                    estimate += (ESTIMATE_CEILING - estimate) * 0.15;
                    let _ = progress.try_send(EngineProgress::new("recognizing text", estimate));
                }
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }

        let _ = progress.try_send(EngineProgress::new("recognizing text", 1.0));
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(instance = %handle.id, chars = text.len(), "Tesseract output read");
        Ok(text)
    }

    async fn terminate(&self, handle: EngineHandle) -> Result<()> {
        // Each recognition is its own process; nothing stays resident.
        debug!(instance = %handle.id, "Tesseract instance released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_language_listing() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nfra\nosd\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "fra", "osd"]);
    }

    #[tokio::test]
    async fn missing_binary_fails_initialization() {
        let engine = TesseractEngine::new("/nonexistent/tesseract-binary");
        let err = engine.initialize("eng").await.unwrap_err();
        assert!(err.to_string().contains("not runnable"));
    }
}
