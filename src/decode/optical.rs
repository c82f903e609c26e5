use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops;

use crate::capture::CapturedImage;

use super::{
    ean,
    preprocess::{self, PreprocessOptions},
    Confidence, DecodeAttemptResult, DecodeStrategy, StrategyKind,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Deterministic reader: walks the pre-processing variants, each upright and
/// rotated a quarter turn, and stops at the first checksum-valid EAN.
#[derive(Debug, Clone, Default)]
pub struct OpticalStrategy {
    options: PreprocessOptions,
}

impl OpticalStrategy {
    pub fn new(options: PreprocessOptions) -> Self {
        Self { options }
    }
}

/// Blocking part of the optical read, exposed for callers that already run
/// on a worker thread.
pub fn decode_bytes(bytes: &[u8], options: &PreprocessOptions) -> Result<Option<String>> {
    let image = image::load_from_memory(bytes).context("failed to decode captured image")?;

    for (name, variant) in preprocess::variants(&image, options) {
        if let Some(code) = ean::scan_image(&variant, options.scanlines) {
            log_debug!("optical read succeeded on {name} variant");
            return Ok(Some(code));
        }

        let rotated = imageops::rotate90(&variant);
        if let Some(code) = ean::scan_image(&rotated, options.scanlines) {
            log_debug!("optical read succeeded on rotated {name} variant");
            return Ok(Some(code));
        }
    }

    Ok(None)
}

#[async_trait]
impl DecodeStrategy for OpticalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Optical
    }

    async fn attempt(&self, image: &CapturedImage) -> Result<DecodeAttemptResult> {
        let bytes = image.shared_bytes();
        let options = self.options;

        let code = tokio::task::spawn_blocking(move || decode_bytes(&bytes, &options))
            .await
            .context("optical decode worker join failed")??;

        Ok(match code {
            Some(value) => DecodeAttemptResult::symbol(value, Confidence::High),
            None => DecodeAttemptResult::NoSymbolFound,
        })
    }
}
