//! Captured frames and their content fingerprints.
//!
//! A frame is kept in its encoded form (PNG/JPEG as delivered by the camera or
//! upload) behind an `Arc`, so the decode strategies can share it without
//! copying. The fingerprint is a SHA-256 digest of exactly those bytes.

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            hex.push_str(&format!("{byte:02x}"));
        }
        Fingerprint(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureSource {
    Camera,
    Upload,
}

#[derive(Debug, Clone)]
pub struct CapturedImage {
    bytes: Arc<Vec<u8>>,
    fingerprint: Fingerprint,
    source: CaptureSource,
}

impl CapturedImage {
    pub fn from_bytes(bytes: Vec<u8>, source: CaptureSource) -> Result<Self> {
        if bytes.is_empty() {
            bail!("captured image is empty");
        }

        let fingerprint = Fingerprint::of(&bytes);
        Ok(Self {
            bytes: Arc::new(bytes),
            fingerprint,
            source,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn source(&self) -> CaptureSource {
        self.source
    }

    pub fn format(&self) -> Option<ImageFormat> {
        image::guess_format(&self.bytes).ok()
    }

    /// MIME type of the payload, defaulting to PNG when the format is unrecognized.
    pub fn mime_type(&self) -> &'static str {
        match self.format() {
            Some(ImageFormat::Jpeg) => "image/jpeg",
            Some(ImageFormat::Gif) => "image/gif",
            Some(ImageFormat::WebP) => "image/webp",
            _ => "image/png",
        }
    }
}
