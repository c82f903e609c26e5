//! Barcode decoding: the strategy trait, its result types and the ordered
//! chain that runs strategies until one produces a symbol.

pub mod chain;
pub mod ean;
pub mod optical;
pub mod preprocess;
pub mod vision;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::CapturedImage;

pub use chain::DecoderChain;
pub use optical::OpticalStrategy;
pub use vision::VisionStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Confidence::High),
            "MEDIUM" => Ok(Confidence::Medium),
            "LOW" => Ok(Confidence::Low),
            other => Err(anyhow!("unknown confidence label '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DecodeAttemptResult {
    NoSymbolFound,
    Symbol { value: String, confidence: Confidence },
}

impl DecodeAttemptResult {
    pub fn symbol(value: impl Into<String>, confidence: Confidence) -> Self {
        DecodeAttemptResult::Symbol {
            value: value.into(),
            confidence,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, DecodeAttemptResult::Symbol { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    /// Same input, same output. Any symbol it reports is trusted.
    Optical,
    VisionModel,
}

impl StrategyKind {
    pub fn is_deterministic(&self) -> bool {
        matches!(self, StrategyKind::Optical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Optical => "optical",
            StrategyKind::VisionModel => "vision-model",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyFault {
    #[error("strategy failed: {0}")]
    Failed(String),
    #[error("strategy timed out after {0:?}")]
    TimedOut(Duration),
    #[error("strategy returned an unusable barcode: {0}")]
    Unusable(String),
}

/// A strategy fault that was absorbed by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDiagnostic {
    pub strategy: StrategyKind,
    pub fault: StrategyFault,
}

impl fmt::Display for StrategyDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.fault)
    }
}

#[async_trait]
pub trait DecodeStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// `Ok(NoSymbolFound)` is a normal miss. `Err` is a fault the chain
    /// converts into a diagnostic.
    async fn attempt(&self, image: &CapturedImage) -> Result<DecodeAttemptResult>;
}

/// Result of running the whole chain on one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    pub result: DecodeAttemptResult,
    /// The strategy that produced `result`; `None` when nothing was found.
    pub strategy: Option<StrategyKind>,
    pub diagnostics: Vec<StrategyDiagnostic>,
}

impl ChainOutcome {
    pub fn nothing_found(diagnostics: Vec<StrategyDiagnostic>) -> Self {
        Self {
            result: DecodeAttemptResult::NoSymbolFound,
            strategy: None,
            diagnostics,
        }
    }
}
