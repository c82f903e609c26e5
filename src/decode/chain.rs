use std::time::Duration;

use tokio::time::Instant;

use crate::capture::CapturedImage;
use crate::db::models::product::validation;

use super::{
    ChainOutcome, Confidence, DecodeAttemptResult, DecodeStrategy, StrategyDiagnostic,
    StrategyFault, StrategyKind,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(20);

/// Ordered list of strategies. The first one to report a symbol wins and the
/// rest are never called.
pub struct DecoderChain {
    strategies: Vec<Box<dyn DecodeStrategy>>,
    strategy_timeout: Duration,
}

impl DecoderChain {
    pub fn new(strategy_timeout: Duration) -> Self {
        Self {
            strategies: Vec::new(),
            strategy_timeout,
        }
    }

    pub fn with_strategy(mut self, strategy: impl DecodeStrategy + 'static) -> Self {
        self.push(Box::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Box<dyn DecodeStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Never fails: faults and timeouts are folded into the outcome's
    /// diagnostics and count as "no symbol" for that strategy.
    pub async fn run(&self, image: &CapturedImage) -> ChainOutcome {
        let fingerprint = image.fingerprint().short().to_string();
        let mut diagnostics = Vec::new();

        for strategy in &self.strategies {
            let kind = strategy.kind();
            let started = Instant::now();

            let attempt =
                tokio::time::timeout(self.strategy_timeout, strategy.attempt(image)).await;

            let fault = match attempt {
                Ok(Ok(result)) => {
                    let elapsed_ms = started.elapsed().as_millis();
                    match normalize(kind, result) {
                        Ok(DecodeAttemptResult::NoSymbolFound) => {
                            log_debug!("{kind} found nothing in {fingerprint} ({elapsed_ms}ms)");
                            continue;
                        }
                        Ok(symbol) => {
                            log_info!("{kind} decoded {fingerprint} in {elapsed_ms}ms");
                            return ChainOutcome {
                                result: symbol,
                                strategy: Some(kind),
                                diagnostics,
                            };
                        }
                        Err(fault) => fault,
                    }
                }
                Ok(Err(err)) => StrategyFault::Failed(format!("{err:#}")),
                Err(_) => StrategyFault::TimedOut(self.strategy_timeout),
            };

            log_warn!("{kind} fault on {fingerprint}, continuing: {fault}");
            diagnostics.push(StrategyDiagnostic {
                strategy: kind,
                fault,
            });
        }

        ChainOutcome::nothing_found(diagnostics)
    }
}

/// Whitespace is dropped (models like to group digits), blank symbols are
/// misses and deterministic symbols are always HIGH. A symbol that still
/// isn't a valid barcode is a fault, so the next strategy gets a turn.
fn normalize(
    kind: StrategyKind,
    result: DecodeAttemptResult,
) -> Result<DecodeAttemptResult, StrategyFault> {
    let DecodeAttemptResult::Symbol { value, confidence } = result else {
        return Ok(DecodeAttemptResult::NoSymbolFound);
    };

    let value: String = value.split_whitespace().collect();
    if value.is_empty() {
        return Ok(DecodeAttemptResult::NoSymbolFound);
    }
    validation::validate_barcode(&value)
        .map_err(|err| StrategyFault::Unusable(err.to_string()))?;

    let confidence = if kind.is_deterministic() {
        Confidence::High
    } else {
        confidence
    };
    Ok(DecodeAttemptResult::symbol(value, confidence))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::capture::CapturedImage;
    use crate::decode::{DecodeAttemptResult, DecodeStrategy, StrategyKind};

    pub enum Behavior {
        Return(DecodeAttemptResult),
        Fail,
        Sleep(Duration),
        /// Wait for the gate to be notified, then return the result.
        Gated(Arc<Notify>, DecodeAttemptResult),
    }

    /// Scripted strategy that counts its invocations. Behaviors are consumed
    /// in order; the last one repeats.
    pub struct FakeStrategy {
        kind: StrategyKind,
        script: Mutex<Vec<Behavior>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeStrategy {
        pub fn new(kind: StrategyKind, behavior: Behavior) -> Self {
            Self::scripted(kind, vec![behavior])
        }

        pub fn scripted(kind: StrategyKind, script: Vec<Behavior>) -> Self {
            Self {
                kind,
                script: Mutex::new(script),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn returning(kind: StrategyKind, result: DecodeAttemptResult) -> Self {
            Self::new(kind, Behavior::Return(result))
        }

        pub fn counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }

        fn next(&self) -> Behavior {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match &script[0] {
                    Behavior::Return(result) => Behavior::Return(result.clone()),
                    Behavior::Fail => Behavior::Fail,
                    Behavior::Sleep(duration) => Behavior::Sleep(*duration),
                    Behavior::Gated(gate, result) => {
                        Behavior::Gated(Arc::clone(gate), result.clone())
                    }
                }
            }
        }
    }

    #[async_trait]
    impl DecodeStrategy for FakeStrategy {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        async fn attempt(&self, _image: &CapturedImage) -> Result<DecodeAttemptResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.next() {
                Behavior::Return(result) => Ok(result),
                Behavior::Fail => Err(anyhow!("scripted failure")),
                Behavior::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(DecodeAttemptResult::NoSymbolFound)
                }
                Behavior::Gated(gate, result) => {
                    gate.notified().await;
                    Ok(result)
                }
            }
        }
    }
}
