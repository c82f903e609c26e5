use serde::Serialize;

use crate::decode::{ChainOutcome, Confidence, DecodeAttemptResult, StrategyKind};

/// A fallback symbol that needs the user's yes/no before it is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    pub value: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Accept { value: String, strategy: StrategyKind },
    Confirm(PendingConfirmation),
    /// `faulted` when at least one strategy failed or timed out on the way.
    Reject { faulted: bool },
}

/// Route a chain outcome: deterministic or HIGH symbols are accepted,
/// anything else that carries a symbol waits for confirmation.
pub fn gate(outcome: &ChainOutcome) -> Disposition {
    let reject = Disposition::Reject {
        faulted: !outcome.diagnostics.is_empty(),
    };
    let DecodeAttemptResult::Symbol { value, confidence } = &outcome.result else {
        return reject;
    };
    let Some(strategy) = outcome.strategy else {
        return reject;
    };

    if strategy.is_deterministic() || *confidence == Confidence::High {
        Disposition::Accept {
            value: value.clone(),
            strategy,
        }
    } else {
        Disposition::Confirm(PendingConfirmation {
            value: value.clone(),
            confidence: *confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::decode::{StrategyDiagnostic, StrategyFault};

    fn outcome(strategy: StrategyKind, value: &str, confidence: Confidence) -> ChainOutcome {
        ChainOutcome {
            result: DecodeAttemptResult::symbol(value, confidence),
            strategy: Some(strategy),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn high_vision_symbol_is_accepted() {
        assert_eq!(
            gate(&outcome(StrategyKind::VisionModel, "8935049502142", Confidence::High)),
            Disposition::Accept {
                value: "8935049502142".into(),
                strategy: StrategyKind::VisionModel,
            }
        );
    }

    #[test]
    fn medium_and_low_vision_symbols_wait_for_confirmation() {
        for confidence in [Confidence::Medium, Confidence::Low] {
            assert_eq!(
                gate(&outcome(StrategyKind::VisionModel, "123", confidence)),
                Disposition::Confirm(PendingConfirmation {
                    value: "123".into(),
                    confidence,
                })
            );
        }
    }

    #[test]
    fn optical_symbol_is_accepted_regardless_of_label() {
        assert!(matches!(
            gate(&outcome(StrategyKind::Optical, "96385074", Confidence::Low)),
            Disposition::Accept { .. }
        ));
    }

    #[test]
    fn nothing_found_is_rejected() {
        assert_eq!(
            gate(&ChainOutcome::nothing_found(Vec::new())),
            Disposition::Reject { faulted: false }
        );
    }

    #[test]
    fn rejection_remembers_strategy_faults() {
        let diagnostics = vec![StrategyDiagnostic {
            strategy: StrategyKind::VisionModel,
            fault: StrategyFault::TimedOut(Duration::from_secs(20)),
        }];
        assert_eq!(
            gate(&ChainOutcome::nothing_found(diagnostics)),
            Disposition::Reject { faulted: true }
        );
    }
}
