use serde::Serialize;

use crate::capture::Fingerprint;
use crate::catalog::CatalogLookup;
use crate::decode::StrategyKind;

use super::dedup::FrameDedupCache;
use super::gate::{Disposition, PendingConfirmation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    Decoding,
    PendingConfirm,
    Accepted,
    Rejected,
}

/// How the current barcode was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolvedBy {
    Strategy(StrategyKind),
    Confirmation,
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSessionState {
    pub fingerprint: FrameDedupCache,
    pub phase: Phase,
    pub resolved_barcode: Option<String>,
    pub resolved_by: Option<ResolvedBy>,
    pub pending: Option<PendingConfirmation>,
    /// Set when the rejection came from strategy faults rather than a clean miss.
    pub decode_faulted: bool,
    /// `None` until the catalog has answered for `resolved_barcode`.
    pub product: Option<CatalogLookup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CaptureStarted {
        fingerprint: Fingerprint,
    },
    DecodeFinished {
        fingerprint: Fingerprint,
        disposition: Disposition,
    },
    ManualEntry {
        barcode: String,
    },
    ConfirmAccepted,
    ConfirmRejected,
    ProductResolved {
        barcode: String,
        lookup: CatalogLookup,
    },
    Reset,
}

impl ScanSessionState {
    /// A rejection caused by faults doesn't count, so the same frame can be
    /// retried once the failing strategy recovers.
    pub fn has_outcome(&self) -> bool {
        match self.phase {
            Phase::Idle => false,
            Phase::Rejected => !self.decode_faulted,
            _ => true,
        }
    }

    pub fn admits(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprint.should_process(fingerprint, self.has_outcome())
    }

    /// Whether a decode result for `fingerprint` would still be applied.
    pub fn awaits_decode_of(&self, fingerprint: &Fingerprint) -> bool {
        self.phase == Phase::Decoding && self.fingerprint.is_current(fingerprint)
    }

    pub fn is_ready_to_submit(&self) -> bool {
        self.phase == Phase::Accepted
            && matches!(self.product, Some(CatalogLookup::Found(_)))
    }
}

/// Pure state transition. Events that don't apply to the current phase leave
/// the state unchanged.
pub fn transition(state: ScanSessionState, event: SessionEvent) -> ScanSessionState {
    match event {
        SessionEvent::Reset => ScanSessionState::default(),

        SessionEvent::CaptureStarted { fingerprint } => {
            if !state.admits(&fingerprint) {
                return state;
            }
            let mut next = ScanSessionState {
                phase: Phase::Decoding,
                ..ScanSessionState::default()
            };
            next.fingerprint.record(fingerprint);
            next
        }

        SessionEvent::DecodeFinished {
            fingerprint,
            disposition,
        } => {
            if !state.awaits_decode_of(&fingerprint) {
                return state;
            }
            match disposition {
                Disposition::Accept { value, strategy } => ScanSessionState {
                    phase: Phase::Accepted,
                    resolved_barcode: Some(value),
                    resolved_by: Some(ResolvedBy::Strategy(strategy)),
                    ..state
                },
                Disposition::Confirm(pending) => ScanSessionState {
                    phase: Phase::PendingConfirm,
                    pending: Some(pending),
                    ..state
                },
                Disposition::Reject { faulted } => ScanSessionState {
                    phase: Phase::Rejected,
                    decode_faulted: faulted,
                    ..state
                },
            }
        }

        SessionEvent::ManualEntry { barcode } => {
            let barcode = barcode.trim();
            if barcode.is_empty() {
                return state;
            }
            // typed codes have no frame behind them
            ScanSessionState {
                phase: Phase::Accepted,
                resolved_barcode: Some(barcode.to_string()),
                resolved_by: Some(ResolvedBy::Manual),
                ..ScanSessionState::default()
            }
        }

        SessionEvent::ConfirmAccepted => match (state.phase, state.pending.clone()) {
            (Phase::PendingConfirm, Some(pending)) => ScanSessionState {
                phase: Phase::Accepted,
                resolved_barcode: Some(pending.value),
                resolved_by: Some(ResolvedBy::Confirmation),
                pending: None,
                ..state
            },
            _ => state,
        },

        SessionEvent::ConfirmRejected => {
            if state.phase != Phase::PendingConfirm {
                return state;
            }
            ScanSessionState {
                phase: Phase::Rejected,
                pending: None,
                ..state
            }
        }

        SessionEvent::ProductResolved { barcode, lookup } => {
            if state.phase != Phase::Accepted
                || state.resolved_barcode.as_deref() != Some(barcode.as_str())
            {
                return state;
            }
            ScanSessionState {
                product: Some(lookup),
                ..state
            }
        }
    }
}
