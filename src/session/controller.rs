use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    capture::{CaptureSource, CapturedImage},
    catalog::{Catalog, CatalogLookup},
    db::{models::product::validation, EntryDraft, InventoryEntry, ProductInput, ProductRecord},
    decode::{DecoderChain, StrategyDiagnostic},
    error::ScanError,
    inventory::{self, EntryLog},
};

use super::{
    gate::gate,
    state::{transition, Phase, ScanSessionState, SessionEvent},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStatus {
    /// The chain ran and its result was applied.
    Processed,
    /// Same frame as the one the session already has an outcome for.
    Duplicate,
    /// The chain ran but the session had moved on before it finished.
    Superseded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    pub status: CaptureStatus,
    #[serde(skip)]
    pub diagnostics: Vec<StrategyDiagnostic>,
    pub state: ScanSessionState,
}

/// Drives one scan session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct ScanController {
    state: Arc<Mutex<ScanSessionState>>,
    chain: Arc<DecoderChain>,
    catalog: Catalog,
    log: Arc<dyn EntryLog>,
}

impl ScanController {
    pub fn new(chain: DecoderChain, catalog: Catalog, log: Arc<dyn EntryLog>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScanSessionState::default())),
            chain: Arc::new(chain),
            catalog,
            log,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn snapshot(&self) -> ScanSessionState {
        self.state.lock().await.clone()
    }

    pub async fn capture_bytes(
        &self,
        bytes: Vec<u8>,
        source: CaptureSource,
    ) -> Result<CaptureReport, ScanError> {
        let image = CapturedImage::from_bytes(bytes, source)
            .map_err(|err| ScanError::InvalidCapture(err.to_string()))?;
        Ok(self.capture(image).await)
    }

    /// Run a captured frame through dedup, the decoder chain and the gate.
    /// The session lock is not held while strategies run.
    pub async fn capture(&self, image: CapturedImage) -> CaptureReport {
        let fingerprint = image.fingerprint().clone();

        {
            let mut state = self.state.lock().await;
            if !state.admits(&fingerprint) {
                log_info!("frame {} already handled, skipping decode", fingerprint.short());
                return CaptureReport {
                    status: CaptureStatus::Duplicate,
                    diagnostics: Vec::new(),
                    state: state.clone(),
                };
            }
            log_debug!("{:?} frame {} admitted", image.source(), fingerprint.short());
            apply(
                &mut state,
                SessionEvent::CaptureStarted {
                    fingerprint: fingerprint.clone(),
                },
            );
        }

        let outcome = self.chain.run(&image).await;
        let disposition = gate(&outcome);

        let accepted = {
            let mut state = self.state.lock().await;
            if !state.awaits_decode_of(&fingerprint) {
                log_warn!(
                    "discarding late decode result for {}, session moved on",
                    fingerprint.short()
                );
                return CaptureReport {
                    status: CaptureStatus::Superseded,
                    diagnostics: outcome.diagnostics,
                    state: state.clone(),
                };
            }
            apply(
                &mut state,
                SessionEvent::DecodeFinished {
                    fingerprint: fingerprint.clone(),
                    disposition,
                },
            );
            log_info!("frame {} -> {:?}", fingerprint.short(), state.phase);
            state.phase == Phase::Accepted
        };

        if accepted {
            self.resolve_product().await;
        }

        CaptureReport {
            status: CaptureStatus::Processed,
            diagnostics: outcome.diagnostics,
            state: self.snapshot().await,
        }
    }

    /// Typed barcode; accepted without gating.
    pub async fn enter_manual(&self, barcode: &str) -> Result<ScanSessionState, ScanError> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Err(ScanError::validation("barcode must not be empty"));
        }
        validation::validate_barcode(barcode)
            .map_err(|err| ScanError::validation(err.to_string()))?;

        {
            let mut state = self.state.lock().await;
            apply(
                &mut state,
                SessionEvent::ManualEntry {
                    barcode: barcode.to_string(),
                },
            );
        }

        self.resolve_product().await;
        Ok(self.snapshot().await)
    }

    pub async fn confirm(&self, accept: bool) -> Result<ScanSessionState, ScanError> {
        {
            let mut state = self.state.lock().await;
            if state.phase != Phase::PendingConfirm {
                return Err(ScanError::validation("nothing is awaiting confirmation"));
            }
            let event = if accept {
                SessionEvent::ConfirmAccepted
            } else {
                SessionEvent::ConfirmRejected
            };
            apply(&mut state, event);
        }

        if accept {
            self.resolve_product().await;
        }
        Ok(self.snapshot().await)
    }

    pub async fn reset(&self) -> ScanSessionState {
        let mut state = self.state.lock().await;
        apply(&mut state, SessionEvent::Reset);
        state.clone()
    }

    /// Append an entry for the resolved product. Validation happens before
    /// any collaborator is called; a failed write leaves the session as it
    /// was and hands the draft back for resubmission.
    pub async fn submit(&self, draft: EntryDraft) -> Result<InventoryEntry, ScanError> {
        inventory::validate_draft(&draft)?;

        // held across the append so a second submit can't reuse this product
        let mut state = self.state.lock().await;
        let product = match (&state.phase, &state.product) {
            (Phase::Accepted, Some(CatalogLookup::Found(product))) => product.clone(),
            (Phase::Accepted, Some(CatalogLookup::Unknown)) => {
                return Err(ScanError::validation(
                    "product is not registered; add it to the catalog first",
                ))
            }
            _ => return Err(ScanError::validation("no resolved product to log")),
        };

        let entry = inventory::new_entry(&product, draft);
        if let Err(err) = self.log.append(&entry).await {
            log_error!("failed to append entry for {}: {err:#}", product.barcode);
            return Err(ScanError::LogWrite {
                draft,
                message: format!("{err:#}"),
            });
        }

        log_info!(
            "logged {} {} of {} ({})",
            entry.quantity,
            entry.unit,
            entry.product_name,
            entry.barcode
        );
        apply(&mut state, SessionEvent::Reset);
        Ok(entry)
    }

    /// Register a product. When it is the barcode this session holds as
    /// unknown, the lookup is re-run whatever the registration outcome, so a
    /// product that was only unreachable at lookup time still resolves.
    pub async fn register_product(&self, input: &ProductInput) -> Result<ProductRecord, ScanError> {
        let registered = self.catalog.register(input).await;

        if self.holds_unknown(input.barcode.trim()).await {
            self.resolve_product().await;
        }

        registered
    }

    async fn holds_unknown(&self, barcode: &str) -> bool {
        let state = self.state.lock().await;
        state.phase == Phase::Accepted
            && state.resolved_barcode.as_deref() == Some(barcode)
            && state.product == Some(CatalogLookup::Unknown)
    }

    async fn resolve_product(&self) {
        let barcode = {
            let state = self.state.lock().await;
            match (&state.phase, &state.resolved_barcode) {
                (Phase::Accepted, Some(barcode)) => barcode.clone(),
                _ => return,
            }
        };

        let lookup = self.catalog.lookup(&barcode).await;

        let mut state = self.state.lock().await;
        apply(&mut state, SessionEvent::ProductResolved { barcode, lookup });
    }
}

fn apply(state: &mut ScanSessionState, event: SessionEvent) {
    let current = std::mem::take(state);
    *state = transition(current, event);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::catalog::testing::MemoryCatalog;
    use crate::db::Unit;
    use crate::decode::chain::testing::{Behavior, FakeStrategy};
    use crate::decode::chain::DEFAULT_STRATEGY_TIMEOUT;
    use crate::decode::ean::testing::{blank_png, ean13_png};
    use crate::decode::{Confidence, DecodeAttemptResult, OpticalStrategy, StrategyKind};
    use crate::inventory::testing::MemoryLog;
    use crate::session::state::ResolvedBy;

    struct Harness {
        controller: ScanController,
        log: Arc<MemoryLog>,
        optical_calls: Arc<AtomicUsize>,
        vision_calls: Arc<AtomicUsize>,
    }

    fn noodles() -> ProductRecord {
        ProductRecord::new("8935049502142", "Hao Hao noodles", "Acecook")
    }

    fn harness(optical: FakeStrategy, vision: FakeStrategy) -> Harness {
        let optical_calls = optical.counter();
        let vision_calls = vision.counter();
        let chain = DecoderChain::new(DEFAULT_STRATEGY_TIMEOUT)
            .with_strategy(optical)
            .with_strategy(vision);
        let catalog = Catalog::new(Arc::new(MemoryCatalog::with(&[noodles()])));
        let log = Arc::new(MemoryLog::default());
        Harness {
            controller: ScanController::new(chain, catalog, log.clone()),
            log,
            optical_calls,
            vision_calls,
        }
    }

    fn optical_miss() -> FakeStrategy {
        FakeStrategy::returning(StrategyKind::Optical, DecodeAttemptResult::NoSymbolFound)
    }

    fn vision(value: Option<&str>, confidence: Confidence) -> FakeStrategy {
        let result = match value {
            Some(value) => DecodeAttemptResult::symbol(value, confidence),
            None => DecodeAttemptResult::NoSymbolFound,
        };
        FakeStrategy::returning(StrategyKind::VisionModel, result)
    }

    fn frame(tag: u8) -> CapturedImage {
        CapturedImage::from_bytes(vec![tag; 32], CaptureSource::Camera).unwrap()
    }

    #[tokio::test]
    async fn same_frame_twice_decodes_once() {
        let h = harness(optical_miss(), vision(Some("8935049502142"), Confidence::High));

        let first = h.controller.capture(frame(1)).await;
        assert_eq!(first.status, CaptureStatus::Processed);
        assert_eq!(first.state.product, Some(CatalogLookup::Found(noodles())));

        let second = h.controller.capture(frame(1)).await;
        assert_eq!(second.status, CaptureStatus::Duplicate);
        assert_eq!(second.state, first.state);
        assert_eq!(h.optical_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.vision_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn real_optical_read_short_circuits_vision() {
        let vision = vision(Some("0000000000000"), Confidence::High);
        let vision_calls = vision.counter();
        let chain = DecoderChain::new(DEFAULT_STRATEGY_TIMEOUT)
            .with_strategy(OpticalStrategy::default())
            .with_strategy(vision);
        let catalog = Catalog::new(Arc::new(MemoryCatalog::with(&[noodles()])));
        let controller = ScanController::new(chain, catalog, Arc::new(MemoryLog::default()));

        let report = controller
            .capture_bytes(ean13_png("8935049502142"), CaptureSource::Upload)
            .await
            .unwrap();

        assert_eq!(report.state.phase, Phase::Accepted);
        assert_eq!(
            report.state.resolved_by,
            Some(ResolvedBy::Strategy(StrategyKind::Optical))
        );
        assert_eq!(report.state.product, Some(CatalogLookup::Found(noodles())));
        assert_eq!(vision_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn medium_confidence_waits_then_accepts() {
        let h = harness(optical_miss(), vision(Some("123"), Confidence::Medium));

        let report = h.controller.capture(frame(2)).await;
        assert_eq!(report.state.phase, Phase::PendingConfirm);
        assert_eq!(report.state.resolved_barcode, None);

        let state = h.controller.confirm(true).await.unwrap();
        assert_eq!(state.phase, Phase::Accepted);
        assert_eq!(state.resolved_barcode.as_deref(), Some("123"));
        assert_eq!(state.product, Some(CatalogLookup::Unknown));
    }

    #[tokio::test]
    async fn rejecting_a_pending_symbol() {
        let h = harness(optical_miss(), vision(Some("123"), Confidence::Low));
        h.controller.capture(frame(2)).await;

        let state = h.controller.confirm(false).await.unwrap();
        assert_eq!(state.phase, Phase::Rejected);
        assert!(h.controller.confirm(true).await.is_err());
    }

    #[tokio::test]
    async fn nothing_found_is_rejected() {
        let h = harness(optical_miss(), vision(None, Confidence::Low));
        let report = h.controller.capture(frame(3)).await;
        assert_eq!(report.state.phase, Phase::Rejected);
        assert_eq!(report.state.product, None);
    }

    #[tokio::test]
    async fn faults_degrade_to_rejection_with_diagnostics() {
        let h = harness(
            FakeStrategy::new(StrategyKind::Optical, Behavior::Fail),
            FakeStrategy::new(StrategyKind::VisionModel, Behavior::Fail),
        );
        let report = h.controller.capture(frame(4)).await;
        assert_eq!(report.status, CaptureStatus::Processed);
        assert_eq!(report.state.phase, Phase::Rejected);
        assert_eq!(report.diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn frame_rejected_by_a_fault_decodes_again() {
        let vision = FakeStrategy::scripted(
            StrategyKind::VisionModel,
            vec![
                Behavior::Fail,
                Behavior::Return(DecodeAttemptResult::symbol(
                    "8935049502142",
                    Confidence::High,
                )),
            ],
        );
        let h = harness(optical_miss(), vision);

        let first = h.controller.capture(frame(9)).await;
        assert_eq!(first.state.phase, Phase::Rejected);
        assert!(first.state.decode_faulted);

        let retry = h.controller.capture(frame(9)).await;
        assert_eq!(retry.status, CaptureStatus::Processed);
        assert_eq!(retry.state.product, Some(CatalogLookup::Found(noodles())));
        assert_eq!(h.vision_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clean_miss_stays_deduplicated() {
        let h = harness(optical_miss(), vision(None, Confidence::Low));
        h.controller.capture(frame(13)).await;
        let again = h.controller.capture(frame(13)).await;
        assert_eq!(again.status, CaptureStatus::Duplicate);
        assert_eq!(h.vision_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spaced_vision_digits_resolve_and_register() {
        let h = harness(optical_miss(), vision(Some("4006 3813 33931"), Confidence::High));
        let report = h.controller.capture(frame(14)).await;
        assert_eq!(report.state.resolved_barcode.as_deref(), Some("4006381333931"));
        assert_eq!(report.state.product, Some(CatalogLookup::Unknown));

        h.controller
            .register_product(&ProductInput {
                barcode: "4006381333931".into(),
                name: "Pencil".into(),
                brand: "Stabilo".into(),
            })
            .await
            .unwrap();
        assert!(h.controller.snapshot().await.is_ready_to_submit());
    }

    #[tokio::test]
    async fn empty_capture_is_refused() {
        let h = harness(optical_miss(), vision(None, Confidence::Low));
        let err = h
            .controller
            .capture_bytes(Vec::new(), CaptureSource::Camera)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidCapture(_)));
        assert_eq!(h.optical_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_quantities_never_reach_the_log() {
        let h = harness(optical_miss(), vision(Some("8935049502142"), Confidence::High));
        h.controller.capture(frame(5)).await;

        for quantity in [0.0, -2.0] {
            let err = h
                .controller
                .submit(EntryDraft::new(quantity, Unit::Kilogram))
                .await
                .unwrap_err();
            assert!(matches!(err, ScanError::Validation(_)));
        }
        assert!(h.log.appended().is_empty());
        assert_eq!(h.controller.snapshot().await.phase, Phase::Accepted);

        let entry = h
            .controller
            .submit(EntryDraft::new(1.5, Unit::Kilogram))
            .await
            .unwrap();
        let appended = h.log.appended();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0], entry);
        assert_eq!(entry.quantity, 1.5);
        assert_eq!(entry.unit, Unit::Kilogram);
        assert_eq!(entry.product_name, "Hao Hao noodles");
    }

    #[tokio::test]
    async fn successful_submit_resets_and_blocks_resubmission() {
        let h = harness(optical_miss(), vision(Some("8935049502142"), Confidence::High));
        h.controller.capture(frame(6)).await;
        h.controller
            .submit(EntryDraft::new(2.0, Unit::Piece))
            .await
            .unwrap();

        assert_eq!(h.controller.snapshot().await, ScanSessionState::default());
        let err = h
            .controller
            .submit(EntryDraft::new(2.0, Unit::Piece))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)));
        assert_eq!(h.log.appended().len(), 1);

        // the fingerprint was cleared, so the same frame decodes again
        h.controller.capture(frame(6)).await;
        assert_eq!(h.vision_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_write_returns_draft_and_keeps_state() {
        let h = harness(optical_miss(), vision(Some("8935049502142"), Confidence::High));
        h.controller.capture(frame(7)).await;
        let before = h.controller.snapshot().await;

        h.log.set_failing(true);
        let draft = EntryDraft::new(3.0, Unit::Box);
        let err = h.controller.submit(draft).await.unwrap_err();
        assert_eq!(err.retry_draft(), Some(draft));
        assert_eq!(h.controller.snapshot().await, before);

        h.log.set_failing(false);
        h.controller.submit(draft).await.unwrap();
        assert_eq!(h.log.appended().len(), 1);
    }

    #[tokio::test]
    async fn unknown_product_cannot_be_submitted_until_registered() {
        let h = harness(optical_miss(), vision(None, Confidence::Low));
        let state = h.controller.enter_manual("000").await.unwrap();
        assert_eq!(state.phase, Phase::Accepted);
        assert_eq!(state.product, Some(CatalogLookup::Unknown));

        let err = h
            .controller
            .submit(EntryDraft::new(1.0, Unit::Piece))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Validation(msg) if msg.contains("not registered")));

        let input = ProductInput {
            barcode: "000".into(),
            name: "X".into(),
            brand: "Y".into(),
        };
        h.controller.register_product(&input).await.unwrap();
        assert_eq!(
            h.controller.snapshot().await.product,
            Some(CatalogLookup::Found(ProductRecord::new("000", "X", "Y")))
        );
        h.controller
            .submit(EntryDraft::new(1.0, Unit::Piece))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn registering_after_a_catalog_outage_recovers_the_session() {
        let source = Arc::new(MemoryCatalog::with(&[noodles()]));
        let log = Arc::new(MemoryLog::default());
        let controller = ScanController::new(
            DecoderChain::new(DEFAULT_STRATEGY_TIMEOUT),
            Catalog::new(source.clone()),
            log.clone(),
        );

        source.offline.store(true, Ordering::SeqCst);
        let state = controller.enter_manual(&noodles().barcode).await.unwrap();
        assert_eq!(state.product, Some(CatalogLookup::Unknown));

        // still down: registration fails and the session stays put
        let err = controller
            .register_product(&ProductInput {
                barcode: noodles().barcode,
                name: "Hao Hao noodles".into(),
                brand: "Acecook".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::CatalogUnavailable(_)));
        assert_eq!(controller.snapshot().await.product, Some(CatalogLookup::Unknown));

        source.offline.store(false, Ordering::SeqCst);
        let err = controller
            .register_product(&ProductInput {
                barcode: format!(" {} ", noodles().barcode),
                name: "Hao Hao noodles".into(),
                brand: "Acecook".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Validation(msg) if msg.contains("already registered")));
        assert_eq!(
            controller.snapshot().await.product,
            Some(CatalogLookup::Found(noodles()))
        );

        let entry = controller
            .submit(EntryDraft::new(2.0, Unit::Pack))
            .await
            .unwrap();
        assert_eq!(entry.barcode, noodles().barcode);
        assert_eq!(log.appended().len(), 1);
    }

    #[tokio::test]
    async fn blank_manual_entry_is_a_validation_failure() {
        let h = harness(optical_miss(), vision(None, Confidence::Low));
        let err = h.controller.enter_manual("   ").await.unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)));
        assert_eq!(h.controller.snapshot().await, ScanSessionState::default());
    }

    #[tokio::test]
    async fn reset_clears_fingerprint_and_outcome() {
        let h = harness(optical_miss(), vision(Some("8935049502142"), Confidence::High));
        h.controller.capture(frame(8)).await;

        let state = h.controller.reset().await;
        assert_eq!(state, ScanSessionState::default());
        assert_eq!(state.fingerprint.current(), None);

        h.controller.capture(frame(8)).await;
        assert_eq!(h.vision_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn late_result_for_old_frame_is_discarded() {
        let gate = Arc::new(Notify::new());
        let vision = FakeStrategy::scripted(
            StrategyKind::VisionModel,
            vec![
                Behavior::Gated(
                    gate.clone(),
                    DecodeAttemptResult::symbol("111", Confidence::High),
                ),
                Behavior::Return(DecodeAttemptResult::symbol(
                    "8935049502142",
                    Confidence::High,
                )),
            ],
        );
        let h = harness(optical_miss(), vision);

        let slow = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.capture(frame(10)).await })
        };
        while h.vision_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let fresh = h.controller.capture(frame(11)).await;
        assert_eq!(fresh.state.resolved_barcode.as_deref(), Some("8935049502142"));

        gate.notify_one();
        let late = slow.await.unwrap();
        assert_eq!(late.status, CaptureStatus::Superseded);

        let state = h.controller.snapshot().await;
        assert_eq!(state, fresh.state);
        assert!(state.fingerprint.is_current(frame(11).fingerprint()));
    }

    #[tokio::test]
    async fn reset_during_decode_discards_result() {
        let gate = Arc::new(Notify::new());
        let vision = FakeStrategy::new(
            StrategyKind::VisionModel,
            Behavior::Gated(gate.clone(), DecodeAttemptResult::symbol("111", Confidence::High)),
        );
        let h = harness(optical_miss(), vision);

        let slow = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.capture(frame(12)).await })
        };
        while h.vision_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        h.controller.reset().await;
        gate.notify_one();
        assert_eq!(slow.await.unwrap().status, CaptureStatus::Superseded);
        assert_eq!(h.controller.snapshot().await, ScanSessionState::default());
    }

    #[tokio::test]
    async fn blank_upload_is_rejected_by_real_optical_reader() {
        let chain = DecoderChain::new(DEFAULT_STRATEGY_TIMEOUT)
            .with_strategy(OpticalStrategy::default());
        let catalog = Catalog::new(Arc::new(MemoryCatalog::default()));
        let controller = ScanController::new(chain, catalog, Arc::new(MemoryLog::default()));

        let report = controller
            .capture_bytes(blank_png(3), CaptureSource::Upload)
            .await
            .unwrap();
        assert_eq!(report.state.phase, Phase::Rejected);
        assert!(report.diagnostics.is_empty());
    }
}
