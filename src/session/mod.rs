pub mod controller;
pub mod dedup;
pub mod gate;
pub mod state;

pub use controller::{CaptureReport, CaptureStatus, ScanController};
pub use dedup::FrameDedupCache;
pub use gate::{gate, Disposition, PendingConfirmation};
pub use state::{transition, Phase, ResolvedBy, ScanSessionState, SessionEvent};
