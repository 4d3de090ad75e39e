//! Staleness scanning
//!
//! Decides which tiles are dirty for a run. Mode selection is a pure
//! function of the request and the state left by the previous run; the
//! [`Scanner`] then walks the chunk source once and fills a
//! [`DirtySet`](crate::dirtyset::DirtySet).

mod mode;
mod scanner;

pub use mode::{select_mode, DepthChange, ModeDecision, RequestedMode, ScanMode, UpgradeReason};
pub use scanner::{ScanResult, Scanner};
