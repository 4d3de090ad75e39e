//! Scan mode selection.

use crate::source::Mtime;
use crate::state::RenderState;
use std::fmt;
use std::str::FromStr;

/// How the dirty set is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Only tiles touched by chunks newer than the last render.
    Incremental,
    /// Every reachable tile is a candidate; the tiles on disk decide.
    Resume,
    /// Everything is redrawn.
    Force,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Incremental => write!(f, "incremental"),
            ScanMode::Resume => write!(f, "check-tiles"),
            ScanMode::Force => write!(f, "force"),
        }
    }
}

/// Mode asked for by configuration or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestedMode {
    #[default]
    Incremental,
    CheckTiles,
    Force,
}

impl FromStr for RequestedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "incremental" => Ok(RequestedMode::Incremental),
            "check-tiles" | "check_tiles" => Ok(RequestedMode::CheckTiles),
            "force" => Ok(RequestedMode::Force),
            other => Err(format!(
                "unknown mode '{}' (expected incremental, check-tiles or force)",
                other
            )),
        }
    }
}

impl fmt::Display for RequestedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedMode::Incremental => write!(f, "incremental"),
            RequestedMode::CheckTiles => write!(f, "check-tiles"),
            RequestedMode::Force => write!(f, "force"),
        }
    }
}

/// How the tree depth changed since the last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthChange {
    Unchanged,
    Increased { from: u32, to: u32 },
    Decreased { from: u32, to: u32 },
}

impl DepthChange {
    pub fn between(stored: u32, required: u32) -> Self {
        use std::cmp::Ordering;
        match required.cmp(&stored) {
            Ordering::Equal => DepthChange::Unchanged,
            Ordering::Greater => DepthChange::Increased {
                from: stored,
                to: required,
            },
            Ordering::Less => DepthChange::Decreased {
                from: stored,
                to: required,
            },
        }
    }
}

/// Why a run was moved to [`ScanMode::Resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeReason {
    /// The previous run never finished.
    Interrupted,
    /// Tiles outside the smaller tree must be purged.
    DepthDecreased,
    /// Asked for explicitly.
    Requested,
}

impl fmt::Display for UpgradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeReason::Interrupted => write!(f, "the previous render was interrupted"),
            UpgradeReason::DepthDecreased => write!(f, "the map shrank"),
            UpgradeReason::Requested => write!(f, "tile checks were requested"),
        }
    }
}

/// Outcome of [`select_mode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDecision {
    pub mode: ScanMode,
    /// Incremental cut-off: chunks newer than this are dirty.
    pub since: Mtime,
    /// Tiles older than this need redrawing even if their chunks are older.
    pub force_watermark: Option<Mtime>,
    /// No state existed, so this is the first render.
    pub initial: bool,
    pub reasons: Vec<UpgradeReason>,
}

/// Chooses the scan mode for a run.
///
/// Precedence: a forced run is always forced. Otherwise an interrupted
/// previous run, a shrinking tree, or an explicit request selects
/// [`ScanMode::Resume`]. Everything else is incremental; a first run is
/// incremental from time zero.
pub fn select_mode(
    requested: RequestedMode,
    prior: Option<&RenderState>,
    depth: DepthChange,
) -> ModeDecision {
    let initial = prior.is_none();
    let since = prior.map_or(0, |s| s.last_render_time);
    let force_watermark = prior
        .and_then(|s| s.in_progress)
        .and_then(|p| p.force_watermark);

    if requested == RequestedMode::Force {
        return ModeDecision {
            mode: ScanMode::Force,
            since,
            force_watermark: None,
            initial,
            reasons: Vec::new(),
        };
    }

    let mut reasons = Vec::new();
    if prior.is_some_and(RenderState::is_interrupted) {
        reasons.push(UpgradeReason::Interrupted);
    }
    if matches!(depth, DepthChange::Decreased { .. }) {
        reasons.push(UpgradeReason::DepthDecreased);
    }
    if requested == RequestedMode::CheckTiles {
        reasons.push(UpgradeReason::Requested);
    }

    let mode = if reasons.is_empty() {
        ScanMode::Incremental
    } else {
        ScanMode::Resume
    };
    ModeDecision {
        mode,
        since,
        force_watermark,
        initial,
        reasons,
    }
}
