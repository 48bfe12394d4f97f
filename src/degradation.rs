//! Degradation Controller (C9): detects hot-store/cloud absence and
//! resolves the engine's operating mode, observable via `sync_status`.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::OperatingModeHint;

/// The engine's self-assessed operational posture (§4.9, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    /// Hot store present, cloud present. All features.
    Hybrid,
    /// Cloud absent/unauthenticated; writes go to an in-memory substitute.
    HotOnly,
    /// Hot store absent; async pipeline falls back to sync, pub/sub disabled.
    CloudOnly,
    /// Both absent; operations resolve against a process-local map.
    Demo,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Hybrid => "hybrid",
            Mode::HotOnly => "hotOnly",
            Mode::CloudOnly => "cloudOnly",
            Mode::Demo => "demo",
        }
    }
}

/// Tracks the last-observed connectivity of C1/C2 and resolves the mode an
/// operator override or the health signals imply (§4.9).
pub struct DegradationController {
    hot_connected: AtomicBool,
    cloud_connected: AtomicBool,
    override_mode: Option<OperatingModeHint>,
}

impl DegradationController {
    pub fn new(override_mode: Option<OperatingModeHint>) -> Self {
        Self {
            hot_connected: AtomicBool::new(true),
            cloud_connected: AtomicBool::new(true),
            override_mode,
        }
    }

    pub fn set_hot_connected(&self, connected: bool) {
        self.hot_connected.store(connected, Ordering::Relaxed);
    }

    pub fn set_cloud_connected(&self, connected: bool) {
        self.cloud_connected.store(connected, Ordering::Relaxed);
    }

    pub fn hot_connected(&self) -> bool {
        self.hot_connected.load(Ordering::Relaxed)
    }

    pub fn cloud_connected(&self) -> bool {
        self.cloud_connected.load(Ordering::Relaxed)
    }

    /// Resolve the current mode from an explicit startup override (if any)
    /// else from live connectivity signals.
    pub fn current_mode(&self) -> Mode {
        if let Some(hint) = self.override_mode {
            return match hint {
                OperatingModeHint::Hybrid => Mode::Hybrid,
                OperatingModeHint::HotOnly => Mode::HotOnly,
                OperatingModeHint::CloudOnly => Mode::CloudOnly,
                OperatingModeHint::Demo => Mode::Demo,
            };
        }
        Self::resolve(self.hot_connected(), self.cloud_connected())
    }

    fn resolve(hot_connected: bool, cloud_connected: bool) -> Mode {
        match (hot_connected, cloud_connected) {
            (true, true) => Mode::Hybrid,
            (true, false) => Mode::HotOnly,
            (false, true) => Mode::CloudOnly,
            (false, false) => Mode::Demo,
        }
    }
}
