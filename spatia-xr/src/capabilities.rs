//! Environment detection and per-session feature flags

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::host::{Feature, SessionMode, SpatialEnvironment};

/// Per-mode support reported by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub api_available: bool,
    pub immersive_vr: bool,
    pub immersive_ar: bool,
}

impl Capabilities {
    pub fn supports(&self, mode: SessionMode) -> bool {
        match mode {
            SessionMode::ImmersiveVr => self.immersive_vr,
            SessionMode::ImmersiveAr => self.immersive_ar,
        }
    }
}

/// Inspects the host environment once and caches the answer.
pub struct SpatialEnvironmentDetector {
    environment: Option<Arc<dyn SpatialEnvironment>>,
    cached: Mutex<Option<Capabilities>>,
}

impl SpatialEnvironmentDetector {
    pub fn new(environment: Arc<dyn SpatialEnvironment>) -> Self {
        Self {
            environment: Some(environment),
            cached: Mutex::new(None),
        }
    }

    /// A detector for environments with no spatial API at all
    pub fn unavailable() -> Self {
        Self {
            environment: None,
            cached: Mutex::new(None),
        }
    }

    /// Report per-mode support. Never fails: any host error reads as
    /// "unsupported".
    pub async fn detect(&self) -> Capabilities {
        if let Some(cached) = *self.cached.lock() {
            return cached;
        }

        let capabilities = match &self.environment {
            Some(env) if env.api_available() => Capabilities {
                api_available: true,
                immersive_vr: probe(env.as_ref(), SessionMode::ImmersiveVr).await,
                immersive_ar: probe(env.as_ref(), SessionMode::ImmersiveAr).await,
            },
            _ => Capabilities::default(),
        };

        debug!(?capabilities, "spatial environment detected");
        *self.cached.lock() = Some(capabilities);
        capabilities
    }

    pub fn forget(&self) {
        *self.cached.lock() = None;
    }
}

async fn probe(env: &dyn SpatialEnvironment, mode: SessionMode) -> bool {
    match env.is_session_supported(mode).await {
        Ok(supported) => supported,
        Err(e) => {
            warn!(%mode, error = %e, "session support probe failed");
            false
        }
    }
}

/// Optional features granted for one session, resolved once at attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionCapabilities {
    pub hit_test: bool,
    pub plane_detection: bool,
    pub anchors: bool,
    pub hand_tracking: bool,
    pub dom_overlay: bool,
}

impl SessionCapabilities {
    pub fn from_features(features: &[Feature]) -> Self {
        let has = |f: Feature| features.contains(&f);
        Self {
            hit_test: has(Feature::HitTest),
            plane_detection: has(Feature::PlaneDetection),
            anchors: has(Feature::Anchors),
            hand_tracking: has(Feature::HandTracking),
            dom_overlay: has(Feature::DomOverlay),
        }
    }
}
