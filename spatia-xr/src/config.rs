//! Tunable thresholds and visual parameters

use serde::{Deserialize, Serialize};

use crate::error::{Result, XrError};
use crate::host::Handedness;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct XrConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub gestures: GestureConfig,

    #[serde(default)]
    pub controllers: ControllerConfig,

    #[serde(default)]
    pub visuals: VisualConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Document surface the AR UI overlay binds to
    #[serde(default = "default_overlay_root")]
    pub overlay_root: String,

    /// Fall back to a `local` reference space when `local-floor` is refused
    #[serde(default = "default_true")]
    pub reference_space_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureConfig {
    /// Thumb tip to index tip, meters
    #[serde(default = "default_pinch_threshold")]
    pub pinch_threshold: f32,

    /// Wrist to middle tip, meters
    #[serde(default = "default_grab_threshold")]
    pub grab_threshold: f32,

    /// Wrist to middle tip at or above which fingers count as extended
    #[serde(default = "default_point_threshold")]
    pub point_threshold: f32,

    /// Search radius around the index tip when a pinch starts
    #[serde(default = "default_pinch_pick_radius")]
    pub pinch_pick_radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_squeeze_left")]
    pub squeeze_scale_left: f32,

    #[serde(default = "default_squeeze_right")]
    pub squeeze_scale_right: f32,

    #[serde(default = "default_min_scale")]
    pub min_scale: f32,

    #[serde(default = "default_max_scale")]
    pub max_scale: f32,

    /// Maximum pick distance along a controller ray
    #[serde(default = "default_ray_length")]
    pub ray_length: f32,

    #[serde(default = "default_ray_idle_color")]
    pub ray_idle_color: [f32; 4],

    #[serde(default = "default_ray_active_color")]
    pub ray_active_color: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualConfig {
    #[serde(default = "default_reticle_inner")]
    pub reticle_inner_radius: f32,

    #[serde(default = "default_reticle_outer")]
    pub reticle_outer_radius: f32,

    #[serde(default = "default_marker_radius")]
    pub anchor_marker_radius: f32,

    #[serde(default = "default_marker_color")]
    pub anchor_marker_color: [f32; 4],

    #[serde(default = "default_plane_color")]
    pub plane_color: [f32; 4],
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            overlay_root: default_overlay_root(),
            reference_space_fallback: default_true(),
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: default_pinch_threshold(),
            grab_threshold: default_grab_threshold(),
            point_threshold: default_point_threshold(),
            pinch_pick_radius: default_pinch_pick_radius(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            squeeze_scale_left: default_squeeze_left(),
            squeeze_scale_right: default_squeeze_right(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            ray_length: default_ray_length(),
            ray_idle_color: default_ray_idle_color(),
            ray_active_color: default_ray_active_color(),
        }
    }
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            reticle_inner_radius: default_reticle_inner(),
            reticle_outer_radius: default_reticle_outer(),
            anchor_marker_radius: default_marker_radius(),
            anchor_marker_color: default_marker_color(),
            plane_color: default_plane_color(),
        }
    }
}

impl ControllerConfig {
    /// Multiplicative scale applied per squeeze for a given hand side
    pub fn squeeze_factor(&self, handedness: Handedness) -> f32 {
        match handedness {
            Handedness::Left => self.squeeze_scale_left,
            Handedness::Right | Handedness::None => self.squeeze_scale_right,
        }
    }
}

impl XrConfig {
    /// Parse a TOML document; missing sections keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: XrConfig = toml::from_str(content).map_err(|e| XrError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| XrError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let g = &self.gestures;
        let thresholds = [
            g.pinch_threshold,
            g.grab_threshold,
            g.point_threshold,
            g.pinch_pick_radius,
        ];
        if !thresholds.iter().all(|&t| positive(t)) {
            return Err(XrError::Config(
                "gesture thresholds must be finite and positive".to_string(),
            ));
        }
        if g.point_threshold < g.grab_threshold {
            return Err(XrError::Config(
                "point threshold must not be below the grab threshold".to_string(),
            ));
        }

        let c = &self.controllers;
        if !positive(c.min_scale) || !positive(c.max_scale) || c.min_scale > c.max_scale {
            return Err(XrError::Config(format!(
                "invalid scale range [{}, {}]",
                c.min_scale, c.max_scale
            )));
        }
        if !positive(c.squeeze_scale_left) || !positive(c.squeeze_scale_right) {
            return Err(XrError::Config(
                "squeeze scale factors must be finite and positive".to_string(),
            ));
        }
        if !positive(c.ray_length) {
            return Err(XrError::Config(
                "ray length must be finite and positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Finite and strictly greater than zero. NaN fails.
fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn default_true() -> bool { true }
fn default_overlay_root() -> String { "#overlay".to_string() }
fn default_pinch_threshold() -> f32 { 0.02 }
fn default_grab_threshold() -> f32 { 0.05 }
fn default_point_threshold() -> f32 { 0.08 }
fn default_pinch_pick_radius() -> f32 { 0.10 }
fn default_squeeze_left() -> f32 { 0.9 }
fn default_squeeze_right() -> f32 { 1.1 }
fn default_min_scale() -> f32 { 0.1 }
fn default_max_scale() -> f32 { 10.0 }
fn default_ray_length() -> f32 { 10.0 }
fn default_ray_idle_color() -> [f32; 4] { [1.0, 1.0, 1.0, 1.0] }
fn default_ray_active_color() -> [f32; 4] { [0.2, 0.8, 1.0, 1.0] }
fn default_reticle_inner() -> f32 { 0.15 }
fn default_reticle_outer() -> f32 { 0.2 }
fn default_marker_radius() -> f32 { 0.05 }
fn default_marker_color() -> [f32; 4] { [0.0, 1.0, 0.4, 1.0] }
fn default_plane_color() -> [f32; 4] { [0.3, 0.6, 1.0, 0.3] }
