//! `webkin-types` – shared vocabulary for the WebKin workspace.
//!
//! Holds the workspace-wide [`WebkinError`] and the [`CalibrationOverride`]
//! record that travels between the HTTP layer, the persistence store and the
//! kinematic engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-supplied correction layered on top of a joint's authored axis
/// parameters.
///
/// Every field is optional so a client can send partial updates; a `None`
/// field leaves the corresponding live value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slider_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slider_max: Option<f64>,
}

impl CalibrationOverride {
    /// Copy every field that is present in `update` onto `self`.
    pub fn merge(&mut self, update: &CalibrationOverride) {
        if update.axis_offset.is_some() {
            self.axis_offset = update.axis_offset;
        }
        if update.axis_scale.is_some() {
            self.axis_scale = update.axis_scale;
        }
        if update.slider_min.is_some() {
            self.slider_min = update.slider_min;
        }
        if update.slider_max.is_some() {
            self.slider_max = update.slider_max;
        }
    }

    /// `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self.axis_offset.is_none()
            && self.axis_scale.is_none()
            && self.slider_min.is_none()
            && self.slider_max.is_none()
    }
}

/// Joint name → override, ordered by name for stable persistence.
pub type CalibrationOverrides = BTreeMap<String, CalibrationOverride>;

/// Global error type spanning tree loading, persistence and transport failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WebkinError {
    #[error("Invalid tree description at {path}: {reason}")]
    InvalidDescription { path: String, reason: String },

    #[error("Loader Error: {0}")]
    Loader(String),

    #[error("Calibration Store Error: {0}")]
    Store(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Config Error: {0}")]
    Config(String),
}

impl WebkinError {
    /// Shorthand for [`WebkinError::InvalidDescription`].
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescription {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
