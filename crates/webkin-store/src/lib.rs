//! `webkin-store` – persistence for calibration overrides.
//!
//! Overrides are kept as one flat JSON object keyed by joint name:
//!
//! ```json
//! {
//!   "shoulder": { "axis_offset": 0.05 },
//!   "lift": { "axis_scale": 0.001, "slider_min": 0, "slider_max": 400 }
//! }
//! ```
//!
//! The file is read once by [`CalibrationStore::open`] and rewritten after
//! every mutation.

pub mod calibration;

pub use calibration::CalibrationStore;
