//! Magnetometer driver layer
//!
//! The controller only ever talks to a [`Magnetometer`]. The MMC5983MA
//! implementation sits on top of a [`bus::RegisterBus`] so the SET/RESET
//! sequence can be exercised against a simulated chip.
//!
//! ```text
//! CalibrationController ──► dyn Magnetometer ──► Mmc5983ma<B> ──► RegisterBus (rppal I2C)
//! ```

pub mod bus;
pub mod mmc5983ma;
pub mod registers;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use mmc5983ma::{DriverTiming, Mmc5983ma};

/// One offset-corrected three-axis reading in gauss
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub timestamp: DateTime<Local>,
}

/// Per-axis bias in gauss, subtracted from every raw reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OffsetVector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl OffsetVector {
    /// Midpoint of the readings taken after a SET and a RESET pulse.
    ///
    /// The pulses flip the sign of the sensed field while the sensor bias keeps
    /// its sign, so the mean of both readings leaves only the bias.
    pub fn from_set_reset(set: [f32; 3], reset: [f32; 3]) -> Self {
        Self {
            x: (set[0] + reset[0]) / 2.0,
            y: (set[1] + reset[1]) / 2.0,
            z: (set[2] + reset[2]) / 2.0,
        }
    }

    pub fn apply(&self, raw: [f32; 3]) -> [f32; 3] {
        [raw[0] - self.x, raw[1] - self.y, raw[2] - self.z]
    }
}

impl fmt::Display for OffsetVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6}, {:.6})", self.x, self.y, self.z)
    }
}

/// Driver errors
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Bus transaction failed: {0}")]
    Bus(String),

    #[error("Measurement did not complete after {0} status polls")]
    MeasurementTimeout(u32),

    #[error("Unexpected product id: {0:#04x}")]
    UnexpectedProductId(u8),
}

/// Capability handle for a three-axis magnetometer with SET/RESET offset calibration
pub trait Magnetometer: Send {
    /// Probes the device; any bus failure counts as absent
    fn is_connected(&mut self) -> bool;

    /// Configures the device and runs a first calibration
    fn initialize(&mut self) -> Result<(), SensorError>;

    /// Takes one measurement with the current offsets applied
    fn read_measurement(&mut self) -> Result<Measurement, SensorError>;

    /// Replaces the stored offsets with a freshly computed SET/RESET midpoint
    fn calibrate_offsets(&mut self) -> Result<(), SensorError>;

    fn offsets(&self) -> OffsetVector;

    /// Die temperature in °C, if the device has a sensor for it
    fn read_temperature(&mut self) -> Result<Option<f32>, SensorError> {
        Ok(None)
    }
}
