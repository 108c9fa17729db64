//! Calibration loop for the magnetometer
//!
//! 1. [`calibration_controller`] - typestate machine driving sampling and calibration
//! 2. [`clock`] - injectable time source for windows and delays
//! 3. [`report`] - typed output and the console printer
//!
//! # Architecture
//!
//! ```text
//! Magnetometer ──► CalibrationController ──[Report]──► ConsolePrinter ──► stdout/stderr
//!                        ▲
//!                      Clock
//! ```
//!
//! The controller runs on the main task. Only the printer and the Ctrl-C
//! watcher run beside it.

pub mod calibration_controller;
pub mod clock;
pub mod report;

pub use calibration_controller::{
    CalibrationController, ControllerError, ControllerSettings, Disconnected,
};
pub use clock::TokioClock;
pub use report::{ConsolePrinter, Report};
