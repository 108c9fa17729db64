//! Calibration controller with a statum typestate machine
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Initialized ──► Sampling ──► Calibrating
//!      │                              ▲              │
//!   (absent)                          └──────────────┘
//!      ▼                           (settle delay between)
//!  NotConnected
//! ```
//!
//! Every transition consumes the controller, so a cycle cannot be sampled
//! twice or calibrated before its window has closed.

use super::clock::Clock;
use super::report::Report;
use crate::sensor::{Magnetometer, OffsetVector, SensorError};
use statum::{machine, state};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Timing of the read/calibrate loop
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerSettings {
    /// Length of each sampling window
    pub sample_window: Duration,
    /// Spacing between measurements inside a window
    pub sample_interval: Duration,
    /// Pause after each calibration so the offsets can be read
    pub settle_delay: Duration,
    /// Pause between the startup banner and the first window
    pub startup_delay: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            sample_window: Duration::from_secs(10),
            sample_interval: Duration::from_millis(100),
            settle_delay: Duration::from_secs(5),
            startup_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Sensor is not connected")]
    NotConnected,

    #[error("Sensor error: {0}")]
    SensorError(#[from] SensorError),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

/// One sampling window, rebuilt at the start of every cycle
#[derive(Debug, Clone, Copy)]
pub struct CalibrationCycle {
    pub started_at: Instant,
    pub sample_window: Duration,
    pub sample_interval: Duration,
}

impl CalibrationCycle {
    pub fn begin(started_at: Instant, sample_window: Duration, sample_interval: Duration) -> Self {
        Self {
            started_at,
            sample_window,
            sample_interval,
        }
    }

    pub fn is_over(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.sample_window
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.sample_window
            .saturating_sub(now.saturating_duration_since(self.started_at))
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum CalibrationState {
    Disconnected,
    Initialized,
    Sampling,
    Calibrating,
}

#[machine]
pub struct CalibrationController<S: CalibrationState> {
    driver: Box<dyn Magnetometer>,
    clock: Arc<dyn Clock>,
    settings: ControllerSettings,
    report_sender: mpsc::Sender<Report>,
    calibrations: u64,
}

impl<S: CalibrationState> CalibrationController<S> {
    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Completed calibrations, not counting the one run by the driver at startup
    pub fn calibrations(&self) -> u64 {
        self.calibrations
    }

    pub fn offsets(&self) -> OffsetVector {
        self.driver.offsets()
    }
}

// Borrows only the sender so session futures stay Send
async fn send_report(sender: &mpsc::Sender<Report>, report: Report) -> Result<(), ControllerError> {
    sender
        .send(report)
        .await
        .map_err(|e| ControllerError::ChannelError(format!("Failed to send report: {}", e)))
}

impl CalibrationController<Disconnected> {
    pub fn create(
        driver: Box<dyn Magnetometer>,
        clock: Arc<dyn Clock>,
        settings: ControllerSettings,
        report_sender: mpsc::Sender<Report>,
    ) -> Self {
        debug!("Creating calibration controller with settings: {:?}", settings);
        Self::new(driver, clock, settings, report_sender, 0)
    }

    /// Probes and initializes the sensor; an absent device is fatal
    pub fn connect(mut self) -> Result<CalibrationController<Initialized>, ControllerError> {
        if !self.driver.is_connected() {
            warn!("Magnetometer did not answer the connection check");
            return Err(ControllerError::NotConnected);
        }

        info!("Magnetometer found, initializing");
        self.driver.initialize()?;
        info!("Initial offsets: {}", self.driver.offsets());
        Ok(self.transition())
    }
}

impl CalibrationController<Initialized> {
    /// Announces the demo and waits the startup delay before the first window
    pub async fn start(self) -> Result<CalibrationController<Sampling>, ControllerError> {
        let startup_delay = self.settings.startup_delay;
        send_report(&self.report_sender, Report::Ready { startup_delay }).await?;
        self.clock.sleep(startup_delay).await;

        info!("Entering sampling loop");
        Ok(self.transition())
    }
}

impl CalibrationController<Sampling> {
    /// Reads and reports measurements every `sample_interval` until `sample_window` has passed
    pub async fn run_cycle(
        mut self,
        sample_window: Duration,
        sample_interval: Duration,
    ) -> Result<CalibrationController<Calibrating>, ControllerError> {
        let cycle = CalibrationCycle::begin(self.clock.now(), sample_window, sample_interval);
        debug!("Starting cycle: {:?}", cycle);

        let mut samples = 0u32;
        while !cycle.is_over(self.clock.now()) {
            let measurement = self.driver.read_measurement()?;
            let remaining = cycle.remaining(self.clock.now());
            debug!(
                "Sample {}: x={:.6} y={:.6} z={:.6}",
                samples, measurement.x, measurement.y, measurement.z
            );

            send_report(
                &self.report_sender,
                Report::Sample {
                    measurement,
                    remaining,
                },
            )
            .await?;
            samples += 1;

            self.clock.sleep(cycle.sample_interval).await;
        }

        info!(
            "Sampling window of {:?} closed after {} samples",
            cycle.sample_window, samples
        );
        Ok(self.transition())
    }

    /// Alternates sampling windows and calibrations until the future is dropped
    pub async fn run_forever(self) -> Result<Infallible, ControllerError> {
        let mut sampling = self;
        loop {
            let window = sampling.settings.sample_window;
            let interval = sampling.settings.sample_interval;

            let (next, _) = sampling.run_cycle(window, interval).await?.calibrate().await?;

            next.clock.sleep(next.settings.settle_delay).await;
            sampling = next;
        }
    }
}

impl CalibrationController<Calibrating> {
    /// Runs the SET/RESET offset calibration and reports the new offsets
    pub async fn calibrate(
        mut self,
    ) -> Result<(CalibrationController<Sampling>, OffsetVector), ControllerError> {
        info!("Recalibrating offsets");
        self.driver.calibrate_offsets()?;

        let offsets = self.driver.offsets();
        let temperature = self.driver.read_temperature()?;
        self.calibrations += 1;
        info!(
            "Calibration {} complete, offsets {}",
            self.calibrations, offsets
        );

        send_report(
            &self.report_sender,
            Report::Calibrated {
                offsets,
                temperature,
            },
        )
        .await?;
        Ok((self.transition(), offsets))
    }
}
