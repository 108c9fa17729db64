//! Human-readable output of the calibration loop
//!
//! The controller never prints. It emits [`Report`]s over an mpsc channel and
//! the [`ConsolePrinter`] task renders them, connection errors on stderr and
//! everything else on stdout.

use crate::sensor::{Measurement, OffsetVector};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Title line, printed before the connection check
    Banner,
    /// Device initialized, sampling starts after `startup_delay`
    Ready { startup_delay: Duration },
    Sample {
        measurement: Measurement,
        /// Time left in the current sampling window
        remaining: Duration,
    },
    Calibrated {
        offsets: OffsetVector,
        temperature: Option<f32>,
    },
    NotConnected,
    Shutdown,
}

impl Report {
    pub fn is_error(&self) -> bool {
        matches!(self, Report::NotConnected)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Banner => write!(f, "\nQwiic MMC5983MA Example 2 - Calibration\n"),
            Report::Ready { startup_delay } => {
                writeln!(
                    f,
                    "During this demo, it is suggested to expose the sensor to a 'strong' magnet."
                )?;
                writeln!(
                    f,
                    "This will best demonstrate the benefit of calibration, because residual"
                )?;
                writeln!(
                    f,
                    "magnetization can persist in the MMC5983MA, even through power cycles."
                )?;
                writeln!(f)?;
                write!(f, "Beginning in {} seconds...", startup_delay.as_secs())
            }
            Report::Sample {
                measurement,
                remaining,
            } => {
                writeln!(f, "X: {:.6}", measurement.x)?;
                writeln!(f, "Y: {:.6}", measurement.y)?;
                writeln!(f, "Z: {:.6}", measurement.z)?;
                writeln!(f, "Re-calibrating in {} seconds...", remaining.as_secs())
            }
            Report::Calibrated {
                offsets,
                temperature,
            } => {
                writeln!(f, "Calibration complete! New offsets:")?;
                write!(f, "{}", offsets)?;
                if let Some(celsius) = temperature {
                    write!(f, "\nDie temperature: {:.1} °C", celsius)?;
                }
                Ok(())
            }
            Report::NotConnected => write!(
                f,
                "The device isn't connected to the system. Please check your connection"
            ),
            Report::Shutdown => write!(f, "\nEnding calibration demo"),
        }
    }
}

/// Drains the report channel onto the terminal
pub struct ConsolePrinter;

impl ConsolePrinter {
    /// Runs until every sender is dropped, returning the number of reports printed
    pub fn spawn(mut receiver: mpsc::Receiver<Report>) -> JoinHandle<usize> {
        info!("Starting console printer");
        tokio::spawn(async move {
            let mut printed = 0;
            while let Some(report) = receiver.recv().await {
                if report.is_error() {
                    eprintln!("{}", report);
                } else {
                    println!("{}", report);
                }
                printed += 1;
            }
            debug!("Report channel closed after {} reports", printed);
            printed
        })
    }
}
