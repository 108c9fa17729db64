//! MMC5983MA three-axis magnetoresistive sensor
//!
//! Measurements are single-shot: a TM_M command starts a conversion, STATUS is
//! polled until MEAS_M_DONE and the seven output bytes are read in one burst.
//!
//! # Offset calibration
//!
//! ```text
//! SET pulse ──► read (+H + bias) ──► RESET pulse ──► read (-H + bias) ──► offset = mean
//!                                                                           │
//!                                                   SET pulse (restore) ◄───┘
//! ```
//!
//! The closing SET leaves the sensing element in its normal polarity so that
//! later readings report the field with the right sign.

use super::bus::RegisterBus;
use super::registers::{self, Bandwidth};
use super::{Magnetometer, Measurement, OffsetVector, SensorError};
use chrono::Local;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Blocking waits used inside bus sequences
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverTiming {
    /// Wait after a SET or RESET pulse before the next conversion
    pub set_reset_settle: Duration,
    /// Spacing between STATUS polls while a conversion runs
    pub measurement_poll: Duration,
    pub max_polls: u32,
    /// Wait after a software reset
    pub soft_reset: Duration,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            set_reset_settle: Duration::from_millis(1),
            measurement_poll: Duration::from_millis(1),
            max_polls: 50,
            soft_reset: Duration::from_millis(15),
        }
    }
}

pub struct Mmc5983ma<B: RegisterBus> {
    bus: B,
    offsets: OffsetVector,
    bandwidth: Bandwidth,
    timing: DriverTiming,
}

impl<B: RegisterBus> Mmc5983ma<B> {
    pub fn new(bus: B, bandwidth: Bandwidth, timing: DriverTiming) -> Self {
        debug!(
            "Creating MMC5983MA driver, bandwidth {:?}, timing {:?}",
            bandwidth, timing
        );
        Self {
            bus,
            offsets: OffsetVector::default(),
            bandwidth,
            timing,
        }
    }

    /// Gives the bus back, dropping the driver state
    pub fn release(self) -> B {
        self.bus
    }

    pub fn perform_set(&mut self) -> Result<(), SensorError> {
        self.bus
            .write_register(registers::INTERNAL_CONTROL_0, registers::SET_OPERATION)?;
        pause(self.timing.set_reset_settle);
        Ok(())
    }

    pub fn perform_reset(&mut self) -> Result<(), SensorError> {
        self.bus
            .write_register(registers::INTERNAL_CONTROL_0, registers::RESET_OPERATION)?;
        pause(self.timing.set_reset_settle);
        Ok(())
    }

    pub fn soft_reset(&mut self) -> Result<(), SensorError> {
        info!("Soft-resetting MMC5983MA");
        self.bus
            .write_register(registers::INTERNAL_CONTROL_1, registers::SW_RST)?;
        pause(self.timing.soft_reset);
        Ok(())
    }

    /// Field in gauss without offsets applied
    pub fn read_raw_gauss(&mut self) -> Result<[f32; 3], SensorError> {
        self.convert(registers::TM_M, registers::MEAS_M_DONE)?;

        let mut buf = [0u8; registers::OUTPUT_LEN];
        self.bus.read_registers(registers::X_OUT_0, &mut buf)?;
        let counts = registers::unpack_counts(&buf);
        debug!("Raw counts: {:?}", counts);

        Ok(counts.map(registers::counts_to_gauss))
    }

    fn convert(&mut self, command: u8, done: u8) -> Result<(), SensorError> {
        self.bus
            .write_register(registers::INTERNAL_CONTROL_0, command)?;

        for _ in 0..self.timing.max_polls {
            if self.bus.read_register(registers::STATUS)? & done != 0 {
                return Ok(());
            }
            pause(self.timing.measurement_poll);
        }

        warn!(
            "Conversion {:#04x} not done after {} polls",
            command, self.timing.max_polls
        );
        Err(SensorError::MeasurementTimeout(self.timing.max_polls))
    }
}

impl<B: RegisterBus> Magnetometer for Mmc5983ma<B> {
    fn is_connected(&mut self) -> bool {
        match self.bus.read_register(registers::PRODUCT_ID) {
            Ok(id) if id == registers::PRODUCT_ID_VALUE => true,
            Ok(id) => {
                warn!("Device answered with product id {:#04x}", id);
                false
            }
            Err(e) => {
                debug!("Product id read failed: {}", e);
                false
            }
        }
    }

    fn initialize(&mut self) -> Result<(), SensorError> {
        let id = self.bus.read_register(registers::PRODUCT_ID)?;
        if id != registers::PRODUCT_ID_VALUE {
            return Err(SensorError::UnexpectedProductId(id));
        }

        self.soft_reset()?;
        self.bus.write_register(
            registers::INTERNAL_CONTROL_1,
            self.bandwidth.bits() & registers::BANDWIDTH_MASK,
        )?;
        // single-shot mode, no periodic SET
        self.bus.write_register(registers::INTERNAL_CONTROL_2, 0)?;

        self.calibrate_offsets()?;
        info!("MMC5983MA initialized, offsets {}", self.offsets);
        Ok(())
    }

    fn read_measurement(&mut self) -> Result<Measurement, SensorError> {
        let raw = self.read_raw_gauss()?;
        let [x, y, z] = self.offsets.apply(raw);
        Ok(Measurement {
            x,
            y,
            z,
            timestamp: Local::now(),
        })
    }

    fn calibrate_offsets(&mut self) -> Result<(), SensorError> {
        self.perform_set()?;
        let set = self.read_raw_gauss()?;

        self.perform_reset()?;
        let reset = self.read_raw_gauss()?;

        self.perform_set()?;

        self.offsets = OffsetVector::from_set_reset(set, reset);
        debug!(
            "SET reading {:?}, RESET reading {:?}, offsets {}",
            set, reset, self.offsets
        );
        Ok(())
    }

    fn offsets(&self) -> OffsetVector {
        self.offsets
    }

    fn read_temperature(&mut self) -> Result<Option<f32>, SensorError> {
        self.convert(registers::TM_T, registers::MEAS_T_DONE)?;
        let raw = self.bus.read_register(registers::T_OUT)?;
        Ok(Some(registers::temperature_celsius(raw)))
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}
