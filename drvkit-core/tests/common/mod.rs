//! Shared fakes and I2C transaction helpers for the integration tests.
#![allow(dead_code)]

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_mock::eh1::i2c::Transaction as I2cTrans;
use drvkit_core::utils::controllers::{MotorFeedback, PhaseCurrents, PhaseOutputs};

/// Default I2C address for the sensor.
pub const SENSOR_ADDRESS: u8 = 0x30;
/// Default I2C address for the PWM expander.
pub const PWM_ADDRESS: u8 = 0x55;

/// Create a write transaction for the given I2C address and data payload.
pub fn write(
    addr: u8,
    data: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write(addr, data)
}
/// Create a write_read transaction for the given I2C address/payloads.
pub fn write_read(
    addr: u8,
    write: Vec<u8>,
    read: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write_read(addr, write, read)
}
/// Error the mock reports when a device does not answer.
pub fn nack() -> ErrorKind {
    ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
}

/// Output stage that records everything it is asked to do.
#[derive(Default)]
pub struct RecordingStage {
    pub enabled: Vec<bool>,
    pub duties: Vec<[f32; 3]>,
    pub fail: bool,
}

impl RecordingStage {
    pub fn last_duty(&self) -> [f32; 3] {
        *self.duties.last().expect("no duty written")
    }
}

impl PhaseOutputs for RecordingStage {
    type Error = &'static str;

    fn enable(
        &mut self,
        on: bool,
    ) -> Result<(), Self::Error> {
        if self.fail {
            return Err("stage offline");
        }
        self.enabled.push(on);
        Ok(())
    }

    fn set_duty(
        &mut self,
        duty: [f32; 3],
    ) -> Result<(), Self::Error> {
        if self.fail {
            return Err("stage offline");
        }
        self.duties.push(duty);
        Ok(())
    }
}

/// Feedback with fixed, settable readings.
#[derive(Default)]
pub struct FixedFeedback {
    pub currents: PhaseCurrents,
    pub angle: f32,
    pub rpm: f32,
}

impl MotorFeedback for FixedFeedback {
    type Error = &'static str;

    fn phase_currents(&mut self) -> Result<PhaseCurrents, Self::Error> {
        Ok(self.currents)
    }

    fn mechanical_angle(&mut self) -> Result<f32, Self::Error> {
        Ok(self.angle)
    }

    fn velocity_rpm(&mut self) -> Result<f32, Self::Error> {
        Ok(self.rpm)
    }
}

pub fn close(
    a: f32,
    b: f32,
) -> bool {
    (a - b).abs() < 1e-4
}
