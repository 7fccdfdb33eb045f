//! Module Exports
//!
//! This file exports the hardware objects and the shared lifecycle they follow.
//!
//! - `sensor`: register-mapped I2C sensor.
//! - `motor`: FOC motor controller with a cascaded control pipeline.
//! - `outputs`: phase output stages (PCA9685 channels, MCU PWM timers).

pub mod motor;
pub mod outputs;
pub mod sensor;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::i2c::{Error as _, ErrorKind};
use serde::{Deserialize, Serialize};

pub use motor::{
    ControlMode, MotorCommand, MotorConfig, MotorController, MotorError, MotorFeedback,
    MotorReading, MotorStatus, OpenLoop, PhaseCurrents, PhaseOutputs,
};
pub use outputs::{Pca9685Outputs, ThreePwmOutputs};
pub use sensor::{Sensor, SensorCommand, SensorConfig};

/// Channel used to receive `SystemCommand` messages.
pub static COMMAND_CHANNEL: embassy_sync::channel::Channel<
    CriticalSectionRawMutex,
    SystemCommand,
    16,
> = embassy_sync::channel::Channel::new();

/// Lifecycle shared by every hardware object.
///
/// An object is created uninitialized. `init` binds its operations, applies
/// the default configuration and issues a reset; `deinit` releases them.
/// Operations on an uninitialized object fail with a `NotInitialized` error.
pub trait Device {
    type Error;

    /// Bus identifier, fixed at construction.
    fn address(&self) -> u8;

    /// `true` only between a successful `init` and the next `deinit`.
    fn is_initialized(&self) -> bool;

    fn init(&mut self) -> Result<(), Self::Error>;

    fn deinit(&mut self) -> Result<(), Self::Error>;
}

/// Coarse outcome of a register operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
    Timeout,
    Busy,
}

impl Status {
    pub fn of<T, E>(result: &Result<T, DeviceError<E>>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}

/// Errors that can occur when interacting with a register-mapped device.
#[derive(Debug)]
pub enum DeviceError<E> {
    /// The bus reported a failure that is neither a timeout nor contention.
    Bus(E),
    /// The device did not acknowledge in time.
    Timeout(E),
    /// Another controller holds the bus.
    Busy(E),
    NotInitialized,
    AlreadyInitialized,
}

impl<E> DeviceError<E> {
    pub fn status(&self) -> Status {
        match self {
            DeviceError::Timeout(_) => Status::Timeout,
            DeviceError::Busy(_) => Status::Busy,
            DeviceError::Bus(_) | DeviceError::NotInitialized | DeviceError::AlreadyInitialized => {
                Status::Error
            }
        }
    }
}

impl<E: embedded_hal::i2c::Error> DeviceError<E> {
    /// Classify a raw bus error.
    pub fn from_bus(error: E) -> Self {
        match error.kind() {
            ErrorKind::NoAcknowledge(_) => DeviceError::Timeout(error),
            ErrorKind::ArbitrationLoss => DeviceError::Busy(error),
            _ => DeviceError::Bus(error),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "ct", rename_all = "snake_case")] // ct = command type
pub enum SystemCommand {
    S(SensorCommand),
    M(MotorCommand),
}

/// Result of a successfully executed `SystemCommand`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    Done,
    Register(u8),
    Data(u16),
    Motor(MotorReading),
}

/// Why a `SystemCommand` could not be executed.
///
/// The underlying driver error is logged where it occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    SensorUnavailable,
    MotorUnavailable,
    Sensor(Status),
    Motor,
}

/// Owns every hardware object and dispatches commands to them.
pub struct SystemController<I2C: 'static, O, F> {
    pub sensor: Option<Sensor<'static, I2C>>,
    pub motor: Option<MotorController<O, F>>,
}

impl<I2C, O, F> SystemController<I2C, O, F>
where
    I2C: embedded_hal::i2c::I2c + 'static,
    O: PhaseOutputs,
    F: MotorFeedback,
{
    /// Initialize the sensor on `i2c_bus` and the given motor.
    ///
    /// A device that fails to initialize is left out; for the sensor the bus
    /// is scanned so the log shows what actually answered.
    pub fn new(
        i2c_bus: &'static RefCell<I2C>,
        sensor_config: SensorConfig,
        mut motor: MotorController<O, F>,
    ) -> Self {
        let mut sensor = Sensor::new(i2c_bus, sensor_config);

        let sensor = match sensor.init() {
            Ok(()) => Some(sensor),
            Err(e) => {
                tracing::warn!("sensor init failed, scanning instead: {:?}", e);
                sensor.scan_bus();
                None
            }
        };

        let motor = match motor.init() {
            Ok(()) => Some(motor),
            Err(e) => {
                tracing::error!("motor init failed: {:?}", e);
                None
            }
        };

        SystemController { sensor, motor }
    }

    /// Execute one command against the matching device.
    pub fn execute(
        &mut self,
        command: SystemCommand,
    ) -> Result<Response, CommandError> {
        match command {
            SystemCommand::S(cmd) => {
                let sensor = self.sensor.as_mut().ok_or(CommandError::SensorUnavailable)?;
                sensor.execute_command(cmd).map_err(|e| {
                    tracing::error!(?cmd, "sensor command failed: {:?}", e);
                    CommandError::Sensor(e.status())
                })
            }
            SystemCommand::M(cmd) => {
                let motor = self.motor.as_mut().ok_or(CommandError::MotorUnavailable)?;
                match motor.execute_command(cmd) {
                    Ok(Some(reading)) => Ok(Response::Motor(reading)),
                    Ok(None) => Ok(Response::Done),
                    Err(e) => {
                        tracing::error!(?cmd, "motor command failed: {:?}", e);
                        Err(CommandError::Motor)
                    }
                }
            }
        }
    }

    /// Receive commands from `COMMAND_CHANNEL` forever.
    pub async fn run(&mut self) -> ! {
        loop {
            let command = COMMAND_CHANNEL.receiver().receive().await;
            tracing::info!("Received command: {:?}", command);
            match self.execute(command) {
                Ok(Response::Done) => tracing::info!("command executed successfully"),
                Ok(response) => tracing::info!(?response, "command returned data"),
                Err(CommandError::SensorUnavailable) => {
                    tracing::warn!("sensor command received but sensor not initialized")
                }
                Err(CommandError::MotorUnavailable) => {
                    tracing::warn!("motor command received but motor not initialized")
                }
                Err(err) => tracing::error!(?err, "command failed"),
            }
        }
    }
}
