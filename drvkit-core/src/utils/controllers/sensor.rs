//! Register-mapped I2C sensor.
//!
//! The sensor exposes a small register file: an identification register, a
//! control register (soft reset, sample rate), the register after it
//! (resolution) and a little-endian 16-bit data word. Operations are bound at
//! `init` by constructing a [`SensorRegisters`] over a `RefCellDevice` on the
//! shared bus.

use core::cell::RefCell;

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use serde::{Deserialize, Serialize};

use super::{Device, DeviceError, Response};

/// Default 7-bit bus address.
pub const SENSOR_I2C_ADDRESS: u8 = 0x30;
/// Identification register.
pub const REG_ID: u8 = 0x00;
/// Control register; also receives the sample rate.
pub const REG_CTRL: u8 = 0x01;
/// Low byte of the data word; the high byte follows.
pub const REG_DATA: u8 = 0x02;
/// Value written to `REG_CTRL` to request a soft reset.
pub const RESET_CMD: u8 = 0x01;

/// Tunable sensor parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub sample_rate: u8,
    pub resolution: u8,
    pub enable_interrupt: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 10,
            resolution: 12,
            enable_interrupt: false,
        }
    }
}

/// Sensor command variants.
///
/// Serialized as JSON with tag `"sc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(tag = "sc", rename_all = "snake_case")]
pub enum SensorCommand {
    /// Issue a soft reset.
    Reset,
    /// Read the identification register.
    Probe,
    /// Read one register.
    Read { reg: u8 },
    /// Write one register.
    Write { reg: u8, value: u8 },
    /// Apply a new configuration.
    Config(SensorConfig),
    /// Read the 16-bit data word.
    Data,
}

/// Bound register operations of an initialized sensor.
pub struct SensorRegisters<D> {
    dev: D,
    address: u8,
}

impl<D, E> SensorRegisters<D>
where
    D: I2c<Error = E>,
    E: embedded_hal::i2c::Error,
{
    pub fn new(
        dev: D,
        address: u8,
    ) -> Self {
        Self { dev, address }
    }

    /// Soft reset via the control register.
    pub fn reset(&mut self) -> Result<(), DeviceError<E>> {
        self.write_register(REG_CTRL, RESET_CMD)
    }

    pub fn read_register(
        &mut self,
        reg: u8,
    ) -> Result<u8, DeviceError<E>> {
        let mut buf = [0u8; 1];
        self.dev
            .write_read(self.address, &[reg], &mut buf)
            .map_err(DeviceError::from_bus)?;
        Ok(buf[0])
    }

    pub fn write_register(
        &mut self,
        reg: u8,
        value: u8,
    ) -> Result<(), DeviceError<E>> {
        self.dev
            .write(self.address, &[reg, value])
            .map_err(DeviceError::from_bus)
    }

    /// Write sample rate, then resolution. Stops at the first failure.
    pub fn set_config(
        &mut self,
        config: &SensorConfig,
    ) -> Result<(), DeviceError<E>> {
        self.write_register(REG_CTRL, config.sample_rate)?;
        self.write_register(REG_CTRL + 1, config.resolution)?;
        Ok(())
    }

    /// Read low byte, then high byte. Stops at the first failure.
    pub fn get_data(&mut self) -> Result<u16, DeviceError<E>> {
        let low = self.read_register(REG_DATA)?;
        let high = self.read_register(REG_DATA + 1)?;
        Ok((u16::from(high) << 8) | u16::from(low))
    }
}

/// A sensor on a shared I2C bus.
pub struct Sensor<'a, I2C: 'static> {
    i2c: &'a RefCell<I2C>,
    address: u8,
    defaults: SensorConfig,
    config: SensorConfig,
    ops: Option<SensorRegisters<RefCellDevice<'a, I2C>>>,
}

impl<'a, I2C, E> Sensor<'a, I2C>
where
    I2C: I2c<Error = E> + 'static,
    E: embedded_hal::i2c::Error,
{
    /// Create an uninitialized sensor at [`SENSOR_I2C_ADDRESS`].
    ///
    /// `defaults` is applied on every `init`.
    pub fn new(
        i2c_bus: &'a RefCell<I2C>,
        defaults: SensorConfig,
    ) -> Self {
        Self::with_address(i2c_bus, SENSOR_I2C_ADDRESS, defaults)
    }

    pub fn with_address(
        i2c_bus: &'a RefCell<I2C>,
        address: u8,
        defaults: SensorConfig,
    ) -> Self {
        Sensor {
            i2c: i2c_bus,
            address,
            defaults,
            config: defaults,
            ops: None,
        }
    }

    /// Currently applied configuration.
    pub fn config(&self) -> SensorConfig {
        self.config
    }

    fn ops(&mut self) -> Result<&mut SensorRegisters<RefCellDevice<'a, I2C>>, DeviceError<E>> {
        self.ops.as_mut().ok_or(DeviceError::NotInitialized)
    }

    pub fn reset(&mut self) -> Result<(), DeviceError<E>> {
        self.ops()?.reset()
    }

    pub fn read_register(
        &mut self,
        reg: u8,
    ) -> Result<u8, DeviceError<E>> {
        self.ops()?.read_register(reg)
    }

    pub fn write_register(
        &mut self,
        reg: u8,
        value: u8,
    ) -> Result<(), DeviceError<E>> {
        self.ops()?.write_register(reg, value)
    }

    /// Apply `config`. The stored configuration only changes once every
    /// register write has succeeded.
    pub fn set_config(
        &mut self,
        config: SensorConfig,
    ) -> Result<(), DeviceError<E>> {
        self.ops()?.set_config(&config)?;
        self.config = config;
        tracing::info!(?config, "sensor configured");
        Ok(())
    }

    pub fn get_data(&mut self) -> Result<u16, DeviceError<E>> {
        self.ops()?.get_data()
    }

    /// Read the identification register.
    pub fn probe(&mut self) -> Result<u8, DeviceError<E>> {
        self.read_register(REG_ID)
    }

    /// Scan the I2C bus for devices and log any found addresses.
    pub fn scan_bus(&self) {
        let mut bus = self.i2c.borrow_mut();
        for addr in 0x03..0x78 {
            if bus.write(addr, &[]).is_ok() {
                tracing::warn!("I2C device found at 0x{:02X}", addr);
            }
        }
    }

    /// Execute a `SensorCommand`.
    pub fn execute_command(
        &mut self,
        command: SensorCommand,
    ) -> Result<Response, DeviceError<E>> {
        match command {
            SensorCommand::Reset => self.reset().map(|_| Response::Done),
            SensorCommand::Probe => self.probe().map(Response::Register),
            SensorCommand::Read { reg } => self.read_register(reg).map(Response::Register),
            SensorCommand::Write { reg, value } => {
                self.write_register(reg, value).map(|_| Response::Done)
            }
            SensorCommand::Config(config) => self.set_config(config).map(|_| Response::Done),
            SensorCommand::Data => self.get_data().map(Response::Data),
        }
    }
}

impl<'a, I2C, E> Device for Sensor<'a, I2C>
where
    I2C: I2c<Error = E> + 'static,
    E: embedded_hal::i2c::Error,
{
    type Error = DeviceError<E>;

    fn address(&self) -> u8 {
        self.address
    }

    fn is_initialized(&self) -> bool {
        self.ops.is_some()
    }

    /// Bind register operations, restore the default configuration and
    /// issue a soft reset.
    ///
    /// A failed reset leaves the sensor uninitialized.
    fn init(&mut self) -> Result<(), Self::Error> {
        if self.ops.is_some() {
            return Err(DeviceError::AlreadyInitialized);
        }

        let mut ops = SensorRegisters::new(RefCellDevice::new(self.i2c), self.address);
        ops.reset()?;

        self.config = self.defaults;
        self.ops = Some(ops);
        tracing::info!(address = self.address, config = ?self.config, "sensor initialized");
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), Self::Error> {
        if self.ops.take().is_none() {
            return Err(DeviceError::NotInitialized);
        }
        tracing::info!(address = self.address, "sensor deinitialized");
        Ok(())
    }
}
