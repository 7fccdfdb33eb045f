use clap::Parser;
use core::cell::RefCell;
use critical_section as _;
use drvkit_core::mk_static;
use drvkit_core::utils::connection::forward;
use drvkit_core::utils::controllers::{
    MotorConfig, MotorController, OpenLoop, Pca9685Outputs, SensorConfig, SystemController,
};
use embassy_executor::{Executor, Spawner};
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use embedded_hal_bus::i2c::RefCellDevice;
use pwm_pca9685::{Address as PwmAddress, Channel, Pca9685};
use static_cell::StaticCell;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

const SENSOR_ADDRESS: u8 = 0x30;
const PWM_ADDRESS: u8 = 0x55;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// 16-bit word the simulated sensor reports
    #[clap(long, default_value_t = 0x0102)]
    sample: u16,
    /// value of the sensor identification register
    #[clap(long, default_value_t = 0x5A)]
    id: u8,
    /// leave the sensor off the bus
    #[clap(long)]
    no_sensor: bool,
    /// PCA9685 prescale
    #[clap(long, default_value_t = 3)]
    prescale: u8,
    /// JSON commands, e.g. '{"ct":"m","mc":"speed","rpm":3000}'
    commands: Vec<String>,
}

/// Register-file I2C bus: each device is 256 bytes with an auto-incrementing
/// pointer set by the first written byte.
struct SimBus {
    devices: BTreeMap<u8, ([u8; 256], u8)>,
}

impl SimBus {
    fn new() -> Self {
        Self { devices: BTreeMap::new() }
    }

    fn attach(
        &mut self,
        address: u8,
        registers: &[(u8, u8)],
    ) {
        let mut file = [0u8; 256];
        for &(reg, value) in registers {
            file[reg as usize] = value;
        }
        self.devices.insert(address, (file, 0));
    }
}

impl ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let (file, pointer) = self
            .devices
            .get_mut(&address)
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))?;

        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    if let Some((&reg, data)) = bytes.split_first() {
                        *pointer = reg;
                        for &b in data {
                            file[*pointer as usize] = b;
                            *pointer = pointer.wrapping_add(1);
                        }
                        debug!(address, reg, ?data, "bus write");
                    }
                }
                Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        *b = file[*pointer as usize];
                        *pointer = pointer.wrapping_add(1);
                    }
                    debug!(address, data = ?buf, "bus read");
                }
            }
        }
        Ok(())
    }
}

type Outputs = Pca9685Outputs<RefCellDevice<'static, SimBus>>;
type Controller = SystemController<SimBus, Outputs, OpenLoop>;

#[embassy_executor::task]
async fn controller_task(mut ctrl: Controller) -> ! {
    ctrl.run().await
}

#[embassy_executor::task]
async fn main_task(
    spawner: Spawner,
    opts: Opts,
) {
    let mut bus = SimBus::new();
    if !opts.no_sensor {
        let [low, high] = opts.sample.to_le_bytes();
        bus.attach(SENSOR_ADDRESS, &[(0x00, opts.id), (0x02, low), (0x03, high)]);
    }
    bus.attach(PWM_ADDRESS, &[(0x00, 0x11)]);
    let i2c_bus = mk_static!(RefCell<SimBus>, RefCell::new(bus));

    let pwm = match Pca9685::new(RefCellDevice::new(i2c_bus), PwmAddress::from(PWM_ADDRESS)) {
        Ok(pwm) => pwm,
        Err(e) => {
            error!("PCA9685 setup failed: {:?}", e);
            return;
        }
    };
    let mut outputs = Pca9685Outputs::new(pwm, [Channel::C0, Channel::C1, Channel::C2]);
    if let Err(e) = outputs.configure(opts.prescale) {
        error!("PCA9685 configure failed: {:?}", e);
    }

    let motor = MotorController::new(PWM_ADDRESS, outputs, OpenLoop, MotorConfig::default());
    let ctrl = SystemController::new(i2c_bus, SensorConfig::default(), motor);
    spawner.spawn(controller_task(ctrl)).unwrap();

    for command in &opts.commands {
        match forward(command.as_bytes()).await {
            Ok(()) => info!(%command, "queued"),
            Err(e) => error!(%command, "invalid command: {}", e),
        }
    }
    info!("all commands queued; Ctrl-C to exit");
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts: Opts = Opts::parse();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner, opts)).unwrap();
    });
}
