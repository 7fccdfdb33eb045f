//! Field-oriented-control motor controller.
//!
//! Setpoints flow down a fixed cascade: position → speed → current → voltage
//! → PWM. Each stage measures what it needs from a [`MotorFeedback`], runs its
//! PID loop, and hands its output to the next stage. The last stage clamps the
//! three duty cycles and writes them to a [`PhaseOutputs`] implementation.

use core::fmt::Debug;

use serde::{Deserialize, Serialize};

use super::Device;
use crate::utils::math::{
    pid::{limit, PidController, PidParams},
    transforms::{clamp_duty, clarke, inverse_clarke, inverse_park, park},
};

/// Gate-driver bus address used when none is given.
pub const GATE_DRIVER_ADDRESS: u8 = 0x00;
/// Nominal PWM switching frequency (Hz); one control step per period.
pub const PWM_FREQUENCY_HZ: u32 = 20_000;
/// Default phase current limit (A).
pub const MAX_CURRENT: f32 = 10.0;
/// Default speed limit (RPM).
pub const MAX_SPEED: f32 = 10_000.0;

/// Which stage `MotorController::command` feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Voltage,
    Current,
    Speed,
    Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorStatus {
    Idle,
    Running,
    /// The output stage rejected a write.
    Error,
    /// Overcurrent trip; outputs are disabled until `reset`.
    Fault,
}

/// Instantaneous phase currents (A).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseCurrents {
    pub ia: f32,
    pub ib: f32,
    pub ic: f32,
}

impl PhaseCurrents {
    fn exceeds(
        &self,
        limit: f32,
    ) -> bool {
        [self.ia, self.ib, self.ic].iter().any(|&i| libm::fabsf(i) > limit)
    }
}

/// Motor parameters and loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    pub pole_pairs: u16,
    /// Phase current limit (A)
    pub max_current: f32,
    /// Speed limit (RPM)
    pub max_speed: f32,
    pub control_mode: ControlMode,
    /// D-axis current loop
    pub pid_d: PidParams,
    /// Q-axis current loop
    pub pid_q: PidParams,
    /// Speed loop; output is a q-axis current target
    pub pid_speed: PidParams,
    /// Position loop; output is a speed target
    pub pid_position: PidParams,
    /// Control step (s)
    pub loop_period: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            pole_pairs: 7,
            max_current: MAX_CURRENT,
            max_speed: MAX_SPEED,
            control_mode: ControlMode::Current,
            pid_d: PidParams::new(0.5, 0.1, 0.0, 10.0, 1.0),
            pid_q: PidParams::new(0.5, 0.1, 0.0, 10.0, 1.0),
            pid_speed: PidParams::new(0.05, 0.01, 0.0, MAX_CURRENT, MAX_CURRENT),
            pid_position: PidParams::new(20.0, 0.0, 0.0, MAX_SPEED, MAX_SPEED),
            loop_period: 1.0 / PWM_FREQUENCY_HZ as f32,
        }
    }
}

/// Three-phase power stage.
pub trait PhaseOutputs {
    type Error: Debug;

    /// Switch the gate driver on or off.
    fn enable(
        &mut self,
        on: bool,
    ) -> Result<(), Self::Error>;

    /// Apply phase duty cycles, each already in `[0.0, 1.0]`.
    fn set_duty(
        &mut self,
        duty: [f32; 3],
    ) -> Result<(), Self::Error>;

    /// Bring the stage to a known state.
    fn reset(&mut self) -> Result<(), Self::Error> {
        self.set_duty([0.0; 3])
    }
}

/// Measurements the control loops close on.
pub trait MotorFeedback {
    type Error: Debug;

    fn phase_currents(&mut self) -> Result<PhaseCurrents, Self::Error>;

    /// Mechanical rotor angle (rad).
    fn mechanical_angle(&mut self) -> Result<f32, Self::Error>;

    /// Mechanical speed (RPM).
    fn velocity_rpm(&mut self) -> Result<f32, Self::Error>;
}

/// Feedback for a motor without sensors: every measurement reads zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenLoop;

impl MotorFeedback for OpenLoop {
    type Error = core::convert::Infallible;

    fn phase_currents(&mut self) -> Result<PhaseCurrents, Self::Error> {
        Ok(PhaseCurrents::default())
    }

    fn mechanical_angle(&mut self) -> Result<f32, Self::Error> {
        Ok(0.0)
    }

    fn velocity_rpm(&mut self) -> Result<f32, Self::Error> {
        Ok(0.0)
    }
}

/// Errors that can occur while driving the motor.
#[derive(Debug)]
pub enum MotorError<O, F> {
    Output(O),
    Feedback(F),
    NotInitialized,
    AlreadyInitialized,
    /// The motor tripped on overcurrent.
    Fault,
}

pub type MotorResult<T, O, F> = Result<
    T,
    MotorError<<O as PhaseOutputs>::Error, <F as MotorFeedback>::Error>,
>;

/// Motor command variants.
///
/// Serialized as JSON with tag `"mc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(tag = "mc", rename_all = "snake_case")]
pub enum MotorCommand {
    Reset,
    Enable,
    Disable,
    Pwm { a: f32, b: f32, c: f32 },
    Voltage { alpha: f32, beta: f32 },
    Current { d: f32, q: f32 },
    Speed { rpm: f32 },
    Position { rad: f32 },
    /// Feed `value` to the stage selected by the control mode.
    Target { value: f32 },
    Mode { mode: ControlMode },
    Pid { d: PidParams, q: PidParams },
    Status,
    ReadCurrent,
}

/// Data returned by a `MotorCommand`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorReading {
    Status(MotorStatus),
    Current(PhaseCurrents),
}

/// Bound control stages of an initialized motor.
pub struct FocStages {
    pid_d: PidController,
    pid_q: PidController,
    pid_speed: PidController,
    pid_position: PidController,
}

impl FocStages {
    fn new(config: &MotorConfig) -> Self {
        let dt = config.loop_period;
        Self {
            pid_d: PidController::new(config.pid_d, dt),
            pid_q: PidController::new(config.pid_q, dt),
            pid_speed: PidController::new(config.pid_speed, dt),
            pid_position: PidController::new(config.pid_position, dt),
        }
    }

    fn reset(&mut self) {
        self.pid_d.reset();
        self.pid_q.reset();
        self.pid_speed.reset();
        self.pid_position.reset();
    }
}

/// An FOC motor behind a three-phase output stage.
pub struct MotorController<O, F> {
    address: u8,
    outputs: O,
    feedback: F,
    defaults: MotorConfig,
    config: MotorConfig,
    status: MotorStatus,
    stages: Option<FocStages>,
}

impl<O, F> MotorController<O, F>
where
    O: PhaseOutputs,
    F: MotorFeedback,
{
    /// Create an uninitialized motor. `defaults` is applied on every `init`.
    pub fn new(
        address: u8,
        outputs: O,
        feedback: F,
        defaults: MotorConfig,
    ) -> Self {
        Self {
            address,
            outputs,
            feedback,
            defaults,
            config: defaults,
            status: MotorStatus::Idle,
            stages: None,
        }
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut O {
        &mut self.outputs
    }

    pub fn feedback_mut(&mut self) -> &mut F {
        &mut self.feedback
    }

    /// Give back the output stage and feedback.
    pub fn release(self) -> (O, F) {
        (self.outputs, self.feedback)
    }

    fn stages(&mut self) -> MotorResult<&mut FocStages, O, F> {
        self.stages.as_mut().ok_or(MotorError::NotInitialized)
    }

    fn electrical_angle(&mut self) -> MotorResult<f32, O, F> {
        let mech = self.feedback.mechanical_angle().map_err(MotorError::Feedback)?;
        Ok(mech * f32::from(self.config.pole_pairs))
    }

    /// Zero the outputs, clear loop history and any fault.
    pub fn reset(&mut self) -> MotorResult<(), O, F> {
        self.stages()?.reset();
        self.outputs.reset().map_err(MotorError::Output)?;
        self.status = MotorStatus::Idle;
        Ok(())
    }

    pub fn enable(
        &mut self,
        on: bool,
    ) -> MotorResult<(), O, F> {
        self.stages()?;
        if on && self.status == MotorStatus::Fault {
            return Err(MotorError::Fault);
        }
        self.outputs.enable(on).map_err(MotorError::Output)?;
        // a fault stays latched until `reset`
        if self.status != MotorStatus::Fault {
            self.status = if on { MotorStatus::Running } else { MotorStatus::Idle };
        }
        tracing::info!(on, "motor output stage switched");
        Ok(())
    }

    /// Clamp each duty cycle to `[0.0, 1.0]` and apply it.
    pub fn set_pwm(
        &mut self,
        duty_a: f32,
        duty_b: f32,
        duty_c: f32,
    ) -> MotorResult<(), O, F> {
        self.stages()?;
        let duty = [clamp_duty(duty_a), clamp_duty(duty_b), clamp_duty(duty_c)];
        if let Err(e) = self.outputs.set_duty(duty) {
            self.status = MotorStatus::Error;
            return Err(MotorError::Output(e));
        }
        tracing::trace!(?duty, "phase duty applied");
        Ok(())
    }

    /// Stationary-frame voltage; inverse Clarke to three duty cycles.
    pub fn set_voltage(
        &mut self,
        v_alpha: f32,
        v_beta: f32,
    ) -> MotorResult<(), O, F> {
        let [a, b, c] = inverse_clarke(v_alpha, v_beta);
        self.set_pwm(a, b, c)
    }

    /// Rotor-frame current setpoint.
    pub fn set_current(
        &mut self,
        i_d: f32,
        i_q: f32,
    ) -> MotorResult<(), O, F> {
        self.stages()?;
        let measured = self.get_current()?;
        if self.status == MotorStatus::Fault {
            return Err(MotorError::Fault);
        }
        let theta = self.electrical_angle()?;

        let (i_alpha, i_beta) = clarke(measured.ia, measured.ib);
        let (d, q) = park(i_alpha, i_beta, theta);

        let max_current = self.config.max_current;
        let stages = self.stages()?;
        let v_d = stages.pid_d.update(limit(i_d, max_current) - d);
        let v_q = stages.pid_q.update(limit(i_q, max_current) - q);

        let (v_alpha, v_beta) = inverse_park(v_d, v_q, theta);
        self.set_voltage(v_alpha, v_beta)
    }

    /// Speed setpoint (RPM).
    pub fn set_speed(
        &mut self,
        speed: f32,
    ) -> MotorResult<(), O, F> {
        self.stages()?;
        let target = limit(speed, self.config.max_speed);
        let measured = self.feedback.velocity_rpm().map_err(MotorError::Feedback)?;

        let max_current = self.config.max_current;
        let i_q = limit(self.stages()?.pid_speed.update(target - measured), max_current);
        self.set_current(0.0, i_q)
    }

    /// Position setpoint (rad).
    pub fn set_position(
        &mut self,
        position: f32,
    ) -> MotorResult<(), O, F> {
        self.stages()?;
        let measured = self.feedback.mechanical_angle().map_err(MotorError::Feedback)?;
        let speed = self.stages()?.pid_position.update(position - measured);
        self.set_speed(speed)
    }

    /// Drive `target` through the stage selected by the control mode.
    ///
    /// In voltage mode `target` is the q-axis voltage.
    pub fn command(
        &mut self,
        target: f32,
    ) -> MotorResult<(), O, F> {
        match self.config.control_mode {
            ControlMode::Voltage => {
                self.stages()?;
                let theta = self.electrical_angle()?;
                let (v_alpha, v_beta) = inverse_park(0.0, target, theta);
                self.set_voltage(v_alpha, v_beta)
            }
            ControlMode::Current => self.set_current(0.0, target),
            ControlMode::Speed => self.set_speed(target),
            ControlMode::Position => self.set_position(target),
        }
    }

    pub fn get_status(&self) -> MotorResult<MotorStatus, O, F> {
        if self.stages.is_none() {
            return Err(MotorError::NotInitialized);
        }
        Ok(self.status)
    }

    /// Read the phase currents.
    ///
    /// A phase beyond `max_current` disables the output stage and latches
    /// `MotorStatus::Fault`; the reading is still returned.
    pub fn get_current(&mut self) -> MotorResult<PhaseCurrents, O, F> {
        self.stages()?;
        let currents = self.feedback.phase_currents().map_err(MotorError::Feedback)?;
        if currents.exceeds(self.config.max_current) && self.status != MotorStatus::Fault {
            tracing::error!(?currents, limit = self.config.max_current, "overcurrent, disabling outputs");
            self.status = MotorStatus::Fault;
            self.outputs.enable(false).map_err(MotorError::Output)?;
        }
        Ok(currents)
    }

    /// Replace the D/Q current loop gains.
    pub fn update_pid(
        &mut self,
        pid_d: PidParams,
        pid_q: PidParams,
    ) -> MotorResult<(), O, F> {
        let stages = self.stages()?;
        stages.pid_d.set_params(pid_d);
        stages.pid_q.set_params(pid_q);
        self.config.pid_d = pid_d;
        self.config.pid_q = pid_q;
        tracing::info!(?pid_d, ?pid_q, "current loop gains updated");
        Ok(())
    }

    pub fn set_control_mode(
        &mut self,
        mode: ControlMode,
    ) -> MotorResult<(), O, F> {
        self.stages()?;
        self.config.control_mode = mode;
        Ok(())
    }

    /// Execute a `MotorCommand`.
    pub fn execute_command(
        &mut self,
        command: MotorCommand,
    ) -> MotorResult<Option<MotorReading>, O, F> {
        match command {
            MotorCommand::Reset => self.reset()?,
            MotorCommand::Enable => self.enable(true)?,
            MotorCommand::Disable => self.enable(false)?,
            MotorCommand::Pwm { a, b, c } => self.set_pwm(a, b, c)?,
            MotorCommand::Voltage { alpha, beta } => self.set_voltage(alpha, beta)?,
            MotorCommand::Current { d, q } => self.set_current(d, q)?,
            MotorCommand::Speed { rpm } => self.set_speed(rpm)?,
            MotorCommand::Position { rad } => self.set_position(rad)?,
            MotorCommand::Target { value } => self.command(value)?,
            MotorCommand::Mode { mode } => self.set_control_mode(mode)?,
            MotorCommand::Pid { d, q } => self.update_pid(d, q)?,
            MotorCommand::Status => return Ok(Some(MotorReading::Status(self.get_status()?))),
            MotorCommand::ReadCurrent => {
                return Ok(Some(MotorReading::Current(self.get_current()?)))
            }
        }
        Ok(None)
    }
}

impl<O, F> Device for MotorController<O, F>
where
    O: PhaseOutputs,
    F: MotorFeedback,
{
    type Error = MotorError<O::Error, F::Error>;

    fn address(&self) -> u8 {
        self.address
    }

    fn is_initialized(&self) -> bool {
        self.stages.is_some()
    }

    /// Build the control stages from the default configuration and reset
    /// the output stage.
    ///
    /// A failed reset leaves the motor uninitialized.
    fn init(&mut self) -> Result<(), Self::Error> {
        if self.stages.is_some() {
            return Err(MotorError::AlreadyInitialized);
        }

        self.outputs.reset().map_err(MotorError::Output)?;

        self.config = self.defaults;
        self.status = MotorStatus::Idle;
        self.stages = Some(FocStages::new(&self.config));
        tracing::info!(address = self.address, config = ?self.config, "motor initialized");
        Ok(())
    }

    /// Disable the output stage and release the control stages.
    ///
    /// The stages are released even if disabling fails; that error is
    /// returned afterwards.
    fn deinit(&mut self) -> Result<(), Self::Error> {
        if self.stages.take().is_none() {
            return Err(MotorError::NotInitialized);
        }
        self.status = MotorStatus::Idle;
        let disabled = self.outputs.enable(false).map_err(MotorError::Output);
        tracing::info!(address = self.address, "motor deinitialized");
        disabled
    }
}
