//! Phase output stages for `MotorController`.
//!
//! Two ways to turn three duty cycles into phase voltages:
//! - [`Pca9685Outputs`]: three channels of a PCA9685 PWM expander on the
//!   shared I2C bus.
//! - [`ThreePwmOutputs`]: three MCU timer channels plus a gate-driver enable
//!   pin.

use embedded_hal::{digital::OutputPin, i2c::I2c, pwm::SetDutyCycle};
use pwm_pca9685::{Channel, Error as PwmError, Pca9685};

use super::motor::PhaseOutputs;

/// Full-scale PCA9685 count.
const MAX_DUTY: u16 = 4095;

/// Convert a duty fraction to timer counts.
fn duty_counts(
    duty: f32,
    max: u16,
) -> u16 {
    (duty.clamp(0.0, 1.0) * max as f32) as u16
}

/// Three PCA9685 channels driving phases A, B and C.
pub struct Pca9685Outputs<I2C> {
    pwm: Pca9685<I2C>,
    channels: [Channel; 3],
}

impl<I2C, E> Pca9685Outputs<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    /// Use `channels` for phases A, B, C in that order.
    pub fn new(
        pwm: Pca9685<I2C>,
        channels: [Channel; 3],
    ) -> Self {
        Self { pwm, channels }
    }

    /// Enable the oscillator and set the output prescale.
    pub fn configure(
        &mut self,
        prescale: u8,
    ) -> Result<(), PwmError<E>> {
        self.pwm.enable()?;
        self.pwm.set_prescale(prescale)?;
        tracing::info!(prescale, "PCA9685 configured");
        Ok(())
    }

    pub fn release(self) -> Pca9685<I2C> {
        self.pwm
    }
}

impl<I2C, E> PhaseOutputs for Pca9685Outputs<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    type Error = PwmError<E>;

    fn enable(
        &mut self,
        on: bool,
    ) -> Result<(), Self::Error> {
        if on {
            self.pwm.enable()
        } else {
            self.pwm.disable()
        }
    }

    fn set_duty(
        &mut self,
        duty: [f32; 3],
    ) -> Result<(), Self::Error> {
        for (&channel, &d) in self.channels.iter().zip(duty.iter()) {
            self.pwm
                .set_channel_on_off(channel, 0, duty_counts(d, MAX_DUTY))?;
        }
        Ok(())
    }
}

/// Errors from a [`ThreePwmOutputs`] stage.
#[derive(Debug)]
pub enum ThreePwmError<P, G> {
    Duty(P),
    Enable(G),
}

/// Three MCU PWM channels and an active-high gate-driver enable.
pub struct ThreePwmOutputs<A, B, C, EN> {
    a: A,
    b: B,
    c: C,
    enable: EN,
}

impl<A, B, C, EN> ThreePwmOutputs<A, B, C, EN> {
    pub fn new(
        a: A,
        b: B,
        c: C,
        enable: EN,
    ) -> Self {
        Self { a, b, c, enable }
    }

    pub fn release(self) -> (A, B, C, EN) {
        (self.a, self.b, self.c, self.enable)
    }
}

impl<A, B, C, EN, P> PhaseOutputs for ThreePwmOutputs<A, B, C, EN>
where
    A: SetDutyCycle<Error = P>,
    B: SetDutyCycle<Error = P>,
    C: SetDutyCycle<Error = P>,
    EN: OutputPin,
    P: core::fmt::Debug,
{
    type Error = ThreePwmError<P, EN::Error>;

    fn enable(
        &mut self,
        on: bool,
    ) -> Result<(), Self::Error> {
        if on {
            self.enable.set_high().map_err(ThreePwmError::Enable)
        } else {
            self.enable.set_low().map_err(ThreePwmError::Enable)
        }
    }

    fn set_duty(
        &mut self,
        duty: [f32; 3],
    ) -> Result<(), Self::Error> {
        let [da, db, dc] = duty;
        let counts = duty_counts(da, self.a.max_duty_cycle());
        self.a.set_duty_cycle(counts).map_err(ThreePwmError::Duty)?;
        let counts = duty_counts(db, self.b.max_duty_cycle());
        self.b.set_duty_cycle(counts).map_err(ThreePwmError::Duty)?;
        let counts = duty_counts(dc, self.c.max_duty_cycle());
        self.c.set_duty_cycle(counts).map_err(ThreePwmError::Duty)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::convert::Infallible;
    use std::vec::Vec;

    use embedded_hal::{digital, pwm};

    use super::*;

    #[derive(Default)]
    struct Timer {
        writes: Vec<u16>,
    }

    impl pwm::ErrorType for Timer {
        type Error = Infallible;
    }

    impl SetDutyCycle for Timer {
        fn max_duty_cycle(&self) -> u16 {
            1000
        }

        fn set_duty_cycle(
            &mut self,
            duty: u16,
        ) -> Result<(), Self::Error> {
            self.writes.push(duty);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Pin {
        high: Option<bool>,
    }

    impl digital::ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = Some(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = Some(true);
            Ok(())
        }
    }

    #[test]
    fn test_duty_counts_scale() {
        assert_eq!(duty_counts(1.0, MAX_DUTY), 4095);
        assert_eq!(duty_counts(0.0, MAX_DUTY), 0);
        assert_eq!(duty_counts(0.5, 1000), 500);
    }

    #[test]
    fn test_three_pwm_duty_and_enable() {
        let mut stage = ThreePwmOutputs::new(
            Timer::default(),
            Timer::default(),
            Timer::default(),
            Pin::default(),
        );
        stage.enable(true).unwrap();
        stage.set_duty([1.0, 0.25, 0.0]).unwrap();
        stage.reset().unwrap();
        stage.enable(false).unwrap();

        let (a, b, c, en) = stage.release();
        assert_eq!(a.writes, [1000, 0]);
        assert_eq!(b.writes, [250, 0]);
        assert_eq!(c.writes, [0, 0]);
        assert_eq!(en.high, Some(false));
    }
}
