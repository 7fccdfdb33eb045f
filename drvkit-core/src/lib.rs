//! Capability-table hardware drivers for no-std embedded platforms.
//!
//! Each hardware object (a register-mapped I2C sensor, an FOC motor
//! controller) binds its operations at `init` and releases them at `deinit`.
//! For a host-side harness, see `drvkit-app/mock-mcu`.
#![no_std]

pub mod utils;
