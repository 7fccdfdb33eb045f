//! Utility re-exports and helper macros for drvkit.
//!
//! - `connection`: JSON command parsing and queueing
//! - `controllers`: device lifecycle, sensor and motor drivers, output stages
//! - `math`: FOC reference-frame transforms and PID control
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod connection;
pub mod controllers;
pub mod math;

pub use connection::submit;
pub use controllers::{Device, SystemController};

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
