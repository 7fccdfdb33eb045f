//! Math utilities for drvkit.
//!
//! This module provides the reference-frame transforms used by field-oriented
//! control and the discrete PID controller that closes each control loop.

pub mod pid;
pub mod transforms;
