#![no_std]

// Capacitive-sensing block driven as a general purpose ADC.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Register access, pin routing, clock dividers and block
// arbitration are reached through the traits in [`hal`], so the same state
// machine runs against real silicon and the host emulator.

#[macro_use]
mod fmt;

pub mod config;
pub mod driver;
pub mod error;
pub mod hal;
pub mod interpret;
pub mod status;

pub use config::{AdcConfig, ChannelPin, DerivedParams, Range, Resolution};
pub use driver::{ChannelResult, ChannelResults, CsdAdc, CycleObserver, SleepReadiness};
pub use error::AdcError;
pub use interpret::{Calibration, RawResult};
pub use status::{AdcStatus, CalibrationStep, ConversionCounter, ConversionMode, Phase, StopMode};

/// Maximum number of input channels a single driver instance can scan.
pub const MAX_CHANNELS: usize = 32;
