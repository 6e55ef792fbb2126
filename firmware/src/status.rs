#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The cycle observer runs in interrupt context and publishes readings here;
//! the main loop samples them for logging without taking the driver lock.

use csdadc_core::{ChannelResults, ConversionCounter};
use portable_atomic::{AtomicU16, AtomicU32, Ordering};

/// Channels mirrored from the driver's result table.
pub const CHANNELS: usize = 4;

const UNKNOWN_VDDA: u32 = 0;

/// Last converted millivolts per channel.
static CHANNEL_MV: [AtomicU16; CHANNELS] = [const { AtomicU16::new(0) }; CHANNELS];
/// Completed passes reported by the observer.
static CYCLES: AtomicU32 = AtomicU32::new(0);
/// Millivolt reading of the analog supply (0 == unknown).
static VDDA_MV: AtomicU32 = AtomicU32::new(UNKNOWN_VDDA);

/// Copies a finished pass out of the driver.
pub fn record_cycle(results: &ChannelResults, counter: ConversionCounter) {
    for (slot, result) in CHANNEL_MV.iter().zip(results.as_slice()) {
        slot.store(result.millivolts, Ordering::Relaxed);
    }
    CYCLES.store(counter.cycle(), Ordering::Release);
}

pub fn record_vdda(millivolts: u16) {
    VDDA_MV.store(u32::from(millivolts), Ordering::Relaxed);
}

pub fn vdda_sample() -> Option<u16> {
    match VDDA_MV.load(Ordering::Relaxed) {
        UNKNOWN_VDDA => None,
        raw => u16::try_from(raw).ok(),
    }
}

pub fn cycles() -> u32 {
    CYCLES.load(Ordering::Acquire)
}

pub fn channel_mv(channel: usize) -> Option<u16> {
    CHANNEL_MV
        .get(channel)
        .map(|slot| slot.load(Ordering::Relaxed))
}
