//! Timer-count to code and millivolt conversion.
//!
//! Every path that turns a hardware count into a reading goes through this
//! module: the interrupt dispatcher, calibration and both blocking helpers.
//! All arithmetic is integer and rounds to nearest.

use crate::config::Range;
use crate::hal::bits;

/// Raw value of the ADC result register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawResult(u32);

impl RawResult {
    #[must_use]
    pub const fn new(register: u32) -> Self {
        Self(register)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Elapsed timer count.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn count(self) -> u16 {
        (self.0 & bits::ADC_RES_VALUE) as u16
    }

    /// `true` when the current source was charging the reference.
    #[must_use]
    pub const fn is_sourcing(self) -> bool {
        self.0 & bits::ADC_RES_HSCMP_POL != 0
    }

    #[must_use]
    pub const fn is_overflow(self) -> bool {
        self.0 & bits::ADC_RES_OVERFLOW != 0
    }

    #[must_use]
    pub const fn is_abort(self) -> bool {
        self.0 & bits::ADC_RES_ABORT != 0
    }
}

/// Timing constants and scale used to interpret raw counts.
///
/// Created with approximate values at configuration time and replaced by
/// measured ones after each successful calibration. `t_full` and `code_max`
/// are never zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub t_vssa2vref: u16,
    pub t_recover: u16,
    pub t_vdda2vref: u16,
    pub t_full: u16,
    pub code_max: u16,
    pub v_max_mv: u16,
    pub vref_mv: u16,
}

impl Calibration {
    /// Placeholder held before any configuration is installed.
    pub const UNCONFIGURED: Self = Self {
        t_vssa2vref: 1,
        t_recover: 1,
        t_vdda2vref: 0,
        t_full: 1,
        code_max: 1,
        v_max_mv: 0,
        vref_mv: 0,
    };

    /// Scales a code to millivolts.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn to_millivolts(&self, code: u16) -> u16 {
        let code_max = u32::from(self.code_max.max(1));
        let mv = (u32::from(self.v_max_mv) * u32::from(code) + code_max / 2) / code_max;
        mv as u16
    }
}

/// Converts a raw result into a code in `0..=cal.code_max`.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn interpret(raw: RawResult, cal: &Calibration, range: Range) -> u16 {
    let t_vssa = u32::from(cal.t_vssa2vref);
    let t_full = u32::from(cal.t_full.max(1));
    let code_max = u32::from(cal.code_max);
    let count = u32::from(raw.count());

    let code = if raw.is_sourcing() {
        let count = count.min(t_vssa);
        ((t_vssa - count) * code_max + t_full / 2) / t_full
    } else {
        match range {
            Range::Vdda => {
                let corrected = u32::from(correct_mismatch(raw.count(), cal.t_recover, cal.t_vssa2vref))
                    .min(u32::from(cal.t_vdda2vref));
                ((t_vssa + corrected) * code_max + t_full / 2) / t_full
            }
            // Sinking cannot happen against the bare reference; pin to the top of the scale.
            Range::Vref => t_vssa * code_max / t_full,
        }
    };

    code.min(code_max) as u16
}

/// Corrects a sinking count for the sink/source current mismatch.
#[must_use]
pub fn correct_mismatch(count: u16, t_recover: u16, t_vssa2vref: u16) -> u16 {
    let t_vssa = u64::from(t_vssa2vref.max(1));
    let corrected = (u64::from(t_recover) * 2 * u64::from(count) + t_vssa / 2) / t_vssa;
    u16::try_from(corrected).unwrap_or(u16::MAX)
}

/// Supply voltage implied by the reference and the corrected discharge time.
#[must_use]
pub fn supply_millivolts(vref_mv: u16, t_vssa2vref: u16, t_vdda2vref: u16) -> u16 {
    let t_vssa = u32::from(t_vssa2vref.max(1));
    let vref = u32::from(vref_mv);
    let mv = vref + (vref * u32::from(t_vdda2vref) + t_vssa / 2) / t_vssa;
    u16::try_from(mv).unwrap_or(u16::MAX)
}
