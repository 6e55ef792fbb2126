//! Driver configuration and the parameters derived from it.
//!
//! [`AdcConfig`] is what the application hands to
//! [`CsdAdc::init`](crate::CsdAdc::init); [`DerivedParams::compute`] turns it
//! into reference gain, IDAC code, sense clock divider and the default
//! calibration constants used until the first calibration completes.

use heapless::Vec;

use crate::MAX_CHANNELS;
use crate::error::AdcError;
use crate::hal::{CsdBlock, DividerKind};
use crate::interpret::Calibration;

const MEGA: u32 = 1_000_000;

/// Reference capacitance in pF, truncated to keep the IDAC code low.
const CREF_PF: u32 = 21_500;
/// IDAC LSB current in pA.
const IDAC_LSB_PA: u32 = 37_500;
const IDAC_MAX: u32 = 127;

const MIN_SENSE_DIVIDER: u32 = 4;
const MAX_SENSE_DIVIDER: u32 = 0xFFF;
const MAX_SENSE_CYCLES: u32 = 0xFF;

const VREF_SOURCE_MV: u32 = 800;
const VREF_GAIN_MAX: u32 = 32;
const VREF_AUTO_LOW_MV: u16 = 1164;
const VREF_AUTO_MID_MV: u16 = 1600;
const VREF_AUTO_HIGH_MV: u16 = 2133;
const VDDA_LOW_LIMIT_MV: u16 = 2200;
const VDDA_HIGH_LIMIT_MV: u16 = 2749;
/// Minimum headroom kept between the supply and the reference.
const VREF_VDDA_MIN_DIFF_MV: u16 = 600;

/// Physical pin that carries one ADC channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelPin {
    pub port: u8,
    pub pin: u8,
}

impl ChannelPin {
    #[must_use]
    pub const fn new(port: u8, pin: u8) -> Self {
        Self { port, pin }
    }
}

/// Input voltage range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Range {
    /// Ground to the reference voltage. Calibration runs a single phase.
    Vref,
    /// Ground to the analog supply. Calibration runs all three phases.
    Vdda,
}

/// Conversion resolution.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    Bits8,
    Bits10,
}

impl Resolution {
    /// Largest code a conversion can report.
    #[must_use]
    pub const fn code_max(self) -> u16 {
        match self {
            Resolution::Bits8 => (1 << 8) - 1,
            Resolution::Bits10 => (1 << 10) - 1,
        }
    }

    /// Code range used to size the IDAC, doubled (plus one) for accuracy.
    #[must_use]
    pub const fn idac_code_max(self) -> u16 {
        match self {
            Resolution::Bits8 => 511,
            Resolution::Bits10 => 2047,
        }
    }
}

/// Static configuration copied into the driver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdcConfig {
    /// Channel pins; the channel id is the index into this list.
    pub channels: Vec<ChannelPin, MAX_CHANNELS>,
    /// Peripheral clock feeding the block, in Hz.
    pub peri_clk_hz: u32,
    /// Reference voltage; `None` picks one from the supply voltage.
    pub vref_mv: Option<u16>,
    /// Nominal analog supply voltage.
    pub vdda_mv: u16,
    pub range: Range,
    pub resolution: Resolution,
    pub divider_kind: DividerKind,
    pub divider_index: u8,
    /// Divider from the peripheral clock to the operating clock.
    pub oper_clk_divider: u8,
    pub az_time_us: u8,
    pub acq_time_us: u8,
    /// Settling time after the block is captured or woken up.
    pub csd_init_time_us: u8,
}

impl AdcConfig {
    pub const DEFAULT_PERI_CLK_HZ: u32 = 50_000_000;
    pub const DEFAULT_VDDA_MV: u16 = 3_300;
    pub const DEFAULT_AZ_TIME_US: u8 = 5;
    pub const DEFAULT_ACQ_TIME_US: u8 = 10;
    pub const DEFAULT_CSD_INIT_TIME_US: u8 = 25;

    /// Builds a configuration with default timing for the provided channels.
    pub fn new(channels: &[ChannelPin]) -> Result<Self, AdcError> {
        if channels.is_empty() {
            return Err(AdcError::BadParam);
        }
        let mut list = Vec::new();
        for pin in channels {
            list.push(*pin).map_err(|_| AdcError::BadParam)?;
        }

        Ok(Self {
            channels: list,
            peri_clk_hz: Self::DEFAULT_PERI_CLK_HZ,
            vref_mv: None,
            vdda_mv: Self::DEFAULT_VDDA_MV,
            range: Range::Vdda,
            resolution: Resolution::Bits10,
            divider_kind: DividerKind::Integer8,
            divider_index: 0,
            oper_clk_divider: 1,
            az_time_us: Self::DEFAULT_AZ_TIME_US,
            acq_time_us: Self::DEFAULT_ACQ_TIME_US,
            csd_init_time_us: Self::DEFAULT_CSD_INIT_TIME_US,
        })
    }

    #[must_use]
    pub fn with_range(mut self, range: Range) -> Self {
        self.range = range;
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    #[must_use]
    pub fn with_vref(mut self, vref_mv: Option<u16>) -> Self {
        self.vref_mv = vref_mv;
        self
    }

    #[must_use]
    pub fn with_vdda(mut self, vdda_mv: u16) -> Self {
        self.vdda_mv = vdda_mv;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, peri_clk_hz: u32, oper_clk_divider: u8) -> Self {
        self.peri_clk_hz = peri_clk_hz;
        self.oper_clk_divider = oper_clk_divider;
        self
    }

    #[must_use]
    pub fn with_divider(mut self, kind: DividerKind, index: u8) -> Self {
        self.divider_kind = kind;
        self.divider_index = index;
        self
    }

    #[must_use]
    pub fn with_timing(mut self, az_time_us: u8, acq_time_us: u8, csd_init_time_us: u8) -> Self {
        self.az_time_us = az_time_us;
        self.acq_time_us = acq_time_us;
        self.csd_init_time_us = csd_init_time_us;
        self
    }

    /// Number of configured channels.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn num_channels(&self) -> u8 {
        // Bounded by MAX_CHANNELS.
        self.channels.len() as u8
    }

    /// Bitmask with one bit set for every configured channel.
    #[must_use]
    pub fn channel_mask(&self) -> u32 {
        match self.channels.len() {
            MAX_CHANNELS => u32::MAX,
            count => (1u32 << count) - 1,
        }
    }

    /// Returns the pin of `channel`, if configured.
    #[must_use]
    pub fn pin(&self, channel: u8) -> Option<ChannelPin> {
        self.channels.get(usize::from(channel)).copied()
    }

    /// Checks every field that later arithmetic depends on.
    pub fn validate(&self) -> Result<(), AdcError> {
        if self.channels.is_empty()
            || self.peri_clk_hz < MEGA
            || self.oper_clk_divider == 0
            || self.vdda_mv <= VREF_VDDA_MIN_DIFF_MV
            || self.vref_mv == Some(0)
        {
            return Err(AdcError::BadParam);
        }

        let timing = SenseTiming::compute(self);
        let cycles = 1..=MAX_SENSE_CYCLES;
        if !cycles.contains(&timing.acq_cycles) || !cycles.contains(&timing.az_cycles) {
            return Err(AdcError::BadParam);
        }

        Ok(())
    }
}

/// Sense clock divider and cycle counts for the acquisition and auto-zero phases.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct SenseTiming {
    divider: u16,
    acq_cycles: u32,
    az_cycles: u32,
}

impl SenseTiming {
    #[allow(clippy::cast_possible_truncation)]
    fn compute(config: &AdcConfig) -> Self {
        let peri_mhz = config.peri_clk_hz / MEGA;
        let oper_div = u32::from(config.oper_clk_divider.max(1));
        let ticks = |micros: u8| u32::from(micros) * peri_mhz / oper_div;
        let longest = ticks(config.acq_time_us.max(config.az_time_us));

        let mut divider = MIN_SENSE_DIVIDER;
        while longest / divider >= MAX_SENSE_CYCLES && divider < MAX_SENSE_DIVIDER {
            divider += 1;
        }

        Self {
            divider: divider as u16,
            acq_cycles: ticks(config.acq_time_us) / divider,
            az_cycles: ticks(config.az_time_us) / divider,
        }
    }
}

/// Hardware parameters computed from an [`AdcConfig`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DerivedParams {
    /// Reference generator gain code.
    pub vref_gain: u8,
    /// Trimmed reference voltage.
    pub vref_mv: u16,
    /// IDAC B code.
    pub idac: u8,
    pub sense_divider: u16,
    pub acq_cycles: u8,
    pub az_cycles: u8,
}

impl DerivedParams {
    /// Computes the derived parameters and the pre-calibration defaults.
    ///
    /// The configuration must already have passed [`AdcConfig::validate`].
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn compute<B: CsdBlock>(config: &AdcConfig, block: &B) -> (Self, Calibration) {
        let vdda = u32::from(config.vdda_mv);
        let desired = u32::from(desired_vref(config));

        let gain = ((VREF_GAIN_MAX * VREF_SOURCE_MV - 1) / (desired + 1)).min(VREF_GAIN_MAX - 1);
        let nominal = (VREF_GAIN_MAX * VREF_SOURCE_MV + (gain + 1) / 2) / (gain + 1);
        let vref_mv = block.vref_trim(nominal as u16).max(1);
        let vref = u32::from(vref_mv);

        let (v_max_idac, v_max_mv) = match config.range {
            Range::Vref => (vref, vref_mv),
            Range::Vdda => (vdda.saturating_sub(vref).max(vref), config.vdda_mv),
        };

        let code_max_idac = u32::from(config.resolution.idac_code_max());
        let idac = (config.peri_clk_hz / code_max_idac) / u32::from(config.oper_clk_divider);
        let idac = ((idac * v_max_idac / MEGA) * CREF_PF / IDAC_LSB_PA).min(IDAC_MAX);

        let t_vssa2vref = code_max_idac;
        let t_vdda2vref = t_vssa2vref * vdda.saturating_sub(vref) / vref;
        let calibration = Calibration {
            t_vssa2vref: t_vssa2vref as u16,
            t_recover: t_vssa2vref as u16,
            t_vdda2vref: clamp_u16(t_vdda2vref),
            t_full: clamp_u16(t_vssa2vref + t_vdda2vref),
            code_max: config.resolution.code_max(),
            v_max_mv,
            vref_mv,
        };

        let timing = SenseTiming::compute(config);
        let params = Self {
            vref_gain: gain as u8,
            vref_mv,
            idac: idac as u8,
            sense_divider: timing.divider,
            acq_cycles: clamp_u8(timing.acq_cycles),
            az_cycles: clamp_u8(timing.az_cycles),
        };

        debug!(
            "csdadc: vref={}mV gain={} idac={} sense_div={}",
            params.vref_mv,
            params.vref_gain,
            params.idac,
            params.sense_divider
        );

        (params, calibration)
    }
}

fn desired_vref(config: &AdcConfig) -> u16 {
    match config.vref_mv {
        None if config.vdda_mv < VDDA_LOW_LIMIT_MV => VREF_AUTO_LOW_MV,
        None if config.vdda_mv > VDDA_HIGH_LIMIT_MV => VREF_AUTO_HIGH_MV,
        None => VREF_AUTO_MID_MV,
        Some(vref) => vref.min(config.vdda_mv - VREF_VDDA_MIN_DIFF_MV),
    }
}

fn clamp_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

fn clamp_u8(value: u32) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}
