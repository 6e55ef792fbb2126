//! Collaborator interfaces consumed by the driver.
//!
//! The driver never touches memory-mapped registers, GPIO ports or clock
//! dividers directly. Platforms implement [`CsdBlock`], [`PinMux`] and
//! [`PeriClock`] for their silicon; the emulator and the test-suite implement
//! them with behavioural models. Register layout is expressed through the
//! logical [`Register`] enum so offset tables stay on the platform side.

use crate::config::ChannelPin;

/// Logical registers of the sensing block used by the ADC driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    Config,
    AdcRes,
    Intr,
    IntrMask,
    Hscmp,
    Refgen,
    CsdCmp,
    SensePeriod,
    SenseDuty,
    SwHsPosSel,
    SwHsNegSel,
    SwShieldSel,
    SwAmuxbufSel,
    SwBypSel,
    SwCmpPosSel,
    SwCmpNegSel,
    SwRefgenSel,
    SwFwModSel,
    SwFwTankSel,
    SwDsiSel,
    SeqTime,
    SeqInitCnt,
    SeqNormCnt,
    AdcCtl,
    SeqStart,
    IdacB,
}

impl Register {
    /// Number of logical registers.
    pub const COUNT: usize = 26;

    /// Every register, in [`Register::as_index`] order.
    pub const ALL: [Register; Self::COUNT] = [
        Register::Config,
        Register::AdcRes,
        Register::Intr,
        Register::IntrMask,
        Register::Hscmp,
        Register::Refgen,
        Register::CsdCmp,
        Register::SensePeriod,
        Register::SenseDuty,
        Register::SwHsPosSel,
        Register::SwHsNegSel,
        Register::SwShieldSel,
        Register::SwAmuxbufSel,
        Register::SwBypSel,
        Register::SwCmpPosSel,
        Register::SwCmpNegSel,
        Register::SwRefgenSel,
        Register::SwFwModSel,
        Register::SwFwTankSel,
        Register::SwDsiSel,
        Register::SeqTime,
        Register::SeqInitCnt,
        Register::SeqNormCnt,
        Register::AdcCtl,
        Register::SeqStart,
        Register::IdacB,
    ];

    /// Deterministic index for table lookups.
    #[must_use]
    pub const fn as_index(self) -> usize {
        self as usize
    }
}

/// Bit definitions shared by the driver and hardware models.
pub mod bits {
    pub const INTR_SAMPLE: u32 = 0x0000_0001;
    pub const INTR_INIT: u32 = 0x0000_0002;
    pub const INTR_ADC_RES: u32 = 0x0000_0100;
    pub const INTR_ALL: u32 = INTR_SAMPLE | INTR_INIT | INTR_ADC_RES;
    pub const INTR_MASK_CLEAR: u32 = 0;

    pub const ADC_RES_VALUE: u32 = 0x0000_FFFF;
    pub const ADC_RES_HSCMP_POL: u32 = 0x0001_0000;
    pub const ADC_RES_OVERFLOW: u32 = 0x4000_0000;
    pub const ADC_RES_ABORT: u32 = 0x8000_0000;

    pub const SEQ_START: u32 = 0x0000_0001;
    pub const SEQ_ABORT: u32 = 0x0000_0008;
    pub const SEQ_AZ0_SKIP: u32 = 0x0000_0100;
    pub const SEQ_AZ1_SKIP: u32 = 0x0000_0200;

    pub const ADC_CTL_MEAS_POS: u32 = 16;
    pub const ADC_CTL_MEAS_MASK: u32 = 0x0003_0000;

    pub const CONFIG_INIT: u32 = 0x8000_1000;
    pub const CONFIG_FILTER_DELAY_POS: u32 = 4;
    pub const CONFIG_FILTER_DELAY_DEFAULT: u32 = 2;
    pub const CONFIG_DEFAULT: u32 =
        CONFIG_INIT | (CONFIG_FILTER_DELAY_DEFAULT << CONFIG_FILTER_DELAY_POS);

    pub const IDACB_CONFIG: u32 = 0x0400_0080;

    pub const SW_HSP_DEFAULT: u32 = 0x1000_0000;
    pub const SW_HSN_DEFAULT: u32 = 0x0010_0000;
    pub const SW_SHIELD_DEFAULT: u32 = 0x0000_0000;
    pub const SW_SHIELD_VDDA_TO_BUS_B: u32 = 0x0000_0100;
    pub const SW_BYP_DEFAULT: u32 = 0x0011_0000;
    pub const SW_CMPP_DEFAULT: u32 = 0;
    pub const SW_CMPN_DEFAULT: u32 = 0;
    pub const SW_FWMOD_DEFAULT: u32 = 0x0110_0000;
    pub const SW_FWTANK_DEFAULT: u32 = 0x0110_0000;
    pub const SW_REFGEN_SGR_SRSS: u32 = 0x1000_0000;
    pub const SW_AMUXBUF_NORM: u32 = 0;

    pub const REFGEN_NORM: u32 = 0x0000_0041;
    pub const REFGEN_GAIN_SHIFT: u32 = 8;
    pub const HSCMP_AZ_DEFAULT: u32 = 0x8000_0001;
}

/// Measurement mode programmed into the ADC control register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MeasureMode {
    Off,
    /// Charge from ground to the reference.
    Vref,
    /// Recharge used to derive the sink/source mismatch.
    VrefBy2,
    /// Measure whatever is routed to the sensing bus.
    Vin,
}

impl MeasureMode {
    /// Field value written at [`bits::ADC_CTL_MEAS_POS`].
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            MeasureMode::Off => 0,
            MeasureMode::Vref => 1,
            MeasureMode::VrefBy2 => 2,
            MeasureMode::Vin => 3,
        }
    }

    /// Decodes the mode field of an ADC control register value.
    #[must_use]
    pub const fn from_adc_ctl(value: u32) -> Self {
        match (value & bits::ADC_CTL_MEAS_MASK) >> bits::ADC_CTL_MEAS_POS {
            1 => MeasureMode::Vref,
            2 => MeasureMode::VrefBy2,
            3 => MeasureMode::Vin,
            _ => MeasureMode::Off,
        }
    }
}

/// Consumers that may hold the sensing block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockOwner {
    Adc,
    CapSense,
    Other(u8),
}

/// Failure reported by the block arbitration layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockError {
    /// Another consumer owns the block.
    Locked(LockOwner),
    /// Release requested by a consumer that does not own the block.
    NotOwner,
}

/// Register access and arbitration for one sensing block.
pub trait CsdBlock {
    /// Reads a register.
    fn read(&self, register: Register) -> u32;

    /// Writes a register.
    fn write(&mut self, register: Register, value: u32);

    /// Reports the current owner, if any.
    fn lock_owner(&self) -> Option<LockOwner>;

    /// Captures the block for `owner` and loads its reset configuration.
    fn acquire(&mut self, owner: LockOwner) -> Result<(), LockError>;

    /// Releases the block previously captured by `owner`.
    fn release(&mut self, owner: LockOwner) -> Result<(), LockError>;

    /// Returns `true` while the sequencer is running.
    fn is_busy(&self) -> bool;

    /// Maps a nominal reference voltage to its trimmed value.
    fn vref_trim(&self, nominal_mv: u16) -> u16 {
        nominal_mv
    }
}

/// Destination of a GPIO pin's analog switch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinRouting {
    Gpio,
    AmuxBusB,
}

/// Pin drive modes the driver relies on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveMode {
    Analog,
}

/// Port-level pin routing.
pub trait PinMux {
    fn set_routing(&mut self, pin: ChannelPin, routing: PinRouting);

    fn set_drive_mode(&mut self, pin: ChannelPin, mode: DriveMode);
}

/// Peripheral clock divider flavours.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DividerKind {
    Integer8,
    Integer16,
    Fractional16,
    Fractional24,
}

impl DividerKind {
    /// Returns `true` for dividers with a fractional part.
    #[must_use]
    pub const fn is_fractional(self) -> bool {
        matches!(self, DividerKind::Fractional16 | DividerKind::Fractional24)
    }
}

/// Peripheral clock divider control.
pub trait PeriClock {
    fn disable_divider(&mut self, kind: DividerKind, index: u8);

    fn set_divider(&mut self, kind: DividerKind, index: u8, value: u32);

    fn set_fractional_divider(&mut self, kind: DividerKind, index: u8, integer: u32, fraction: u32);

    fn enable_divider(&mut self, kind: DividerKind, index: u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_indices_match_table_order() {
        for (index, register) in Register::ALL.iter().enumerate() {
            assert_eq!(register.as_index(), index);
        }
    }

    #[test]
    fn measure_mode_round_trips_through_adc_ctl() {
        for mode in [
            MeasureMode::Off,
            MeasureMode::Vref,
            MeasureMode::VrefBy2,
            MeasureMode::Vin,
        ] {
            let ctl = (mode.bits() << bits::ADC_CTL_MEAS_POS) | 0x7C;
            assert_eq!(MeasureMode::from_adc_ctl(ctl), mode);
        }
    }
}
