//! Peripheral clock dividers.

use csdadc_core::hal::{DividerKind, PeriClock};

use super::{read_reg, write_reg};

const PERI_BASE: usize = 0x4001_0000;
const DIV_CMD: usize = PERI_BASE + 0x400;
const DIV_8_CTL: usize = PERI_BASE + 0x800;
const DIV_16_CTL: usize = PERI_BASE + 0x900;
const DIV_16_5_CTL: usize = PERI_BASE + 0xA00;
const DIV_24_5_CTL: usize = PERI_BASE + 0xB00;
const CLOCK_CTL: usize = PERI_BASE + 0xC00;

const DIV_CMD_TYPE_POS: u32 = 6;
/// Phase-align to no other divider.
const DIV_CMD_PA_NONE: u32 = 0xFF << 8;
const DIV_CMD_DISABLE: u32 = 1 << 30;
const DIV_CMD_ENABLE: u32 = 1 << 31;
/// Reads allowed for a divider command to self-clear.
const DIV_CMD_POLLS: u32 = 1_000;

const DIV_INT_POS: u32 = 8;
const DIV_FRAC_POS: u32 = 3;
const DIV_FRAC_MASK: u32 = 0x1F;

const fn type_code(kind: DividerKind) -> u32 {
    match kind {
        DividerKind::Integer8 => 0,
        DividerKind::Integer16 => 1,
        DividerKind::Fractional16 => 2,
        DividerKind::Fractional24 => 3,
    }
}

fn control_register(kind: DividerKind, index: u8) -> usize {
    let bank = match kind {
        DividerKind::Integer8 => DIV_8_CTL,
        DividerKind::Integer16 => DIV_16_CTL,
        DividerKind::Fractional16 => DIV_16_5_CTL,
        DividerKind::Fractional24 => DIV_24_5_CTL,
    };
    bank + usize::from(index) * 4
}

fn select(kind: DividerKind, index: u8) -> u32 {
    (type_code(kind) << DIV_CMD_TYPE_POS) | u32::from(index)
}

/// Divider bank feeding one peripheral clock slot.
pub struct PeriDividers {
    clock_slot: u8,
}

impl PeriDividers {
    /// `clock_slot` is the peripheral clock number of the CSD block.
    pub const fn new(clock_slot: u8) -> Self {
        Self { clock_slot }
    }
}

impl PeriClock for PeriDividers {
    fn disable_divider(&mut self, kind: DividerKind, index: u8) {
        unsafe { write_reg(DIV_CMD, DIV_CMD_DISABLE | select(kind, index)) }
    }

    fn set_divider(&mut self, kind: DividerKind, index: u8, value: u32) {
        unsafe { write_reg(control_register(kind, index), value << DIV_INT_POS) }
    }

    fn set_fractional_divider(&mut self, kind: DividerKind, index: u8, integer: u32, fraction: u32) {
        let value = (integer << DIV_INT_POS) | ((fraction & DIV_FRAC_MASK) << DIV_FRAC_POS);
        unsafe { write_reg(control_register(kind, index), value) }
    }

    fn enable_divider(&mut self, kind: DividerKind, index: u8) {
        let slot = CLOCK_CTL + usize::from(self.clock_slot) * 4;
        unsafe {
            write_reg(slot, select(kind, index));
            write_reg(DIV_CMD, DIV_CMD_ENABLE | DIV_CMD_PA_NONE | select(kind, index));
            let mut polls = DIV_CMD_POLLS;
            while read_reg(DIV_CMD) & DIV_CMD_ENABLE != 0 && polls > 0 {
                polls -= 1;
            }
        }
    }
}
