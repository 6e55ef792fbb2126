//! CSD block registers and the ownership lock shared with other middleware.

use csdadc_core::hal::{CsdBlock, LockError, LockOwner, Register, bits};
use portable_atomic::{AtomicU16, Ordering};

use super::{read_reg, write_reg};

/// Register base of CSD0.
pub const CSD0_BASE: usize = 0x411F_0000;

const NO_OWNER: u16 = 0;
const OWNER_ADC: u16 = 1;
const OWNER_CAPSENSE: u16 = 2;
const OWNER_OTHER: u16 = 0x100;

/// Current owner of CSD0; shared by every consumer of the block.
static OWNER: AtomicU16 = AtomicU16::new(NO_OWNER);

fn encode(owner: LockOwner) -> u16 {
    match owner {
        LockOwner::Adc => OWNER_ADC,
        LockOwner::CapSense => OWNER_CAPSENSE,
        LockOwner::Other(key) => OWNER_OTHER | u16::from(key),
    }
}

fn decode(raw: u16) -> Option<LockOwner> {
    match raw {
        NO_OWNER => None,
        OWNER_ADC => Some(LockOwner::Adc),
        OWNER_CAPSENSE => Some(LockOwner::CapSense),
        other => Some(LockOwner::Other(other.to_le_bytes()[0])),
    }
}

const fn offset(register: Register) -> usize {
    match register {
        Register::Config => 0x000,
        Register::AdcRes => 0x0E0,
        Register::Intr => 0x0F0,
        Register::IntrMask => 0x0F8,
        Register::Hscmp => 0x180,
        Register::Refgen => 0x188,
        Register::CsdCmp => 0x18C,
        Register::SensePeriod => 0x200,
        Register::SenseDuty => 0x204,
        Register::SwHsPosSel => 0x280,
        Register::SwHsNegSel => 0x284,
        Register::SwShieldSel => 0x288,
        Register::SwAmuxbufSel => 0x290,
        Register::SwBypSel => 0x294,
        Register::SwCmpPosSel => 0x2A0,
        Register::SwCmpNegSel => 0x2A4,
        Register::SwRefgenSel => 0x2A8,
        Register::SwFwModSel => 0x2B0,
        Register::SwFwTankSel => 0x2B4,
        Register::SwDsiSel => 0x2C0,
        Register::SeqTime => 0x300,
        Register::SeqInitCnt => 0x310,
        Register::SeqNormCnt => 0x314,
        Register::AdcCtl => 0x318,
        Register::SeqStart => 0x31C,
        Register::IdacB => 0x900,
    }
}

/// Register window of one CSD instance.
pub struct CsdRegisters {
    base: usize,
}

impl CsdRegisters {
    /// # Safety
    /// `base` must be the register base of a CSD block and at most one
    /// instance may exist per block.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl CsdBlock for CsdRegisters {
    fn read(&self, register: Register) -> u32 {
        unsafe { read_reg(self.base + offset(register)) }
    }

    fn write(&mut self, register: Register, value: u32) {
        unsafe { write_reg(self.base + offset(register), value) }
    }

    fn lock_owner(&self) -> Option<LockOwner> {
        decode(OWNER.load(Ordering::Acquire))
    }

    fn acquire(&mut self, owner: LockOwner) -> Result<(), LockError> {
        OWNER
            .compare_exchange(NO_OWNER, encode(owner), Ordering::AcqRel, Ordering::Acquire)
            .map_err(|current| match decode(current) {
                Some(holder) => LockError::Locked(holder),
                None => LockError::NotOwner,
            })?;

        // Leave the block quiet for the new owner.
        self.write(Register::IntrMask, bits::INTR_MASK_CLEAR);
        self.write(Register::Intr, bits::INTR_ALL);
        self.write(Register::Config, bits::CONFIG_DEFAULT);
        Ok(())
    }

    fn release(&mut self, owner: LockOwner) -> Result<(), LockError> {
        OWNER
            .compare_exchange(encode(owner), NO_OWNER, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| LockError::NotOwner)
    }

    fn is_busy(&self) -> bool {
        self.read(Register::SeqStart) & bits::SEQ_START != 0
    }
}
