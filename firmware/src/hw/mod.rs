#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Memory-mapped implementations of the driver's collaborator traits for the
//! CM4 core of a PSoC 63 device.

pub mod clock;
pub mod csd;
pub mod port;

pub use clock::PeriDividers;
pub use csd::CsdRegisters;
pub use port::PortMux;

/// # Safety
/// `address` must be a readable, word-aligned peripheral register.
unsafe fn read_reg(address: usize) -> u32 {
    unsafe { core::ptr::read_volatile(address as *const u32) }
}

/// # Safety
/// `address` must be a writable, word-aligned peripheral register.
unsafe fn write_reg(address: usize, value: u32) {
    unsafe { core::ptr::write_volatile(address as *mut u32, value) }
}

/// Read-modify-write of the `mask` field of a register.
///
/// # Safety
/// Same as [`read_reg`] and [`write_reg`]; callers serialise access.
unsafe fn modify_reg(address: usize, mask: u32, value: u32) {
    unsafe {
        let current = read_reg(address);
        write_reg(address, (current & !mask) | (value & mask));
    }
}
