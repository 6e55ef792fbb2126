//! HSIOM routing and GPIO drive modes.

use csdadc_core::ChannelPin;
use csdadc_core::hal::{DriveMode, PinMux, PinRouting};

use super::modify_reg;

const HSIOM_BASE: usize = 0x4031_0000;
const HSIOM_PORT_STRIDE: usize = 0x10;
const HSIOM_PORT_SEL1: usize = 0x04;
const HSIOM_FIELD_MASK: u32 = 0x1F;
const HSIOM_SEL_GPIO: u32 = 0x00;
const HSIOM_SEL_AMUXB: u32 = 0x07;

const GPIO_BASE: usize = 0x4032_0000;
const GPIO_PORT_STRIDE: usize = 0x80;
const GPIO_PORT_CFG: usize = 0x44;
const GPIO_CFG_FIELD_MASK: u32 = 0x0F;
/// High impedance with the input buffer off.
const GPIO_DM_ANALOG: u32 = 0x00;

/// Pin routing through the high-speed IO matrix.
pub struct PortMux;

impl PinMux for PortMux {
    fn set_routing(&mut self, pin: ChannelPin, routing: PinRouting) {
        let port = HSIOM_BASE + usize::from(pin.port) * HSIOM_PORT_STRIDE;
        let (address, slot) = if pin.pin < 4 {
            (port, pin.pin)
        } else {
            (port + HSIOM_PORT_SEL1, pin.pin - 4)
        };
        let shift = u32::from(slot) * 8;
        let select = match routing {
            PinRouting::Gpio => HSIOM_SEL_GPIO,
            PinRouting::AmuxBusB => HSIOM_SEL_AMUXB,
        };
        unsafe { modify_reg(address, HSIOM_FIELD_MASK << shift, select << shift) }
    }

    fn set_drive_mode(&mut self, pin: ChannelPin, mode: DriveMode) {
        let address =
            GPIO_BASE + usize::from(pin.port) * GPIO_PORT_STRIDE + GPIO_PORT_CFG;
        let shift = u32::from(pin.pin) * 4;
        let value = match mode {
            DriveMode::Analog => GPIO_DM_ANALOG,
        };
        unsafe { modify_reg(address, GPIO_CFG_FIELD_MASK << shift, value << shift) }
    }
}
