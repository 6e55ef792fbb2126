#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;

use csdadc_core::hal::{
    CsdBlock, DividerKind, DriveMode, LockError, LockOwner, MeasureMode, PeriClock, PinMux,
    PinRouting, Register, bits,
};
use csdadc_core::{AdcConfig, ChannelPin, CsdAdc};
use embedded_hal::delay::DelayNs;

/// Results the calibration sequence consumes: t_vssa2vref, t_recover, raw t_vdda2vref.
pub const CALIBRATION_SCRIPT: [u32; 3] = [2000, 1100, 1000];

pub type TestAdc<'cb> = CsdAdc<'cb, SimBlock, RecordingPins, RecordingClock>;

/// Sensing block that answers each sequencer start with the next scripted result.
pub struct SimBlock {
    regs: [u32; Register::COUNT],
    pub script: VecDeque<u32>,
    pub owner: Option<LockOwner>,
    pub running: bool,
    /// Starts never complete.
    pub stuck: bool,
    /// Abort requests are not honoured.
    pub ignore_abort: bool,
    pub starts: Vec<MeasureMode>,
    pub aborts: usize,
    pub intr_reads: Cell<usize>,
}

impl SimBlock {
    pub fn new() -> Self {
        Self {
            regs: [0; Register::COUNT],
            script: VecDeque::new(),
            owner: None,
            running: false,
            stuck: false,
            ignore_abort: false,
            starts: Vec::new(),
            aborts: 0,
            intr_reads: Cell::new(0),
        }
    }

    pub fn with_script(results: &[u32]) -> Self {
        let mut block = Self::new();
        block.script.extend(results.iter().copied());
        block
    }

    pub fn push(&mut self, result: u32) {
        self.script.push_back(result);
    }

    pub fn interrupt_pending(&self) -> bool {
        self.regs[Register::Intr.as_index()] & bits::INTR_ADC_RES != 0
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.regs[Register::IntrMask.as_index()] & bits::INTR_ADC_RES != 0
    }

    pub fn reg(&self, register: Register) -> u32 {
        self.regs[register.as_index()]
    }

    fn start(&mut self) {
        self.starts
            .push(MeasureMode::from_adc_ctl(self.reg(Register::AdcCtl)));

        match self.script.pop_front() {
            Some(result) if !self.stuck => {
                self.regs[Register::AdcRes.as_index()] = result;
                self.regs[Register::Intr.as_index()] |= bits::INTR_ADC_RES;
                self.running = false;
            }
            _ => self.running = true,
        }
    }
}

impl CsdBlock for SimBlock {
    fn read(&self, register: Register) -> u32 {
        if register == Register::Intr {
            self.intr_reads.set(self.intr_reads.get() + 1);
        }
        self.regs[register.as_index()]
    }

    fn write(&mut self, register: Register, value: u32) {
        match register {
            Register::Intr => self.regs[register.as_index()] &= !value,
            Register::SeqStart => {
                if value & bits::SEQ_ABORT != 0 {
                    self.aborts += 1;
                    if !self.ignore_abort {
                        self.running = false;
                    }
                } else if value & bits::SEQ_START != 0 {
                    self.start();
                }
            }
            _ => self.regs[register.as_index()] = value,
        }
    }

    fn lock_owner(&self) -> Option<LockOwner> {
        self.owner
    }

    fn acquire(&mut self, owner: LockOwner) -> Result<(), LockError> {
        match self.owner {
            Some(current) => Err(LockError::Locked(current)),
            None => {
                self.owner = Some(owner);
                Ok(())
            }
        }
    }

    fn release(&mut self, owner: LockOwner) -> Result<(), LockError> {
        if self.owner == Some(owner) {
            self.owner = None;
            Ok(())
        } else {
            Err(LockError::NotOwner)
        }
    }

    fn is_busy(&self) -> bool {
        self.running
    }
}

/// Pin mux that records every switch and tracks what is on the bus.
#[derive(Default)]
pub struct RecordingPins {
    pub log: Vec<(ChannelPin, PinRouting)>,
    pub connected: Vec<ChannelPin>,
    pub max_connected: usize,
    pub drive_modes: Vec<(ChannelPin, DriveMode)>,
}

impl RecordingPins {
    pub fn connects(&self) -> usize {
        self.log
            .iter()
            .filter(|(_, routing)| *routing == PinRouting::AmuxBusB)
            .count()
    }

    pub fn disconnects_of_connected(&self) -> usize {
        let mut on_bus: Vec<ChannelPin> = Vec::new();
        let mut count = 0;
        for (pin, routing) in &self.log {
            match routing {
                PinRouting::AmuxBusB => on_bus.push(*pin),
                PinRouting::Gpio => {
                    if let Some(position) = on_bus.iter().position(|p| p == pin) {
                        on_bus.remove(position);
                        count += 1;
                    }
                }
            }
        }
        count
    }

    pub fn connected_order(&self) -> Vec<ChannelPin> {
        self.log
            .iter()
            .filter(|(_, routing)| *routing == PinRouting::AmuxBusB)
            .map(|(pin, _)| *pin)
            .collect()
    }

    pub fn reset_log(&mut self) {
        self.log.clear();
        self.drive_modes.clear();
    }
}

impl PinMux for RecordingPins {
    fn set_routing(&mut self, pin: ChannelPin, routing: PinRouting) {
        self.log.push((pin, routing));
        match routing {
            PinRouting::AmuxBusB => {
                if !self.connected.contains(&pin) {
                    self.connected.push(pin);
                }
                self.max_connected = self.max_connected.max(self.connected.len());
            }
            PinRouting::Gpio => self.connected.retain(|p| *p != pin),
        }
    }

    fn set_drive_mode(&mut self, pin: ChannelPin, mode: DriveMode) {
        self.drive_modes.push((pin, mode));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOp {
    Disable(DividerKind, u8),
    Set(DividerKind, u8, u32),
    SetFractional(DividerKind, u8, u32, u32),
    Enable(DividerKind, u8),
}

#[derive(Default)]
pub struct RecordingClock {
    pub ops: Vec<ClockOp>,
}

impl PeriClock for RecordingClock {
    fn disable_divider(&mut self, kind: DividerKind, index: u8) {
        self.ops.push(ClockOp::Disable(kind, index));
    }

    fn set_divider(&mut self, kind: DividerKind, index: u8, value: u32) {
        self.ops.push(ClockOp::Set(kind, index, value));
    }

    fn set_fractional_divider(&mut self, kind: DividerKind, index: u8, integer: u32, fraction: u32) {
        self.ops
            .push(ClockOp::SetFractional(kind, index, integer, fraction));
    }

    fn enable_divider(&mut self, kind: DividerKind, index: u8) {
        self.ops.push(ClockOp::Enable(kind, index));
    }
}

#[derive(Default)]
pub struct RecordingDelay {
    pub total_ns: u64,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

pub fn pins(count: u8) -> Vec<ChannelPin> {
    (0..count).map(|pin| ChannelPin::new(2, pin)).collect()
}

/// Two channels, 10-bit, supply range, default timing.
pub fn two_channel_config() -> AdcConfig {
    AdcConfig::new(&pins(2)).expect("two channels fit")
}

pub fn new_adc<'cb>(block: SimBlock) -> TestAdc<'cb> {
    CsdAdc::new(block, RecordingPins::default(), RecordingClock::default())
}

/// Driver initialised and calibrated with [`CALIBRATION_SCRIPT`].
pub fn calibrated_adc<'cb>(config: AdcConfig) -> TestAdc<'cb> {
    let mut adc = new_adc(SimBlock::with_script(&CALIBRATION_SCRIPT));
    adc.init(config, &mut RecordingDelay::default())
        .expect("init succeeds");
    adc.enable().expect("calibration succeeds");
    adc
}

/// Delivers the pending completion interrupt, if any, like the platform ISR shim.
pub fn fire(adc: &mut TestAdc<'_>) -> bool {
    if adc.block().interrupt_pending() {
        adc.on_interrupt();
        true
    } else {
        false
    }
}

pub fn sourcing(count: u16) -> u32 {
    bits::ADC_RES_HSCMP_POL | u32::from(count)
}

pub fn sinking(count: u16) -> u32 {
    u32::from(count)
}
