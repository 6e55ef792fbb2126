//! Behavioural model of the sensing block and its surroundings.
//!
//! The bench turns voltages into timer counts the way the real block does:
//! charging the reference from ground takes `ref_counts` ticks, an input
//! below the reference is reported as a sourcing count proportional to the
//! distance to the reference, and an input above it as a sinking count
//! stretched by the sink/source current mismatch. Every sequencer start
//! completes immediately; the interrupt is latched until the console
//! delivers it.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use csdadc_core::ChannelPin;
use csdadc_core::hal::{
    CsdBlock, DividerKind, DriveMode, LockError, LockOwner, MeasureMode, PeriClock, PinMux,
    PinRouting, Register, bits,
};
use embedded_hal::delay::DelayNs;
use log::{debug, trace};

/// Ticks needed to charge the reference capacitor from ground to Vref.
pub const DEFAULT_REF_COUNTS: u32 = 2000;
/// Sink current relative to the source current, in permille.
pub const DEFAULT_SINK_PERMILLE: u32 = 1100;
pub const DEFAULT_VDDA_MV: u16 = 3300;

/// Reference generator input scaled by 32 / (gain + 1).
const REFGEN_SOURCE_SCALED_MV: u32 = 32 * 800;
const REFGEN_GAIN_MASK: u32 = 0x1F;

/// Injected misbehaviour.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Fault {
    /// Sequencer starts never complete.
    Hang,
    /// The next measurement saturates the timer.
    Overflow,
}

pub type SharedBench = Rc<RefCell<Bench>>;

pub struct Bench {
    regs: [u32; Register::COUNT],
    owner: Option<LockOwner>,
    running: bool,
    pub vdda_mv: u16,
    /// Voltage on AMUX-B when no channel pin is connected.
    pub amux_mv: u16,
    pub ref_counts: u32,
    pub sink_permille: u32,
    inputs: Vec<(ChannelPin, u16)>,
    on_bus: Vec<ChannelPin>,
    fault: Option<Fault>,
    measurements: u32,
}

impl Default for Bench {
    fn default() -> Self {
        Self::new()
    }
}

impl Bench {
    pub fn new() -> Self {
        Self {
            regs: [0; Register::COUNT],
            owner: None,
            running: false,
            vdda_mv: DEFAULT_VDDA_MV,
            amux_mv: 0,
            ref_counts: DEFAULT_REF_COUNTS,
            sink_permille: DEFAULT_SINK_PERMILLE,
            inputs: Vec::new(),
            on_bus: Vec::new(),
            fault: None,
            measurements: 0,
        }
    }

    pub fn shared() -> SharedBench {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn set_input(&mut self, pin: ChannelPin, millivolts: u16) {
        match self.inputs.iter_mut().find(|(p, _)| *p == pin) {
            Some(entry) => entry.1 = millivolts,
            None => self.inputs.push((pin, millivolts)),
        }
    }

    pub fn input(&self, pin: ChannelPin) -> u16 {
        self.inputs
            .iter()
            .find(|(p, _)| *p == pin)
            .map_or(0, |(_, mv)| *mv)
    }

    pub fn set_fault(&mut self, fault: Option<Fault>) {
        self.fault = fault;
        if fault.is_none() && self.running {
            // A hung start completes once the fault is lifted.
            self.complete();
        }
    }

    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    pub fn owner(&self) -> Option<LockOwner> {
        self.owner
    }

    /// Forces ownership, as another middleware would.
    pub fn set_owner(&mut self, owner: Option<LockOwner>) {
        self.owner = owner;
    }

    pub fn on_bus(&self) -> &[ChannelPin] {
        &self.on_bus
    }

    pub fn measurements(&self) -> u32 {
        self.measurements
    }

    /// Completion interrupt raised and not masked.
    pub fn irq_pending(&self) -> bool {
        let raised = self.regs[Register::Intr.as_index()];
        let enabled = self.regs[Register::IntrMask.as_index()];
        raised & enabled & bits::INTR_ADC_RES != 0
    }

    /// Reference voltage selected by the reference generator gain.
    pub fn vref_mv(&self) -> u32 {
        let gain = (self.regs[Register::Refgen.as_index()] >> bits::REFGEN_GAIN_SHIFT)
            & REFGEN_GAIN_MASK;
        (REFGEN_SOURCE_SCALED_MV + (gain + 1) / 2) / (gain + 1)
    }

    /// Voltage seen by the comparator in input mode.
    fn bus_mv(&self) -> u32 {
        if self.regs[Register::SwShieldSel.as_index()] & bits::SW_SHIELD_VDDA_TO_BUS_B != 0 {
            return u32::from(self.vdda_mv);
        }
        let mv = self
            .on_bus
            .first()
            .map_or(self.amux_mv, |pin| self.input(*pin));
        u32::from(mv)
    }

    fn read(&self, register: Register) -> u32 {
        self.regs[register.as_index()]
    }

    fn write(&mut self, register: Register, value: u32) {
        match register {
            Register::Intr => self.regs[register.as_index()] &= !value,
            Register::SeqStart => {
                if value & bits::SEQ_ABORT != 0 {
                    trace!("bench: abort");
                    self.running = false;
                } else if value & bits::SEQ_START != 0 {
                    self.running = true;
                    if self.fault != Some(Fault::Hang) {
                        self.complete();
                    }
                }
            }
            _ => self.regs[register.as_index()] = value,
        }
    }

    fn complete(&mut self) {
        let mode = MeasureMode::from_adc_ctl(self.regs[Register::AdcCtl.as_index()]);
        let result = if self.fault == Some(Fault::Overflow) {
            self.fault = None;
            bits::ADC_RES_OVERFLOW | bits::ADC_RES_VALUE
        } else {
            self.measure(mode)
        };
        trace!("bench: {:?} -> {:#010x}", mode, result);

        self.measurements += 1;
        self.regs[Register::AdcRes.as_index()] = result;
        self.regs[Register::Intr.as_index()] |= bits::INTR_ADC_RES;
        self.running = false;
    }

    fn measure(&self, mode: MeasureMode) -> u32 {
        match mode {
            MeasureMode::Off => 0,
            MeasureMode::Vref => self.ref_counts.min(bits::ADC_RES_VALUE),
            MeasureMode::VrefBy2 => {
                (self.ref_counts * self.sink_permille / 2000).min(bits::ADC_RES_VALUE)
            }
            MeasureMode::Vin => self.input_result(self.bus_mv()),
        }
    }

    fn input_result(&self, vin: u32) -> u32 {
        let vref = self.vref_mv().max(1);
        if vin < vref {
            let count = (vref - vin) * self.ref_counts / vref;
            bits::ADC_RES_HSCMP_POL | count
        } else {
            let count = u64::from(vin - vref) * u64::from(self.ref_counts) * 1000
                / (u64::from(vref) * u64::from(self.sink_permille.max(1)));
            match u32::try_from(count) {
                Ok(count) if count <= bits::ADC_RES_VALUE => count,
                _ => bits::ADC_RES_OVERFLOW | bits::ADC_RES_VALUE,
            }
        }
    }
}

/// Register and lock side of the bench.
pub struct BenchBlock(pub SharedBench);

impl CsdBlock for BenchBlock {
    fn read(&self, register: Register) -> u32 {
        self.0.borrow().read(register)
    }

    fn write(&mut self, register: Register, value: u32) {
        self.0.borrow_mut().write(register, value);
    }

    fn lock_owner(&self) -> Option<LockOwner> {
        self.0.borrow().owner
    }

    fn acquire(&mut self, owner: LockOwner) -> Result<(), LockError> {
        let mut bench = self.0.borrow_mut();
        if let Some(current) = bench.owner {
            return Err(LockError::Locked(current));
        }
        bench.owner = Some(owner);
        debug!("bench: block captured by {owner:?}");
        Ok(())
    }

    fn release(&mut self, owner: LockOwner) -> Result<(), LockError> {
        let mut bench = self.0.borrow_mut();
        if bench.owner != Some(owner) {
            return Err(LockError::NotOwner);
        }
        bench.owner = None;
        debug!("bench: block released by {owner:?}");
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.0.borrow().running
    }
}

/// Pin side of the bench: tracks which pins sit on AMUX-B.
pub struct BenchPins(pub SharedBench);

impl PinMux for BenchPins {
    fn set_routing(&mut self, pin: ChannelPin, routing: PinRouting) {
        let mut bench = self.0.borrow_mut();
        match routing {
            PinRouting::AmuxBusB => {
                if !bench.on_bus.contains(&pin) {
                    bench.on_bus.push(pin);
                }
            }
            PinRouting::Gpio => bench.on_bus.retain(|p| *p != pin),
        }
    }

    fn set_drive_mode(&mut self, pin: ChannelPin, mode: DriveMode) {
        trace!("bench: P{}.{} drive {:?}", pin.port, pin.pin, mode);
    }
}

/// Clock dividers only log what they are asked to do.
pub struct BenchClock;

impl PeriClock for BenchClock {
    fn disable_divider(&mut self, kind: DividerKind, index: u8) {
        trace!("bench: divider {kind:?}#{index} off");
    }

    fn set_divider(&mut self, kind: DividerKind, index: u8, value: u32) {
        debug!("bench: divider {kind:?}#{index} = {}", value + 1);
    }

    fn set_fractional_divider(&mut self, kind: DividerKind, index: u8, integer: u32, fraction: u32) {
        debug!("bench: divider {kind:?}#{index} = {}.{fraction}", integer + 1);
    }

    fn enable_divider(&mut self, kind: DividerKind, index: u8) {
        trace!("bench: divider {kind:?}#{index} on");
    }
}

/// Blocking delay on the host clock.
pub struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench_with_gain(gain: u32) -> Bench {
        let mut bench = Bench::new();
        bench.write(Register::Refgen, bits::REFGEN_NORM | (gain << bits::REFGEN_GAIN_SHIFT));
        bench
    }

    fn start(bench: &mut Bench, mode: MeasureMode) -> u32 {
        bench.write(Register::AdcCtl, mode.bits() << bits::ADC_CTL_MEAS_POS);
        bench.write(Register::SeqStart, bits::SEQ_START);
        bench.read(Register::AdcRes)
    }

    #[test]
    fn reference_follows_generator_gain() {
        assert_eq!(bench_with_gain(11).vref_mv(), 2133);
        assert_eq!(bench_with_gain(19).vref_mv(), 1280);
    }

    #[test]
    fn calibration_modes_report_reference_timing() {
        let mut bench = bench_with_gain(11);
        assert_eq!(start(&mut bench, MeasureMode::Vref), 2000);
        assert_eq!(start(&mut bench, MeasureMode::VrefBy2), 1100);
        assert_eq!(bench.measurements(), 2);
    }

    #[test]
    fn inputs_below_reference_source() {
        let mut bench = bench_with_gain(11);
        let pin = ChannelPin::new(2, 0);
        bench.set_input(pin, 1000);
        bench.on_bus.push(pin);

        let result = start(&mut bench, MeasureMode::Vin);
        assert_ne!(result & bits::ADC_RES_HSCMP_POL, 0);
        assert_eq!(result & bits::ADC_RES_VALUE, 1133 * 2000 / 2133);
    }

    #[test]
    fn supply_routing_sinks_with_mismatch() {
        let mut bench = bench_with_gain(11);
        bench.write(Register::SwShieldSel, bits::SW_SHIELD_VDDA_TO_BUS_B);

        let result = start(&mut bench, MeasureMode::Vin);
        assert_eq!(result & bits::ADC_RES_HSCMP_POL, 0);
        assert_eq!(result, 1167 * 2000 * 1000 / (2133 * 1100));
    }

    #[test]
    fn hang_holds_start_until_cleared() {
        let mut bench = bench_with_gain(11);
        bench.set_fault(Some(Fault::Hang));
        bench.write(Register::IntrMask, bits::INTR_ADC_RES);
        start(&mut bench, MeasureMode::Vref);
        assert!(bench.running);
        assert!(!bench.irq_pending());

        bench.set_fault(None);
        assert!(!bench.running);
        assert!(bench.irq_pending());
    }

    #[test]
    fn overflow_fault_is_one_shot() {
        let mut bench = bench_with_gain(11);
        bench.set_fault(Some(Fault::Overflow));
        assert_ne!(start(&mut bench, MeasureMode::Vref) & bits::ADC_RES_OVERFLOW, 0);
        assert_eq!(bench.fault(), None);
        assert_eq!(start(&mut bench, MeasureMode::Vref), 2000);
    }

    #[test]
    fn lock_is_exclusive() {
        let shared = Bench::shared();
        let mut block = BenchBlock(Rc::clone(&shared));
        block.acquire(LockOwner::CapSense).expect("free block");
        assert_eq!(
            block.acquire(LockOwner::Adc),
            Err(LockError::Locked(LockOwner::CapSense))
        );
        assert_eq!(block.release(LockOwner::Adc), Err(LockError::NotOwner));
        block.release(LockOwner::CapSense).expect("owner releases");
        assert_eq!(shared.borrow().owner(), None);
    }
}
