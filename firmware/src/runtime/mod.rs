//! Bare-metal entry point: owns the driver, services the CSD interrupt and
//! keeps a continuous scan of the board's analog inputs running.

use core::cell::RefCell;

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;
use cortex_m::register::primask;
use cortex_m_rt::{entry, exception};
use critical_section::{self, Mutex, RawRestoreState};
use csdadc_core::hal::DividerKind;
use csdadc_core::{
    AdcConfig, AdcError, ChannelPin, ChannelResults, ConversionCounter, ConversionMode, CsdAdc,
    CycleObserver, StopMode,
};
use defmt_rtt as _;
use embedded_hal::delay::DelayNs;
use static_cell::StaticCell;

use crate::hw::csd::CSD0_BASE;
use crate::hw::{CsdRegisters, PeriDividers, PortMux};
use crate::status;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cortex_m::interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cortex_m::interrupt::enable();
            }
        }
    }
}

type Adc = CsdAdc<'static, CsdRegisters, PortMux, PeriDividers>;

const CPU_HZ: u32 = 100_000_000;
/// Peripheral clock slot wired to CSD0.
const CSD_CLOCK_SLOT: u8 = 6;
const CSD_DIVIDER_INDEX: u8 = 0;
const REPORT_INTERVAL_MS: u32 = 500;
/// Reports between two supply measurements.
const SUPPLY_EVERY: u32 = 20;
/// 100 us polls allowed for a pass to finish after a stop request.
const STOP_POLLS: u32 = 1_000;

/// Channel inputs on port 10, pins 0 to 3.
const CHANNEL_PINS: [ChannelPin; status::CHANNELS] = [
    ChannelPin::new(10, 0),
    ChannelPin::new(10, 1),
    ChannelPin::new(10, 2),
    ChannelPin::new(10, 3),
];

static ADC: Mutex<RefCell<Option<Adc>>> = Mutex::new(RefCell::new(None));
static RECORDER: StaticCell<CycleRecorder> = StaticCell::new();

/// CSD0 interrupt line on the CM4 core.
#[derive(Copy, Clone)]
struct CsdIrq;

unsafe impl InterruptNumber for CsdIrq {
    fn number(self) -> u16 {
        49
    }
}

/// Publishes each finished pass to the status store.
struct CycleRecorder;

impl CycleObserver for CycleRecorder {
    fn on_cycle_complete(&mut self, results: &ChannelResults, counter: ConversionCounter) {
        status::record_cycle(results, counter);
    }
}

/// Busy-wait delay clocked from the core frequency.
struct CycleDelay;

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = u64::from(ns) * u64::from(CPU_HZ / 1_000_000) / 1_000;
        cortex_m::asm::delay(u32::try_from(cycles).unwrap_or(u32::MAX).max(1));
    }
}

fn with_adc<R>(f: impl FnOnce(&mut Adc) -> R) -> Option<R> {
    critical_section::with(|cs| ADC.borrow_ref_mut(cs).as_mut().map(f))
}

fn halt(error: AdcError) -> ! {
    defmt::error!("csdadc: halted: {}", error);
    loop {
        cortex_m::asm::wfi();
    }
}

fn build_driver(delay: &mut CycleDelay) -> Result<Adc, AdcError> {
    let config = AdcConfig::new(&CHANNEL_PINS)?
        .with_divider(DividerKind::Integer8, CSD_DIVIDER_INDEX);

    // SAFETY: CSD0 is only ever wrapped here.
    let block = unsafe { CsdRegisters::new(CSD0_BASE) };
    let mut adc = CsdAdc::new(block, PortMux, PeriDividers::new(CSD_CLOCK_SLOT));
    adc.init(config, delay)?;
    adc.enable()?;
    adc.register_callback(RECORDER.init(CycleRecorder));
    Ok(adc)
}

#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    if i32::from(irqn) == i32::from(CsdIrq.number()) {
        with_adc(Adc::on_interrupt);
    }
}

fn report() {
    let count = status::cycles();
    for channel in 0..status::CHANNELS {
        if let Some(millivolts) = status::channel_mv(channel) {
            defmt::info!("csdadc: pass {} ch{} = {} mV", count, channel, millivolts);
        }
    }
}

/// Parks the scan, measures the supply and restarts. Overflow is cleared by
/// recalibrating before the restart.
fn refresh_supply(mask: u32, delay: &mut CycleDelay) -> Result<(), AdcError> {
    with_adc(|adc| adc.stop_convert(StopMode::AfterFullCycle)).unwrap_or(Ok(()))?;

    let mut polls = STOP_POLLS;
    while with_adc(|adc| adc.status().busy()).unwrap_or(false) {
        if polls == 0 {
            with_adc(|adc| adc.stop_convert(StopMode::Immediate)).unwrap_or(Ok(()))?;
            break;
        }
        polls -= 1;
        delay.delay_us(100);
    }

    let outcome = with_adc(|adc| {
        if adc.is_end_conversion() == Err(AdcError::Overflow) {
            defmt::warn!("csdadc: overflow, recalibrating");
            adc.calibrate()?;
        }
        let vdda = adc.measure_supply_voltage()?;
        adc.start_convert(ConversionMode::Continuous, mask)?;
        Ok(vdda)
    });

    match outcome {
        Some(Ok(vdda)) => {
            status::record_vdda(vdda);
            defmt::info!("csdadc: vdda = {} mV", vdda);
            Ok(())
        }
        Some(Err(error)) => Err(error),
        None => Err(AdcError::NotInitialized),
    }
}

#[entry]
fn main() -> ! {
    let mut delay = CycleDelay;
    let adc = build_driver(&mut delay).unwrap_or_else(halt);
    let mask = adc.config().map_or(0, AdcConfig::channel_mask);
    critical_section::with(|cs| *ADC.borrow_ref_mut(cs) = Some(adc));

    // SAFETY: the handler only touches the driver through the mutex.
    unsafe { NVIC::unmask(CsdIrq) };

    if let Some(Err(error)) = with_adc(|adc| adc.start_convert(ConversionMode::Continuous, mask)) {
        halt(error);
    }
    defmt::info!("csdadc: scanning {} channels", status::CHANNELS);

    let mut until_supply = SUPPLY_EVERY;
    loop {
        delay.delay_ms(REPORT_INTERVAL_MS);
        report();

        until_supply -= 1;
        if until_supply == 0 {
            until_supply = SUPPLY_EVERY;
            if let Err(error) = refresh_supply(mask, &mut delay) {
                defmt::warn!("csdadc: supply refresh failed: {}", error);
                if status::vdda_sample().is_none() {
                    halt(error);
                }
            }
        }
    }
}
