//! The ADC driver context.
//!
//! [`CsdAdc`] owns the collaborator implementations, the configuration copy,
//! the calibration constants and the per-channel result table. Mainline code
//! calls the lifecycle, conversion and measurement methods; the platform's
//! interrupt shim calls [`CsdAdc::on_interrupt`] on every completion
//! interrupt of the sensing block. The platform keeps both contexts from
//! entering the driver at once (firmware wraps it in a
//! `critical_section::Mutex`).

mod calibrate;
mod convert;
mod dispatch;
mod measure;

use embedded_hal::delay::DelayNs;

use crate::MAX_CHANNELS;
use crate::config::{AdcConfig, ChannelPin, DerivedParams};
use crate::error::AdcError;
use crate::hal::{
    CsdBlock, DriveMode, LockOwner, MeasureMode, PeriClock, PinMux, PinRouting, Register, bits,
};
use crate::interpret::Calibration;
use crate::status::{AdcStatus, CalibrationStep, ConversionCounter, Phase};

/// Budget shared by every busy-wait loop of the driver.
pub(crate) const WATCHDOG_CYCLES: u32 = 0xFFFF;

/// Approximate length of one restore poll in peripheral clock cycles.
const RESTORE_POLL_CYCLES: u32 = 5;

/// Last conversion result of one channel.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelResult {
    pub code: u16,
    pub millivolts: u16,
}

/// Result table indexed by channel id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelResults {
    entries: [ChannelResult; MAX_CHANNELS],
}

impl Default for ChannelResults {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelResults {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [ChannelResult {
                code: 0,
                millivolts: 0,
            }; MAX_CHANNELS],
        }
    }

    #[must_use]
    pub fn get(&self, channel: u8) -> Option<ChannelResult> {
        self.entries.get(usize::from(channel)).copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ChannelResult] {
        &self.entries
    }

    fn store(&mut self, channel: u8, result: ChannelResult) {
        if let Some(entry) = self.entries.get_mut(usize::from(channel)) {
            *entry = result;
        }
    }

    fn clear(&mut self) {
        self.entries = [ChannelResult::default(); MAX_CHANNELS];
    }
}

/// Observer notified each time a continuous run completes a pass.
///
/// Runs in interrupt context, before the next pass starts.
pub trait CycleObserver {
    fn on_cycle_complete(&mut self, results: &ChannelResults, counter: ConversionCounter);
}

impl<F> CycleObserver for F
where
    F: FnMut(&ChannelResults, ConversionCounter),
{
    fn on_cycle_complete(&mut self, results: &ChannelResults, counter: ConversionCounter) {
        self(results, counter);
    }
}

/// Answer to the power manager before a deep-sleep transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepReadiness {
    Ready,
    NotReady,
}

#[derive(Clone, Debug)]
struct Setup {
    config: AdcConfig,
    derived: DerivedParams,
}

/// CSD block driven as an ADC.
pub struct CsdAdc<'cb, B, M, K> {
    block: B,
    pins: M,
    clock: K,
    setup: Option<Setup>,
    calibration: Calibration,
    /// Calibration being measured; committed once every phase succeeded.
    staged: Calibration,
    status: AdcStatus,
    results: ChannelResults,
    active: Option<u8>,
    mask: u32,
    counter: ConversionCounter,
    observer: Option<&'cb mut (dyn CycleObserver + Send)>,
    supply_mv: Option<u16>,
    aux_bus_mv: Option<u16>,
}

impl<'cb, B, M, K> CsdAdc<'cb, B, M, K>
where
    B: CsdBlock,
    M: PinMux,
    K: PeriClock,
{
    /// Wraps the collaborators; nothing touches the hardware until [`Self::init`].
    #[must_use]
    pub fn new(block: B, pins: M, clock: K) -> Self {
        Self {
            block,
            pins,
            clock,
            setup: None,
            calibration: Calibration::UNCONFIGURED,
            staged: Calibration::UNCONFIGURED,
            status: AdcStatus::new(),
            results: ChannelResults::new(),
            active: None,
            mask: 0,
            counter: ConversionCounter::default(),
            observer: None,
            supply_mv: None,
            aux_bus_mv: None,
        }
    }

    /// Copies `config`, captures the sensing block and waits for it to settle.
    ///
    /// Calibration still has to run through [`Self::enable`].
    pub fn init<D: DelayNs>(&mut self, config: AdcConfig, delay: &mut D) -> Result<(), AdcError> {
        config.validate()?;

        self.clear_channels_of(&config);
        self.install(config);

        if let Err(err) = self.restore() {
            warn!("csdadc: init could not capture block: {:?}", err);
            return Err(AdcError::HwLocked);
        }

        delay.delay_us(u32::from(self.init_time_us()));
        self.status.set_initialized(true);
        info!("csdadc: initialized with {} channels", self.num_channels());
        Ok(())
    }

    /// Programs the block and runs a calibration.
    ///
    /// Conversions are refused until this has succeeded once.
    pub fn enable(&mut self) -> Result<(), AdcError> {
        if !self.status.initialized() || self.setup.is_none() {
            return Err(AdcError::NotInitialized);
        }
        if !self.owns_block() {
            return Err(AdcError::HwLocked);
        }
        self.configure();
        self.calibrate()?;
        self.status.set_enabled(true);
        Ok(())
    }

    /// Releases the sensing block and marks the driver unconfigured.
    ///
    /// The configuration copy is kept so the aux-bus helper can bring the
    /// driver back.
    pub fn deinit(&mut self) -> Result<(), AdcError> {
        self.release_block()?;
        self.status.set_initialized(false);
        self.status.set_enabled(false);
        info!("csdadc: deinitialized");
        Ok(())
    }

    /// Replaces the configuration, then configures and calibrates.
    pub fn write_config(&mut self, config: AdcConfig) -> Result<(), AdcError> {
        if self.status.busy() {
            return Err(AdcError::HwBusy);
        }
        if !self.owns_block() {
            return Err(AdcError::HwLocked);
        }
        config.validate()?;

        self.clear_channels();
        self.clear_channels_of(&config);
        self.install(config);
        self.status.set_initialized(true);
        self.enable()
    }

    /// Installs the observer called at the end of every continuous pass.
    pub fn register_callback(&mut self, observer: &'cb mut (dyn CycleObserver + Send)) {
        self.observer = Some(observer);
    }

    /// Detaches the observer and hands it back to the caller.
    pub fn unregister_callback(&mut self) -> Option<&'cb mut (dyn CycleObserver + Send)> {
        self.observer.take()
    }

    /// Hands the block back to the arbitration layer for another consumer.
    pub fn save(&mut self) -> Result<(), AdcError> {
        self.release_block()?;
        debug!("csdadc: block saved");
        Ok(())
    }

    /// Captures the block for the ADC and loads the driver configuration.
    pub fn restore(&mut self) -> Result<(), AdcError> {
        let Some(peri_clk_hz) = self.setup.as_ref().map(|setup| setup.config.peri_clk_hz) else {
            return Err(AdcError::NotInitialized);
        };

        if let Some(owner) = self.block.lock_owner() {
            debug!("csdadc: block owned by {:?}", owner);
            return Err(AdcError::HwLocked);
        }

        self.block.write(Register::IntrMask, bits::INTR_MASK_CLEAR);
        if self.block.is_busy() {
            self.block.write(Register::SeqStart, bits::SEQ_ABORT);
            let mut watchdog = peri_clk_hz / RESTORE_POLL_CYCLES;
            while self.block.is_busy() && watchdog != 0 {
                watchdog -= 1;
            }
        }
        self.clear_interrupts();

        self.block.acquire(LockOwner::Adc).map_err(|err| {
            warn!("csdadc: lock refused: {:?}", err);
            AdcError::HwLocked
        })?;
        self.configure();
        debug!("csdadc: block restored");
        Ok(())
    }

    /// Waits for the block to settle after deep sleep.
    pub fn wakeup<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), AdcError> {
        if self.setup.is_none() {
            return Err(AdcError::NotInitialized);
        }
        delay.delay_us(u32::from(self.init_time_us()));
        Ok(())
    }

    /// Deep-sleep check: refuse while the ADC owns the block and is mid-operation.
    #[must_use]
    pub fn sleep_readiness(&self) -> SleepReadiness {
        if self.block.lock_owner() == Some(LockOwner::Adc) && self.is_end_conversion().is_err() {
            SleepReadiness::NotReady
        } else {
            SleepReadiness::Ready
        }
    }

    #[must_use]
    pub fn status(&self) -> AdcStatus {
        self.status
    }

    #[must_use]
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Channel currently connected to the sensing bus.
    #[must_use]
    pub fn active_channel(&self) -> Option<u8> {
        self.active
    }

    #[must_use]
    pub fn config(&self) -> Option<&AdcConfig> {
        self.setup.as_ref().map(|setup| &setup.config)
    }

    #[must_use]
    pub fn derived(&self) -> Option<DerivedParams> {
        self.setup.as_ref().map(|setup| setup.derived)
    }

    #[must_use]
    pub fn results(&self) -> &ChannelResults {
        &self.results
    }

    /// Last reading of [`Self::measure_supply_voltage`].
    #[must_use]
    pub fn supply_voltage(&self) -> Option<u16> {
        self.supply_mv
    }

    /// Last reading of [`Self::measure_aux_bus_voltage`].
    #[must_use]
    pub fn aux_bus_voltage(&self) -> Option<u16> {
        self.aux_bus_mv
    }

    #[must_use]
    pub fn block(&self) -> &B {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut B {
        &mut self.block
    }

    #[must_use]
    pub fn pins(&self) -> &M {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut M {
        &mut self.pins
    }

    /// Gives the collaborators back.
    #[must_use]
    pub fn release(self) -> (B, M, K) {
        (self.block, self.pins, self.clock)
    }

    fn install(&mut self, config: AdcConfig) {
        let (derived, defaults) = DerivedParams::compute(&config, &self.block);
        self.setup = Some(Setup { config, derived });
        self.calibration = defaults;
        self.staged = defaults;
        self.results.clear();
        self.observer = None;
        self.counter = ConversionCounter::default();
        self.mask = 0;
        self.status = AdcStatus::new();
    }

    /// The block is captured by this driver, not released or handed over.
    fn owns_block(&self) -> bool {
        self.block.lock_owner() == Some(LockOwner::Adc)
    }

    fn release_block(&mut self) -> Result<(), AdcError> {
        if self.is_end_conversion().is_err() {
            return Err(AdcError::HwBusy);
        }
        self.block.release(LockOwner::Adc).map_err(|err| {
            warn!("csdadc: release refused: {:?}", err);
            AdcError::HwLocked
        })?;
        self.clear_channels();
        Ok(())
    }

    fn num_channels(&self) -> u8 {
        self.setup
            .as_ref()
            .map_or(0, |setup| setup.config.num_channels())
    }

    fn init_time_us(&self) -> u8 {
        self.setup
            .as_ref()
            .map_or(0, |setup| setup.config.csd_init_time_us)
    }

    fn pin(&self, channel: u8) -> Option<ChannelPin> {
        self.setup
            .as_ref()
            .and_then(|setup| setup.config.pin(channel))
    }

    fn idac_code(&self) -> u32 {
        self.setup
            .as_ref()
            .map_or(0, |setup| u32::from(setup.derived.idac))
    }

    /// Programs clocks, IDAC, sequencer timing and the switch matrix.
    fn configure(&mut self) {
        let Some(setup) = self.setup.as_ref() else {
            return;
        };
        let config = &setup.config;
        let derived = setup.derived;

        let (kind, index) = (config.divider_kind, config.divider_index);
        let divider = u32::from(config.oper_clk_divider) - 1;
        self.clock.disable_divider(kind, index);
        if kind.is_fractional() {
            self.clock.set_fractional_divider(kind, index, divider, 0);
        } else {
            self.clock.set_divider(kind, index, divider);
        }
        self.clock.enable_divider(kind, index);

        let block = &mut self.block;
        block.write(Register::SensePeriod, u32::from(derived.sense_divider) - 1);
        block.write(Register::Config, bits::CONFIG_DEFAULT);
        block.write(Register::IdacB, bits::IDACB_CONFIG | u32::from(derived.idac));
        block.write(Register::SeqTime, u32::from(derived.az_cycles) - 1);

        block.write(Register::CsdCmp, 0);
        block.write(Register::SwDsiSel, 0);
        block.write(Register::SenseDuty, 0);
        block.write(Register::SeqInitCnt, 1);
        block.write(Register::SeqNormCnt, 2);

        block.write(Register::SwHsPosSel, bits::SW_HSP_DEFAULT);
        block.write(Register::SwHsNegSel, bits::SW_HSN_DEFAULT);
        block.write(Register::SwShieldSel, bits::SW_SHIELD_DEFAULT);
        block.write(Register::SwCmpPosSel, bits::SW_CMPP_DEFAULT);
        block.write(Register::SwCmpNegSel, bits::SW_CMPN_DEFAULT);
        block.write(Register::SwFwModSel, bits::SW_FWMOD_DEFAULT);
        block.write(Register::SwFwTankSel, bits::SW_FWTANK_DEFAULT);
        block.write(Register::SwRefgenSel, bits::SW_REFGEN_SGR_SRSS);
        self.set_bypass(true);

        let block = &mut self.block;
        block.write(
            Register::Refgen,
            bits::REFGEN_NORM | (u32::from(derived.vref_gain) << bits::REFGEN_GAIN_SHIFT),
        );
        block.write(Register::SwAmuxbufSel, bits::SW_AMUXBUF_NORM);
        block.write(Register::Hscmp, bits::HSCMP_AZ_DEFAULT);
    }

    /// Sets or clears the bus bypass switches without disturbing other bits.
    fn set_bypass(&mut self, connected: bool) {
        let block = &mut self.block;
        critical_section::with(|_| {
            let current = block.read(Register::SwBypSel);
            let next = if connected {
                current | bits::SW_BYP_DEFAULT
            } else {
                current & !bits::SW_BYP_DEFAULT
            };
            block.write(Register::SwBypSel, next);
        });
    }

    /// Exposes the supply rail on the sensing bus instead of AMUX-B.
    fn route_supply(&mut self) {
        self.set_bypass(false);
        self.block
            .write(Register::SwShieldSel, bits::SW_SHIELD_VDDA_TO_BUS_B);
    }

    /// Reconnects AMUX-B and disconnects the supply rail.
    fn route_bus(&mut self) {
        self.block.write(Register::SwShieldSel, bits::SW_SHIELD_DEFAULT);
        self.set_bypass(true);
    }

    fn connect(&mut self, channel: u8) {
        let Some(pin) = self.pin(channel) else {
            return;
        };
        let pins = &mut self.pins;
        critical_section::with(|_| {
            pins.set_routing(pin, PinRouting::AmuxBusB);
            pins.set_drive_mode(pin, DriveMode::Analog);
        });
        self.active = Some(channel);
    }

    fn disconnect(&mut self, channel: u8) {
        if let Some(pin) = self.pin(channel) {
            let pins = &mut self.pins;
            critical_section::with(|_| pins.set_routing(pin, PinRouting::Gpio));
        }
        if self.active == Some(channel) {
            self.active = None;
        }
    }

    fn disconnect_active(&mut self) {
        if let Some(channel) = self.active {
            self.disconnect(channel);
        }
    }

    /// Routes every configured pin back to GPIO.
    fn clear_channels(&mut self) {
        if let Some(setup) = self.setup.as_ref() {
            let pins = &mut self.pins;
            for pin in &setup.config.channels {
                critical_section::with(|_| pins.set_routing(*pin, PinRouting::Gpio));
            }
        }
        self.active = None;
    }

    fn clear_channels_of(&mut self, config: &AdcConfig) {
        let pins = &mut self.pins;
        for pin in &config.channels {
            critical_section::with(|_| pins.set_routing(*pin, PinRouting::Gpio));
        }
        self.active = None;
    }

    fn mask_interrupts(&mut self) {
        self.block.write(Register::IntrMask, bits::INTR_MASK_CLEAR);
    }

    fn clear_interrupts(&mut self) {
        self.block.write(Register::Intr, bits::INTR_ALL);
        let _ = self.block.read(Register::Intr);
    }

    fn write_idac(&mut self) {
        let code = self.idac_code();
        self.block.write(Register::IdacB, bits::IDACB_CONFIG | code);
    }

    fn acq_field(&self) -> u32 {
        self.setup
            .as_ref()
            .map_or(0, |setup| u32::from(setup.derived.acq_cycles.max(1)) - 1)
    }

    /// Arms one interrupt-driven measurement.
    fn start_fsm(&mut self, mode: MeasureMode) {
        let ctl = (mode.bits() << bits::ADC_CTL_MEAS_POS) | self.acq_field();
        self.block.write(Register::AdcCtl, ctl);

        let start = if mode == MeasureMode::Off {
            bits::SEQ_ABORT
        } else {
            bits::SEQ_AZ0_SKIP | bits::SEQ_AZ1_SKIP | bits::SEQ_START
        };
        self.block.write(Register::IntrMask, bits::INTR_ADC_RES);
        self.block.write(Register::SeqStart, start);
    }

    /// Abandons whatever phase is in flight and returns to idle.
    fn abandon(&mut self) {
        if self.status.phase() == Phase::Calibrating(CalibrationStep::VddaToVref) {
            self.route_bus();
        }
        self.disconnect_active();
        self.status.finish();
    }
}
