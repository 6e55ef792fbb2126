//! Blocking supply and aux-bus measurements.
//!
//! These bypass the dispatcher: interrupts stay masked and each step polls
//! the interrupt status register under the shared watchdog.

use super::{CsdAdc, WATCHDOG_CYCLES};
use crate::config::Range;
use crate::error::AdcError;
use crate::hal::{CsdBlock, LockOwner, MeasureMode, PeriClock, PinMux, Register, bits};
use crate::interpret::{RawResult, correct_mismatch, interpret, supply_millivolts};

impl<B, M, K> CsdAdc<'_, B, M, K>
where
    B: CsdBlock,
    M: PinMux,
    K: PeriClock,
{
    /// Measures the analog supply in millivolts.
    ///
    /// Runs the three calibration measurements back to back without
    /// touching the stored calibration.
    pub fn measure_supply_voltage(&mut self) -> Result<u16, AdcError> {
        if self.setup.is_none() {
            return Err(AdcError::NotInitialized);
        }
        self.prepare_blocking()?;

        let outcome = self.supply_steps();
        self.status.finish();

        let mv = outcome.inspect_err(|_| warn!("csdadc: supply measurement failed"))?;
        self.supply_mv = Some(mv);
        Ok(mv)
    }

    /// Measures whatever the application routed onto AMUX-B, in millivolts.
    ///
    /// A de-initialised driver with a stored configuration is captured and
    /// recalibrated first.
    pub fn measure_aux_bus_voltage(&mut self) -> Result<u16, AdcError> {
        let Some(config) = self.setup.as_ref().map(|setup| setup.config.clone()) else {
            return Err(AdcError::NotInitialized);
        };
        if self.is_end_conversion().is_err() {
            return Err(AdcError::MeasurementFailed);
        }

        if !self.status.initialized() {
            if self.block.lock_owner() != Some(LockOwner::Adc) {
                self.restore().map_err(|_| AdcError::MeasurementFailed)?;
            }
            self.write_config(config)
                .map_err(|_| AdcError::MeasurementFailed)?;
        }
        self.prepare_blocking()?;

        let outcome = self.start_and_wait(MeasureMode::Vin);
        self.status.finish();
        let raw = outcome.inspect_err(|_| warn!("csdadc: aux-bus measurement failed"))?;

        let range = self
            .config()
            .map_or(Range::Vdda, |config| config.range);
        let code = interpret(raw, &self.calibration, range);
        let mv = self.calibration.to_millivolts(code);
        self.aux_bus_mv = Some(mv);
        Ok(mv)
    }

    fn prepare_blocking(&mut self) -> Result<(), AdcError> {
        if !self.owns_block() || self.is_end_conversion().is_err() {
            return Err(AdcError::MeasurementFailed);
        }
        self.status.begin_blocking();
        self.mask_interrupts();
        self.clear_interrupts();
        if self.active.is_some() {
            self.clear_channels();
        }
        self.write_idac();
        Ok(())
    }

    fn supply_steps(&mut self) -> Result<u16, AdcError> {
        let t_vssa2vref = self.start_and_wait(MeasureMode::Vref)?.count();
        let t_recover = self.start_and_wait(MeasureMode::VrefBy2)?.count();
        if t_vssa2vref == 0 {
            return Err(AdcError::MeasurementFailed);
        }

        self.route_supply();
        let discharge = self.start_and_wait(MeasureMode::Vin);
        self.route_bus();
        let t_vdda2vref = discharge?.count();

        let corrected = correct_mismatch(t_vdda2vref, t_recover, t_vssa2vref);
        Ok(supply_millivolts(
            self.calibration.vref_mv,
            t_vssa2vref,
            corrected,
        ))
    }

    /// Runs one measurement with interrupts masked and polls for completion.
    fn start_and_wait(&mut self, mode: MeasureMode) -> Result<RawResult, AdcError> {
        let ctl = (mode.bits() << bits::ADC_CTL_MEAS_POS) | self.acq_field();
        self.block.write(Register::AdcCtl, ctl);
        self.block.write(
            Register::SeqStart,
            bits::SEQ_AZ0_SKIP | bits::SEQ_AZ1_SKIP | bits::SEQ_START,
        );

        let mut watchdog = WATCHDOG_CYCLES;
        while self.block.read(Register::Intr) & bits::INTR_ADC_RES == 0 && watchdog != 0 {
            watchdog -= 1;
        }
        self.clear_interrupts();

        if watchdog == 0 {
            return Err(AdcError::MeasurementFailed);
        }
        let raw = RawResult::new(self.block.read(Register::AdcRes));
        if raw.is_abort() || raw.is_overflow() {
            return Err(AdcError::MeasurementFailed);
        }
        Ok(raw)
    }
}
