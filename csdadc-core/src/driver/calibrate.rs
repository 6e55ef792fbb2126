//! Calibration engine.
//!
//! Phase advancement happens in the completion interrupt; [`CsdAdc::calibrate`]
//! only arms the first phase and waits for the dispatcher to reach idle.
//! Measured constants are staged and committed after the last phase, so a
//! failed run leaves the previous calibration in place.

use super::{CsdAdc, WATCHDOG_CYCLES};
use crate::config::Range;
use crate::error::AdcError;
use crate::hal::{CsdBlock, MeasureMode, PeriClock, PinMux, Register, bits};
use crate::interpret::{RawResult, correct_mismatch, supply_millivolts};
use crate::status::{CalibrationStep, Phase};

impl<B, M, K> CsdAdc<'_, B, M, K>
where
    B: CsdBlock,
    M: PinMux,
    K: PeriClock,
{
    /// Runs the full calibration sequence for the configured range.
    ///
    /// Blocks for at most `0xFFFF` polls. Completion interrupts
    /// that are pending while waiting are dispatched from here, so the call
    /// also finishes when the platform holds interrupts off.
    pub fn calibrate(&mut self) -> Result<(), AdcError> {
        if !self.status.initialized() || self.setup.is_none() {
            return Err(AdcError::NotInitialized);
        }
        if !self.owns_block() {
            return Err(AdcError::HwLocked);
        }
        if self.status.busy() || self.block.is_busy() {
            return Err(AdcError::HwBusy);
        }

        if self.active.is_some() {
            self.clear_channels();
        }
        self.write_idac();

        self.staged = self.calibration;
        self.status.clear_overflow();
        self.status
            .begin(Phase::Calibrating(CalibrationStep::VssaToVref));
        self.start_fsm(MeasureMode::Vref);

        let mut watchdog = WATCHDOG_CYCLES;
        while self.status.phase() != Phase::Idle && watchdog != 0 {
            if self.block.read(Register::Intr) & bits::INTR_ADC_RES != 0 {
                self.on_interrupt();
            }
            watchdog -= 1;
        }

        if self.status.phase() != Phase::Idle {
            self.mask_interrupts();
            self.block.write(Register::SeqStart, bits::SEQ_ABORT);
            self.clear_interrupts();
            self.abandon();
            warn!("csdadc: calibration watchdog expired");
            return Err(AdcError::CalibrationFailed);
        }

        if self.status.overflow() {
            warn!("csdadc: calibration overflowed");
            return Err(AdcError::CalibrationFailed);
        }

        info!(
            "csdadc: calibrated t_vssa2vref={} t_recover={} t_vdda2vref={} t_full={} vmax={}mV",
            self.calibration.t_vssa2vref,
            self.calibration.t_recover,
            self.calibration.t_vdda2vref,
            self.calibration.t_full,
            self.calibration.v_max_mv
        );
        Ok(())
    }

    /// Consumes the result of one calibration phase and arms the next one.
    pub(super) fn advance_calibration(&mut self, step: CalibrationStep, raw: RawResult) {
        let count = raw.count();
        if count == 0 {
            // A zero count would become a divisor below.
            self.status.latch_overflow();
            self.abandon();
            return;
        }

        let range = self
            .setup
            .as_ref()
            .map_or(Range::Vref, |setup| setup.config.range);

        match step {
            CalibrationStep::VssaToVref => {
                self.staged.t_vssa2vref = count;
                match range {
                    Range::Vdda => {
                        self.status
                            .begin(Phase::Calibrating(CalibrationStep::Recover));
                        self.start_fsm(MeasureMode::VrefBy2);
                    }
                    Range::Vref => {
                        self.staged.v_max_mv = self.staged.vref_mv;
                        self.staged.t_full = count;
                        self.commit_calibration();
                    }
                }
            }
            CalibrationStep::Recover => {
                self.staged.t_recover = count;
                self.route_supply();
                self.status
                    .begin(Phase::Calibrating(CalibrationStep::VddaToVref));
                self.start_fsm(MeasureMode::Vin);
            }
            CalibrationStep::VddaToVref => {
                self.route_bus();
                let staged = &mut self.staged;
                let t_vdda2vref = correct_mismatch(count, staged.t_recover, staged.t_vssa2vref);
                staged.t_vdda2vref = t_vdda2vref;
                staged.t_full = staged.t_vssa2vref.saturating_add(t_vdda2vref);
                staged.v_max_mv = supply_millivolts(staged.vref_mv, staged.t_vssa2vref, t_vdda2vref);
                self.commit_calibration();
            }
        }
    }

    fn commit_calibration(&mut self) {
        self.calibration = self.staged;
        self.status.finish();
        debug!("csdadc: calibration committed");
    }
}
