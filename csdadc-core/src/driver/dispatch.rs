//! Completion interrupt dispatcher.

use super::{ChannelResult, CsdAdc};
use crate::config::Range;
use crate::hal::{CsdBlock, MeasureMode, PeriClock, PinMux, Register};
use crate::interpret::{RawResult, interpret};
use crate::status::{ConversionMode, Phase, StopMode};

impl<B, M, K> CsdAdc<'_, B, M, K>
where
    B: CsdBlock,
    M: PinMux,
    K: PeriClock,
{
    /// Interrupt entry point; call from the sensing block's ISR.
    ///
    /// Masks and clears the block's interrupts, reads the result register
    /// once, then advances whichever phase is in flight. Interrupts are only
    /// re-enabled by the next measurement it arms. A completion that arrives
    /// while idle is ignored.
    pub fn on_interrupt(&mut self) {
        self.mask_interrupts();
        self.clear_interrupts();
        let raw = RawResult::new(self.block.read(Register::AdcRes));

        let phase = self.status.phase();
        if phase == Phase::Idle {
            trace!("csdadc: completion while idle ignored");
            return;
        }

        if raw.is_abort() {
            debug!("csdadc: sequencer aborted in {:?}", phase);
            self.abandon();
            return;
        }
        if raw.is_overflow() {
            warn!("csdadc: overflow in {:?}", phase);
            self.status.latch_overflow();
            self.abandon();
            return;
        }

        match phase {
            Phase::Calibrating(step) => self.advance_calibration(step, raw),
            Phase::Converting => self.advance_conversion(raw),
            Phase::Idle => {}
        }
    }

    fn advance_conversion(&mut self, raw: RawResult) {
        let Some(channel) = self.active else {
            // Nothing connected: the run was torn down underneath us.
            self.status.finish();
            return;
        };

        let range = self
            .setup
            .as_ref()
            .map_or(Range::Vdda, |setup| setup.config.range);
        let code = interpret(raw, &self.calibration, range);
        let millivolts = self.calibration.to_millivolts(code);
        self.results.store(channel, ChannelResult { code, millivolts });
        self.disconnect(channel);

        if self.status.pending_stop() == Some(StopMode::AfterCurrentChannel) {
            debug!("csdadc: stopped after channel {}", channel);
            self.status.finish();
            return;
        }

        if let Some(next) = self.next_channel(channel + 1) {
            self.connect(next);
            self.counter.set_channel(next);
            self.start_fsm(MeasureMode::Vin);
            return;
        }

        let stop_at_end = self.status.mode() == ConversionMode::SingleShot
            || self.status.pending_stop() == Some(StopMode::AfterFullCycle);
        if stop_at_end {
            self.status.finish();
            return;
        }

        if let Some(observer) = self.observer.as_deref_mut() {
            observer.on_cycle_complete(&self.results, self.counter);
        }

        let Some(first) = self.next_channel(0) else {
            self.status.finish();
            return;
        };
        self.connect(first);
        self.counter.set_channel(first);
        self.counter.complete_cycle();
        self.start_fsm(MeasureMode::Vin);
    }
}
