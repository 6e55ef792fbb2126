//! Conversion scheduler: start, stop, progress and result readback.

use super::{CsdAdc, WATCHDOG_CYCLES};
use crate::error::AdcError;
use crate::hal::{CsdBlock, MeasureMode, PeriClock, PinMux, Register, bits};
use crate::status::{ConversionCounter, ConversionMode, Phase, StopMode};

impl<B, M, K> CsdAdc<'_, B, M, K>
where
    B: CsdBlock,
    M: PinMux,
    K: PeriClock,
{
    /// Starts converting the channels set in `mask`, lowest channel first.
    ///
    /// Returns once the first measurement is armed; the interrupt dispatcher
    /// walks the remaining channels.
    pub fn start_convert(&mut self, mode: ConversionMode, mask: u32) -> Result<(), AdcError> {
        if mask == 0 {
            return Err(AdcError::BadParam);
        }
        if !self.status.initialized() || self.setup.is_none() {
            return Err(AdcError::NotInitialized);
        }
        if !self.owns_block() {
            return Err(AdcError::HwLocked);
        }
        if self.is_end_conversion().is_err() {
            return Err(AdcError::HwBusy);
        }
        if !self.status.enabled() {
            return Err(AdcError::NotInitialized);
        }

        let previous_mask = self.mask;
        self.mask = mask;
        let Some(first) = self.next_channel(0) else {
            self.mask = previous_mask;
            return Err(AdcError::BadParam);
        };

        self.status.set_mode(mode);
        if self.active != Some(first) {
            self.disconnect_active();
            self.connect(first);
        }

        self.counter = ConversionCounter::start(first);
        self.status.clear_stop();
        self.status.begin(Phase::Converting);
        trace!("csdadc: converting mask={} from channel {}", mask, first);
        self.start_fsm(MeasureMode::Vin);
        Ok(())
    }

    /// Stops a running conversion.
    ///
    /// [`StopMode::Immediate`] aborts the sequencer and waits for it to go
    /// idle; the in-flight result is discarded. The cooperative modes are
    /// honoured by the dispatcher at the next channel or pass boundary and
    /// are a no-op while nothing is converting.
    pub fn stop_convert(&mut self, stop: StopMode) -> Result<(), AdcError> {
        if !self.status.initialized() {
            return Err(AdcError::NotInitialized);
        }

        match stop {
            // Nothing of ours can be running on a block we handed over.
            StopMode::Immediate if !self.owns_block() => Ok(()),
            StopMode::Immediate => {
                self.mask_interrupts();
                self.block.write(Register::SeqStart, bits::SEQ_ABORT);

                let mut watchdog = WATCHDOG_CYCLES;
                while self.block.is_busy() && watchdog != 0 {
                    watchdog -= 1;
                }
                self.clear_interrupts();
                self.abandon();

                if watchdog == 0 {
                    warn!("csdadc: sequencer did not confirm abort");
                    return Err(AdcError::Timeout);
                }
                Ok(())
            }
            StopMode::AfterCurrentChannel | StopMode::AfterFullCycle => {
                if self.status.phase() == Phase::Converting {
                    debug!("csdadc: stop requested: {:?}", stop);
                    self.status.request_stop(stop);
                }
                Ok(())
            }
        }
    }

    /// Reports whether the driver is free for a new operation.
    ///
    /// `Overflow` wins over `HwBusy` and stays latched until the next
    /// successful calibration.
    pub fn is_end_conversion(&self) -> Result<(), AdcError> {
        let hw_overflow = self.block.read(Register::AdcRes) & bits::ADC_RES_OVERFLOW != 0;
        if self.status.overflow() || (hw_overflow && self.status.busy()) {
            Err(AdcError::Overflow)
        } else if self.status.busy() {
            Err(AdcError::HwBusy)
        } else {
            Ok(())
        }
    }

    /// Progress counter of the current or last run.
    #[must_use]
    pub fn conversion_status(&self) -> ConversionCounter {
        self.counter
    }

    /// Last code converted on `channel`, `None` for an unknown channel.
    #[must_use]
    pub fn result(&self, channel: u8) -> Option<u16> {
        self.configured_result(channel).map(|result| result.code)
    }

    /// Last millivolt reading of `channel`, `None` for an unknown channel.
    #[must_use]
    pub fn result_voltage(&self, channel: u8) -> Option<u16> {
        self.configured_result(channel)
            .map(|result| result.millivolts)
    }

    fn configured_result(&self, channel: u8) -> Option<super::ChannelResult> {
        if channel >= self.num_channels() {
            return None;
        }
        self.results.get(channel)
    }

    /// Lowest channel at or above `from` that is both configured and in the mask.
    pub(super) fn next_channel(&self, from: u8) -> Option<u8> {
        (from..self.num_channels()).find(|channel| self.mask & (1u32 << channel) != 0)
    }
}
