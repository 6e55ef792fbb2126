//! Driver state machine vocabulary.
//!
//! The hardware status word of the block is modelled as a tagged [`Phase`]
//! plus independent flags in [`AdcStatus`]. Transitions go through
//! [`AdcStatus::begin`] and [`AdcStatus::finish`] so `busy` can never
//! disagree with the phase.

/// One of the three calibration measurements.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationStep {
    /// Charge from ground to the reference.
    VssaToVref,
    /// Recharge after a half-period sink, exposes the sink/source mismatch.
    Recover,
    /// Discharge from the supply down to the reference.
    VddaToVref,
}

/// What the next completion interrupt will be interpreted as.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Idle,
    Calibrating(CalibrationStep),
    Converting,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConversionMode {
    /// One pass over the enabled channels.
    SingleShot,
    /// Pass after pass until stopped.
    Continuous,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopMode {
    /// Abort the sequencer now and discard the in-flight result.
    Immediate,
    /// Finish the channel being converted, then go idle.
    AfterCurrentChannel,
    /// Finish the pass over the enabled channels, then go idle.
    AfterFullCycle,
}

/// Software status of the driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcStatus {
    initialized: bool,
    /// Set once [`CsdAdc::enable`](crate::CsdAdc::enable) has completed.
    enabled: bool,
    busy: bool,
    overflow: bool,
    phase: Phase,
    mode: ConversionMode,
    pending_stop: Option<StopMode>,
}

impl Default for AdcStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcStatus {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initialized: false,
            enabled: false,
            busy: false,
            overflow: false,
            phase: Phase::Idle,
            mode: ConversionMode::SingleShot,
            pending_stop: None,
        }
    }

    #[must_use]
    pub const fn initialized(&self) -> bool {
        self.initialized
    }

    /// Block programmed and calibrated at least once since the last
    /// (re)configuration.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn busy(&self) -> bool {
        self.busy
    }

    /// Latched when a conversion saturated the hardware timer.
    #[must_use]
    pub const fn overflow(&self) -> bool {
        self.overflow
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn mode(&self) -> ConversionMode {
        self.mode
    }

    #[must_use]
    pub const fn pending_stop(&self) -> Option<StopMode> {
        self.pending_stop
    }

    pub(crate) fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_mode(&mut self, mode: ConversionMode) {
        self.mode = mode;
    }

    pub(crate) fn request_stop(&mut self, stop: StopMode) {
        self.pending_stop = Some(stop);
    }

    pub(crate) fn clear_stop(&mut self) {
        self.pending_stop = None;
    }

    pub(crate) fn latch_overflow(&mut self) {
        self.overflow = true;
    }

    pub(crate) fn clear_overflow(&mut self) {
        self.overflow = false;
    }

    /// Enters `phase`, marking the driver busy unless it is [`Phase::Idle`].
    pub(crate) fn begin(&mut self, phase: Phase) {
        self.phase = phase;
        self.busy = phase != Phase::Idle;
    }

    /// Marks a blocking measurement in flight without a dispatcher phase.
    pub(crate) fn begin_blocking(&mut self) {
        self.phase = Phase::Idle;
        self.busy = true;
    }

    /// Returns to idle and drops any pending stop request.
    pub(crate) fn finish(&mut self) {
        self.phase = Phase::Idle;
        self.busy = false;
        self.pending_stop = None;
    }
}

/// Progress counter readable while a conversion runs.
///
/// Bits 27..31 hold the channel most recently started, bits 0..26 the
/// number of completed continuous passes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConversionCounter(u32);

impl ConversionCounter {
    pub const CHANNEL_POS: u32 = 27;
    pub const CHANNEL_MASK: u32 = 0xF800_0000;
    pub const CYCLE_MASK: u32 = 0x07FF_FFFF;

    /// Counter positioned on `channel` with no completed passes.
    #[must_use]
    pub const fn start(channel: u8) -> Self {
        Self(((channel as u32) << Self::CHANNEL_POS) & Self::CHANNEL_MASK)
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn channel(self) -> u8 {
        ((self.0 & Self::CHANNEL_MASK) >> Self::CHANNEL_POS) as u8
    }

    #[must_use]
    pub const fn cycle(self) -> u32 {
        self.0 & Self::CYCLE_MASK
    }

    pub(crate) fn set_channel(&mut self, channel: u8) {
        self.0 = (self.0 & !Self::CHANNEL_MASK)
            | ((u32::from(channel) << Self::CHANNEL_POS) & Self::CHANNEL_MASK);
    }

    /// Counts one completed pass; the cycle field never reaches all ones.
    pub(crate) fn complete_cycle(&mut self) {
        let mut cycle = self.cycle() + 1;
        if cycle == Self::CYCLE_MASK {
            cycle = 0;
        }
        self.0 = (self.0 & Self::CHANNEL_MASK) | cycle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_tracks_phase() {
        let mut status = AdcStatus::new();
        assert!(!status.busy());

        status.begin(Phase::Calibrating(CalibrationStep::VssaToVref));
        assert!(status.busy());

        status.begin(Phase::Converting);
        status.request_stop(StopMode::AfterFullCycle);
        assert!(status.busy());

        status.finish();
        assert!(!status.busy());
        assert_eq!(status.phase(), Phase::Idle);
        assert_eq!(status.pending_stop(), None);
    }

    #[test]
    fn finish_keeps_initialized_and_overflow() {
        let mut status = AdcStatus::new();
        status.set_initialized(true);
        status.latch_overflow();
        status.begin(Phase::Converting);
        status.finish();

        assert!(status.initialized());
        assert!(status.overflow());
    }

    #[test]
    fn counter_packs_channel_and_cycle() {
        let mut counter = ConversionCounter::start(5);
        assert_eq!(counter.channel(), 5);
        assert_eq!(counter.cycle(), 0);

        counter.set_channel(31);
        counter.complete_cycle();
        counter.complete_cycle();
        assert_eq!(counter.channel(), 31);
        assert_eq!(counter.cycle(), 2);
        assert_eq!(counter.bits(), (31 << 27) | 2);
    }

    #[test]
    fn counter_cycle_wraps_before_saturating() {
        let mut counter =
            ConversionCounter::from_bits((3 << 27) | (ConversionCounter::CYCLE_MASK - 1));
        counter.complete_cycle();
        assert_eq!(counter.cycle(), 0);
        assert_eq!(counter.channel(), 3);
    }
}
