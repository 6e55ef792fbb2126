//! Status codes reported by the driver's public operations.

use core::fmt;

/// Error detail returned when an operation is rejected or fails.
///
/// Rejections (`BadParam`, `HwBusy`, `HwLocked`, `NotInitialized`) leave the
/// driver untouched. Failures (`CalibrationFailed`, `Timeout`,
/// `MeasurementFailed`) abandon the operation and keep the last known good
/// calibration. Nothing is retried automatically.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcError {
    /// An argument or configuration value is out of range.
    BadParam,
    /// The sensing block is captured by another consumer.
    HwLocked,
    /// A conversion or calibration is already in flight.
    HwBusy,
    /// The last conversion saturated the hardware timer; recalibrate.
    Overflow,
    /// Calibration did not complete within the watchdog budget.
    CalibrationFailed,
    /// The driver has not been configured yet.
    NotInitialized,
    /// The hardware did not confirm an abort within the watchdog budget.
    Timeout,
    /// A blocking measurement timed out or returned an invalid result.
    MeasurementFailed,
}

impl fmt::Display for AdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AdcError::BadParam => "invalid parameter",
            AdcError::HwLocked => "sensing block locked by another consumer",
            AdcError::HwBusy => "conversion in progress",
            AdcError::Overflow => "conversion overflow",
            AdcError::CalibrationFailed => "calibration failed",
            AdcError::NotInitialized => "driver not initialized",
            AdcError::Timeout => "hardware timeout",
            AdcError::MeasurementFailed => "measurement failed",
        };
        f.write_str(text)
    }
}

impl core::error::Error for AdcError {}
