mod common;

use std::sync::atomic::{AtomicU32, Ordering};

use common::{
    CALIBRATION_SCRIPT, RecordingDelay, SimBlock, calibrated_adc, fire, new_adc, pins, sinking,
    sourcing, two_channel_config,
};
use csdadc_core::hal::bits;
use csdadc_core::{
    AdcConfig, AdcError, ChannelPin, ChannelResults, ConversionCounter, ConversionMode, Phase,
    StopMode,
};

#[test]
fn single_shot_converts_both_channels() {
    let mut adc = calibrated_adc(two_channel_config());
    adc.block_mut().push(sourcing(1000));
    adc.block_mut().push(sinking(500));

    adc.start_convert(ConversionMode::SingleShot, 0b11)
        .expect("conversion starts");
    assert_eq!(adc.is_end_conversion(), Err(AdcError::HwBusy));
    assert!(adc.block().interrupts_enabled());

    assert!(fire(&mut adc));
    assert_eq!(adc.is_end_conversion(), Err(AdcError::HwBusy));
    assert!(fire(&mut adc));

    assert_eq!(adc.is_end_conversion(), Ok(()));
    assert_eq!(adc.result(0), Some(330));
    assert_eq!(adc.result_voltage(0), Some(1066));
    assert_eq!(adc.result(1), Some(842));
    assert_eq!(adc.result_voltage(1), Some(2721));

    let counter = adc.conversion_status();
    assert_eq!(counter.channel(), 1);
    assert_eq!(counter.cycle(), 0);
    assert_eq!(adc.active_channel(), None);
    assert!(!fire(&mut adc), "no further measurement is armed");
}

#[test]
fn mask_is_walked_from_lowest_channel() {
    let config = AdcConfig::new(&pins(3)).expect("three channels fit");
    let mut adc = calibrated_adc(config);
    adc.pins_mut().reset_log();
    adc.block_mut().push(sourcing(1500));
    adc.block_mut().push(sourcing(1500));

    adc.start_convert(ConversionMode::SingleShot, 0b101)
        .expect("conversion starts");
    assert_eq!(adc.active_channel(), Some(0));
    assert!(fire(&mut adc));
    assert_eq!(adc.active_channel(), Some(2));
    assert!(fire(&mut adc));

    assert_eq!(
        adc.pins().connected_order(),
        vec![ChannelPin::new(2, 0), ChannelPin::new(2, 2)]
    );
    assert_eq!(adc.result(1), Some(0), "channel 1 was not in the mask");
}

#[test]
fn connects_and_disconnects_are_paired() {
    let config = AdcConfig::new(&pins(4)).expect("four channels fit");
    let mut adc = calibrated_adc(config);
    adc.pins_mut().reset_log();
    for _ in 0..4 {
        adc.block_mut().push(sourcing(900));
    }

    adc.start_convert(ConversionMode::SingleShot, 0b1111)
        .expect("conversion starts");
    while fire(&mut adc) {
        assert!(adc.pins().connected.len() <= 1);
    }

    let pins = adc.pins();
    assert_eq!(pins.connects(), 4);
    assert_eq!(pins.disconnects_of_connected(), 4);
    assert_eq!(pins.max_connected, 1, "never two channels on the bus");
    assert!(pins.connected.is_empty());
    assert_eq!(pins.drive_modes.len(), 4, "each connect sets analog drive");
}

#[test]
fn only_one_operation_in_flight() {
    let mut adc = calibrated_adc(two_channel_config());
    adc.block_mut().push(sourcing(1000));

    adc.start_convert(ConversionMode::SingleShot, 0b01)
        .expect("conversion starts");
    assert_eq!(
        adc.start_convert(ConversionMode::SingleShot, 0b10),
        Err(AdcError::HwBusy)
    );
    assert_eq!(adc.calibrate(), Err(AdcError::HwBusy));

    assert!(fire(&mut adc));
    adc.block_mut().push(sourcing(1000));
    assert_eq!(adc.start_convert(ConversionMode::SingleShot, 0b10), Ok(()));
}

#[test]
fn stop_after_current_channel_yields_one_result() {
    let mut adc = calibrated_adc(two_channel_config());
    for _ in 0..4 {
        adc.block_mut().push(sourcing(1000));
    }

    adc.start_convert(ConversionMode::Continuous, 0b11)
        .expect("conversion starts");
    adc.stop_convert(StopMode::AfterCurrentChannel)
        .expect("stop accepted");
    assert_eq!(adc.is_end_conversion(), Err(AdcError::HwBusy));

    assert!(fire(&mut adc));
    assert_eq!(adc.is_end_conversion(), Ok(()));
    assert_eq!(adc.result(0), Some(330));
    assert_eq!(adc.result(1), Some(0), "no partial result for channel 1");
    assert_eq!(adc.active_channel(), None);
    assert!(!fire(&mut adc));
    assert_eq!(adc.block().script.len(), 3, "no further measurement started");
}

#[test]
fn stop_after_full_cycle_finishes_the_pass() {
    let mut adc = calibrated_adc(two_channel_config());
    for _ in 0..4 {
        adc.block_mut().push(sourcing(1000));
    }
    let cycles = AtomicU32::new(0);
    let mut observer = |_: &ChannelResults, _: ConversionCounter| {
        cycles.fetch_add(1, Ordering::Relaxed);
    };
    adc.register_callback(&mut observer);

    adc.start_convert(ConversionMode::Continuous, 0b11)
        .expect("conversion starts");
    assert!(fire(&mut adc));
    adc.stop_convert(StopMode::AfterFullCycle)
        .expect("stop accepted");
    assert!(fire(&mut adc));

    assert_eq!(adc.is_end_conversion(), Ok(()));
    assert_eq!(adc.result(1), Some(330));
    assert_eq!(cycles.load(Ordering::Relaxed), 0, "stopped pass does not notify");
    assert!(!fire(&mut adc));
}

#[test]
fn continuous_mode_wraps_and_notifies() {
    let mut adc = calibrated_adc(two_channel_config());
    for _ in 0..6 {
        adc.block_mut().push(sourcing(1000));
    }
    let cycles = AtomicU32::new(0);
    let last_channel = AtomicU32::new(u32::MAX);
    let mut observer = |results: &ChannelResults, counter: ConversionCounter| {
        assert_eq!(results.get(1).map(|r| r.code), Some(330));
        last_channel.store(u32::from(counter.channel()), Ordering::Relaxed);
        cycles.fetch_add(1, Ordering::Relaxed);
    };
    adc.register_callback(&mut observer);

    adc.start_convert(ConversionMode::Continuous, 0b11)
        .expect("conversion starts");
    for _ in 0..4 {
        assert!(fire(&mut adc));
    }

    assert_eq!(cycles.load(Ordering::Relaxed), 2);
    assert_eq!(last_channel.load(Ordering::Relaxed), 1);
    let counter = adc.conversion_status();
    assert_eq!(counter.cycle(), 2);
    assert_eq!(counter.channel(), 0);
    assert_eq!(adc.is_end_conversion(), Err(AdcError::HwBusy));

    adc.stop_convert(StopMode::Immediate).expect("abort confirmed");
    assert_eq!(adc.is_end_conversion(), Ok(()));
    assert_eq!(adc.active_channel(), None);
    assert!(adc.pins().connected.is_empty());
}

#[test]
fn unregistered_observer_is_not_called() {
    let mut adc = calibrated_adc(two_channel_config());
    for _ in 0..2 {
        adc.block_mut().push(sourcing(1000));
    }
    let cycles = AtomicU32::new(0);
    let mut observer = |_: &ChannelResults, _: ConversionCounter| {
        cycles.fetch_add(1, Ordering::Relaxed);
    };
    adc.register_callback(&mut observer);
    assert!(adc.unregister_callback().is_some());

    adc.start_convert(ConversionMode::Continuous, 0b11)
        .expect("conversion starts");
    fire(&mut adc);
    fire(&mut adc);

    assert_eq!(adc.conversion_status().cycle(), 1);
    assert_eq!(cycles.load(Ordering::Relaxed), 0);
}

#[test]
fn immediate_stop_reports_timeout_when_sequencer_hangs() {
    let mut adc = calibrated_adc(two_channel_config());
    adc.block_mut().stuck = true;
    adc.block_mut().ignore_abort = true;

    adc.start_convert(ConversionMode::SingleShot, 0b1)
        .expect("conversion starts");
    assert_eq!(adc.stop_convert(StopMode::Immediate), Err(AdcError::Timeout));

    assert_eq!(adc.status().phase(), Phase::Idle);
    assert_eq!(adc.active_channel(), None);
    assert!(!adc.block().interrupts_enabled());
}

#[test]
fn overflow_latches_until_recalibration() {
    let mut adc = calibrated_adc(two_channel_config());
    adc.block_mut().push(bits::ADC_RES_OVERFLOW | 0xFFFF);

    adc.start_convert(ConversionMode::Continuous, 0b11)
        .expect("conversion starts");
    assert!(fire(&mut adc));

    assert_eq!(adc.is_end_conversion(), Err(AdcError::Overflow));
    assert!(!adc.status().busy(), "overflow ends the run");
    assert_eq!(adc.active_channel(), None);
    assert_eq!(
        adc.start_convert(ConversionMode::SingleShot, 0b1),
        Err(AdcError::HwBusy)
    );

    adc.block_mut().script.extend(CALIBRATION_SCRIPT);
    adc.calibrate().expect("recalibration succeeds");
    assert_eq!(adc.is_end_conversion(), Ok(()));
}

#[test]
fn hardware_abort_discards_result() {
    let mut adc = calibrated_adc(two_channel_config());
    adc.block_mut().push(bits::ADC_RES_ABORT | 10);

    adc.start_convert(ConversionMode::SingleShot, 0b11)
        .expect("conversion starts");
    assert!(fire(&mut adc));

    assert_eq!(adc.is_end_conversion(), Ok(()));
    assert_eq!(adc.result(0), Some(0));
    assert_eq!(adc.active_channel(), None);
}

#[test]
fn start_validates_arguments() {
    let mut adc = new_adc(SimBlock::new());
    assert_eq!(
        adc.start_convert(ConversionMode::SingleShot, 0),
        Err(AdcError::BadParam)
    );
    assert_eq!(
        adc.start_convert(ConversionMode::SingleShot, 0b1),
        Err(AdcError::NotInitialized)
    );

    let mut adc = calibrated_adc(two_channel_config());
    assert_eq!(
        adc.start_convert(ConversionMode::SingleShot, 0b100),
        Err(AdcError::BadParam),
        "mask selects no configured channel"
    );
    assert_eq!(adc.is_end_conversion(), Ok(()));
}

#[test]
fn start_requires_completed_enable() {
    let mut adc = new_adc(SimBlock::with_script(&CALIBRATION_SCRIPT));
    adc.init(two_channel_config(), &mut RecordingDelay::default())
        .expect("init succeeds");
    assert!(!adc.status().enabled());
    assert_eq!(
        adc.start_convert(ConversionMode::SingleShot, 0b1),
        Err(AdcError::NotInitialized)
    );
    assert!(adc.block().starts.is_empty());

    adc.enable().expect("calibration succeeds");
    assert!(adc.status().enabled());
    adc.block_mut().push(sourcing(1000));
    adc.start_convert(ConversionMode::SingleShot, 0b1)
        .expect("enabled driver converts");
}

#[test]
fn cooperative_stop_while_idle_is_ignored() {
    let mut adc = calibrated_adc(two_channel_config());
    adc.stop_convert(StopMode::AfterCurrentChannel)
        .expect("stop accepted");
    assert_eq!(adc.status().pending_stop(), None);

    adc.block_mut().push(sourcing(1000));
    adc.block_mut().push(sourcing(1000));
    adc.start_convert(ConversionMode::SingleShot, 0b11)
        .expect("conversion starts");
    assert!(fire(&mut adc));
    assert!(fire(&mut adc), "second channel still converts");
}

#[test]
fn results_outside_configuration_are_absent() {
    let adc = calibrated_adc(two_channel_config());
    assert_eq!(adc.result(2), None);
    assert_eq!(adc.result_voltage(31), None);
    assert_eq!(adc.result(0), Some(0));
}
