use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use csdadc_core::hal::LockOwner;
use csdadc_core::{
    AdcConfig, AdcError, ChannelPin, ChannelResults, ConversionCounter, CsdAdc, CycleObserver,
    SleepReadiness,
};

use crate::bench::{Bench, BenchBlock, BenchClock, BenchPins, HostDelay, SharedBench};
use crate::command::{self, Command, ConfigOption};

const DEFAULT_CHANNELS: u8 = 4;
/// Port carrying the emulated channel pins.
const CHANNEL_PORT: u8 = 2;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("init", "init [channels=<n>] [range=vref|vdda] [bits=8|10] [vref=<mV>] [vdda=<mV>] [clk=<MHz>]"),
    ("config", "config <options as init>        - reconfigure and recalibrate"),
    ("deinit", "deinit                          - release the block"),
    ("calibrate", "calibrate                       - rerun calibration"),
    ("set", "set <ch>|vdda|amuxb <mV>        - drive a bench voltage"),
    ("start", "start single|cont <mask>        - start converting"),
    ("tick", "tick [n]                        - deliver up to n pending interrupts"),
    ("stop", "stop now|channel|cycle          - stop converting"),
    ("status", "status                          - driver and calibration state"),
    ("result", "result [ch]                     - last conversion results"),
    ("vdda", "vdda                            - measure the analog supply"),
    ("amuxb", "amuxb                           - measure the AMUX-B bus"),
    ("save", "save | restore                  - hand the block over and back"),
    ("capsense", "capsense take|drop              - simulate another block owner"),
    ("fault", "fault hang|overflow|clear       - inject sequencer faults"),
    ("sleep", "sleep | wakeup                  - deep-sleep check and wakeup"),
];

type BenchAdc = CsdAdc<'static, BenchBlock, BenchPins, BenchClock>;
type FeedHandle = &'static mut (dyn CycleObserver + Send);

/// Collects one line per completed continuous pass.
struct CycleFeed {
    lines: Arc<Mutex<Vec<String>>>,
    channels: Arc<AtomicUsize>,
}

impl CycleObserver for CycleFeed {
    fn on_cycle_complete(&mut self, results: &ChannelResults, counter: ConversionCounter) {
        let readings: Vec<String> = results
            .as_slice()
            .iter()
            .take(self.channels.load(Ordering::Relaxed))
            .enumerate()
            .map(|(channel, result)| format!("ch{channel}={}mV", result.millivolts))
            .collect();
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format!("cycle {} {}", counter.cycle(), readings.join(" ")));
        }
    }
}

pub struct Session {
    bench: SharedBench,
    adc: BenchAdc,
    cycles: Arc<Mutex<Vec<String>>>,
    channels: Arc<AtomicUsize>,
    /// Cycle feed while the driver does not hold it.
    feed: Option<FeedHandle>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let bench = Bench::shared();
        let adc = CsdAdc::new(
            BenchBlock(Rc::clone(&bench)),
            BenchPins(Rc::clone(&bench)),
            BenchClock,
        );
        let cycles = Arc::new(Mutex::new(Vec::new()));
        let channels = Arc::new(AtomicUsize::new(0));
        // One feed for the whole process; reconfiguration passes it back and forth.
        let feed: FeedHandle = Box::leak(Box::new(CycleFeed {
            lines: Arc::clone(&cycles),
            channels: Arc::clone(&channels),
        }));
        Self {
            bench,
            adc,
            cycles,
            channels,
            feed: Some(feed),
        }
    }

    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        match command::parse(trimmed) {
            Ok(command) => self.execute(command),
            Err(offset) => vec![format!("ERR syntax at column {}", offset + 1)],
        }
    }

    fn execute(&mut self, command: Command) -> Vec<String> {
        match command {
            Command::Init(options) => self.init(&options),
            Command::Config(options) => self.reconfigure(&options),
            Command::Deinit => report("deinit", self.adc.deinit()),
            Command::Calibrate => match self.adc.calibrate() {
                Ok(()) => vec![self.describe_calibration("OK calibrate")],
                Err(err) => vec![failure("calibrate", err)],
            },
            Command::SetInput {
                channel,
                millivolts,
            } => {
                self.bench
                    .borrow_mut()
                    .set_input(channel_pin(channel), millivolts);
                vec![format!("OK ch{channel} <- {millivolts}mV")]
            }
            Command::SetVdda(millivolts) => {
                self.bench.borrow_mut().vdda_mv = millivolts;
                vec![format!("OK vdda <- {millivolts}mV")]
            }
            Command::SetAmux(millivolts) => {
                self.bench.borrow_mut().amux_mv = millivolts;
                vec![format!("OK amuxb <- {millivolts}mV")]
            }
            Command::Start { mode, mask } => {
                report("start", self.adc.start_convert(mode, mask))
            }
            Command::Tick(count) => self.tick(count),
            Command::Stop(stop) => report("stop", self.adc.stop_convert(stop)),
            Command::Status => self.status(),
            Command::Result(channel) => self.results(channel),
            Command::MeasureVdda => match self.adc.measure_supply_voltage() {
                Ok(mv) => vec![format!("OK vdda {mv}mV")],
                Err(err) => vec![failure("vdda", err)],
            },
            Command::MeasureAmux => match self.adc.measure_aux_bus_voltage() {
                Ok(mv) => vec![format!("OK amuxb {mv}mV")],
                Err(err) => vec![failure("amuxb", err)],
            },
            Command::Save => report("save", self.adc.save()),
            Command::Restore => report("restore", self.adc.restore()),
            Command::Foreign(take) => self.foreign(take),
            Command::Fault(fault) => {
                self.bench.borrow_mut().set_fault(fault);
                vec![format!("OK fault {fault:?}")]
            }
            Command::Sleep => match self.adc.sleep_readiness() {
                SleepReadiness::Ready => vec!["OK sleep ready".to_string()],
                SleepReadiness::NotReady => vec!["ERR sleep vetoed".to_string()],
            },
            Command::Wakeup => report("wakeup", self.adc.wakeup(&mut HostDelay)),
            Command::Help => help(),
        }
    }

    fn init(&mut self, options: &[ConfigOption]) -> Vec<String> {
        let config = match build_config(options) {
            Ok(config) => config,
            Err(err) => return vec![failure("init", err)],
        };
        let channels = usize::from(config.num_channels());

        self.reclaim_feed();
        if let Err(err) = self.adc.init(config, &mut HostDelay) {
            return vec![failure("init", err)];
        }
        self.register_feed(channels);
        match self.adc.enable() {
            Ok(()) => vec![self.describe_calibration("OK init")],
            Err(err) => vec![failure("init", err)],
        }
    }

    fn reconfigure(&mut self, options: &[ConfigOption]) -> Vec<String> {
        let config = match build_config(options) {
            Ok(config) => config,
            Err(err) => return vec![failure("config", err)],
        };
        let channels = usize::from(config.num_channels());

        self.reclaim_feed();
        let outcome = self.adc.write_config(config);
        // Reconfiguration drops the observer; hook it back up either way.
        self.register_feed(channels);
        match outcome {
            Ok(()) => vec![self.describe_calibration("OK config")],
            Err(err) => vec![failure("config", err)],
        }
    }

    fn reclaim_feed(&mut self) {
        if let Some(feed) = self.adc.unregister_callback() {
            self.feed = Some(feed);
        }
    }

    fn register_feed(&mut self, channels: usize) {
        self.channels.store(channels, Ordering::Relaxed);
        if let Some(feed) = self.feed.take() {
            self.adc.register_callback(feed);
        }
    }

    fn tick(&mut self, count: u32) -> Vec<String> {
        let mut delivered = 0;
        while delivered < count && self.bench.borrow().irq_pending() {
            self.adc.on_interrupt();
            delivered += 1;
        }

        let mut lines = vec![format!(
            "OK tick delivered={delivered} busy={} counter={}/{}",
            self.adc.status().busy(),
            self.adc.conversion_status().cycle(),
            self.adc.conversion_status().channel()
        )];
        if let Ok(mut cycles) = self.cycles.lock() {
            lines.append(&mut cycles);
        }
        lines
    }

    fn status(&self) -> Vec<String> {
        let status = self.adc.status();
        let bench = self.bench.borrow();
        let mut lines = vec![format!(
            "OK status initialized={} busy={} overflow={} phase={:?} mode={:?} end={}",
            status.initialized(),
            status.busy(),
            status.overflow(),
            status.phase(),
            status.mode(),
            describe_end(self.adc.is_end_conversion()),
        )];
        lines.push(self.describe_calibration("calibration"));
        lines.push(format!(
            "bench owner={:?} vref={}mV vdda={}mV amuxb={}mV on-bus={} fault={:?} measurements={}",
            bench.owner(),
            bench.vref_mv(),
            bench.vdda_mv,
            bench.amux_mv,
            bench.on_bus().len(),
            bench.fault(),
            bench.measurements(),
        ));
        if let Some(mv) = self.adc.supply_voltage() {
            lines.push(format!("last vdda {mv}mV"));
        }
        if let Some(mv) = self.adc.aux_bus_voltage() {
            lines.push(format!("last amuxb {mv}mV"));
        }
        lines
    }

    fn results(&self, channel: Option<u8>) -> Vec<String> {
        let count = self.adc.config().map_or(0, AdcConfig::num_channels);
        let channels: Vec<u8> = match channel {
            Some(channel) => vec![channel],
            None => (0..count).collect(),
        };
        if channels.is_empty() {
            return vec![failure("result", AdcError::NotInitialized)];
        }

        channels
            .into_iter()
            .map(|channel| {
                match (self.adc.result(channel), self.adc.result_voltage(channel)) {
                    (Some(code), Some(mv)) => format!("OK ch{channel} code={code} {mv}mV"),
                    _ => failure("result", AdcError::BadParam),
                }
            })
            .collect()
    }

    fn foreign(&mut self, take: bool) -> Vec<String> {
        let mut bench = self.bench.borrow_mut();
        match (take, bench.owner()) {
            (true, None) => {
                bench.set_owner(Some(LockOwner::CapSense));
                vec!["OK capsense owns the block".to_string()]
            }
            (false, Some(LockOwner::CapSense)) => {
                bench.set_owner(None);
                vec!["OK block free".to_string()]
            }
            (_, owner) => vec![format!("ERR capsense block owner is {owner:?}")],
        }
    }

    fn describe_calibration(&self, head: &str) -> String {
        let cal = self.adc.calibration();
        format!(
            "{head} t_vssa2vref={} t_recover={} t_vdda2vref={} t_full={} code_max={} vmax={}mV vref={}mV",
            cal.t_vssa2vref,
            cal.t_recover,
            cal.t_vdda2vref,
            cal.t_full,
            cal.code_max,
            cal.v_max_mv,
            cal.vref_mv
        )
    }
}

fn channel_pin(channel: u8) -> ChannelPin {
    ChannelPin::new(CHANNEL_PORT, channel)
}

fn build_config(options: &[ConfigOption]) -> Result<AdcConfig, AdcError> {
    let channels = options
        .iter()
        .rev()
        .find_map(|option| match option {
            ConfigOption::Channels(count) => Some(*count),
            _ => None,
        })
        .unwrap_or(DEFAULT_CHANNELS);
    let pins: Vec<ChannelPin> = (0..channels).map(channel_pin).collect();

    let mut config = AdcConfig::new(&pins)?;
    for option in options {
        config = match *option {
            ConfigOption::Channels(_) => config,
            ConfigOption::Range(range) => config.with_range(range),
            ConfigOption::Resolution(resolution) => config.with_resolution(resolution),
            ConfigOption::Vref(mv) => config.with_vref(Some(mv)),
            ConfigOption::Vdda(mv) => config.with_vdda(mv),
            ConfigOption::ClockMhz(mhz) => {
                let divider = config.oper_clk_divider;
                config.with_clock(mhz.saturating_mul(1_000_000), divider)
            }
        };
    }
    Ok(config)
}

fn report(label: &str, outcome: Result<(), AdcError>) -> Vec<String> {
    match outcome {
        Ok(()) => vec![format!("OK {label}")],
        Err(err) => vec![failure(label, err)],
    }
}

fn failure(label: &str, err: AdcError) -> String {
    format!("ERR {label} {err:?}: {err}")
}

fn describe_end(outcome: Result<(), AdcError>) -> String {
    match outcome {
        Ok(()) => "done".to_string(),
        Err(err) => format!("{err:?}"),
    }
}

fn help() -> Vec<String> {
    let mut lines = vec!["Available commands:".to_string()];
    for (_, detail) in HELP_TOPICS {
        lines.push(format!("  {detail}"));
    }
    lines
}
