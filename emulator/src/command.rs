//! Console grammar.
//!
//! One command per line, keywords first, `key=value` options for the
//! configuration commands. Masks accept decimal or `0x` hex.

use csdadc_core::{ConversionMode, Range, Resolution, StopMode};
use winnow::ascii::{Caseless, dec_uint, hex_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, repeat, terminated};
use winnow::prelude::*;

use crate::bench::Fault;

/// Field override applied on top of the default configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigOption {
    Channels(u8),
    Range(Range),
    Resolution(Resolution),
    Vref(u16),
    Vdda(u16),
    ClockMhz(u32),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Init(Vec<ConfigOption>),
    Config(Vec<ConfigOption>),
    Deinit,
    Calibrate,
    SetInput { channel: u8, millivolts: u16 },
    SetVdda(u16),
    SetAmux(u16),
    Start { mode: ConversionMode, mask: u32 },
    Tick(u32),
    Stop(StopMode),
    Status,
    Result(Option<u8>),
    MeasureVdda,
    MeasureAmux,
    Save,
    Restore,
    /// Another consumer grabs (`true`) or drops (`false`) the block.
    Foreign(bool),
    Fault(Option<Fault>),
    Sleep,
    Wakeup,
    Help,
}

/// Parses one console line; on failure returns the byte offset of the error.
pub fn parse(line: &str) -> Result<Command, usize> {
    command.parse(line.trim()).map_err(|err| err.offset())
}

fn command(input: &mut &str) -> ModalResult<Command> {
    terminated(
        alt((lifecycle, conversion, measurement, bench_control)),
        (space0, eof),
    )
    .parse_next(input)
}

fn lifecycle(input: &mut &str) -> ModalResult<Command> {
    alt((
        preceded(Caseless("init"), options).map(Command::Init),
        preceded(Caseless("config"), options).map(Command::Config),
        Caseless("deinit").value(Command::Deinit),
        Caseless("calibrate").value(Command::Calibrate),
        Caseless("save").value(Command::Save),
        Caseless("restore").value(Command::Restore),
        Caseless("sleep").value(Command::Sleep),
        Caseless("wakeup").value(Command::Wakeup),
        Caseless("help").value(Command::Help),
    ))
    .parse_next(input)
}

fn conversion(input: &mut &str) -> ModalResult<Command> {
    alt((
        preceded((Caseless("start"), space1), (conversion_mode, preceded(space1, mask)))
            .map(|(mode, mask)| Command::Start { mode, mask }),
        preceded((Caseless("stop"), space1), stop_mode).map(Command::Stop),
        preceded(Caseless("tick"), opt(preceded(space1, dec_uint)))
            .map(|count: Option<u32>| Command::Tick(count.unwrap_or(1))),
        Caseless("status").value(Command::Status),
        preceded(Caseless("result"), opt(preceded(space1, dec_uint))).map(Command::Result),
    ))
    .parse_next(input)
}

fn measurement(input: &mut &str) -> ModalResult<Command> {
    alt((
        Caseless("vdda").value(Command::MeasureVdda),
        Caseless("amuxb").value(Command::MeasureAmux),
    ))
    .parse_next(input)
}

fn bench_control(input: &mut &str) -> ModalResult<Command> {
    alt((
        preceded(
            (Caseless("set"), space1),
            alt((
                preceded((Caseless("vdda"), space1), dec_uint).map(Command::SetVdda),
                preceded((Caseless("amuxb"), space1), dec_uint).map(Command::SetAmux),
                (dec_uint, preceded(space1, dec_uint))
                    .map(|(channel, millivolts)| Command::SetInput { channel, millivolts }),
            )),
        ),
        preceded(
            (Caseless("fault"), space1),
            alt((
                Caseless("hang").value(Command::Fault(Some(Fault::Hang))),
                Caseless("overflow").value(Command::Fault(Some(Fault::Overflow))),
                Caseless("clear").value(Command::Fault(None)),
            )),
        ),
        preceded(
            (Caseless("capsense"), space1),
            alt((
                Caseless("take").value(Command::Foreign(true)),
                Caseless("drop").value(Command::Foreign(false)),
            )),
        ),
    ))
    .parse_next(input)
}

fn options(input: &mut &str) -> ModalResult<Vec<ConfigOption>> {
    repeat(0.., preceded(space1, config_option)).parse_next(input)
}

fn config_option(input: &mut &str) -> ModalResult<ConfigOption> {
    alt((
        preceded(Caseless("channels="), dec_uint).map(ConfigOption::Channels),
        preceded(
            Caseless("range="),
            alt((
                Caseless("vref").value(Range::Vref),
                Caseless("vdda").value(Range::Vdda),
            )),
        )
        .map(ConfigOption::Range),
        preceded(
            Caseless("bits="),
            alt(("8".value(Resolution::Bits8), "10".value(Resolution::Bits10))),
        )
        .map(ConfigOption::Resolution),
        preceded(Caseless("vref="), dec_uint).map(ConfigOption::Vref),
        preceded(Caseless("vdda="), dec_uint).map(ConfigOption::Vdda),
        preceded(Caseless("clk="), dec_uint).map(ConfigOption::ClockMhz),
    ))
    .parse_next(input)
}

fn conversion_mode(input: &mut &str) -> ModalResult<ConversionMode> {
    alt((
        Caseless("single").value(ConversionMode::SingleShot),
        Caseless("cont").value(ConversionMode::Continuous),
    ))
    .parse_next(input)
}

fn stop_mode(input: &mut &str) -> ModalResult<StopMode> {
    alt((
        Caseless("now").value(StopMode::Immediate),
        Caseless("channel").value(StopMode::AfterCurrentChannel),
        Caseless("cycle").value(StopMode::AfterFullCycle),
    ))
    .parse_next(input)
}

fn mask(input: &mut &str) -> ModalResult<u32> {
    alt((preceded(Caseless("0x"), hex_uint), dec_uint)).parse_next(input)
}
