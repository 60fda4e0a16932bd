//! Serial protocol of the counter firmware.
//!
//! While streaming is enabled the device prints one report per overflow of
//! its 8-bit event timer, i.e. every [`REPORT_PERIOD_TICKS`] ticks:
//!
//! ```text
//! c  0,  0
//! c  2,173
//! ```
//!
//! `c<events>,<ticks>` where `events` counts pulses seen during the period
//! and `ticks` is the timer position (0-255) of the last of them. A period
//! without pulses reports `c  0,  0`. Numbers are right-aligned to three
//! columns. Replies to query commands and anything else the device prints
//! are surfaced as [`DeviceLine::Status`] or [`DeviceLine::Other`].
//!
//! The port runs raw at 115200 baud, 8 data bits, no parity, 2 stop bits.
//! Every byte the host sends is a command, so the tty must not echo.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use gc_common::{Error, Result};
use serde::Serialize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

pub use gc_config::settings::DEFAULT_TICK_SECONDS as TICK_SECONDS;

/// Timer ticks covered by one count report.
pub const REPORT_PERIOD_TICKS: u32 = 256;

pub const BAUD_RATE: u32 = 115_200;

/// How long a read waits before the session gets a chance to poll.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// One count report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountLine {
    pub events: u32,
    pub ticks: u32,
}

impl CountLine {
    /// Ticks this report contributes to the estimator. An empty report
    /// stands for a whole report period; otherwise the timer position of the
    /// last pulse closes the interval.
    pub fn elapsed_ticks(&self) -> u32 {
        if self.events == 0 {
            REPORT_PERIOD_TICKS
        } else {
            self.ticks
        }
    }
}

/// Open the counter's serial port in raw mode with the firmware's framing.
pub fn open_port(path: &Path) -> Result<Box<dyn SerialPort>> {
    serialport::new(path.to_string_lossy(), BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::Two)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| port_error(path, e))
}

/// A second handle on an open port, for a writer on another thread.
pub fn clone_port(port: &dyn SerialPort, path: &Path) -> Result<Box<dyn SerialPort>> {
    port.try_clone().map_err(|e| port_error(path, e))
}

fn port_error(path: &Path, err: serialport::Error) -> Error {
    Error::DeviceUnavailable {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Replies to the query and toggle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "value")]
pub enum DeviceStatus {
    /// `a=y` / `a=n`: high-voltage supply above the comparator threshold.
    HighVoltageReached(bool),
    /// `d=<n>`: PWM duty cycle of the supply, out of 1024.
    DutyCycle(u16),
    /// `Buzzer on` / `Buzzer off`
    Buzzer(bool),
    /// `Comparator on` / `Comparator off`
    Comparator(bool),
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |on: bool| if on { "on" } else { "off" };
        match self {
            DeviceStatus::HighVoltageReached(reached) => {
                write!(f, "high voltage {}", if *reached { "reached" } else { "low" })
            }
            DeviceStatus::DutyCycle(duty) => write!(f, "duty cycle {}/1024", duty),
            DeviceStatus::Buzzer(on) => write!(f, "buzzer {}", on_off(*on)),
            DeviceStatus::Comparator(on) => write!(f, "comparator {}", on_off(*on)),
        }
    }
}

/// A classified line from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLine {
    Count(CountLine),
    Status(DeviceStatus),
    Other(String),
}

/// Classify one line. Never fails: unrecognised text becomes
/// [`DeviceLine::Other`] with line terminators removed.
pub fn parse_line(raw: &str) -> DeviceLine {
    let line = raw.trim_end_matches(['\r', '\n']);

    if let Some(count) = parse_count(line) {
        return DeviceLine::Count(count);
    }
    if let Some(status) = parse_status(line) {
        return DeviceLine::Status(status);
    }
    DeviceLine::Other(line.to_string())
}

fn parse_count(line: &str) -> Option<CountLine> {
    let body = line.strip_prefix('c')?;
    let (events, ticks) = body.split_once(',')?;
    Some(CountLine {
        events: events.trim().parse().ok()?,
        ticks: ticks.trim().parse().ok()?,
    })
}

fn parse_status(line: &str) -> Option<DeviceStatus> {
    match line {
        "a=y" => return Some(DeviceStatus::HighVoltageReached(true)),
        "a=n" => return Some(DeviceStatus::HighVoltageReached(false)),
        "Buzzer on" => return Some(DeviceStatus::Buzzer(true)),
        "Buzzer off" => return Some(DeviceStatus::Buzzer(false)),
        "Comparator on" => return Some(DeviceStatus::Comparator(true)),
        "Comparator off" => return Some(DeviceStatus::Comparator(false)),
        _ => {}
    }
    let duty = line.strip_prefix("d=")?;
    duty.trim().parse().ok().map(DeviceStatus::DutyCycle)
}

/// Single-byte commands understood by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeviceCommand {
    /// Start sending count reports.
    StartStreaming,
    /// Stop sending count reports.
    StopStreaming,
    /// Raise the supply duty cycle by 1.
    VoltageUp,
    /// Raise the supply duty cycle by 10.
    VoltageUpCoarse,
    /// Lower the supply duty cycle by 1.
    VoltageDown,
    /// Lower the supply duty cycle by 10.
    VoltageDownCoarse,
    /// Ask whether the supply is above threshold.
    QueryHighVoltage,
    /// Ask for the supply duty cycle.
    QueryDutyCycle,
    /// Sound the buzzer once.
    RingBell,
    QueryBuzzer,
    ToggleBuzzer,
    QueryComparator,
    ToggleComparator,
}

impl DeviceCommand {
    pub fn byte(self) -> u8 {
        match self {
            DeviceCommand::StartStreaming => b's',
            DeviceCommand::StopStreaming => b'S',
            DeviceCommand::VoltageUp => b'u',
            DeviceCommand::VoltageUpCoarse => b'U',
            DeviceCommand::VoltageDown => b'd',
            DeviceCommand::VoltageDownCoarse => b'D',
            DeviceCommand::QueryHighVoltage => b'a',
            DeviceCommand::QueryDutyCycle => b'm',
            DeviceCommand::RingBell => b'z',
            DeviceCommand::QueryBuzzer => b'b',
            DeviceCommand::ToggleBuzzer => b'B',
            DeviceCommand::QueryComparator => b'c',
            DeviceCommand::ToggleComparator => b'C',
        }
    }

    /// Write the command and flush.
    pub fn send<W: Write>(self, sink: &mut W) -> Result<()> {
        sink.write_all(&[self.byte()])
            .and_then(|()| sink.flush())
            .map_err(|e| Error::DeviceCommand(format!("sending {}: {}", self, e)))?;
        tracing::debug!(target: "gc_core::device", command = %self, "device command sent");
        Ok(())
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ('{}')", self, self.byte() as char)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_firmware_count_line() {
        assert_eq!(
            parse_line("c  1,125\r\n"),
            DeviceLine::Count(CountLine { events: 1, ticks: 125 })
        );
        assert_eq!(
            parse_line("c  0,  0"),
            DeviceLine::Count(CountLine { events: 0, ticks: 0 })
        );
    }

    #[test]
    fn empty_report_covers_a_whole_period() {
        let idle = CountLine { events: 0, ticks: 0 };
        assert_eq!(idle.elapsed_ticks(), REPORT_PERIOD_TICKS);

        let busy = CountLine { events: 2, ticks: 173 };
        assert_eq!(busy.elapsed_ticks(), 173);
    }

    #[test]
    fn missing_port_is_unavailable() {
        let err = open_port(Path::new("/nonexistent/ttyACM9")).unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable { .. }), "{err:?}");
    }

    #[test]
    fn parses_fields_wider_than_three_columns() {
        assert_eq!(
            parse_line("c 12,15625\r\n"),
            DeviceLine::Count(CountLine { events: 12, ticks: 15625 })
        );
    }

    #[test]
    fn malformed_count_lines_pass_through() {
        for raw in ["c", "c  1", "cab,cd", "c -1,  5", "x  1,  2", ""] {
            assert_eq!(parse_line(raw), DeviceLine::Other(raw.to_string()), "{raw:?}");
        }
    }

    #[test]
    fn passthrough_strips_terminators_only() {
        assert_eq!(
            parse_line("  hello \r\n"),
            DeviceLine::Other("  hello ".to_string())
        );
    }

    #[test]
    fn parses_status_replies() {
        assert_eq!(
            parse_line("a=y\r\n"),
            DeviceLine::Status(DeviceStatus::HighVoltageReached(true))
        );
        assert_eq!(parse_line("d=731"), DeviceLine::Status(DeviceStatus::DutyCycle(731)));
        assert_eq!(
            parse_line("Buzzer off\r\n"),
            DeviceLine::Status(DeviceStatus::Buzzer(false))
        );
        assert_eq!(
            parse_line("Comparator on"),
            DeviceLine::Status(DeviceStatus::Comparator(true))
        );
        assert_eq!(parse_line("d=lots"), DeviceLine::Other("d=lots".to_string()));
    }

    #[test]
    fn streaming_commands_are_single_bytes() {
        let mut sink = Vec::new();
        DeviceCommand::StartStreaming.send(&mut sink).unwrap();
        DeviceCommand::StopStreaming.send(&mut sink).unwrap();
        assert_eq!(sink, b"sS");
    }

    #[test]
    fn command_bytes_are_distinct() {
        use clap::ValueEnum;
        let mut bytes: Vec<u8> = DeviceCommand::value_variants()
            .iter()
            .map(|c| c.byte())
            .collect();
        bytes.sort_unstable();
        bytes.dedup();
        assert_eq!(bytes.len(), DeviceCommand::value_variants().len());
    }

    #[test]
    fn tick_length() {
        assert!((15_625.0 * TICK_SECONDS - 1.0).abs() < 1e-12);
    }
}
