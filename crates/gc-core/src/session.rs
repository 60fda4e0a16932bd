//! Drives device lines through a [`RateEstimator`] and renders readings.
//!
//! stdout-style sinks receive only payload: one line per reading (text or
//! JSONL) plus passthrough of non-count device output. Diagnostics go to
//! `tracing`.
//!
//! The rate-drop checks run before every line, count report or not, and
//! whenever a read times out, so a reset is rendered as soon as it is due.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gc_common::{OutputFormat, Result};
use gc_config::OutputConfig;
use serde::Serialize;
use serde_json::json;

use crate::device::{parse_line, CountLine, DeviceLine, DeviceStatus};
use crate::estimator::{LineOutcome, RateEstimator, ResetKind};
use crate::logging::{event_names, generate_run_id};

/// Totals for a finished session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Lines read from the source.
    pub lines: u64,
    /// Lines that were count reports.
    pub count_lines: u64,
    /// Events reported across all count lines.
    pub events: u64,
    /// Resets from any heuristic.
    pub resets: u64,
    /// Reads that timed out before a full line arrived.
    pub timeouts: u64,
    pub last_cpm: Option<f64>,
    /// The stop flag ended the session before the source did.
    pub interrupted: bool,
}

/// One measurement run over a line source.
pub struct MeasurementSession {
    estimator: RateEstimator,
    output: OutputConfig,
    run_id: String,
    stop: Option<Arc<AtomicBool>>,
    summary: SessionSummary,
}

impl MeasurementSession {
    pub fn new(estimator: RateEstimator, output: OutputConfig) -> Self {
        Self {
            estimator,
            output,
            run_id: generate_run_id(),
            stop: None,
            summary: SessionSummary::default(),
        }
    }

    /// Stop between lines once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn estimator(&self) -> &RateEstimator {
        &self.estimator
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    /// Consume `source` until EOF or the stop flag, rendering into `sink`.
    ///
    /// A read failing with `TimedOut` or `WouldBlock` is not an error: the
    /// estimator is polled and reading resumes, keeping any partial line.
    pub fn run<R: BufRead, W: Write>(&mut self, mut source: R, sink: &mut W) -> Result<SessionSummary> {
        tracing::info!(
            event = event_names::SESSION_STARTED,
            run_id = %self.run_id,
            ring_size = self.estimator.config().ring_size,
            false_positive_p = self.estimator.config().false_positive_p,
            "measurement session started"
        );

        let mut buf = Vec::new();
        loop {
            if self.stop_requested() {
                self.summary.interrupted = true;
                tracing::info!(event = event_names::SESSION_INTERRUPTED, run_id = %self.run_id, "stop requested");
                break;
            }

            match source.read_until(b'\n', &mut buf) {
                Ok(0) if buf.is_empty() => break,
                Ok(_) => {
                    let raw = String::from_utf8_lossy(&buf).into_owned();
                    buf.clear();
                    self.handle_line(&raw, sink)?;
                }
                Err(err) if is_timeout(&err) => self.handle_timeout(sink)?,
                Err(err) => return Err(err.into()),
            }
        }
        sink.flush()?;

        tracing::info!(
            event = event_names::SESSION_FINISHED,
            run_id = %self.run_id,
            lines = self.summary.lines,
            events = self.summary.events,
            resets = self.summary.resets,
            interrupted = self.summary.interrupted,
            "measurement session finished"
        );
        Ok(self.summary.clone())
    }

    /// Process one raw device line.
    pub fn handle_line<W: Write>(&mut self, raw: &str, sink: &mut W) -> Result<()> {
        self.summary.lines += 1;
        match parse_line(raw) {
            DeviceLine::Count(count) => self.handle_count(count, sink),
            DeviceLine::Status(status) => {
                self.poll(sink)?;
                tracing::info!(event = event_names::DEVICE_STATUS, status = %status, "device status");
                self.passthrough_status(raw, status, sink)
            }
            DeviceLine::Other(text) => {
                self.poll(sink)?;
                self.passthrough_text(&text, sink)
            }
        }
    }

    /// A read timed out with no complete line.
    pub fn handle_timeout<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        self.summary.timeouts += 1;
        tracing::trace!(event = event_names::DEVICE_TIMEOUT, run_id = %self.run_id, "device read timed out");
        self.poll(sink)?;
        sink.flush()?;
        Ok(())
    }

    fn handle_count<W: Write>(&mut self, count: CountLine, sink: &mut W) -> Result<()> {
        self.summary.count_lines += 1;
        self.summary.events += u64::from(count.events);

        let outcome = self.estimator.process_line(count.events, count.elapsed_ticks());
        self.render(&outcome, sink)
    }

    /// Run only the rate-drop checks, rendering a reset if one fires.
    fn poll<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        match self.estimator.poll() {
            Some(kind) => self.render_reset(kind, sink),
            None => Ok(()),
        }
    }

    fn render_reset<W: Write>(&mut self, kind: ResetKind, sink: &mut W) -> Result<()> {
        self.summary.resets += 1;
        self.summary.last_cpm = Some(0.0);
        self.write_reading(0.0, 0, Some(kind), sink)
    }

    fn render<W: Write>(&mut self, outcome: &LineOutcome, sink: &mut W) -> Result<()> {
        if let Some(kind) = outcome.pre_check_reset {
            self.render_reset(kind, sink)?;
        }
        for reading in &outcome.readings {
            if reading.reset.is_some() {
                self.summary.resets += 1;
            }
            self.summary.last_cpm = Some(reading.cpm);
            self.write_reading(reading.cpm, reading.event_count, reading.reset, sink)?;
        }
        Ok(())
    }

    fn write_reading<W: Write>(
        &self,
        cpm: f64,
        event_count: usize,
        reset: Option<ResetKind>,
        sink: &mut W,
    ) -> Result<()> {
        match self.output.format {
            OutputFormat::Text => {
                let precision = self.output.precision;
                match reset {
                    Some(kind) => writeln!(sink, "CPM: {:.*} (reset: {})", precision, cpm, kind)?,
                    None => writeln!(sink, "CPM: {:.*}", precision, cpm)?,
                }
            }
            OutputFormat::Jsonl => {
                let record = json!({
                    "ts": timestamp(),
                    "run_id": self.run_id,
                    "cpm": cpm,
                    "event_count": event_count,
                    "reset": reset,
                });
                writeln!(sink, "{}", record)?;
            }
        }
        Ok(())
    }

    fn passthrough_status<W: Write>(&self, raw: &str, status: DeviceStatus, sink: &mut W) -> Result<()> {
        if !self.output.passthrough {
            return Ok(());
        }
        match self.output.format {
            OutputFormat::Text => writeln!(sink, "{}", raw.trim_end_matches(['\r', '\n']))?,
            OutputFormat::Jsonl => {
                let record = json!({ "ts": timestamp(), "run_id": self.run_id, "device": status });
                writeln!(sink, "{}", record)?;
            }
        }
        Ok(())
    }

    fn passthrough_text<W: Write>(&self, text: &str, sink: &mut W) -> Result<()> {
        if !self.output.passthrough || text.is_empty() {
            return Ok(());
        }
        match self.output.format {
            OutputFormat::Text => writeln!(sink, "{}", text)?,
            OutputFormat::Jsonl => {
                let record = json!({ "ts": timestamp(), "run_id": self.run_id, "device": text });
                writeln!(sink, "{}", record)?;
            }
        }
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
