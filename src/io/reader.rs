//! CSV time-series input feeding raw samples into the register bus.
//!
//! The first column is the timestamp (`t`); every other column names a
//! register. A column named `>Name` carries scale expressions
//! (`*<multiplier>+<offset>`) for register `Name` instead of samples.
//! Rows are applied once the simulation reaches their timestamp and hold
//! until the next row for the same register.

use std::cell::Cell;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info, warn};

use crate::devices::types::Actor;
use crate::error::{SimError, SimResult};
use crate::sim::bus::{Scale, SharedBus, ValueId};

/// Numbers at or above this are Unix-epoch seconds (2000-01-01T00:00:00Z).
const EPOCH_THRESHOLD: f64 = 946_684_800.0;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Simulation start time shared by every reader of a run.
///
/// Left empty, it is set by the first absolute timestamp any reader sees.
pub type StartTime = Rc<Cell<Option<NaiveDateTime>>>;

/// How the timestamp column of a file is encoded, decided on its first row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// Seconds since the Unix epoch.
    Epoch,
    /// Seconds since the start of the simulation.
    Relative,
    /// Date/time text.
    DateTime,
}

/// Parses a date/time cell in any of the accepted layouts.
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for fmt in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Decides the timestamp encoding from a sample cell.
pub fn detect_time_format(text: &str) -> Option<TimeFormat> {
    match text.parse::<f64>() {
        Ok(v) if v >= EPOCH_THRESHOLD => Some(TimeFormat::Epoch),
        Ok(_) => Some(TimeFormat::Relative),
        Err(_) => parse_date_time(text).map(|_| TimeFormat::DateTime),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Value,
    Scale,
}

#[derive(Debug, Clone, Copy)]
struct Column {
    id: ValueId,
    kind: ColumnKind,
}

/// One data row, timestamp already converted to simulation seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Seconds since the simulation start, recycling offset included.
    pub t: f64,
    /// Source line number.
    pub line: u64,
    /// Cells after the timestamp, untrimmed.
    pub cells: Vec<String>,
}

/// Input actor replaying one CSV file.
pub struct TimeSeriesReader {
    path: PathBuf,
    recycle: bool,
    start: StartTime,
    reader: Option<csv::Reader<File>>,
    columns: Vec<Column>,
    format: Option<TimeFormat>,
    pending: Option<Row>,
    /// Added to file timestamps; grows by one file span per recycle.
    offset: f64,
    first_t: Option<f64>,
    last_t: Option<f64>,
    period: f64,
    passes: u64,
}

impl TimeSeriesReader {
    /// Creates a reader for `path`. Nothing is opened until `init`.
    ///
    /// # Arguments
    ///
    /// * `path` - CSV file to replay
    /// * `recycle` - Rewind to the first row at end of file
    /// * `start` - Shared simulation start time
    pub fn new(path: impl Into<PathBuf>, recycle: bool, start: StartTime) -> Self {
        Self {
            path: path.into(),
            recycle,
            start,
            reader: None,
            columns: Vec::new(),
            format: None,
            pending: None,
            offset: 0.0,
            first_t: None,
            last_t: None,
            period: 1.0,
            passes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_error(&self, line: u64, message: impl Into<String>) -> SimError {
        SimError::parse(&self.path, line, message)
    }

    fn open(&self) -> SimResult<csv::Reader<File>> {
        let file = File::open(&self.path)?;
        Ok(ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file))
    }

    /// Converts a timestamp cell to seconds since the simulation start.
    fn to_seconds(&mut self, text: &str, line: u64) -> SimResult<f64> {
        let format = match self.format {
            Some(f) => f,
            None => {
                let f = detect_time_format(text)
                    .ok_or_else(|| self.parse_error(line, format!("bad timestamp \"{text}\"")))?;
                debug!(file = %self.path.display(), format = ?f, "timestamp format detected");
                self.format = Some(f);
                f
            }
        };
        let absolute = match format {
            TimeFormat::Relative => {
                return text
                    .parse::<f64>()
                    .map_err(|_| self.parse_error(line, format!("bad timestamp \"{text}\"")));
            }
            TimeFormat::Epoch => text
                .parse::<f64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0).round() as i64))
                .map(|dt| dt.naive_utc()),
            TimeFormat::DateTime => parse_date_time(text),
        }
        .ok_or_else(|| self.parse_error(line, format!("bad timestamp \"{text}\"")))?;

        let start = match self.start.get() {
            Some(s) => s,
            None => {
                info!(start = %absolute, "simulation start taken from input");
                self.start.set(Some(absolute));
                absolute
            }
        };
        Ok((absolute - start).num_milliseconds() as f64 / 1000.0)
    }

    /// Reads the next data row, rewinding at end of file when recycling.
    ///
    /// # Errors
    ///
    /// Returns a parse error for a malformed timestamp, or an I/O error if
    /// the file cannot be read or reopened.
    pub fn next_row(&mut self) -> SimResult<Option<Row>> {
        let mut record = StringRecord::new();
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            if !reader.read_record(&mut record)? {
                let (Some(first), Some(last)) = (self.first_t, self.last_t) else {
                    self.reader = None;
                    return Ok(None);
                };
                if !self.recycle {
                    self.reader = None;
                    return Ok(None);
                }
                self.offset += (last - first) + self.period;
                self.passes += 1;
                debug!(file = %self.path.display(), offset = self.offset, "input recycled");
                self.reader = Some(self.open()?);
                continue;
            }

            let line = record.position().map_or(0, |p| p.line());
            if record.iter().all(str::is_empty) {
                warn!(file = %self.path.display(), line, "skipping empty row");
                continue;
            }
            let stamp = record.get(0).unwrap_or("");
            let t = self.to_seconds(stamp, line)?;
            if self.passes == 0 {
                if let Some(last) = self.last_t {
                    self.period = (t - last).max(1.0);
                }
                if self.first_t.is_none() {
                    self.first_t = Some(t);
                }
                self.last_t = Some(t);
            }
            return Ok(Some(Row {
                t: t + self.offset,
                line,
                cells: record.iter().skip(1).map(str::to_string).collect(),
            }));
        }
    }

    fn apply(&self, bus: &mut SharedBus, row: &Row) -> SimResult<()> {
        for (column, cell) in self.columns.iter().zip(&row.cells) {
            if cell.is_empty() {
                continue;
            }
            match column.kind {
                ColumnKind::Value => {
                    let v: f64 = cell.parse().map_err(|_| {
                        self.parse_error(row.line, format!("bad number \"{cell}\""))
                    })?;
                    bus.set_raw(column.id, v);
                }
                ColumnKind::Scale => {
                    let scale = Scale::parse(cell).ok_or_else(|| {
                        self.parse_error(row.line, format!("bad scale \"{cell}\""))
                    })?;
                    bus.set_scale(column.id, scale);
                }
            }
        }
        Ok(())
    }
}

impl Actor for TimeSeriesReader {
    fn name(&self) -> &str {
        "reader"
    }

    fn init(&mut self, bus: &mut SharedBus) -> SimResult<()> {
        let mut reader = self.open()?;
        let headers = reader.headers()?.clone();
        if headers.get(0) != Some("t") {
            return Err(self.parse_error(1, "first column must be \"t\""));
        }
        self.columns = headers
            .iter()
            .skip(1)
            .map(|name| match name.strip_prefix('>') {
                Some(target) => Column {
                    id: bus.get_or_new(target),
                    kind: ColumnKind::Scale,
                },
                None => Column {
                    id: bus.get_or_new(name),
                    kind: ColumnKind::Value,
                },
            })
            .collect();
        self.reader = Some(reader);
        info!(
            file = %self.path.display(),
            columns = self.columns.len(),
            recycle = self.recycle,
            "input opened"
        );
        Ok(())
    }

    fn run(&mut self, bus: &mut SharedBus, tick: u64) -> SimResult<()> {
        loop {
            if self.pending.is_none() {
                self.pending = self.next_row()?;
            }
            match self.pending.take() {
                Some(row) if row.t <= tick as f64 => self.apply(bus, &row)?,
                other => {
                    self.pending = other;
                    return Ok(());
                }
            }
        }
    }
}
