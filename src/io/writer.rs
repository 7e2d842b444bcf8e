//! CSV time-series output with per-period statistics.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use tracing::{info, warn};

use crate::devices::types::Actor;
use crate::error::{SimError, SimResult};
use crate::sim::bus::{SharedBus, ValueId};

/// Statistic emitted for a variable over one output period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Min,
    /// Tick at which the minimum occurred.
    MinT,
    Max,
    /// Tick at which the maximum occurred.
    MaxT,
    Ave,
    /// Value at the emitting tick.
    Act,
}

impl Stat {
    pub const ALL: [Stat; 6] = [
        Stat::Min,
        Stat::MinT,
        Stat::Max,
        Stat::MaxT,
        Stat::Ave,
        Stat::Act,
    ];

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "Min" => Some(Self::Min),
            "MinT" => Some(Self::MinT),
            "Max" => Some(Self::Max),
            "MaxT" => Some(Self::MaxT),
            "Ave" => Some(Self::Ave),
            "Act" => Some(Self::Act),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Min => "Min",
            Self::MinT => "MinT",
            Self::Max => "Max",
            Self::MaxT => "MaxT",
            Self::Ave => "Ave",
            Self::Act => "Act",
        }
    }
}

/// Statistics written for `name` when the variable gives none explicitly.
///
/// Counters and energies only make sense as their current value, as does
/// anything written every tick.
pub fn default_stats(name: &str, period: u64) -> Vec<Stat> {
    if period <= 1 || name.ends_with("Cnt") || name.ends_with('E') {
        vec![Stat::Act]
    } else {
        Stat::ALL.to_vec()
    }
}

/// One output variable: a glob pattern with an optional `{Stat,...}` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSpec {
    pub pattern: String,
    pub stats: Option<Vec<Stat>>,
}

impl VariableSpec {
    /// Parses `Pattern` or `Pattern{Min,Max,...}`.
    ///
    /// # Returns
    ///
    /// `None` for an unterminated list or an unknown statistic.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text.find('{') {
            None => Some(Self {
                pattern: text.to_string(),
                stats: None,
            }),
            Some(open) => {
                let list = text[open + 1..].strip_suffix('}')?;
                let stats = list
                    .split(',')
                    .map(Stat::parse)
                    .collect::<Option<Vec<_>>>()?;
                Some(Self {
                    pattern: text[..open].to_string(),
                    stats: Some(stats),
                })
            }
        }
    }
}

/// Destination file, aggregation period, and variables of one output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub path: PathBuf,
    /// Ticks per emitted row.
    pub period: u64,
    pub variables: Vec<String>,
}

#[derive(Debug)]
struct Channel {
    id: ValueId,
    stats: Vec<Stat>,
    samples: u64,
    min: f64,
    min_t: u64,
    max: f64,
    max_t: u64,
    sum: f64,
    act: f64,
}

impl Channel {
    fn new(id: ValueId, stats: Vec<Stat>) -> Self {
        Self {
            id,
            stats,
            samples: 0,
            min: 0.0,
            min_t: 0,
            max: 0.0,
            max_t: 0,
            sum: 0.0,
            act: 0.0,
        }
    }

    fn sample(&mut self, tick: u64, v: f64) {
        if self.samples == 0 || v < self.min {
            self.min = v;
            self.min_t = tick;
        }
        if self.samples == 0 || v > self.max {
            self.max = v;
            self.max_t = tick;
        }
        self.sum += v;
        self.samples += 1;
        self.act = v;
    }

    fn value(&self, stat: Stat) -> f64 {
        match stat {
            Stat::Min => self.min,
            Stat::MinT => self.min_t as f64,
            Stat::Max => self.max,
            Stat::MaxT => self.max_t as f64,
            Stat::Ave if self.samples > 0 => self.sum / self.samples as f64,
            Stat::Ave => 0.0,
            Stat::Act => self.act,
        }
    }

    fn reset(&mut self) {
        self.samples = 0;
        self.sum = 0.0;
    }
}

/// Output actor writing one CSV file.
pub struct TimeSeriesWriter {
    spec: OutputSpec,
    writer: Option<csv::Writer<BufWriter<File>>>,
    channels: Vec<Channel>,
    rows: u64,
}

impl TimeSeriesWriter {
    pub fn new(spec: OutputSpec) -> Self {
        Self {
            spec,
            writer: None,
            channels: Vec::new(),
            rows: 0,
        }
    }

    fn period(&self) -> u64 {
        self.spec.period.max(1)
    }

    /// Column headers, `t` first.
    pub fn header(&self, bus: &SharedBus) -> Vec<String> {
        let mut header = vec!["t".to_string()];
        for ch in &self.channels {
            let name = bus.name(ch.id);
            if ch.stats == [Stat::Act] {
                header.push(name.to_string());
            } else {
                header.extend(ch.stats.iter().map(|s| format!("{name}.{}", s.label())));
            }
        }
        header
    }

    fn emit(&mut self, tick: u64) -> SimResult<()> {
        let mut record = Vec::with_capacity(self.channels.len() + 1);
        record.push(tick.to_string());
        for ch in self.channels.iter_mut() {
            record.extend(ch.stats.iter().map(|s| ch.value(*s).to_string()));
            ch.reset();
        }
        if let Some(w) = self.writer.as_mut() {
            w.write_record(&record)?;
        }
        self.rows += 1;
        Ok(())
    }
}

impl Actor for TimeSeriesWriter {
    fn name(&self) -> &str {
        "writer"
    }

    fn init(&mut self, bus: &mut SharedBus) -> SimResult<()> {
        let period = self.period();
        for text in &self.spec.variables {
            let var = VariableSpec::parse(text).ok_or_else(|| {
                SimError::parse(&self.spec.path, 0, format!("bad output variable \"{text}\""))
            })?;
            let names = bus.match_globs(&[var.pattern.as_str()]);
            if names.is_empty() {
                warn!(pattern = %var.pattern, file = %self.spec.path.display(), "output pattern matches nothing");
            }
            for name in names {
                let id = bus.get_or_new(&name);
                if self.channels.iter().any(|c| c.id == id) {
                    continue;
                }
                let stats = var
                    .stats
                    .clone()
                    .unwrap_or_else(|| default_stats(&name, period));
                self.channels.push(Channel::new(id, stats));
            }
        }

        let file = File::create(&self.spec.path)?;
        let mut writer = csv::WriterBuilder::new().from_writer(BufWriter::new(file));
        writer.write_record(self.header(bus))?;
        self.writer = Some(writer);
        info!(
            file = %self.spec.path.display(),
            variables = self.channels.len(),
            period,
            "output opened"
        );
        Ok(())
    }

    fn run(&mut self, bus: &mut SharedBus, tick: u64) -> SimResult<()> {
        for ch in self.channels.iter_mut() {
            ch.sample(tick, bus.get(ch.id));
        }
        if tick % self.period() == 0 {
            self.emit(tick)?;
        }
        Ok(())
    }

    fn finish(&mut self, _bus: &mut SharedBus) -> SimResult<()> {
        if let Some(mut w) = self.writer.take() {
            w.flush()?;
            let inner = w.into_inner().map_err(|e| io::Error::other(e.to_string()))?;
            inner.into_inner().map_err(|e| e.into_error())?.flush()?;
        }
        info!(file = %self.spec.path.display(), rows = self.rows, "output closed");
        Ok(())
    }
}
