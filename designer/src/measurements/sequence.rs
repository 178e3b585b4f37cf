use std::collections::HashMap;

use tracing::warn;

use crate::errors::DesignError;
use crate::measurements::stats::ChunkedStats;
use crate::measurements::{Measurement, Normalizer};
use crate::models::{Candidate, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericKind {
    Float,
    Integer,
}

/// Adapter carrying everything a numeric measurement shares: value parsing
/// and formatting, the chunked statistics accumulator, and deviation-based
/// normalization. Concrete measurements differ only in their compute
/// function and default histogram bounds.
pub struct NumericMeasurement {
    name: &'static str,
    description: &'static str,
    kind: NumericKind,
    compute: fn(&Candidate) -> Result<Value, DesignError>,
    stats: ChunkedStats,
    norm: Normalizer,
}

impl NumericMeasurement {
    fn new(
        name: &'static str,
        description: &'static str,
        kind: NumericKind,
        compute: fn(&Candidate) -> Result<Value, DesignError>,
    ) -> Self {
        NumericMeasurement {
            name,
            description,
            kind,
            compute,
            stats: ChunkedStats::new(),
            norm: Normalizer::default(),
        }
    }

    fn with_histogram(mut self, lo: f64, hi: f64) -> Self {
        self.stats.set_histogram_bounds(lo, hi);
        self
    }
}

impl Measurement for NumericMeasurement {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn compute(&self, candidate: &Candidate) -> Result<Value, DesignError> {
        (self.compute)(candidate)
    }

    fn parse(&self, text: &str) -> Result<Value, DesignError> {
        let text = text.trim();
        match self.kind {
            NumericKind::Float => text.parse::<f64>().map(Value::Float).map_err(|_| {
                DesignError::data(format!("'{}': unparseable float '{}'", self.name, text))
            }),
            NumericKind::Integer => text.parse::<i64>().map(Value::Int).map_err(|_| {
                DesignError::data(format!("'{}': unparseable integer '{}'", self.name, text))
            }),
        }
    }

    fn format(&self, value: &Value) -> String {
        match value {
            Value::Float(v) => format!("{}", v),
            Value::Int(v) => v.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    fn score(&self, value: &Value) -> f64 {
        match value.as_f64() {
            Some(v) => self.norm.score(self.name, v, &self.stats),
            None => 0.0,
        }
    }

    fn record_sample(&mut self, value: &Value) {
        if let Some(v) = value.as_f64() {
            self.stats.record(v);
        }
    }

    fn apply_properties(&mut self, props: &HashMap<String, String>) -> Result<(), DesignError> {
        let mut hist_lo = None;
        let mut hist_hi = None;
        for (key, raw) in props {
            let parsed = raw.parse::<f64>().map_err(|_| {
                DesignError::config(format!(
                    "'{}': property {}='{}' is not numeric",
                    self.name, key, raw
                ))
            });
            match key.as_str() {
                "reference" => self.norm.set_reference(parsed?),
                "deviation" => self.norm.set_deviation(parsed?),
                "min" => hist_lo = Some(parsed?),
                "max" => hist_hi = Some(parsed?),
                other => {
                    warn!("'{}': ignoring unknown property '{}'", self.name, other);
                }
            }
        }
        match (hist_lo, hist_hi) {
            (Some(lo), Some(hi)) => self.stats.set_histogram_bounds(lo, hi),
            (None, None) => {}
            _ => {
                warn!(
                    "'{}': histogram bounds need both min and max, keeping defaults",
                    self.name
                );
            }
        }
        Ok(())
    }

    fn statistics(&self) -> Vec<(String, String)> {
        self.stats.rows()
    }

    fn clear(&mut self) {
        self.stats.clear();
        self.norm.reset();
    }
}

/// Identity measurement holding a text value. Carries no score and no
/// distribution, only a sample count.
pub struct TextMeasurement {
    name: &'static str,
    description: &'static str,
    compute: fn(&Candidate) -> Result<Value, DesignError>,
    n: u64,
}

impl Measurement for TextMeasurement {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn compute(&self, candidate: &Candidate) -> Result<Value, DesignError> {
        (self.compute)(candidate)
    }

    fn parse(&self, text: &str) -> Result<Value, DesignError> {
        Ok(Value::Text(text.to_string()))
    }

    fn format(&self, value: &Value) -> String {
        match value {
            Value::Text(s) => s.clone(),
            Value::Float(v) => format!("{}", v),
            Value::Int(v) => v.to_string(),
        }
    }

    fn record_sample(&mut self, _value: &Value) {
        self.n += 1;
    }

    fn statistics(&self) -> Vec<(String, String)> {
        vec![("n".to_string(), self.n.to_string())]
    }

    fn clear(&mut self) {
        self.n = 0;
    }
}

// ─── Built-in measurements ───────────────────────────────────────────────────

pub fn chromosome() -> TextMeasurement {
    TextMeasurement {
        name: "chromosome",
        description: "Chromosome the candidate was tiled from",
        compute: |c| Ok(Value::Text(c.chromosome.clone())),
        n: 0,
    }
}

pub fn position() -> NumericMeasurement {
    NumericMeasurement::new(
        "position",
        "0-based start position on the chromosome",
        NumericKind::Integer,
        |c| Ok(Value::Int(c.position as i64)),
    )
}

pub fn gc_content() -> NumericMeasurement {
    NumericMeasurement::new(
        "gc_content",
        "Fraction of G/C bases in the candidate",
        NumericKind::Float,
        |c| Ok(Value::Float(gc_fraction(c.sequence.as_bytes()))),
    )
    .with_histogram(0.0, 1.0)
}

pub fn melting_temperature() -> NumericMeasurement {
    NumericMeasurement::new(
        "melting_temperature",
        "Oligo melting temperature in degrees Celsius",
        NumericKind::Float,
        |c| Ok(Value::Float(melting_temp(c.sequence.as_bytes()))),
    )
    .with_histogram(40.0, 100.0)
}

pub fn self_complementarity(probe_length: u64) -> NumericMeasurement {
    NumericMeasurement::new(
        "self_complementarity",
        "Longest match between the candidate and its own reverse complement",
        NumericKind::Integer,
        |c| Ok(Value::Int(longest_self_match(c.sequence.as_bytes()) as i64)),
    )
    .with_histogram(0.0, probe_length.max(1) as f64)
}

fn gc_fraction(seq: &[u8]) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    let gc = seq
        .iter()
        .filter(|b| matches!(b, b'G' | b'C' | b'g' | b'c'))
        .count();
    gc as f64 / seq.len() as f64
}

/// Wallace rule for short oligos, GC method above 13 nt.
fn melting_temp(seq: &[u8]) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    let gc = seq
        .iter()
        .filter(|b| matches!(b, b'G' | b'C' | b'g' | b'c'))
        .count();
    let at = seq.len() - gc;
    if seq.len() <= 13 {
        (2 * at + 4 * gc) as f64
    } else {
        64.9 + 41.0 * (gc as f64 - 16.4) / seq.len() as f64
    }
}

fn complement(base: u8) -> u8 {
    match base {
        b'A' | b'a' => b'T',
        b'T' | b't' => b'A',
        b'G' | b'g' => b'C',
        b'C' | b'c' => b'G',
        other => other,
    }
}

/// Longest common substring between the sequence and its reverse complement,
/// the usual quick proxy for hairpin/self-dimer potential. Quadratic, but
/// probes are tens of bases.
fn longest_self_match(seq: &[u8]) -> usize {
    if seq.is_empty() {
        return 0;
    }
    let rc: Vec<u8> = seq.iter().rev().map(|&b| complement(b)).collect();
    let n = seq.len();
    let mut prev = vec![0usize; n + 1];
    let mut best = 0;
    for i in 1..=n {
        let mut row = vec![0usize; n + 1];
        for j in 1..=n {
            if seq[i - 1].to_ascii_uppercase() == rc[j - 1] {
                row[j] = prev[j - 1] + 1;
                if row[j] > best {
                    best = row[j];
                }
            }
        }
        prev = row;
    }
    best
}
