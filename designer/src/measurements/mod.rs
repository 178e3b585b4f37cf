use std::cell::OnceCell;
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::PipelineContext;
use crate::errors::DesignError;
use crate::models::{Candidate, Value};

pub mod sequence;
pub mod stats;
pub mod uniqueness;

use stats::ChunkedStats;

/// One named, independently computable feature of a candidate.
///
/// A measurement is created once per run and reused across every candidate;
/// it is stateful only through its statistics accumulator, which `clear`
/// resets. `score` is higher-is-better and not bounded to [0, 1].
pub trait Measurement {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn compute(&self, candidate: &Candidate) -> Result<Value, DesignError>;

    fn parse(&self, text: &str) -> Result<Value, DesignError>;

    fn format(&self, value: &Value) -> String;

    /// Text measurements exist for identification only and score 0.
    fn score(&self, value: &Value) -> f64 {
        let _ = value;
        0.0
    }

    fn record_sample(&mut self, value: &Value) {
        let _ = value;
    }

    /// Weight-assignment properties ("reference", "deviation", "min", "max")
    /// applied before scoring begins. Explicit values always win over
    /// computed defaults.
    fn apply_properties(&mut self, props: &HashMap<String, String>) -> Result<(), DesignError> {
        let _ = props;
        Ok(())
    }

    /// Hook for measurements that need per-batch preparation (external tool
    /// invocation). Called once per candidate batch before `compute`.
    fn prepare_batch(&mut self, batch: &[Candidate]) -> Result<(), DesignError> {
        let _ = batch;
        Ok(())
    }

    /// Ordered statistics-file rows for this measurement.
    fn statistics(&self) -> Vec<(String, String)>;

    fn clear(&mut self);
}

/// Shared normalization for numeric measurements:
/// `score(v) = 1 - |reference - v| / deviation`.
///
/// Reference and deviation default to the accumulated median and stddev,
/// resolved on the first `score` call and cached for the rest of the run.
#[derive(Debug, Default)]
pub struct Normalizer {
    reference: Option<f64>,
    deviation: Option<f64>,
    resolved: OnceCell<(f64, f64)>,
}

impl Normalizer {
    pub fn set_reference(&mut self, reference: f64) {
        self.reference = Some(reference);
    }

    pub fn set_deviation(&mut self, deviation: f64) {
        self.deviation = Some(deviation);
    }

    pub fn score(&self, name: &str, value: f64, stats: &ChunkedStats) -> f64 {
        let (reference, deviation) = *self.resolved.get_or_init(|| {
            let summary = stats.summary();
            let reference = self.reference.or_else(|| summary.map(|s| s.median));
            let deviation = self.deviation.or_else(|| summary.map(|s| s.stddev));
            let (reference, deviation) = match (reference, deviation) {
                (Some(r), Some(d)) => (r, d),
                _ => {
                    warn!(
                        "'{}' has no samples and no configured normalization; \
                         scores default to the raw deviation form",
                        name
                    );
                    (reference.unwrap_or(0.0), deviation.unwrap_or(1.0))
                }
            };
            // Guard against a degenerate distribution
            let deviation = deviation.abs().max(1e-9);
            debug!(
                "'{}' normalization resolved: reference={:.6} deviation={:.6}",
                name, reference, deviation
            );
            (reference, deviation)
        });
        1.0 - (reference - value).abs() / deviation
    }

    /// Drops the cached resolution so the next `score` re-reads statistics.
    pub fn reset(&mut self) {
        self.resolved = OnceCell::new();
    }
}

/// The configured measurement list, in declaration order. Column order of
/// the stream and statistics files follows this order.
pub struct MeasurementPanel {
    measurements: Vec<Box<dyn Measurement>>,
}

impl MeasurementPanel {
    pub fn new(measurements: Vec<Box<dyn Measurement>>) -> Self {
        MeasurementPanel { measurements }
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn get(&self, index: usize) -> &dyn Measurement {
        self.measurements[index].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Measurement> {
        self.measurements.iter().map(|m| m.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Measurement>> {
        self.measurements.iter_mut()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.measurements.iter().position(|m| m.name() == name)
    }

    /// Index lookup for a measurement the caller cannot work without.
    pub fn require(&self, name: &str) -> Result<usize, DesignError> {
        self.index_of(name).ok_or_else(|| {
            DesignError::config(format!("measurement panel has no '{}'", name))
        })
    }
}

pub type MeasurementFactory = fn(&PipelineContext) -> Result<Box<dyn Measurement>, DesignError>;

/// Compile-time registry from measurement name to factory. Registration is
/// validated eagerly; lookup of an unknown name is a configuration error.
pub struct MeasurementRegistry {
    factories: Vec<(String, MeasurementFactory)>,
}

impl MeasurementRegistry {
    pub fn empty() -> Self {
        MeasurementRegistry {
            factories: Vec::new(),
        }
    }

    /// All built-in measurements. Add-on measurements go through the same
    /// `register` call and get the same duplicate check.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        // Names are stable: they appear in stream headers and weight tables.
        reg.register("chromosome", |_| Ok(Box::new(sequence::chromosome())))
            .expect("builtin registration");
        reg.register("position", |_| Ok(Box::new(sequence::position())))
            .expect("builtin registration");
        reg.register("gc_content", |_| Ok(Box::new(sequence::gc_content())))
            .expect("builtin registration");
        reg.register("melting_temperature", |_| {
            Ok(Box::new(sequence::melting_temperature()))
        })
        .expect("builtin registration");
        reg.register("self_complementarity", |ctx| {
            Ok(Box::new(sequence::self_complementarity(ctx.probe_length)))
        })
        .expect("builtin registration");
        reg.register("uniqueness", uniqueness::factory)
            .expect("builtin registration");
        reg
    }

    pub fn register(
        &mut self,
        name: &str,
        factory: MeasurementFactory,
    ) -> Result<(), DesignError> {
        if self.factories.iter().any(|(n, _)| n == name) {
            return Err(DesignError::config(format!(
                "measurement '{}' registered twice",
                name
            )));
        }
        self.factories.push((name.to_string(), factory));
        Ok(())
    }

    pub fn build(
        &self,
        name: &str,
        ctx: &PipelineContext,
    ) -> Result<Box<dyn Measurement>, DesignError> {
        let factory = self
            .factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
            .ok_or_else(|| {
                DesignError::config(format!("unknown measurement '{}'", name))
            })?;
        factory(ctx)
    }

    pub fn build_panel(
        &self,
        names: &[String],
        ctx: &PipelineContext,
    ) -> Result<MeasurementPanel, DesignError> {
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(DesignError::config(format!(
                    "measurement '{}' listed twice in the panel",
                    name
                )));
            }
        }
        let mut measurements = Vec::with_capacity(names.len());
        for name in names {
            measurements.push(self.build(name, ctx)?);
        }
        debug!("built measurement panel: {:?}", names);
        Ok(MeasurementPanel::new(measurements))
    }
}
