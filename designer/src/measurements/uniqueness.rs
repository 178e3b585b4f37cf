use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::config::PipelineContext;
use crate::errors::DesignError;
use crate::measurements::stats::ChunkedStats;
use crate::measurements::{Measurement, Normalizer};
use crate::models::{Candidate, Value};
use crate::tools::genome_index::{count_genome_hits, GenomeIndexOptions};

/// Genome-wide hit count per candidate, delegated to the external index
/// tool. The indexing algorithm is a black box; this measurement only primes
/// a per-batch lookup table and reads counts back out of it.
///
/// A perfectly unique probe scores 1 hit (itself), so the usual weight
/// assignment pins `reference` to 1.
pub struct UniquenessMeasurement {
    options: GenomeIndexOptions,
    hits: HashMap<u64, i64>,
    stats: ChunkedStats,
    norm: Normalizer,
}

pub fn factory(ctx: &PipelineContext) -> Result<Box<dyn Measurement>, DesignError> {
    let options = ctx.genome_index.clone().ok_or_else(|| {
        DesignError::config(
            "measurement 'uniqueness' requires a genome_index configuration section",
        )
    })?;
    let mut stats = ChunkedStats::new();
    stats.set_histogram_bounds(0.0, options.max_hits as f64);
    Ok(Box::new(UniquenessMeasurement {
        options,
        hits: HashMap::new(),
        stats,
        norm: Normalizer::default(),
    }))
}

impl Measurement for UniquenessMeasurement {
    fn name(&self) -> &str {
        "uniqueness"
    }

    fn description(&self) -> &str {
        "Genome-wide occurrence count reported by the index tool"
    }

    fn prepare_batch(&mut self, batch: &[Candidate]) -> Result<(), DesignError> {
        self.hits = count_genome_hits(&self.options, batch)?;
        info!(
            "primed uniqueness for {} of {} candidates",
            self.hits.len(),
            batch.len()
        );
        Ok(())
    }

    fn compute(&self, candidate: &Candidate) -> Result<Value, DesignError> {
        match self.hits.get(&candidate.id) {
            Some(count) => Ok(Value::Int(*count)),
            None => {
                // The tool omits candidates that aligned nowhere.
                debug!("candidate {} has no index hits", candidate.id);
                Ok(Value::Int(0))
            }
        }
    }

    fn parse(&self, text: &str) -> Result<Value, DesignError> {
        text.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            DesignError::data(format!("'uniqueness': unparseable integer '{}'", text))
        })
    }

    fn format(&self, value: &Value) -> String {
        match value {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format!("{}", v),
            Value::Text(s) => s.clone(),
        }
    }

    fn score(&self, value: &Value) -> f64 {
        match value.as_f64() {
            Some(v) => self.norm.score("uniqueness", v, &self.stats),
            None => 0.0,
        }
    }

    fn record_sample(&mut self, value: &Value) {
        if let Some(v) = value.as_f64() {
            self.stats.record(v);
        }
    }

    fn apply_properties(
        &mut self,
        props: &std::collections::HashMap<String, String>,
    ) -> Result<(), DesignError> {
        for (key, raw) in props {
            let parsed = raw.parse::<f64>().map_err(|_| {
                DesignError::config(format!(
                    "'uniqueness': property {}='{}' is not numeric",
                    key, raw
                ))
            });
            match key.as_str() {
                "reference" => self.norm.set_reference(parsed?),
                "deviation" => self.norm.set_deviation(parsed?),
                other => {
                    warn!("'uniqueness': ignoring unknown property '{}'", other);
                }
            }
        }
        Ok(())
    }

    fn statistics(&self) -> Vec<(String, String)> {
        self.stats.rows()
    }

    fn clear(&mut self) {
        self.hits.clear();
        self.stats.clear();
        self.norm.reset();
    }
}
