use std::cell::Cell;
use std::collections::HashMap;

use log::{info, warn};

use crate::config::WeightConfig;
use crate::errors::DesignError;
use crate::measurements::MeasurementPanel;
use crate::models::Value;

/// One candidate's measurement values, parallel to the panel's measurement
/// list (`values.len() == panel.len()` always).
///
/// Records are flyweights: the stream reader owns exactly one and rebinds
/// its id and values on every advance, so a consumer that needs anything
/// past the next read must copy it out. The reader's borrow rules make
/// holding on to a stale view impossible, which is the point.
#[derive(Debug)]
pub struct SequenceRecord {
    id: u64,
    values: Vec<Value>,
    // Cell so the scorer can cache through the shared borrow the stream
    // reader hands out; records stay single-threaded flyweights.
    score: Cell<Option<f64>>,
}

impl SequenceRecord {
    pub fn with_len(len: usize) -> Self {
        SequenceRecord {
            id: 0,
            values: vec![Value::Int(0); len],
            score: Cell::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = id;
        self.score.set(None);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Replaces the value array wholesale and drops the cached score.
    pub fn set_values(&mut self, values: Vec<Value>) {
        self.values = values;
        self.score.set(None);
    }

    /// Rebinds a single slot, used by the stream reader filling the cursor
    /// in panel order.
    pub fn set_value(&mut self, index: usize, value: Value) {
        self.values[index] = value;
        self.score.set(None);
    }

    pub fn cached_score(&self) -> Option<f64> {
        self.score.get()
    }
}

/// Per-measurement weights resolved against a panel. Indices line up with
/// panel order; `None` means the measurement carries no weight and is
/// skipped entirely during scoring.
#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: Vec<Option<f64>>,
}

impl WeightTable {
    /// Resolves configured assignments against the panel and pushes their
    /// properties into the measurements. An assignment naming an unknown
    /// measurement is a warning and an implicit zero contribution, never an
    /// error.
    pub fn resolve(
        panel: &mut MeasurementPanel,
        config: &HashMap<String, WeightConfig>,
    ) -> Result<Self, DesignError> {
        let mut weights = vec![None; panel.len()];
        for (name, assignment) in config {
            let Some(index) = panel.index_of(name) else {
                warn!(
                    "weight assigned to unknown measurement '{}', contributes nothing",
                    name
                );
                continue;
            };
            weights[index] = Some(assignment.weight);
            if !assignment.properties.is_empty() {
                let m = panel
                    .iter_mut()
                    .nth(index)
                    .expect("index from index_of");
                m.apply_properties(&assignment.properties)?;
            }
        }
        let table = WeightTable { weights };
        if !table.weight_sum_approximately_one() {
            warn!(
                "weights sum to {:.4}, not 1; proceeding anyway",
                table.weight_sum()
            );
        }
        Ok(table)
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().flatten().sum()
    }

    /// Diagnostic only; a mismatch never blocks the run.
    pub fn weight_sum_approximately_one(&self) -> bool {
        (self.weight_sum() - 1.0).abs() < 0.01
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.weights.get(index).copied().flatten()
    }
}

/// Computes the composite score of a record against a panel:
/// the weighted sum of per-measurement scores over measurements that carry a
/// weight entry. Unweighted measurements (identity fields) are skipped, not
/// scored-and-zeroed.
pub struct WeightedScorer<'a> {
    panel: &'a MeasurementPanel,
    table: WeightTable,
}

impl<'a> WeightedScorer<'a> {
    pub fn new(panel: &'a MeasurementPanel, table: WeightTable) -> Self {
        info!(
            "scorer over {} measurements, weight sum {:.4}",
            panel.len(),
            table.weight_sum()
        );
        WeightedScorer { panel, table }
    }

    pub fn score_record(&self, record: &SequenceRecord) -> f64 {
        if let Some(score) = record.cached_score() {
            return score;
        }
        let mut total = 0.0;
        for (i, value) in record.values.iter().enumerate() {
            if let Some(weight) = self.table.get(i) {
                total += self.panel.get(i).score(value) * weight;
            }
        }
        record.score.set(Some(total));
        total
    }
}
