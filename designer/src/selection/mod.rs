use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{PipelineContext, SelectionConfig};
use crate::data_handling::annotation::AnnotationTable;
use crate::data_handling::record_stream::RecordStreamReader;
use crate::errors::DesignError;
use crate::models::SelectedProbe;
use crate::record::WeightedScorer;

pub mod engine;
pub mod tiling;
pub mod tiling_zone;
pub mod zone;

pub use engine::{EmptyWindowPolicy, ScoredCandidate, WindowEngine, WindowGeometry};

/// A selection policy over the ordered record stream. Exactly one winner per
/// selection unit (window or region); at most one emission per offered
/// record.
pub trait Selector {
    /// Pre-scoring filter. Records rejected here are skipped entirely; they
    /// are neither scored nor counted against any window.
    fn eligible(&mut self, chromosome: &str, position: u64) -> bool {
        let _ = (chromosome, position);
        true
    }

    fn offer(&mut self, cand: &ScoredCandidate) -> Option<SelectedProbe>;

    fn finish(&mut self) -> Option<SelectedProbe>;
}

pub type SelectorFactory = fn(
    &SelectionConfig,
    &PipelineContext,
    Option<Arc<AnnotationTable>>,
) -> Result<Box<dyn Selector>, DesignError>;

/// Explicit name -> factory registry, validated at registration time like
/// the measurement registry.
pub struct SelectorRegistry {
    factories: Vec<(String, SelectorFactory)>,
}

impl SelectorRegistry {
    pub fn empty() -> Self {
        SelectorRegistry {
            factories: Vec::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register("tiling", tiling::factory)
            .expect("builtin registration");
        reg.register("zone", zone::factory)
            .expect("builtin registration");
        reg.register("tiling_zone", tiling_zone::factory)
            .expect("builtin registration");
        reg
    }

    pub fn register(&mut self, name: &str, factory: SelectorFactory) -> Result<(), DesignError> {
        if self.factories.iter().any(|(n, _)| n == name) {
            return Err(DesignError::config(format!(
                "selector '{}' registered twice",
                name
            )));
        }
        self.factories.push((name.to_string(), factory));
        Ok(())
    }

    pub fn build(
        &self,
        cfg: &SelectionConfig,
        ctx: &PipelineContext,
        annotation: Option<Arc<AnnotationTable>>,
    ) -> Result<Box<dyn Selector>, DesignError> {
        let factory = self
            .factories
            .iter()
            .find(|(n, _)| n == &cfg.selector)
            .map(|(_, f)| f)
            .ok_or_else(|| {
                DesignError::config(format!("unknown selector '{}'", cfg.selector))
            })?;
        factory(cfg, ctx, annotation)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SelectionReport {
    pub records: u64,
    pub winners: u64,
    pub ineligible: u64,
    pub malformed: u64,
}

/// Drives one full selection pass: advance the stream cursor, score, offer
/// to the selector, hand winners to the sink. Single-threaded and
/// single-pass; the stream must already be ordered by (chromosome,
/// position).
pub fn run_selection(
    reader: &mut RecordStreamReader,
    scorer: &WeightedScorer,
    selector: &mut dyn Selector,
    mut sink: impl FnMut(&SelectedProbe) -> Result<(), DesignError>,
) -> Result<SelectionReport, DesignError> {
    let chrom_idx = reader.panel().require("chromosome")?;
    let pos_idx = reader.panel().require("position")?;

    let mut report = SelectionReport::default();
    while reader.advance()? {
        report.records += 1;
        let rec = reader.record();

        let Some(chromosome) = rec.values()[chrom_idx].as_text() else {
            warn!("record {} has a non-text chromosome value", rec.id());
            report.malformed += 1;
            continue;
        };
        let Some(position) = rec.values()[pos_idx]
            .as_int()
            .filter(|p| *p >= 0)
            .map(|p| p as u64)
        else {
            warn!("record {} has an invalid position value", rec.id());
            report.malformed += 1;
            continue;
        };

        if !selector.eligible(chromosome, position) {
            report.ineligible += 1;
            continue;
        }

        let score = scorer.score_record(rec);
        let cand = ScoredCandidate {
            id: rec.id(),
            chromosome,
            position,
            score,
            values: rec.values(),
        };
        if let Some(probe) = selector.offer(&cand) {
            report.winners += 1;
            sink(&probe)?;
        }
    }
    if let Some(probe) = selector.finish() {
        report.winners += 1;
        sink(&probe)?;
    }

    info!(
        "selection pass: {} records, {} winners, {} ineligible, {} malformed",
        report.records, report.winners, report.ineligible, report.malformed
    );
    Ok(report)
}
