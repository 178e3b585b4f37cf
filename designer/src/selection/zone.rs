use std::sync::Arc;

use tracing::debug;

use crate::config::{PipelineContext, SelectionConfig};
use crate::data_handling::annotation::{AnnotationLookup, AnnotationTable};
use crate::errors::DesignError;
use crate::models::{Region, RegionContext, SelectedProbe};
use crate::selection::engine::ScoredCandidate;
use crate::selection::Selector;

/// Region-anchored selection: the selection unit is an annotated region
/// (typically an open reading frame) instead of a fixed window. The winner
/// of a region is flushed when the stream moves into a different region;
/// records outside any region are skipped before scoring. Winners carry
/// their offsets inside the region as output enrichment; those never feed
/// the composite score.
pub struct ZoneSelector {
    lookup: Arc<AnnotationTable>,
    probe_length: u64,
    current: Option<Region>,
    pending: Option<Region>,
    best: Option<SelectedProbe>,
    best_score: f64,
    last_emitted: Option<u64>,
    skipped_unannotated: u64,
}

impl ZoneSelector {
    pub fn new(lookup: Arc<AnnotationTable>, probe_length: u64) -> Self {
        ZoneSelector {
            lookup,
            probe_length,
            current: None,
            pending: None,
            best: None,
            best_score: f64::NEG_INFINITY,
            last_emitted: None,
            skipped_unannotated: 0,
        }
    }

    fn take_best(&mut self) -> Option<SelectedProbe> {
        let probe = self.best.take()?;
        self.best_score = f64::NEG_INFINITY;
        if self.last_emitted == Some(probe.id) {
            debug!("candidate {} already emitted, suppressing duplicate", probe.id);
            return None;
        }
        self.last_emitted = Some(probe.id);
        Some(probe)
    }
}

pub fn factory(
    _cfg: &SelectionConfig,
    ctx: &PipelineContext,
    annotation: Option<Arc<AnnotationTable>>,
) -> Result<Box<dyn Selector>, DesignError> {
    let lookup = annotation.ok_or_else(|| {
        DesignError::config("selector 'zone' requires an annotation_table")
    })?;
    Ok(Box::new(ZoneSelector::new(lookup, ctx.probe_length)))
}

impl Selector for ZoneSelector {
    fn eligible(&mut self, chromosome: &str, position: u64) -> bool {
        match self.lookup.region_at(chromosome, position, self.probe_length) {
            Some(region) => {
                self.pending = Some(region.clone());
                true
            }
            None => {
                self.skipped_unannotated += 1;
                false
            }
        }
    }

    fn offer(&mut self, cand: &ScoredCandidate) -> Option<SelectedProbe> {
        let region = match self.pending.take() {
            Some(r) => r,
            // Defensive re-lookup when a caller skips the eligibility step.
            None => self
                .lookup
                .region_at(cand.chromosome, cand.position, self.probe_length)?
                .clone(),
        };

        let mut emitted = None;
        if self.current.as_ref() != Some(&region) {
            emitted = self.take_best();
            self.current = Some(region.clone());
        }

        if cand.score > self.best_score {
            self.best_score = cand.score;
            let mut probe = SelectedProbe {
                id: cand.id,
                chromosome: cand.chromosome.to_string(),
                position: cand.position,
                score: cand.score,
                values: cand.values.to_vec(),
                region: None,
            };
            probe.region = Some(RegionContext {
                region_name: region.name.clone(),
                distance_from_start: cand.position.saturating_sub(region.start),
                distance_to_end: region.end.saturating_sub(cand.position),
            });
            self.best = Some(probe);
        }
        emitted
    }

    fn finish(&mut self) -> Option<SelectedProbe> {
        let emitted = self.take_best();
        if self.skipped_unannotated > 0 {
            debug!(
                "{} records fell outside every annotated region",
                self.skipped_unannotated
            );
        }
        self.current = None;
        self.pending = None;
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn selector() -> ZoneSelector {
        let table = AnnotationTable::from_regions(vec![
            Region {
                name: "orf1".into(),
                chromosome: "chr1".into(),
                start: 100,
                end: 199,
            },
            Region {
                name: "orf2".into(),
                chromosome: "chr1".into(),
                start: 400,
                end: 499,
            },
        ]);
        ZoneSelector::new(Arc::new(table), 24)
    }

    fn offer(sel: &mut ZoneSelector, id: u64, position: u64, score: f64) -> Option<u64> {
        if !sel.eligible("chr1", position) {
            return None;
        }
        sel.offer(&ScoredCandidate {
            id,
            chromosome: "chr1",
            position,
            score,
            values: &[Value::Int(position as i64)],
        })
        .map(|p| p.id)
    }

    #[test]
    fn one_winner_per_region() {
        let mut sel = selector();
        assert_eq!(offer(&mut sel, 1, 110, 0.4), None);
        assert_eq!(offer(&mut sel, 2, 150, 0.9), None);
        // moving into orf2 flushes orf1's winner
        assert_eq!(offer(&mut sel, 3, 410, 0.2), Some(2));
        assert_eq!(sel.finish().map(|p| p.id), Some(3));
    }

    #[test]
    fn unannotated_records_are_skipped_silently() {
        let mut sel = selector();
        assert!(!sel.eligible("chr1", 250));
        assert_eq!(offer(&mut sel, 1, 110, 0.5), None);
        // the gap between regions does not flush or disturb tracking
        assert!(!sel.eligible("chr1", 300));
        assert_eq!(offer(&mut sel, 2, 150, 0.9), None);
        assert_eq!(sel.finish().map(|p| p.id), Some(2));
        assert_eq!(sel.skipped_unannotated, 2);
    }

    #[test]
    fn winners_carry_region_offsets() {
        let mut sel = selector();
        assert_eq!(offer(&mut sel, 1, 130, 0.9), None);
        let probe = sel.finish().unwrap();
        let region = probe.region.unwrap();
        assert_eq!(region.region_name, "orf1");
        assert_eq!(region.distance_from_start, 30);
        assert_eq!(region.distance_to_end, 69);
    }

    #[test]
    fn empty_stream_finishes_clean() {
        let mut sel = selector();
        assert!(sel.finish().is_none());
    }
}
