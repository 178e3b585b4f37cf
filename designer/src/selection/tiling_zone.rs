use std::sync::Arc;

use crate::config::{PipelineContext, SelectionConfig};
use crate::data_handling::annotation::{AnnotationLookup, AnnotationTable};
use crate::errors::DesignError;
use crate::models::{SelectedProbe, WindowGeometryProvider};
use crate::selection::engine::{EmptyWindowPolicy, ScoredCandidate, WindowEngine, WindowGeometry};
use crate::selection::Selector;

/// Intersection of the tiling and zone policies: fixed coordinate windows,
/// but only candidates inside an annotated region compete. Windows covering
/// unannotated stretches close without a winner, which is expected here and
/// stays out of the logs.
pub struct TilingZoneSelector {
    engine: WindowEngine,
    lookup: Arc<AnnotationTable>,
    probe_length: u64,
    skipped_unannotated: u64,
}

impl TilingZoneSelector {
    pub fn new(
        geometry: WindowGeometry,
        lookup: Arc<AnnotationTable>,
        probe_length: u64,
    ) -> Self {
        TilingZoneSelector {
            engine: WindowEngine::new(geometry, EmptyWindowPolicy::Silent),
            lookup,
            probe_length,
            skipped_unannotated: 0,
        }
    }
}

pub fn factory(
    cfg: &SelectionConfig,
    ctx: &PipelineContext,
    annotation: Option<Arc<AnnotationTable>>,
) -> Result<Box<dyn Selector>, DesignError> {
    let lookup = annotation.ok_or_else(|| {
        DesignError::config("selector 'tiling_zone' requires an annotation_table")
    })?;
    let geometry = WindowGeometry::new(cfg.window_length(), cfg.window_step())?;
    Ok(Box::new(TilingZoneSelector::new(
        geometry,
        lookup,
        ctx.probe_length,
    )))
}

impl Selector for TilingZoneSelector {
    fn eligible(&mut self, chromosome: &str, position: u64) -> bool {
        if self
            .lookup
            .region_at(chromosome, position, self.probe_length)
            .is_some()
        {
            true
        } else {
            self.skipped_unannotated += 1;
            false
        }
    }

    fn offer(&mut self, cand: &ScoredCandidate) -> Option<SelectedProbe> {
        self.engine.step(cand)
    }

    fn finish(&mut self) -> Option<SelectedProbe> {
        self.engine.finish()
    }
}
