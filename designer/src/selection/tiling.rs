use std::sync::Arc;

use crate::config::{PipelineContext, SelectionConfig};
use crate::data_handling::annotation::AnnotationTable;
use crate::errors::DesignError;
use crate::models::{SelectedProbe, WindowGeometryProvider};
use crate::selection::engine::{EmptyWindowPolicy, ScoredCandidate, WindowEngine, WindowGeometry};
use crate::selection::Selector;

/// Pure coordinate tiling: every fixed-length window is expected to yield
/// exactly one winner, so a window that closes empty is reported as an
/// anomaly.
pub struct TilingSelector {
    engine: WindowEngine,
}

impl TilingSelector {
    pub fn new(geometry: WindowGeometry) -> Self {
        TilingSelector {
            engine: WindowEngine::new(geometry, EmptyWindowPolicy::LogError),
        }
    }
}

pub fn factory(
    cfg: &SelectionConfig,
    _ctx: &PipelineContext,
    _annotation: Option<Arc<AnnotationTable>>,
) -> Result<Box<dyn Selector>, DesignError> {
    let geometry = WindowGeometry::new(cfg.window_length(), cfg.window_step())?;
    Ok(Box::new(TilingSelector::new(geometry)))
}

impl Selector for TilingSelector {
    fn offer(&mut self, cand: &ScoredCandidate) -> Option<SelectedProbe> {
        self.engine.step(cand)
    }

    fn finish(&mut self) -> Option<SelectedProbe> {
        self.engine.finish()
    }
}
