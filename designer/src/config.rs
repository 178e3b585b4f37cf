use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::errors::DesignError;
use crate::models::WindowGeometryProvider;
use crate::tools::genome_index::GenomeIndexOptions;

/// Top-level run configuration, deserialized from a JSON file.
#[derive(Debug, Deserialize)]
pub struct DesignConfig {
    /// Genome FASTA with one entry per chromosome.
    pub genome_fasta: PathBuf,

    /// Optional tab-separated annotation table (name, chromosome, start, end)
    /// required by the zone selectors.
    #[serde(default)]
    pub annotation_table: Option<PathBuf>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    pub probe: ProbeConfig,
    pub selection: SelectionConfig,

    /// Measurement panel, in declaration order. Order here fixes the column
    /// order of the stream and statistics files.
    pub measurements: Vec<String>,

    /// Weight assignments keyed by measurement name. Measurements not listed
    /// contribute nothing to the composite score.
    #[serde(default)]
    pub weights: HashMap<String, WeightConfig>,

    #[serde(default)]
    pub genome_index: Option<GenomeIndexConfig>,

    /// Worker pool size for external tool batches.
    #[serde(default = "default_threads")]
    pub threads: usize,
}

#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
    /// Oligo length in bases.
    pub length: usize,
    /// Offset between consecutive candidate start positions.
    #[serde(default = "default_probe_step")]
    pub step: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// Registered selector name: "tiling", "zone" or "tiling_zone".
    #[serde(default = "default_selector")]
    pub selector: String,
    pub window_length: u64,
    pub window_step: u64,
}

/// One weight assignment. Any JSON key besides "weight" is collected as a
/// free-form property ("reference", "deviation", "min", "max") handed to the
/// measurement before scoring begins.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightConfig {
    pub weight: f64,
    #[serde(flatten)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenomeIndexConfig {
    /// Binary name or absolute path; resolved through PATH when bare.
    pub binary: String,
    /// Prebuilt index location handed to the tool.
    pub index: PathBuf,
    #[serde(default = "default_max_hits")]
    pub max_hits: u32,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./design_output")
}

fn default_probe_step() -> usize {
    1
}

fn default_selector() -> String {
    "tiling".to_string()
}

fn default_threads() -> usize {
    1
}

fn default_max_hits() -> u32 {
    10
}

impl DesignConfig {
    pub fn load(path: &Path) -> Result<Self, DesignError> {
        debug!("Loading configuration from {}", path.display());
        let file = File::open(path).map_err(|e| {
            DesignError::config(format!("cannot open {}: {}", path.display(), e))
        })?;
        let cfg: DesignConfig = serde_json::from_reader(file)
            .map_err(|e| DesignError::config(format!("{}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Structural checks that must hold before any work starts.
    pub fn validate(&self) -> Result<(), DesignError> {
        if self.probe.length == 0 {
            return Err(DesignError::config("probe length must be > 0"));
        }
        if self.probe.step == 0 {
            return Err(DesignError::config("probe step must be > 0"));
        }
        if self.selection.window_length == 0 {
            return Err(DesignError::config("window length must be > 0"));
        }
        if self.selection.window_step == 0 {
            return Err(DesignError::config("window step must be > 0"));
        }
        if self.measurements.is_empty() {
            return Err(DesignError::config("measurement panel is empty"));
        }
        for (name, w) in &self.weights {
            if !(w.weight >= 0.0) {
                return Err(DesignError::config(format!(
                    "weight for '{}' must be a non-negative number, got {}",
                    name, w.weight
                )));
            }
        }
        Ok(())
    }
}

impl WindowGeometryProvider for SelectionConfig {
    fn window_length(&self) -> u64 {
        self.window_length
    }

    fn window_step(&self) -> u64 {
        self.window_step
    }
}

/// Explicit context threaded through constructors instead of process-wide
/// settings: external tool wiring and the probe geometry the measurements
/// and selectors need at build time.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub probe_length: u64,
    pub threads: usize,
    pub genome_index: Option<GenomeIndexOptions>,
}

impl PipelineContext {
    pub fn from_config(cfg: &DesignConfig) -> Result<Self, DesignError> {
        let genome_index = match &cfg.genome_index {
            Some(gi) => Some(GenomeIndexOptions::resolve(
                &gi.binary,
                &gi.index,
                gi.max_hits,
                cfg.threads,
            )?),
            None => None,
        };
        Ok(PipelineContext {
            probe_length: cfg.probe.length as u64,
            threads: cfg.threads.max(1),
            genome_index,
        })
    }
}
