use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::candidates::TilingCandidateSource;
use crate::config::{DesignConfig, PipelineContext};
use crate::data_handling::annotation::AnnotationTable;
use crate::data_handling::fasta::read_fasta;
use crate::data_handling::record_stream::{RecordStreamReader, RecordStreamWriter};
use crate::data_handling::stats_file::write_statistics_file;
use crate::errors::DesignError;
use crate::measurements::{MeasurementPanel, MeasurementRegistry};
use crate::models::{Candidate, SequenceSource};
use crate::record::{WeightTable, WeightedScorer};
use crate::selection::{run_selection, SelectionReport, SelectorRegistry};

/// Candidates measured per batch. Also the unit the external uniqueness
/// lookup is primed over.
const MEASURE_BATCH: usize = 50_000;

pub struct RunPaths {
    pub stream: PathBuf,
    pub statistics: PathBuf,
    pub probes: PathBuf,
}

impl RunPaths {
    pub fn in_dir(dir: &Path) -> Self {
        RunPaths {
            stream: dir.join("measurement_stream.tsv"),
            statistics: dir.join("statistics.tsv"),
            probes: dir.join("selected_probes.tsv"),
        }
    }
}

/// Full run: measure every tiled candidate, persist the stream and the
/// statistics, then scan the stream once and persist the winners.
pub fn run(cfg: &DesignConfig) -> anyhow::Result<SelectionReport> {
    let ctx = PipelineContext::from_config(cfg)?;
    let registry = MeasurementRegistry::with_builtins();
    let mut panel = registry
        .build_panel(&cfg.measurements, &ctx)
        .context("building measurement panel")?;
    // Weight properties reach the measurements before any scoring happens.
    let weight_table = WeightTable::resolve(&mut panel, &cfg.weights)?;

    fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("creating {}", cfg.output_dir.display()))?;
    let paths = RunPaths::in_dir(&cfg.output_dir);

    measure_phase(cfg, &mut panel, &paths).context("measure phase")?;
    let report =
        select_phase(cfg, &ctx, &panel, weight_table, &paths).context("select phase")?;

    info!(
        "run complete: {} records scanned, {} probes selected",
        report.records, report.winners
    );
    Ok(report)
}

/// Tiles the genome, computes all measurement values, accumulates the value
/// distributions and writes the stream and statistics files.
fn measure_phase(
    cfg: &DesignConfig,
    panel: &mut MeasurementPanel,
    paths: &RunPaths,
) -> anyhow::Result<()> {
    let genome = read_fasta(&cfg.genome_fasta)?;
    let mut source = TilingCandidateSource::new(genome, cfg.probe.length, cfg.probe.step)?;
    let mut writer = RecordStreamWriter::create(&paths.stream, panel)?;

    let mut batch: Vec<Candidate> = Vec::with_capacity(MEASURE_BATCH);
    let mut measured = 0u64;
    while let Some(candidate) = source.next_candidate()? {
        let boundary = !batch.is_empty()
            && (batch.len() >= MEASURE_BATCH
                || batch[0].chromosome != candidate.chromosome);
        if boundary {
            measured += measure_batch(panel, &batch, &mut writer)?;
            batch.clear();
        }
        batch.push(candidate);
    }
    if !batch.is_empty() {
        measured += measure_batch(panel, &batch, &mut writer)?;
    }
    writer.finish()?;

    write_statistics_file(&paths.statistics, panel)?;
    info!(
        "measured {} candidates into {}",
        measured,
        paths.stream.display()
    );
    Ok(())
}

fn measure_batch(
    panel: &mut MeasurementPanel,
    batch: &[Candidate],
    writer: &mut RecordStreamWriter,
) -> Result<u64, DesignError> {
    for m in panel.iter_mut() {
        m.prepare_batch(batch)?;
    }

    let mut written = 0u64;
    let mut values = Vec::with_capacity(panel.len());
    'candidates: for candidate in batch {
        values.clear();
        for m in panel.iter_mut() {
            match m.compute(candidate) {
                Ok(value) => {
                    m.record_sample(&value);
                    values.push(value);
                }
                Err(e) => {
                    // One bad candidate never takes down a genome-scale run
                    warn!("candidate {}: {}, skipping", candidate.id, e);
                    continue 'candidates;
                }
            }
        }
        writer.write(candidate.id, &values, panel)?;
        written += 1;
    }
    Ok(written)
}

/// Re-reads the stream, applies the weight assignments and emits one winner
/// per window (or region) to the probes file.
fn select_phase(
    cfg: &DesignConfig,
    ctx: &PipelineContext,
    panel: &MeasurementPanel,
    weight_table: WeightTable,
    paths: &RunPaths,
) -> anyhow::Result<SelectionReport> {
    let annotation = match &cfg.annotation_table {
        Some(path) => Some(Arc::new(AnnotationTable::load(path)?)),
        None => None,
    };

    let scorer = WeightedScorer::new(panel, weight_table);
    let mut selector = SelectorRegistry::with_builtins()
        .build(&cfg.selection, ctx, annotation)
        .context("building selector")?;
    let mut reader = RecordStreamReader::open(&paths.stream, panel)?;

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&paths.probes)
        .map_err(DesignError::from)?;
    let mut header = vec![
        "Id".to_string(),
        "chromosome".to_string(),
        "position".to_string(),
        "score".to_string(),
        "region".to_string(),
        "region_offset".to_string(),
        "region_remaining".to_string(),
    ];
    for m in panel.iter() {
        header.push(m.name().to_string());
    }
    wtr.write_record(&header).map_err(DesignError::from)?;

    let report = run_selection(&mut reader, &scorer, selector.as_mut(), |probe| {
        let (region, offset, remaining) = match &probe.region {
            Some(r) => (
                r.region_name.clone(),
                r.distance_from_start.to_string(),
                r.distance_to_end.to_string(),
            ),
            None => (String::new(), String::new(), String::new()),
        };
        let mut row = vec![
            probe.id.to_string(),
            probe.chromosome.clone(),
            probe.position.to_string(),
            format!("{:.6}", probe.score),
            region,
            offset,
            remaining,
        ];
        // The snapshot copied these out of the cursor; the stream has long
        // since moved on by the time a winner is written.
        for (i, value) in probe.values.iter().enumerate() {
            row.push(panel.get(i).format(value));
        }
        wtr.write_record(&row)?;
        Ok(())
    })?;
    wtr.flush().map_err(DesignError::from)?;

    info!("selected probes written to {}", paths.probes.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a run over a small synthetic genome. GC content is weighted
    /// toward 0.5, so the mixed-composition windows should win over the
    /// homopolymer stretches.
    fn config(dir: &Path, genome: &str, selection: serde_json::Value) -> DesignConfig {
        let fasta_path = dir.join("genome.fa");
        let mut fasta = std::fs::File::create(&fasta_path).unwrap();
        fasta.write_all(genome.as_bytes()).unwrap();
        drop(fasta);

        serde_json::from_value(serde_json::json!({
            "genome_fasta": fasta_path,
            "output_dir": dir.join("out"),
            "probe": { "length": 8, "step": 4 },
            "selection": selection,
            "measurements": ["chromosome", "position", "gc_content", "melting_temperature"],
            "weights": {
                "gc_content": { "weight": 1.0, "reference": "0.5", "deviation": "0.5" }
            }
        }))
        .unwrap()
    }

    fn genome() -> String {
        // chr1: 64 bases, alternating GC-rich and AT-only halves per window
        let chr1: String = "ACGTACGTAAAAAAAATTTTTTTTGCGCGCGC"
            .chars()
            .cycle()
            .take(64)
            .collect();
        format!(">chr1\n{}\n>chr2\nACGTACGTACGTACGTACGTACGT\n", chr1)
    }

    #[test]
    fn end_to_end_tiling_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(
            dir.path(),
            &genome(),
            serde_json::json!({ "window_length": 16, "window_step": 16 }),
        );
        cfg.validate().unwrap();

        let report = run(&cfg).unwrap();
        assert!(report.records > 0);
        assert!(report.winners > 0);

        let paths = RunPaths::in_dir(&cfg.output_dir);
        let stream = std::fs::read_to_string(&paths.stream).unwrap();
        assert!(stream.starts_with(
            "Id\tchromosome\tposition\tgc_content\tmelting_temperature"
        ));
        let stats = std::fs::read_to_string(&paths.statistics).unwrap();
        assert!(stats.starts_with(
            "chromosome\tposition\tgc_content\tmelting_temperature"
        ));

        let probes = std::fs::read_to_string(&paths.probes).unwrap();
        let data_lines: Vec<&str> = probes.lines().skip(1).collect();
        assert_eq!(data_lines.len() as u64, report.winners);

        // one winner per window at most: ceil(span / L) per chromosome
        let chr1_winners = data_lines
            .iter()
            .filter(|l| l.split('\t').nth(1) == Some("chr1"))
            .count();
        assert!(chr1_winners <= 4); // 64 bases / 16
        let chr2_winners = data_lines
            .iter()
            .filter(|l| l.split('\t').nth(1) == Some("chr2"))
            .count();
        assert!(chr2_winners >= 1);

        // winners never share a window
        let mut chr1_windows: Vec<u64> = data_lines
            .iter()
            .filter(|l| l.split('\t').nth(1) == Some("chr1"))
            .map(|l| l.split('\t').nth(2).unwrap().parse::<u64>().unwrap() / 16)
            .collect();
        let before = chr1_windows.len();
        chr1_windows.dedup();
        assert_eq!(chr1_windows.len(), before);
    }

    #[test]
    fn replayed_run_is_identical() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let selection = serde_json::json!({ "window_length": 16, "window_step": 16 });
        let cfg_a = config(dir_a.path(), &genome(), selection.clone());
        let cfg_b = config(dir_b.path(), &genome(), selection);

        run(&cfg_a).unwrap();
        run(&cfg_b).unwrap();

        let probes_a =
            std::fs::read_to_string(RunPaths::in_dir(&cfg_a.output_dir).probes).unwrap();
        let probes_b =
            std::fs::read_to_string(RunPaths::in_dir(&cfg_b.output_dir).probes).unwrap();
        assert_eq!(probes_a, probes_b);
        assert!(probes_a.lines().count() > 1);
    }

    #[test]
    fn tiling_zone_run_skips_unannotated_windows() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(
            dir.path(),
            &genome(),
            serde_json::json!({
                "selector": "tiling_zone",
                "window_length": 16,
                "window_step": 16
            }),
        );

        let annotation_path = dir.path().join("orfs.tsv");
        let mut ann = std::fs::File::create(&annotation_path).unwrap();
        writeln!(ann, "name\tchromosome\tstart\tend").unwrap();
        writeln!(ann, "orf1\tchr1\t0\t15").unwrap();
        drop(ann);
        cfg.annotation_table = Some(annotation_path);

        let report = run(&cfg).unwrap();
        assert!(report.ineligible > 0);

        let probes =
            std::fs::read_to_string(RunPaths::in_dir(&cfg.output_dir).probes).unwrap();
        let data_lines: Vec<&str> = probes.lines().skip(1).collect();
        // only the annotated first window of chr1 yields a probe
        assert_eq!(data_lines.len(), 1);
        let fields: Vec<&str> = data_lines[0].split('\t').collect();
        assert_eq!(fields[1], "chr1");
        assert!(fields[2].parse::<u64>().unwrap() < 16);
    }

    #[test]
    fn zone_run_emits_one_probe_per_region() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(
            dir.path(),
            &genome(),
            serde_json::json!({
                "selector": "zone",
                "window_length": 16,
                "window_step": 16
            }),
        );

        let annotation_path = dir.path().join("orfs.tsv");
        let mut ann = std::fs::File::create(&annotation_path).unwrap();
        writeln!(ann, "name\tchromosome\tstart\tend").unwrap();
        writeln!(ann, "orfA\tchr1\t0\t23").unwrap();
        writeln!(ann, "orfB\tchr1\t32\t55").unwrap();
        drop(ann);
        cfg.annotation_table = Some(annotation_path);

        run(&cfg).unwrap();

        let probes =
            std::fs::read_to_string(RunPaths::in_dir(&cfg.output_dir).probes).unwrap();
        let regions: Vec<&str> = probes
            .lines()
            .skip(1)
            .map(|l| l.split('\t').nth(4).unwrap())
            .collect();
        assert_eq!(regions, vec!["orfA", "orfB"]);
    }
}
