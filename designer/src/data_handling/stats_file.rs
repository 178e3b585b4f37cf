use std::path::Path;

use tracing::info;

use crate::errors::DesignError;
use crate::measurements::stats::FIXED_STAT_ROWS;
use crate::measurements::MeasurementPanel;

/// Writes the per-measurement statistics matrix.
///
/// Layout: first line lists the measurement names tab-separated (no Id
/// column); every following line is `<statName><TAB>` plus one value per
/// measurement. The fixed rows come first in declaration order, histogram
/// bucket rows follow in ascending numeric order; a measurement without a
/// given statistic leaves its cell empty.
pub fn write_statistics_file(
    path: &Path,
    panel: &MeasurementPanel,
) -> Result<(), DesignError> {
    let per_measurement: Vec<Vec<(String, String)>> =
        panel.iter().map(|m| m.statistics()).collect();

    let mut row_order: Vec<String> =
        FIXED_STAT_ROWS.iter().map(|s| s.to_string()).collect();
    for rows in &per_measurement {
        for (name, _) in rows {
            if !row_order.iter().any(|n| n == name) {
                row_order.push(name.clone());
            }
        }
    }

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)?;
    wtr.write_record(panel.iter().map(|m| m.name()))?;
    for stat_name in &row_order {
        let mut row = Vec::with_capacity(panel.len() + 1);
        row.push(stat_name.clone());
        for rows in &per_measurement {
            let value = rows
                .iter()
                .find(|(name, _)| name == stat_name)
                .map(|(_, value)| value.clone())
                .unwrap_or_default();
            row.push(value);
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    info!(
        "wrote statistics for {} measurements to {}",
        panel.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineContext;
    use crate::measurements::MeasurementRegistry;
    use crate::models::Value;

    #[test]
    fn matrix_layout_and_row_order() {
        let ctx = PipelineContext {
            probe_length: 24,
            threads: 1,
            genome_index: None,
        };
        let mut panel = MeasurementRegistry::with_builtins()
            .build_panel(
                &["chromosome".to_string(), "gc_content".to_string()],
                &ctx,
            )
            .unwrap();

        for v in [0.25, 0.5, 0.75] {
            for m in panel.iter_mut() {
                if m.name() == "gc_content" {
                    m.record_sample(&Value::Float(v));
                } else {
                    m.record_sample(&Value::Text("chr1".into()));
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statistics.tsv");
        write_statistics_file(&path, &panel).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "chromosome\tgc_content");

        let row_names: Vec<&str> = lines[1..]
            .iter()
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        assert_eq!(
            &row_names[..6],
            &["median", "mean", "stddev", "n", "min", "max"]
        );
        // gc histogram buckets follow in ascending order
        assert_eq!(row_names[6], "0-0.1");
        assert_eq!(row_names[15], "0.9-1");

        // both measurements fill the shared n row; text leaves median empty
        let median_row: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(median_row, vec!["median", "", "0.500000"]);
        let n_row: Vec<&str> = lines[4].split('\t').collect();
        assert_eq!(n_row, vec!["n", "3", "3"]);
    }
}
