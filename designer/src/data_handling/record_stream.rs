use std::fs::File;
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::DesignError;
use crate::measurements::MeasurementPanel;
use crate::models::Value;
use crate::record::SequenceRecord;

/// Writes the measurement stream: header `Id<TAB>name...`, one tab-separated
/// data line per candidate, every value serialized by its owning
/// measurement.
pub struct RecordStreamWriter {
    wtr: csv::Writer<File>,
    columns: usize,
}

impl RecordStreamWriter {
    pub fn create(path: &Path, panel: &MeasurementPanel) -> Result<Self, DesignError> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        let mut header = Vec::with_capacity(panel.len() + 1);
        header.push("Id".to_string());
        for m in panel.iter() {
            header.push(m.name().to_string());
        }
        wtr.write_record(&header)?;
        Ok(RecordStreamWriter {
            wtr,
            columns: panel.len(),
        })
    }

    pub fn write(
        &mut self,
        id: u64,
        values: &[Value],
        panel: &MeasurementPanel,
    ) -> Result<(), DesignError> {
        if values.len() != self.columns {
            return Err(DesignError::data(format!(
                "record {} carries {} values for {} measurements",
                id,
                values.len(),
                self.columns
            )));
        }
        let mut row = Vec::with_capacity(values.len() + 1);
        row.push(id.to_string());
        for (i, value) in values.iter().enumerate() {
            row.push(panel.get(i).format(value));
        }
        self.wtr.write_record(&row)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), DesignError> {
        self.wtr.flush()?;
        Ok(())
    }
}

/// Streams records back out of the file through a single reused cursor.
///
/// The cursor is a flyweight: `advance` rebinds its id and values in place,
/// so everything returned by `record()` is invalidated by the next
/// `advance`. Copy out whatever must outlive one iteration step; the borrow
/// on the reader enforces exactly that.
///
/// Header names are resolved against the panel up front: an unknown name,
/// a duplicate, or a missing panel measurement is fatal for the phase.
/// Individual rows that fail to parse are logged and skipped.
pub struct RecordStreamReader<'p> {
    rdr: csv::Reader<File>,
    panel: &'p MeasurementPanel,
    column_map: Vec<usize>,
    row: csv::StringRecord,
    cursor: SequenceRecord,
    line: u64,
}

impl<'p> RecordStreamReader<'p> {
    pub fn open(path: &Path, panel: &'p MeasurementPanel) -> Result<Self, DesignError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            // Field-count mismatches are handled per row, not as a hard stop
            .flexible(true)
            .from_path(path)?;

        let headers = rdr.headers()?.clone();
        if headers.get(0) != Some("Id") {
            return Err(DesignError::data(format!(
                "{}: stream header must begin with 'Id'",
                path.display()
            )));
        }

        let mut column_map = Vec::with_capacity(headers.len().saturating_sub(1));
        let mut seen = vec![false; panel.len()];
        for name in headers.iter().skip(1) {
            let index = panel.index_of(name).ok_or_else(|| {
                DesignError::data(format!(
                    "{}: unknown measurement '{}' in stream header",
                    path.display(),
                    name
                ))
            })?;
            if seen[index] {
                return Err(DesignError::data(format!(
                    "{}: measurement '{}' appears twice in stream header",
                    path.display(),
                    name
                )));
            }
            seen[index] = true;
            column_map.push(index);
        }
        for (index, seen) in seen.iter().enumerate() {
            if !seen {
                return Err(DesignError::data(format!(
                    "{}: stream header is missing measurement '{}'",
                    path.display(),
                    panel.get(index).name()
                )));
            }
        }

        Ok(RecordStreamReader {
            rdr,
            panel,
            column_map,
            row: csv::StringRecord::new(),
            cursor: SequenceRecord::with_len(panel.len()),
            line: 1,
        })
    }

    pub fn panel(&self) -> &MeasurementPanel {
        self.panel
    }

    /// Moves the cursor to the next parseable record. Returns false at end
    /// of stream. Malformed rows are skipped with a warning.
    pub fn advance(&mut self) -> Result<bool, DesignError> {
        'rows: loop {
            if !self.rdr.read_record(&mut self.row)? {
                return Ok(false);
            }
            self.line += 1;

            if self.row.len() != self.column_map.len() + 1 {
                warn!(
                    "line {}: expected {} fields, found {}, skipping",
                    self.line,
                    self.column_map.len() + 1,
                    self.row.len()
                );
                continue;
            }
            let id = match self.row.get(0).and_then(|f| f.trim().parse::<u64>().ok()) {
                Some(id) => id,
                None => {
                    warn!("line {}: unparseable record id, skipping", self.line);
                    continue;
                }
            };

            for (j, &index) in self.column_map.iter().enumerate() {
                let field = self.row.get(j + 1).unwrap_or_default();
                match self.panel.get(index).parse(field) {
                    Ok(value) => self.cursor.set_value(index, value),
                    Err(e) => {
                        warn!("line {}: {}, skipping record {}", self.line, e, id);
                        continue 'rows;
                    }
                }
            }
            self.cursor.set_id(id);
            debug!("cursor at record {}", id);
            return Ok(true);
        }
    }

    /// View of the current record. Invalidated by the next `advance`.
    pub fn record(&self) -> &SequenceRecord {
        &self.cursor
    }
}
