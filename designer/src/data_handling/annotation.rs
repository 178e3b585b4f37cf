use std::collections::HashMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{info, warn};

use crate::errors::DesignError;
use crate::models::Region;

/// Collaborator contract consumed by the zone selectors: map a candidate's
/// location to the annotated region (open reading frame) it falls in, if
/// any.
pub trait AnnotationLookup {
    fn region_at(&self, chromosome: &str, start: u64, length: u64) -> Option<&Region>;
}

/// In-memory region table, loaded from a tab-separated file with the columns
/// `name`, `chromosome`, `start`, `end` (inclusive coordinates). Regions are
/// kept sorted by start per chromosome for binary-search lookup.
pub struct AnnotationTable {
    by_chromosome: HashMap<String, Vec<Region>>,
}

impl AnnotationTable {
    pub fn load(path: &Path) -> Result<Self, DesignError> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_parse_options(CsvParseOptions::default().with_separator(b'\t'))
            .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
            .finish()?;

        let names = df.column("name")?.str()?.clone();
        let chromosomes = df.column("chromosome")?.str()?.clone();
        let starts = df.column("start")?.cast(&DataType::Int64)?;
        let starts = starts.i64()?;
        let ends = df.column("end")?.cast(&DataType::Int64)?;
        let ends = ends.i64()?;

        let mut regions = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            match (names.get(i), chromosomes.get(i), starts.get(i), ends.get(i)) {
                (Some(name), Some(chromosome), Some(start), Some(end))
                    if start >= 0 && end >= start =>
                {
                    regions.push(Region {
                        name: name.to_string(),
                        chromosome: chromosome.to_string(),
                        start: start as u64,
                        end: end as u64,
                    });
                }
                _ => {
                    warn!("skipping malformed annotation row {}", i);
                }
            }
        }
        info!(
            "loaded {} regions from {}",
            regions.len(),
            path.display()
        );
        Ok(Self::from_regions(regions))
    }

    pub fn from_regions(regions: Vec<Region>) -> Self {
        let mut by_chromosome: HashMap<String, Vec<Region>> = HashMap::new();
        for region in regions {
            by_chromosome
                .entry(region.chromosome.clone())
                .or_default()
                .push(region);
        }
        for list in by_chromosome.values_mut() {
            list.sort_by_key(|r| (r.start, r.end));
        }
        AnnotationTable { by_chromosome }
    }

    pub fn len(&self) -> usize {
        self.by_chromosome.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_chromosome.is_empty()
    }
}

impl AnnotationLookup for AnnotationTable {
    /// Returns the region overlapping [start, start + length). When regions
    /// overlap each other, the one containing `start` with the greatest
    /// start coordinate wins; otherwise the first region beginning inside
    /// the query span.
    fn region_at(&self, chromosome: &str, start: u64, length: u64) -> Option<&Region> {
        let regions = self.by_chromosome.get(chromosome)?;
        let idx = regions.partition_point(|r| r.start <= start);
        // Closest region starting at or before the query
        if idx > 0 {
            let r = &regions[idx - 1];
            if r.overlaps(start, length) {
                return Some(r);
            }
        }
        // Region starting inside the query span
        if idx < regions.len() {
            let r = &regions[idx];
            if r.overlaps(start, length) {
                return Some(r);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table() -> AnnotationTable {
        AnnotationTable::from_regions(vec![
            Region {
                name: "orf1".into(),
                chromosome: "chr1".into(),
                start: 100,
                end: 199,
            },
            Region {
                name: "orf2".into(),
                chromosome: "chr1".into(),
                start: 300,
                end: 450,
            },
            Region {
                name: "orf3".into(),
                chromosome: "chr2".into(),
                start: 0,
                end: 99,
            },
        ])
    }

    #[test]
    fn lookup_inside_and_outside_regions() {
        let t = table();
        assert_eq!(t.region_at("chr1", 150, 24).unwrap().name, "orf1");
        assert_eq!(t.region_at("chr1", 199, 24).unwrap().name, "orf1");
        assert!(t.region_at("chr1", 224, 24).is_none());
        assert_eq!(t.region_at("chr1", 290, 24).unwrap().name, "orf2");
        assert_eq!(t.region_at("chr2", 50, 24).unwrap().name, "orf3");
        assert!(t.region_at("chr3", 50, 24).is_none());
    }

    #[test]
    fn loads_tab_separated_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name\tchromosome\tstart\tend").unwrap();
        writeln!(file, "orfA\tchr1\t10\t89").unwrap();
        writeln!(file, "orfB\tchr1\t200\t299").unwrap();
        file.flush().unwrap();

        let t = AnnotationTable::load(file.path()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.region_at("chr1", 20, 24).unwrap().name, "orfA");
        assert!(t.region_at("chr1", 100, 24).is_none());
    }
}
