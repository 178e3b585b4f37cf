use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use rayon::prelude::*;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::errors::DesignError;
use crate::models::Candidate;

/// Candidates per external invocation. Keeps query files and tool memory
/// bounded on whole-chromosome batches.
const QUERY_BATCH: usize = 10_000;

/// Holds the wiring for the external genome-index tool that reports how
/// often a candidate sequence occurs in the genome.
#[derive(Debug, Clone)]
pub struct GenomeIndexOptions {
    /// Resolved path to the tool binary.
    pub binary: PathBuf,
    /// Prebuilt index directory or file handed to the tool unchanged.
    pub index: PathBuf,
    /// Report at most this many hits per candidate.
    pub max_hits: u32,
    /// Worker pool size for parallel batch invocations.
    pub threads: usize,
}

impl GenomeIndexOptions {
    /// Locates the binary (PATH lookup for bare names) and validates the
    /// index exists. Both failures are configuration errors at startup.
    pub fn resolve(
        binary: &str,
        index: &Path,
        max_hits: u32,
        threads: usize,
    ) -> Result<Self, DesignError> {
        let binary = which::which(binary).map_err(|e| {
            DesignError::config(format!("genome index binary '{}': {}", binary, e))
        })?;
        if !index.exists() {
            return Err(DesignError::config(format!(
                "genome index not found at {}",
                index.display()
            )));
        }
        Ok(GenomeIndexOptions {
            binary,
            index: index.to_path_buf(),
            max_hits,
            threads: threads.max(1),
        })
    }
}

/// Runs the tool over all candidates and returns candidate id -> hit count.
///
/// Batches fan out on a bounded pool; each batch writes a scratch FASTA
/// query file, invokes the tool once, and parses its tab-separated stdout
/// (`<candidate id><TAB><hit count>` per line). Candidates absent from the
/// output did not align anywhere and count as zero hits.
pub fn count_genome_hits(
    options: &GenomeIndexOptions,
    candidates: &[Candidate],
) -> Result<HashMap<u64, i64>, DesignError> {
    if candidates.is_empty() {
        return Ok(HashMap::new());
    }
    info!(
        "genome index lookup for {} candidates in batches of {}",
        candidates.len(),
        QUERY_BATCH
    );
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads)
        .build()
        .map_err(|e| DesignError::Tool(format!("worker pool: {}", e)))?;

    let batch_maps: Result<Vec<HashMap<u64, i64>>, DesignError> = pool.install(|| {
        candidates
            .par_chunks(QUERY_BATCH)
            .map(|batch| run_index_batch(options, batch))
            .collect()
    });

    let mut hits = HashMap::with_capacity(candidates.len());
    for map in batch_maps? {
        hits.extend(map);
    }
    Ok(hits)
}

fn run_index_batch(
    options: &GenomeIndexOptions,
    batch: &[Candidate],
) -> Result<HashMap<u64, i64>, DesignError> {
    let query = write_query_fasta(batch)?;
    debug!(
        "running {} on {} candidates",
        options.binary.display(),
        batch.len()
    );

    let output = Command::new(&options.binary)
        .arg("-i")
        .arg(&options.index)
        .arg("-q")
        .arg(query.path())
        .arg("-m")
        .arg(options.max_hits.to_string())
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("genome index tool stderr: {}", stderr);
        return Err(DesignError::Tool(format!(
            "genome index tool exited with {}",
            output.status
        )));
    }

    parse_hit_counts(&String::from_utf8_lossy(&output.stdout))
}

fn write_query_fasta(batch: &[Candidate]) -> Result<NamedTempFile, DesignError> {
    let mut file = NamedTempFile::new()?;
    for c in batch {
        writeln!(file, ">{}", c.id)?;
        writeln!(file, "{}", c.sequence)?;
    }
    file.flush()?;
    Ok(file)
}

fn parse_hit_counts(stdout: &str) -> Result<HashMap<u64, i64>, DesignError> {
    let mut hits = HashMap::new();
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let id = fields.next().and_then(|f| f.trim().parse::<u64>().ok());
        let count = fields.next().and_then(|f| f.trim().parse::<i64>().ok());
        match (id, count) {
            (Some(id), Some(count)) => {
                hits.insert(id, count);
            }
            _ => {
                debug!("skipping malformed index line: {}", line);
            }
        }
    }
    Ok(hits)
}
