use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::errors::DesignError;

/// Reads a whole FASTA file into (name, sequence) pairs in file order.
/// Entry names are the first whitespace-separated token after '>'; sequence
/// lines are concatenated and uppercased. Chromosome-scale genomes fit in
/// memory for the organisms this tool targets.
pub fn read_fasta(path: &Path) -> Result<Vec<(String, String)>, DesignError> {
    let file = File::open(path).map_err(|e| {
        DesignError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let reader = BufReader::new(file);

    let mut entries: Vec<(String, String)> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            let name = header
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            if name.is_empty() {
                return Err(DesignError::data(format!(
                    "{}: FASTA entry with empty name",
                    path.display()
                )));
            }
            debug!("reading FASTA entry '{}'", name);
            entries.push((name, String::new()));
        } else {
            match entries.last_mut() {
                Some((_, seq)) => seq.push_str(&line.to_ascii_uppercase()),
                None => {
                    return Err(DesignError::data(format!(
                        "{}: sequence data before the first FASTA header",
                        path.display()
                    )));
                }
            }
        }
    }
    if entries.is_empty() {
        return Err(DesignError::data(format!(
            "{}: no FASTA entries",
            path.display()
        )));
    }
    info!(
        "loaded {} FASTA entries ({} bases) from {}",
        entries.len(),
        entries.iter().map(|(_, s)| s.len()).sum::<usize>(),
        path.display()
    );
    Ok(entries)
}
