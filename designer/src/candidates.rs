use bio_seq::prelude::{Dna, Seq};
use tracing::{debug, info};

use crate::errors::DesignError;
use crate::models::{Candidate, SequenceSource};

/// Slides a fixed-length window over each FASTA entry in turn, yielding
/// candidates in ascending (chromosome, position) order — the ordering the
/// selection engine depends on. Windows containing bases outside the DNA
/// alphabet (N runs, IUPAC ambiguity codes) are skipped.
pub struct TilingCandidateSource {
    genome: Vec<(String, String)>,
    probe_length: usize,
    probe_step: usize,
    entry: usize,
    offset: usize,
    next_id: u64,
    skipped_ambiguous: u64,
}

impl TilingCandidateSource {
    pub fn new(
        genome: Vec<(String, String)>,
        probe_length: usize,
        probe_step: usize,
    ) -> Result<Self, DesignError> {
        if probe_length == 0 {
            return Err(DesignError::config("probe length must be > 0"));
        }
        if probe_step == 0 {
            return Err(DesignError::config("probe step must be > 0"));
        }
        Ok(TilingCandidateSource {
            genome,
            probe_length,
            probe_step,
            entry: 0,
            offset: 0,
            next_id: 1,
            skipped_ambiguous: 0,
        })
    }

    pub fn skipped_ambiguous(&self) -> u64 {
        self.skipped_ambiguous
    }
}

impl SequenceSource for TilingCandidateSource {
    fn next_candidate(&mut self) -> Result<Option<Candidate>, DesignError> {
        loop {
            let Some((name, sequence)) = self.genome.get(self.entry) else {
                if self.skipped_ambiguous > 0 {
                    info!(
                        "tiling done, {} ambiguous windows skipped",
                        self.skipped_ambiguous
                    );
                }
                return Ok(None);
            };

            if self.offset + self.probe_length > sequence.len() {
                self.entry += 1;
                self.offset = 0;
                continue;
            }

            let position = self.offset as u64;
            let window = &sequence[self.offset..self.offset + self.probe_length];
            self.offset += self.probe_step;

            if Seq::<Dna>::try_from(window).is_err() {
                self.skipped_ambiguous += 1;
                debug!("skipping ambiguous window at {}:{}", name, position);
                continue;
            }

            let id = self.next_id;
            self.next_id += 1;
            return Ok(Some(Candidate {
                id,
                chromosome: name.clone(),
                position,
                sequence: window.to_string(),
            }));
        }
    }
}
