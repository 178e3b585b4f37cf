use tracing::{debug, error, info};

use crate::errors::DesignError;
use crate::models::{SelectedProbe, Value};

/// Fixed tiling geometry: window length and the step the boundary advances
/// by. Both must be positive; the common configuration sets step == length
/// for contiguous, non-overlapping windows.
#[derive(Debug, Clone, Copy)]
pub struct WindowGeometry {
    pub length: u64,
    pub step: u64,
}

impl WindowGeometry {
    pub fn new(length: u64, step: u64) -> Result<Self, DesignError> {
        if length == 0 {
            return Err(DesignError::config("window length must be > 0"));
        }
        if step == 0 {
            return Err(DesignError::config("window step must be > 0"));
        }
        Ok(WindowGeometry { length, step })
    }
}

/// How a window that closes without any candidate is reported. Plain tiling
/// treats it as an anomaly; tiling-zone expects sparse coverage and stays
/// quiet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmptyWindowPolicy {
    LogError,
    Silent,
}

/// Borrowed view of one scored stream record. The underlying record is a
/// reused cursor, so anything the engine wants to keep is snapshotted into
/// an owned `SelectedProbe`.
#[derive(Debug)]
pub struct ScoredCandidate<'a> {
    pub id: u64,
    pub chromosome: &'a str,
    pub position: u64,
    pub score: f64,
    pub values: &'a [Value],
}

impl ScoredCandidate<'_> {
    fn snapshot(&self) -> SelectedProbe {
        SelectedProbe {
            id: self.id,
            chromosome: self.chromosome.to_string(),
            position: self.position,
            score: self.score,
            values: self.values.to_vec(),
            region: None,
        }
    }
}

/// Single-pass windowed selection: scans an ascending-by-(chromosome,
/// position) stream once and keeps O(1) state per chromosome, independent of
/// candidate count.
///
/// The subtlety is the trailing zone: a record at `pos >= startWindow + step`
/// sits inside the closing window but is, by construction, also inside the
/// window about to open. Its next-window eligibility is evaluated
/// immediately (`nextBest`), which is what makes one forward pass
/// sufficient; when the boundary then advances by exactly one step the
/// accumulated `nextBest` is promoted, otherwise it belonged to a window
/// that no longer exists in sequence and is discarded.
pub struct WindowEngine {
    geometry: WindowGeometry,
    policy: EmptyWindowPolicy,
    state: Option<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    chromosome: String,
    start_window: u64,
    end_window: u64,
    best: Option<SelectedProbe>,
    best_score: f64,
    next_best: Option<SelectedProbe>,
    next_best_score: f64,
    last_emitted: Option<u64>,
    windows_closed: u64,
    windows_skipped: u64,
    records_seen: u64,
}

impl WindowState {
    fn new(chromosome: &str, length: u64) -> Self {
        WindowState {
            chromosome: chromosome.to_string(),
            start_window: 0,
            end_window: length,
            best: None,
            best_score: f64::NEG_INFINITY,
            next_best: None,
            next_best_score: f64::NEG_INFINITY,
            last_emitted: None,
            windows_closed: 0,
            windows_skipped: 0,
            records_seen: 0,
        }
    }

    /// Takes the closing window's winner, applying the duplicate-emission
    /// guard: a candidate that already won the previous window is not
    /// emitted twice. A window with no winner at all is the "bad case".
    fn take_best(&mut self, policy: EmptyWindowPolicy) -> Option<SelectedProbe> {
        match self.best.take() {
            Some(probe) => {
                if self.last_emitted == Some(probe.id) {
                    debug!(
                        "candidate {} already emitted, suppressing duplicate",
                        probe.id
                    );
                    None
                } else {
                    self.last_emitted = Some(probe.id);
                    Some(probe)
                }
            }
            None => {
                match policy {
                    EmptyWindowPolicy::LogError => error!(
                        "no candidate found for window {}..{} on {}",
                        self.start_window, self.end_window, self.chromosome
                    ),
                    EmptyWindowPolicy::Silent => debug!(
                        "window {}..{} on {} had no eligible candidates",
                        self.start_window, self.end_window, self.chromosome
                    ),
                }
                None
            }
        }
    }

    /// Closes the current window because `pos` has reached its end: flush
    /// the winner, then advance the boundary until `pos` fits, skipping
    /// empty windows. The accumulated nextBest survives only a single-step
    /// advance.
    fn close_window(
        &mut self,
        geometry: WindowGeometry,
        policy: EmptyWindowPolicy,
        pos: u64,
    ) -> Option<SelectedProbe> {
        let emitted = self.take_best(policy);
        let mut skipped = 0u64;
        loop {
            self.start_window = self.end_window + 1;
            self.end_window += geometry.step;
            self.windows_closed += 1;
            if pos < self.end_window {
                break;
            }
            skipped += 1;
        }
        if skipped == 0 {
            self.best = self.next_best.take();
            self.best_score = self.next_best_score;
        } else {
            self.windows_skipped += skipped;
            match policy {
                EmptyWindowPolicy::LogError => error!(
                    "skipped {} windows with no candidates before {} on {}",
                    skipped, pos, self.chromosome
                ),
                EmptyWindowPolicy::Silent => {
                    debug!("skipped {} empty windows before {}", skipped, pos)
                }
            }
            self.best = None;
            self.best_score = f64::NEG_INFINITY;
        }
        self.next_best = None;
        self.next_best_score = f64::NEG_INFINITY;
        emitted
    }
}

impl WindowEngine {
    pub fn new(geometry: WindowGeometry, policy: EmptyWindowPolicy) -> Self {
        WindowEngine {
            geometry,
            policy,
            state: None,
        }
    }

    /// Feeds one record. Returns the winner of a window the record just
    /// closed, if any. At most one probe is emitted per step.
    pub fn step(&mut self, cand: &ScoredCandidate) -> Option<SelectedProbe> {
        let mut emitted = None;

        let chromosome_changed = self
            .state
            .as_ref()
            .map(|s| s.chromosome != cand.chromosome)
            .unwrap_or(true);
        if chromosome_changed {
            if let Some(mut old) = self.state.take() {
                emitted = old.take_best(self.policy);
                log_chromosome_summary(&old);
            }
            self.state = Some(WindowState::new(cand.chromosome, self.geometry.length));
        }

        let state = self.state.as_mut().expect("state initialized above");
        state.records_seen += 1;

        if cand.position >= state.end_window {
            let closed = state.close_window(self.geometry, self.policy, cand.position);
            // A freshly reset chromosome closes only empty windows; never
            // let that clobber the previous chromosome's flushed winner.
            if closed.is_some() {
                emitted = closed;
            }
        }

        if cand.score > state.best_score {
            state.best_score = cand.score;
            state.best = Some(cand.snapshot());
        }

        // Trailing-zone lookahead for the window about to open.
        if cand.position >= state.start_window + self.geometry.step
            && cand.score > state.next_best_score
        {
            state.next_best_score = cand.score;
            state.next_best = Some(cand.snapshot());
        }

        emitted
    }

    /// Stream end: flush the pending winner, if it was not already emitted
    /// for the same id.
    pub fn finish(&mut self) -> Option<SelectedProbe> {
        let mut state = self.state.take()?;
        let emitted = state.take_best(self.policy);
        log_chromosome_summary(&state);
        emitted
    }
}

fn log_chromosome_summary(state: &WindowState) {
    info!(
        "{}: {} records, {} windows closed, {} skipped",
        state.chromosome, state.records_seen, state.windows_closed, state.windows_skipped
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(length: u64, step: u64) -> WindowEngine {
        WindowEngine::new(
            WindowGeometry::new(length, step).unwrap(),
            EmptyWindowPolicy::LogError,
        )
    }

    fn feed(
        engine: &mut WindowEngine,
        id: u64,
        chromosome: &str,
        position: u64,
        score: f64,
    ) -> Option<SelectedProbe> {
        engine.step(&ScoredCandidate {
            id,
            chromosome,
            position,
            score,
            values: &[],
        })
    }

    fn drain(engine: &mut WindowEngine) -> Vec<u64> {
        engine.finish().into_iter().map(|p| p.id).collect()
    }

    #[test]
    fn geometry_must_be_positive() {
        assert!(WindowGeometry::new(0, 10).is_err());
        assert!(WindowGeometry::new(10, 0).is_err());
        assert!(WindowGeometry::new(10, 10).is_ok());
    }

    #[test]
    fn windows_are_independent_of_absolute_score() {
        // Window length 100: position 99 (score 5) wins [0,99], position 100
        // wins [100,199] despite the lower score.
        let mut eng = engine(100, 100);
        let mut out = Vec::new();
        out.extend(feed(&mut eng, 1, "chr1", 99, 5.0).map(|p| p.id));
        out.extend(feed(&mut eng, 2, "chr1", 100, 3.0).map(|p| p.id));
        out.extend(drain(&mut eng));
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn emission_order_follows_windows() {
        let mut eng = engine(60, 60);
        let mut out = Vec::new();
        out.extend(feed(&mut eng, 10, "chr1", 0, 0.8).map(|p| p.id));
        out.extend(feed(&mut eng, 11, "chr1", 10, 0.9).map(|p| p.id));
        out.extend(feed(&mut eng, 12, "chr1", 61, 0.5).map(|p| p.id));
        out.extend(drain(&mut eng));
        assert_eq!(out, vec![11, 12]);
    }

    #[test]
    fn first_seen_wins_score_ties() {
        let mut eng = engine(100, 100);
        assert!(feed(&mut eng, 1, "chr1", 5, 1.0).is_none());
        assert!(feed(&mut eng, 2, "chr1", 10, 1.0).is_none());
        assert_eq!(drain(&mut eng), vec![1]);
    }

    #[test]
    fn trailing_zone_record_wins_next_window() {
        // Step 60, length 100: [60,100) is the trailing zone of the first
        // window. A strong record there must win the next window after a
        // single-step advance even though it is never seen again.
        let mut eng = engine(100, 60);
        assert!(feed(&mut eng, 1, "chr1", 10, 1.0).is_none());
        let first = feed(&mut eng, 2, "chr1", 70, 9.0);
        assert!(first.is_none());
        // position 110 closes the first window; record 2 outscored record 1
        let emitted = feed(&mut eng, 3, "chr1", 110, 2.0).unwrap();
        assert_eq!(emitted.id, 2);
        // record 2 was promoted and still leads the open window; at stream
        // end the duplicate guard keeps it from being emitted twice
        assert_eq!(drain(&mut eng), Vec::<u64>::new());
    }

    #[test]
    fn promoted_candidate_can_be_beaten() {
        let mut eng = engine(100, 60);
        assert!(feed(&mut eng, 1, "chr1", 10, 1.0).is_none());
        assert!(feed(&mut eng, 2, "chr1", 70, 3.0).is_none());
        let emitted = feed(&mut eng, 3, "chr1", 110, 5.0).unwrap();
        assert_eq!(emitted.id, 2);
        assert_eq!(drain(&mut eng), vec![3]);
    }

    #[test]
    fn skipped_windows_discard_the_lookahead() {
        // The record at 70 is nextBest for the window after [0,100); jumping
        // to 500 skips several windows, so the lookahead belonged to a
        // window that no longer exists and must not leak into the fresh one.
        let mut eng = engine(100, 60);
        assert!(feed(&mut eng, 1, "chr1", 10, 1.0).is_none());
        assert!(feed(&mut eng, 2, "chr1", 70, 9.0).is_none());
        let emitted = feed(&mut eng, 3, "chr1", 500, 0.1).unwrap();
        assert_eq!(emitted.id, 2);
        assert_eq!(drain(&mut eng), vec![3]);
    }

    #[test]
    fn chromosome_change_flushes_and_resets() {
        let mut eng = engine(100, 100);
        assert!(feed(&mut eng, 1, "chr1", 40, 2.0).is_none());
        let flushed = feed(&mut eng, 2, "chr2", 10, 0.5).unwrap();
        assert_eq!(flushed.id, 1);
        assert_eq!(flushed.chromosome, "chr1");
        // chr2 restarts at window 1: position 10 is in [0,99]
        assert_eq!(drain(&mut eng), vec![2]);
    }

    #[test]
    fn chromosome_flush_survives_a_deep_first_position() {
        // chr2 opens with a record far past its first window: the empty
        // windows it skips must not swallow chr1's pending winner.
        let mut eng = engine(100, 100);
        assert!(feed(&mut eng, 1, "chr1", 40, 2.0).is_none());
        let flushed = feed(&mut eng, 2, "chr2", 730, 0.5).unwrap();
        assert_eq!(flushed.id, 1);
        assert_eq!(drain(&mut eng), vec![2]);
    }

    #[test]
    fn empty_stream_emits_nothing() {
        let mut eng = engine(100, 100);
        assert!(eng.finish().is_none());
    }

    #[test]
    fn nan_scores_never_become_best() {
        let mut eng = engine(100, 100);
        assert!(feed(&mut eng, 1, "chr1", 10, f64::NAN).is_none());
        // the window closes without a winner (logged, non-fatal)
        assert!(feed(&mut eng, 2, "chr1", 150, 1.0).is_none());
        assert_eq!(drain(&mut eng), vec![2]);
    }

    #[test]
    fn winner_snapshot_owns_its_values() {
        let mut eng = engine(100, 100);
        let values = vec![Value::Text("chr1".into()), Value::Float(0.5)];
        eng.step(&ScoredCandidate {
            id: 1,
            chromosome: "chr1",
            position: 10,
            score: 1.0,
            values: &values,
        });
        drop(values);
        let probe = eng.finish().unwrap();
        assert_eq!(probe.values.len(), 2);
        assert_eq!(probe.values[1], Value::Float(0.5));
    }

    #[test]
    fn winners_never_share_a_window() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut eng = engine(100, 100);
        let mut winners: Vec<(u64, u64)> = Vec::new();
        let mut pos = 0u64;
        for id in 1..=5_000u64 {
            pos += rng.gen_range(0..40);
            let score = rng.gen::<f64>();
            if let Some(p) = feed(&mut eng, id, "chr1", pos, score) {
                winners.push((p.id, p.position));
            }
        }
        if let Some(p) = eng.finish() {
            winners.push((p.id, p.position));
        }

        // at most ceil(span / length) winners over the covered span
        let span = pos + 1;
        assert!(winners.len() as u64 <= (span + 99) / 100);

        // winners come out in window order and never share a window
        let windows: Vec<u64> = winners.iter().map(|(_, p)| p / 100).collect();
        assert!(windows.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn replay_is_deterministic() {
        let stream: Vec<(u64, u64, f64)> = vec![
            (1, 5, 0.1),
            (2, 40, 0.7),
            (3, 99, 0.7),
            (4, 120, 0.3),
            (5, 260, 0.9),
            (6, 300, 0.2),
        ];
        let run = || {
            let mut eng = engine(100, 100);
            let mut out = Vec::new();
            for (id, pos, score) in &stream {
                out.extend(feed(&mut eng, *id, "chr1", *pos, *score).map(|p| p.id));
            }
            out.extend(drain(&mut eng));
            out
        };
        assert_eq!(run(), run());
        assert_eq!(run(), vec![2, 4, 5, 6]);
    }
}
