use std::time::{Duration, Instant};

/// Records the begin/end of named search phases.
///
/// The searcher and the built-in backends report "Query Encoding",
/// "Candidate Generation", "Scoring" and similar phases through this trait.
pub trait Tracker {
    fn begin(&mut self, name: &str);
    fn end(&mut self, name: &str);
}

/// Tracker that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopTracker;

impl Tracker for NopTracker {
    fn begin(&mut self, _name: &str) {}
    fn end(&mut self, _name: &str) {}
}

/// Accumulates wall-clock time per phase, in first-seen order.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    phases: Vec<(String, Duration, usize)>,
    open: Vec<(String, Instant)>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(phase, total time, number of completed intervals)`
    pub fn phases(&self) -> &[(String, Duration, usize)] {
        &self.phases
    }

    pub fn total(&self, name: &str) -> Option<Duration> {
        self.phases
            .iter()
            .find(|(phase, _, _)| phase == name)
            .map(|(_, total, _)| *total)
    }

    pub fn summary(&self) -> String {
        self.phases
            .iter()
            .map(|(name, total, count)| {
                format!("{}: {:.3}ms ({}x)", name, total.as_secs_f64() * 1e3, count)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Tracker for ExecutionTracker {
    fn begin(&mut self, name: &str) {
        self.open.push((name.to_string(), Instant::now()));
    }

    fn end(&mut self, name: &str) {
        // Unmatched `end` calls are ignored.
        let Some(pos) = self.open.iter().rposition(|(open, _)| open == name) else {
            return;
        };
        let (name, started) = self.open.remove(pos);
        let elapsed = started.elapsed();
        match self.phases.iter_mut().find(|(phase, _, _)| *phase == name) {
            Some((_, total, count)) => {
                *total += elapsed;
                *count += 1;
            },
            None => self.phases.push((name, elapsed, 1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_tracker_accumulates_per_phase() {
        let mut tracker = ExecutionTracker::new();
        tracker.begin("Query Encoding");
        tracker.end("Query Encoding");
        tracker.begin("Scoring");
        tracker.end("Scoring");
        tracker.begin("Scoring");
        tracker.end("Scoring");
        tracker.end("never started");

        let phases = tracker.phases();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].0, "Query Encoding");
        assert_eq!(phases[1].2, 2);
        assert!(tracker.total("Scoring").is_some());
        assert!(tracker.summary().contains("Scoring"));
    }
}
