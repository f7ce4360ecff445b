//! Sliding-window smoothing of candidate fixes.

use std::collections::VecDeque;

use super::fusion::CandidateFix;
use crate::geo::{IndoorPosition, LocalFrame};

/// Keeps the last `capacity` candidates of the current floor.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    capacity: usize,
    entries: VecDeque<CandidateFix>,
}

impl SlidingWindow {
    /// Creates a window holding at most `capacity` fixes (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Number of fixes currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no fix is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all fixes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Adds a fix and returns the mean of the window.
    ///
    /// A fix on a different floor restarts the window.
    pub fn push(&mut self, fix: CandidateFix) -> CandidateFix {
        if self
            .entries
            .back()
            .is_some_and(|last| last.position.floor != fix.position.floor)
        {
            self.entries.clear();
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(fix);
        self.mean()
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(&self) -> CandidateFix {
        let newest = self.entries[self.entries.len() - 1];
        let frame = LocalFrame::new(newest.position.coordinate());
        let n = self.entries.len() as f64;

        let (mut sx, mut sy, mut sa) = (0.0, 0.0, 0.0);
        for entry in &self.entries {
            let (x, y) = frame.to_local(entry.position.coordinate());
            sx += x;
            sy += y;
            sa += entry.accuracy;
        }
        let coordinate = frame.to_geo((sx / n, sy / n));
        CandidateFix {
            position: IndoorPosition::new(coordinate.latitude, coordinate.longitude, newest.position.floor),
            accuracy: sa / n,
            contributors: newest.contributors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lng: f64, floor: i32) -> CandidateFix {
        CandidateFix {
            position: IndoorPosition::new(0.0, lng, floor),
            accuracy: lng * 1000.0,
            contributors: 1,
        }
    }

    #[test]
    fn test_window_averages_last_k() {
        let mut window = SlidingWindow::new(3);
        window.push(fix(0.0001, 0));
        window.push(fix(0.0002, 0));
        window.push(fix(0.0003, 0));
        let smoothed = window.push(fix(0.0007, 0));

        assert_eq!(window.len(), 3);
        assert!((smoothed.position.longitude - 0.0004).abs() < 1e-12);
        assert!((smoothed.accuracy - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_floor_change_restarts_window() {
        let mut window = SlidingWindow::new(3);
        window.push(fix(0.0001, 0));
        window.push(fix(0.0002, 0));
        let smoothed = window.push(fix(0.0009, 1));
        assert_eq!(window.len(), 1);
        assert_eq!(smoothed.position.floor, 1);
        assert!((smoothed.position.longitude - 0.0009).abs() < 1e-12);
    }

    #[test]
    fn test_zero_capacity_acts_as_one() {
        let mut window = SlidingWindow::new(0);
        window.push(fix(0.0001, 0));
        let smoothed = window.push(fix(0.0002, 0));
        assert!((smoothed.position.longitude - 0.0002).abs() < 1e-12);
        window.clear();
        assert!(window.is_empty());
    }
}
