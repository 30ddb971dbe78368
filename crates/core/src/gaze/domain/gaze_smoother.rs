use std::collections::VecDeque;

use crate::gaze::domain::eye_geometry::GazePoint;
use crate::shared::constants::GAZE_HISTORY_LEN;

/// Weighted moving average over the last few gaze samples.
///
/// Weights rise linearly from 0.5 (oldest) to 1.0 (newest) and are
/// normalized to sum to one.
pub struct GazeSmoother {
    history: VecDeque<GazePoint>,
    capacity: usize,
}

impl GazeSmoother {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
        }
    }

    pub fn smooth(&mut self, sample: GazePoint) -> GazePoint {
        self.history.push_back(sample);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        if self.history.len() < 2 {
            return sample;
        }

        let weights = linspace(0.5, 1.0, self.history.len());
        let total: f64 = weights.iter().sum();
        let (x, y) = self
            .history
            .iter()
            .zip(&weights)
            .fold((0.0, 0.0), |(x, y), (g, w)| (x + g.x * w, y + g.y * w));
        GazePoint::new(x / total, y / total)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for GazeSmoother {
    fn default() -> Self {
        Self::new(GAZE_HISTORY_LEN)
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}
