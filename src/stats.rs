//! Running and sliding-window accumulators used for population reporting.

use serde::Serialize;

/// Unbounded running mean, standard deviation and extrema.
#[derive(Debug, Clone)]
pub struct Stat {
    min: f32,
    max: f32,
    sum: f64,
    sum2: f64,
    count: u64,
}

impl Default for Stat {
    fn default() -> Self {
        Self::new()
    }
}

impl Stat {
    pub fn new() -> Self {
        Stat {
            min: f32::MAX,
            max: f32::MIN,
            sum: 0.0,
            sum2: 0.0,
            count: 0,
        }
    }

    pub fn add(&mut self, value: f32) {
        let v = value as f64;
        self.sum += v;
        self.sum2 += v * v;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn reset(&mut self) {
        *self = Stat::new();
    }

    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum / self.count as f64) as f32
    }

    pub fn stddev(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.sum / self.count as f64;
        (self.sum2 / self.count as f64 - mean * mean).max(0.0).sqrt() as f32
    }

    pub fn min(&self) -> f32 {
        if self.count == 0 { 0.0 } else { self.min }
    }

    pub fn max(&self) -> f32 {
        if self.count == 0 { 0.0 } else { self.max }
    }

    pub fn samples(&self) -> u64 {
        self.count
    }

    pub fn summary(&self) -> StatSummary {
        StatSummary {
            samples: self.samples(),
            mean: self.mean(),
            stddev: self.stddev(),
            min: self.min(),
            max: self.max(),
        }
    }
}

/// Statistics over the last `width` samples.
///
/// Extrema are kept lazily: evicting the sample that held the current minimum
/// or maximum only raises `need_min`/`need_max`, and the next `min()`/`max()`
/// rescans the window once before clearing the flag.
#[derive(Debug, Clone)]
pub struct StatRecent {
    min: f32,
    max: f32,
    sum: f64,
    sum2: f64,
    count: usize,
    history: Vec<f32>,
    width: usize,
    index: usize,
    need_min: bool,
    need_max: bool,
}

impl StatRecent {
    pub fn new(width: usize) -> Self {
        assert!(width > 0, "StatRecent width must be non-zero");
        StatRecent {
            min: f32::MAX,
            max: f32::MIN,
            sum: 0.0,
            sum2: 0.0,
            count: 0,
            history: vec![0.0; width],
            width,
            index: 0,
            need_min: false,
            need_max: false,
        }
    }

    pub fn add(&mut self, value: f32) {
        let v = value as f64;
        if self.count < self.width {
            self.sum += v;
            self.sum2 += v * v;
            self.min = self.min.min(value);
            self.max = self.max.max(value);
            self.history[self.index] = value;
            self.index += 1;
            self.count += 1;
            return;
        }

        if self.index >= self.width {
            self.index = 0;
        }
        let evicted = self.history[self.index];
        let e = evicted as f64;
        self.sum += v - e;
        self.sum2 += v * v - e * e;
        if value >= self.max {
            self.max = value;
        } else if evicted == self.max {
            self.need_max = true;
        }
        if value <= self.min {
            self.min = value;
        } else if evicted == self.min {
            self.need_min = true;
        }
        self.history[self.index] = value;
        self.index += 1;
    }

    pub fn reset(&mut self) {
        *self = StatRecent::new(self.width);
    }

    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum / self.count as f64) as f32
    }

    pub fn stddev(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.sum / self.count as f64;
        (self.sum2 / self.count as f64 - mean * mean).max(0.0).sqrt() as f32
    }

    pub fn min(&mut self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        if self.need_min {
            self.min = self.window().iter().copied().fold(f32::MAX, f32::min);
            self.need_min = false;
        }
        self.min
    }

    pub fn max(&mut self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        if self.need_max {
            self.max = self.window().iter().copied().fold(f32::MIN, f32::max);
            self.need_max = false;
        }
        self.max
    }

    pub fn samples(&self) -> usize {
        self.count
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn needs_rescan(&self) -> (bool, bool) {
        (self.need_min, self.need_max)
    }

    fn window(&self) -> &[f32] {
        &self.history[..self.count]
    }

    pub fn summary(&mut self) -> StatSummary {
        StatSummary {
            samples: self.samples() as u64,
            mean: self.mean(),
            stddev: self.stddev(),
            min: self.min(),
            max: self.max(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatSummary {
    pub samples: u64,
    pub mean: f32,
    pub stddev: f32,
    pub min: f32,
    pub max: f32,
}
