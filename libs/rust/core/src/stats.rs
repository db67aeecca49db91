//! Small descriptive-statistics helpers shared by the scorers.

/// Streaming mean/variance accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Welford { n: u64, mean: f64, m2: f64 }

impl Welford {
    pub fn new() -> Self { Self::default() }
    pub fn update(&mut self, x: f64) { self.n += 1; let delta = x - self.mean; self.mean += delta / (self.n as f64); let delta2 = x - self.mean; self.m2 += delta * delta2; }
    pub fn count(&self) -> u64 { self.n }
    pub fn mean(&self) -> f64 { self.mean }
    /// Sample (n - 1) variance; 0 below two observations.
    pub fn variance(&self) -> f64 { if self.n < 2 { 0.0 } else { self.m2 / (self.n as f64 - 1.0) } }
    pub fn std_dev(&self) -> f64 { self.variance().sqrt() }
}

impl FromIterator<f64> for Welford {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut w = Welford::new();
        for x in iter { w.update(x); }
        w
    }
}

/// Spread below this is treated as zero.
pub const SPREAD_EPSILON: f64 = 1e-9;

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Percentile over pre-sorted data with linear interpolation between ranks.
/// `p` is in [0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = (rank.ceil() as usize).min(n - 1);
            let frac = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}
