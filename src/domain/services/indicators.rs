//! Price-series indicators over closing prices

pub trait Indicator {
    /// Indicator values for every full window of `values`, oldest first
    fn calculate(&self, values: &[f64]) -> Vec<f64>;

    fn latest(&self, values: &[f64]) -> Option<f64> {
        self.calculate(values).last().copied()
    }
}

/// Mean of the last `window` prices, `None` when there are fewer prices than that
pub fn sma(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window {
        return None;
    }
    let tail = &prices[prices.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Percentage move from `entry` to `current`
pub fn percent_change(entry: f64, current: f64) -> Option<f64> {
    if entry == 0.0 || !entry.is_finite() || !current.is_finite() {
        return None;
    }
    Some((current - entry) / entry * 100.0)
}

pub struct Sma {
    pub period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Sma { period }
    }
}

impl Indicator for Sma {
    fn calculate(&self, values: &[f64]) -> Vec<f64> {
        if self.period == 0 || values.len() < self.period {
            return vec![];
        }
        let mut result = Vec::with_capacity(values.len() - self.period + 1);
        let mut sum: f64 = values[..self.period].iter().sum();
        result.push(sum / self.period as f64);

        for i in self.period..values.len() {
            sum += values[i] - values[i - self.period];
            result.push(sum / self.period as f64);
        }
        result
    }
}

pub struct Ema {
    pub period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Ema { period }
    }
}

impl Indicator for Ema {
    fn calculate(&self, values: &[f64]) -> Vec<f64> {
        if values.is_empty() || self.period == 0 {
            return vec![];
        }
        let mut ema_values = Vec::with_capacity(values.len());
        let multiplier = 2.0 / (self.period as f64 + 1.0);

        // Seeded with the SMA of the first window
        let initial_count = self.period.min(values.len());
        let mut ema = values[..initial_count].iter().sum::<f64>() / initial_count as f64;
        ema_values.push(ema);

        for &val in values.iter().skip(self.period) {
            ema = (val - ema) * multiplier + ema;
            ema_values.push(ema);
        }

        ema_values
    }
}

/// Compact description of a price series, logged once per evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSummary {
    pub samples: usize,
    pub first: f64,
    pub last: f64,
    pub low: f64,
    pub high: f64,
}

impl PriceSummary {
    pub fn of(prices: &[f64]) -> Option<Self> {
        let first = *prices.first()?;
        let last = *prices.last()?;
        let (low, high) = prices
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| {
                (lo.min(p), hi.max(p))
            });
        Some(PriceSummary {
            samples: prices.len(),
            first,
            last,
            low,
            high,
        })
    }

    pub fn change_percent(&self) -> Option<f64> {
        percent_change(self.first, self.last)
    }
}

impl std::fmt::Display for PriceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} samples, last {:.4}, range {:.4}-{:.4}",
            self.samples, self.last, self.low, self.high
        )?;
        if let Some(change) = self.change_percent() {
            write!(f, ", change {:+.2}%", change)?;
        }
        Ok(())
    }
}
