//! Summary statistics over a probability distribution

/// Derived view of one head's probability vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionStats {
    /// Index of the highest probability (first one on ties)
    pub top_index: usize,
    pub top1: f32,
    pub top2: f32,
    /// Normalized Shannon entropy in `[0, 1]`
    pub entropy: f32,
}

impl DistributionStats {
    /// Compute statistics; `None` for an empty vector
    pub fn from_probabilities(probs: &[f32]) -> Option<Self> {
        let (top_index, top1) = argmax(probs)?;
        let top2 = probs
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != top_index)
            .map(|(_, &p)| p)
            .fold(0.0f32, f32::max);

        Some(Self {
            top_index,
            top1,
            top2,
            entropy: normalized_entropy(probs),
        })
    }

    /// Top-1 minus top-2 probability
    pub fn gap(&self) -> f32 {
        self.top1 - self.top2
    }
}

/// Index and value of the largest element, first wins on ties
pub fn argmax(probs: &[f32]) -> Option<(usize, f32)> {
    probs
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((i, p)),
        })
}

/// Shannon entropy divided by `ln(N)`.
///
/// Zero-probability entries contribute nothing; a single-class distribution
/// has entropy 0.
pub fn normalized_entropy(probs: &[f32]) -> f32 {
    if probs.len() < 2 {
        return 0.0;
    }
    let entropy: f64 = probs
        .iter()
        .map(|&p| p as f64)
        .filter(|&p| p > 1e-15)
        .map(|p| -p * p.ln())
        .sum();
    (entropy / (probs.len() as f64).ln()) as f32
}
