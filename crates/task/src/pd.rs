use hzn_core::value_eq;
use hzn_core::value_gt;
use hzn_core::value_lt;
use hzn_core::Probability;
use hzn_core::Value;
use serde::Deserialize;
use serde::Serialize;

/// A discrete probability distribution over finitely many values.
///
/// Values are kept sorted and unique with strictly positive probabilities
/// summing to one. The empty distribution is the *undefined* sentinel used
/// by vector caches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscretePd {
    pub values: Vec<Value>,
    pub probabilities: Vec<Probability>,
}

impl DiscretePd {
    /// The undefined distribution (cache sentinel).
    pub fn undefined() -> Self {
        Self::default()
    }

    /// All probability mass on a single value.
    pub fn dirac(value: Value) -> Self {
        Self {
            values: vec![value],
            probabilities: vec![1.0],
        }
    }

    /// Mass `truth_prob` on 1 and the rest on 0, degenerating to a point
    /// distribution at the boundaries.
    pub fn bernoulli(truth_prob: Probability) -> Self {
        if value_lt(truth_prob, 0.0) || value_eq(truth_prob, 0.0) {
            Self::dirac(0.0)
        } else if value_gt(truth_prob, 1.0) || value_eq(truth_prob, 1.0) {
            Self::dirac(1.0)
        } else {
            Self {
                values: vec![0.0, 1.0],
                probabilities: vec![1.0 - truth_prob, truth_prob],
            }
        }
    }

    /// Builds a distribution from value/probability pairs, merging equal
    /// values and dropping zero-probability entries.
    pub fn discrete(pairs: impl IntoIterator<Item = (Value, Probability)>) -> Self {
        let mut merged: Vec<(Value, Probability)> = Vec::new();
        for (value, prob) in pairs {
            if !value_gt(prob, 0.0) {
                continue;
            }
            match merged
                .binary_search_by(|(v, _)| v.partial_cmp(&value).expect("NaN in distribution"))
            {
                Ok(at) => merged[at].1 += prob,
                Err(at) => merged.insert(at, (value, prob)),
            }
        }
        Self {
            values: merged.iter().map(|(v, _)| *v).collect(),
            probabilities: merged.iter().map(|(_, p)| *p).collect(),
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_deterministic(&self) -> bool {
        self.values.len() == 1
    }

    /// Sorted values, positive probabilities, total mass one.
    pub fn is_well_defined(&self) -> bool {
        if self.values.is_empty() || self.values.len() != self.probabilities.len() {
            return false;
        }
        let sorted = self.values.windows(2).all(|w| w[0] < w[1]);
        let positive = self.probabilities.iter().all(|&p| value_gt(p, 0.0));
        let mass: Probability = self.probabilities.iter().sum();
        sorted && positive && value_eq(mass, 1.0)
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Probability mass on a specific value.
    pub fn probability_of(&self, value: Value) -> Probability {
        self.values
            .iter()
            .zip(self.probabilities.iter())
            .find(|(v, _)| value_eq(**v, value))
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }

    pub fn falsity_probability(&self) -> Probability {
        self.probability_of(0.0)
    }

    pub fn truth_probability(&self) -> Probability {
        1.0 - self.falsity_probability()
    }

    /// True if the distribution cannot be non-zero.
    pub fn is_falsity(&self) -> bool {
        value_eq(self.falsity_probability(), 1.0)
    }

    /// True if the distribution cannot be zero.
    pub fn is_truth(&self) -> bool {
        value_eq(self.falsity_probability(), 0.0)
    }

    /// The value whose cumulative mass first exceeds `random`, for a draw
    /// uniform in [0, 1).
    pub fn sample(&self, random: Probability) -> Value {
        debug_assert!(self.is_well_defined());
        let mut mass = 0.0;
        for (value, prob) in self.values.iter().zip(self.probabilities.iter()) {
            mass += prob;
            if value_lt(random, mass) {
                return *value;
            }
        }
        *self.values.last().expect("sampled undefined distribution")
    }

    /// Deterministic-only accessor for the single carried value.
    pub fn value(&self) -> Value {
        debug_assert!(self.is_deterministic());
        self.values[0]
    }

    /// Stable bit-level key for structural comparison of distributions.
    pub fn structural_key(&self, out: &mut Vec<u64>) {
        out.push(self.values.len() as u64);
        for (value, prob) in self.values.iter().zip(self.probabilities.iter()) {
            out.push(value.to_bits());
            out.push(prob.to_bits());
        }
    }
}

impl PartialEq for DiscretePd {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| value_eq(*a, *b))
            && self
                .probabilities
                .iter()
                .zip(other.probabilities.iter())
                .all(|(a, b)| value_eq(*a, *b))
    }
}
impl Eq for DiscretePd {}

impl std::fmt::Display for DiscretePd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, (value, prob)) in self.values.iter().zip(self.probabilities.iter()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", value, prob)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bernoulli_degenerates_at_bounds() {
        assert!(DiscretePd::bernoulli(0.0).is_falsity());
        assert!(DiscretePd::bernoulli(1.0).is_truth());
        let pd = DiscretePd::bernoulli(0.3);
        assert!(pd.is_well_defined());
        assert!(value_eq(pd.truth_probability(), 0.3));
    }

    #[test]
    fn discrete_merges_and_drops_zero_mass() {
        let pd = DiscretePd::discrete([(1.0, 0.25), (0.0, 0.5), (1.0, 0.25), (2.0, 0.0)]);
        assert_eq!(pd.values, vec![0.0, 1.0]);
        assert!(value_eq(pd.probability_of(1.0), 0.5));
        assert!(pd.is_well_defined());
    }

    #[test]
    fn sampling_walks_cumulative_mass() {
        let pd = DiscretePd::discrete([(0.0, 0.5), (1.0, 0.5)]);
        assert!(value_eq(pd.sample(0.2), 0.0));
        assert!(value_eq(pd.sample(0.7), 1.0));
        assert!(value_eq(pd.sample(0.999999), 1.0));
    }

    #[test]
    fn undefined_is_the_cache_sentinel() {
        assert!(DiscretePd::undefined().is_undefined());
        assert!(!DiscretePd::dirac(0.0).is_undefined());
    }
}
