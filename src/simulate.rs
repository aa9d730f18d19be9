//! Synthetic choice data drawn from the multinomial logit's own data-generating process.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::{ChoiceData, ChoiceDataBuilder};
use crate::error::{ChoiceError, Result};
use crate::likelihood::softmax;

/// Shape of a simulated conjoint-style study.
///
/// Column 0 is a price drawn uniformly from `price_levels`; the remaining `features - 1`
/// columns are independent Bernoulli(1/2) indicators.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationDesign {
    pub decisions: usize,
    pub alternatives: usize,
    pub features: usize,
    pub price_levels: Vec<f64>,
}

impl SimulationDesign {
    /// Design with the default price grid.
    pub fn new(decisions: usize, alternatives: usize, features: usize) -> Self {
        Self {
            decisions,
            alternatives,
            features,
            price_levels: vec![8.0, 12.0, 16.0, 20.0, 24.0, 28.0, 32.0],
        }
    }

    /// Replaces the grid the price column is drawn from.
    pub fn with_price_levels(mut self, levels: Vec<f64>) -> Self {
        self.price_levels = levels;
        self
    }

    /// Column names: `price`, then `x1`, `x2`, ...
    pub fn names(&self) -> Vec<String> {
        std::iter::once("price".to_string())
            .chain((1..self.features).map(|c| format!("x{c}")))
            .collect()
    }
}

/// Simulates `design.decisions` choices under coefficients `beta`.
///
/// The caller owns the generator, so identical seeds reproduce identical datasets.
pub fn simulate_choices<R: Rng + ?Sized>(
    design: &SimulationDesign,
    beta: &DVector<f64>,
    rng: &mut R,
) -> Result<ChoiceData> {
    if design.features == 0 {
        return Err(ChoiceError::invalid_configuration(
            "simulation features",
            "need at least the price column",
        ));
    }
    if beta.len() != design.features {
        return Err(ChoiceError::dimension_mismatch(
            "simulation coefficients",
            design.features,
            beta.len(),
        ));
    }
    if design.price_levels.is_empty() {
        return Err(ChoiceError::invalid_configuration(
            "price levels",
            "at least one level is required",
        ));
    }

    let j = design.alternatives;
    let rows = design.decisions * j;
    let mut features = DMatrix::zeros(rows, design.features);
    let mut respondents = Vec::with_capacity(rows);
    let mut chosen = vec![false; rows];

    for decision in 0..design.decisions {
        let start = decision * j;
        for row in start..start + j {
            let level = rng.gen_range(0..design.price_levels.len());
            features[(row, 0)] = design.price_levels[level];
            for col in 1..design.features {
                features[(row, col)] = if rng.gen_bool(0.5) { 1.0 } else { 0.0 };
            }
            respondents.push(format!("d{decision}"));
        }

        let probabilities = softmax(features.rows(start, j), beta)?;
        let draw: f64 = rng.gen();
        let mut cumulative = 0.0;
        let mut pick = j - 1;
        for (offset, p) in probabilities.iter().enumerate() {
            cumulative += p;
            if draw < cumulative {
                pick = offset;
                break;
            }
        }
        chosen[start + pick] = true;
    }

    ChoiceDataBuilder::new(respondents, chosen, j)
        .features(features)
        .names(design.names())
        .build()
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn simulated_data_is_well_formed() {
        let mut rng = SmallRng::seed_from_u64(1);
        let design = SimulationDesign::new(50, 3, 4);
        let beta = DVector::from_vec(vec![-0.1, 0.9, 0.5, -0.7]);
        let data = simulate_choices(&design, &beta, &mut rng).unwrap();
        assert_eq!(data.decision_count(), 50);
        assert_eq!(data.alternatives_per_decision(), 3);
        assert_eq!(data.coefficient_names(), design.names().as_slice());
        assert!(data
            .features()
            .column(0)
            .iter()
            .all(|p| design.price_levels.contains(p)));
    }

    #[test]
    fn same_seed_same_data() {
        let design = SimulationDesign::new(20, 3, 2);
        let beta = DVector::from_vec(vec![-0.1, 0.5]);
        let a = simulate_choices(&design, &beta, &mut SmallRng::seed_from_u64(9)).unwrap();
        let b = simulate_choices(&design, &beta, &mut SmallRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.features(), b.features());
        let chosen_a: Vec<usize> = a.decisions().map(|d| d.chosen()).collect();
        let chosen_b: Vec<usize> = b.decisions().map(|d| d.chosen()).collect();
        assert_eq!(chosen_a, chosen_b);
    }

    #[test]
    fn strong_price_effect_favours_cheap_alternatives() {
        let mut rng = SmallRng::seed_from_u64(4);
        let design = SimulationDesign::new(400, 2, 1).with_price_levels(vec![10.0, 20.0]);
        let beta = DVector::from_vec(vec![-1.0]);
        let data = simulate_choices(&design, &beta, &mut rng).unwrap();

        let mut cheap = 0usize;
        let mut contested = 0usize;
        for decision in data.decisions() {
            let x = data.decision_features(decision);
            if x[(0, 0)] != x[(1, 0)] {
                contested += 1;
                let cheapest = if x[(0, 0)] < x[(1, 0)] { 0 } else { 1 };
                if decision.chosen() == cheapest {
                    cheap += 1;
                }
            }
        }
        assert!(contested > 100);
        assert!(cheap as f64 / contested as f64 > 0.99);
    }
}
