//! Alternative-level choice data and the validation that groups it into decisions.

use std::collections::HashMap;
use std::fmt;

use nalgebra::{DMatrix, DMatrixView};
use serde::{Deserialize, Serialize};

use crate::error::{ChoiceError, Result};

/// Identity of a decision: the respondent and, optionally, the task within the respondent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionKey {
    pub respondent: String,
    pub task: Option<String>,
}

impl fmt::Display for DecisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task {
            Some(task) => write!(f, "{}/{}", self.respondent, task),
            None => write!(f, "{}", self.respondent),
        }
    }
}

/// Choice data grouped into decisions of exactly `J` alternatives.
///
/// Rows of the feature matrix are stored decision by decision, so decision `d` owns rows
/// `d * J .. (d + 1) * J`. The structure is immutable once built.
#[derive(Clone, Debug)]
pub struct ChoiceData {
    features: DMatrix<f64>,
    names: Vec<String>,
    decisions: Vec<Decision>,
    alternatives: usize,
}

impl ChoiceData {
    /// Number of decisions.
    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    /// Number of alternatives per decision (`J`).
    pub fn alternatives_per_decision(&self) -> usize {
        self.alternatives
    }

    /// Number of covariates (`K`).
    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    /// Coefficient names, one per covariate.
    pub fn coefficient_names(&self) -> &[String] {
        &self.names
    }

    /// The grouped feature matrix, `(N * J) x K`.
    pub fn features(&self) -> &DMatrix<f64> {
        &self.features
    }

    /// Iterates over decisions in their stable order.
    pub fn decisions(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter()
    }

    /// Returns decision `index`, or `None` past the last decision.
    pub fn decision(&self, index: usize) -> Option<&Decision> {
        self.decisions.get(index)
    }

    /// Feature rows of one decision, `J x K`.
    pub fn decision_features(&self, decision: &Decision) -> DMatrixView<'_, f64> {
        self.features.rows(decision.start, self.alternatives)
    }

    /// Returns a copy with decisions in the order given by `order`, which must be a
    /// permutation of `0..decision_count()`.
    ///
    /// Used to check that estimates do not depend on the order decisions are stored in.
    pub fn reordered(&self, order: &[usize]) -> Result<Self> {
        if order.len() != self.decisions.len() {
            return Err(ChoiceError::dimension_mismatch(
                "decision order",
                self.decisions.len(),
                order.len(),
            ));
        }
        let j = self.alternatives;
        let mut features = DMatrix::zeros(self.features.nrows(), self.features.ncols());
        let mut decisions = Vec::with_capacity(order.len());
        let mut seen = vec![false; order.len()];
        for (position, &index) in order.iter().enumerate() {
            let source = self.decisions.get(index).ok_or_else(|| {
                ChoiceError::invalid_configuration(
                    "decision order",
                    format!("index {index} out of range"),
                )
            })?;
            if std::mem::replace(&mut seen[index], true) {
                return Err(ChoiceError::invalid_configuration(
                    "decision order",
                    format!("index {index} appears more than once"),
                ));
            }
            features
                .rows_mut(position * j, j)
                .copy_from(&self.features.rows(source.start, j));
            decisions.push(Decision {
                key: source.key.clone(),
                start: position * j,
                chosen: source.chosen,
            });
        }
        Ok(Self {
            features,
            names: self.names.clone(),
            decisions,
            alternatives: j,
        })
    }
}

/// Metadata for a single decision.
#[derive(Clone, Debug)]
pub struct Decision {
    key: DecisionKey,
    /// First row of this decision in the grouped feature matrix.
    pub(crate) start: usize,
    /// Offset of the chosen alternative inside the decision.
    pub(crate) chosen: usize,
}

impl Decision {
    /// Identity carried over from the input records.
    pub fn key(&self) -> &DecisionKey {
        &self.key
    }

    /// Offset (`0..J`) of the chosen alternative.
    pub fn chosen(&self) -> usize {
        self.chosen
    }

    /// Row range occupied by this decision, given `J`.
    pub fn range(&self, alternatives: usize) -> std::ops::Range<usize> {
        self.start..self.start + alternatives
    }
}

/// Builder that validates record lengths and group structure before constructing [`ChoiceData`].
#[derive(Debug)]
pub struct ChoiceDataBuilder {
    respondents: Vec<String>,
    chosen: Vec<bool>,
    tasks: Option<Vec<String>>,
    features: Option<DMatrix<f64>>,
    names: Option<Vec<String>>,
    alternatives: usize,
}

impl ChoiceDataBuilder {
    /// Start building from per-record respondent ids, chosen flags and the expected `J`.
    pub fn new(respondents: Vec<String>, chosen: Vec<bool>, alternatives: usize) -> Self {
        Self {
            respondents,
            chosen,
            tasks: None,
            features: None,
            names: None,
            alternatives,
        }
    }

    /// Adds a second grouping key, so that a decision is a `(respondent, task)` pair.
    pub fn tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Sets the record-level covariates, one row per record.
    pub fn features(mut self, matrix: DMatrix<f64>) -> Self {
        self.features = Some(matrix);
        self
    }

    /// Names the covariate columns. Defaults to `x0`, `x1`, ...
    pub fn names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    /// Groups records into decisions, failing on the first malformed group.
    pub fn build(self) -> Result<ChoiceData> {
        let n = self.respondents.len();
        let j = self.alternatives;
        if j < 2 {
            return Err(ChoiceError::invalid_configuration(
                "alternatives per decision",
                format!("need at least 2, found {j}"),
            ));
        }
        if n == 0 {
            return Err(ChoiceError::EmptyDataset);
        }
        if self.chosen.len() != n {
            return Err(ChoiceError::dimension_mismatch(
                "chosen flags",
                n,
                self.chosen.len(),
            ));
        }
        if let Some(tasks) = &self.tasks {
            if tasks.len() != n {
                return Err(ChoiceError::dimension_mismatch("task ids", n, tasks.len()));
            }
        }

        let raw = self
            .features
            .ok_or_else(|| ChoiceError::dimension_mismatch("features", n, 0))?;
        if raw.nrows() != n {
            return Err(ChoiceError::dimension_mismatch(
                "feature rows",
                n,
                raw.nrows(),
            ));
        }
        if raw.iter().any(|value| !value.is_finite()) {
            return Err(ChoiceError::NumericalError {
                context: "feature validation",
            });
        }

        let k = raw.ncols();
        let names = match self.names {
            Some(names) if names.len() != k => {
                return Err(ChoiceError::dimension_mismatch(
                    "coefficient names",
                    k,
                    names.len(),
                ))
            }
            Some(names) => names,
            None => (0..k).map(|c| format!("x{c}")).collect(),
        };

        let groups = group_records(&self.respondents, self.tasks.as_deref());

        let mut features = DMatrix::zeros(groups.len() * j, k);
        let mut decisions = Vec::with_capacity(groups.len());
        for (position, (key, rows)) in groups.into_iter().enumerate() {
            if rows.len() != j {
                return Err(ChoiceError::malformed_group(
                    key.to_string(),
                    format!("expected {j} alternatives, found {}", rows.len()),
                ));
            }
            let chosen: Vec<usize> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| self.chosen[**row])
                .map(|(offset, _)| offset)
                .collect();
            if chosen.len() != 1 {
                return Err(ChoiceError::malformed_group(
                    key.to_string(),
                    format!("expected exactly one chosen alternative, found {}", chosen.len()),
                ));
            }

            let start = position * j;
            for (offset, &row) in rows.iter().enumerate() {
                features.row_mut(start + offset).copy_from(&raw.row(row));
            }
            decisions.push(Decision {
                key,
                start,
                chosen: chosen[0],
            });
        }

        log::debug!(
            "built choice data: {} decisions x {} alternatives, {} covariates",
            decisions.len(),
            j,
            k
        );

        Ok(ChoiceData {
            features,
            names,
            decisions,
            alternatives: j,
        })
    }
}

/// Collects record indices per decision key, keyed groups ordered by first appearance.
fn group_records(
    respondents: &[String],
    tasks: Option<&[String]>,
) -> Vec<(DecisionKey, Vec<usize>)> {
    let mut index: HashMap<DecisionKey, usize> = HashMap::new();
    let mut groups: Vec<(DecisionKey, Vec<usize>)> = Vec::new();
    for (row, respondent) in respondents.iter().enumerate() {
        let key = DecisionKey {
            respondent: respondent.clone(),
            task: tasks.map(|t| t[row].clone()),
        };
        match index.get(&key) {
            Some(&group) => groups[group].1.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn builder_groups_by_respondent_and_task() {
        let respondents = ids(&["r1", "r1", "r1", "r1"]);
        let tasks = ids(&["t1", "t1", "t2", "t2"]);
        let chosen = vec![false, true, true, false];
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 2.0, 1.0, 3.0, 0.0, 4.0, 1.0]);

        let data = ChoiceDataBuilder::new(respondents, chosen, 2)
            .tasks(tasks)
            .features(x)
            .names(ids(&["price", "brand_b"]))
            .build()
            .expect("valid data");

        assert_eq!(data.decision_count(), 2);
        assert_eq!(data.feature_dim(), 2);
        let first = data.decision(0).unwrap();
        assert_eq!(first.key().to_string(), "r1/t1");
        assert_eq!(first.chosen(), 1);
        assert_eq!(data.decision(1).unwrap().chosen(), 0);
        assert_eq!(data.coefficient_names()[0], "price");
    }

    #[test]
    fn interleaved_records_are_gathered_in_stable_order() {
        let respondents = ids(&["a", "b", "a", "b"]);
        let chosen = vec![true, false, false, true];
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);

        let data = ChoiceDataBuilder::new(respondents, chosen, 2)
            .features(x)
            .build()
            .unwrap();

        let a = data.decision(0).unwrap();
        assert_eq!(a.key().respondent, "a");
        let rows = data.decision_features(a);
        assert_eq!(rows[(0, 0)], 1.0);
        assert_eq!(rows[(1, 0)], 3.0);
        assert_eq!(data.decision(1).unwrap().chosen(), 1);
    }

    #[test]
    fn wrong_group_size_is_malformed() {
        let respondents = ids(&["r1", "r1", "r2", "r2", "r2"]);
        let chosen = vec![true, false, true, false, false];
        let x = DMatrix::from_element(5, 1, 1.0);

        let result = ChoiceDataBuilder::new(respondents, chosen, 2)
            .features(x)
            .build();
        match result {
            Err(ChoiceError::MalformedGroup { decision, .. }) => assert_eq!(decision, "r2"),
            other => panic!("expected malformed group, got {other:?}"),
        }
    }

    #[test]
    fn chosen_count_must_be_one() {
        let x = DMatrix::from_element(2, 1, 1.0);
        let none = ChoiceDataBuilder::new(ids(&["r", "r"]), vec![false, false], 2)
            .features(x.clone())
            .build();
        assert!(matches!(none, Err(ChoiceError::MalformedGroup { .. })));

        let both = ChoiceDataBuilder::new(ids(&["r", "r"]), vec![true, true], 2)
            .features(x)
            .build();
        assert!(matches!(both, Err(ChoiceError::MalformedGroup { .. })));
    }

    #[test]
    fn reordering_moves_rows_with_decisions() {
        let respondents = ids(&["a", "a", "b", "b"]);
        let chosen = vec![true, false, false, true];
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let data = ChoiceDataBuilder::new(respondents, chosen, 2)
            .features(x)
            .build()
            .unwrap();

        let swapped = data.reordered(&[1, 0]).unwrap();
        let first = swapped.decision(0).unwrap();
        assert_eq!(first.key().respondent, "b");
        assert_eq!(first.chosen(), 1);
        assert_eq!(swapped.decision_features(first)[(0, 0)], 3.0);
        assert!(data.reordered(&[0]).is_err());
        assert!(swapped.decision(2).is_none());
    }

    #[test]
    fn reordering_rejects_repeated_indices() {
        let respondents = ids(&["a", "a", "b", "b"]);
        let chosen = vec![true, false, false, true];
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let data = ChoiceDataBuilder::new(respondents, chosen, 2)
            .features(x)
            .build()
            .unwrap();

        assert!(matches!(
            data.reordered(&[0, 0]),
            Err(ChoiceError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            data.reordered(&[0, 5]),
            Err(ChoiceError::InvalidConfiguration { .. })
        ));
    }
}
