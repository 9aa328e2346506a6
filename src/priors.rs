/*!
Priors over the parameters of a model.

[`ParamPriors`] owns one distribution per assignment to a parameter index. For storage
the assignment is grouped by distribution type into [`PriorGroup`] records
(`{ "index": [1-based indices], "type": tag }`); each index still gets its own
distribution instance when the records are loaded back.

A group whose type is not registered, that names index 0, or (in JSON) that does not
decode as a record is skipped with a warning under [`LoadPolicy::Tolerant`] (the
default) and reported in the returned [`LoadReport`]. Under [`LoadPolicy::Strict`] it
fails the whole load and nothing is added.

# Examples

```rust
use mini_priors::distributions::{Gamma, Gaussian};
use mini_priors::priors::ParamPriors;
use ndarray::array;

let mut priors = ParamPriors::new();
priors.add(Gamma::with_params(2.0, 1.0), 0);
priors.add(Gaussian::new(), 2);
priors.add(Gamma::new(), 3);

let groups = priors.to_records()?;
assert_eq!(groups.len(), 2);
assert_eq!(groups[0].indices, vec![1, 4]);

let params = array![1.0, 5.0, 0.0, 2.0];
let lp = priors.log_prob(params.view())?;
assert!(lp.is_finite());
# Ok::<(), mini_priors::DistError>(())
```
*/

use indexmap::IndexMap;
use log::{debug, warn};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::distributions::Distribution;
use crate::error::{DistError, Result};
use crate::registry::DistRegistry;

/// What to do with a group that cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Skip the group, log a warning and report it.
    #[default]
    Tolerant,
    /// Fail the load with the group's error.
    Strict,
}

/// All parameter indices (1-based) that carry a prior of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorGroup {
    #[serde(rename = "index", deserialize_with = "one_or_many")]
    pub indices: Vec<usize>,
    #[serde(rename = "type")]
    pub dist_type: String,
}

/// A group left out of a tolerant load.
#[derive(Debug)]
pub struct SkippedGroup {
    /// Position of the group in the record list.
    pub position: usize,
    pub dist_type: String,
    pub error: DistError,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    /// Number of priors added.
    pub loaded: usize,
    pub skipped: Vec<SkippedGroup>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Ordered assignment of owned priors to parameter indices.
#[derive(Debug, Clone, Default)]
pub struct ParamPriors {
    entries: Vec<(usize, Box<dyn Distribution>)>,
}

impl ParamPriors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `dist` as the prior for parameter `index` (0-based).
    pub fn add_dist(&mut self, dist: Box<dyn Distribution>, index: usize) {
        self.entries.push((index, dist));
    }

    pub fn add<D: Distribution + 'static>(&mut self, dist: D, index: usize) {
        self.add_dist(Box::new(dist), index);
    }

    /// Removes and returns the `i`-th assignment.
    pub fn remove_dist(&mut self, i: usize) -> Option<(usize, Box<dyn Distribution>)> {
        if i < self.entries.len() {
            Some(self.entries.remove(i))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameter index of the `i`-th assignment.
    pub fn dist_index(&self, i: usize) -> Option<usize> {
        self.entries.get(i).map(|(index, _)| *index)
    }

    pub fn dist_type(&self, i: usize) -> Option<&str> {
        self.entries.get(i).map(|(_, dist)| dist.dist_type())
    }

    pub fn dist(&self, i: usize) -> Option<&dyn Distribution> {
        self.entries.get(i).map(|(_, dist)| dist.as_ref())
    }

    pub fn dist_mut(&mut self, i: usize) -> Option<&mut (dyn Distribution + 'static)> {
        self.entries.get_mut(i).map(|(_, dist)| dist.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &dyn Distribution)> {
        self.entries.iter().map(|(index, dist)| (*index, dist.as_ref()))
    }

    /// Sum of every prior's log-density at its parameter's value.
    pub fn log_prob(&self, params: ArrayView1<f64>) -> Result<f64> {
        self.iter().try_fold(0.0, |acc, (index, dist)| {
            Ok(acc + dist.log_prob(value_at(params, index)?))
        })
    }

    /// Gradient of [`ParamPriors::log_prob`] with respect to `params`.
    pub fn grad(&self, params: ArrayView1<f64>) -> Result<Array1<f64>> {
        let mut grad = Array1::<f64>::zeros(params.len());
        for (index, dist) in self.iter() {
            grad[index] += dist.grad_input(value_at(params, index)?);
        }
        Ok(grad)
    }

    /// Same length, and pairwise the same index and equal priors.
    pub fn equals(&self, other: &ParamPriors, tol: f64) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((i, a), (j, b))| i == j && a.equals(b, tol))
    }

    /// Groups the assignment by type, in order of first appearance. Indices are 1-based.
    pub fn to_records(&self) -> Result<Vec<PriorGroup>> {
        let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (index, dist) in self.iter() {
            let one_based = index.checked_add(1).ok_or_else(|| {
                DistError::format(format!("parameter index {index} has no 1-based form"))
            })?;
            groups.entry(dist.dist_type()).or_default().push(one_based);
        }
        Ok(groups
            .into_iter()
            .map(|(dist_type, indices)| PriorGroup {
                indices,
                dist_type: dist_type.to_string(),
            })
            .collect())
    }

    /// Tolerant load through the global registry.
    pub fn from_records(records: &[PriorGroup]) -> (Self, LoadReport) {
        let mut priors = Self::new();
        let built = records.iter().map(|group| {
            (group.dist_type.clone(), build_group(group, DistRegistry::global()))
        });
        let report = priors.extend_with(built, LoadPolicy::Tolerant).unwrap_or_default();
        (priors, report)
    }

    pub fn from_records_with(
        records: &[PriorGroup],
        registry: &DistRegistry,
        policy: LoadPolicy,
    ) -> Result<(Self, LoadReport)> {
        let mut priors = Self::new();
        let report = priors.extend_from_records(records, registry, policy)?;
        Ok((priors, report))
    }

    /// Appends a fresh prior for every index of every loadable group. A strict load that
    /// fails leaves the assignment untouched.
    pub fn extend_from_records(
        &mut self,
        records: &[PriorGroup],
        registry: &DistRegistry,
        policy: LoadPolicy,
    ) -> Result<LoadReport> {
        let built = records
            .iter()
            .map(|group| (group.dist_type.clone(), build_group(group, registry)));
        self.extend_with(built, policy)
    }

    /// Takes `(type tag, built priors)` per group, in record order.
    fn extend_with<I>(&mut self, built: I, policy: LoadPolicy) -> Result<LoadReport>
    where
        I: IntoIterator<Item = (String, Result<Vec<(usize, Box<dyn Distribution>)>>)>,
    {
        let mut report = LoadReport::default();
        let mut added = Vec::new();
        let mut groups = 0;
        for (position, (dist_type, dists)) in built.into_iter().enumerate() {
            groups += 1;
            match dists {
                Ok(dists) => added.extend(dists),
                Err(error) if policy == LoadPolicy::Strict => return Err(error),
                Err(error) => {
                    warn!(
                        "Skipping prior group {} of type `{}`: {}",
                        position, dist_type, error
                    );
                    report.skipped.push(SkippedGroup {
                        position,
                        dist_type,
                        error,
                    });
                }
            }
        }
        report.loaded = added.len();
        self.entries.extend(added);
        debug!(
            "Loaded {} prior(s) from {} group(s), skipped {}",
            report.loaded,
            groups,
            report.skipped.len()
        );
        Ok(report)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_records()?)?)
    }

    /// Tolerant load of a JSON array of group records, as written by
    /// [`ParamPriors::to_json`]. A group that does not decode is skipped like an unknown
    /// type; JSON that is not an array is an error.
    pub fn from_json(json: &str) -> Result<(Self, LoadReport)> {
        let values: Vec<Value> = serde_json::from_str(json)?;
        let registry = DistRegistry::global();
        let built = values.into_iter().map(|value| {
            let dist_type = value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let dists = serde_json::from_value::<PriorGroup>(value)
                .map_err(DistError::from)
                .and_then(|group| build_group(&group, registry));
            (dist_type, dists)
        });
        let mut priors = Self::new();
        let report = priors.extend_with(built, LoadPolicy::Tolerant)?;
        Ok((priors, report))
    }
}

/// One new prior per index, or the reason the whole group is unusable.
fn build_group(
    group: &PriorGroup,
    registry: &DistRegistry,
) -> Result<Vec<(usize, Box<dyn Distribution>)>> {
    if group.indices.contains(&0) {
        return Err(DistError::format("prior group indices are 1-based, found 0"));
    }
    group
        .indices
        .iter()
        .map(|&index| Ok((index - 1, registry.create(&group.dist_type)?)))
        .collect()
}

/// A lone index is accepted in place of a one-element list.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(usize),
        Many(Vec<usize>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(index) => vec![index],
        OneOrMany::Many(indices) => indices,
    })
}

fn value_at(params: ArrayView1<f64>, index: usize) -> Result<f64> {
    params
        .get(index)
        .copied()
        .ok_or(DistError::IndexOutOfRange {
            index,
            num_params: params.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::{Gamma, Gaussian, Wang};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn group(indices: &[usize], dist_type: &str) -> PriorGroup {
        PriorGroup {
            indices: indices.to_vec(),
            dist_type: dist_type.to_string(),
        }
    }

    fn sample_priors() -> ParamPriors {
        let mut priors = ParamPriors::new();
        priors.add(Gamma::new(), 0);
        priors.add(Wang::new(), 1);
        priors.add(Gamma::new(), 4);
        priors.add(Gaussian::new(), 2);
        priors
    }

    #[test]
    fn records_group_by_type_in_first_appearance_order() {
        let records = sample_priors().to_records().unwrap();
        assert_eq!(
            records,
            vec![group(&[1, 5], "gamma"), group(&[2], "wang"), group(&[3], "gaussian")]
        );
    }

    #[test]
    fn record_field_names() {
        let value = serde_json::to_value(group(&[1, 2], "wang")).unwrap();
        assert_eq!(value, serde_json::json!({ "index": [1, 2], "type": "wang" }));
    }

    #[test]
    fn records_round_trip() {
        let priors = sample_priors();
        let (back, report) = ParamPriors::from_records(&priors.to_records().unwrap());
        assert!(report.is_clean());
        assert_eq!(report.loaded, 4);

        let mut pairs: Vec<(usize, String)> = back
            .iter()
            .map(|(i, d)| (i, d.dist_type().to_string()))
            .collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                (0, "gamma".to_string()),
                (1, "wang".to_string()),
                (2, "gaussian".to_string()),
                (4, "gamma".to_string())
            ]
        );
    }

    #[test]
    fn grouped_indices_get_independent_instances() {
        let (mut priors, _) = ParamPriors::from_records(&[group(&[1, 2], "wang")]);
        priors.dist_mut(0).unwrap().set_param(5.0, 0).unwrap();
        assert_eq!(priors.dist(0).unwrap().param(0).unwrap(), 5.0);
        assert_eq!(priors.dist(1).unwrap().param(0).unwrap(), 1.0);
    }

    #[test]
    fn unknown_group_is_skipped_and_reported() {
        init_logger();
        let records = vec![
            group(&[1], "gaussian"),
            group(&[2, 3], "unknownkind"),
            group(&[4, 5], "gamma"),
        ];
        let (priors, report) = ParamPriors::from_records(&records);

        assert_eq!(priors.len(), 3);
        assert_eq!(report.loaded, 3);
        let indices: Vec<usize> = priors.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 3, 4]);

        assert_eq!(report.skipped.len(), 1);
        let skipped = &report.skipped[0];
        assert_eq!(skipped.position, 1);
        assert_eq!(skipped.dist_type, "unknownkind");
        assert!(matches!(&skipped.error, DistError::UnknownType(t) if t == "unknownkind"));
    }

    #[test]
    fn zero_index_skips_group() {
        init_logger();
        let (priors, report) = ParamPriors::from_records(&[group(&[0, 1], "wang")]);
        assert!(priors.is_empty());
        assert!(matches!(report.skipped[0].error, DistError::Format(_)));
    }

    #[test]
    fn strict_policy_fails_the_load() {
        let records = vec![group(&[1], "gaussian"), group(&[2], "unknownkind")];
        let result =
            ParamPriors::from_records_with(&records, DistRegistry::global(), LoadPolicy::Strict);
        assert!(matches!(result, Err(DistError::UnknownType(_))));
    }

    #[test]
    fn extend_appends_to_existing_assignment() {
        let mut priors = sample_priors();
        let report = priors
            .extend_from_records(
                &[group(&[7], "wang")],
                &DistRegistry::default(),
                LoadPolicy::Tolerant,
            )
            .unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(priors.len(), 5);
        assert_eq!(priors.dist_index(4), Some(6));
        assert_eq!(priors.dist_type(4), Some("wang"));
    }

    #[test]
    fn failed_strict_extend_leaves_assignment_untouched() {
        let mut priors = sample_priors();
        let records = vec![group(&[6], "wang"), group(&[7], "unknownkind")];
        let result =
            priors.extend_from_records(&records, &DistRegistry::default(), LoadPolicy::Strict);
        assert!(matches!(result, Err(DistError::UnknownType(_))));
        assert_eq!(priors.len(), 4);
        assert!(priors.equals(&sample_priors(), 0.0));
    }

    #[test]
    fn index_without_one_based_form_is_an_error() {
        let mut priors = ParamPriors::new();
        priors.add(Gamma::new(), usize::MAX);
        assert!(matches!(priors.to_records(), Err(DistError::Format(_))));
        assert!(priors.to_json().is_err());
    }

    #[test]
    fn log_prob_and_grad_sum_over_assignment() {
        let mut priors = ParamPriors::new();
        priors.add(Gaussian::with_precision(2.0), 0);
        priors.add(Wang::with_exponent(3.0), 1);
        priors.add(Gamma::with_params(2.0, 1.0), 1);

        let params = array![0.5, 2.0, 9.0];
        let expected = Gaussian::with_precision(2.0).log_prob(0.5)
            + Wang::with_exponent(3.0).log_prob(2.0)
            + Gamma::with_params(2.0, 1.0).log_prob(2.0);
        assert_abs_diff_eq!(priors.log_prob(params.view()).unwrap(), expected, epsilon = 1e-12);

        let grad = priors.grad(params.view()).unwrap();
        assert_abs_diff_eq!(grad, array![-1.0, -1.5 + (0.5 - 1.0), 0.0], epsilon = 1e-12);
    }

    #[test]
    fn log_prob_rejects_short_parameter_vector() {
        let priors = sample_priors();
        let params = array![1.0, 1.0];
        assert!(matches!(
            priors.log_prob(params.view()),
            Err(DistError::IndexOutOfRange { index: 4, num_params: 2 })
        ));
    }

    #[test]
    fn remove_and_clear() {
        let mut priors = sample_priors();
        let (index, dist) = priors.remove_dist(1).unwrap();
        assert_eq!((index, dist.dist_type()), (1, "wang"));
        assert_eq!(priors.len(), 3);
        assert!(priors.remove_dist(3).is_none());
        priors.clear();
        assert!(priors.is_empty());
    }

    #[test]
    fn json_round_trip() {
        let priors = sample_priors();
        let json = priors.to_json().unwrap();
        let (back, report) = ParamPriors::from_json(&json).unwrap();
        assert!(report.is_clean());
        assert_eq!(back.len(), priors.len());
        assert!(matches!(ParamPriors::from_json("{not json"), Err(DistError::Json(_))));
    }

    #[test]
    fn undecodable_json_group_is_skipped() {
        init_logger();
        let json = r#"[
            {"index": [1], "type": "gamma"},
            {"index": [-2], "type": "wang"},
            {"index": [3], "type": "gaussian"},
            {"index": [4]},
            {"index": [5], "type": 7}
        ]"#;
        let (priors, report) = ParamPriors::from_json(json).unwrap();

        let entries: Vec<(usize, &str)> = priors
            .iter()
            .map(|(i, d)| (i, d.dist_type()))
            .collect();
        assert_eq!(entries, vec![(0, "gamma"), (2, "gaussian")]);

        let positions: Vec<usize> = report.skipped.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![1, 3, 4]);
        assert_eq!(report.skipped[0].dist_type, "wang");
        assert_eq!(report.skipped[1].dist_type, "");
        assert!(report
            .skipped
            .iter()
            .all(|s| matches!(s.error, DistError::Json(_))));
    }

    #[test]
    fn json_accepts_a_lone_index() {
        let json = r#"[
            {"index": [1], "type": "gamma"},
            {"index": 2, "type": "wang"},
            {"index": [3], "type": "gaussian"}
        ]"#;
        let (priors, report) = ParamPriors::from_json(json).unwrap();
        assert!(report.is_clean());
        let indices: Vec<usize> = priors.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(priors.dist_type(1), Some("wang"));
        assert!(matches!(
            ParamPriors::from_json(r#"{"index": [1], "type": "gamma"}"#),
            Err(DistError::Json(_))
        ));
    }

    #[test]
    fn equality_is_positional() {
        let a = sample_priors();
        let mut b = sample_priors();
        assert!(a.equals(&b, 0.0));
        b.dist_mut(0).unwrap().set_param(1.0, 0).unwrap();
        assert!(!a.equals(&b, 1e-3));
        assert!(a.equals(&b, 2.0));
    }
}
