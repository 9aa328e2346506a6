/*!
Domain-constraining reparameterizations attached to distribution parameters.

A [`Transform`] maps an unconstrained optimizer value `a` onto the parameter's
domain `x` and back. Distributions own at most one transform per parameter index
through a [`TransformSet`]; the set knows how to write itself to, and rebuild
itself from, a list of `{ index, type }` records.

# Examples

```rust
use mini_priors::transform::{NegLogLogitTransform, Transform};

let t = NegLogLogitTransform;
let x = t.forward(-3.0);
assert!(x > 0.0);
assert!((t.inverse(x) + 3.0).abs() < 1e-10);
```
*/

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DistError, Result};

/// Above this the softplus is the identity to machine precision.
const SOFTPLUS_CUTOFF: f64 = 20.0;

/// A reparameterization `x = forward(a)` with inverse `a = inverse(x)`.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Tag written to records; must be stable across versions.
    fn transform_type(&self) -> &'static str;

    /// Maps an unconstrained value onto the parameter domain.
    fn forward(&self, a: f64) -> f64;

    /// Maps a value in the parameter domain back to the unconstrained space.
    fn inverse(&self, x: f64) -> f64;

    /// `dx/da`, expressed in terms of `x`.
    fn grad_factor(&self, x: f64) -> f64;

    fn box_clone(&self) -> Box<dyn Transform>;
}

impl Clone for Box<dyn Transform> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Positivity constraint `x = ln(1 + e^a)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NegLogLogitTransform;

impl NegLogLogitTransform {
    pub const TYPE: &'static str = "negLogLogit";
}

impl Transform for NegLogLogitTransform {
    fn transform_type(&self) -> &'static str {
        Self::TYPE
    }

    fn forward(&self, a: f64) -> f64 {
        if a > SOFTPLUS_CUTOFF {
            a
        } else {
            a.exp().ln_1p()
        }
    }

    fn inverse(&self, x: f64) -> f64 {
        if x > SOFTPLUS_CUTOFF {
            x
        } else {
            x.exp_m1().ln()
        }
    }

    fn grad_factor(&self, x: f64) -> f64 {
        -(-x).exp_m1()
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(*self)
    }
}

/// Builds the transform registered under `tag`.
pub fn transform_from_tag(tag: &str) -> Result<Box<dyn Transform>> {
    match tag {
        NegLogLogitTransform::TYPE => Ok(Box::new(NegLogLogitTransform)),
        other => Err(DistError::UnknownType(other.to_string())),
    }
}

/// Structured form of one attached transform. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub index: usize,
    #[serde(rename = "type")]
    pub transform_type: String,
}

/// Sparse mapping from parameter index to an exclusively owned transform.
/// Indices without an entry are untransformed.
#[derive(Debug, Clone, Default)]
pub struct TransformSet {
    transforms: BTreeMap<usize, Box<dyn Transform>>,
}

impl TransformSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `transform` to `index`, returning the one it replaces.
    pub fn insert(
        &mut self,
        index: usize,
        transform: Box<dyn Transform>,
    ) -> Option<Box<dyn Transform>> {
        self.transforms.insert(index, transform)
    }

    pub fn remove(&mut self, index: usize) -> Option<Box<dyn Transform>> {
        self.transforms.remove(&index)
    }

    pub fn get(&self, index: usize) -> Option<&dyn Transform> {
        self.transforms.get(&index).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &dyn Transform)> {
        self.transforms.iter().map(|(&i, t)| (i, t.as_ref()))
    }

    pub fn to_records(&self) -> Vec<TransformRecord> {
        self.iter()
            .map(|(index, t)| TransformRecord {
                index: index + 1,
                transform_type: t.transform_type().to_string(),
            })
            .collect()
    }

    /// Rebuilds a set from records, rejecting indices outside `[1, num_params]`.
    pub fn from_records(records: &[TransformRecord], num_params: usize) -> Result<Self> {
        let mut set = Self::new();
        for record in records {
            if record.index == 0 || record.index > num_params {
                return Err(DistError::format(format!(
                    "transform index {} outside 1..={num_params}",
                    record.index
                )));
            }
            set.insert(record.index - 1, transform_from_tag(&record.transform_type)?);
        }
        Ok(set)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.to_records()
                .into_iter()
                .map(|r| {
                    serde_json::json!({ "index": r.index, "type": r.transform_type })
                })
                .collect(),
        )
    }

    pub fn from_value(value: &serde_json::Value, num_params: usize) -> Result<Self> {
        let records: Vec<TransformRecord> = serde_json::from_value(value.clone())?;
        Self::from_records(&records, num_params)
    }
}
