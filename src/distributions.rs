/*!
Scalar prior distributions over a single model parameter.

Every prior implements [`Distribution`]: a log-density and its derivative with respect
to the input, a named parameter vector with index-based access, an optional
[`Transform`](crate::transform::Transform) per parameter, tolerance-based equality,
and the two serialization forms (the line-oriented text stream of
[`crate::io::stream`] and the structured record of [`crate::io::record`]).

The concrete priors are [`Gaussian`] (zero mean, parameterized by its precision),
[`Gamma`] (shape `a`, rate `b`) and [`Wang`] (`p(x) ∝ x^-M`).

# Examples

```rust
use mini_priors::distributions::{Distribution, Gamma, Gaussian};

let mut gauss = Gaussian::with_precision(2.0);
let lp = gauss.log_prob(1.0);
assert!(lp < 0.0);
assert_eq!(gauss.grad_input(1.0), -2.0);

gauss.set_param(4.0, 0).unwrap();
assert_eq!(gauss.param(0).unwrap(), 4.0);
assert!(gauss.set_param(1.0, 3).is_err());

let gamma = Gamma::with_params(2.0, 1.0);
assert_eq!(gamma.param_name(1).unwrap(), "b");
assert!(!gamma.equals(&gauss, 1e3));
```
*/

use std::fmt;
use std::io::{BufRead, Write};

use approx::AbsDiffEq;
use indexmap::IndexMap;
use ndarray::{Array1, ArrayView1};

use crate::error::{DistError, Result};
use crate::io::{record, stream};
use crate::transform::{NegLogLogitTransform, Transform, TransformSet};

/// `ln(2π)`.
const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Ordered, name-indexed parameter values.
///
/// Populated once by a variant's constructor; afterwards only values change, so the
/// parameter count and names stay fixed for the lifetime of the distribution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamSet {
    values: IndexMap<String, f64>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter. Only used while a variant builds its initial set.
    fn push(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.len() {
            Ok(())
        } else {
            Err(DistError::IndexOutOfRange {
                index,
                num_params: self.len(),
            })
        }
    }

    pub fn name(&self, index: usize) -> Result<&str> {
        self.check(index)?;
        Ok(self.values.get_index(index).map(|(k, _)| k.as_str()).unwrap_or_default())
    }

    pub fn get(&self, index: usize) -> Result<f64> {
        self.check(index)?;
        Ok(self.values[index])
    }

    pub fn set(&mut self, value: f64, index: usize) -> Result<()> {
        self.check(index)?;
        self.values[index] = value;
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn to_array(&self) -> Array1<f64> {
        self.values.values().copied().collect()
    }

    /// Overwrites every value; the length must match exactly.
    pub fn assign(&mut self, values: ArrayView1<f64>) -> Result<()> {
        if values.len() != self.len() {
            return Err(DistError::ParamLength {
                expected: self.len(),
                found: values.len(),
            });
        }
        for (slot, &v) in self.values.values_mut().zip(values.iter()) {
            *slot = v;
        }
        Ok(())
    }

    /// Value at an index the owning variant fixed at construction.
    fn at(&self, index: usize) -> f64 {
        self.values[index]
    }
}

/// State shared by every variant: tags, parameters and attached transforms.
#[derive(Debug, Clone)]
pub struct DistCore {
    dist_type: &'static str,
    name: &'static str,
    params: ParamSet,
    transforms: TransformSet,
}

impl DistCore {
    /// Builds an untransformed core from `(name, initial value)` pairs. A repeated name
    /// collapses into one parameter holding the last value.
    pub fn new(dist_type: &'static str, name: &'static str, params: &[(&str, f64)]) -> Self {
        let mut set = ParamSet::new();
        for &(pname, value) in params {
            set.push(pname, value);
        }
        Self {
            dist_type,
            name,
            params: set,
            transforms: TransformSet::new(),
        }
    }

    /// Like [`DistCore::new`], with a positivity transform on every parameter.
    pub fn positive(dist_type: &'static str, name: &'static str, params: &[(&str, f64)]) -> Self {
        let mut core = Self::new(dist_type, name, params);
        for i in 0..core.params.len() {
            core.transforms.insert(i, Box::new(NegLogLogitTransform));
        }
        core
    }

    /// `f(transform at i, values[i])` for every index.
    fn map_transformed(
        &self,
        values: ArrayView1<f64>,
        f: impl Fn(Option<&dyn Transform>, f64) -> f64,
    ) -> Array1<f64> {
        values
            .indexed_iter()
            .map(|(i, &v)| f(self.transforms.get(i), v))
            .collect()
    }
}

/// The capability set every prior provides.
///
/// Implementors only supply access to their [`DistCore`] and the closed-form density
/// and gradient; parameter access, equality and serialization come for free.
pub trait Distribution: Send + Sync + fmt::Debug {
    fn core(&self) -> &DistCore;

    fn core_mut(&mut self) -> &mut DistCore;

    /// Log-density at `x`.
    fn log_prob(&self, x: f64) -> f64;

    /// `d/dx log_prob(x)`.
    fn grad_input(&self, x: f64) -> f64;

    fn box_clone(&self) -> Box<dyn Distribution>;

    /// The tag used for dispatch and equality.
    fn dist_type(&self) -> &str {
        self.core().dist_type
    }

    /// Display label.
    fn name(&self) -> &str {
        self.core().name
    }

    fn num_params(&self) -> usize {
        self.core().params.len()
    }

    fn param_name(&self, index: usize) -> Result<&str> {
        self.core().params.name(index)
    }

    fn param(&self, index: usize) -> Result<f64> {
        self.core().params.get(index)
    }

    fn set_param(&mut self, value: f64, index: usize) -> Result<()> {
        self.core_mut().params.set(value, index)
    }

    fn param_set(&self) -> &ParamSet {
        &self.core().params
    }

    fn params(&self) -> Array1<f64> {
        self.core().params.to_array()
    }

    fn set_params(&mut self, values: ArrayView1<f64>) -> Result<()> {
        self.core_mut().params.assign(values)
    }

    fn transforms(&self) -> &TransformSet {
        &self.core().transforms
    }

    fn transforms_mut(&mut self) -> &mut TransformSet {
        &mut self.core_mut().transforms
    }

    /// Parameters mapped into the unconstrained space of their transforms.
    fn transformed_params(&self) -> Array1<f64> {
        self.core()
            .map_transformed(self.params().view(), |t, x| t.map_or(x, |t| t.inverse(x)))
    }

    fn set_transformed_params(&mut self, values: ArrayView1<f64>) -> Result<()> {
        let mapped = self
            .core()
            .map_transformed(values, |t, a| t.map_or(a, |t| t.forward(a)));
        self.set_params(mapped.view())
    }

    /// `dx/da` for each parameter; 1 where no transform is attached.
    fn transform_gradient_factors(&self) -> Array1<f64> {
        self.core()
            .map_transformed(self.params().view(), |t, x| t.map_or(1.0, |t| t.grad_factor(x)))
    }

    /// Same type tag and every parameter within `tol` (absolute).
    fn equals(&self, other: &dyn Distribution, tol: f64) -> bool {
        if self.dist_type() != other.dist_type() {
            return false;
        }
        if self.num_params() != other.num_params() {
            return false;
        }
        self.params().abs_diff_eq(&other.params(), tol)
    }

    /// Writes the `numParams=` line and the value line.
    fn write_params_to_stream(&self, out: &mut dyn Write) -> Result<()> {
        stream::write_param_block(self.param_set(), out)
    }

    /// Parses the parameter block written by [`Distribution::write_params_to_stream`].
    fn read_params_from_stream(&mut self, input: &mut dyn BufRead) -> Result<()> {
        let values = stream::read_param_block(input, self.num_params())?;
        self.set_params(values.view())
    }

    fn to_record(&self) -> serde_json::Value {
        record::dist_to_record(self.dist_type(), self.param_set(), self.transforms())
    }

    /// Restores transforms and parameters from a record written by the same variant.
    fn read_record(&mut self, value: &serde_json::Value) -> Result<()> {
        let (params, transforms) = record::dist_from_record(value, self.dist_type(), self.param_set())?;
        self.core_mut().transforms = transforms;
        self.set_params(params.view())
    }
}

impl Clone for Box<dyn Distribution> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// `x * ln(y)`, taken as zero when `x == 0` whatever `y` is.
fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * y.ln()
    }
}

/**
Zero-mean Gaussian prior with a single `precision` (inverse variance) parameter.

`log p(x) = -precision x² / 2 - (ln 2π - ln precision) / 2`
*/
#[derive(Debug, Clone)]
pub struct Gaussian {
    core: DistCore,
}

impl Gaussian {
    pub const TYPE: &'static str = "gaussian";
    const PRECISION: usize = 0;

    /// Unit precision.
    pub fn new() -> Self {
        Self {
            core: DistCore::positive(Self::TYPE, "Gaussian prior", &[("precision", 1.0)]),
        }
    }

    pub fn with_precision(precision: f64) -> Self {
        let mut dist = Self::new();
        dist.core.params.values[Self::PRECISION] = precision;
        dist
    }

    pub fn precision(&self) -> f64 {
        self.core.params.at(Self::PRECISION)
    }
}

impl Default for Gaussian {
    fn default() -> Self {
        Self::new()
    }
}

impl Distribution for Gaussian {
    fn core(&self) -> &DistCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DistCore {
        &mut self.core
    }

    fn log_prob(&self, x: f64) -> f64 {
        let precision = self.precision();
        -0.5 * precision * x * x - 0.5 * (LN_2PI - precision.ln())
    }

    fn grad_input(&self, x: f64) -> f64 {
        -self.precision() * x
    }

    fn box_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}

/**
Gamma prior with shape `a` and rate `b`.

`log p(x) = a ln b - ln Γ(a) + (a - 1) ln x - b x`. Starts out very vague
(`a = b = 1e-6`).
*/
#[derive(Debug, Clone)]
pub struct Gamma {
    core: DistCore,
}

impl Gamma {
    pub const TYPE: &'static str = "gamma";
    const SHAPE: usize = 0;
    const RATE: usize = 1;

    pub fn new() -> Self {
        Self {
            core: DistCore::positive(Self::TYPE, "gamma prior", &[("a", 1e-6), ("b", 1e-6)]),
        }
    }

    pub fn with_params(a: f64, b: f64) -> Self {
        let mut dist = Self::new();
        dist.core.params.values[Self::SHAPE] = a;
        dist.core.params.values[Self::RATE] = b;
        dist
    }

    pub fn shape(&self) -> f64 {
        self.core.params.at(Self::SHAPE)
    }

    pub fn rate(&self) -> f64 {
        self.core.params.at(Self::RATE)
    }
}

impl Default for Gamma {
    fn default() -> Self {
        Self::new()
    }
}

impl Distribution for Gamma {
    fn core(&self) -> &DistCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DistCore {
        &mut self.core
    }

    fn log_prob(&self, x: f64) -> f64 {
        let (a, b) = (self.shape(), self.rate());
        a * b.ln() - special::Gamma::ln_gamma(a).0 + xlogy(a - 1.0, x) - b * x
    }

    fn grad_input(&self, x: f64) -> f64 {
        (self.shape() - 1.0) / x - self.rate()
    }

    fn box_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}

/**
The improper `p(x) ∝ x^-M` prior used for kernel hyperparameters in Gaussian process
dynamical models.
*/
#[derive(Debug, Clone)]
pub struct Wang {
    core: DistCore,
}

impl Wang {
    pub const TYPE: &'static str = "wang";
    const EXPONENT: usize = 0;

    pub fn new() -> Self {
        Self {
            core: DistCore::positive(Self::TYPE, "Wang's GPDM prior", &[("M", 1.0)]),
        }
    }

    pub fn with_exponent(m: f64) -> Self {
        let mut dist = Self::new();
        dist.core.params.values[Self::EXPONENT] = m;
        dist
    }

    pub fn exponent(&self) -> f64 {
        self.core.params.at(Self::EXPONENT)
    }
}

impl Default for Wang {
    fn default() -> Self {
        Self::new()
    }
}

impl Distribution for Wang {
    fn core(&self) -> &DistCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DistCore {
        &mut self.core
    }

    fn log_prob(&self, x: f64) -> f64 {
        -self.exponent() * x.ln()
    }

    fn grad_input(&self, x: f64) -> f64 {
        -self.exponent() / x
    }

    fn box_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}
