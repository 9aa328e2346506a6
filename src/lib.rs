pub mod distributions;
pub mod error;
pub mod io;
pub mod priors;
pub mod registry;
pub mod transform;

pub use distributions::{Distribution, Gamma, Gaussian, Wang};
pub use error::{DistError, Result};
pub use priors::{LoadPolicy, ParamPriors, PriorGroup};
pub use registry::DistRegistry;
