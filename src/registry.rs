/*!
Type-tag dispatch: a map from a distribution's type tag to a constructor.

Readers that must build a distribution from a tag they find in their input (the text
stream and the prior collection records) look the tag up here. Adding a variant means
registering it, never editing the readers.

# Examples

```rust
use mini_priors::distributions::{DistCore, Distribution};
use mini_priors::registry::DistRegistry;

#[derive(Debug, Clone)]
struct Flat {
    core: DistCore,
}

impl Distribution for Flat {
    fn core(&self) -> &DistCore { &self.core }
    fn core_mut(&mut self) -> &mut DistCore { &mut self.core }
    fn log_prob(&self, _x: f64) -> f64 { 0.0 }
    fn grad_input(&self, _x: f64) -> f64 { 0.0 }
    fn box_clone(&self) -> Box<dyn Distribution> { Box::new(self.clone()) }
}

let mut registry = DistRegistry::default();
registry.register("flat", || Box::new(Flat { core: DistCore::new("flat", "flat prior", &[]) }));
assert_eq!(registry.create("flat").unwrap().dist_type(), "flat");
assert!(registry.create("cauchy").is_err());
```
*/

use std::sync::OnceLock;

use indexmap::IndexMap;

use crate::distributions::{Distribution, Gamma, Gaussian, Wang};
use crate::error::{DistError, Result};

/// Builds a distribution with its initial parameters.
pub type DistFactory = fn() -> Box<dyn Distribution>;

#[derive(Debug, Clone)]
pub struct DistRegistry {
    factories: IndexMap<String, DistFactory>,
}

impl DistRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// The built-in registry shared by the convenience readers.
    pub fn global() -> &'static DistRegistry {
        static GLOBAL: OnceLock<DistRegistry> = OnceLock::new();
        GLOBAL.get_or_init(DistRegistry::default)
    }

    /// Registers `factory` under `tag`, replacing any previous entry.
    pub fn register(&mut self, tag: &str, factory: DistFactory) -> Option<DistFactory> {
        self.factories.insert(tag.to_string(), factory)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, tag: &str) -> Result<Box<dyn Distribution>> {
        self.factories
            .get(tag)
            .map(|factory| factory())
            .ok_or_else(|| DistError::UnknownType(tag.to_string()))
    }
}

/// Gaussian, gamma and Wang priors.
impl Default for DistRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Gaussian::TYPE, || Box::new(Gaussian::new()));
        registry.register(Gamma::TYPE, || Box::new(Gamma::new()));
        registry.register(Wang::TYPE, || Box::new(Wang::new()));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tags() {
        let tags: Vec<&str> = DistRegistry::global().tags().collect();
        assert_eq!(tags, vec!["gaussian", "gamma", "wang"]);
    }

    #[test]
    fn created_instances_carry_their_tag() {
        let registry = DistRegistry::default();
        for tag in ["gaussian", "gamma", "wang"] {
            let dist = registry.create(tag).unwrap();
            assert_eq!(dist.dist_type(), tag);
        }
    }

    #[test]
    fn unknown_tag() {
        assert!(matches!(
            DistRegistry::empty().create("gaussian"),
            Err(DistError::UnknownType(t)) if t == "gaussian"
        ));
    }

    #[test]
    fn later_registration_wins() {
        let mut registry = DistRegistry::default();
        let previous = registry.register("gamma", || Box::new(Wang::new()));
        assert!(previous.is_some());
        assert_eq!(registry.create("gamma").unwrap().dist_type(), "wang");
    }
}
