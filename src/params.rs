//! Loosely-typed parameter bags and the process-wide random seed.
//!
//! [`Params`] is the string-keyed option map exchanged between the
//! autotuner, the index factory, and search entry points. Each component
//! parses the keys it cares about into a typed configuration at its
//! boundary; missing keys take documented defaults, present keys with
//! the wrong type are an error.

use crate::error::BuildError;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashMap;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

/// String-keyed parameter map.
#[derive(Debug, Clone, Default)]
pub struct Params {
    map: HashMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.map.insert(key.to_string(), value.into());
    }

    /// Builder-style `set`, convenient in tests and examples.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.map.get(key)
    }

    /// Copy every entry of `other` into this map, overwriting duplicates.
    pub fn merge(&mut self, other: &Params) {
        for (k, v) in &other.map {
            self.map.insert(k.clone(), v.clone());
        }
    }

    /// Integer value of `key`, or `default` when absent.
    pub fn get_int(&self, key: &str, default: i64) -> Result<i64, BuildError> {
        match self.map.get(key) {
            None => Ok(default),
            Some(ParamValue::Int(v)) => Ok(*v),
            Some(other) => Err(BuildError::InvalidParameter(format!(
                "{key} must be an integer, got {other:?}"
            ))),
        }
    }

    /// Float value of `key`, or `default` when absent. Integer values
    /// are accepted and widened.
    pub fn get_float(&self, key: &str, default: f64) -> Result<f64, BuildError> {
        match self.map.get(key) {
            None => Ok(default),
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(BuildError::InvalidParameter(format!(
                "{key} must be a number, got {other:?}"
            ))),
        }
    }

    /// String value of `key`, or `default` when absent.
    pub fn get_str(&self, key: &str, default: &str) -> Result<String, BuildError> {
        match self.map.get(key) {
            None => Ok(default.to_string()),
            Some(ParamValue::Str(v)) => Ok(v.clone()),
            Some(other) => Err(BuildError::InvalidParameter(format!(
                "{key} must be a string, got {other:?}"
            ))),
        }
    }
}

/// Search-time parameters.
///
/// `checks` is the soft budget on full distance computations per query;
/// `-1` means unlimited, which turns the tree indices into exact search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub checks: i32,
}

/// Sentinel `checks` value for exhaustive search.
pub const CHECKS_UNLIMITED: i32 = -1;

impl SearchParams {
    pub fn new(checks: i32) -> Self {
        Self { checks }
    }

    pub fn exact() -> Self {
        Self {
            checks: CHECKS_UNLIMITED,
        }
    }

    pub fn from_params(params: &Params) -> Result<Self, BuildError> {
        Ok(Self {
            checks: params.get_int("checks", 32)? as i32,
        })
    }

    /// The budget as a `usize`, with negative values mapped to "no limit".
    #[inline]
    pub fn max_checks(&self) -> usize {
        if self.checks < 0 {
            usize::MAX
        } else {
            self.checks as usize
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self { checks: 32 }
    }
}

static GLOBAL_RNG: Mutex<Option<StdRng>> = Mutex::new(None);

/// Seed the process-wide random generator that builds derive their
/// randomness from. A seed of zero leaves the current state untouched.
pub fn seed_random(seed: u64) {
    if seed > 0 {
        *GLOBAL_RNG.lock() = Some(StdRng::seed_from_u64(seed));
    }
}

/// Draw one seed from the global generator.
pub(crate) fn next_global_seed() -> u64 {
    let mut guard = GLOBAL_RNG.lock();
    match guard.as_mut() {
        Some(rng) => rng.next_u64(),
        None => rand::thread_rng().next_u64(),
    }
}

/// Generator for one index build.
///
/// An explicit non-negative `"seed"` param pins the build; otherwise the
/// seed is drawn from the global generator, so repeated builds after the
/// same [`seed_random`] call reproduce the same structures.
pub(crate) fn build_rng(params: &Params) -> Result<StdRng, BuildError> {
    let seed = params.get_int("seed", -1)?;
    if seed >= 0 {
        Ok(StdRng::seed_from_u64(seed as u64))
    } else {
        Ok(StdRng::seed_from_u64(next_global_seed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters_with_defaults() {
        let params = Params::new()
            .with("trees", 8)
            .with("cb_index", 0.2f32)
            .with("algorithm", "kmeans");

        assert_eq!(params.get_int("trees", 4).unwrap(), 8);
        assert_eq!(params.get_int("branching", 32).unwrap(), 32);
        assert!((params.get_float("cb_index", 0.4).unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(params.get_str("algorithm", "kdtree").unwrap(), "kmeans");
        assert_eq!(params.get_str("centers-init", "random").unwrap(), "random");
    }

    #[test]
    fn test_int_widens_to_float() {
        let params = Params::new().with("build_weight", 1);
        assert_eq!(params.get_float("build_weight", 0.01).unwrap(), 1.0);
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let params = Params::new().with("trees", "four");
        assert!(matches!(
            params.get_int("trees", 4),
            Err(BuildError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_merge_overwrites() {
        let mut base = Params::new().with("checks", 32).with("trees", 4);
        let tuned = Params::new().with("checks", 128);
        base.merge(&tuned);
        assert_eq!(base.get_int("checks", 0).unwrap(), 128);
        assert_eq!(base.get_int("trees", 0).unwrap(), 4);
    }

    #[test]
    fn test_search_params() {
        assert_eq!(SearchParams::default().checks, 32);
        assert_eq!(SearchParams::exact().max_checks(), usize::MAX);
        assert_eq!(SearchParams::new(64).max_checks(), 64);

        let params = Params::new().with("checks", 7);
        assert_eq!(SearchParams::from_params(&params).unwrap().checks, 7);
    }

    #[test]
    fn test_explicit_seed_is_deterministic() {
        let params = Params::new().with("seed", 42);
        let mut a = build_rng(&params).unwrap();
        let mut b = build_rng(&params).unwrap();
        assert_eq!(a.next_u64(), b.next_u64());
    }
}
