//! Ordered collection of named parameters

use super::param::Param;
use crate::checkpoint::{LoadPolicy, LoadReport};
use crate::{Error, Result};
use ndarray::Array1;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

/// Named parameters in registration order
///
/// Names are unique. Iteration order is the insertion order and never
/// changes, so index-based partitions computed once stay valid as long as no
/// parameter is added.
#[derive(Clone, Debug, Default)]
pub struct ParamStore {
    names: Vec<String>,
    params: Vec<Param>,
    index: HashMap<String, usize>,
}

impl ParamStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter; duplicate names are rejected
    pub fn insert(&mut self, name: impl Into<String>, param: Param) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::config("param_store", format!("duplicate parameter '{name}'")));
        }
        self.index.insert(name.clone(), self.params.len());
        self.names.push(name);
        self.params.push(param);
        Ok(())
    }

    /// Parameter `name`, inserting the one built by `make` if it is absent
    pub fn get_or_insert_with(&mut self, name: &str, make: impl FnOnce() -> Param) -> &mut Param {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.index.insert(name.to_string(), self.params.len());
                self.names.push(name.to_string());
                self.params.push(make());
                self.params.len() - 1
            }
        };
        &mut self.params[idx]
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, param: Param) -> Result<Self> {
        self.insert(name, param)?;
        Ok(self)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameter names in order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a parameter by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Look up a parameter by name
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.index_of(name).map(|i| &self.params[i])
    }

    /// Look up a parameter by name for mutation
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.index_of(name).map(move |i| &mut self.params[i])
    }

    /// Parameter at a position
    pub fn by_index(&self, i: usize) -> Option<&Param> {
        self.params.get(i)
    }

    /// Mutable parameter at a position
    pub fn by_index_mut(&mut self, i: usize) -> Option<&mut Param> {
        self.params.get_mut(i)
    }

    /// Iterate over `(name, param)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.names.iter().map(String::as_str).zip(self.params.iter())
    }

    /// Iterate mutably over `(name, param)` pairs in order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Param)> {
        self.names.iter().map(String::as_str).zip(self.params.iter_mut())
    }

    /// Drop all gradients
    pub fn zero_grad(&mut self) {
        for param in &mut self.params {
            param.zero_grad();
        }
    }

    /// Copy current values keyed by name
    pub fn snapshot(&self) -> BTreeMap<String, Vec<f32>> {
        self.iter().map(|(name, p)| (name.to_string(), p.data().to_vec())).collect()
    }

    /// Overwrite values from a name-keyed map
    ///
    /// Names matching any `ignore` pattern are skipped. Under
    /// [`LoadPolicy::Strict`] any missing, unexpected, or wrongly sized key
    /// fails the whole load before a single value is written. Under
    /// [`LoadPolicy::Lenient`] the matching keys are loaded and the rest are
    /// reported.
    pub fn load_values(
        &mut self,
        values: &BTreeMap<String, Vec<f32>>,
        policy: LoadPolicy,
        ignore: &[Regex],
    ) -> Result<LoadReport> {
        let report = self.check_values(values, policy, ignore)?;
        self.apply_values(&report, values);
        Ok(report)
    }

    /// Write the keys a prior [`ParamStore::check_values`] accepted
    pub(crate) fn apply_values(&mut self, report: &LoadReport, values: &BTreeMap<String, Vec<f32>>) {
        for name in &report.loaded {
            if let (Some(param), Some(v)) = (self.get_mut(name), values.get(name)) {
                *param.data_mut() = Array1::from(v.clone());
            }
        }
    }

    /// Match `values` against the stored parameters without writing anything
    pub fn check_values(
        &self,
        values: &BTreeMap<String, Vec<f32>>,
        policy: LoadPolicy,
        ignore: &[Regex],
    ) -> Result<LoadReport> {
        let is_ignored = |name: &str| ignore.iter().any(|re| re.is_match(name));
        let mut report = LoadReport::default();

        for (name, param) in self.iter() {
            if is_ignored(name) {
                report.ignored.push(name.to_string());
                continue;
            }
            match values.get(name) {
                Some(v) if v.len() == param.len() => report.loaded.push(name.to_string()),
                Some(v) => report.mismatched.push(format!(
                    "{name} (expected {} values, found {})",
                    param.len(),
                    v.len()
                )),
                None => report.missing.push(name.to_string()),
            }
        }
        for name in values.keys() {
            if !self.index.contains_key(name) && !is_ignored(name) {
                report.unexpected.push(name.clone());
            }
        }

        report.enforce("model_parameters", policy)?;
        Ok(report)
    }
}
