//! Explicit formula signatures and their classification
//!
//! A [`Signature`] is the registration-time descriptor of a formula's
//! declared parameter kinds: at most one time parameter, at most one
//! reference-data parameter, and any number of distinct secondary axes. The
//! builder accepts whatever it is given; [`Signature::classify`] enforces the
//! constraints so malformed signatures fail at registration, not invocation.

use crate::dimension::Axis;
use crate::error::ConfigError;

use super::CalcType;

/// Declared parameter kinds of one formula
#[derive(Debug, Clone, Default)]
pub struct Signature {
    times: Vec<String>,
    ref_datas: Vec<String>,
    dims: Vec<(Axis, String)>,
}

impl Signature {
    pub fn new() -> Self {
        Signature::default()
    }

    /// Declare the time parameter under the given name
    pub fn time(mut self, param: impl Into<String>) -> Self {
        self.times.push(param.into());
        self
    }

    /// Declare the reference-data parameter under the given name
    pub fn ref_data(mut self, param: impl Into<String>) -> Self {
        self.ref_datas.push(param.into());
        self
    }

    /// Declare a secondary-dimension parameter on the given axis. Discovery
    /// order is declaration order and determines specialization naming.
    pub fn dim(mut self, axis: Axis, param: impl Into<String>) -> Self {
        self.dims.push((axis, param.into()));
        self
    }

    /// Validate the declaration and derive the calculation shape
    pub(crate) fn classify(&self, formula: &str) -> Result<ClassifiedSignature, ConfigError> {
        if self.times.len() > 1 {
            return Err(ConfigError::DuplicateTimeParam {
                formula: formula.to_owned(),
            });
        }
        if self.ref_datas.len() > 1 {
            return Err(ConfigError::DuplicateRefDataParam {
                formula: formula.to_owned(),
            });
        }
        for (position, (axis, _)) in self.dims.iter().enumerate() {
            if self.dims[..position].iter().any(|(seen, _)| seen == axis) {
                return Err(ConfigError::DuplicateAxis {
                    formula: formula.to_owned(),
                    axis: *axis,
                });
            }
        }

        Ok(ClassifiedSignature {
            time_param: self.times.first().cloned(),
            ref_data_param: self.ref_datas.first().cloned(),
            dims: self.dims.clone(),
            calc_type: CalcType::from_flags(
                !self.times.is_empty(),
                !self.ref_datas.is_empty(),
                !self.dims.is_empty(),
            ),
        })
    }
}

/// A validated signature, ready for specialization
#[derive(Debug, Clone)]
pub(crate) struct ClassifiedSignature {
    pub(crate) time_param: Option<String>,
    pub(crate) ref_data_param: Option<String>,
    pub(crate) dims: Vec<(Axis, String)>,
    pub(crate) calc_type: CalcType,
}

impl ClassifiedSignature {
    pub(crate) fn axes(&self) -> Vec<Axis> {
        self.dims.iter().map(|(axis, _)| *axis).collect()
    }

    pub(crate) fn param_for(&self, axis: Axis) -> Option<&str> {
        self.dims
            .iter()
            .find(|(a, _)| *a == axis)
            .map(|(_, param)| param.as_str())
    }
}
