//! Calculation model: classification, specialization, and memoized invocation
//!
//! A formula enters the engine as a plain function plus an explicit
//! [`Signature`] descriptor. Classification reduces the descriptor to a
//! [`CalcType`]; specialization expands the formula over the secondary
//! dimension ranges into one memoized [`Calc`] per value combination.

pub mod cache;
pub mod context;
pub mod signature;
pub(crate) mod specialize;

use std::rc::Rc;

use serde::Serialize;

use crate::dimension::Dimension;
use crate::error::EvalError;
use crate::reference::RefData;

pub use cache::CacheStats;
pub use context::{CalcCtx, FormulaFn, RECURSION_LIMIT};
pub use signature::Signature;
pub use specialize::BoundDim;

use specialize::ModelData;

/// Classification of a formula by the shape of data it needs: the cartesian
/// product of {time-dependent, reference-data-dependent, secondary-dimension-
/// dependent}.
///
/// Variants are ordered so that time-independent shapes sort first, which is
/// the conventional evaluation order for a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CalcType {
    NoArgs,
    RefOnly,
    SecondaryDimsOnly,
    RefAndSecondaryDims,
    TimeOnly,
    TimeAndRef,
    TimeAndSecondaryDims,
    All,
}

impl CalcType {
    /// The fixed truth table over the three dependency booleans
    pub fn from_flags(time: bool, ref_data: bool, secondary_dims: bool) -> Self {
        match (time, ref_data, secondary_dims) {
            (false, false, false) => CalcType::NoArgs,
            (false, false, true) => CalcType::SecondaryDimsOnly,
            (false, true, false) => CalcType::RefOnly,
            (false, true, true) => CalcType::RefAndSecondaryDims,
            (true, false, false) => CalcType::TimeOnly,
            (true, false, true) => CalcType::TimeAndSecondaryDims,
            (true, true, false) => CalcType::TimeAndRef,
            (true, true, true) => CalcType::All,
        }
    }

    pub fn is_time_dependent(self) -> bool {
        matches!(
            self,
            CalcType::TimeOnly | CalcType::TimeAndRef | CalcType::TimeAndSecondaryDims | CalcType::All
        )
    }

    pub fn needs_ref_data(self) -> bool {
        matches!(
            self,
            CalcType::RefOnly | CalcType::RefAndSecondaryDims | CalcType::TimeAndRef | CalcType::All
        )
    }

    pub fn has_secondary_dims(self) -> bool {
        matches!(
            self,
            CalcType::SecondaryDimsOnly
                | CalcType::RefAndSecondaryDims
                | CalcType::TimeAndSecondaryDims
                | CalcType::All
        )
    }
}

/// A specialized, memoized, invocable calculation
///
/// Cheap to clone: a handle into the materialized model, so sibling calls
/// made during evaluation resolve against the same calculation set. Immutable
/// after materialization except for the interior memoization cache, which is
/// scoped to this materialization and never shared across specializations or
/// across worker-materialized calc lists.
#[derive(Clone)]
pub struct Calc {
    pub(crate) model: Rc<ModelData>,
    pub(crate) idx: usize,
}

impl Calc {
    fn cell(&self) -> &specialize::CalcCell {
        &self.model.calcs[self.idx]
    }

    /// Display name; specialized calcs embed their bound values, e.g.
    /// `pv_claim(scenario=2)`
    pub fn name(&self) -> &str {
        &self.cell().name
    }

    /// Name of the formula this calc was produced from
    pub fn formula(&self) -> &str {
        &self.cell().formula
    }

    pub fn calc_type(&self) -> CalcType {
        self.cell().calc_type
    }

    /// Group tag the formula was registered under, if any
    pub fn group(&self) -> Option<&str> {
        self.cell().group.as_deref()
    }

    /// Name of the source module that registered the formula
    pub fn module(&self) -> &str {
        &self.cell().module
    }

    /// Declared name of the time parameter, if the formula is time-dependent
    pub fn time_param(&self) -> Option<&str> {
        self.cell().time_param.as_deref()
    }

    /// Declared name of the reference-data parameter, if any
    pub fn ref_data_param(&self) -> Option<&str> {
        self.cell().ref_data_param.as_deref()
    }

    /// Secondary-dimension values bound by specialization, in declaration
    /// order; empty for an unspecialized template
    pub fn bound_dims(&self) -> &[BoundDim] {
        &self.cell().bound
    }

    /// Invoke the calculation with exactly the arguments its shape implies.
    /// A missing or superfluous argument is an invocation error, never
    /// silently coerced.
    pub fn eval(&self, t: Option<Dimension>, data: Option<&RefData>) -> Result<f64, EvalError> {
        let cell = self.cell();
        match (&cell.ref_data_param, data) {
            (Some(_), None) => {
                return Err(EvalError::MissingRefData {
                    calc: cell.name.clone(),
                })
            }
            (None, Some(_)) => {
                return Err(EvalError::UnexpectedRefData {
                    calc: cell.name.clone(),
                })
            }
            _ => {}
        }
        context::eval_cell(&self.model, self.idx, t, data, 0)
    }

    /// Convenience for the common time-and-reference-data shape
    pub fn eval_at(&self, t: i64, data: &RefData) -> Result<f64, EvalError> {
        self.eval(Some(Dimension::time(t)), Some(data))
    }

    /// Hit/miss/size statistics of this calc's memoization cache
    pub fn cache_stats(&self) -> CacheStats {
        self.cell().cache.borrow().stats()
    }
}

impl std::fmt::Debug for Calc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calc")
            .field("name", &self.name())
            .field("calc_type", &self.calc_type())
            .field("group", &self.group())
            .field("module", &self.module())
            .finish()
    }
}
