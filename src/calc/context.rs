//! Evaluation context: the seam formulas are written against
//!
//! A formula body receives a [`CalcCtx`] exposing its current time value, its
//! reference-data handle, its bound secondary dimensions, and by-name
//! dispatch to itself and sibling formulas. Dispatch always goes through the
//! callee's memoization cache, so a formula recursing into earlier time steps
//! of itself performs each distinct evaluation exactly once per cache.

use crate::dimension::{Axis, Dimension};
use crate::error::EvalError;
use crate::reference::RefData;

use super::cache::CacheKey;
use super::specialize::{CalcCell, ModelData};

/// Shape every formula takes: borrow the context, produce a value or an
/// application-level error
pub type FormulaFn = fn(&CalcCtx<'_>) -> Result<f64, EvalError>;

/// Evaluation depth guard. Recursive formulas terminate once their base case
/// resolves, so depth is proportional to the distance from the requested time
/// to the nearest cached or base value; drivers that walk the time range in
/// ascending order keep it at one or two frames. The guard turns a runaway
/// recursion into an error instead of a stack overflow.
pub const RECURSION_LIMIT: usize = 2048;

/// Evaluation context for one in-flight formula invocation
pub struct CalcCtx<'a> {
    model: &'a ModelData,
    idx: usize,
    t: Option<Dimension>,
    data: Option<&'a RefData>,
    depth: usize,
}

impl<'a> CalcCtx<'a> {
    fn cell(&self) -> &'a CalcCell {
        &self.model.calcs[self.idx]
    }

    /// The current time value
    pub fn t(&self) -> Result<Dimension, EvalError> {
        self.t.ok_or_else(|| EvalError::MissingTimeArg {
            calc: self.cell().name.clone(),
        })
    }

    /// The reference-data handle supplied to this invocation
    pub fn data(&self) -> Result<&'a RefData, EvalError> {
        self.data.ok_or_else(|| EvalError::MissingRefData {
            calc: self.cell().name.clone(),
        })
    }

    /// The value this calculation was specialized with on the given axis
    pub fn dim(&self, axis: Axis) -> Result<Dimension, EvalError> {
        self.cell()
            .bound
            .iter()
            .find(|bound| bound.axis == axis)
            .map(|bound| Dimension::new(axis, bound.value))
            .ok_or_else(|| EvalError::UnboundAxis {
                calc: self.cell().name.clone(),
                axis,
            })
    }

    /// Evaluate a time-dependent formula (this one or a sibling) at the given
    /// time, through its memoization cache. The reference-data handle flows
    /// along implicitly when the callee consumes it; secondary dimensions
    /// route to the specialization matching this calculation's bound values.
    pub fn call(&self, formula: &str, t: Dimension) -> Result<f64, EvalError> {
        self.dispatch(formula, Some(t))
    }

    /// Evaluate a formula that takes no time argument
    pub fn call_untimed(&self, formula: &str) -> Result<f64, EvalError> {
        self.dispatch(formula, None)
    }

    fn dispatch(&self, formula: &str, t: Option<Dimension>) -> Result<f64, EvalError> {
        let callee = self.resolve(formula)?;
        let data = if self.model.calcs[callee].ref_data_param.is_some() {
            self.data
        } else {
            None
        };
        eval_cell(self.model, callee, t, data, self.depth + 1)
    }

    /// Pick the specialization of `formula` consistent with the caller's
    /// bound dimension values
    fn resolve(&self, formula: &str) -> Result<usize, EvalError> {
        let indices = self
            .model
            .by_formula
            .get(formula)
            .ok_or_else(|| EvalError::UnknownFormula(formula.to_owned()))?;

        let caller = self.cell();
        'candidates: for &idx in indices {
            for bound in &self.model.calcs[idx].bound {
                match caller.bound.iter().find(|b| b.axis == bound.axis) {
                    Some(callers) if callers.value == bound.value => {}
                    Some(_) => continue 'candidates,
                    None => {
                        return Err(EvalError::UnboundAxis {
                            calc: caller.name.clone(),
                            axis: bound.axis,
                        })
                    }
                }
            }
            return Ok(idx);
        }

        Err(EvalError::UnresolvedSpecialization {
            calc: caller.name.clone(),
            formula: formula.to_owned(),
        })
    }
}

/// Memoized evaluation of one cell. The cache key is the exact argument
/// tuple: time value when time-dependent, handle identity when reference
/// data participates. Failed evaluations are never stored.
pub(crate) fn eval_cell(
    model: &ModelData,
    idx: usize,
    t: Option<Dimension>,
    data: Option<&RefData>,
    depth: usize,
) -> Result<f64, EvalError> {
    let cell = &model.calcs[idx];

    if depth >= RECURSION_LIMIT {
        return Err(EvalError::RecursionLimit {
            calc: cell.name.clone(),
            limit: RECURSION_LIMIT,
        });
    }

    let t_key = match (&cell.time_param, t) {
        (Some(_), Some(dim)) => {
            if !dim.axis().is_time() {
                return Err(EvalError::WrongTimeAxis {
                    calc: cell.name.clone(),
                    axis: dim.axis(),
                });
            }
            Some(dim.value())
        }
        (Some(_), None) => {
            return Err(EvalError::MissingTimeArg {
                calc: cell.name.clone(),
            })
        }
        (None, Some(_)) => {
            return Err(EvalError::UnexpectedTimeArg {
                calc: cell.name.clone(),
            })
        }
        (None, None) => None,
    };

    let data_key = match (&cell.ref_data_param, data) {
        (Some(_), Some(handle)) => Some(handle.id()),
        (Some(_), None) => {
            return Err(EvalError::MissingRefData {
                calc: cell.name.clone(),
            })
        }
        (None, _) => None,
    };

    let key = CacheKey {
        t: t_key,
        data: data_key,
    };

    let cached = cell.cache.borrow_mut().lookup(&key);
    if let Some(value) = cached {
        return Ok(value);
    }

    let ctx = CalcCtx {
        model,
        idx,
        t,
        data,
        depth,
    };
    let value = (cell.func)(&ctx)?;
    cell.cache.borrow_mut().store(key, value);
    Ok(value)
}
