//! Cartesian expansion of classified formulas into materialized calc cells
//!
//! A formula with no secondary dimensions (or a projection with no secondary
//! ranges at all) materializes as a single unspecialized template. Otherwise
//! one cell is produced per combination of secondary values, each carrying
//! its own memoization cache: pre-binding axis values changes the effective
//! cache key space, so caches are never shared across specializations.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::dimension::{Axis, Dimension, DimensionRanges};
use crate::error::MaterializeError;

use super::cache::MemoCache;
use super::context::FormulaFn;
use super::signature::ClassifiedSignature;
use super::CalcType;

/// One secondary-dimension value fixed by specialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundDim {
    pub axis: Axis,
    pub value: i64,
}

/// Internal state of one materialized calculation
#[derive(Debug)]
pub(crate) struct CalcCell {
    /// Display name, `formula(param=value, ...)` when specialized
    pub(crate) name: String,
    /// Base formula name, used for sibling dispatch
    pub(crate) formula: String,
    pub(crate) func: FormulaFn,
    pub(crate) calc_type: CalcType,
    pub(crate) time_param: Option<String>,
    pub(crate) ref_data_param: Option<String>,
    /// Bound secondary values in declaration order; empty for a template
    pub(crate) bound: Vec<BoundDim>,
    pub(crate) group: Option<String>,
    pub(crate) module: String,
    /// Whether this cell belongs to an active group and is returned to the
    /// caller (helpers stay reachable for dispatch only)
    pub(crate) active: bool,
    pub(crate) cache: RefCell<MemoCache>,
}

/// The materialized calculation set shared by every [`super::Calc`] handle
/// produced from one `create_calculations` call
pub(crate) struct ModelData {
    pub(crate) calcs: Vec<CalcCell>,
    /// Formula name to the indices of its specializations, in combination
    /// order
    pub(crate) by_formula: BTreeMap<String, Vec<usize>>,
}

/// Expand one classified formula over the supplied ranges
pub(crate) fn build_cells(
    formula: &str,
    module: &str,
    group: Option<&str>,
    active: bool,
    func: FormulaFn,
    classified: &ClassifiedSignature,
    ranges: &DimensionRanges,
    cache_size: Option<usize>,
) -> Result<Vec<CalcCell>, MaterializeError> {
    let cell = |name: String, bound: Vec<BoundDim>| CalcCell {
        name,
        formula: formula.to_owned(),
        func,
        calc_type: classified.calc_type,
        time_param: classified.time_param.clone(),
        ref_data_param: classified.ref_data_param.clone(),
        bound,
        group: group.map(str::to_owned),
        module: module.to_owned(),
        active,
        cache: RefCell::new(MemoCache::new(cache_size)),
    };

    if classified.dims.is_empty() || !ranges.has_secondary_ranges() {
        return Ok(vec![cell(formula.to_owned(), Vec::new())]);
    }

    let combos = ranges
        .combinations(&classified.axes())
        .map_err(|axis| MaterializeError::MissingAxisRange {
            formula: formula.to_owned(),
            axis,
        })?;

    Ok(combos
        .into_iter()
        .map(|combo| {
            let bound: Vec<BoundDim> = combo
                .iter()
                .map(|dim| BoundDim {
                    axis: dim.axis(),
                    value: dim.value(),
                })
                .collect();
            cell(specialized_name(formula, classified, &combo), bound)
        })
        .collect())
}

/// `pv_claim(scenario=2, cohort=1)`: parameter names and values in
/// declaration order, so generated names are reproducible across runs
fn specialized_name(formula: &str, classified: &ClassifiedSignature, combo: &[Dimension]) -> String {
    let args: Vec<String> = combo
        .iter()
        .map(|dim| {
            let param = classified.param_for(dim.axis()).unwrap_or(dim.axis().name());
            format!("{}={}", param, dim.value())
        })
        .collect();
    format!("{}({})", formula, args.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::signature::Signature;
    use crate::calc::CalcCtx;
    use crate::error::EvalError;

    const SCENARIO: Axis = Axis::named("scenario");
    const COHORT: Axis = Axis::named("cohort");

    fn zero(_ctx: &CalcCtx) -> Result<f64, EvalError> {
        Ok(0.0)
    }

    fn classify(signature: Signature) -> ClassifiedSignature {
        signature.classify("pv_claim").unwrap()
    }

    #[test]
    fn test_no_dims_yields_single_template() {
        let classified = classify(Signature::new().time("t").ref_data("data"));
        let ranges = DimensionRanges::new(0..12);

        let cells = build_cells("pv_claim", "model", Some("base"), true, zero, &classified, &ranges, None)
            .unwrap();

        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].name, "pv_claim");
        assert!(cells[0].bound.is_empty());
    }

    #[test]
    fn test_no_secondary_ranges_degrades_to_template() {
        let classified = classify(Signature::new().time("t").dim(SCENARIO, "scenario"));
        let ranges = DimensionRanges::new(0..12);

        let cells =
            build_cells("pv_claim", "model", None, false, zero, &classified, &ranges, None).unwrap();

        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].name, "pv_claim");
    }

    #[test]
    fn test_cartesian_expansion_and_names() {
        let classified = classify(
            Signature::new()
                .time("t")
                .dim(SCENARIO, "scenario")
                .dim(COHORT, "cohort"),
        );
        let ranges = DimensionRanges::new(0..12)
            .with_secondary(SCENARIO, [1, 2, 3])
            .unwrap()
            .with_secondary(COHORT, [10, 20])
            .unwrap();

        let cells =
            build_cells("pv_claim", "model", Some("base"), true, zero, &classified, &ranges, None)
                .unwrap();

        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0].name, "pv_claim(scenario=1, cohort=10)");
        assert_eq!(cells[5].name, "pv_claim(scenario=3, cohort=20)");

        // Pairwise distinct names and bound combinations
        for (i, a) in cells.iter().enumerate() {
            for b in &cells[i + 1..] {
                assert_ne!(a.name, b.name);
                assert_ne!(a.bound, b.bound);
            }
        }
    }

    #[test]
    fn test_missing_axis_range_fails_materialization() {
        let classified = classify(Signature::new().time("t").dim(COHORT, "cohort"));
        let ranges = DimensionRanges::new(0..12)
            .with_secondary(SCENARIO, [1, 2])
            .unwrap();

        let err = build_cells("pv_claim", "model", None, false, zero, &classified, &ranges, None)
            .unwrap_err();

        assert!(matches!(
            err,
            MaterializeError::MissingAxisRange { formula, axis }
                if formula == "pv_claim" && axis == COHORT
        ));
    }

    #[test]
    fn test_specializations_have_independent_caches() {
        let classified = classify(Signature::new().time("t").dim(SCENARIO, "scenario"));
        let ranges = DimensionRanges::new(0..12)
            .with_secondary(SCENARIO, [1, 2])
            .unwrap();

        let cells =
            build_cells("pv_claim", "model", None, true, zero, &classified, &ranges, Some(8))
                .unwrap();

        use crate::calc::cache::CacheKey;
        let key = CacheKey { t: Some(3), data: None };
        cells[0].cache.borrow_mut().store(key, 42.0);

        assert_eq!(cells[0].cache.borrow_mut().lookup(&key), Some(42.0));
        assert_eq!(cells[1].cache.borrow_mut().lookup(&key), None);
        assert_eq!(cells[1].cache.borrow().stats().capacity, Some(8));
    }
}
