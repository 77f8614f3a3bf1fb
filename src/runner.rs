//! Projection runner: the execution-driver side of the engine boundary
//!
//! The runner materializes a calculation list from a registry, evaluates
//! time-independent shapes first, then walks the time range in ascending
//! order so recursive formulas always find their predecessor cached. Batch
//! runs evaluate one reference-data handle per unit of work in parallel;
//! every worker materializes its own calculation list, so memoization caches
//! are never shared across threads.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::calc::{Calc, CalcType};
use crate::dimension::{Dimension, DimensionRanges};
use crate::error::RunError;
use crate::reference::RefData;
use crate::registry::CalcRegistry;

/// Group calculations by shape, in conventional evaluation order
/// (time-independent shapes first)
pub fn group_by_calc_type(calcs: &[Calc]) -> BTreeMap<CalcType, Vec<Calc>> {
    let mut grouped: BTreeMap<CalcType, Vec<Calc>> = BTreeMap::new();
    for calc in calcs {
        grouped.entry(calc.calc_type()).or_default().push(calc.clone());
    }
    grouped
}

/// Pre-configured runner for one registry and dimension projection
pub struct ProjectionRunner<'a> {
    registry: &'a CalcRegistry,
    ranges: DimensionRanges,
    cache_size: Option<usize>,
}

impl<'a> ProjectionRunner<'a> {
    pub fn new(registry: &'a CalcRegistry, ranges: DimensionRanges) -> Self {
        ProjectionRunner {
            registry,
            ranges,
            cache_size: None,
        }
    }

    /// Bound every materialized calc's memoization cache
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = Some(cache_size);
        self
    }

    /// Materialize and evaluate the full projection for one reference-data
    /// handle
    pub fn run(&self, data: &RefData) -> Result<ProjectionResult, RunError> {
        let calcs = self.registry.create_calculations(&self.ranges, self.cache_size)?;
        let time_values = self.ranges.time_values().to_vec();

        let mut result = ProjectionResult {
            time_values,
            scalars: Vec::new(),
            series: Vec::new(),
        };

        // Time-independent calculations first
        for calc in calcs.iter().filter(|c| !c.calc_type().is_time_dependent()) {
            let handle = calc.calc_type().needs_ref_data().then_some(data);
            result.scalars.push(ScalarResult {
                name: calc.name().to_owned(),
                calc_type: calc.calc_type(),
                value: calc.eval(None, handle)?,
            });
        }

        // Then every time-dependent calculation across the ascending range
        for calc in calcs.iter().filter(|c| c.calc_type().is_time_dependent()) {
            let handle = calc.calc_type().needs_ref_data().then_some(data);
            let values = result
                .time_values
                .iter()
                .map(|&t| calc.eval(Some(Dimension::time(t)), handle))
                .collect::<Result<Vec<f64>, _>>()?;
            result.series.push(SeriesResult {
                name: calc.name().to_owned(),
                calc_type: calc.calc_type(),
                values,
            });
        }

        Ok(result)
    }

    /// Run one projection per reference-data handle, in parallel. Each
    /// worker materializes its own calculation list.
    pub fn run_batch(&self, data: &[RefData]) -> Result<Vec<ProjectionResult>, RunError> {
        data.par_iter().map(|handle| self.run(handle)).collect()
    }
}

/// Evaluated projection for one reference-data handle
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionResult {
    /// Time values, in evaluation order
    pub time_values: Vec<i64>,

    /// Results of time-independent calculations
    pub scalars: Vec<ScalarResult>,

    /// One value per time step for each time-dependent calculation
    pub series: Vec<SeriesResult>,
}

impl ProjectionResult {
    pub fn find_series(&self, name: &str) -> Option<&SeriesResult> {
        self.series.iter().find(|series| series.name == name)
    }

    pub fn find_scalar(&self, name: &str) -> Option<&ScalarResult> {
        self.scalars.iter().find(|scalar| scalar.name == name)
    }
}

/// Result of one time-independent calculation
#[derive(Debug, Clone, Serialize)]
pub struct ScalarResult {
    pub name: String,
    pub calc_type: CalcType,
    pub value: f64,
}

/// Time series produced by one time-dependent calculation
#[derive(Debug, Clone, Serialize)]
pub struct SeriesResult {
    pub name: String,
    pub calc_type: CalcType,
    pub values: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{CalcCtx, Signature};
    use crate::dimension::Axis;
    use crate::error::EvalError;
    use crate::registry::{FormulaModule, Priority};
    use approx::assert_relative_eq;

    const SCENARIO: Axis = Axis::named("scenario");

    fn spread(ctx: &CalcCtx) -> Result<f64, EvalError> {
        Ok(ctx.dim(SCENARIO)?.value() as f64 * ctx.data()?.value("base_spread")?)
    }

    fn balance(ctx: &CalcCtx) -> Result<f64, EvalError> {
        let t = ctx.t()?;
        if t == 0 {
            return ctx.data()?.value("opening_balance").map_err(Into::into);
        }
        Ok(ctx.call("balance", t - 1)? * (1.0 + ctx.call_untimed("spread")?))
    }

    fn configured_registry() -> CalcRegistry {
        let mut registry = CalcRegistry::new();
        registry
            .register_modules([FormulaModule::new("accumulation", Priority::General)
                .formula(
                    "spread",
                    Some("base"),
                    Signature::new().ref_data("data").dim(SCENARIO, "scenario"),
                    spread,
                )
                .formula(
                    "balance",
                    Some("base"),
                    Signature::new()
                        .time("t")
                        .ref_data("data")
                        .dim(SCENARIO, "scenario"),
                    balance,
                )])
            .unwrap()
            .register_function_groups(["base"]);
        registry
    }

    fn handle(opening: f64) -> RefData {
        RefData::builder()
            .value("opening_balance", opening)
            .value("base_spread", 0.001)
            .build()
    }

    fn ranges() -> DimensionRanges {
        DimensionRanges::new(0..120)
            .with_secondary(SCENARIO, [1, 2])
            .unwrap()
    }

    #[test]
    fn test_run_produces_scalars_then_series() {
        let registry = configured_registry();
        let runner = ProjectionRunner::new(&registry, ranges());
        let result = runner.run(&handle(1000.0)).unwrap();

        assert_eq!(result.time_values.len(), 120);
        assert_eq!(result.scalars.len(), 2); // spread(scenario=1..2)
        assert_eq!(result.series.len(), 2); // balance(scenario=1..2)

        let spread_1 = result.find_scalar("spread(scenario=1)").unwrap();
        assert_relative_eq!(spread_1.value, 0.001);

        let balance_2 = result.find_series("balance(scenario=2)").unwrap();
        assert_relative_eq!(balance_2.values[0], 1000.0);
        assert_relative_eq!(balance_2.values[12], 1000.0 * 1.002_f64.powi(12), epsilon = 1e-9);
    }

    #[test]
    fn test_run_walks_long_ranges_without_deep_recursion() {
        let registry = configured_registry();
        let long_ranges = DimensionRanges::new(0..10_000)
            .with_secondary(SCENARIO, [1])
            .unwrap();

        // Far beyond the recursion limit; ascending evaluation keeps each
        // step shallow
        let runner = ProjectionRunner::new(&registry, long_ranges);
        let result = runner.run(&handle(1.0)).unwrap();
        assert_eq!(result.find_series("balance(scenario=1)").unwrap().values.len(), 10_000);
    }

    #[test]
    fn test_batch_runs_one_projection_per_handle() {
        let registry = configured_registry();
        let runner = ProjectionRunner::new(&registry, ranges());

        let handles: Vec<RefData> = (1..=8).map(|i| handle(1000.0 * i as f64)).collect();
        let results = runner.run_batch(&handles).unwrap();

        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            let opening = result.find_series("balance(scenario=1)").unwrap().values[0];
            assert_relative_eq!(opening, 1000.0 * (i + 1) as f64);
        }
    }

    #[test]
    fn test_group_by_calc_type_orders_time_independent_first() {
        let registry = configured_registry();
        let calcs = registry.create_calculations(&ranges(), None).unwrap();

        let grouped = group_by_calc_type(&calcs);
        let types: Vec<CalcType> = grouped.keys().copied().collect();
        assert_eq!(types, vec![CalcType::RefAndSecondaryDims, CalcType::All]);
        assert_eq!(grouped[&CalcType::All].len(), 2);
    }

    #[test]
    fn test_bounded_caches_still_project_correctly() {
        let registry = configured_registry();
        let runner = ProjectionRunner::new(&registry, ranges()).with_cache_size(4);
        let result = runner.run(&handle(1000.0)).unwrap();

        let series = result.find_series("balance(scenario=1)").unwrap();
        assert_relative_eq!(series.values[3], 1000.0 * 1.001_f64.powi(3), epsilon = 1e-9);
    }
}
