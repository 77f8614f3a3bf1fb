//! Calc Engine CLI
//!
//! Demo driver: registers the term-assurance model functions, materializes
//! the calculation set over a three-scenario projection, and prints the
//! resulting cashflow columns

use anyhow::Context;
use calc_engine::{
    Axis, CalcCtx, CalcRegistry, DimensionRanges, EvalError, FormulaModule, MemoryTable, Priority,
    ProjectionRunner, RefData, Signature,
};
use std::fs::File;
use std::time::Instant;

/// Economic scenario axis: 1 = low, 2 = central, 3 = high discounting
const SCENARIO: Axis = Axis::named("scenario");

// ---- Model functions ----

/// Age in years at time t
fn age(ctx: &CalcCtx) -> Result<f64, EvalError> {
    let t = ctx.t()?;
    if t == 0 {
        return ctx.data()?.value("init_age").map_err(Into::into);
    }
    if t % 12 == 0 {
        Ok(ctx.call("age", t - 1)? + 1.0)
    } else {
        ctx.call("age", t - 1)
    }
}

/// Annual mortality rate at the attained age
fn q_x(ctx: &CalcCtx) -> Result<f64, EvalError> {
    let t = ctx.t()?;
    let age = ctx.call("age", t)?;
    let rate = ctx
        .data()?
        .table("mort")?
        .lookup(&[("age", age as i64)], "q_x")?;
    Ok(rate)
}

/// Monthly mortality rate: q_monthly = 1 - (1 - q_annual)^(1/12)
fn q_x_m(ctx: &CalcCtx) -> Result<f64, EvalError> {
    let t = ctx.t()?;
    Ok(1.0 - (1.0 - ctx.call("q_x", t)?).powf(1.0 / 12.0))
}

/// Probability the life is in force at time t, given in force at time 0
fn num_alive(ctx: &CalcCtx) -> Result<f64, EvalError> {
    let t = ctx.t()?;
    if t == 0 {
        return Ok(1.0);
    }
    Ok(ctx.call("num_alive", t - 1)? - ctx.call("num_deaths", t - 1)?)
}

/// Deaths occurring between time t and t+1
fn num_deaths(ctx: &CalcCtx) -> Result<f64, EvalError> {
    let t = ctx.t()?;
    if t < 0 {
        return Ok(0.0);
    }
    Ok(ctx.call("num_alive", t)? * ctx.call("q_x_m", t)?)
}

/// Expected claim outgo at time t
fn expected_claim(ctx: &CalcCtx) -> Result<f64, EvalError> {
    let t = ctx.t()?;
    Ok(ctx.data()?.value("sum_assured")? * ctx.call("num_deaths", t)?)
}

/// Monthly discount rate for the bound scenario
fn disc_rate_pm(ctx: &CalcCtx) -> Result<f64, EvalError> {
    let scenario = ctx.dim(SCENARIO)?;
    let annual = ctx
        .data()?
        .value(&format!("disc_rate_{}", scenario.value()))?;
    Ok((1.0 + annual).powf(1.0 / 12.0) - 1.0)
}

/// Present value factor for time t, discounting back to time 0
fn v(ctx: &CalcCtx) -> Result<f64, EvalError> {
    let t = ctx.t()?;
    if t == 0 {
        return Ok(1.0);
    }
    Ok(ctx.call("v", t - 1)? / (1.0 + ctx.call_untimed("disc_rate_pm")?))
}

/// Present value of the expected claim occurring at time t
fn pv_claim(ctx: &CalcCtx) -> Result<f64, EvalError> {
    let t = ctx.t()?;
    Ok(ctx.call("expected_claim", t)? * ctx.call("v", t)?)
}

fn model_funcs() -> FormulaModule {
    let t_and_data = || Signature::new().time("t").ref_data("data");
    FormulaModule::new("model_funcs", Priority::General)
        .formula("age", None, t_and_data(), age)
        .formula("q_x", Some("base"), t_and_data(), q_x)
        .formula("q_x_m", Some("base"), t_and_data(), q_x_m)
        .formula("num_alive", Some("base"), t_and_data(), num_alive)
        .formula("num_deaths", Some("base"), t_and_data(), num_deaths)
        .formula("expected_claim", Some("base"), t_and_data(), expected_claim)
        .formula(
            "disc_rate_pm",
            Some("base"),
            Signature::new().ref_data("data").dim(SCENARIO, "scenario"),
            disc_rate_pm,
        )
        .formula("v", Some("base"), t_and_data().dim(SCENARIO, "scenario"), v)
        .formula(
            "pv_claim",
            Some("base"),
            t_and_data().dim(SCENARIO, "scenario"),
            pv_claim,
        )
}

/// Flat-ish mortality table rising with age, ages 50..=120
fn mortality_table() -> MemoryTable {
    let mut table = MemoryTable::new(["age"], ["q_x"]);
    for age in 50..=120 {
        let rate = (0.002 * 1.09_f64.powi(age - 50)).min(0.4);
        table = table.push_row([age as i64], [rate]);
    }
    table
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Calc Engine v0.1.0");
    println!("==================\n");

    let months: i64 = 240;
    let data = RefData::builder()
        .table("mort", mortality_table())
        .value("init_age", 65.0)
        .value("sum_assured", 100_000.0)
        .value("disc_rate_1", 0.02)
        .value("disc_rate_2", 0.04)
        .value("disc_rate_3", 0.06)
        .build();

    println!("Model: term assurance, init age 65, sum assured $100000.00");
    println!("Projection: {} months, scenarios {{1, 2, 3}}\n", months);

    let mut registry = CalcRegistry::new();
    registry
        .register_modules([model_funcs()])
        .context("failed to register model functions")?
        .register_function_groups(["base"]);

    let ranges = DimensionRanges::new(0..months).with_secondary(SCENARIO, [1, 2, 3])?;

    let start = Instant::now();
    let runner = ProjectionRunner::new(&registry, ranges);
    let result = runner.run(&data)?;
    println!("Projection complete in {:?}\n", start.elapsed());

    // Print first 24 months of the central scenario to console
    let alive = result.find_series("num_alive").expect("num_alive series");
    let claims = result.find_series("expected_claim").expect("claim series");
    let pv = result
        .find_series("pv_claim(scenario=2)")
        .expect("pv series");

    println!("{:>5} {:>14} {:>14} {:>14}", "Month", "InForce", "Claim", "PV(central)");
    println!("{}", "-".repeat(51));
    for month in 0..24 {
        println!(
            "{:>5} {:>14.10} {:>14.2} {:>14.2}",
            result.time_values[month],
            alive.values[month],
            claims.values[month],
            pv.values[month],
        );
    }
    if result.time_values.len() > 24 {
        println!("... ({} more months)", result.time_values.len() - 24);
    }

    // Scenario summary: total PV of claims under each discount assumption
    println!("\nPV of claims by scenario:");
    for scenario in 1..=3 {
        let name = format!("pv_claim(scenario={scenario})");
        let series = result.find_series(&name).expect("scenario series");
        let total: f64 = series.values.iter().sum();
        println!("  {:<22} ${:.2}", name, total);
    }

    // Write full results to JSON
    let json_path = "projection_output.json";
    let file = File::create(json_path).context("unable to create output file")?;
    serde_json::to_writer_pretty(file, &result)?;
    println!("\nFull results written to: {}", json_path);

    Ok(())
}
