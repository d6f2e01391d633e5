use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, LogNormal};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::error::CoreError;
use super::percentile::aggregate;
use super::phases::{ContributionSchedule, MONTHS_PER_YEAR};
use super::types::{SimulationInputs, SimulationResult, YearEndMatrix};

const SHARD_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyReturnModel {
    pub mu: f64,
    pub sigma: f64,
}

impl MonthlyReturnModel {
    pub fn from_annual(expected_return: f64, volatility: f64) -> Result<Self, CoreError> {
        let monthly_expected = expected_return / 12.0;
        let sigma = volatility / 12_f64.sqrt();
        if !(1.0 + monthly_expected > 0.0) || !sigma.is_finite() || sigma < 0.0 {
            return Err(CoreError::invalid(
                "expected_return",
                format!(
                    "cannot build a lognormal factor from return {expected_return} and volatility {volatility}"
                ),
            ));
        }
        // Drift correction keeps the factor's arithmetic mean at 1 + r/12.
        Ok(Self {
            mu: (1.0 + monthly_expected).ln() - sigma * sigma / 2.0,
            sigma,
        })
    }

    fn distribution(&self) -> Result<LogNormal<f64>, CoreError> {
        LogNormal::new(self.mu, self.sigma)
            .map_err(|e| CoreError::invalid("volatility", format!("return distribution error: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct ReturnFactors {
    num_simulations: usize,
    total_months: usize,
    values: Vec<f64>,
}

impl ReturnFactors {
    pub fn generate<R: Rng + ?Sized>(
        model: MonthlyReturnModel,
        num_simulations: usize,
        total_months: usize,
        rng: &mut R,
        cancel: Option<&AtomicBool>,
    ) -> Result<Self, CoreError> {
        let len = num_simulations.checked_mul(total_months).ok_or_else(|| {
            CoreError::invalid(
                "num_simulations",
                format!("{num_simulations} simulations over {total_months} months is too large"),
            )
        })?;
        let distribution = model.distribution()?;

        let mut values = Vec::with_capacity(len);
        for _ in 0..total_months {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(CoreError::Cancelled);
            }
            values.extend((0..num_simulations).map(|_| distribution.sample(&mut *rng)));
        }

        Ok(Self {
            num_simulations,
            total_months,
            values,
        })
    }

    pub fn num_simulations(&self) -> usize {
        self.num_simulations
    }

    pub fn total_months(&self) -> usize {
        self.total_months
    }

    pub fn month(&self, month: usize, paths: Range<usize>) -> &[f64] {
        let row = month * self.num_simulations;
        &self.values[row + paths.start..row + paths.end]
    }
}

pub fn simulate<R: Rng + ?Sized>(
    inputs: &SimulationInputs,
    rng: &mut R,
) -> Result<SimulationResult, CoreError> {
    run(inputs, rng, inputs.seed, None)
}

pub fn simulate_seeded(inputs: &SimulationInputs) -> Result<SimulationResult, CoreError> {
    let seed = inputs.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    run(inputs, &mut rng, Some(seed), None)
}

pub fn simulate_with_cancel(
    inputs: &SimulationInputs,
    cancel: &AtomicBool,
) -> Result<SimulationResult, CoreError> {
    let seed = inputs.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    run(inputs, &mut rng, Some(seed), Some(cancel))
}

fn run<R: Rng + ?Sized>(
    inputs: &SimulationInputs,
    rng: &mut R,
    seed: Option<u64>,
    cancel: Option<&AtomicBool>,
) -> Result<SimulationResult, CoreError> {
    inputs.validate()?;

    let total_years = inputs.total_years();
    info!(
        simulations = inputs.num_simulations,
        years = total_years,
        expected_return = inputs.expected_return,
        volatility = inputs.volatility,
        seed = ?seed,
        "running monte carlo simulation"
    );

    let schedule = ContributionSchedule::build(
        &inputs.contribution_phases,
        inputs.start_age,
        total_years,
    );
    let model = MonthlyReturnModel::from_annual(inputs.expected_return, inputs.volatility)?;
    let factors = ReturnFactors::generate(
        model,
        inputs.num_simulations as usize,
        schedule.total_months(),
        rng,
        cancel,
    )?;

    let matrix = run_paths(inputs, &schedule, &factors, cancel)?;
    let cumulative_contributions = schedule.cumulative_invested(inputs.starting_amount);
    let total_invested = cumulative_contributions
        .last()
        .copied()
        .unwrap_or(inputs.starting_amount);
    let (bands, final_stats) = aggregate(&matrix, schedule.ages(), total_invested)?;

    debug!(
        median = final_stats.median,
        prob_positive = final_stats.prob_positive,
        "monte carlo simulation finished"
    );
    Ok(SimulationResult {
        num_simulations: inputs.num_simulations,
        seed,
        bands,
        cumulative_contributions,
        final_stats,
    })
}

pub fn run_paths(
    inputs: &SimulationInputs,
    schedule: &ContributionSchedule,
    factors: &ReturnFactors,
    cancel: Option<&AtomicBool>,
) -> Result<YearEndMatrix, CoreError> {
    let num_simulations = factors.num_simulations();
    let num_years = schedule.total_years();
    if factors.total_months() != schedule.total_months() {
        return Err(CoreError::invalid(
            "return_factors",
            format!(
                "{} months of factors for a {}-month schedule",
                factors.total_months(),
                schedule.total_months()
            ),
        ));
    }

    let fee_factor = 1.0 - inputs.total_fee_pct() / 100.0 / 12.0;
    let shard_count = num_simulations.div_ceil(SHARD_SIZE);
    let shards = (0..shard_count)
        .into_par_iter()
        .map(|shard| {
            let start = shard * SHARD_SIZE;
            let paths = start..(start + SHARD_SIZE).min(num_simulations);
            advance_shard(
                paths,
                inputs.starting_amount,
                schedule,
                factors,
                fee_factor,
                cancel,
            )
        })
        .collect::<Result<Vec<_>, CoreError>>()
        .inspect_err(|e| warn!(error = %e, "monte carlo simulation aborted"))?;

    let mut values = Vec::with_capacity(num_simulations * num_years);
    for year in 0..num_years {
        for shard in &shards {
            let width = shard.len() / num_years;
            values.extend_from_slice(&shard[year * width..(year + 1) * width]);
        }
    }
    YearEndMatrix::from_year_major(num_simulations, num_years, values)
}

fn advance_shard(
    paths: Range<usize>,
    starting_amount: f64,
    schedule: &ContributionSchedule,
    factors: &ReturnFactors,
    fee_factor: f64,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<f64>, CoreError> {
    let mut balances = vec![starting_amount; paths.len()];
    let mut year_ends = Vec::with_capacity(paths.len() * schedule.total_years());

    for month in 0..schedule.total_months() {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(CoreError::Cancelled);
        }

        let contribution = schedule.month(month);
        let row = factors.month(month, paths.clone());
        for (balance, factor) in balances.iter_mut().zip(row) {
            *balance = (*balance + contribution) * factor * fee_factor;
        }

        if (month + 1) % MONTHS_PER_YEAR == 0 {
            let year = ((month + 1) / MONTHS_PER_YEAR) as u32;
            if balances.iter().any(|b| !b.is_finite()) {
                return Err(CoreError::NumericInstability {
                    stage: "monte carlo simulation",
                    year,
                });
            }
            // Only year-end snapshots are floored; the running balance is left as is.
            year_ends.extend(balances.iter().map(|b| b.max(0.0)));
        }
    }

    Ok(year_ends)
}
