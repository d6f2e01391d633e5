use std::str::FromStr;

use clap::Args;
use serde::Deserialize;

use crate::core::{
    ContributionPhase, Frequency, MONTHS_PER_YEAR, ProjectionInputs, SimulationInputs,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_simulations: u32,
    pub max_years: u32,
    pub max_path_months: u64,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_simulations: 50_000,
            max_years: 100,
            max_path_months: 12_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhaseSpec {
    pub start_age: u32,
    pub end_age: u32,
    pub frequency: String,
    pub amount: f64,
}

pub fn parse_phase_arg(raw: &str) -> Result<PhaseSpec, String> {
    let usage = || format!("invalid phase '{raw}', expected START-END:FREQUENCY:AMOUNT");
    let mut parts = raw.split(':');
    let (Some(ages), Some(frequency), Some(amount), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(usage());
    };
    let (start, end) = ages.split_once('-').ok_or_else(usage)?;

    Ok(PhaseSpec {
        start_age: start.trim().parse().map_err(|_| usage())?,
        end_age: end.trim().parse().map_err(|_| usage())?,
        frequency: frequency.trim().to_string(),
        amount: amount.trim().parse().map_err(|_| usage())?,
    })
}

#[derive(Args, Debug, Clone)]
pub struct ProjectionArgs {
    #[arg(long, default_value_t = 10_000.0)]
    pub starting_amount: f64,
    #[arg(long, default_value_t = 30)]
    pub start_age: u32,
    #[arg(
        long,
        help = "Age at which the projection stops (exclusive); defaults to start age + contribution years + growth years"
    )]
    pub end_age: Option<u32>,
    #[arg(
        long = "phase",
        value_parser = parse_phase_arg,
        help = "Contribution phase as START-END:FREQUENCY:AMOUNT, e.g. 30-40:monthly:500; repeatable"
    )]
    pub phases: Vec<PhaseSpec>,
    #[arg(
        long,
        help = "Single-phase shorthand: years of contributions starting at --start-age"
    )]
    pub contribution_years: Option<u32>,
    #[arg(long, default_value_t = 0, help = "Growth-only years after the contribution years")]
    pub growth_years: u32,
    #[arg(long, default_value_t = 0.0, help = "Contribution amount for the single-phase shorthand")]
    pub contribution: f64,
    #[arg(long, default_value = "monthly")]
    pub contribution_frequency: String,
    #[arg(
        long,
        default_value = "beginning",
        help = "Only 'beginning' is supported; contributions land at the start of each month"
    )]
    pub contribution_timing: String,
    #[arg(long, default_value_t = 7.0, help = "Fixed annual return in percent")]
    pub annual_return: f64,
    #[arg(long, default_value_t = 7.0, help = "Expected annual return in percent for simulations")]
    pub expected_return: f64,
    #[arg(long, default_value_t = 15.0, help = "Annual return volatility in percent")]
    pub volatility: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual fund fee in percent")]
    pub fund_fee: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual platform fee in percent")]
    pub platform_fee: f64,
    #[arg(long, default_value_t = 1_000)]
    pub simulations: u32,
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn default_args_for_api() -> ProjectionArgs {
    ProjectionArgs {
        starting_amount: 10_000.0,
        start_age: 30,
        end_age: None,
        phases: Vec::new(),
        contribution_years: Some(10),
        growth_years: 0,
        contribution: 0.0,
        contribution_frequency: "monthly".to_string(),
        contribution_timing: "beginning".to_string(),
        annual_return: 6.0,
        expected_return: 7.0,
        volatility: 15.0,
        fund_fee: 0.0,
        platform_fee: 0.0,
        simulations: 1_000,
        seed: None,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectionPayload {
    starting_amount: Option<f64>,
    #[serde(alias = "current_age")]
    start_age: Option<u32>,
    end_age: Option<u32>,
    contribution_phases: Option<Vec<PhaseSpec>>,

    contribution_years: Option<u32>,
    growth_years: Option<u32>,
    contribution: Option<f64>,
    contribution_frequency: Option<String>,
    contribution_timing: Option<String>,

    #[serde(alias = "return_rate")]
    annual_return: Option<f64>,
    expected_return: Option<f64>,
    volatility: Option<f64>,
    fund_fee: Option<f64>,
    platform_fee: Option<f64>,
    #[serde(alias = "simulations")]
    num_simulations: Option<u32>,
    seed: Option<u64>,
}

pub fn args_from_payload(payload: ProjectionPayload) -> ProjectionArgs {
    let mut args = default_args_for_api();

    if let Some(v) = payload.starting_amount {
        args.starting_amount = v;
    }
    if let Some(v) = payload.start_age {
        args.start_age = v;
    }
    if let Some(v) = payload.end_age {
        args.end_age = Some(v);
    }
    if let Some(v) = payload.contribution_phases {
        args.phases = v;
    }

    if let Some(v) = payload.contribution_years {
        args.contribution_years = Some(v);
    }
    if let Some(v) = payload.growth_years {
        args.growth_years = v;
    }
    if let Some(v) = payload.contribution {
        args.contribution = v;
    }
    if let Some(v) = payload.contribution_frequency {
        args.contribution_frequency = v;
    }
    if let Some(v) = payload.contribution_timing {
        args.contribution_timing = v;
    }

    if let Some(v) = payload.annual_return {
        args.annual_return = v;
    }
    if let Some(v) = payload.expected_return {
        args.expected_return = v;
    }
    if let Some(v) = payload.volatility {
        args.volatility = v;
    }
    if let Some(v) = payload.fund_fee {
        args.fund_fee = v;
    }
    if let Some(v) = payload.platform_fee {
        args.platform_fee = v;
    }
    if let Some(v) = payload.num_simulations {
        args.simulations = v;
    }
    if payload.seed.is_some() {
        args.seed = payload.seed;
    }

    args
}

struct Horizon {
    end_age: u32,
    phases: Vec<ContributionPhase>,
}

fn resolve_horizon(args: &ProjectionArgs, limits: RequestLimits) -> Result<Horizon, String> {
    if !args.starting_amount.is_finite() || args.starting_amount < 0.0 {
        return Err("--starting-amount must be >= 0".to_string());
    }

    let end_age = match (args.end_age, args.contribution_years) {
        (Some(end_age), _) => end_age,
        (None, Some(years)) => args
            .start_age
            .saturating_add(years)
            .saturating_add(args.growth_years),
        (None, None) => {
            return Err("--end-age is required when --contribution-years is not given".to_string());
        }
    };

    if end_age <= args.start_age {
        return Err("--end-age must be > --start-age".to_string());
    }
    if end_age - args.start_age > limits.max_years {
        return Err(format!(
            "the projection horizon must be at most {} years",
            limits.max_years
        ));
    }

    let phases = if args.phases.is_empty() {
        legacy_phases(args, end_age)?
    } else if args.contribution != 0.0 {
        return Err("--contribution cannot be combined with --phase".to_string());
    } else {
        args.phases
            .iter()
            .enumerate()
            .map(|(idx, raw)| {
                let frequency = Frequency::from_str(&raw.frequency)
                    .map_err(|e| format!("--phase #{}: {e}", idx + 1))?;
                ContributionPhase::new(raw.start_age, raw.end_age, frequency, raw.amount)
                    .map_err(|e| format!("--phase #{}: {e}", idx + 1))
            })
            .collect::<Result<Vec<_>, String>>()?
    };

    Ok(Horizon { end_age, phases })
}

fn legacy_phases(args: &ProjectionArgs, end_age: u32) -> Result<Vec<ContributionPhase>, String> {
    if !args.contribution_timing.eq_ignore_ascii_case("beginning") {
        return Err(format!(
            "--contribution-timing '{}' is not supported; contributions are made at the beginning of each month",
            args.contribution_timing
        ));
    }
    if !args.contribution.is_finite() || args.contribution < 0.0 {
        return Err("--contribution must be >= 0".to_string());
    }

    let frequency = Frequency::from_str(&args.contribution_frequency)
        .map_err(|e| format!("--contribution-frequency: {e}"))?;
    if args.contribution == 0.0 {
        return Ok(Vec::new());
    }
    // Without --contribution-years the contribution runs for the whole horizon.
    let phase_end = match args.contribution_years {
        Some(0) => return Ok(Vec::new()),
        Some(years) => args.start_age.saturating_add(years).min(end_age),
        None => end_age,
    };
    let phase = ContributionPhase::new(args.start_age, phase_end, frequency, args.contribution)
        .map_err(|e| format!("--contribution-years: {e}"))?;
    Ok(vec![phase])
}

fn validate_fees(args: &ProjectionArgs) -> Result<(), String> {
    for (name, fee) in [("--fund-fee", args.fund_fee), ("--platform-fee", args.platform_fee)] {
        if !(0.0..=100.0).contains(&fee) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }
    Ok(())
}

pub fn build_projection_inputs(
    args: &ProjectionArgs,
    limits: RequestLimits,
) -> Result<ProjectionInputs, String> {
    let horizon = resolve_horizon(args, limits)?;
    validate_fees(args)?;

    if !args.annual_return.is_finite() || args.annual_return <= -100.0 {
        return Err("--annual-return must be > -100".to_string());
    }

    let inputs = ProjectionInputs {
        starting_amount: args.starting_amount,
        start_age: args.start_age,
        end_age: horizon.end_age,
        contribution_phases: horizon.phases,
        annual_return_pct: args.annual_return,
        fund_fee_pct: args.fund_fee,
        platform_fee_pct: args.platform_fee,
    };
    inputs.validate().map_err(|e| e.to_string())?;
    Ok(inputs)
}

pub fn build_simulation_inputs(
    args: &ProjectionArgs,
    limits: RequestLimits,
) -> Result<SimulationInputs, String> {
    let horizon = resolve_horizon(args, limits)?;
    validate_fees(args)?;

    if !args.expected_return.is_finite() || args.expected_return <= -100.0 {
        return Err("--expected-return must be > -100".to_string());
    }
    if !args.volatility.is_finite() || args.volatility < 0.0 {
        return Err("--volatility must be >= 0".to_string());
    }
    if args.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }
    if args.simulations > limits.max_simulations {
        return Err(format!(
            "--simulations must be <= {}",
            limits.max_simulations
        ));
    }
    let path_months = u64::from(args.simulations)
        * u64::from(horizon.end_age - args.start_age)
        * MONTHS_PER_YEAR as u64;
    if path_months > limits.max_path_months {
        return Err(format!(
            "--simulations times the horizon in months must be <= {} (got {path_months})",
            limits.max_path_months
        ));
    }

    let inputs = SimulationInputs {
        starting_amount: args.starting_amount,
        start_age: args.start_age,
        end_age: horizon.end_age,
        contribution_phases: horizon.phases,
        expected_return: args.expected_return / 100.0,
        volatility: args.volatility / 100.0,
        fund_fee_pct: args.fund_fee,
        platform_fee_pct: args.platform_fee,
        num_simulations: args.simulations,
        seed: args.seed,
    };
    inputs.validate().map_err(|e| e.to_string())?;
    Ok(inputs)
}
