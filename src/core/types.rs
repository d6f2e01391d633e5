use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::error::CoreError;

const MIN_ANNUAL_RETURN_PCT: f64 = -1200.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Yearly,
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Frequency::Monthly),
            "yearly" | "annual" | "annually" => Ok(Frequency::Yearly),
            other => Err(CoreError::invalid(
                "frequency",
                format!("unknown contribution frequency '{other}'"),
            )),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Monthly => f.write_str("monthly"),
            Frequency::Yearly => f.write_str("yearly"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ContributionPhase {
    start_age: u32,
    end_age: u32,
    frequency: Frequency,
    amount: f64,
}

impl ContributionPhase {
    pub fn new(
        start_age: u32,
        end_age: u32,
        frequency: Frequency,
        amount: f64,
    ) -> Result<Self, CoreError> {
        if end_age <= start_age {
            return Err(CoreError::invalid(
                "contribution_phases.end_age",
                format!("end age {end_age} must be greater than start age {start_age}"),
            ));
        }
        if !amount.is_finite() || amount < 0.0 {
            return Err(CoreError::invalid(
                "contribution_phases.amount",
                format!("amount must be a finite value >= 0, got {amount}"),
            ));
        }
        Ok(Self {
            start_age,
            end_age,
            frequency,
            amount,
        })
    }

    pub fn start_age(&self) -> u32 {
        self.start_age
    }

    pub fn end_age(&self) -> u32 {
        self.end_age
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn covers(&self, age: u32) -> bool {
        self.start_age <= age && age < self.end_age
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionInputs {
    pub starting_amount: f64,
    pub start_age: u32,
    pub end_age: u32,
    pub contribution_phases: Vec<ContributionPhase>,
    pub annual_return_pct: f64,
    pub fund_fee_pct: f64,
    pub platform_fee_pct: f64,
}

impl ProjectionInputs {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_horizon(self.starting_amount, self.start_age, self.end_age)?;
        validate_fees(self.fund_fee_pct, self.platform_fee_pct)?;
        if !self.annual_return_pct.is_finite() || self.annual_return_pct <= MIN_ANNUAL_RETURN_PCT
        {
            return Err(CoreError::invalid(
                "annual_return_pct",
                format!(
                    "annual return must be finite and > {MIN_ANNUAL_RETURN_PCT}, got {}",
                    self.annual_return_pct
                ),
            ));
        }
        Ok(())
    }

    pub fn total_years(&self) -> u32 {
        self.end_age.saturating_sub(self.start_age)
    }

    pub fn total_fee_pct(&self) -> f64 {
        self.fund_fee_pct + self.platform_fee_pct
    }
}

#[derive(Debug, Clone)]
pub struct SimulationInputs {
    pub starting_amount: f64,
    pub start_age: u32,
    pub end_age: u32,
    pub contribution_phases: Vec<ContributionPhase>,
    // Annual rates as decimals, e.g. 0.07.
    pub expected_return: f64,
    pub volatility: f64,
    pub fund_fee_pct: f64,
    pub platform_fee_pct: f64,
    pub num_simulations: u32,
    pub seed: Option<u64>,
}

impl SimulationInputs {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_horizon(self.starting_amount, self.start_age, self.end_age)?;
        validate_fees(self.fund_fee_pct, self.platform_fee_pct)?;
        if !self.expected_return.is_finite() || self.expected_return <= -1.0 {
            return Err(CoreError::invalid(
                "expected_return",
                format!(
                    "expected return must be finite and > -100%, got {}",
                    self.expected_return
                ),
            ));
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(CoreError::invalid(
                "volatility",
                format!("volatility must be finite and >= 0, got {}", self.volatility),
            ));
        }
        if self.num_simulations == 0 {
            return Err(CoreError::invalid(
                "num_simulations",
                "at least one simulation is required",
            ));
        }
        Ok(())
    }

    pub fn total_years(&self) -> u32 {
        self.end_age.saturating_sub(self.start_age)
    }

    pub fn total_fee_pct(&self) -> f64 {
        self.fund_fee_pct + self.platform_fee_pct
    }
}

fn validate_horizon(starting_amount: f64, start_age: u32, end_age: u32) -> Result<(), CoreError> {
    if !starting_amount.is_finite() || starting_amount < 0.0 {
        return Err(CoreError::invalid(
            "starting_amount",
            format!("starting amount must be finite and >= 0, got {starting_amount}"),
        ));
    }
    if end_age <= start_age {
        return Err(CoreError::invalid(
            "end_age",
            format!("end age {end_age} must be greater than start age {start_age}"),
        ));
    }
    Ok(())
}

fn validate_fees(fund_fee_pct: f64, platform_fee_pct: f64) -> Result<(), CoreError> {
    for (field, fee) in [
        ("fund_fee_pct", fund_fee_pct),
        ("platform_fee_pct", platform_fee_pct),
    ] {
        if !(0.0..=100.0).contains(&fee) {
            return Err(CoreError::invalid(
                field,
                format!("fee must be between 0 and 100 percent, got {fee}"),
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct YearlyRecord {
    pub year: u32,
    pub age: u32,
    pub deposit: f64,
    pub interest: f64,
    pub fees: f64,
    pub ending_balance: f64,
    pub phase: u8,
    pub cumulative_starting: f64,
    pub cumulative_contributions: f64,
    pub cumulative_interest: f64,
    pub fees_paid: f64,
    pub balance_without_fees: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectionResult {
    pub end_balance: f64,
    pub starting_amount: f64,
    pub total_contributions: f64,
    pub total_interest: f64,
    pub total_fees: f64,
    pub balance_without_fees: f64,
    pub fee_drag: f64,
    pub phase1_end_balance: f64,
    pub phase1_years: u32,
    pub phase2_years: u32,
    pub total_years: u32,
    pub schedule: Vec<YearlyRecord>,
}

#[derive(Debug, Clone)]
pub struct YearEndMatrix {
    num_simulations: usize,
    num_years: usize,
    values: Vec<f64>,
}

impl YearEndMatrix {
    pub fn from_year_major(
        num_simulations: usize,
        num_years: usize,
        values: Vec<f64>,
    ) -> Result<Self, CoreError> {
        if values.len() != num_simulations * num_years {
            return Err(CoreError::invalid(
                "year_end_matrix",
                format!(
                    "expected {} values for {num_simulations} simulations x {num_years} years, got {}",
                    num_simulations * num_years,
                    values.len()
                ),
            ));
        }
        Ok(Self {
            num_simulations,
            num_years,
            values,
        })
    }

    pub fn num_simulations(&self) -> usize {
        self.num_simulations
    }

    pub fn num_years(&self) -> usize {
        self.num_years
    }

    pub fn year(&self, year_index: usize) -> &[f64] {
        let start = year_index * self.num_simulations;
        &self.values[start..start + self.num_simulations]
    }

    pub fn path(&self, simulation: usize) -> Vec<f64> {
        (0..self.num_years)
            .map(|year| self.values[year * self.num_simulations + simulation])
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PercentileBands {
    pub ages: Vec<u32>,
    pub p10: Vec<f64>,
    pub p25: Vec<f64>,
    pub p50: Vec<f64>,
    pub p75: Vec<f64>,
    pub p90: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalYearStats {
    pub median: f64,
    pub mean: f64,
    pub p10: f64,
    pub p90: f64,
    pub min: f64,
    pub max: f64,
    pub total_invested: f64,
    pub prob_double: f64,
    pub prob_positive: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub num_simulations: u32,
    pub seed: Option<u64>,
    pub bands: PercentileBands,
    pub cumulative_contributions: Vec<f64>,
    pub final_stats: FinalYearStats,
}
