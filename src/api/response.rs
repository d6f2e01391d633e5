use serde::Serialize;

use crate::core::{ProjectionResult, SimulationResult, YearlyRecord};

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

fn money(value: f64) -> f64 {
    round_to(value, 2)
}

fn money_series(values: &[f64]) -> Vec<f64> {
    values.iter().copied().map(money).collect()
}

#[derive(Debug, Serialize)]
pub struct YearResponse {
    year: u32,
    age: u32,
    deposit: f64,
    interest: f64,
    fees: f64,
    ending_balance: f64,
    phase: u8,
    cumulative_starting: f64,
    cumulative_contributions: f64,
    cumulative_interest: f64,
    fees_paid: f64,
    balance_without_fees: f64,
}

impl From<&YearlyRecord> for YearResponse {
    fn from(record: &YearlyRecord) -> Self {
        Self {
            year: record.year,
            age: record.age,
            deposit: money(record.deposit),
            interest: money(record.interest),
            fees: money(record.fees),
            ending_balance: money(record.ending_balance),
            phase: record.phase,
            cumulative_starting: money(record.cumulative_starting),
            cumulative_contributions: money(record.cumulative_contributions),
            cumulative_interest: money(record.cumulative_interest),
            fees_paid: money(record.fees_paid),
            balance_without_fees: money(record.balance_without_fees),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CalculateResponse {
    success: bool,
    end_balance: f64,
    starting_amount: f64,
    total_contributions: f64,
    total_interest: f64,
    total_fees: f64,
    balance_without_fees: f64,
    fee_drag: f64,
    phase1_end_balance: f64,
    phase1_years: u32,
    phase2_years: u32,
    total_years: u32,
    schedule: Vec<YearResponse>,
}

impl From<&ProjectionResult> for CalculateResponse {
    fn from(result: &ProjectionResult) -> Self {
        Self {
            success: true,
            end_balance: money(result.end_balance),
            starting_amount: money(result.starting_amount),
            total_contributions: money(result.total_contributions),
            total_interest: money(result.total_interest),
            total_fees: money(result.total_fees),
            balance_without_fees: money(result.balance_without_fees),
            fee_drag: money(result.fee_drag),
            phase1_end_balance: money(result.phase1_end_balance),
            phase1_years: result.phase1_years,
            phase2_years: result.phase2_years,
            total_years: result.total_years,
            schedule: result.schedule.iter().map(YearResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PercentileResponse {
    p10: Vec<f64>,
    p25: Vec<f64>,
    p50: Vec<f64>,
    p75: Vec<f64>,
    p90: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    median: f64,
    mean: f64,
    p10: f64,
    p90: f64,
    min: f64,
    max: f64,
    total_invested: f64,
    prob_double: f64,
    prob_positive: f64,
}

#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    success: bool,
    num_simulations: u32,
    seed: Option<u64>,
    years: Vec<u32>,
    percentiles: PercentileResponse,
    cumulative_contributions: Vec<f64>,
    stats: StatsResponse,
}

impl From<&SimulationResult> for SimulateResponse {
    fn from(result: &SimulationResult) -> Self {
        let bands = &result.bands;
        let stats = &result.final_stats;
        Self {
            success: true,
            num_simulations: result.num_simulations,
            seed: result.seed,
            years: bands.ages.clone(),
            percentiles: PercentileResponse {
                p10: money_series(&bands.p10),
                p25: money_series(&bands.p25),
                p50: money_series(&bands.p50),
                p75: money_series(&bands.p75),
                p90: money_series(&bands.p90),
            },
            cumulative_contributions: money_series(&result.cumulative_contributions),
            stats: StatsResponse {
                median: money(stats.median),
                mean: money(stats.mean),
                p10: money(stats.p10),
                p90: money(stats.p90),
                min: money(stats.min),
                max: money(stats.max),
                total_invested: money(stats.total_invested),
                prob_double: round_to(stats.prob_double, 4),
                prob_positive: round_to(stats.prob_positive, 4),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    success: bool,
    error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_keeps_requested_precision() {
        assert_eq!(money(1_126.825_030_131_969_7), 1_126.83);
        assert_eq!(money(-0.004), -0.0);
        assert_eq!(round_to(0.123_456, 4), 0.1235);
    }

    #[test]
    fn error_response_is_flagged_unsuccessful() {
        let json = serde_json::to_string(&ErrorResponse::new("bad input")).expect("serializes");
        assert_eq!(json, r#"{"success":false,"error":"bad input"}"#);
    }
}
