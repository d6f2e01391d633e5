use tracing::{debug, info, warn};

use super::error::CoreError;
use super::phases::{ContributionSchedule, MONTHS_PER_YEAR};
use super::types::{ProjectionInputs, ProjectionResult, YearlyRecord};

#[derive(Debug, Default)]
struct YearTotals {
    deposit: f64,
    interest: f64,
    fees: f64,
}

#[derive(Debug)]
struct Ledger {
    balance: f64,
    shadow_balance: f64,
    cumulative_contributions: f64,
    cumulative_interest: f64,
    fees_paid: f64,
}

impl Ledger {
    fn new(starting_amount: f64) -> Self {
        Self {
            balance: starting_amount,
            shadow_balance: starting_amount,
            cumulative_contributions: 0.0,
            cumulative_interest: 0.0,
            fees_paid: 0.0,
        }
    }

    fn is_finite(&self) -> bool {
        self.balance.is_finite()
            && self.shadow_balance.is_finite()
            && self.cumulative_interest.is_finite()
            && self.fees_paid.is_finite()
    }

    fn apply_month(
        &mut self,
        contribution: f64,
        monthly_rate: f64,
        monthly_fee_rate: f64,
        year: &mut YearTotals,
    ) {
        self.balance += contribution;
        self.shadow_balance += contribution;
        year.deposit += contribution;
        self.cumulative_contributions += contribution;

        let interest = self.balance * monthly_rate;
        self.balance += interest;
        self.shadow_balance += self.shadow_balance * monthly_rate;
        year.interest += interest;
        self.cumulative_interest += interest;

        let fee = self.balance * monthly_fee_rate;
        self.balance -= fee;
        year.fees += fee;
        self.fees_paid += fee;
    }
}

pub fn project(inputs: &ProjectionInputs) -> Result<ProjectionResult, CoreError> {
    inputs.validate()?;

    let total_years = inputs.total_years();
    info!(
        starting_amount = inputs.starting_amount,
        start_age = inputs.start_age,
        end_age = inputs.end_age,
        phases = inputs.contribution_phases.len(),
        annual_return_pct = inputs.annual_return_pct,
        "running deterministic projection"
    );

    let schedule = ContributionSchedule::build(
        &inputs.contribution_phases,
        inputs.start_age,
        total_years,
    );
    let monthly_rate = inputs.annual_return_pct / 100.0 / 12.0;
    let monthly_fee_rate = inputs.total_fee_pct() / 100.0 / 12.0;

    let mut ledger = Ledger::new(inputs.starting_amount);
    let mut records = Vec::with_capacity(total_years as usize);

    for year_index in 0..schedule.total_years() {
        let mut year = YearTotals::default();
        for month in 0..MONTHS_PER_YEAR {
            let contribution = schedule.month(year_index * MONTHS_PER_YEAR + month);
            ledger.apply_month(contribution, monthly_rate, monthly_fee_rate, &mut year);
        }

        let year_number = year_index as u32 + 1;
        if !ledger.is_finite() {
            warn!(year = year_number, "projection produced a non-finite balance");
            return Err(CoreError::NumericInstability {
                stage: "deterministic projection",
                year: year_number,
            });
        }

        records.push(YearlyRecord {
            year: year_number,
            age: schedule.age_of_year(year_index),
            deposit: year.deposit,
            interest: year.interest,
            fees: year.fees,
            ending_balance: ledger.balance,
            phase: if schedule.year_active(year_index) { 1 } else { 2 },
            cumulative_starting: inputs.starting_amount,
            cumulative_contributions: ledger.cumulative_contributions,
            cumulative_interest: ledger.cumulative_interest,
            fees_paid: ledger.fees_paid,
            balance_without_fees: ledger.shadow_balance,
        });
    }

    let phase1_years = records.iter().filter(|r| r.phase == 1).count() as u32;
    let result = ProjectionResult {
        end_balance: ledger.balance,
        starting_amount: inputs.starting_amount,
        total_contributions: ledger.cumulative_contributions,
        total_interest: ledger.cumulative_interest,
        total_fees: ledger.fees_paid,
        balance_without_fees: ledger.shadow_balance,
        fee_drag: ledger.shadow_balance - ledger.balance,
        phase1_end_balance: ledger.balance,
        phase1_years,
        phase2_years: total_years - phase1_years,
        total_years,
        schedule: records,
    };

    debug!(
        end_balance = result.end_balance,
        total_fees = result.total_fees,
        "deterministic projection finished"
    );
    Ok(result)
}
