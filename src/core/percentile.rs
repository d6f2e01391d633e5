use rayon::prelude::*;

use super::error::CoreError;
use super::types::{FinalYearStats, PercentileBands, YearEndMatrix};

const BAND_LEVELS: [f64; 5] = [10.0, 25.0, 50.0, 75.0, 90.0];

pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    percentile_of_sorted(values, p)
}

pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0).clamp(0.0, 1.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        let (lo, hi) = (sorted[lower], sorted[upper]);
        (lo + (hi - lo) * w).clamp(lo, hi)
    }
}

pub fn aggregate(
    matrix: &YearEndMatrix,
    ages: Vec<u32>,
    total_invested: f64,
) -> Result<(PercentileBands, FinalYearStats), CoreError> {
    let num_years = matrix.num_years();
    if num_years == 0 || matrix.num_simulations() == 0 {
        return Err(CoreError::invalid(
            "year_end_matrix",
            "at least one simulated year and path are required",
        ));
    }
    if ages.len() != num_years {
        return Err(CoreError::invalid(
            "ages",
            format!("{} ages for {num_years} simulated years", ages.len()),
        ));
    }

    let rows: Vec<[f64; 5]> = (0..num_years)
        .into_par_iter()
        .map(|year| {
            let mut column = matrix.year(year).to_vec();
            column.sort_by(|a, b| a.total_cmp(b));
            BAND_LEVELS.map(|p| percentile_of_sorted(&column, p))
        })
        .collect();

    let bands = PercentileBands {
        ages,
        p10: rows.iter().map(|r| r[0]).collect(),
        p25: rows.iter().map(|r| r[1]).collect(),
        p50: rows.iter().map(|r| r[2]).collect(),
        p75: rows.iter().map(|r| r[3]).collect(),
        p90: rows.iter().map(|r| r[4]).collect(),
    };

    let final_stats = final_year_stats(matrix.year(num_years - 1), total_invested)
        .ok_or(CoreError::NumericInstability {
            stage: "percentile aggregation",
            year: num_years as u32,
        })?;

    Ok((bands, final_stats))
}

fn final_year_stats(balances: &[f64], total_invested: f64) -> Option<FinalYearStats> {
    let mut sorted = balances.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len() as f64;

    let mean = sorted.iter().sum::<f64>() / n;
    if !mean.is_finite() {
        return None;
    }

    let share_at_least = |threshold: f64| sorted.iter().filter(|b| **b >= threshold).count() as f64 / n;

    Some(FinalYearStats {
        median: percentile_of_sorted(&sorted, 50.0),
        mean,
        p10: percentile_of_sorted(&sorted, 10.0),
        p90: percentile_of_sorted(&sorted, 90.0),
        min: *sorted.first()?,
        max: *sorted.last()?,
        total_invested,
        prob_double: share_at_least(2.0 * total_invested),
        prob_positive: share_at_least(total_invested),
    })
}
