use super::types::{ContributionPhase, Frequency};

pub const MONTHS_PER_YEAR: usize = 12;

pub fn contribution_for(phases: &[ContributionPhase], age: u32, month_in_year: usize) -> f64 {
    phases
        .iter()
        .filter(|phase| phase.covers(age))
        .map(|phase| match phase.frequency() {
            Frequency::Monthly => phase.amount(),
            // Yearly phases pay in the first month only.
            Frequency::Yearly if month_in_year == 0 => phase.amount(),
            Frequency::Yearly => 0.0,
        })
        .sum()
}

pub fn is_active(phases: &[ContributionPhase], age: u32) -> bool {
    phases.iter().any(|phase| phase.covers(age))
}

#[derive(Debug, Clone)]
pub struct ContributionSchedule {
    start_age: u32,
    monthly: Vec<f64>,
    active_years: Vec<bool>,
}

impl ContributionSchedule {
    pub fn build(phases: &[ContributionPhase], start_age: u32, years: u32) -> Self {
        let mut monthly = Vec::with_capacity(years as usize * MONTHS_PER_YEAR);
        let mut active_years = Vec::with_capacity(years as usize);
        for age in start_age..start_age + years {
            active_years.push(is_active(phases, age));
            for month in 0..MONTHS_PER_YEAR {
                monthly.push(contribution_for(phases, age, month));
            }
        }

        Self {
            start_age,
            monthly,
            active_years,
        }
    }

    pub fn total_years(&self) -> usize {
        self.active_years.len()
    }

    pub fn total_months(&self) -> usize {
        self.monthly.len()
    }

    pub fn age_of_year(&self, year_index: usize) -> u32 {
        self.start_age + year_index as u32
    }

    pub fn ages(&self) -> Vec<u32> {
        (0..self.total_years()).map(|y| self.age_of_year(y)).collect()
    }

    pub fn month(&self, month_index: usize) -> f64 {
        self.monthly[month_index]
    }

    pub fn year_active(&self, year_index: usize) -> bool {
        self.active_years[year_index]
    }

    pub fn year_total(&self, year_index: usize) -> f64 {
        let start = year_index * MONTHS_PER_YEAR;
        self.monthly[start..start + MONTHS_PER_YEAR].iter().sum()
    }

    pub fn total(&self) -> f64 {
        self.monthly.iter().sum()
    }

    pub fn cumulative_invested(&self, starting_amount: f64) -> Vec<f64> {
        let mut running = starting_amount;
        (0..self.total_years())
            .map(|year| {
                running += self.year_total(year);
                running
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn phase(start: u32, end: u32, frequency: Frequency, amount: f64) -> ContributionPhase {
        ContributionPhase::new(start, end, frequency, amount).expect("valid phase")
    }

    #[test]
    fn no_phases_contribute_nothing() {
        assert_eq!(contribution_for(&[], 40, 0), 0.0);
        assert!(!is_active(&[], 40));
    }

    #[test]
    fn end_age_is_exclusive() {
        let phases = [phase(30, 35, Frequency::Monthly, 100.0)];
        assert_eq!(contribution_for(&phases, 30, 5), 100.0);
        assert_eq!(contribution_for(&phases, 34, 11), 100.0);
        assert_eq!(contribution_for(&phases, 35, 0), 0.0);
        assert_eq!(contribution_for(&phases, 29, 0), 0.0);
    }

    #[test]
    fn yearly_phase_pays_in_first_month_only() {
        let phases = [phase(30, 31, Frequency::Yearly, 1_200.0)];
        assert_eq!(contribution_for(&phases, 30, 0), 1_200.0);
        for month in 1..MONTHS_PER_YEAR {
            assert_eq!(contribution_for(&phases, 30, month), 0.0);
        }
    }

    #[test]
    fn overlapping_phases_are_additive() {
        let phases = [
            phase(30, 40, Frequency::Monthly, 100.0),
            phase(35, 45, Frequency::Monthly, 50.0),
            phase(35, 36, Frequency::Yearly, 1_000.0),
        ];
        assert_eq!(contribution_for(&phases, 32, 3), 100.0);
        assert_eq!(contribution_for(&phases, 35, 0), 1_150.0);
        assert_eq!(contribution_for(&phases, 35, 1), 150.0);
        assert_eq!(contribution_for(&phases, 42, 7), 50.0);
    }

    #[test]
    fn schedule_marks_growth_only_years() {
        let phases = [phase(31, 32, Frequency::Monthly, 10.0)];
        let schedule = ContributionSchedule::build(&phases, 30, 3);
        assert_eq!(schedule.total_months(), 36);
        assert_eq!(schedule.ages(), vec![30, 31, 32]);
        assert!(!schedule.year_active(0));
        assert!(schedule.year_active(1));
        assert!(!schedule.year_active(2));
        assert_eq!(schedule.year_total(1), 120.0);
        assert_eq!(schedule.cumulative_invested(500.0), vec![500.0, 620.0, 620.0]);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_schedule_total_matches_resolver(
            start_age in 18u32..60,
            years in 1u32..20,
            offset in 0u32..10,
            length in 1u32..15,
            monthly in 0u32..2_000,
            yearly in 0u32..20_000
        ) {
            let phases = [
                phase(start_age + offset, start_age + offset + length, Frequency::Monthly, monthly as f64),
                phase(start_age, start_age + length, Frequency::Yearly, yearly as f64),
            ];
            let schedule = ContributionSchedule::build(&phases, start_age, years);

            let mut expected = 0.0;
            for age in start_age..start_age + years {
                for month in 0..MONTHS_PER_YEAR {
                    expected += contribution_for(&phases, age, month);
                }
            }
            prop_assert!((schedule.total() - expected).abs() <= 1e-6);
            let invested = schedule.cumulative_invested(0.0);
            prop_assert!(invested.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
