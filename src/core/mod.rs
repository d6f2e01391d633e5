mod error;
mod monte_carlo;
mod percentile;
mod phases;
mod projector;
mod types;

pub use error::CoreError;
pub use monte_carlo::{
    MonthlyReturnModel, ReturnFactors, run_paths, simulate, simulate_seeded, simulate_with_cancel,
};
pub use percentile::{aggregate, percentile, percentile_of_sorted};
pub use phases::{ContributionSchedule, MONTHS_PER_YEAR, contribution_for, is_active};
pub use projector::project;
pub use types::{
    ContributionPhase, FinalYearStats, Frequency, PercentileBands, ProjectionInputs,
    ProjectionResult, SimulationInputs, SimulationResult, YearEndMatrix, YearlyRecord,
};
