//! Bridge to the external optimisation engine.
//!
//! The core never searches; it hands a finished [`Model`] to a
//! [`SolvingEngine`] together with a wall-clock budget and reads back a status
//! and, on success, a valuation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use good_lp::{ResolutionError, Solution, SolutionStatus, SolverModel, default_solver};
use log::{info, warn};

use crate::config::SolverSettings;
use crate::data::SolverStatus;
use crate::model::{Model, Valuation};

/// What the engine returned for one model.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub status: SolverStatus,
    pub elapsed: Duration,
    /// Present only for OPTIMAL and FEASIBLE.
    pub valuation: Option<Valuation>,
}

impl EngineOutcome {
    pub fn without_valuation(status: SolverStatus, elapsed: Duration) -> Self {
        Self {
            status,
            elapsed,
            valuation: None,
        }
    }
}

/// A blocking, synchronous optimiser.
pub trait SolvingEngine: Send + Sync {
    fn solve(&self, model: Model, time_limit: Duration) -> EngineOutcome;
}

/// HiGHS MILP solver reached through `good_lp`.
#[derive(Debug, Clone)]
pub struct HighsEngine {
    settings: SolverSettings,
}

impl HighsEngine {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }
}

impl Default for HighsEngine {
    fn default() -> Self {
        Self::new(SolverSettings::default())
    }
}

impl SolvingEngine for HighsEngine {
    fn solve(&self, model: Model, time_limit: Duration) -> EngineOutcome {
        let Model {
            vars,
            registry,
            binaries,
            constraints,
            objective,
        } = model;

        let mut problem = vars
            .maximise(objective)
            .using(default_solver)
            .set_option("threads", self.settings.threads)
            .set_option("random_seed", self.settings.random_seed) //set seed for reproducibility
            .set_option("time_limit", time_limit.as_secs_f64())
            .set_option(
                "log_to_console",
                if self.settings.log_to_console { "true" } else { "false" },
            );
        for row in constraints {
            problem.add_constraint(row);
        }

        info!(
            "Starting HiGHS with {} variables and a {:.0?} budget...",
            registry.len(),
            time_limit
        );
        let start = Instant::now();
        let result = problem.solve();
        let elapsed = start.elapsed();

        let solution = match result {
            Ok(solution) => solution,
            Err(e) => {
                let status = classify_error(&e);
                warn!("Solver finished without a solution after {:.2?}: {} ({})", elapsed, e, status);
                return EngineOutcome::without_valuation(status, elapsed);
            }
        };

        let values: HashMap<_, _> = registry.iter().map(|&var| (var, solution.value(var))).collect();
        let valuation = Valuation::new(values);
        if !valuation.is_integral(&binaries) {
            warn!("Solver stopped after {:.2?} without an integral incumbent", elapsed);
            return EngineOutcome::without_valuation(SolverStatus::Unknown, elapsed);
        }

        let status = map_status(solution.status());
        info!("Solution found in {:.2?} ({})", elapsed, status);
        EngineOutcome {
            status,
            elapsed,
            valuation: Some(valuation),
        }
    }
}

/// A limit stop leaves an incumbent that is not proven optimal.
fn map_status(status: SolutionStatus) -> SolverStatus {
    match status {
        SolutionStatus::Optimal => SolverStatus::Optimal,
        SolutionStatus::TimeLimit | SolutionStatus::GapLimit => SolverStatus::Feasible,
    }
}

fn classify_error(error: &ResolutionError) -> SolverStatus {
    match error {
        ResolutionError::Infeasible => SolverStatus::Infeasible,
        ResolutionError::Unbounded => SolverStatus::ModelInvalid,
        other => {
            let message = other.to_string();
            if message.contains("ModelError") || message.contains("LoadError") {
                SolverStatus::ModelInvalid
            } else {
                SolverStatus::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use good_lp::{Expression, constraint};

    #[test]
    fn highs_solves_a_tiny_model() {
        let mut builder = ModelBuilder::new();
        let a = builder.new_bool("a");
        let b = builder.new_bool("b");
        builder.add(constraint!(a + b <= 1));
        let model = builder.finish(2.0 * Expression::from(a) + b);

        let outcome = HighsEngine::default().solve(model, Duration::from_secs(10));
        assert_eq!(outcome.status, SolverStatus::Optimal);
        let valuation = outcome.valuation.unwrap();
        assert!(valuation.is_true(a));
        assert!(!valuation.is_true(b));
    }

    #[test]
    fn limit_stops_are_feasible_not_optimal() {
        assert_eq!(map_status(SolutionStatus::Optimal), SolverStatus::Optimal);
        assert_eq!(map_status(SolutionStatus::TimeLimit), SolverStatus::Feasible);
        assert_eq!(map_status(SolutionStatus::GapLimit), SolverStatus::Feasible);
    }

    #[test]
    fn highs_reports_infeasibility() {
        let mut builder = ModelBuilder::new();
        let a = builder.new_bool("a");
        builder.add(constraint!(a >= 2));
        let model = builder.finish(Expression::from(a));

        let outcome = HighsEngine::default().solve(model, Duration::from_secs(10));
        assert!(matches!(
            outcome.status,
            SolverStatus::Infeasible | SolverStatus::ModelInvalid
        ));
        assert!(outcome.valuation.is_none());
    }
}
