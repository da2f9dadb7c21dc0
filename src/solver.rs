use crate::config::SchedulerConfig;
use crate::constraints;
use crate::data::{
    Conflict, ScheduledMeeting, SchedulingRequest, SolveResult, SolverStatus, Statistics,
};
use crate::diagnose::diagnose;
use crate::engine::{EngineOutcome, HighsEngine, SolvingEngine};
use crate::error::SchedulerError;
use crate::extract::{Extraction, extract};
use crate::index::DomainIndex;
use crate::model::ModelBuilder;
use crate::objective;
use crate::validate::validate;
use crate::variables::VariableSet;
use log::{info, trace, warn};
use std::time::{Duration, Instant};

/// solves the timetabling problem using the HiGHS ILP solver.
pub fn solve(request: &SchedulingRequest, config: &SchedulerConfig) -> Result<SolveResult, SchedulerError> {
    let engine = HighsEngine::new(config.solver.clone());
    solve_with(request, config, &engine)
}

/// Runs the full pipeline against any solving engine.
pub fn solve_with(
    request: &SchedulingRequest,
    config: &SchedulerConfig,
    engine: &dyn SolvingEngine,
) -> Result<SolveResult, SchedulerError> {
    let start_time = Instant::now();
    config.validate()?;
    let index = DomainIndex::build(request)?;

    //model setup
    info!(
        "Setting up ILP model for schedule {} with {} courses, {} professors and {} time slots...",
        index.schedule_id,
        index.courses().len(),
        index.professors().len(),
        index.slots().len()
    );
    let mut builder = ModelBuilder::new();
    let vars = VariableSet::build(&index, &config.candidates, &mut builder);
    let mut diagnostics = vars.notes.clone();

    if vars.instances.is_empty() {
        info!("No meetings requested; nothing to solve");
        let statistics = statistics(&index, &[], &[], SolverStatus::Optimal, Duration::ZERO, 0, 0);
        return Ok(SolveResult {
            schedule_id: index.schedule_id.clone(),
            status: SolverStatus::Optimal,
            scheduled_courses: Vec::new(),
            conflicts: Vec::new(),
            statistics,
            diagnostics,
            infeasibility: None,
        });
    }

    let encoded = constraints::encode(&index, &vars, config, &mut builder);
    diagnostics.extend(encoded.notes.iter().cloned());
    let objective = objective::compose(&index, &vars, &encoded, config, &mut builder);

    let (variables, rows) = (builder.variable_count(), builder.constraint_count());
    trace!("Model assembled in {:.2?}", start_time.elapsed());
    let outcome = engine.solve(builder.finish(objective), config.time_limit());
    let outcome = drop_empty_incumbent(outcome, &vars);

    let Some(valuation) = outcome.valuation else {
        let report = diagnose(&index, config, outcome.status);
        diagnostics.push(format!(
            "Solver returned {} after {:.2?} without a schedule; {} likely causes found",
            outcome.status,
            outcome.elapsed,
            report.issues.len()
        ));
        let statistics = statistics(&index, &[], &[], outcome.status, outcome.elapsed, variables, rows);
        return Ok(SolveResult {
            schedule_id: index.schedule_id.clone(),
            status: outcome.status,
            scheduled_courses: Vec::new(),
            conflicts: Vec::new(),
            statistics,
            diagnostics,
            infeasibility: Some(report),
        });
    };

    // get meetings from solution
    let Extraction {
        meetings,
        mut conflicts,
    } = extract(&index, &vars, &valuation, config);
    conflicts.extend(validate(&index, config, &meetings));
    for (i, conflict) in conflicts.iter_mut().enumerate() {
        conflict.conflict_id = format!("CONF-{:04}", i + 1);
    }

    let statistics = statistics(&index, &meetings, &conflicts, outcome.status, outcome.elapsed, variables, rows);
    info!(
        "Scheduled {}/{} meetings ({:.2}%) with {} conflicts in {:.2?}",
        statistics.meetings_scheduled,
        statistics.total_meetings_required,
        statistics.scheduling_percentage,
        conflicts.len(),
        start_time.elapsed()
    );

    // build the final output
    Ok(SolveResult {
        schedule_id: index.schedule_id.clone(),
        status: outcome.status,
        scheduled_courses: meetings,
        conflicts,
        statistics,
        diagnostics,
        infeasibility: None,
    })
}

/// A limit stop with nothing placed is HiGHS handing back its all-zero
/// starting point, not a schedule.
fn drop_empty_incumbent(outcome: EngineOutcome, vars: &VariableSet) -> EngineOutcome {
    let Some(valuation) = &outcome.valuation else {
        return outcome;
    };
    if outcome.status != SolverStatus::Feasible {
        return outcome;
    }
    let mut schedulable = vars.instances.iter().filter(|inst| inst.is_schedulable()).peekable();
    if schedulable.peek().is_none() || schedulable.any(|inst| valuation.is_true(inst.scheduled)) {
        return outcome;
    }
    warn!("Solver stopped at its limit without placing any meeting; treating as no incumbent");
    EngineOutcome::without_valuation(SolverStatus::Unknown, outcome.elapsed)
}

fn statistics(
    index: &DomainIndex,
    meetings: &[ScheduledMeeting],
    conflicts: &[Conflict],
    status: SolverStatus,
    elapsed: Duration,
    variables: usize,
    constraints: usize,
) -> Statistics {
    let required: usize = index.courses().iter().map(|c| c.num_classes as usize).sum();
    let core_required: usize = index
        .courses()
        .iter()
        .filter(|c| c.is_core)
        .map(|c| c.num_classes as usize)
        .sum();
    let core_scheduled = meetings
        .iter()
        .filter(|m| index.course_by_id(&m.course_id).is_some_and(|c| c.is_core))
        .count();

    let mut meetings_per_day = std::collections::BTreeMap::new();
    for m in meetings {
        *meetings_per_day.entry(m.day_of_week.clone()).or_insert(0) += 1;
    }

    Statistics {
        total_courses: index.courses().len(),
        total_meetings_required: required,
        meetings_scheduled: meetings.len(),
        scheduling_percentage: percentage(meetings.len(), required),
        core_meetings_required: core_required,
        core_meetings_scheduled: core_scheduled,
        core_scheduling_percentage: percentage(core_scheduled, core_required),
        meetings_per_day,
        unresolved_conflicts: conflicts.iter().filter(|c| !c.is_resolved).count(),
        variables,
        constraints,
        solver_status: status.as_str().to_string(),
        solver_time: elapsed.as_secs_f64(),
    }
}

/// Share of `part` in `whole`, rounded to two decimals; 100 when nothing is required.
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 100.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, Valuation};
    use crate::test_utils::{course, professor, request, slot};

    struct Refusing;

    impl SolvingEngine for Refusing {
        fn solve(&self, _model: Model, _time_limit: Duration) -> EngineOutcome {
            EngineOutcome::without_valuation(SolverStatus::Unknown, Duration::from_millis(5))
        }
    }

    /// Stops at the limit and hands back an all-zero point.
    struct ZeroAtLimit;

    impl SolvingEngine for ZeroAtLimit {
        fn solve(&self, _model: Model, time_limit: Duration) -> EngineOutcome {
            EngineOutcome {
                status: SolverStatus::Feasible,
                elapsed: time_limit,
                valuation: Some(Valuation::new(Default::default())),
            }
        }
    }

    #[test]
    fn percentage_rounding() {
        assert_eq!(percentage(0, 0), 100.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
    }

    #[test]
    fn empty_request_skips_the_engine() {
        let req = request(vec![], vec![professor("P1", Some("CS"))], vec![]);
        let result = solve_with(&req, &SchedulerConfig::default(), &Refusing).unwrap();
        assert_eq!(result.status, SolverStatus::Optimal);
        assert_eq!(result.statistics.scheduling_percentage, 100.0);
        assert!(result.infeasibility.is_none());
    }

    #[test]
    fn missing_valuation_routes_to_diagnoser() {
        let req = request(
            vec![course("C1", 55, true, 1, Some("ART"))],
            vec![professor("P1", Some("CS"))],
            vec![slot("TS1-MON", "Monday", "09:10", "10:05", 55)],
        );
        let result = solve_with(&req, &SchedulerConfig::default(), &Refusing).unwrap();
        assert_eq!(result.status, SolverStatus::Unknown);
        assert!(result.scheduled_courses.is_empty());
        assert_eq!(result.statistics.solver_status, "UNKNOWN");
        assert_eq!(result.statistics.scheduling_percentage, 0.0);
        assert_eq!(result.infeasibility.unwrap().issues.len(), 1);
    }

    #[test]
    fn empty_incumbent_at_limit_is_unknown() {
        let req = request(
            vec![course("C1", 55, true, 1, Some("CS"))],
            vec![professor("P1", Some("CS"))],
            vec![slot("TS1-MON", "Monday", "09:10", "10:05", 55)],
        );
        let result = solve_with(&req, &SchedulerConfig::default(), &ZeroAtLimit).unwrap();
        assert_eq!(result.status, SolverStatus::Unknown);
        assert!(result.scheduled_courses.is_empty());
        assert!(result.conflicts.is_empty());
        assert!(result.infeasibility.is_some());
    }

    #[test]
    fn invalid_settings_abort_before_modelling() {
        let mut config = SchedulerConfig::default();
        config.weights.elective = 1.0;
        let req = request(vec![], vec![], vec![]);
        let err = solve_with(&req, &config, &Refusing).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }
}
