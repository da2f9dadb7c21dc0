//! Root-cause hints for a model the engine could not solve.

use log::{info, warn};

use crate::config::SchedulerConfig;
use crate::data::{InfeasibilityReport, Issue, IssueKind, SolverStatus};
use crate::index::DomainIndex;
use crate::variables::candidate_slots;

/// Scans the index for data gaps that explain a missing solution.
///
/// The report is built from the input alone; it does not look at the model.
pub fn diagnose(index: &DomainIndex, config: &SchedulerConfig, status: SolverStatus) -> InfeasibilityReport {
    let mut issues = Vec::new();
    let non_teaching = &config.candidates.non_teaching_days;
    let is_teaching = |day: &str| !non_teaching.iter().any(|d| d.eq_ignore_ascii_case(day));

    for course in index.courses() {
        let exact: Vec<_> = index
            .slots_near_duration(course.duration_minutes, config.candidates.duration_tolerance_minutes)
            .into_iter()
            .filter(|&s| is_teaching(&index.slot(s).day))
            .collect();
        if exact.is_empty() {
            issues.push(Issue {
                issue_type: IssueKind::DurationGap,
                course_id: Some(course.id.clone()),
                description: format!(
                    "Course {} ({} min) matches no teaching slot within {} minutes",
                    course.id, course.duration_minutes, config.candidates.duration_tolerance_minutes
                ),
            });
        }

        let qualified = index.qualified_professors(&course.id);
        if qualified.is_empty() {
            issues.push(Issue {
                issue_type: IssueKind::QualificationGap,
                course_id: Some(course.id.clone()),
                description: format!("Course {} has no qualified professor", course.id),
            });
        } else {
            let (candidates, _) = candidate_slots(index, course.duration_minutes, &config.candidates);
            let open = candidates
                .iter()
                .any(|&s| qualified.iter().any(|p| index.is_available(p, s)));
            if !candidates.is_empty() && !open {
                issues.push(Issue {
                    issue_type: IssueKind::AvailabilityGap,
                    course_id: Some(course.id.clone()),
                    description: format!(
                        "No qualified professor for course {} is available at any of its {} candidate slots",
                        course.id,
                        candidates.len()
                    ),
                });
            }
        }

        if course.num_classes > 1 && config.patterns.for_meetings(course.num_classes).is_empty() {
            issues.push(Issue {
                issue_type: IssueKind::PatternGap,
                course_id: Some(course.id.clone()),
                description: format!(
                    "Course {} needs {} weekly meetings but no day pattern is defined for that count",
                    course.id, course.num_classes
                ),
            });
        }
    }

    let required: usize = index.courses().iter().map(|c| c.num_classes as usize).sum();
    let teaching_slots = index.slots().iter().filter(|s| is_teaching(&s.day)).count();
    let capacity = teaching_slots * config.policy.max_meetings_per_slot as usize;
    if required > capacity {
        issues.push(Issue {
            issue_type: IssueKind::CapacityShortfall,
            course_id: None,
            description: format!(
                "{} meetings are required but {} teaching slots hold at most {}",
                required, teaching_slots, capacity
            ),
        });
    }

    if issues.is_empty() {
        info!("No data gap explains the {} result", status);
    }
    for issue in &issues {
        warn!("{:?}: {}", issue.issue_type, issue.description);
    }
    InfeasibilityReport {
        solver_status: status,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProfessorAvailability;
    use crate::test_utils::{course, professor, request, slot};

    #[test]
    fn reports_each_gap() {
        let mut req = request(
            vec![
                course("C240", 240, false, 1, Some("CS")),
                course("NOBODY", 55, false, 1, Some("ART")),
                course("C4", 55, true, 4, Some("CS")),
                course("BUSY", 55, false, 1, Some("MATH")),
            ],
            vec![professor("P1", Some("CS")), professor("P2", Some("MATH"))],
            vec![slot("TS1-MON", "Monday", "09:10", "10:05", 55)],
        );
        req.professor_availability.push(ProfessorAvailability {
            professor_id: "P2".into(),
            timeslot_id: "TS1-MON".into(),
            day_of_week: Some("Monday".into()),
            is_available: false,
        });
        let index = DomainIndex::build(&req).unwrap();
        let report = diagnose(&index, &SchedulerConfig::default(), SolverStatus::Infeasible);

        let kinds: Vec<(IssueKind, Option<&str>)> = report
            .issues
            .iter()
            .map(|i| (i.issue_type, i.course_id.as_deref()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (IssueKind::DurationGap, Some("C240")),
                (IssueKind::QualificationGap, Some("NOBODY")),
                (IssueKind::PatternGap, Some("C4")),
                (IssueKind::AvailabilityGap, Some("BUSY")),
                (IssueKind::CapacityShortfall, None),
            ]
        );
        assert_eq!(report.solver_status, SolverStatus::Infeasible);
    }

    #[test]
    fn clean_input_yields_no_issues() {
        let req = request(
            vec![course("C1", 55, true, 1, Some("CS"))],
            vec![professor("P1", Some("CS"))],
            vec![slot("TS1-MON", "Monday", "09:10", "10:05", 55)],
        );
        let index = DomainIndex::build(&req).unwrap();
        let report = diagnose(&index, &SchedulerConfig::default(), SolverStatus::Unknown);
        assert!(report.issues.is_empty());
    }
}
