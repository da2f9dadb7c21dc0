//! Decodes a solved valuation into scheduled meetings.
//!
//! Extraction never fails as a whole: an instance whose indicators do not
//! decode cleanly becomes an `EXTRACTION_INCONSISTENCY` conflict, and every
//! unscheduled instance gets a conflict naming the most likely cause.

use log::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::constraints::is_excluded;
use crate::data::{Conflict, ConflictKind, ProfessorId, ScheduledMeeting};
use crate::index::{DomainIndex, SlotIdx};
use crate::model::Valuation;
use crate::variables::{CandidateStage, InstanceVars, VariableSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub meetings: Vec<ScheduledMeeting>,
    pub conflicts: Vec<Conflict>,
}

pub fn scheduled_course_id(course_id: &str, instance: u32) -> String {
    format!("SC-{course_id}-{instance}")
}

pub fn extract(
    index: &DomainIndex,
    vars: &VariableSet,
    valuation: &Valuation,
    config: &SchedulerConfig,
) -> Extraction {
    let mut out = Extraction::default();

    for inst in &vars.instances {
        if !valuation.is_true(inst.scheduled) {
            out.conflicts.push(explain_unscheduled(index, vars, inst, config));
            continue;
        }

        let professors: Vec<&ProfessorId> = inst
            .professors
            .iter()
            .filter(|(_, var)| valuation.is_true(**var))
            .map(|(p, _)| p)
            .collect();
        let slots: Vec<SlotIdx> = inst
            .slots
            .iter()
            .filter(|(_, var)| valuation.is_true(**var))
            .map(|(s, _)| *s)
            .collect();

        match (professors.as_slice(), slots.as_slice()) {
            ([professor], [slot]) => {
                let slot = index.slot(*slot);
                out.meetings.push(ScheduledMeeting {
                    scheduled_course_id: scheduled_course_id(&inst.instance.course_id, inst.instance.index),
                    course_id: inst.instance.course_id.clone(),
                    class_instance: inst.instance.index,
                    num_classes: inst.instance.num_classes,
                    professor_id: (*professor).clone(),
                    timeslot_id: slot.id.clone(),
                    day_of_week: slot.day.clone(),
                    start_time: slot.start_label.clone(),
                    end_time: slot.end_label.clone(),
                });
            }
            _ => {
                warn!(
                    "Instance {} is scheduled but has {} professor and {} slot indicators set",
                    inst.instance.label(),
                    professors.len(),
                    slots.len()
                );
                let first = slots.first().map(|&s| index.slot(s));
                out.conflicts.push(
                    Conflict::new(
                        ConflictKind::ExtractionInconsistency,
                        format!(
                            "Meeting {} of course {} decoded with {} professors and {} slots instead of exactly one each",
                            inst.instance.index,
                            index.course(inst.instance.course).label(),
                            professors.len(),
                            slots.len()
                        ),
                    )
                    .at(first.map(|s| &s.id), first.map(|s| &s.day))
                    .with_courses([inst.instance.course_id.clone()]),
                );
            }
        }
    }

    info!(
        "Extracted {} meetings and {} conflicts from {} instances",
        out.meetings.len(),
        out.conflicts.len(),
        vars.instances.len()
    );
    out
}

/// Builds the conflict for an instance the engine left unscheduled.
fn explain_unscheduled(
    index: &DomainIndex,
    vars: &VariableSet,
    inst: &InstanceVars,
    config: &SchedulerConfig,
) -> Conflict {
    let course = index.course(inst.instance.course);
    let label = format!("Meeting {} of course {}", inst.instance.index, course.label());

    let first_slot = inst
        .slots
        .keys()
        .map(|&s| index.slot(s))
        .min_by(|a, b| a.id.cmp(&b.id));
    let suggested = index.qualified_professors(&course.id).first().cloned();

    let (kind, cause) = if inst.professors.is_empty() {
        (
            ConflictKind::NoQualifiedProfessor,
            "no professor is qualified to teach it".to_string(),
        )
    } else if inst.slots.is_empty() {
        (
            ConflictKind::NoAvailableSlot,
            format!("no teaching slot is compatible with its {} minute duration", course.duration_minutes),
        )
    } else if inst.slots.keys().all(|&s| is_excluded(index, config, course, s)) {
        (
            ConflictKind::NoAvailableSlot,
            "every compatible slot is barred by a calendar exclusion".to_string(),
        )
    } else if !has_open_pairing(index, config, inst) {
        (
            ConflictKind::NoAvailableSlot,
            "no qualified professor is available at any compatible slot".to_string(),
        )
    } else if inst.instance.num_classes > 1 && config.patterns.for_meetings(inst.instance.num_classes).is_empty() {
        (
            ConflictKind::NoAvailableSlot,
            format!("no day pattern is defined for {} weekly meetings", inst.instance.num_classes),
        )
    } else if inst.instance.num_classes > 1 && !covers_some_pattern(vars, inst, config) {
        (
            ConflictKind::NoAvailableSlot,
            format!(
                "its compatible slots do not cover any day pattern for {} weekly meetings",
                inst.instance.num_classes
            ),
        )
    } else {
        (
            ConflictKind::NoAvailableSlot,
            "every compatible professor and slot combination was taken by other meetings".to_string(),
        )
    };
    let cause = if inst.stage == CandidateStage::Fallback {
        format!(
            "{cause} (no slot matches its {} minute duration, so any teaching slot was considered)",
            course.duration_minutes
        )
    } else {
        cause
    };
    debug!("{} unscheduled: {}", inst.instance.label(), cause);

    let mut conflict = Conflict::new(kind, format!("{label} could not be scheduled: {cause}"))
        .at(first_slot.map(|s| &s.id), first_slot.map(|s| &s.day))
        .with_courses([course.id.clone()]);
    conflict.suggested_professor_id = suggested;
    conflict
}

fn has_open_pairing(index: &DomainIndex, config: &SchedulerConfig, inst: &InstanceVars) -> bool {
    let course = index.course(inst.instance.course);
    inst.slots.keys().any(|&s| {
        !is_excluded(index, config, course, s)
            && inst.professors.keys().any(|p| index.is_available(p, s))
    })
}

/// Whether every instance of the course has a candidate day for some pattern.
fn covers_some_pattern(vars: &VariableSet, inst: &InstanceVars, config: &SchedulerConfig) -> bool {
    let siblings = vars.course_instances(inst.instance.course);
    config
        .patterns
        .for_meetings(inst.instance.num_classes)
        .iter()
        .any(|pattern| {
            siblings.iter().zip(pattern).all(|(sibling, day)| {
                sibling.days.keys().any(|d| d.eq_ignore_ascii_case(day))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalendarExclusion, CourseClass};
    use crate::model::ModelBuilder;
    use crate::test_utils::{course, professor, request, slot};

    fn setup() -> (DomainIndex, VariableSet, SchedulerConfig) {
        let req = request(
            vec![
                course("C1", 55, true, 1, Some("CS")),
                course("C2", 55, false, 1, Some("MATH")),
                course("C3", 55, false, 2, Some("CS")),
            ],
            vec![professor("P2", Some("CS")), professor("P1", Some("CS"))],
            vec![
                slot("TS2-MON", "Monday", "10:05", "11:00", 55),
                slot("TS1-MON", "Monday", "09:10", "10:05", 55),
            ],
        );
        let index = DomainIndex::build(&req).unwrap();
        let config = SchedulerConfig::default();
        let mut builder = ModelBuilder::new();
        let vars = VariableSet::build(&index, &config.candidates, &mut builder);
        (index, vars, config)
    }

    fn schedule(valuation: &mut Valuation, inst: &InstanceVars, professor: &str, slot: SlotIdx) {
        valuation.set(inst.scheduled, 1.0);
        valuation.set(inst.professors[professor], 1.0);
        valuation.set(inst.slots[&slot], 1.0);
    }

    #[test]
    fn decodes_meetings_and_explains_gaps() {
        let (index, vars, config) = setup();
        let ts1 = index.slot_idx("TS1-MON").unwrap();
        let mut valuation = Valuation::default();
        schedule(&mut valuation, &vars.instances[0], "P1", ts1);

        let out = extract(&index, &vars, &valuation, &config);
        assert_eq!(out.meetings.len(), 1);
        let meeting = &out.meetings[0];
        assert_eq!(meeting.scheduled_course_id, "SC-C1-1");
        assert_eq!(meeting.timeslot_id, "TS1-MON");
        assert_eq!(meeting.start_time, "09:10");

        // C2 has nobody qualified; C3 needs Mon/Wed or Tue/Thu but only has Monday
        assert_eq!(out.conflicts.len(), 3);
        assert_eq!(out.conflicts[0].conflict_type, ConflictKind::NoQualifiedProfessor);
        assert_eq!(out.conflicts[0].suggested_professor_id, None);
        let pattern = &out.conflicts[1];
        assert_eq!(pattern.conflict_type, ConflictKind::NoAvailableSlot);
        assert!(pattern.description.contains("day pattern"));
        assert_eq!(pattern.timeslot_id.as_deref(), Some("TS1-MON"));
        assert_eq!(pattern.suggested_professor_id.as_deref(), Some("P1"));
    }

    #[test]
    fn reports_inconsistent_indicators() {
        let (index, vars, config) = setup();
        let inst = &vars.instances[0];
        let mut valuation = Valuation::default();
        valuation.set(inst.scheduled, 1.0);
        valuation.set(inst.professors["P1"], 1.0);
        valuation.set(inst.professors["P2"], 1.0);
        valuation.set(inst.slots[&index.slot_idx("TS1-MON").unwrap()], 1.0);

        let out = extract(&index, &vars, &valuation, &config);
        assert!(out.meetings.is_empty());
        assert_eq!(out.conflicts[0].conflict_type, ConflictKind::ExtractionInconsistency);
        assert_eq!(out.conflicts[0].course_ids, vec!["C1".to_string()]);
    }

    fn build(req: &crate::data::SchedulingRequest, config: &SchedulerConfig) -> (DomainIndex, VariableSet) {
        let index = DomainIndex::build(req).unwrap();
        let mut builder = ModelBuilder::new();
        let vars = VariableSet::build(&index, &config.candidates, &mut builder);
        (index, vars)
    }

    #[test]
    fn names_the_course_and_blames_calendar_exclusions() {
        let mut intro = course("CS101", 55, true, 1, Some("CS"));
        intro.course_name = Some("Intro Programming".into());
        let req = request(
            vec![intro],
            vec![professor("P1", Some("CS"))],
            vec![slot("TS5-THU", "Thursday", "17:30", "18:25", 55)],
        );
        let mut config = SchedulerConfig::default();
        config.policy.calendar_exclusions.push(CalendarExclusion {
            day: "Thursday".into(),
            applies_to: CourseClass::Core,
            after: Some("17:00".into()),
        });
        let (index, vars) = build(&req, &config);

        let out = extract(&index, &vars, &Valuation::default(), &config);
        assert_eq!(out.conflicts.len(), 1);
        let description = &out.conflicts[0].description;
        assert!(description.starts_with("Meeting 1 of course Intro Programming (CS101)"));
        assert!(description.contains("calendar exclusion"));
    }

    #[test]
    fn fallback_instances_mention_the_duration_gap() {
        let req = request(
            vec![course("LAB1", 180, false, 1, Some("CS"))],
            vec![professor("P1", Some("CS"))],
            vec![slot("TS1-MON", "Monday", "09:10", "10:05", 55)],
        );
        let config = SchedulerConfig::default();
        let (index, vars) = build(&req, &config);
        assert_eq!(vars.instances[0].stage, CandidateStage::Fallback);

        let out = extract(&index, &vars, &Valuation::default(), &config);
        assert!(out.conflicts[0].description.contains("no slot matches its 180 minute duration"));
    }

    #[test]
    fn extraction_is_idempotent() {
        let (index, vars, config) = setup();
        let mut valuation = Valuation::default();
        schedule(&mut valuation, &vars.instances[0], "P2", index.slot_idx("TS2-MON").unwrap());

        let first = extract(&index, &vars, &valuation, &config);
        let second = extract(&index, &vars, &valuation, &config);
        assert_eq!(first, second);
    }
}
