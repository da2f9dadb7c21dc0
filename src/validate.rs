//! Post-hoc checks over a decoded timetable.
//!
//! These repeat, independently of the model, what the constraints were
//! meant to guarantee. A violation becomes a conflict; the meetings involved
//! stay in the output.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::{info, warn};

use crate::config::SchedulerConfig;
use crate::data::{Conflict, ConflictKind, CourseId, ProfessorId, ScheduledMeeting};
use crate::index::{DomainIndex, SlotIdx, day_rank};

pub fn validate(index: &DomainIndex, config: &SchedulerConfig, meetings: &[ScheduledMeeting]) -> Vec<Conflict> {
    let placed: Vec<(&ScheduledMeeting, SlotIdx)> = meetings
        .iter()
        .filter_map(|m| index.slot_idx(&m.timeslot_id).map(|s| (m, s)))
        .collect();

    let mut conflicts = Vec::new();
    check_slot_sharing(index, config, &placed, &mut conflicts);
    check_professor_double_booking(index, &placed, &mut conflicts);
    check_consecutive_teaching(index, config, &placed, &mut conflicts);
    check_day_patterns(index, config, meetings, &mut conflicts);
    check_slot_families(index, &placed, &mut conflicts);
    check_assignments(index, config, &placed, &mut conflicts);

    if conflicts.is_empty() {
        info!("Validation passed for {} meetings", meetings.len());
    } else {
        warn!("Validation found {} conflicts", conflicts.len());
    }
    conflicts
}

/// (a) slot capacity and the core overlap rule.
fn check_slot_sharing(
    index: &DomainIndex,
    config: &SchedulerConfig,
    placed: &[(&ScheduledMeeting, SlotIdx)],
    conflicts: &mut Vec<Conflict>,
) {
    let by_slot: BTreeMap<SlotIdx, Vec<&ScheduledMeeting>> =
        placed.iter().map(|&(m, s)| (s, m)).into_group_map().into_iter().collect();
    let cap = config.policy.max_meetings_per_slot as usize;

    for (slot, together) in by_slot {
        let slot = index.slot(slot);
        if together.len() > cap {
            conflicts.push(
                Conflict::new(
                    ConflictKind::TimeSlotConflict,
                    format!(
                        "{} meetings share {} on {}, above the limit of {}",
                        together.len(),
                        slot.id,
                        slot.day,
                        cap
                    ),
                )
                .at(Some(&slot.id), Some(&slot.day))
                .with_meetings(together.iter().copied()),
            );
        }
        let core: Vec<&ScheduledMeeting> = together
            .iter()
            .copied()
            .filter(|m| index.course_by_id(&m.course_id).is_some_and(|c| c.is_core))
            .collect();
        let core_courses: BTreeSet<&CourseId> = core.iter().map(|m| &m.course_id).collect();
        if core.len() > 1 && core_courses.len() > 1 {
            conflicts.push(
                Conflict::new(
                    ConflictKind::TimeSlotConflict,
                    format!(
                        "Core courses {} overlap in {} on {}",
                        core_courses.iter().join(", "),
                        slot.id,
                        slot.day
                    ),
                )
                .at(Some(&slot.id), Some(&slot.day))
                .with_meetings(core),
            );
        }
    }
}

/// (b) one meeting per professor per slot.
fn check_professor_double_booking(
    index: &DomainIndex,
    placed: &[(&ScheduledMeeting, SlotIdx)],
    conflicts: &mut Vec<Conflict>,
) {
    let by_professor_slot: BTreeMap<(&ProfessorId, SlotIdx), Vec<&ScheduledMeeting>> = placed
        .iter()
        .map(|&(m, s)| ((&m.professor_id, s), m))
        .into_group_map()
        .into_iter()
        .collect();

    for ((professor, slot), together) in by_professor_slot {
        if together.len() < 2 {
            continue;
        }
        let slot = index.slot(slot);
        conflicts.push(
            Conflict::new(
                ConflictKind::ProfessorDoubleBooked,
                format!(
                    "Professor {} teaches {} meetings in {} on {}",
                    professor,
                    together.len(),
                    slot.id,
                    slot.day
                ),
            )
            .at(Some(&slot.id), Some(&slot.day))
            .with_meetings(together),
        );
    }
}

/// (c) no back-to-back slots for a professor on one day.
fn check_consecutive_teaching(
    index: &DomainIndex,
    config: &SchedulerConfig,
    placed: &[(&ScheduledMeeting, SlotIdx)],
    conflicts: &mut Vec<Conflict>,
) {
    let gap = config.policy.adjacency_gap_minutes;
    let by_professor: BTreeMap<&ProfessorId, Vec<(&ScheduledMeeting, SlotIdx)>> = placed
        .iter()
        .map(|&(m, s)| (&m.professor_id, (m, s)))
        .into_group_map()
        .into_iter()
        .collect();

    for (professor, mut teaching) in by_professor {
        teaching.sort_by_key(|&(m, s)| (day_rank(&index.slot(s).day), index.slot(s).start, m.scheduled_course_id.clone()));
        for (i, &(first, a)) in teaching.iter().enumerate() {
            for &(second, b) in &teaching[i + 1..] {
                if !index.are_adjacent(a, b, gap) {
                    continue;
                }
                let (x, y) = (index.slot(a), index.slot(b));
                conflicts.push(
                    Conflict::new(
                        ConflictKind::ConsecutiveTeaching,
                        format!(
                            "Professor {} teaches back to back on {}: {} ({}-{}) and {} ({}-{})",
                            professor,
                            x.day,
                            first.course_id,
                            x.start_label,
                            x.end_label,
                            second.course_id,
                            y.start_label,
                            y.end_label
                        ),
                    )
                    .at(Some(&y.id), Some(&y.day))
                    .with_meetings([first, second]),
                );
            }
        }
    }
}

/// (d) the day set of each multi-meeting course matches a defined pattern.
fn check_day_patterns(
    index: &DomainIndex,
    config: &SchedulerConfig,
    meetings: &[ScheduledMeeting],
    conflicts: &mut Vec<Conflict>,
) {
    for (course_id, placed) in by_course(meetings) {
        let Some(course) = index.course_by_id(course_id) else {
            continue;
        };
        let required = course.num_classes as usize;
        if required < 2 {
            continue;
        }
        let days: Vec<String> = normalized_days(placed.iter().map(|m| m.day_of_week.as_str()));

        let description = if placed.len() < required {
            Some(format!(
                "Course {} has only {} of {} weekly meetings placed ({})",
                course.label(),
                placed.len(),
                required,
                days.join(", ")
            ))
        } else {
            let matches = config
                .patterns
                .for_meetings(course.num_classes)
                .iter()
                .any(|pattern| normalized_days(pattern.iter().map(String::as_str)) == days && days.len() == required);
            (!matches).then(|| {
                format!(
                    "Course {} meets on {}, which is not a defined pattern for {} meetings",
                    course.label(),
                    days.join(", "),
                    required
                )
            })
        };

        if let Some(description) = description {
            conflicts.push(
                Conflict::new(ConflictKind::DayPatternViolation, description)
                    .with_meetings(placed.iter().copied()),
            );
        }
    }
}

/// (e) all meetings of a course share one slot family.
fn check_slot_families(index: &DomainIndex, placed: &[(&ScheduledMeeting, SlotIdx)], conflicts: &mut Vec<Conflict>) {
    let by_course: BTreeMap<&CourseId, Vec<(&ScheduledMeeting, SlotIdx)>> = placed
        .iter()
        .map(|&(m, s)| (&m.course_id, (m, s)))
        .into_group_map()
        .into_iter()
        .collect();

    for (course_id, meetings) in by_course {
        let families: BTreeSet<&str> = meetings.iter().map(|&(_, s)| index.slot(s).family.as_str()).collect();
        if families.len() > 1 {
            conflicts.push(
                Conflict::new(
                    ConflictKind::SlotFamilyViolation,
                    format!(
                        "Course {} uses different slot families: {}",
                        course_id,
                        families.iter().join(", ")
                    ),
                )
                .with_meetings(meetings.iter().map(|&(m, _)| m)),
            );
        }
    }
}

/// Qualification, availability and duration fit of every single meeting.
fn check_assignments(
    index: &DomainIndex,
    config: &SchedulerConfig,
    placed: &[(&ScheduledMeeting, SlotIdx)],
    conflicts: &mut Vec<Conflict>,
) {
    for &(meeting, s) in placed {
        let slot = index.slot(s);
        let here = |c: Conflict| c.at(Some(&slot.id), Some(&slot.day)).with_meetings([meeting]);

        if index.professor(&meeting.professor_id).is_none() {
            conflicts.push(here(Conflict::new(
                ConflictKind::NoQualifiedProfessor,
                format!("Professor {} is not part of this request", meeting.professor_id),
            )));
        } else if !index.is_qualified(&meeting.professor_id, &meeting.course_id) {
            conflicts.push(here(Conflict::new(
                ConflictKind::NoQualifiedProfessor,
                format!(
                    "Professor {} is not qualified for course {}",
                    meeting.professor_id, meeting.course_id
                ),
            )));
        }
        if !index.is_available(&meeting.professor_id, s) {
            conflicts.push(here(Conflict::new(
                ConflictKind::ProfessorUnavailable,
                format!(
                    "Professor {} is not available in {} on {}",
                    meeting.professor_id, slot.id, slot.day
                ),
            )));
        }
        let Some(course) = index.course_by_id(&meeting.course_id) else {
            continue;
        };
        if !index.duration_matches(s, course.duration_minutes, config.candidates.widened_tolerance_minutes) {
            conflicts.push(here(Conflict::new(
                ConflictKind::DurationMismatch,
                format!(
                    "Course {} runs {} minutes but {} is {} minutes long",
                    course.label(),
                    course.duration_minutes,
                    slot.id,
                    slot.duration
                ),
            )));
        }
    }
}

fn by_course(meetings: &[ScheduledMeeting]) -> BTreeMap<&CourseId, Vec<&ScheduledMeeting>> {
    meetings
        .iter()
        .map(|m| (&m.course_id, m))
        .into_group_map()
        .into_iter()
        .collect()
}

/// Lower-cased, week-ordered day list.
fn normalized_days<'a>(days: impl Iterator<Item = &'a str>) -> Vec<String> {
    days.map(str::to_lowercase)
        .sorted_by_key(|d| (day_rank(d), d.clone()))
        .collect()
}
