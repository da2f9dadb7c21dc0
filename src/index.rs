//! Normalized, read-only view of one scheduling request.
//!
//! Built once per request. Raw records are checked and turned into lookup
//! tables grouped by id, day, duration and slot family; nothing mutates the
//! index afterwards.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use log::{debug, info, warn};

use crate::data::{Course, CourseId, Day, Professor, ProfessorId, SchedulingRequest, SlotId};
use crate::error::SchedulerError;

pub type SlotIdx = usize;
pub type CourseIdx = usize;

const WEEK: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Position of a day in the week; unknown names sort last.
pub fn day_rank(day: &str) -> usize {
    WEEK.iter().position(|d| d.eq_ignore_ascii_case(day)).unwrap_or(WEEK.len())
}

/// Parses `HH:MM` or `HH:MM:SS` into minutes since midnight.
pub fn parse_clock(value: &str) -> Option<u32> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let hours: u32 = parts[0].parse().ok()?;
    let minutes: u32 = parts[1].parse().ok()?;
    if let Some(seconds) = parts.get(2) {
        let seconds: u32 = seconds.parse().ok()?;
        if seconds >= 60 {
            return None;
        }
    }
    if hours > 24 || minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}

pub fn format_clock(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// A time slot after ingestion: parsed times and an explicit family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: SlotId,
    pub day: Day,
    pub start: u32,
    pub end: u32,
    pub duration: u32,
    pub family: String,
    pub start_label: String,
    pub end_label: String,
}

impl Slot {
    fn duration_gap(&self, minutes: u32) -> u32 {
        self.duration.abs_diff(minutes)
    }
}

/// One required weekly meeting of a course.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseInstance {
    pub course: CourseIdx,
    pub course_id: CourseId,
    /// 1-based meeting number within the week.
    pub index: u32,
    pub num_classes: u32,
}

impl CourseInstance {
    pub fn label(&self) -> String {
        format!("{}#{}", self.course_id, self.index)
    }
}

#[derive(Debug)]
pub struct DomainIndex {
    pub schedule_id: String,
    courses: Vec<Course>,
    course_by_id: HashMap<CourseId, CourseIdx>,
    professors: Vec<Professor>,
    professor_by_id: HashMap<ProfessorId, usize>,
    slots: Vec<Slot>,
    slot_by_id: HashMap<SlotId, SlotIdx>,
    slots_by_day: BTreeMap<Day, Vec<SlotIdx>>,
    slots_by_duration: BTreeMap<u32, Vec<SlotIdx>>,
    slots_by_family: BTreeMap<String, Vec<SlotIdx>>,
    professors_by_course: HashMap<CourseId, Vec<ProfessorId>>,
    courses_by_professor: HashMap<ProfessorId, Vec<CourseId>>,
    availability: HashMap<ProfessorId, HashMap<SlotIdx, bool>>,
}

impl DomainIndex {
    /// Validates the request and builds every lookup table.
    pub fn build(request: &SchedulingRequest) -> Result<Self, SchedulerError> {
        if request.schedule_id.trim().is_empty() {
            return Err(SchedulerError::configuration("scheduleId must not be empty"));
        }

        let mut course_by_id = HashMap::new();
        for (idx, course) in request.courses.iter().enumerate() {
            if course.id.trim().is_empty() {
                return Err(SchedulerError::configuration(format!("course #{idx} has an empty id")));
            }
            if course.duration_minutes == 0 {
                return Err(SchedulerError::configuration(format!(
                    "course {} has zero duration",
                    course.id
                )));
            }
            if course.num_classes == 0 {
                return Err(SchedulerError::configuration(format!(
                    "course {} requires zero weekly meetings",
                    course.id
                )));
            }
            if course_by_id.insert(course.id.clone(), idx).is_some() {
                return Err(SchedulerError::configuration(format!(
                    "duplicate course id {}",
                    course.id
                )));
            }
        }

        let mut professor_by_id = HashMap::new();
        for (idx, professor) in request.professors.iter().enumerate() {
            if professor.id.trim().is_empty() {
                return Err(SchedulerError::configuration(format!(
                    "professor #{idx} has an empty id"
                )));
            }
            if professor_by_id.insert(professor.id.clone(), idx).is_some() {
                return Err(SchedulerError::configuration(format!(
                    "duplicate professor id {}",
                    professor.id
                )));
            }
        }

        let mut slots = Vec::with_capacity(request.time_slots.len());
        let mut slot_by_id = HashMap::new();
        for raw in &request.time_slots {
            let start = parse_clock(&raw.start_time).ok_or_else(|| {
                SchedulerError::configuration(format!(
                    "time slot {} has invalid start time '{}'",
                    raw.id, raw.start_time
                ))
            })?;
            let end = parse_clock(&raw.end_time).ok_or_else(|| {
                SchedulerError::configuration(format!(
                    "time slot {} has invalid end time '{}'",
                    raw.id, raw.end_time
                ))
            })?;
            if end <= start || raw.duration_minutes == 0 {
                return Err(SchedulerError::configuration(format!(
                    "time slot {} has an empty interval",
                    raw.id
                )));
            }
            if end - start != raw.duration_minutes {
                warn!(
                    "Time slot {} spans {} minutes but declares {}",
                    raw.id,
                    end - start,
                    raw.duration_minutes
                );
            }
            let slot = Slot {
                id: raw.id.clone(),
                day: raw.day_of_week.clone(),
                start,
                end,
                duration: raw.duration_minutes,
                family: slot_family(
                    &raw.id,
                    &raw.day_of_week,
                    raw.slot_family.as_deref(),
                    start,
                    end,
                ),
                start_label: format_clock(start),
                end_label: format_clock(end),
            };
            if slot_by_id.insert(slot.id.clone(), slots.len()).is_some() {
                return Err(SchedulerError::configuration(format!(
                    "duplicate time slot id {}",
                    raw.id
                )));
            }
            slots.push(slot);
        }

        let mut slots_by_day: BTreeMap<Day, Vec<SlotIdx>> = BTreeMap::new();
        let mut slots_by_duration: BTreeMap<u32, Vec<SlotIdx>> = BTreeMap::new();
        let mut slots_by_family: BTreeMap<String, Vec<SlotIdx>> = BTreeMap::new();
        for (idx, slot) in slots.iter().enumerate() {
            slots_by_day.entry(slot.day.clone()).or_default().push(idx);
            slots_by_duration.entry(slot.duration).or_default().push(idx);
            slots_by_family.entry(slot.family.clone()).or_default().push(idx);
        }
        for day_slots in slots_by_day.values_mut() {
            day_slots.sort_by_key(|&idx| (slots[idx].start, slots[idx].end));
        }

        let explicit: HashMap<CourseId, Vec<ProfessorId>> = request
            .professor_courses
            .iter()
            .filter(|edge| {
                let known = course_by_id.contains_key(&edge.course_id)
                    && professor_by_id.contains_key(&edge.professor_id);
                if !known {
                    warn!(
                        "Skipping qualification edge {} -> {}: unknown id",
                        edge.professor_id, edge.course_id
                    );
                }
                known
            })
            .map(|edge| (edge.course_id.clone(), edge.professor_id.clone()))
            .into_group_map();

        let mut professors_by_course: HashMap<CourseId, Vec<ProfessorId>> = HashMap::new();
        for course in &request.courses {
            let mut qualified: Vec<ProfessorId> = match explicit.get(&course.id) {
                Some(professors) => professors.clone(),
                None => request
                    .professors
                    .iter()
                    .filter(|p| {
                        course.department_id.is_some() && p.department_id == course.department_id
                    })
                    .map(|p| p.id.clone())
                    .collect(),
            };
            qualified.sort();
            qualified.dedup();
            professors_by_course.insert(course.id.clone(), qualified);
        }
        let mut courses_by_professor: HashMap<ProfessorId, Vec<CourseId>> = professors_by_course
            .iter()
            .flat_map(|(course, professors)| professors.iter().map(move |p| (p.clone(), course.clone())))
            .into_group_map();
        for courses in courses_by_professor.values_mut() {
            courses.sort();
        }

        let mut availability: HashMap<ProfessorId, HashMap<SlotIdx, bool>> = HashMap::new();
        for record in &request.professor_availability {
            let Some(&slot_idx) = slot_by_id.get(&record.timeslot_id) else {
                warn!(
                    "Skipping availability of {} for unknown slot {}",
                    record.professor_id, record.timeslot_id
                );
                continue;
            };
            if !professor_by_id.contains_key(&record.professor_id) {
                warn!("Skipping availability for unknown professor {}", record.professor_id);
                continue;
            }
            if let Some(day) = &record.day_of_week {
                if !day.eq_ignore_ascii_case(&slots[slot_idx].day) {
                    warn!(
                        "Skipping availability of {} at {}: recorded for {} but the slot is on {}",
                        record.professor_id, record.timeslot_id, day, slots[slot_idx].day
                    );
                    continue;
                }
            }
            availability
                .entry(record.professor_id.clone())
                .or_default()
                .insert(slot_idx, record.is_available);
        }

        info!(
            "Indexed {} courses, {} professors, {} time slots across {} days and {} slot families",
            request.courses.len(),
            request.professors.len(),
            slots.len(),
            slots_by_day.len(),
            slots_by_family.len()
        );
        debug!("Slot durations on offer: {:?}", slots_by_duration.keys().collect::<Vec<_>>());

        Ok(Self {
            schedule_id: request.schedule_id.clone(),
            courses: request.courses.clone(),
            course_by_id,
            professors: request.professors.clone(),
            professor_by_id,
            slots,
            slot_by_id,
            slots_by_day,
            slots_by_duration,
            slots_by_family,
            professors_by_course,
            courses_by_professor,
            availability,
        })
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn course(&self, idx: CourseIdx) -> &Course {
        &self.courses[idx]
    }

    pub fn course_by_id(&self, id: &str) -> Option<&Course> {
        self.course_by_id.get(id).map(|&idx| &self.courses[idx])
    }

    pub fn professors(&self) -> &[Professor] {
        &self.professors
    }

    pub fn professor(&self, id: &str) -> Option<&Professor> {
        self.professor_by_id.get(id).map(|&idx| &self.professors[idx])
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, idx: SlotIdx) -> &Slot {
        &self.slots[idx]
    }

    pub fn slot_idx(&self, id: &str) -> Option<SlotIdx> {
        self.slot_by_id.get(id).copied()
    }

    /// Slots on `day`, ordered by start time.
    pub fn slots_on(&self, day: &str) -> &[SlotIdx] {
        self.slots_by_day.get(day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn family_slots(&self, family: &str) -> &[SlotIdx] {
        self.slots_by_family.get(family).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn families(&self) -> impl Iterator<Item = (&String, &Vec<SlotIdx>)> {
        self.slots_by_family.iter()
    }

    /// Slots whose duration is within `tolerance` minutes of `minutes`.
    pub fn slots_near_duration(&self, minutes: u32, tolerance: u32) -> Vec<SlotIdx> {
        let low = minutes.saturating_sub(tolerance);
        let high = minutes.saturating_add(tolerance);
        let mut found: Vec<SlotIdx> = self
            .slots_by_duration
            .range(low..=high)
            .flat_map(|(_, slots)| slots.iter().copied())
            .collect();
        found.sort_unstable();
        found
    }

    pub fn duration_matches(&self, slot: SlotIdx, minutes: u32, tolerance: u32) -> bool {
        self.slots[slot].duration_gap(minutes) <= tolerance
    }

    /// Days that carry at least one slot and are not excluded, in week order.
    pub fn teaching_days(&self, non_teaching: &[Day]) -> Vec<Day> {
        self.slots_by_day
            .keys()
            .filter(|day| !non_teaching.iter().any(|d| d.eq_ignore_ascii_case(day)))
            .cloned()
            .sorted_by_key(|day| (day_rank(day), day.clone()))
            .collect()
    }

    /// Qualified professors for a course, sorted by id.
    pub fn qualified_professors(&self, course_id: &str) -> &[ProfessorId] {
        self.professors_by_course.get(course_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_qualified(&self, professor: &str, course_id: &str) -> bool {
        self.qualified_professors(course_id).iter().any(|p| p == professor)
    }

    pub fn courses_taught_by(&self, professor: &str) -> &[CourseId] {
        self.courses_by_professor.get(professor).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A professor without any records is available everywhere; one with
    /// records is available only where a record says so.
    pub fn is_available(&self, professor: &str, slot: SlotIdx) -> bool {
        match self.availability.get(professor) {
            None => true,
            Some(records) => records.get(&slot).copied().unwrap_or(false),
        }
    }

    /// Same-day slot pairs where the second starts within `gap` minutes of
    /// the first ending.
    pub fn adjacent_pairs(&self, gap: u32) -> Vec<(SlotIdx, SlotIdx)> {
        let mut pairs = Vec::new();
        for day_slots in self.slots_by_day.values() {
            for &a in day_slots {
                for &b in day_slots {
                    let (first, second) = (&self.slots[a], &self.slots[b]);
                    if a != b && second.start >= first.end && second.start - first.end <= gap {
                        pairs.push((a, b));
                    }
                }
            }
        }
        pairs
    }

    pub fn are_adjacent(&self, a: SlotIdx, b: SlotIdx, gap: u32) -> bool {
        let (x, y) = (&self.slots[a], &self.slots[b]);
        if x.day != y.day || a == b {
            return false;
        }
        let forward = y.start >= x.end && y.start - x.end <= gap;
        let backward = x.start >= y.end && x.start - y.end <= gap;
        forward || backward
    }

    /// One instance per required weekly meeting, in course input order.
    pub fn course_instances(&self) -> Vec<CourseInstance> {
        self.courses
            .iter()
            .enumerate()
            .flat_map(|(idx, course)| {
                (1..=course.num_classes).map(move |index| CourseInstance {
                    course: idx,
                    course_id: course.id.clone(),
                    index,
                    num_classes: course.num_classes,
                })
            })
            .collect()
    }
}

/// Resolves the day-independent family of a slot at ingestion time.
fn slot_family(id: &str, day: &str, explicit: Option<&str>, start: u32, end: u32) -> String {
    if let Some(family) = explicit.map(str::trim).filter(|f| !f.is_empty()) {
        return family.to_string();
    }
    let abbreviation: String = day.chars().take(3).collect::<String>().to_uppercase();
    if let Some((stem, suffix)) = id.rsplit_once('-') {
        if !stem.is_empty() && suffix.eq_ignore_ascii_case(&abbreviation) {
            return stem.to_string();
        }
    }
    format!("{}-{}", format_clock(start), format_clock(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{course, professor, request, slot};
    use serde_json::json;

    #[test]
    fn parses_clock_values() {
        assert_eq!(parse_clock("09:10:00"), Some(550));
        assert_eq!(parse_clock("17:30"), Some(1050));
        assert_eq!(parse_clock("9"), None);
        assert_eq!(parse_clock("10:75"), None);
        assert_eq!(format_clock(550), "09:10");
    }

    #[test]
    fn derives_slot_families_once() {
        assert_eq!(slot_family("TS1-MON", "Monday", None, 550, 605), "TS1");
        assert_eq!(slot_family("TS-001", "Monday", None, 550, 605), "09:10-10:05");
        assert_eq!(slot_family("TS1-MON", "Monday", Some("morning"), 550, 605), "morning");
    }

    #[test]
    fn groups_slots_by_day_duration_and_family() {
        let req = request(
            vec![course("C1", 55, true, 1, Some("CS"))],
            vec![professor("P1", Some("CS"))],
            vec![
                slot("TS2-MON", "Monday", "10:20", "11:15", 55),
                slot("TS1-MON", "Monday", "09:10", "10:05", 55),
                slot("TS1-WED", "Wednesday", "09:10", "10:05", 55),
                slot("TS4-MON", "Monday", "12:45", "14:05", 80),
            ],
        );
        let index = DomainIndex::build(&req).unwrap();

        let monday: Vec<&str> = index.slots_on("Monday").iter().map(|&s| index.slot(s).id.as_str()).collect();
        assert_eq!(monday, vec!["TS1-MON", "TS2-MON", "TS4-MON"]);
        assert_eq!(index.family_slots("TS1").len(), 2);
        assert_eq!(index.slots_near_duration(85, 10).len(), 1);
        assert_eq!(index.slots_near_duration(55, 0).len(), 3);
        assert_eq!(index.teaching_days(&[]), vec!["Monday".to_string(), "Wednesday".to_string()]);
    }

    #[test]
    fn qualification_prefers_explicit_edges_then_department() {
        let mut req = request(
            vec![course("C1", 55, true, 1, Some("CS")), course("C2", 55, false, 1, Some("CS"))],
            vec![professor("P2", Some("CS")), professor("P1", Some("CS")), professor("P3", Some("MATH"))],
            vec![slot("TS1-MON", "Monday", "09:10", "10:05", 55)],
        );
        req.professor_courses = serde_json::from_value(json!([
            { "professor_id": "P3", "course_id": "C1" },
            { "professor_id": "P9", "course_id": "C1" }
        ]))
        .unwrap();
        let index = DomainIndex::build(&req).unwrap();

        assert_eq!(index.qualified_professors("C1"), &["P3".to_string()]);
        assert_eq!(index.qualified_professors("C2"), &["P1".to_string(), "P2".to_string()]);
        assert_eq!(index.courses_taught_by("P3"), &["C1".to_string()]);
    }

    #[test]
    fn availability_is_open_until_recorded() {
        let mut req = request(
            vec![course("C1", 55, true, 1, Some("CS"))],
            vec![professor("P1", Some("CS")), professor("P2", Some("CS"))],
            vec![
                slot("TS1-MON", "Monday", "09:10", "10:05", 55),
                slot("TS2-MON", "Monday", "10:20", "11:15", 55),
            ],
        );
        req.professor_availability = serde_json::from_value(json!([
            { "professor_id": "P1", "timeslot_id": "TS1-MON", "day_of_week": "Monday", "is_available": true }
        ]))
        .unwrap();
        let index = DomainIndex::build(&req).unwrap();

        assert!(index.is_available("P1", 0));
        assert!(!index.is_available("P1", 1));
        assert!(index.is_available("P2", 1));
    }

    #[test]
    fn adjacency_respects_gap() {
        let req = request(
            vec![],
            vec![],
            vec![
                slot("TS1-MON", "Monday", "09:10", "10:05", 55),
                slot("TS2-MON", "Monday", "10:05", "11:00", 55),
                slot("TS3-MON", "Monday", "11:15", "12:10", 55),
                slot("TS1-TUE", "Tuesday", "11:00", "11:55", 55),
            ],
        );
        let index = DomainIndex::build(&req).unwrap();

        assert_eq!(index.adjacent_pairs(0), vec![(0, 1)]);
        assert_eq!(index.adjacent_pairs(15), vec![(0, 1), (1, 2)]);
        assert!(index.are_adjacent(1, 0, 0));
        assert!(!index.are_adjacent(1, 3, 60));
    }

    #[test]
    fn rejects_structural_problems() {
        let dup = request(
            vec![course("C1", 55, true, 1, None), course("C1", 55, true, 1, None)],
            vec![],
            vec![],
        );
        assert!(matches!(DomainIndex::build(&dup), Err(SchedulerError::Configuration(_))));

        let zero = request(vec![course("C1", 55, true, 0, None)], vec![], vec![]);
        assert!(DomainIndex::build(&zero).is_err());

        let bad_time = request(vec![], vec![], vec![slot("TS1-MON", "Monday", "nine", "10:05", 55)]);
        assert!(DomainIndex::build(&bad_time).is_err());
    }

    #[test]
    fn expands_course_instances() {
        let req = request(
            vec![course("C1", 55, true, 2, None), course("C2", 80, false, 1, None)],
            vec![],
            vec![],
        );
        let index = DomainIndex::build(&req).unwrap();
        let labels: Vec<String> = index.course_instances().iter().map(CourseInstance::label).collect();
        assert_eq!(labels, vec!["C1#1", "C1#2", "C2#1"]);
    }
}
