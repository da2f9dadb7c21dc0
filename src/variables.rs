//! Decision variables for every course instance.
//!
//! Each weekly meeting gets its own scheduled indicator, one indicator per
//! qualified professor, one per candidate slot and one per day touched by
//! those slots. Meetings of the same course are coupled only through
//! constraints, never by sharing variables.

use std::collections::BTreeMap;

use good_lp::Variable;
use log::{debug, info};

use crate::config::CandidateSettings;
use crate::data::{Day, ProfessorId};
use crate::index::{CourseIdx, CourseInstance, DomainIndex, SlotIdx};
use crate::model::ModelBuilder;

/// Which step of the candidate-slot search produced an instance's slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStage {
    /// Durations within the base tolerance.
    Tolerance,
    /// Durations within the widened tolerance.
    Widened,
    /// Every teaching slot, regardless of duration.
    Fallback,
    /// Nothing usable.
    Empty,
}

#[derive(Debug, Clone)]
pub struct InstanceVars {
    pub instance: CourseInstance,
    pub scheduled: Variable,
    pub professors: BTreeMap<ProfessorId, Variable>,
    pub slots: BTreeMap<SlotIdx, Variable>,
    pub days: BTreeMap<Day, Variable>,
    pub stage: CandidateStage,
}

impl InstanceVars {
    pub fn is_schedulable(&self) -> bool {
        !self.professors.is_empty() && !self.slots.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct VariableSet {
    pub instances: Vec<InstanceVars>,
    by_course: BTreeMap<CourseIdx, Vec<usize>>,
    /// Human-readable notes about fallbacks taken while building.
    pub notes: Vec<String>,
}

impl VariableSet {
    pub fn build(index: &DomainIndex, settings: &CandidateSettings, builder: &mut ModelBuilder) -> Self {
        let mut set = VariableSet::default();
        let mut candidates_by_course: BTreeMap<CourseIdx, (Vec<SlotIdx>, CandidateStage)> = BTreeMap::new();

        for instance in index.course_instances() {
            let course = index.course(instance.course);
            let (candidates, stage) = candidates_by_course
                .entry(instance.course)
                .or_insert_with(|| {
                    let (slots, stage) = candidate_slots(index, course.duration_minutes, settings);
                    match stage {
                        CandidateStage::Tolerance => {}
                        CandidateStage::Widened => {
                            info!(
                                "Course {}: no slot within {} min of {} min, widened to {} min",
                                course.id,
                                settings.duration_tolerance_minutes,
                                course.duration_minutes,
                                settings.widened_tolerance_minutes
                            );
                            set.notes.push(format!(
                                "Course {} ({} min) uses slots within the widened {} min tolerance",
                                course.id, course.duration_minutes, settings.widened_tolerance_minutes
                            ));
                        }
                        CandidateStage::Fallback => {
                            info!(
                                "Course {}: no duration match for {} min, falling back to all teaching slots",
                                course.id, course.duration_minutes
                            );
                            set.notes.push(format!(
                                "Course {} ({} min) has no duration-compatible slot; all teaching slots are candidates",
                                course.id, course.duration_minutes
                            ));
                        }
                        CandidateStage::Empty => {
                            set.notes.push(format!(
                                "Course {} ({} min) has no candidate slot",
                                course.id, course.duration_minutes
                            ));
                        }
                    }
                    (slots, stage)
                });

            let tag = format!("{}_{}", instance.course_id, instance.index);
            let scheduled = builder.new_bool(format!("scheduled_{tag}"));

            let professors: BTreeMap<ProfessorId, Variable> = index
                .qualified_professors(&instance.course_id)
                .iter()
                .map(|p| (p.clone(), builder.new_bool(format!("prof_{tag}_{p}"))))
                .collect();

            let slots: BTreeMap<SlotIdx, Variable> = candidates
                .iter()
                .map(|&s| (s, builder.new_bool(format!("slot_{tag}_{}", index.slot(s).id))))
                .collect();

            let mut days: BTreeMap<Day, Variable> = BTreeMap::new();
            for &s in candidates.iter() {
                let day = &index.slot(s).day;
                if !days.contains_key(day) {
                    let var = builder.new_bool(format!("day_{tag}_{day}"));
                    days.insert(day.clone(), var);
                }
            }

            set.by_course
                .entry(instance.course)
                .or_default()
                .push(set.instances.len());
            set.instances.push(InstanceVars {
                instance,
                scheduled,
                professors,
                slots,
                days,
                stage: *stage,
            });
        }

        info!(
            "Created {} variables for {} course instances",
            builder.variable_count(),
            set.instances.len()
        );
        debug!(
            "Unschedulable instances: {:?}",
            set.instances
                .iter()
                .filter(|v| !v.is_schedulable())
                .map(|v| v.instance.label())
                .collect::<Vec<_>>()
        );
        set
    }

    /// Instances of one course, in meeting order.
    pub fn course_instances(&self, course: CourseIdx) -> Vec<&InstanceVars> {
        self.by_course
            .get(&course)
            .map(|positions| positions.iter().map(|&i| &self.instances[i]).collect())
            .unwrap_or_default()
    }

    pub fn courses(&self) -> impl Iterator<Item = (CourseIdx, Vec<&InstanceVars>)> + '_ {
        self.by_course.keys().map(|&c| (c, self.course_instances(c)))
    }
}

/// Candidate slots for a course duration: base tolerance, then widened
/// tolerance, then every teaching slot.
pub fn candidate_slots(
    index: &DomainIndex,
    duration: u32,
    settings: &CandidateSettings,
) -> (Vec<SlotIdx>, CandidateStage) {
    let teaching = |s: &SlotIdx| {
        let day = &index.slot(*s).day;
        !settings
            .non_teaching_days
            .iter()
            .any(|d| d.eq_ignore_ascii_case(day))
    };

    let within = |tolerance: u32| -> Vec<SlotIdx> {
        index
            .slots_near_duration(duration, tolerance)
            .into_iter()
            .filter(|s| teaching(s))
            .collect()
    };

    let base = within(settings.duration_tolerance_minutes);
    if !base.is_empty() {
        return (base, CandidateStage::Tolerance);
    }
    let widened = within(settings.widened_tolerance_minutes);
    if !widened.is_empty() {
        return (widened, CandidateStage::Widened);
    }
    if settings.allow_fallback {
        let all: Vec<SlotIdx> = (0..index.slots().len()).filter(|s| teaching(s)).collect();
        if !all.is_empty() {
            return (all, CandidateStage::Fallback);
        }
    }
    (Vec::new(), CandidateStage::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{course, professor, request, slot};

    fn index() -> DomainIndex {
        let req = request(
            vec![
                course("C55", 55, true, 2, Some("CS")),
                course("C100", 100, false, 1, Some("CS")),
                course("C240", 240, false, 1, Some("MATH")),
            ],
            vec![professor("P1", Some("CS")), professor("P2", Some("CS"))],
            vec![
                slot("TS1-MON", "Monday", "09:10", "10:05", 55),
                slot("TS1-WED", "Wednesday", "09:10", "10:05", 55),
                slot("TS1-FRI", "Friday", "09:10", "10:05", 55),
                slot("TS4-MON", "Monday", "12:45", "14:05", 80),
            ],
        );
        DomainIndex::build(&req).unwrap()
    }

    #[test]
    fn candidate_stages() {
        let index = index();
        let settings = CandidateSettings::default();

        let (slots, stage) = candidate_slots(&index, 55, &settings);
        assert_eq!(stage, CandidateStage::Tolerance);
        assert_eq!(slots, vec![0, 1]);

        let (slots, stage) = candidate_slots(&index, 100, &settings);
        assert_eq!(stage, CandidateStage::Widened);
        assert_eq!(slots, vec![3]);

        let (slots, stage) = candidate_slots(&index, 240, &settings);
        assert_eq!(stage, CandidateStage::Fallback);
        assert_eq!(slots, vec![0, 1, 3]);

        let strict = CandidateSettings {
            allow_fallback: false,
            ..CandidateSettings::default()
        };
        assert_eq!(candidate_slots(&index, 240, &strict).1, CandidateStage::Empty);
    }

    #[test]
    fn builds_per_instance_indicators() {
        let index = index();
        let mut builder = ModelBuilder::new();
        let set = VariableSet::build(&index, &CandidateSettings::default(), &mut builder);

        assert_eq!(set.instances.len(), 4);
        let first = &set.instances[0];
        assert_eq!(first.instance.label(), "C55#1");
        assert_eq!(first.professors.len(), 2);
        assert_eq!(first.slots.len(), 2);
        assert_eq!(first.days.keys().cloned().collect::<Vec<_>>(), vec!["Monday", "Wednesday"]);
        assert_ne!(first.scheduled, set.instances[1].scheduled);

        let unqualified = &set.instances[3];
        assert!(unqualified.professors.is_empty());
        assert!(!unqualified.is_schedulable());
        assert_eq!(unqualified.stage, CandidateStage::Fallback);

        assert_eq!(set.course_instances(0).len(), 2);
        assert_eq!(set.notes.len(), 2);
        // scheduled, professor, slot and day indicators
        assert_eq!(builder.variable_count(), 4 + 6 + 8 + 7);
    }
}
