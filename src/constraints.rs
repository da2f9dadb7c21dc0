//! Hard rules of the timetable, written as linear rows over the variable set.
//!
//! Every rule is a free function of the domain index and the variables that
//! appends rows to the shared [`ModelBuilder`]. The order of the calls in
//! [`encode`] does not matter; all rows are conjoined. Rules with a
//! [`RuleMode`] either forbid a situation outright or admit it through a
//! violation variable that the objective penalizes.

use std::collections::{BTreeMap, BTreeSet};

use good_lp::{Expression, Variable, constraint};
use log::{debug, info};

use crate::config::{RuleMode, SchedulerConfig};
use crate::data::{Course, Day, ProfessorId};
use crate::index::{DomainIndex, SlotIdx, parse_clock};
use crate::model::ModelBuilder;
use crate::variables::{InstanceVars, VariableSet};

/// Handles the objective composer needs from the encoded model.
#[derive(Debug, Default)]
pub struct EncodedModel {
    /// One selector per (multi-meeting course, day pattern).
    pub pattern_vars: Vec<Variable>,
    /// Soft-mode violation counters; each unit is penalized.
    pub violations: Vec<Variable>,
    /// Busiest and least busy reachable day counts.
    pub day_spread: Option<(Variable, Variable)>,
    /// Amount by which the day spread exceeds `max_day_imbalance`.
    pub spread_excess: Option<Variable>,
    /// Largest number of meetings in any one slot.
    pub slot_peak: Option<Variable>,
    /// Slot indicators of every instance, grouped by slot.
    pub slot_occupancy: BTreeMap<SlotIdx, Vec<Variable>>,
    pub notes: Vec<String>,
}

/// Emits every rule and returns the handles used by the objective.
pub fn encode(
    index: &DomainIndex,
    vars: &VariableSet,
    config: &SchedulerConfig,
    builder: &mut ModelBuilder,
) -> EncodedModel {
    let mut encoded = EncodedModel::default();

    let before = builder.constraint_count();
    link_indicators(vars, index, builder);
    report("linking", builder, before);

    let before = builder.constraint_count();
    forbid_unqualified(vars, builder);
    report("no qualified professor", builder, before);

    let before = builder.constraint_count();
    enforce_availability(vars, index, builder);
    report("availability", builder, before);

    let before = builder.constraint_count();
    let busy = professor_exclusion(vars, builder);
    report("professor mutual exclusion", builder, before);

    let before = builder.constraint_count();
    anti_consecutive(&busy, index, config, builder, &mut encoded);
    report("anti-consecutive teaching", builder, before);

    let before = builder.constraint_count();
    day_patterns(vars, index, config, builder, &mut encoded);
    report("day patterns", builder, before);

    let before = builder.constraint_count();
    family_consistency(vars, index, builder);
    report("slot-family consistency", builder, before);

    let before = builder.constraint_count();
    distribution_bounds(vars, index, config, builder, &mut encoded);
    report("distribution bounds", builder, before);

    let before = builder.constraint_count();
    core_overlap(vars, index, config, builder, &mut encoded);
    report("core-course overlap", builder, before);

    let before = builder.constraint_count();
    calendar_exclusions(vars, index, config, builder);
    report("calendar exclusions", builder, before);

    info!(
        "Model has {} variables and {} constraints",
        builder.variable_count(),
        builder.constraint_count()
    );
    encoded
}

fn report(rule: &str, builder: &ModelBuilder, before: usize) {
    info!("Added {} '{}' constraints", builder.constraint_count() - before, rule);
}

fn sum(vars: impl IntoIterator<Item = Variable>) -> Expression {
    vars.into_iter().sum()
}

/// Scheduled indicator equals the number of chosen slots and of chosen
/// professors; each day indicator equals the slots chosen on that day.
pub fn link_indicators(vars: &VariableSet, index: &DomainIndex, builder: &mut ModelBuilder) {
    for inst in &vars.instances {
        let scheduled = inst.scheduled;

        let slot_total = sum(inst.slots.values().copied());
        builder.add(constraint!(slot_total == scheduled));

        let professor_total = sum(inst.professors.values().copied());
        builder.add(constraint!(professor_total == scheduled));

        for (day, &day_var) in &inst.days {
            let on_day = sum(
                inst.slots
                    .iter()
                    .filter(|(s, _)| &index.slot(**s).day == day)
                    .map(|(_, v)| *v),
            );
            builder.add(constraint!(day_var == on_day));
        }
    }
}

/// Instances without any qualified professor stay unscheduled.
pub fn forbid_unqualified(vars: &VariableSet, builder: &mut ModelBuilder) {
    for inst in vars.instances.iter().filter(|v| v.professors.is_empty()) {
        debug!("{} has no qualified professor", inst.instance.label());
        builder.forbid(inst.scheduled);
    }
}

/// A professor and a slot they are unavailable for cannot both be chosen.
pub fn enforce_availability(vars: &VariableSet, index: &DomainIndex, builder: &mut ModelBuilder) {
    for inst in &vars.instances {
        for (professor, &p) in &inst.professors {
            for (&slot, &t) in &inst.slots {
                if !index.is_available(professor, slot) {
                    builder.add(constraint!(p + t <= 1));
                }
            }
        }
    }
}

/// Per (professor, slot), the conjunction indicators of every instance that
/// could put that professor in that slot.
pub type BusyMap = BTreeMap<(ProfessorId, SlotIdx), Vec<Variable>>;

/// At most one instance may hold a given professor in a given slot.
///
/// Only professors that could teach two or more instances get conjunction
/// variables; a single instance cannot clash with itself.
pub fn professor_exclusion(vars: &VariableSet, builder: &mut ModelBuilder) -> BusyMap {
    let mut load: BTreeMap<&ProfessorId, usize> = BTreeMap::new();
    for inst in vars.instances.iter().filter(|v| v.is_schedulable()) {
        for professor in inst.professors.keys() {
            *load.entry(professor).or_default() += 1;
        }
    }

    let mut busy = BusyMap::new();
    for inst in vars.instances.iter().filter(|v| v.is_schedulable()) {
        let tag = format!("{}_{}", inst.instance.course_id, inst.instance.index);
        for (professor, &p) in &inst.professors {
            if load.get(professor).copied().unwrap_or(0) < 2 {
                continue;
            }
            for (&slot, &t) in &inst.slots {
                let z = builder.add_conjunction(format!("busy_{tag}_{professor}_{slot}"), p, t);
                busy.entry((professor.clone(), slot)).or_default().push(z);
            }
        }
    }

    for entries in busy.values().filter(|e| e.len() > 1) {
        let total = sum(entries.iter().copied());
        builder.add(constraint!(total <= 1));
    }
    busy
}

/// A professor may not teach two back-to-back slots on the same day.
pub fn anti_consecutive(
    busy: &BusyMap,
    index: &DomainIndex,
    config: &SchedulerConfig,
    builder: &mut ModelBuilder,
    encoded: &mut EncodedModel,
) {
    let pairs = index.adjacent_pairs(config.policy.adjacency_gap_minutes);
    if pairs.is_empty() {
        return;
    }
    let professors: BTreeSet<&ProfessorId> = busy.keys().map(|(p, _)| p).collect();
    for professor in professors {
        for &(a, b) in &pairs {
            let (Some(first), Some(second)) = (
                busy.get(&(professor.clone(), a)),
                busy.get(&(professor.clone(), b)),
            ) else {
                continue;
            };
            let both = sum(first.iter().chain(second.iter()).copied());
            match config.policy.consecutive_teaching {
                RuleMode::Hard => builder.add(constraint!(both <= 1)),
                RuleMode::Soft => {
                    let violation = builder.new_bool(format!("b2b_{professor}_{a}_{b}"));
                    builder.add(constraint!(both - violation <= 1));
                    encoded.violations.push(violation);
                }
            }
        }
    }
}

/// Looks up an instance's day indicator without caring about letter case.
fn day_var(inst: &InstanceVars, day: &str) -> Option<Variable> {
    inst.days
        .iter()
        .find(|(d, _)| d.eq_ignore_ascii_case(day))
        .map(|(_, v)| *v)
}

/// Multi-meeting courses share one scheduled status and place their
/// meetings on exactly one predefined day pattern.
pub fn day_patterns(
    vars: &VariableSet,
    index: &DomainIndex,
    config: &SchedulerConfig,
    builder: &mut ModelBuilder,
    encoded: &mut EncodedModel,
) {
    for (course_idx, instances) in vars.courses() {
        let course = index.course(course_idx);
        if course.num_classes < 2 || instances.is_empty() {
            continue;
        }
        let status = instances[0].scheduled;
        for inst in &instances[1..] {
            let other = inst.scheduled;
            builder.add(constraint!(other == status));
        }

        let patterns = config.patterns.for_meetings(course.num_classes);
        if patterns.is_empty() {
            encoded.notes.push(format!(
                "Course {} needs {} weekly meetings but no day pattern is defined for that count",
                course.id, course.num_classes
            ));
        }

        let mut selectors = Vec::with_capacity(patterns.len());
        for (k, pattern) in patterns.iter().enumerate() {
            let selector = builder.new_bool(format!("pattern_{}_{}", course.id, k));
            for (inst, day) in instances.iter().zip(pattern.iter()) {
                match day_var(inst, day) {
                    Some(chosen) => {
                        builder.add_implication(selector, chosen);
                        for (other_day, &other) in &inst.days {
                            if !other_day.eq_ignore_ascii_case(day) {
                                builder.add(constraint!(selector + other <= 1));
                            }
                        }
                    }
                    None => builder.forbid(selector),
                }
            }
            selectors.push(selector);
        }
        encoded.pattern_vars.extend(selectors.iter().copied());

        let chosen = sum(selectors.iter().copied());
        match config.policy.day_pattern {
            RuleMode::Hard => builder.add(constraint!(chosen == status)),
            RuleMode::Soft => {
                let violation = builder.new_bool(format!("pattern_miss_{}", course.id));
                builder.add(constraint!(chosen + violation == status));
                encoded.violations.push(violation);
            }
        }
    }
}

/// Meetings of a multi-meeting course all use slots of one family.
pub fn family_consistency(vars: &VariableSet, index: &DomainIndex, builder: &mut ModelBuilder) {
    for (course_idx, instances) in vars.courses() {
        let course = index.course(course_idx);
        if course.num_classes < 2 || instances.is_empty() {
            continue;
        }
        let families: BTreeSet<&str> = instances
            .iter()
            .flat_map(|inst| inst.slots.keys().map(|&s| index.slot(s).family.as_str()))
            .collect();

        let mut selectors = Vec::with_capacity(families.len());
        for family in families {
            let selector = builder.new_bool(format!("family_{}_{}", course.id, family));
            for inst in &instances {
                let in_family = sum(
                    inst.slots
                        .iter()
                        .filter(|(s, _)| index.slot(**s).family == family)
                        .map(|(_, v)| *v),
                );
                builder.add(constraint!(in_family == selector));
            }
            selectors.push(selector);
        }
        let chosen = sum(selectors);
        let status = instances[0].scheduled;
        builder.add(constraint!(chosen == status));
    }
}

/// Caps per-slot occupancy and the spread between the busiest and least
/// busy teaching day.
pub fn distribution_bounds(
    vars: &VariableSet,
    index: &DomainIndex,
    config: &SchedulerConfig,
    builder: &mut ModelBuilder,
    encoded: &mut EncodedModel,
) {
    let total = vars.instances.len() as i32;
    let policy = &config.policy;

    for inst in &vars.instances {
        for (&slot, &t) in &inst.slots {
            encoded.slot_occupancy.entry(slot).or_default().push(t);
        }
    }
    if !encoded.slot_occupancy.is_empty() {
        let cap = policy.max_meetings_per_slot as i32;
        let peak = builder.new_int("slot_peak", 0, cap);
        for occupants in encoded.slot_occupancy.values() {
            let occupancy = sum(occupants.iter().copied());
            builder.add(constraint!(occupancy.clone() <= cap));
            builder.add(constraint!(occupancy <= peak));
        }
        encoded.slot_peak = Some(peak);
    }

    // days no instance can reach would pin the minimum at zero
    let days = reachable_days(vars, index, config);
    if days.is_empty() {
        return;
    }
    let busiest = builder.new_int("day_max", 0, total);
    let quietest = builder.new_int("day_min", 0, total);
    for day in &days {
        let count = sum(vars.instances.iter().filter_map(|inst| day_var(inst, day)));
        builder.add(constraint!(count.clone() <= busiest));
        builder.add(constraint!(count >= quietest));
    }
    // the cap bends rather than unschedule; the objective prices the excess
    let spread_cap = policy.max_day_imbalance as i32;
    let excess = builder.new_int("day_spread_excess", 0, total);
    builder.add(constraint!(busiest - quietest - excess <= spread_cap));
    encoded.day_spread = Some((busiest, quietest));
    encoded.spread_excess = Some(excess);
}

/// Teaching days at least one schedulable instance can be placed on.
pub fn reachable_days(vars: &VariableSet, index: &DomainIndex, config: &SchedulerConfig) -> Vec<Day> {
    index
        .teaching_days(&config.candidates.non_teaching_days)
        .into_iter()
        .filter(|day| vars.instances.iter().any(|inst| can_reach(inst, day, index, config)))
        .collect()
}

/// Whether `inst` may land on `day` once hard day patterns are applied.
/// Meeting k of a patterned course can only use the k-th day of a pattern.
fn can_reach(inst: &InstanceVars, day: &str, index: &DomainIndex, config: &SchedulerConfig) -> bool {
    if !inst.is_schedulable() || day_var(inst, day).is_none() {
        return false;
    }
    let course = index.course(inst.instance.course);
    if course.num_classes < 2 || config.policy.day_pattern == RuleMode::Soft {
        return true;
    }
    let position = inst.instance.index.saturating_sub(1) as usize;
    config
        .patterns
        .for_meetings(course.num_classes)
        .iter()
        .filter_map(|pattern| pattern.get(position))
        .any(|d| d.eq_ignore_ascii_case(day))
}

/// Two core-course meetings may not share a slot.
pub fn core_overlap(
    vars: &VariableSet,
    index: &DomainIndex,
    config: &SchedulerConfig,
    builder: &mut ModelBuilder,
    encoded: &mut EncodedModel,
) {
    let mut core_by_slot: BTreeMap<SlotIdx, Vec<Variable>> = BTreeMap::new();
    for inst in vars.instances.iter().filter(|v| index.course(v.instance.course).is_core) {
        for (&slot, &t) in &inst.slots {
            core_by_slot.entry(slot).or_default().push(t);
        }
    }
    for (slot, occupants) in core_by_slot.into_iter().filter(|(_, o)| o.len() > 1) {
        let count = occupants.len() as i32;
        let together = sum(occupants);
        match config.policy.core_overlap {
            RuleMode::Hard => builder.add(constraint!(together <= 1)),
            RuleMode::Soft => {
                let excess = builder.new_int(format!("core_overlap_{slot}"), 0, count - 1);
                builder.add(constraint!(together - excess <= 1));
                encoded.violations.push(excess);
            }
        }
    }
}

/// Whether a calendar exclusion bars `course` from `slot`.
pub fn is_excluded(index: &DomainIndex, config: &SchedulerConfig, course: &Course, slot: SlotIdx) -> bool {
    let slot = index.slot(slot);
    config.policy.calendar_exclusions.iter().any(|rule| {
        rule.day.eq_ignore_ascii_case(&slot.day)
            && rule.applies_to.includes(course.is_core)
            && match rule.after.as_deref().and_then(parse_clock) {
                Some(cutoff) => slot.start >= cutoff,
                None => true,
            }
    })
}

/// Zeroes slot indicators barred by calendar exclusions.
pub fn calendar_exclusions(
    vars: &VariableSet,
    index: &DomainIndex,
    config: &SchedulerConfig,
    builder: &mut ModelBuilder,
) {
    if config.policy.calendar_exclusions.is_empty() {
        return;
    }
    for inst in &vars.instances {
        let course = index.course(inst.instance.course);
        for (&slot, &t) in &inst.slots {
            if is_excluded(index, config, course, slot) {
                builder.forbid(t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalendarExclusion;
    use crate::config::CourseClass;
    use crate::test_utils::{course, professor, request, slot};

    fn build(config: &SchedulerConfig) -> (DomainIndex, VariableSet, ModelBuilder, EncodedModel) {
        let req = request(
            vec![course("C1", 55, true, 2, Some("CS")), course("C2", 55, true, 1, Some("CS"))],
            vec![professor("P1", Some("CS"))],
            vec![
                slot("TS1-MON", "Monday", "09:10", "10:05", 55),
                slot("TS2-MON", "Monday", "10:05", "11:00", 55),
                slot("TS1-WED", "Wednesday", "09:10", "10:05", 55),
                slot("TS1-THU", "Thursday", "17:30", "18:25", 55),
            ],
        );
        let index = DomainIndex::build(&req).unwrap();
        let mut builder = ModelBuilder::new();
        let vars = VariableSet::build(&index, &config.candidates, &mut builder);
        let encoded = encode(&index, &vars, config, &mut builder);
        (index, vars, builder, encoded)
    }

    #[test]
    fn builds_busy_conjunctions_for_shared_professor() {
        let (_, _, _, encoded) = build(&SchedulerConfig::default());
        // C1 has two patterns, one of which (Tue/Thu) is impossible
        assert_eq!(encoded.pattern_vars.len(), 2);
        assert!(encoded.day_spread.is_some());
        assert_eq!(encoded.slot_occupancy.len(), 4);
        assert!(encoded.violations.is_empty());
    }

    #[test]
    fn soft_modes_add_violation_counters() {
        let mut config = SchedulerConfig::default();
        config.policy.consecutive_teaching = RuleMode::Soft;
        config.policy.day_pattern = RuleMode::Soft;
        config.policy.core_overlap = RuleMode::Soft;
        let (_, _, _, encoded) = build(&config);

        // one adjacent pair for P1, one pattern miss for C1, core overlap in 4 slots
        assert_eq!(encoded.violations.len(), 1 + 1 + 4);
    }

    #[test]
    fn exclusion_matches_class_day_and_cutoff() {
        let mut config = SchedulerConfig::default();
        config.policy.calendar_exclusions.push(CalendarExclusion {
            day: "Thursday".into(),
            applies_to: CourseClass::Core,
            after: Some("17:00".into()),
        });
        let (index, _, _, _) = build(&config);
        let core = index.course_by_id("C1").unwrap().clone();
        let mut elective = core.clone();
        elective.is_core = false;
        let thursday = index.slot_idx("TS1-THU").unwrap();
        let monday = index.slot_idx("TS1-MON").unwrap();

        assert!(is_excluded(&index, &config, &core, thursday));
        assert!(!is_excluded(&index, &config, &elective, thursday));
        assert!(!is_excluded(&index, &config, &core, monday));
    }

    #[test]
    fn day_cap_ignores_days_patterns_never_use() {
        let req = request(
            vec![course("C3", 55, false, 3, Some("CS"))],
            vec![professor("P1", Some("CS"))],
            vec![
                slot("TS1-MON", "Monday", "09:10", "10:05", 55),
                slot("TS1-TUE", "Tuesday", "09:10", "10:05", 55),
                slot("TS1-WED", "Wednesday", "09:10", "10:05", 55),
                slot("TS1-THU", "Thursday", "09:10", "10:05", 55),
            ],
        );
        let index = DomainIndex::build(&req).unwrap();
        let mut config = SchedulerConfig::default();
        let mut builder = ModelBuilder::new();
        let vars = VariableSet::build(&index, &config.candidates, &mut builder);

        assert_eq!(reachable_days(&vars, &index, &config), vec!["Monday", "Tuesday", "Thursday"]);

        config.policy.day_pattern = RuleMode::Soft;
        assert_eq!(reachable_days(&vars, &index, &config).len(), 4);
    }

    #[test]
    fn day_spread_gets_an_excess_variable() {
        let (_, _, _, encoded) = build(&SchedulerConfig::default());
        assert!(encoded.day_spread.is_some());
        assert!(encoded.spread_excess.is_some());
    }

    #[test]
    fn missing_pattern_is_noted() {
        let mut config = SchedulerConfig::default();
        config.patterns.0.retain(|set| set.meetings != 2);
        let (_, _, _, encoded) = build(&config);
        assert!(encoded.pattern_vars.is_empty());
        assert_eq!(encoded.notes.len(), 1);
    }
}
