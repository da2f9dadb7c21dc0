//! The single maximised objective.
//!
//! Placement dominates: every scheduled meeting earns its priority weight,
//! and the distribution terms are kept at least an order of magnitude
//! smaller (checked by `SchedulerConfig::validate`).

use std::collections::BTreeMap;

use good_lp::{Expression, Variable, constraint};
use log::info;

use crate::config::SchedulerConfig;
use crate::constraints::EncodedModel;
use crate::index::{DomainIndex, SlotIdx};
use crate::model::ModelBuilder;
use crate::variables::VariableSet;

pub fn compose(
    index: &DomainIndex,
    vars: &VariableSet,
    encoded: &EncodedModel,
    config: &SchedulerConfig,
    builder: &mut ModelBuilder,
) -> Expression {
    let w = &config.weights;

    let (core, elective): (Vec<Variable>, Vec<Variable>) = {
        let (core, elective): (Vec<_>, Vec<_>) = vars
            .instances
            .iter()
            .partition(|inst| index.course(inst.instance.course).is_core);
        (
            core.iter().map(|inst| inst.scheduled).collect(),
            elective.iter().map(|inst| inst.scheduled).collect(),
        )
    };
    let core_placed: Expression = core.into_iter().sum();
    let elective_placed: Expression = elective.into_iter().sum();
    let mut objective = w.core * core_placed + w.elective * elective_placed;

    if let Some((busiest, quietest)) = encoded.day_spread {
        let spread = Expression::from(busiest) - quietest;
        objective = objective - w.day_imbalance * spread;
    }
    if let Some(excess) = encoded.spread_excess {
        objective = objective - w.spread_excess * Expression::from(excess);
    }

    if let Some(peak) = encoded.slot_peak {
        objective = objective - w.slot_occupancy * Expression::from(peak);
    }

    if let Some(threshold) = w.slot_threshold {
        let graduated = graduated_slot_penalty(&encoded.slot_occupancy, threshold, config, builder);
        objective = objective - w.slot_occupancy * graduated;
    }

    let family = family_imbalance(index, vars, config, builder);
    objective = objective - w.family_imbalance * family;

    let patterns: Expression = encoded.pattern_vars.iter().copied().sum();
    objective = objective + w.pattern_reward * patterns;

    let violations: Expression = encoded.violations.iter().copied().sum();
    objective = objective - w.violation * violations;

    info!(
        "Objective defined: placement ({} core / {} elective), balance and {} pattern selectors, {} violation terms",
        w.core,
        w.elective,
        encoded.pattern_vars.len(),
        encoded.violations.len()
    );
    objective
}

/// Unit-excess indicators above `threshold` for each slot; the k-th extra
/// meeting costs k, so the total grows quadratically.
fn graduated_slot_penalty(
    occupancy: &BTreeMap<SlotIdx, Vec<Variable>>,
    threshold: u32,
    config: &SchedulerConfig,
    builder: &mut ModelBuilder,
) -> Expression {
    let cap = config.policy.max_meetings_per_slot as usize;
    let threshold_len = threshold as usize;
    let mut penalty = Expression::from(0.0);

    for (slot, occupants) in occupancy {
        let reachable = occupants.len().min(cap);
        if reachable <= threshold_len {
            continue;
        }
        let mut units = Vec::with_capacity(reachable - threshold_len);
        for k in 1..=(reachable - threshold_len) {
            let unit = builder.new_bool(format!("slot_excess_{slot}_{k}"));
            penalty = penalty + (k as f64) * Expression::from(unit);
            units.push(unit);
        }
        let filled: Expression = occupants.iter().copied().sum();
        let excess: Expression = units.into_iter().sum();
        let allowance = threshold as i32;
        builder.add(constraint!(filled - excess <= allowance));
    }
    penalty
}

/// Spread of each slot family's usage across the days it exists on,
/// weighted up for the most contended families.
fn family_imbalance(
    index: &DomainIndex,
    vars: &VariableSet,
    config: &SchedulerConfig,
    builder: &mut ModelBuilder,
) -> Expression {
    let teaching = index.teaching_days(&config.candidates.non_teaching_days);
    let total = vars.instances.len() as i32;

    // per family: day -> slot indicators of every instance
    let mut usage: BTreeMap<&str, BTreeMap<&str, Vec<Variable>>> = BTreeMap::new();
    for (family, slots) in index.families() {
        let per_day = usage.entry(family.as_str()).or_default();
        for &s in slots {
            let day = index.slot(s).day.as_str();
            if teaching.iter().any(|d| d == day) {
                per_day.entry(day).or_default();
            }
        }
    }
    for inst in &vars.instances {
        for (&s, &t) in &inst.slots {
            let slot = index.slot(s);
            if let Some(per_day) = usage.get_mut(slot.family.as_str()) {
                if let Some(list) = per_day.get_mut(slot.day.as_str()) {
                    list.push(t);
                }
            }
        }
    }

    let contention = |per_day: &BTreeMap<&str, Vec<Variable>>| -> usize {
        per_day.values().map(Vec::len).sum()
    };
    let most_contended = usage.values().map(contention).max().unwrap_or(0);

    let mut penalty = Expression::from(0.0);
    for (family, per_day) in &usage {
        let demand = contention(per_day);
        if per_day.len() < 2 || demand == 0 {
            continue;
        }
        let busiest = builder.new_int(format!("family_max_{family}"), 0, total);
        let quietest = builder.new_int(format!("family_min_{family}"), 0, total);
        for occupants in per_day.values() {
            let count: Expression = occupants.iter().copied().sum();
            builder.add(constraint!(count.clone() <= busiest));
            builder.add(constraint!(count >= quietest));
        }
        let weight = 1.0 + demand as f64 / most_contended as f64;
        penalty = penalty + weight * (Expression::from(busiest) - quietest);
    }
    penalty
}
