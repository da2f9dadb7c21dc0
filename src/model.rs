//! Model builder shared by the variable factory, constraint encoder and
//! objective composer.
//!
//! The builder owns the problem variables and the constraint list for one
//! request. Logical operators are expressed as linear rows over binaries so
//! the finished model can go straight to a MILP engine.

use std::collections::HashMap;

use good_lp::{Constraint, Expression, ProblemVariables, Variable, constraint, variable};

/// Values at or above this count as true for a binary indicator.
pub const TRUE_THRESHOLD: f64 = 0.9;
/// Values at or below this count as false.
pub const FALSE_THRESHOLD: f64 = 0.1;

pub struct ModelBuilder {
    vars: ProblemVariables,
    registry: Vec<Variable>,
    binaries: Vec<Variable>,
    constraints: Vec<Constraint>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            vars: ProblemVariables::new(),
            registry: Vec::new(),
            binaries: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn new_bool(&mut self, name: impl Into<String>) -> Variable {
        let var = self.vars.add(variable().binary().name(name));
        self.registry.push(var);
        self.binaries.push(var);
        var
    }

    pub fn new_int(&mut self, name: impl Into<String>, lo: i32, hi: i32) -> Variable {
        let var = self.vars.add(variable().integer().min(lo).max(hi).name(name));
        self.registry.push(var);
        var
    }

    pub fn add(&mut self, row: Constraint) {
        self.constraints.push(row);
    }

    /// Pins a variable to zero.
    pub fn forbid(&mut self, var: Variable) {
        self.add(constraint!(var == 0));
    }

    /// `a` implies `b` for binaries.
    pub fn add_implication(&mut self, a: Variable, b: Variable) {
        self.add(constraint!(a <= b));
    }

    /// Returns a fresh binary equal to `a AND b`.
    pub fn add_conjunction(&mut self, name: impl Into<String>, a: Variable, b: Variable) -> Variable {
        let z = self.new_bool(name);
        self.add(constraint!(z <= a));
        self.add(constraint!(z <= b));
        self.add(constraint!(z >= a + b - 1));
        z
    }

    pub fn variable_count(&self) -> usize {
        self.registry.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn finish(self, objective: Expression) -> Model {
        Model {
            vars: self.vars,
            registry: self.registry,
            binaries: self.binaries,
            constraints: self.constraints,
            objective,
        }
    }
}

/// A fully assembled maximisation model, ready for a solving engine.
pub struct Model {
    pub vars: ProblemVariables,
    pub registry: Vec<Variable>,
    pub binaries: Vec<Variable>,
    pub constraints: Vec<Constraint>,
    pub objective: Expression,
}

impl Model {
    pub fn variable_count(&self) -> usize {
        self.registry.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }
}

/// Concrete values the engine assigned to the model's variables.
#[derive(Debug, Clone, Default)]
pub struct Valuation {
    values: HashMap<Variable, f64>,
}

impl Valuation {
    pub fn new(values: HashMap<Variable, f64>) -> Self {
        Self { values }
    }

    /// Unknown variables read as zero.
    pub fn value(&self, var: Variable) -> f64 {
        self.values.get(&var).copied().unwrap_or(0.0)
    }

    pub fn is_true(&self, var: Variable) -> bool {
        self.value(var) >= TRUE_THRESHOLD
    }

    pub fn set(&mut self, var: Variable, value: f64) {
        self.values.insert(var, value);
    }

    /// Whether every listed binary sits at 0 or 1.
    pub fn is_integral(&self, binaries: &[Variable]) -> bool {
        binaries.iter().all(|&var| {
            let v = self.value(var);
            v <= FALSE_THRESHOLD || v >= TRUE_THRESHOLD
        })
    }
}
