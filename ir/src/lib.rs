//! Per-path analysis state: declared variables, their sorts, the reference
//! sort registry and the path's constraint set.

mod constraints;
mod sorts;

pub use constraints::{bool_literal_form, ConstraintSet};
pub use sorts::{normalize_type_name, SortRegistry};

use expressions::{Expr, Sort, Variable};
use indexmap::IndexMap;
use log::trace;

/// An intent extra or bundle entry the analysed component reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// The key the component looks the value up by.
    pub display: String,
    pub sort: Sort,
}

/// Everything known about one path. Never shared between paths.
#[derive(Debug, Default, Clone)]
pub struct PathState {
    pub sorts: SortRegistry,
    parameters: IndexMap<Variable, Parameter>,
    locals: IndexMap<Variable, Sort>,
    constraints: ConstraintSet,
}

impl PathState {
    pub fn new() -> PathState {
        PathState::default()
    }

    /// Declares `name` as a parameter. A local of the same name is promoted.
    pub fn register_parameter(&mut self, name: &str, display: &str, sort: Sort) {
        self.locals.shift_remove(name);
        trace!("parameter {} ({}) : {}", name, display, sort);
        self.parameters.insert(
            name.to_string(),
            Parameter {
                display: display.to_string(),
                sort,
            },
        );
    }

    /// Declares `name` as a local. Does nothing if it is already declared;
    /// returns whether the declaration happened.
    pub fn register_local(&mut self, name: &str, sort: Sort) -> bool {
        if self.is_declared(name) {
            return false;
        }
        trace!("local {} : {}", name, sort);
        self.locals.insert(name.to_string(), sort);
        true
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.parameters.contains_key(name) || self.locals.contains_key(name)
    }

    pub fn is_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn sort_of(&self, name: &str) -> Option<&Sort> {
        match self.parameters.get(name) {
            Some(parameter) => Some(&parameter.sort),
            None => self.locals.get(name),
        }
    }

    /// Parameters in declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.parameters.iter().map(|(name, p)| (name.as_str(), p))
    }

    /// Parameters ordered by identifier.
    pub fn sorted_parameters(&self) -> Vec<(&str, &Parameter)> {
        let mut all: Vec<(&str, &Parameter)> = self.parameters().collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }

    /// Every declared variable with its sort, parameters first.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &Sort)> {
        self.parameters
            .iter()
            .map(|(name, p)| (name.as_str(), &p.sort))
            .chain(self.locals.iter().map(|(name, sort)| (name.as_str(), sort)))
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn add_constraint(&mut self, constraint: Expr) -> bool {
        self.constraints.insert(constraint)
    }

    /// Rewrites every `name == 0/1` style constraint on a boolean variable to
    /// use boolean literals.
    pub fn canonicalize_booleans(&mut self, name: &str) {
        if self.sort_of(name) != Some(&Sort::Bool) {
            return;
        }
        self.constraints.rewrite(|c| bool_literal_form(c, name));
    }

    /// The null value of `name`'s sort, if that sort has one.
    /// Arrays have no null term; callers compare their length with zero instead.
    pub fn null_for(&mut self, name: &str) -> Option<Expr> {
        match self.sort_of(name).cloned() {
            Some(Sort::Ref(id)) => Some(self.sorts.null_of(id)),
            Some(Sort::Str) => Some(Expr::StrNull),
            _ => None,
        }
    }
}
