//! Solves the constraint set of one path with z3 and renders a concrete value
//! for every parameter the path reads.

mod translate;

pub use translate::Encoder;

use expressions::{real_to_string, Sort};
use ir::PathState;
use log::{debug, warn};
use std::fmt;
use thiserror::Error;
use z3::ast::{Ast, Bool, Dynamic};
use z3::{Config, Context, Model, SatResult, Solver};

/****************************
*
*   Configuration and results
*
****************************/

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    /// Per-path solver time limit; `None` lets the solver run unbounded.
    pub timeout_ms: Option<u64>,
    /// Upper bound on distinct solutions reported per path.
    pub max_solutions: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            max_solutions: 1,
        }
    }
}

/// Why a single constraint could not be handed to the solver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("operands of `{0}` have incompatible sorts")]
    SortMismatch(String),
    #[error("unsupported operand `{0}`")]
    Unsupported(String),
    #[error("undeclared variable `{0}`")]
    UnknownVariable(String),
    #[error("literal {0} cannot be represented")]
    LiteralRange(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    /// A value as printed by the solver, e.g. an integer beyond i64.
    Raw(String),
    Bool(bool),
    /// Decimal rendering of a rational.
    Real(String),
    /// The solver's quoted string literal.
    Str(String),
    Null,
    /// No constraint restricts the parameter.
    Unconstrained,
    /// A non-null object value, described by the constraints on it.
    Object(Vec<String>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Raw(s) | Value::Real(s) | Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "[null]"),
            Value::Unconstrained => write!(f, "[no lim]"),
            Value::Object(constraints) => write!(f, "[{}]", constraints.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Variable identifier.
    pub id: String,
    /// Extra key shown to the user.
    pub name: String,
    pub sort: Sort,
    pub value: Value,
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) : {}", self.name, self.sort.label(), self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Solution {
    pub assignments: Vec<Assignment>,
}

impl Solution {
    pub fn get(&self, id: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.id == id)
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.assignments.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", parts.join(" | "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Solved(Vec<Solution>),
    Unsatisfiable,
    /// The solver gave up, usually on the timeout.
    Unknown(String),
}

/****************************
*
*   Solving
*
****************************/

/// Solves one path in a fresh context. Constraints that cannot be encoded
/// are dropped with a warning; the remaining ones are still solved.
pub fn solve(state: &PathState, config: &SolverConfig) -> Outcome {
    let mut cfg = Config::new();
    cfg.set_model_generation(true);
    if let Some(ms) = config.timeout_ms {
        cfg.set_timeout_msec(ms);
    }
    let ctx = Context::new(&cfg);
    let solver = Solver::new(&ctx);

    let mut encoder = match Encoder::new(&ctx, state) {
        Ok(encoder) => encoder,
        Err(e) => {
            warn!("cannot declare path variables: {}", e);
            return Outcome::Unknown(e.to_string());
        }
    };
    for axiom in &encoder.axioms {
        solver.assert(axiom);
    }
    for constraint in state.constraints() {
        match encoder.formula(constraint) {
            Ok(form) => solver.assert(&form),
            Err(e) => warn!("dropping constraint {}: {}", constraint, e),
        }
    }

    let mut solutions: Vec<Solution> = Vec::new();
    while solutions.len() < config.max_solutions.max(1) {
        match solver.check() {
            SatResult::Sat => {
                let model = match solver.get_model() {
                    Some(model) => model,
                    None => break,
                };
                let (solution, blocking) = extract(&encoder, state, &model);
                debug!("solution {}: {}", solutions.len() + 1, solution);
                solutions.push(solution);
                if blocking.is_empty() {
                    break;
                }
                let refs: Vec<&Bool> = blocking.iter().collect();
                solver.assert(&Bool::or(&ctx, &refs));
            }
            SatResult::Unsat => break,
            SatResult::Unknown => {
                if !solutions.is_empty() {
                    break;
                }
                let reason = solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "unknown".to_string());
                warn!("solver returned unknown: {}", reason);
                return Outcome::Unknown(reason);
            }
        }
    }
    if solutions.is_empty() {
        Outcome::Unsatisfiable
    } else {
        Outcome::Solved(solutions)
    }
}

/// Reads every parameter out of `model`. Also returns the disequalities
/// that exclude this assignment from later models.
fn extract<'ctx>(
    encoder: &Encoder<'ctx>,
    state: &PathState,
    model: &Model<'ctx>,
) -> (Solution, Vec<Bool<'ctx>>) {
    let mut solution = Solution::default();
    let mut blocking = Vec::new();
    for (id, parameter) in state.sorted_parameters() {
        let var = match encoder.var(id) {
            Some(var) => var,
            None => continue,
        };
        let value = match model.get_const_interp(var) {
            None => Value::Unconstrained,
            Some(interp) => {
                let (value, block) = value_of(encoder, state, model, id, &parameter.sort, var, &interp);
                blocking.extend(block);
                value
            }
        };
        solution.assignments.push(Assignment {
            id: id.to_string(),
            name: parameter.display.clone(),
            sort: parameter.sort.clone(),
            value,
        });
    }
    (solution, blocking)
}

fn value_of<'ctx>(
    encoder: &Encoder<'ctx>,
    state: &PathState,
    model: &Model<'ctx>,
    id: &str,
    sort: &Sort,
    var: &Dynamic<'ctx>,
    interp: &Dynamic<'ctx>,
) -> (Value, Option<Bool<'ctx>>) {
    let is_true = |form: &Bool<'ctx>| {
        model
            .eval(form, true)
            .and_then(|b| b.as_bool())
            .unwrap_or(false)
    };
    let differs = Some(var._eq(interp).not());
    match sort {
        Sort::Int => match interp.as_int().and_then(|n| n.as_i64()) {
            Some(n) => (Value::Int(n), differs),
            None => (Value::Raw(interp.to_string()), differs),
        },
        Sort::Bool => match interp.as_bool().and_then(|b| b.as_bool()) {
            Some(b) => (Value::Bool(b), differs),
            None => (Value::Raw(interp.to_string()), differs),
        },
        Sort::Real => match interp.as_real().and_then(|r| r.as_real()) {
            Some((num, den)) => (Value::Real(decimal(num, den)), differs),
            None => (Value::Raw(interp.to_string()), differs),
        },
        Sort::Str => match encoder.string_null().map(Dynamic::from_ast) {
            Some(null) if is_true(&var._eq(&null)) => (Value::Null, Some(var._eq(&null).not())),
            _ => (Value::Str(interp.to_string()), differs),
        },
        Sort::Ref(sort_id) => match encoder.existing_null(*sort_id) {
            Some(null) if is_true(&var._eq(null)) => (Value::Null, Some(var._eq(null).not())),
            // object identities are not worth enumerating
            _ => (Value::Object(mentioning(state, id)), None),
        },
        Sort::Array(..) => (Value::Object(mentioning(state, id)), None),
    }
}

fn mentioning(state: &PathState, id: &str) -> Vec<String> {
    state
        .constraints()
        .iter()
        .filter(|c| c.mentions(id))
        .map(|c| c.to_string())
        .collect()
}

/// Exact decimal when the denominator is a power of ten, otherwise the
/// nearest double.
pub fn decimal(num: i64, den: i64) -> String {
    let exact = real_to_string(num, den);
    if !exact.contains('/') {
        return exact;
    }
    format!("{}", num as f64 / den as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expressions::{CmpOp, Expr};

    fn int_state() -> PathState {
        let mut state = PathState::new();
        state.register_parameter("i0", "count", Sort::Int);
        state.register_parameter("i1", "copy", Sort::Int);
        state.add_constraint(CmpOp::Gt.apply(Expr::var("i0"), Expr::Int(10)));
        state.add_constraint(Expr::eq(Expr::var("i1"), Expr::var("i0")));
        state
    }

    fn single(outcome: Outcome) -> Solution {
        match outcome {
            Outcome::Solved(mut solutions) => {
                assert_eq!(solutions.len(), 1);
                solutions.remove(0)
            }
            other => panic!("expected a solution, got {:?}", other),
        }
    }

    #[test]
    fn test_two_int_parameters() {
        let solution = single(solve(&int_state(), &SolverConfig::default()));
        let i0 = match solution.get("i0").map(|a| &a.value) {
            Some(Value::Int(n)) => *n,
            other => panic!("unexpected {:?}", other),
        };
        assert!(i0 > 10);
        assert_eq!(solution.get("i1").map(|a| a.value.clone()), Some(Value::Int(i0)));
        assert_eq!(
            solution.to_string(),
            format!("count (integer) : {} | copy (integer) : {}", i0, i0)
        );
    }

    #[test]
    fn test_string_equality_and_negation() {
        let mut state = PathState::new();
        state.register_parameter("r2", "op", Sort::Str);
        state.add_constraint(Expr::eq(Expr::var("r2"), Expr::Str("+".to_string())));
        let solution = single(solve(&state, &SolverConfig::default()));
        assert_eq!(solution.to_string(), "op (string) : \"+\"");

        let mut state = PathState::new();
        state.register_parameter("r2", "op", Sort::Str);
        state.add_constraint(Expr::not(Expr::eq(Expr::var("r2"), Expr::Str("+".to_string()))));
        let solution = single(solve(&state, &SolverConfig::default()));
        match solution.get("r2").map(|a| &a.value) {
            Some(Value::Str(s)) => assert_ne!(s, "\"+\""),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reference_null() {
        let mut state = PathState::new();
        let id = state.sorts.intern("java.io.Serializable");
        state.register_parameter("r3", "payload", Sort::Ref(id));
        let null = state.null_for("r3").unwrap();
        state.add_constraint(Expr::eq(Expr::var("r3"), null));
        let solution = single(solve(&state, &SolverConfig::default()));
        assert_eq!(solution.to_string(), "payload (serializable) : [null]");
    }

    #[test]
    fn test_reference_not_null_lists_constraints() {
        let mut state = PathState::new();
        let id = state.sorts.intern("java.io.Serializable");
        state.register_parameter("r3", "payload", Sort::Ref(id));
        let null = state.null_for("r3").unwrap();
        state.add_constraint(Expr::not(Expr::eq(Expr::var("r3"), null)));
        let solution = single(solve(&state, &SolverConfig::default()));
        assert_eq!(solution.get("r3").map(|a| a.value.to_string()), Some("[not(r3 == null)]".to_string()));
    }

    #[test]
    fn test_string_null() {
        let mut state = PathState::new();
        state.register_parameter("r1", "name", Sort::Str);
        state.add_constraint(Expr::eq(Expr::var("r1"), Expr::StrNull));
        let solution = single(solve(&state, &SolverConfig::default()));
        assert_eq!(solution.get("r1").map(|a| a.value.clone()), Some(Value::Null));
    }

    #[test]
    fn test_contradiction_is_unsatisfiable() {
        let mut state = PathState::new();
        state.register_parameter("i0", "n", Sort::Int);
        state.add_constraint(CmpOp::Gt.apply(Expr::var("i0"), Expr::Int(5)));
        state.add_constraint(CmpOp::Lt.apply(Expr::var("i0"), Expr::Int(3)));
        assert_eq!(solve(&state, &SolverConfig::default()), Outcome::Unsatisfiable);
    }

    #[test]
    fn test_unconstrained_parameter() {
        let mut state = int_state();
        state.register_parameter("z0", "flag", Sort::Bool);
        let solution = single(solve(&state, &SolverConfig::default()));
        assert_eq!(solution.get("z0").map(|a| a.to_string()), Some("flag (boolean) : [no lim]".to_string()));
    }

    #[test]
    fn test_string_length() {
        let mut state = PathState::new();
        state.register_parameter("r2", "code", Sort::Str);
        state.add_constraint(CmpOp::Ge.apply(Expr::length(Expr::var("r2")), Expr::Int(8)));
        let solution = single(solve(&state, &SolverConfig::default()));
        match solution.get("r2").map(|a| &a.value) {
            Some(Value::Str(s)) => assert!(s.len() >= 10),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mixed_int_and_real() {
        let mut state = PathState::new();
        state.register_parameter("f0", "ratio", Sort::Real);
        state.add_constraint(CmpOp::Gt.apply(Expr::var("f0"), Expr::Int(1)));
        state.add_constraint(CmpOp::Lt.apply(Expr::var("f0"), Expr::Real(15, 10)));
        let solution = single(solve(&state, &SolverConfig::default()));
        match solution.get("f0").map(|a| &a.value) {
            Some(Value::Real(s)) => {
                let v: f64 = s.parse().unwrap();
                assert!(v > 1.0 && v < 1.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sort_mismatch_is_dropped() {
        let mut state = int_state();
        state.add_constraint(Expr::eq(Expr::var("i0"), Expr::Str("x".to_string())));
        let solution = single(solve(&state, &SolverConfig::default()));
        assert!(matches!(solution.get("i0").map(|a| &a.value), Some(Value::Int(n)) if *n > 10));
    }

    #[test]
    fn test_enumerates_distinct_solutions() {
        let mut state = PathState::new();
        state.register_parameter("i0", "n", Sort::Int);
        state.add_constraint(CmpOp::Gt.apply(Expr::var("i0"), Expr::Int(0)));
        state.add_constraint(CmpOp::Lt.apply(Expr::var("i0"), Expr::Int(4)));
        let config = SolverConfig { max_solutions: 5, ..SolverConfig::default() };
        let mut values: Vec<i64> = match solve(&state, &config) {
            Outcome::Solved(solutions) => solutions
                .iter()
                .filter_map(|s| match s.get("i0").map(|a| &a.value) {
                    Some(Value::Int(n)) => Some(*n),
                    _ => None,
                })
                .collect(),
            other => panic!("unexpected {:?}", other),
        };
        values.sort();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_paths_are_isolated() {
        let first = int_state();
        let mut second = PathState::new();
        second.register_parameter("i0", "count", Sort::Int);
        second.add_constraint(CmpOp::Lt.apply(Expr::var("i0"), Expr::Int(0)));
        assert!(matches!(solve(&first, &SolverConfig::default()), Outcome::Solved(_)));
        let solution = single(solve(&second, &SolverConfig::default()));
        assert!(matches!(solution.get("i0").map(|a| &a.value), Some(Value::Int(n)) if *n < 0));
    }

    #[test]
    fn test_decimal() {
        assert_eq!(decimal(3, 2), "1.5");
        assert_eq!(decimal(1, 4), "0.25");
        assert_eq!(decimal(7, 1), "7.0");
    }
}
