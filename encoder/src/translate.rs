use crate::EncodeError;
use expressions::{ArithOp, CmpOp, Expr, Sort, SortId};
use ir::PathState;
use log::trace;
use std::collections::HashMap;
use z3::ast::{self, Ast, Bool, Dynamic, Int, Real};
use z3::{Context, FuncDecl, Solver, Sort as Z3Sort, SortKind, Symbol};
use z3_sys::DeclKind;

/// Translates the typed constraints of one path into z3 terms.
pub struct Encoder<'ctx> {
    ctx: &'ctx Context,
    vars: HashMap<String, Dynamic<'ctx>>,
    /// Length constants of array variables.
    lengths: HashMap<String, Int<'ctx>>,
    ref_sorts: HashMap<SortId, Z3Sort<'ctx>>,
    nulls: HashMap<SortId, Dynamic<'ctx>>,
    string_null: Option<ast::String<'ctx>>,
    sort_names: HashMap<SortId, String>,
    /// `str.len`, looked up on first use.
    str_len: Option<FuncDecl<'ctx>>,
    /// Side conditions of the declarations (array lengths are non-negative,
    /// the string null differs from every string literal).
    pub axioms: Vec<Bool<'ctx>>,
}

enum Numbers<'ctx> {
    Ints(Int<'ctx>, Int<'ctx>),
    Reals(Real<'ctx>, Real<'ctx>),
}

impl<'ctx> Encoder<'ctx> {
    /// Declares every variable of `state` in `ctx`.
    pub fn new(ctx: &'ctx Context, state: &PathState) -> Result<Self, EncodeError> {
        let mut encoder = Encoder {
            ctx,
            vars: HashMap::new(),
            lengths: HashMap::new(),
            ref_sorts: HashMap::new(),
            nulls: HashMap::new(),
            string_null: None,
            sort_names: state.sorts.iter().map(|(name, id)| (id, name.to_string())).collect(),
            str_len: None,
            axioms: Vec::new(),
        };
        for (name, sort) in state.variables() {
            encoder.declare(name, sort)?;
        }
        for id in state.sorts.nulls() {
            encoder.null_of(id);
        }
        if state.constraints().iter().any(|c| mentions_string_null(c)) {
            encoder.declare_string_null(state)?;
        }
        Ok(encoder)
    }

    fn declare(&mut self, name: &str, sort: &Sort) -> Result<(), EncodeError> {
        let var = match sort {
            Sort::Int => Dynamic::from_ast(&Int::new_const(self.ctx, name)),
            Sort::Real => Dynamic::from_ast(&Real::new_const(self.ctx, name)),
            Sort::Bool => Dynamic::from_ast(&Bool::new_const(self.ctx, name)),
            Sort::Str => Dynamic::from_ast(&ast::String::new_const(self.ctx, name)),
            Sort::Ref(_) | Sort::Array(..) => {
                let z3_sort = self.z3_sort(sort)?;
                FuncDecl::new(self.ctx, name, &[], &z3_sort).apply(&[])
            }
        };
        if let Sort::Array(..) = sort {
            let length = Int::new_const(self.ctx, format!("{}!length", name));
            self.axioms.push(length.ge(&Int::from_i64(self.ctx, 0)));
            self.lengths.insert(name.to_string(), length);
        }
        trace!("declared {} : {}", name, var.get_sort());
        self.vars.insert(name.to_string(), var);
        Ok(())
    }

    fn z3_sort(&mut self, sort: &Sort) -> Result<Z3Sort<'ctx>, EncodeError> {
        Ok(match sort {
            Sort::Int => Z3Sort::int(self.ctx),
            Sort::Real => Z3Sort::real(self.ctx),
            Sort::Bool => Z3Sort::bool(self.ctx),
            Sort::Str => Z3Sort::string(self.ctx),
            Sort::Ref(id) => self.ref_sort(*id),
            Sort::Array(elem, _) => {
                let range = self.z3_sort(elem)?;
                Z3Sort::array(self.ctx, &Z3Sort::int(self.ctx), &range)
            }
        })
    }

    fn ref_sort(&mut self, id: SortId) -> Z3Sort<'ctx> {
        if let Some(sort) = self.ref_sorts.get(&id) {
            return sort.clone();
        }
        let name = self
            .sort_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("ref{}", id.index()));
        let sort = Z3Sort::uninterpreted(self.ctx, Symbol::String(name));
        self.ref_sorts.insert(id, sort.clone());
        sort
    }

    /// The null constant of a reference sort; one per sort.
    pub fn null_of(&mut self, id: SortId) -> Dynamic<'ctx> {
        if let Some(null) = self.nulls.get(&id) {
            return null.clone();
        }
        let sort = self.ref_sort(id);
        let null = FuncDecl::new(self.ctx, format!("null!{}", id.index()), &[], &sort).apply(&[]);
        self.nulls.insert(id, null.clone());
        null
    }

    /// The null constant of a reference sort, if one was ever requested.
    pub fn existing_null(&self, id: SortId) -> Option<&Dynamic<'ctx>> {
        self.nulls.get(&id)
    }

    pub fn string_null(&self) -> Option<&ast::String<'ctx>> {
        self.string_null.as_ref()
    }

    fn declare_string_null(&mut self, state: &PathState) -> Result<(), EncodeError> {
        let null = ast::String::new_const(self.ctx, "null!string");
        let mut literals: Vec<&str> = Vec::new();
        for constraint in state.constraints() {
            collect_strings(constraint, &mut literals);
        }
        for literal in literals {
            let literal = string_literal(self.ctx, literal)?;
            self.axioms.push(null._eq(&literal).not());
        }
        self.string_null = Some(null);
        Ok(())
    }

    pub fn var(&self, name: &str) -> Option<&Dynamic<'ctx>> {
        self.vars.get(name)
    }

    /// A constraint as a z3 boolean.
    pub fn formula(&mut self, expr: &Expr) -> Result<Bool<'ctx>, EncodeError> {
        if let Some((op, lhs, rhs)) = expr.as_comparison() {
            let l = self.term(lhs)?;
            let r = self.term(rhs)?;
            return compare(op, &l, &r).ok_or_else(|| EncodeError::SortMismatch(expr.to_string()));
        }
        match expr {
            Expr::Not(inner) => Ok(self.formula(inner)?.not()),
            Expr::Bool(b) => Ok(Bool::from_bool(self.ctx, *b)),
            other => self
                .term(other)?
                .as_bool()
                .ok_or_else(|| EncodeError::SortMismatch(other.to_string())),
        }
    }

    pub fn term(&mut self, expr: &Expr) -> Result<Dynamic<'ctx>, EncodeError> {
        match expr {
            Expr::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| EncodeError::UnknownVariable(name.clone())),
            Expr::Int(n) => Ok(Dynamic::from_ast(&Int::from_i64(self.ctx, *n))),
            Expr::Real(num, den) => Real::from_real_str(self.ctx, &num.to_string(), &den.to_string())
                .map(|r| Dynamic::from_ast(&r))
                .ok_or_else(|| EncodeError::LiteralRange(expr.to_string())),
            Expr::Str(s) => Ok(Dynamic::from_ast(&string_literal(self.ctx, s)?)),
            Expr::Bool(b) => Ok(Dynamic::from_ast(&Bool::from_bool(self.ctx, *b))),
            Expr::Null(id) => Ok(self.null_of(*id)),
            Expr::StrNull => self
                .string_null
                .as_ref()
                .map(Dynamic::from_ast)
                .ok_or_else(|| EncodeError::Unsupported(expr.to_string())),
            Expr::Eq(..) | Expr::Ne(..) | Expr::Lt(..) | Expr::Le(..) | Expr::Gt(..) | Expr::Ge(..) | Expr::Not(_) => {
                Ok(Dynamic::from_ast(&self.formula(expr)?))
            }
            Expr::Length(inner) => self.length(inner),
            Expr::Arith(op, lhs, rhs) => {
                let l = self.term(lhs)?;
                let r = self.term(rhs)?;
                arith(self.ctx, *op, &l, &r).ok_or_else(|| EncodeError::SortMismatch(expr.to_string()))
            }
            Expr::Select(array, index) => {
                let array = self
                    .term(array)?
                    .as_array()
                    .ok_or_else(|| EncodeError::SortMismatch(expr.to_string()))?;
                let index = self
                    .term(index)?
                    .as_int()
                    .ok_or_else(|| EncodeError::SortMismatch(expr.to_string()))?;
                Ok(array.select(&index))
            }
        }
    }

    fn length(&mut self, inner: &Expr) -> Result<Dynamic<'ctx>, EncodeError> {
        if let Expr::Var(name) = inner {
            if let Some(length) = self.lengths.get(name) {
                return Ok(Dynamic::from_ast(length));
            }
        }
        let string = self
            .term(inner)?
            .as_string()
            .ok_or_else(|| EncodeError::Unsupported(format!("length({})", inner)))?;
        if self.str_len.is_none() {
            self.str_len = string_length_decl(self.ctx);
        }
        self.str_len
            .as_ref()
            .map(|decl| decl.apply(&[&string]))
            .ok_or_else(|| EncodeError::Unsupported(format!("length({})", inner)))
    }
}

/// The `str.len` declaration of `ctx`, taken from a parsed SMT-LIB assertion.
fn string_length_decl(ctx: &Context) -> Option<FuncDecl<'_>> {
    let scratch = Solver::new(ctx);
    scratch.from_string("(declare-const s String) (assert (>= (str.len s) 0))");
    scratch
        .get_assertions()
        .iter()
        .find_map(|assertion| find_decl(&Dynamic::from_ast(assertion), DeclKind::SEQ_LENGTH))
}

fn find_decl<'ctx>(node: &Dynamic<'ctx>, kind: DeclKind) -> Option<FuncDecl<'ctx>> {
    let decl = node.safe_decl().ok()?;
    if decl.kind() == kind {
        return Some(decl);
    }
    node.children().iter().find_map(|child| find_decl(child, kind))
}

fn string_literal<'ctx>(ctx: &'ctx Context, s: &str) -> Result<ast::String<'ctx>, EncodeError> {
    ast::String::from_str(ctx, s).map_err(|_| EncodeError::LiteralRange(format!("{:?}", s)))
}

fn numbers<'ctx>(l: &Dynamic<'ctx>, r: &Dynamic<'ctx>) -> Option<Numbers<'ctx>> {
    if let (Some(a), Some(b)) = (l.as_int(), r.as_int()) {
        return Some(Numbers::Ints(a, b));
    }
    let real = |d: &Dynamic<'ctx>| d.as_real().or_else(|| d.as_int().map(|i| i.to_real()));
    Some(Numbers::Reals(real(l)?, real(r)?))
}

fn is_numeric(d: &Dynamic) -> bool {
    matches!(d.sort_kind(), SortKind::Int | SortKind::Real)
}

fn compare<'ctx>(op: CmpOp, l: &Dynamic<'ctx>, r: &Dynamic<'ctx>) -> Option<Bool<'ctx>> {
    if is_numeric(l) && is_numeric(r) {
        return Some(match (op, numbers(l, r)?) {
            (CmpOp::Eq, Numbers::Ints(a, b)) => a._eq(&b),
            (CmpOp::Ne, Numbers::Ints(a, b)) => a._eq(&b).not(),
            (CmpOp::Lt, Numbers::Ints(a, b)) => a.lt(&b),
            (CmpOp::Le, Numbers::Ints(a, b)) => a.le(&b),
            (CmpOp::Gt, Numbers::Ints(a, b)) => a.gt(&b),
            (CmpOp::Ge, Numbers::Ints(a, b)) => a.ge(&b),
            (CmpOp::Eq, Numbers::Reals(a, b)) => a._eq(&b),
            (CmpOp::Ne, Numbers::Reals(a, b)) => a._eq(&b).not(),
            (CmpOp::Lt, Numbers::Reals(a, b)) => a.lt(&b),
            (CmpOp::Le, Numbers::Reals(a, b)) => a.le(&b),
            (CmpOp::Gt, Numbers::Reals(a, b)) => a.gt(&b),
            (CmpOp::Ge, Numbers::Reals(a, b)) => a.ge(&b),
        });
    }
    if l.get_sort() != r.get_sort() {
        return None;
    }
    match op {
        CmpOp::Eq => Some(l._eq(r)),
        CmpOp::Ne => Some(l._eq(r).not()),
        // orderings exist only on numbers
        _ => None,
    }
}

fn arith<'ctx>(ctx: &'ctx Context, op: ArithOp, l: &Dynamic<'ctx>, r: &Dynamic<'ctx>) -> Option<Dynamic<'ctx>> {
    if !is_numeric(l) || !is_numeric(r) {
        return None;
    }
    Some(match numbers(l, r)? {
        Numbers::Ints(a, b) => Dynamic::from_ast(&match op {
            ArithOp::Add => Int::add(ctx, &[&a, &b]),
            ArithOp::Sub => Int::sub(ctx, &[&a, &b]),
            ArithOp::Mul => Int::mul(ctx, &[&a, &b]),
            ArithOp::Div => a.div(&b),
            ArithOp::Rem => a.rem(&b),
        }),
        Numbers::Reals(a, b) => Dynamic::from_ast(&match op {
            ArithOp::Add => Real::add(ctx, &[&a, &b]),
            ArithOp::Sub => Real::sub(ctx, &[&a, &b]),
            ArithOp::Mul => Real::mul(ctx, &[&a, &b]),
            ArithOp::Div => a.div(&b),
            ArithOp::Rem => return None,
        }),
    })
}

fn mentions_string_null(expr: &Expr) -> bool {
    matches!(expr, Expr::StrNull) || expr.children().into_iter().any(mentions_string_null)
}

fn collect_strings<'e>(expr: &'e Expr, out: &mut Vec<&'e str>) {
    if let Expr::Str(s) = expr {
        if !out.contains(&s.as_str()) {
            out.push(s);
        }
    }
    for child in expr.children() {
        collect_strings(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z3::{Config, SatResult};

    fn check(state: &PathState, constraint: &Expr) -> SatResult {
        let ctx = Context::new(&Config::new());
        let mut encoder = Encoder::new(&ctx, state).unwrap();
        let formula = encoder.formula(constraint).unwrap();
        let solver = Solver::new(&ctx);
        for axiom in &encoder.axioms {
            solver.assert(axiom);
        }
        solver.assert(&formula);
        solver.check()
    }

    #[test]
    fn test_length_of_string_variable() {
        let mut state = PathState::new();
        state.register_parameter("r2", "code", Sort::Str);
        let ctx = Context::new(&Config::new());
        let mut encoder = Encoder::new(&ctx, &state).unwrap();
        let length = encoder.term(&Expr::length(Expr::var("r2"))).unwrap();
        let solver = Solver::new(&ctx);
        solver.assert(&encoder.formula(&Expr::eq(Expr::length(Expr::var("r2")), Expr::Int(3))).unwrap());
        assert_eq!(solver.check(), SatResult::Sat);
        let model = solver.get_model().unwrap();
        let value = model.eval(&length, true).and_then(|v| v.as_int()).and_then(|v| v.as_i64());
        assert_eq!(value, Some(3));
    }

    #[test]
    fn test_length_of_string_literal() {
        let state = PathState::new();
        let length = || Expr::length(Expr::Str("abc".to_string()));
        assert_eq!(check(&state, &Expr::eq(length(), Expr::Int(3))), SatResult::Sat);
        assert_eq!(check(&state, &Expr::eq(length(), Expr::Int(4))), SatResult::Unsat);
    }

    #[test]
    fn test_length_of_array_is_non_negative() {
        let mut state = PathState::new();
        let sort = Sort::Array(Box::new(Sort::Int), 1);
        state.register_local("r1", sort);
        let constraint = CmpOp::Lt.apply(Expr::length(Expr::var("r1")), Expr::Int(0));
        assert_eq!(check(&state, &constraint), SatResult::Unsat);
    }

    #[test]
    fn test_ordering_on_strings_is_a_sort_mismatch() {
        let mut state = PathState::new();
        state.register_parameter("r2", "code", Sort::Str);
        let ctx = Context::new(&Config::new());
        let mut encoder = Encoder::new(&ctx, &state).unwrap();
        let constraint = CmpOp::Lt.apply(Expr::var("r2"), Expr::Str("a".to_string()));
        assert!(matches!(encoder.formula(&constraint), Err(EncodeError::SortMismatch(_))));
    }
}
