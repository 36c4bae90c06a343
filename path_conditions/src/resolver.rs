use classifier::{classify, Operand, Statement, Target};
use expressions::{ArithOp, CmpOp, Expr, Literal, Sort};
use ir::PathState;
use log::{debug, trace};
use parser::PathGraph;
use petgraph::graph::NodeIndex;
use std::collections::HashSet;

/// Calls whose result equals their receiver (or single argument when there is
/// no receiver) whenever both have the same sort.
const VALUE_PRESERVING: &[&str] = &[
    "toString",
    "trim",
    "intern",
    "valueOf",
    "intValue",
    "longValue",
    "shortValue",
    "byteValue",
    "booleanValue",
    "floatValue",
    "doubleValue",
    "clone",
];

/// Calls that compare their receiver with their single argument.
const EQUALITY_CALLS: &[&str] = &["equals", "contentEquals"];

/// The comparison that triggered a search, seen from the searched variable.
#[derive(Debug, Clone)]
pub struct Query {
    pub op: CmpOp,
    /// The other side of the comparison.
    pub counterpart: Operand,
    /// The searched variable was the right-hand operand.
    pub from_right: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No declaring statement on the path.
    Unresolved,
    /// Declared; defining equalities were added to the path state.
    Declared,
    /// Declared by a length accessor. The triggering comparison, restated on
    /// the length itself.
    Length(Expr),
}

struct Entry {
    idx: NodeIndex,
    relevant: bool,
    statement: Option<Statement>,
}

/// Backward def-use search over one path.
pub struct Resolver<'g> {
    graph: &'g PathGraph,
    entries: Vec<Entry>,
    /// Searches only look at entries before this position.
    horizon: usize,
    consumed: HashSet<(NodeIndex, String)>,
}

impl<'g> Resolver<'g> {
    pub fn new(graph: &'g PathGraph) -> Self {
        let entries = graph
            .node_order()
            .into_iter()
            .map(|idx| {
                let node = graph.node(idx);
                let statement = classify(&node.label);
                if statement.is_none() && !node.label.trim().is_empty() {
                    debug!("{}: skipping unrecognized statement {:?}", node.name, node.label);
                }
                Entry {
                    idx,
                    relevant: node.relevant,
                    statement,
                }
            })
            .collect::<Vec<_>>();
        Self {
            graph,
            horizon: entries.len(),
            entries,
            consumed: HashSet::new(),
        }
    }

    /// Restricts later searches to the statements upstream of `idx`.
    pub fn set_horizon(&mut self, idx: NodeIndex) {
        self.horizon = self
            .entries
            .iter()
            .position(|e| e.idx == idx)
            .unwrap_or(self.entries.len());
    }

    /// Conditional branches in node order.
    pub fn branches(&self) -> Vec<(NodeIndex, Operand, CmpOp, Operand)> {
        self.entries
            .iter()
            .filter_map(|e| match &e.statement {
                Some(Statement::Branch { lhs, op, rhs }) => Some((e.idx, lhs.clone(), *op, rhs.clone())),
                _ => None,
            })
            .collect()
    }

    /// Declares every intent extra and action the path reads, in node order,
    /// whether or not a branch depends on it.
    pub fn declare_parameters(&mut self, state: &mut PathState) {
        let accessors: Vec<Statement> = self
            .entries
            .iter()
            .filter_map(|e| match &e.statement {
                Some(s @ Statement::Action { .. }) | Some(s @ Statement::Parameter { .. }) => Some(s.clone()),
                _ => None,
            })
            .collect();
        for statement in accessors {
            if let Some(name) = statement.defines() {
                if !state.is_parameter(&name) {
                    self.apply(state, &name, statement, None, None);
                }
            }
        }
    }

    /// Searches the path upstream of the horizon for the declaration of
    /// `name` and records what it implies. Relevant nodes are searched first,
    /// then all nodes.
    pub fn resolve(&mut self, state: &mut PathState, name: &str, query: Option<&Query>) -> Resolution {
        let hint = query.and_then(|q| hint_from(state, &q.counterpart));
        self.search(state, name, query, hint.as_ref())
    }

    fn search(&mut self, state: &mut PathState, name: &str, query: Option<&Query>, hint: Option<&Sort>) -> Resolution {
        stacker::maybe_grow(32 * 1024, 1024 * 1024, || {
            for relevant_only in [true, false] {
                if let Some((idx, statement)) = self.find_declaration(name, relevant_only) {
                    trace!("{} declared by {} at {}", name, statement.kind(), self.graph.node(idx).name);
                    self.consumed.insert((idx, name.to_string()));
                    return self.apply(state, name, statement, query, hint);
                }
            }
            debug!("{}: no declaration of {}", self.graph.name, name);
            Resolution::Unresolved
        })
    }

    fn find_declaration(&self, name: &str, relevant_only: bool) -> Option<(NodeIndex, Statement)> {
        self.entries[..self.horizon]
            .iter()
            .filter(|e| !relevant_only || e.relevant)
            .filter(|e| !self.consumed.contains(&(e.idx, name.to_string())))
            .find_map(|e| match &e.statement {
                Some(s) if s.declares(name) => Some((e.idx, s.clone())),
                _ => None,
            })
    }

    /// Declares an unresolved variable with a best-effort sort: `hint`, or a
    /// reference sort of its own.
    pub fn declare_fallback(&mut self, state: &mut PathState, name: &str, hint: Option<Sort>) {
        if state.is_declared(name) {
            return;
        }
        let sort = match hint {
            Some(sort) => sort,
            None => Sort::Ref(state.sorts.fresh(name)),
        };
        debug!("{}: {} declared from context as {}", self.graph.name, name, sort.label());
        state.register_local(name, sort);
    }

    /// Makes sure `name` is declared, searching for it first.
    fn ensure(&mut self, state: &mut PathState, name: &str, hint: Option<&Sort>) {
        if name == "this" || state.is_declared(name) {
            return;
        }
        if self.search(state, name, None, hint) == Resolution::Unresolved {
            self.declare_fallback(state, name, hint.cloned());
        }
    }

    /// Records the declaration of `name` by `statement`. `hint` is the sort
    /// the surrounding comparison or assignment expects of `name`.
    fn apply(
        &mut self,
        state: &mut PathState,
        name: &str,
        statement: Statement,
        query: Option<&Query>,
        hint: Option<&Sort>,
    ) -> Resolution {
        match statement {
            Statement::Action { .. } => {
                state.register_parameter(name, "action", Sort::Str);
            }
            Statement::Parameter { target, getter, key, .. } => {
                let type_text = target.ty.unwrap_or(getter);
                let sort = state.sorts.sort_of_parameter(&type_text);
                state.register_parameter(name, &key, sort);
            }
            Statement::StringLength { source, .. } => {
                return self.length_of(state, name, &source, Sort::Str, query);
            }
            Statement::ArrayLength { array, .. } => {
                return self.length_of(state, name, &array, Sort::Array(Box::new(Sort::Int), 0), query);
            }
            Statement::NewArray { elem_ty, size, .. } => {
                let elem = state.sorts.sort_of_type(&elem_ty);
                let len = match &size {
                    Operand::Lit(Literal::Int(n)) if *n >= 0 => *n as usize,
                    _ => 0,
                };
                state.register_local(name, Sort::Array(Box::new(elem.clone()), len));
                if let Some(size) = self.operand_term(state, &size, Some(&Sort::Int)) {
                    state.add_constraint(Expr::eq(Expr::length(Expr::var(name)), size));
                }
                self.collect_stores(state, name, &elem);
            }
            Statement::IteratorProbe { .. } => {
                state.register_local(name, Sort::Bool);
            }
            Statement::Invoke {
                target,
                receiver,
                method,
                args,
                ..
            } => self.call(state, name, &target, Some(&receiver), &method, &args),
            Statement::StaticInvoke { target, method, args, .. } => {
                self.call(state, name, &target, None, &method, &args)
            }
            Statement::FieldRead { target, base, field } => {
                let sort = self.target_sort(state, &target, Some(&field.ty));
                state.register_local(name, sort.clone());
                let field_var = field.variable(base.as_deref());
                self.ensure(state, &field_var, Some(&sort));
                self.equate(state, name, Expr::var(&field_var));
            }
            Statement::FieldStore { field, value, .. } => {
                let sort = state.sorts.sort_of_type(&field.ty);
                state.register_local(name, sort.clone());
                if let Some(value) = self.operand_term(state, &value, Some(&sort)) {
                    self.equate(state, name, value);
                }
            }
            Statement::Identity { ty, .. } => {
                let sort = state.sorts.sort_of_type(&ty);
                state.register_local(name, sort);
            }
            Statement::InstanceOf { value, .. } => {
                state.register_local(name, Sort::Bool);
                if let Operand::Var(tested) = &value {
                    self.ensure(state, tested, None);
                }
            }
            Statement::CompareAssign { lhs, op, rhs, .. } => {
                state.register_local(name, Sort::Bool);
                if let Some(comparison) = self.comparison(state, &lhs, op, &rhs) {
                    self.equate(state, name, comparison);
                }
            }
            Statement::Arith { target, lhs, op, rhs } => {
                let sort = self.numeric_sort(state, &target);
                state.register_local(name, sort);
                let l = self.operand_term(state, &lhs, Some(&Sort::Int));
                let r = self.operand_term(state, &rhs, Some(&Sort::Int));
                if let (Some(l), Some(r)) = (l, r) {
                    self.equate(state, name, Expr::arith(op, l, r));
                }
            }
            Statement::Negate { target, value } => {
                let sort = self.numeric_sort(state, &target);
                let zero = match sort {
                    Sort::Real => Expr::Real(0, 1),
                    _ => Expr::Int(0),
                };
                state.register_local(name, sort.clone());
                if let Some(value) = self.operand_term(state, &value, Some(&sort)) {
                    self.equate(state, name, Expr::arith(ArithOp::Sub, zero, value));
                }
            }
            Statement::ArrayLoad { target, array, index } => {
                self.ensure(state, &array, Some(&Sort::Array(Box::new(Sort::Int), 0)));
                let elem = match state.sort_of(&array) {
                    Some(Sort::Array(elem, _)) => Some((**elem).clone()),
                    _ => None,
                };
                let sort = match (&target.ty, elem) {
                    (Some(ty), _) => state.sorts.sort_of_type(ty),
                    (None, Some(elem)) => elem,
                    (None, None) => Sort::Int,
                };
                state.register_local(name, sort);
                if let Some(index) = self.operand_term(state, &index, Some(&Sort::Int)) {
                    self.equate(state, name, Expr::Select(Box::new(Expr::var(&array)), Box::new(index)));
                }
            }
            Statement::Cast { target, ty, value } => {
                let cast = state.sorts.sort_of_type(&ty);
                let sort = match &target.ty {
                    Some(declared) => state.sorts.sort_of_type(declared),
                    None => cast.clone(),
                };
                state.register_local(name, sort);
                if let Some(value) = self.operand_term(state, &value, Some(&cast)) {
                    self.equate(state, name, value);
                }
            }
            Statement::Copy { target, value } => {
                let sort = match (&target.ty, &value) {
                    (Some(ty), _) => state.sorts.sort_of_type(ty),
                    (None, Operand::Var(source)) => {
                        self.ensure(state, source, hint);
                        match state.sort_of(source).or(hint).cloned() {
                            Some(sort) => sort,
                            None => Sort::Ref(state.sorts.fresh(name)),
                        }
                    }
                    (None, Operand::Lit(literal)) => match literal.sort() {
                        Some(sort) => sort,
                        None => Sort::Ref(state.sorts.fresh(name)),
                    },
                };
                state.register_local(name, sort.clone());
                if let Some(value) = self.operand_term(state, &value, Some(&sort)) {
                    self.equate(state, name, value);
                }
            }
            Statement::Branch { .. } | Statement::ArrayStore { .. } => return Resolution::Unresolved,
        }
        Resolution::Declared
    }

    fn length_of(
        &mut self,
        state: &mut PathState,
        name: &str,
        source: &str,
        source_hint: Sort,
        query: Option<&Query>,
    ) -> Resolution {
        state.register_local(name, Sort::Int);
        self.ensure(state, source, Some(&source_hint));
        let length = Expr::length(Expr::var(source));
        self.equate(state, name, length.clone());
        let Some(query) = query else {
            return Resolution::Declared;
        };
        match self.operand_term(state, &query.counterpart, Some(&Sort::Int)) {
            Some(counterpart) => {
                let op = if query.from_right { query.op.flip() } else { query.op };
                Resolution::Length(op.apply(length, counterpart))
            }
            None => Resolution::Declared,
        }
    }

    fn call(
        &mut self,
        state: &mut PathState,
        name: &str,
        target: &Target,
        receiver: Option<&str>,
        method: &str,
        args: &[Operand],
    ) {
        let receiver = receiver.filter(|r| *r != "this");
        if let (Some(recv), [arg]) = (receiver, args) {
            if EQUALITY_CALLS.contains(&method) {
                state.register_local(name, Sort::Bool);
                let recv = Operand::Var(recv.to_string());
                if let Some(comparison) = self.comparison(state, &recv, CmpOp::Eq, arg) {
                    self.equate(state, name, comparison);
                }
                return;
            }
        }
        if let (Some(recv), "isEmpty", []) = (receiver, method, args) {
            state.register_local(name, Sort::Bool);
            self.ensure(state, recv, Some(&Sort::Str));
            self.equate(state, name, Expr::eq(Expr::length(Expr::var(recv)), Expr::Int(0)));
            return;
        }

        let sort = self.target_sort(state, target, None);
        state.register_local(name, sort.clone());
        if let Some(recv) = receiver {
            self.ensure(state, recv, None);
        }
        for arg in args {
            if let Operand::Var(v) = arg {
                self.ensure(state, v, None);
            }
        }
        if !VALUE_PRESERVING.contains(&method) {
            return;
        }
        let source = match (receiver, args) {
            (Some(recv), []) => Some(recv.to_string()),
            (None, [Operand::Var(arg)]) => Some(arg.clone()),
            _ => None,
        };
        if let Some(source) = source {
            if state.sort_of(&source) == Some(&sort) {
                self.equate(state, name, Expr::var(&source));
            }
        }
    }

    /// Adds the `array[i] = x` stores upstream of the horizon as element
    /// constraints.
    fn collect_stores(&mut self, state: &mut PathState, array: &str, elem: &Sort) {
        let stores: Vec<(Operand, Operand)> = self.entries[..self.horizon]
            .iter()
            .filter_map(|e| match &e.statement {
                Some(Statement::ArrayStore { array: a, index, value }) if a == array => {
                    Some((index.clone(), value.clone()))
                }
                _ => None,
            })
            .collect();
        for (index, value) in stores {
            let index = self.operand_term(state, &index, Some(&Sort::Int));
            let value = self.operand_term(state, &value, Some(elem));
            if let (Some(index), Some(value)) = (index, value) {
                let element = Expr::Select(Box::new(Expr::var(array)), Box::new(index));
                state.add_constraint(Expr::eq(element, value));
            }
        }
    }

    /// `a OP b` with both operands declared and `null` replaced by the
    /// sentinel of the other side's sort. `None` if the comparison cannot be
    /// expressed (e.g. an integer against `null`).
    pub fn comparison(&mut self, state: &mut PathState, lhs: &Operand, op: CmpOp, rhs: &Operand) -> Option<Expr> {
        if let Operand::Var(v) = lhs {
            let hint = hint_from(state, rhs);
            self.ensure(state, v, hint.as_ref());
        }
        if let Operand::Var(v) = rhs {
            let hint = hint_from(state, lhs);
            self.ensure(state, v, hint.as_ref());
        }
        let lhs_sort = lhs.as_var().and_then(|v| state.sort_of(v)).cloned();
        let rhs_sort = rhs.as_var().and_then(|v| state.sort_of(v)).cloned();

        // an array against null is a test for emptiness
        match (lhs, rhs, &lhs_sort, &rhs_sort) {
            (Operand::Var(v), Operand::Lit(Literal::Null), Some(Sort::Array(..)), _) => {
                return Some(op.apply(Expr::length(Expr::var(v)), Expr::Int(0)));
            }
            (Operand::Lit(Literal::Null), Operand::Var(v), _, Some(Sort::Array(..))) => {
                return Some(op.apply(Expr::Int(0), Expr::length(Expr::var(v))));
            }
            _ => (),
        }

        let l = self.term(state, lhs, rhs_sort.as_ref());
        let r = self.term(state, rhs, lhs_sort.as_ref());
        match (l, r) {
            (Some(l), Some(r)) => Some(op.apply(l, r)),
            _ => {
                debug!("{}: cannot compare {:?} with {:?}", self.graph.name, lhs, rhs);
                None
            }
        }
    }

    fn operand_term(&mut self, state: &mut PathState, operand: &Operand, expected: Option<&Sort>) -> Option<Expr> {
        if let Operand::Var(v) = operand {
            self.ensure(state, v, expected);
        }
        self.term(state, operand, expected)
    }

    /// The term for an operand; literals are read in the context of `other`,
    /// the sort they are compared with or assigned to.
    fn term(&mut self, state: &mut PathState, operand: &Operand, other: Option<&Sort>) -> Option<Expr> {
        match operand {
            Operand::Var(v) => Some(Expr::var(v)),
            Operand::Lit(Literal::Null) => match other {
                Some(Sort::Ref(id)) => Some(state.sorts.null_of(*id)),
                Some(Sort::Str) => Some(Expr::StrNull),
                _ => None,
            },
            Operand::Lit(Literal::Int(n)) if other == Some(&Sort::Bool) && (*n == 0 || *n == 1) => {
                Some(Expr::Bool(*n == 1))
            }
            Operand::Lit(literal) => literal.to_expr(),
        }
    }

    /// Adds `name == value`, unless `value` refers back to `name`.
    fn equate(&mut self, state: &mut PathState, name: &str, value: Expr) {
        if value.mentions(name) {
            debug!("{}: skipping self-referential definition of {}", self.graph.name, name);
            return;
        }
        state.add_constraint(Expr::eq(Expr::var(name), value));
    }

    fn target_sort(&mut self, state: &mut PathState, target: &Target, fallback: Option<&str>) -> Sort {
        match target.ty.as_deref().or(fallback) {
            Some(ty) => state.sorts.sort_of_type(ty),
            None => Sort::Ref(state.sorts.fresh(&target.name)),
        }
    }

    fn numeric_sort(&mut self, state: &mut PathState, target: &Target) -> Sort {
        match target.ty.as_deref().map(|ty| state.sorts.sort_of_type(ty)) {
            Some(sort) if sort.is_numeric() => sort,
            _ => Sort::Int,
        }
    }
}

/// The sort suggested by the other side of a comparison.
pub fn hint_from(state: &PathState, other: &Operand) -> Option<Sort> {
    match other {
        Operand::Var(v) => state.sort_of(v).cloned(),
        Operand::Lit(literal) => literal.sort(),
    }
}

// ***************** Testing *****************
#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_path_state;

    /// A linear path of `(label, relevant)` nodes with unlabeled edges.
    fn path(nodes: &[(&str, bool)]) -> PathGraph {
        let mut g = PathGraph::new("path_1");
        for (i, (label, relevant)) in nodes.iter().enumerate() {
            g.add_node(&format!("n{}", i), Some(label), Some(*relevant));
        }
        for i in 1..nodes.len() {
            g.add_edge(&format!("n{}", i - 1), &format!("n{}", i), None);
        }
        g
    }

    fn constraints(state: &PathState) -> Vec<String> {
        state.constraints().iter().map(|c| c.to_string()).collect()
    }

    /// Resolves `name` on `nodes` (all relevant) without a triggering query.
    fn resolve_on(nodes: &[&str], name: &str) -> (Resolution, PathState) {
        let nodes: Vec<(&str, bool)> = nodes.iter().map(|label| (*label, true)).collect();
        let g = path(&nodes);
        let mut resolver = Resolver::new(&g);
        let mut state = PathState::new();
        let resolution = resolver.resolve(&mut state, name, None);
        (resolution, state)
    }

    #[test]
    fn test_search_stays_upstream_of_branch() {
        let g = path(&[
            ("i0 (int) = (android.content.Intent) $r1.getIntExtra(\"n\", 0)", true),
            ("$i1 = i0 + 1", false),
            ("if $i1 > 3 goto n3", true),
            ("$i1 = 7", true),
            ("return", true),
        ]);
        let state = build_path_state(&g);
        assert_eq!(constraints(&state), vec!["i1 == (i0 + 1)", "i1 > 3"]);
    }

    #[test]
    fn test_horizon_limits_search() {
        let g = path(&[("$i1 = 5", true), ("if $i1 > 3 goto n2", true), ("$i1 = 9", true)]);
        let mut resolver = Resolver::new(&g);
        let mut state = PathState::new();
        resolver.set_horizon(g.find("n1").unwrap());
        assert_eq!(resolver.resolve(&mut state, "i1", None), Resolution::Declared);
        assert_eq!(constraints(&state), vec!["i1 == 5"]);
    }

    #[test]
    fn test_relevant_declaration_wins() {
        let g = path(&[("$i1 = 5", false), ("$i1 = 9", true)]);
        let mut resolver = Resolver::new(&g);
        let mut state = PathState::new();
        resolver.resolve(&mut state, "i1", None);
        assert_eq!(constraints(&state), vec!["i1 == 9"]);
    }

    #[test]
    fn test_copy_takes_sort_from_comparison() {
        let g = path(&[("$i2 = i5", true), ("if $i2 > 3 goto n2", true), ("return", true)]);
        let state = build_path_state(&g);
        assert_eq!(constraints(&state), vec!["i2 == i5", "i2 > 3"]);
        assert_eq!(state.sort_of("i2"), Some(&Sort::Int));
        assert_eq!(state.sort_of("i5"), Some(&Sort::Int));
    }

    #[test]
    fn test_copy_without_context_is_a_reference() {
        let (_, state) = resolve_on(&["$r4 = r7"], "r4");
        assert!(matches!(state.sort_of("r7"), Some(Sort::Ref(_))));
        assert_eq!(state.sort_of("r4"), state.sort_of("r7"));
        assert_eq!(constraints(&state), vec!["r4 == r7"]);
    }

    #[test]
    fn test_unresolved() {
        let (resolution, state) = resolve_on(&["return"], "i9");
        assert_eq!(resolution, Resolution::Unresolved);
        assert!(!state.is_declared("i9"));
    }

    #[test]
    fn test_instanceof() {
        let (resolution, state) = resolve_on(&["$z0 = $r1 instanceof java.lang.String"], "z0");
        assert_eq!(resolution, Resolution::Declared);
        assert_eq!(state.sort_of("z0"), Some(&Sort::Bool));
        assert!(matches!(state.sort_of("r1"), Some(Sort::Ref(_))));
        assert!(state.constraints().is_empty());
    }

    #[test]
    fn test_cast() {
        let (_, state) = resolve_on(
            &[
                "$r2 (java.lang.String) = (android.content.Intent) $r1.getStringExtra(\"op\")",
                "$r3 = (java.lang.String) $r2",
            ],
            "r3",
        );
        assert_eq!(state.sort_of("r3"), Some(&Sort::Str));
        assert!(state.is_parameter("r2"));
        assert_eq!(constraints(&state), vec!["r3 == r2"]);
    }

    #[test]
    fn test_field_read_of_stored_value() {
        let (_, state) = resolve_on(
            &["r0.<com.example.Foo: int count> = 7", "$i0 = r0.<com.example.Foo: int count>"],
            "i0",
        );
        assert_eq!(state.sort_of("i0"), Some(&Sort::Int));
        assert_eq!(state.sort_of("r0.count"), Some(&Sort::Int));
        assert_eq!(constraints(&state), vec!["r0.count == 7", "i0 == r0.count"]);
    }

    #[test]
    fn test_static_field_without_store() {
        let (_, state) = resolve_on(&["$i1 = <com.example.Foo: int count>"], "i1");
        assert_eq!(state.sort_of("com.example.Foo.count"), Some(&Sort::Int));
        assert_eq!(constraints(&state), vec!["i1 == com.example.Foo.count"]);
    }

    #[test]
    fn test_identity() {
        let nodes = ["r0 := @this: com.example.Foo", "i0 := @parameter1: int"];
        let (_, state) = resolve_on(&nodes, "i0");
        assert_eq!(state.sort_of("i0"), Some(&Sort::Int));
        let (_, state) = resolve_on(&nodes, "r0");
        assert!(matches!(state.sort_of("r0"), Some(Sort::Ref(_))));
        assert!(!state.is_parameter("r0"));
    }

    #[test]
    fn test_compare_assign() {
        let (_, state) = resolve_on(
            &[
                "$r2 (java.lang.String) = (android.content.Intent) $r1.getStringExtra(\"op\")",
                "z0 = r2 == \"+\"",
            ],
            "z0",
        );
        assert_eq!(state.sort_of("z0"), Some(&Sort::Bool));
        assert_eq!(constraints(&state), vec!["z0 == (r2 == \"+\")"]);
    }

    #[test]
    fn test_negate() {
        let (_, state) = resolve_on(
            &["i0 (int) = (android.content.Intent) $r1.getIntExtra(\"n\", 0)", "$i1 = neg i0"],
            "i1",
        );
        assert_eq!(constraints(&state), vec!["i1 == (0 - i0)"]);
    }

    #[test]
    fn test_array_load_collects_stores() {
        let (_, state) = resolve_on(&["$r5 = newarray (int)[3]", "$r5[0] = 4", "$i2 = $r5[i0]"], "i2");
        assert_eq!(state.sort_of("i2"), Some(&Sort::Int));
        assert_eq!(state.sort_of("i0"), Some(&Sort::Int));
        assert_eq!(state.sort_of("r5"), Some(&Sort::Array(Box::new(Sort::Int), 3)));
        assert_eq!(constraints(&state), vec!["length(r5) == 3", "r5[0] == 4", "i2 == r5[i0]"]);
    }

    #[test]
    fn test_array_length_restates_query() {
        let g = path(&[("$r5 = newarray (int)[2]", true), ("$i0 = lengthof $r5", true)]);
        let mut resolver = Resolver::new(&g);
        let mut state = PathState::new();
        let query = Query {
            op: CmpOp::Gt,
            counterpart: Operand::Lit(Literal::Int(1)),
            from_right: false,
        };
        let expected = CmpOp::Gt.apply(Expr::length(Expr::var("r5")), Expr::Int(1));
        assert_eq!(resolver.resolve(&mut state, "i0", Some(&query)), Resolution::Length(expected));
        assert_eq!(constraints(&state), vec!["length(r5) == 2", "i0 == length(r5)"]);
    }

    #[test]
    fn test_static_invoke() {
        let extra = "i0 (int) = (android.content.Intent) $r1.getIntExtra(\"n\", 0)";
        let (_, state) = resolve_on(&[extra, "$i2 (int) = (java.lang.Integer).valueOf(i0)"], "i2");
        assert_eq!(constraints(&state), vec!["i2 == i0"]);

        let (_, state) = resolve_on(&[extra, "$i2 (int) = (com.example.Operations).add(i0, 5)"], "i2");
        assert_eq!(state.sort_of("i2"), Some(&Sort::Int));
        assert!(state.is_parameter("i0"));
        assert!(state.constraints().is_empty());
    }

    #[test]
    fn test_is_empty() {
        let (_, state) = resolve_on(
            &[
                "$r2 (java.lang.String) = (android.content.Intent) $r1.getStringExtra(\"op\")",
                "$z0 (boolean) = (java.lang.String) $r2.isEmpty()",
            ],
            "z0",
        );
        assert_eq!(state.sort_of("z0"), Some(&Sort::Bool));
        assert_eq!(constraints(&state), vec!["z0 == (length(r2) == 0)"]);
    }

    #[test]
    fn test_has_next() {
        let (resolution, state) = resolve_on(&["$z0 (boolean) = (java.util.Iterator) $r3.hasNext()"], "z0");
        assert_eq!(resolution, Resolution::Declared);
        assert_eq!(state.sort_of("z0"), Some(&Sort::Bool));
        assert!(state.constraints().is_empty());
    }

    #[test]
    fn test_independent_declarations_commute() {
        let build = |order: [usize; 4]| {
            let declarations = [
                ("i0 (int) = (android.content.Intent) $r1.getIntExtra(\"count\", 0)", true),
                ("$r2 (java.lang.String) = (android.content.Intent) $r1.getStringExtra(\"op\")", true),
                ("$i2 = i0 * 2", false),
                ("$z0 (boolean) = (java.lang.String) $r2.equals(\"x\")", false),
            ];
            let mut nodes: Vec<(&str, bool)> = order.iter().map(|i| declarations[*i]).collect();
            nodes.push(("if $i2 > 6 goto n6", true));
            nodes.push(("if $z0 == 1 goto n7", true));
            nodes.push(("return", true));
            build_path_state(&path(&nodes))
        };
        let reference = build([0, 1, 2, 3]);
        assert_eq!(
            constraints(&reference),
            vec!["i2 == (i0 * 2)", "i2 > 6", "z0 == (r2 == \"x\")", "z0 == True"]
        );
        for order in [[1, 0, 3, 2], [0, 2, 1, 3], [1, 3, 0, 2]] {
            let permuted = build(order);
            assert_eq!(permuted.constraints(), reference.constraints());
            assert_eq!(permuted.sorted_parameters(), reference.sorted_parameters());
        }
    }
}
