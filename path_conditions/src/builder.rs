use crate::resolver::{hint_from, Query, Resolution, Resolver};
use classifier::Operand;
use expressions::{CmpOp, Expr};
use ir::PathState;
use log::{debug, info};
use parser::PathGraph;
use petgraph::graph::NodeIndex;

/// Builds the constraints of one path into a fresh state.
pub fn build_path_state(graph: &PathGraph) -> PathState {
    let mut state = PathState::new();
    build(graph, &mut state);
    state
}

/// Walks the branches of `graph` in node order and adds one constraint per
/// branch to `state`: the condition, or its negation when the path leaves
/// the branch on its `false` edge.
pub fn build(graph: &PathGraph, state: &mut PathState) {
    let mut resolver = Resolver::new(graph);
    resolver.declare_parameters(state);

    for (idx, lhs, op, rhs) in resolver.branches() {
        resolver.set_horizon(idx);
        let Some(condition) = branch_condition(&mut resolver, state, &lhs, op, &rhs) else {
            debug!("{}: branch at {} yields no constraint", graph.name, graph.node(idx).name);
            continue;
        };
        let constraint = match taken_edge(graph, idx) {
            Some(false) => Expr::not(condition),
            _ => condition,
        };
        state.add_constraint(constraint);
        for side in [&lhs, &rhs] {
            if let Operand::Var(v) = side {
                state.canonicalize_booleans(v);
            }
        }
    }
    info!(
        "{}: {} parameters, {} constraints",
        graph.name,
        state.parameters().count(),
        state.constraints().len()
    );
}

fn branch_condition(
    resolver: &mut Resolver,
    state: &mut PathState,
    lhs: &Operand,
    op: CmpOp,
    rhs: &Operand,
) -> Option<Expr> {
    let mut length = None;
    let sides = [(lhs, rhs, false), (rhs, lhs, true)];
    for (side, other, from_right) in sides {
        let Operand::Var(name) = side else {
            continue;
        };
        if state.is_declared(name) {
            continue;
        }
        let query = Query {
            op,
            counterpart: other.clone(),
            from_right,
        };
        match resolver.resolve(state, name, Some(&query)) {
            Resolution::Length(constraint) => {
                if length.is_none() {
                    length = Some(constraint);
                }
            }
            Resolution::Declared => (),
            Resolution::Unresolved => {
                let hint = hint_from(state, other);
                resolver.declare_fallback(state, name, hint);
            }
        }
    }
    if length.is_some() {
        return length;
    }
    resolver.comparison(state, lhs, op, rhs)
}

/// Label of the edge by which the path leaves `idx`, considering only edges
/// into relevant nodes.
fn taken_edge(graph: &PathGraph, idx: NodeIndex) -> Option<bool> {
    graph
        .successors(idx)
        .into_iter()
        .find(|(target, _)| graph.node(*target).relevant)
        .and_then(|(_, label)| label)
}
