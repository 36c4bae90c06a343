use expressions::{CmpOp, Expr};
use indexmap::IndexSet;

/// Constraints of one path, deduplicated, in the order they were first added.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConstraintSet {
    items: IndexSet<Expr>,
}

impl ConstraintSet {
    pub fn new() -> ConstraintSet {
        ConstraintSet::default()
    }

    /// Adds `constraint`; returns false if it was already present.
    pub fn insert(&mut self, constraint: Expr) -> bool {
        self.items.insert(constraint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expr> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rebuilds the set through `f`. Entries that become equal collapse onto
    /// the first one.
    pub fn rewrite<F>(&mut self, mut f: F)
    where
        F: FnMut(&Expr) -> Expr,
    {
        self.items = self.items.iter().map(|c| f(c)).collect();
    }
}

impl<'a> IntoIterator for &'a ConstraintSet {
    type Item = &'a Expr;
    type IntoIter = indexmap::set::Iter<'a, Expr>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Replaces `var == 0` / `var == 1` (either side, `==` or `!=`, possibly
/// under a negation) by the matching boolean literal.
pub fn bool_literal_form(constraint: &Expr, var: &str) -> Expr {
    if let Expr::Not(inner) = constraint {
        return Expr::not(bool_literal_form(inner, var));
    }
    let Some((op, lhs, rhs)) = constraint.as_comparison() else {
        return constraint.clone();
    };
    if !matches!(op, CmpOp::Eq | CmpOp::Ne) {
        return constraint.clone();
    }
    match (lhs, rhs) {
        (Expr::Var(v), Expr::Int(n)) if v == var && (*n == 0 || *n == 1) => {
            op.apply(lhs.clone(), Expr::Bool(*n == 1))
        }
        (Expr::Int(n), Expr::Var(v)) if v == var && (*n == 0 || *n == 1) => {
            op.apply(Expr::Bool(*n == 1), rhs.clone())
        }
        _ => constraint.clone(),
    }
}
