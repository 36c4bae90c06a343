use std::fmt;
use crate::definitions::*;

/// Renders `num/den` as a decimal when the denominator is a power of ten,
/// otherwise as a fraction.
pub fn real_to_string(num: i64, den: i64) -> String {
    if den == 0 {
        return format!("{}/{}", num, den);
    }
    if den == 1 {
        return format!("{}.0", num);
    }
    let mut power = den;
    let mut places = 0usize;
    while power % 10 == 0 {
        power /= 10;
        places += 1;
    }
    if power != 1 {
        return format!("{}/{}", num, den);
    }
    let sign = if num < 0 { "-" } else { "" };
    let magnitude = num.unsigned_abs();
    let den = den.unsigned_abs();
    format!("{}{}.{:0width$}", sign, magnitude / den, magnitude % den, width = places)
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Ref(id) => write!(f, "ref#{}", id.index()),
            Sort::Array(elem, len) => write!(f, "{}[{}]", elem, len),
            other => write!(f, "{}", other.label()),
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((op, lhs, rhs)) = self.as_comparison() {
            return write!(f, "{} {} {}", Operand(lhs), op, Operand(rhs));
        }
        match self {
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Real(num, den) => write!(f, "{}", real_to_string(*num, *den)),
            Expr::Str(s) => write!(f, "{:?}", s),
            Expr::Bool(true) => write!(f, "True"),
            Expr::Bool(false) => write!(f, "False"),
            Expr::Null(_) | Expr::StrNull => write!(f, "null"),
            Expr::Not(inner) => write!(f, "not({})", inner),
            Expr::Length(inner) => write!(f, "length({})", inner),
            Expr::Arith(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op, rhs),
            Expr::Select(array, index) => write!(f, "{}[{}]", array, index),
            _ => unreachable!("comparisons are handled above"),
        }
    }
}

/// A comparison operand; nested comparisons get parentheses.
struct Operand<'a>(&'a Expr);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.as_comparison().is_some() {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
