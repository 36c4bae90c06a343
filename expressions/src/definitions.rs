// ***************** Definitions *****************

/// A variable is its decompiled identifier with the `$` sigil removed.
pub type Variable = String;

/// Index of a reference sort inside a path's sort registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortId(usize);

impl SortId {
    pub fn new(index: usize) -> SortId {
        SortId(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// The logical sort of a symbolic variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sort {
    Int,
    Str,
    Bool,
    Real,
    /// Uninterpreted sort keyed by a decompiled type name.
    Ref(SortId),
    /// Element sort and allocated length.
    Array(Box<Sort>, usize),
}

impl Sort {
    /// The type name used in the textual solution lines.
    pub fn label(&self) -> &'static str {
        match self {
            Sort::Int => "integer",
            Sort::Str => "string",
            Sort::Bool => "boolean",
            Sort::Real => "float",
            Sort::Ref(_) => "serializable",
            Sort::Array(..) => "array",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Sort::Int | Sort::Real)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn from_symbol(symbol: &str) -> Option<CmpOp> {
        match symbol {
            "==" => Some(CmpOp::Eq),
            "!=" => Some(CmpOp::Ne),
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Le),
            ">" => Some(CmpOp::Gt),
            ">=" => Some(CmpOp::Ge),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// The operator that keeps the comparison true once its operands swap sides,
    /// so `a < b` holds exactly when `b > a` does.
    pub fn flip(&self) -> CmpOp {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            other => *other,
        }
    }

    /// Builds `lhs <op> rhs`.
    pub fn apply(&self, lhs: Expr, rhs: Expr) -> Expr {
        let (lhs, rhs) = (Box::new(lhs), Box::new(rhs));
        match self {
            CmpOp::Eq => Expr::Eq(lhs, rhs),
            CmpOp::Ne => Expr::Ne(lhs, rhs),
            CmpOp::Lt => Expr::Lt(lhs, rhs),
            CmpOp::Le => Expr::Le(lhs, rhs),
            CmpOp::Gt => Expr::Gt(lhs, rhs),
            CmpOp::Ge => Expr::Ge(lhs, rhs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn from_symbol(symbol: &str) -> Option<ArithOp> {
        match symbol {
            "+" => Some(ArithOp::Add),
            "-" => Some(ArithOp::Sub),
            "*" => Some(ArithOp::Mul),
            "/" => Some(ArithOp::Div),
            "%" => Some(ArithOp::Rem),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A path constraint, or a term inside one.
pub enum Expr {
    Var(Variable),
    Int(i64),
    /// Numerator and denominator.
    Real(i64, i64),
    Str(String),
    Bool(bool),
    /// The canonical null value of a reference sort.
    Null(SortId),
    /// The null value of `java.lang.String`.
    StrNull,
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Length of a string or an array.
    Length(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    /// Array element read.
    Select(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    pub fn not(inner: Expr) -> Expr {
        Expr::Not(Box::new(inner))
    }

    pub fn length(of: Expr) -> Expr {
        Expr::Length(Box::new(of))
    }

    pub fn arith(op: ArithOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Arith(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
        CmpOp::Eq.apply(lhs, rhs)
    }

    /// Splits a comparison into its operator and operands.
    pub fn as_comparison(&self) -> Option<(CmpOp, &Expr, &Expr)> {
        match self {
            Expr::Eq(l, r) => Some((CmpOp::Eq, &**l, &**r)),
            Expr::Ne(l, r) => Some((CmpOp::Ne, &**l, &**r)),
            Expr::Lt(l, r) => Some((CmpOp::Lt, &**l, &**r)),
            Expr::Le(l, r) => Some((CmpOp::Le, &**l, &**r)),
            Expr::Gt(l, r) => Some((CmpOp::Gt, &**l, &**r)),
            Expr::Ge(l, r) => Some((CmpOp::Ge, &**l, &**r)),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Expr::Var(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::Int(_) | Expr::Real(..) | Expr::Str(_) | Expr::Bool(_) | Expr::Null(_) | Expr::StrNull
        )
    }

    /// Direct children, left to right.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Eq(l, r)
            | Expr::Ne(l, r)
            | Expr::Lt(l, r)
            | Expr::Le(l, r)
            | Expr::Gt(l, r)
            | Expr::Ge(l, r)
            | Expr::Arith(_, l, r)
            | Expr::Select(l, r) => vec![&**l, &**r],
            Expr::Not(inner) | Expr::Length(inner) => vec![&**inner],
            _ => vec![],
        }
    }

    /// Whether `name` occurs anywhere in the expression.
    pub fn mentions(&self, name: &str) -> bool {
        match self {
            Expr::Var(v) => v == name,
            _ => self.children().into_iter().any(|c| c.mentions(name)),
        }
    }

    /// Every variable of the expression, in first-occurrence order.
    pub fn variables(&self) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        let mut stack = vec![self];
        while let Some(current) = stack.pop() {
            if let Expr::Var(v) = current {
                if !found.contains(&v.as_str()) {
                    found.push(v);
                }
            }
            // reversed so the leftmost child is visited first
            for child in current.children().into_iter().rev() {
                stack.push(child);
            }
        }
        found
    }
}

/// A literal token of a decompiled statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    Real(i64, i64),
    Str(String),
    Bool(bool),
    Null,
}

impl Literal {
    /// Reads a literal token: `true`/`false`, a quoted string, an integer or a decimal.
    /// Java type suffixes (`10L`, `1.5F`) are accepted.
    pub fn parse(token: &str) -> Option<Literal> {
        let token = token.trim();
        match token {
            "true" => return Some(Literal::Bool(true)),
            "false" => return Some(Literal::Bool(false)),
            "null" => return Some(Literal::Null),
            _ => (),
        }
        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            return Some(Literal::Str(unescape(&token[1..token.len() - 1])));
        }
        let digits = token.trim_end_matches(|c| matches!(c, 'L' | 'l' | 'F' | 'f' | 'D' | 'd'));
        if let Ok(value) = digits.parse::<i64>() {
            return Some(Literal::Int(value));
        }
        parse_decimal(digits).map(|(num, den)| Literal::Real(num, den))
    }

    /// The sort a literal inhabits; `null` has none on its own.
    pub fn sort(&self) -> Option<Sort> {
        match self {
            Literal::Int(_) => Some(Sort::Int),
            Literal::Real(..) => Some(Sort::Real),
            Literal::Str(_) => Some(Sort::Str),
            Literal::Bool(_) => Some(Sort::Bool),
            Literal::Null => None,
        }
    }

    /// The literal as a term; `null` needs a sort and yields `None`.
    pub fn to_expr(&self) -> Option<Expr> {
        match self {
            Literal::Int(v) => Some(Expr::Int(*v)),
            Literal::Real(n, d) => Some(Expr::Real(*n, *d)),
            Literal::Str(s) => Some(Expr::Str(s.clone())),
            Literal::Bool(b) => Some(Expr::Bool(*b)),
            Literal::Null => None,
        }
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `"-12.50"` becomes `(-1250, 100)`.
fn parse_decimal(text: &str) -> Option<(i64, i64)> {
    let (whole, fraction) = text.split_once('.')?;
    if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let negative = whole.starts_with('-');
    let whole_digits = whole.trim_start_matches('-');
    if !whole_digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let den = 10i64.checked_pow(fraction.len() as u32)?;
    let whole_value: i64 = if whole_digits.is_empty() { 0 } else { whole_digits.parse().ok()? };
    let frac_value: i64 = fraction.parse().ok()?;
    let magnitude = whole_value.checked_mul(den)?.checked_add(frac_value)?;
    Some((if negative { -magnitude } else { magnitude }, den))
}
