//! Recognises the statement shapes of decompiled node labels.
//!
//! `classify` returns the first shape, in priority order, that matches the
//! whole label. Labels outside the grammar yield `None` and are skipped by
//! every caller.

use expressions::{ArithOp, CmpOp, Literal};
use log::trace;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "statement.pest"]
pub struct StatementParser;

/// The assigned variable of a declaration, with its declared type if the
/// label carries one (`$r2 (java.lang.String) = ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub ty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Var(String),
    Lit(Literal),
}

impl Operand {
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Operand::Var(name) => Some(name),
            Operand::Lit(_) => None,
        }
    }
}

/// `<Owner: Type name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub owner: String,
    pub ty: String,
    pub name: String,
}

impl FieldRef {
    /// The symbolic variable standing for this field, read through `base`
    /// (or statically when there is none).
    pub fn variable(&self, base: Option<&str>) -> String {
        match base {
            Some(base) => format!("{}.{}", base, self.name),
            None => format!("{}.{}", self.owner, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `v (T) = (C) o.getAction()`
    Action { target: Target, receiver: String },
    /// `v (T) = (C) o.getX("key"[, default])` on an Intent or Bundle.
    Parameter {
        target: Target,
        carrier: String,
        receiver: String,
        getter: String,
        key: String,
        default: Option<Operand>,
    },
    /// `if a OP b goto ...`
    Branch { lhs: Operand, op: CmpOp, rhs: Operand },
    /// `v (T) = (C) o.length()`
    StringLength { target: Target, source: String },
    /// `v = lengthof a`
    ArrayLength { target: Target, array: String },
    /// `v = newarray (E)[n]`
    NewArray { target: Target, elem_ty: String, size: Operand },
    /// `a[i] = x`
    ArrayStore { array: String, index: Operand, value: Operand },
    /// `v (T) = (C) o.hasNext()`
    IteratorProbe { target: Target, iterator: String },
    /// `v (T) = (C) o.m(args)`
    Invoke {
        target: Target,
        owner: String,
        receiver: String,
        method: String,
        args: Vec<Operand>,
    },
    /// `v (T) = (C).m(args)`
    StaticInvoke {
        target: Target,
        owner: String,
        method: String,
        args: Vec<Operand>,
    },
    /// `v = o.<C: T f>` or `v = <C: T f>`
    FieldRead { target: Target, base: Option<String>, field: FieldRef },
    /// `o.<C: T f> = x`
    FieldStore { base: Option<String>, field: FieldRef, value: Operand },
    /// `v := @this: T`, `v := @parameterN: T`
    Identity { target: String, source: String, ty: String },
    /// `v = x instanceof T`
    InstanceOf { target: Target, value: Operand, ty: String },
    /// `v = a OP b`
    CompareAssign { target: Target, lhs: Operand, op: CmpOp, rhs: Operand },
    /// `v = a OP b` with an arithmetic operator.
    Arith { target: Target, lhs: Operand, op: ArithOp, rhs: Operand },
    /// `v = neg a`
    Negate { target: Target, value: Operand },
    /// `v = a[i]`
    ArrayLoad { target: Target, array: String, index: Operand },
    /// `v = (T) x`
    Cast { target: Target, ty: String, value: Operand },
    /// `v = x`
    Copy { target: Target, value: Operand },
}

impl Statement {
    /// The variable this statement declares, if any.
    pub fn defines(&self) -> Option<String> {
        match self {
            Statement::Action { target, .. }
            | Statement::Parameter { target, .. }
            | Statement::StringLength { target, .. }
            | Statement::ArrayLength { target, .. }
            | Statement::NewArray { target, .. }
            | Statement::IteratorProbe { target, .. }
            | Statement::Invoke { target, .. }
            | Statement::StaticInvoke { target, .. }
            | Statement::FieldRead { target, .. }
            | Statement::InstanceOf { target, .. }
            | Statement::CompareAssign { target, .. }
            | Statement::Arith { target, .. }
            | Statement::Negate { target, .. }
            | Statement::ArrayLoad { target, .. }
            | Statement::Cast { target, .. }
            | Statement::Copy { target, .. } => Some(target.name.clone()),
            Statement::Identity { target, .. } => Some(target.clone()),
            Statement::FieldStore { base, field, .. } => Some(field.variable(base.as_deref())),
            Statement::Branch { .. } | Statement::ArrayStore { .. } => None,
        }
    }

    pub fn declares(&self, name: &str) -> bool {
        self.defines().as_deref() == Some(name)
    }

    /// Short name of the shape, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Action { .. } => "action accessor",
            Statement::Parameter { .. } => "parameter accessor",
            Statement::Branch { .. } => "conditional branch",
            Statement::StringLength { .. } => "string length",
            Statement::ArrayLength { .. } => "array length",
            Statement::NewArray { .. } => "array allocation",
            Statement::ArrayStore { .. } => "array store",
            Statement::IteratorProbe { .. } => "iterator probe",
            Statement::Invoke { .. } => "method call",
            Statement::StaticInvoke { .. } => "return-value assignment",
            Statement::FieldRead { .. } => "field read",
            Statement::FieldStore { .. } => "field store",
            Statement::Identity { .. } => "identity",
            Statement::InstanceOf { .. } => "instanceof",
            Statement::CompareAssign { .. } => "comparison assignment",
            Statement::Arith { .. } => "arithmetic",
            Statement::Negate { .. } => "negation",
            Statement::ArrayLoad { .. } => "array load",
            Statement::Cast { .. } => "cast",
            Statement::Copy { .. } => "copy",
        }
    }
}

/// Classifies one node label.
pub fn classify(label: &str) -> Option<Statement> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    let mut parsed = match StatementParser::parse(Rule::statement, label) {
        Ok(pairs) => pairs,
        Err(_) => {
            trace!("unrecognized statement: {}", label);
            return None;
        }
    };
    let shape = parsed.next()?.into_inner().next()?;
    build_statement(shape)
}

// ***************** Building from pairs *****************

fn build_statement(pair: Pair<Rule>) -> Option<Statement> {
    let rule = pair.as_rule();
    let mut inner = fields(pair.into_inner());
    let statement = match rule {
        Rule::action_accessor => {
            let target = build_target(inner.next()?)?;
            let _carrier = inner.next()?;
            Statement::Action {
                target,
                receiver: var_name(&inner.next()?),
            }
        }
        Rule::parameter_accessor => {
            let target = build_target(inner.next()?)?;
            let carrier = paren_type(inner.next()?)?;
            let receiver = var_name(&inner.next()?);
            let getter = inner.next()?.as_str().to_string();
            let key = match Literal::parse(inner.next()?.as_str())? {
                Literal::Str(key) => key,
                _ => return None,
            };
            let default = match inner.next() {
                Some(p) => Some(build_operand(p)?),
                None => None,
            };
            Statement::Parameter {
                target,
                carrier,
                receiver,
                getter,
                key,
                default,
            }
        }
        Rule::cond_branch => {
            let lhs = build_operand(inner.next()?)?;
            let op = CmpOp::from_symbol(inner.next()?.as_str())?;
            let rhs = build_operand(inner.next()?)?;
            Statement::Branch { lhs, op, rhs }
        }
        Rule::string_length => {
            let target = build_target(inner.next()?)?;
            let _owner = inner.next()?;
            Statement::StringLength {
                target,
                source: var_name(&inner.next()?),
            }
        }
        Rule::array_length => Statement::ArrayLength {
            target: build_target(inner.next()?)?,
            array: var_name(&inner.next()?),
        },
        Rule::new_array => Statement::NewArray {
            target: build_target(inner.next()?)?,
            elem_ty: paren_type(inner.next()?)?,
            size: build_operand(inner.next()?)?,
        },
        Rule::array_store => Statement::ArrayStore {
            array: var_name(&inner.next()?),
            index: build_operand(inner.next()?)?,
            value: build_operand(inner.next()?)?,
        },
        Rule::iterator_probe => {
            let target = build_target(inner.next()?)?;
            let _owner = inner.next()?;
            Statement::IteratorProbe {
                target,
                iterator: var_name(&inner.next()?),
            }
        }
        Rule::invoke => Statement::Invoke {
            target: build_target(inner.next()?)?,
            owner: paren_type(inner.next()?)?,
            receiver: var_name(&inner.next()?),
            method: inner.next()?.as_str().to_string(),
            args: build_args(inner.next())?,
        },
        Rule::static_invoke => Statement::StaticInvoke {
            target: build_target(inner.next()?)?,
            owner: paren_type(inner.next()?)?,
            method: inner.next()?.as_str().to_string(),
            args: build_args(inner.next())?,
        },
        Rule::field_read => {
            let target = build_target(inner.next()?)?;
            let next = inner.next()?;
            let (base, field) = if next.as_rule() == Rule::variable {
                (Some(var_name(&next)), build_field(inner.next()?)?)
            } else {
                (None, build_field(next)?)
            };
            Statement::FieldRead { target, base, field }
        }
        Rule::field_store => {
            let next = inner.next()?;
            let (base, field) = if next.as_rule() == Rule::variable {
                (Some(var_name(&next)), build_field(inner.next()?)?)
            } else {
                (None, build_field(next)?)
            };
            Statement::FieldStore {
                base,
                field,
                value: build_operand(inner.next()?)?,
            }
        }
        Rule::identity => Statement::Identity {
            target: var_name(&inner.next()?),
            source: inner.next()?.as_str().to_string(),
            ty: inner.next()?.as_str().to_string(),
        },
        Rule::instance_of => Statement::InstanceOf {
            target: build_target(inner.next()?)?,
            value: build_operand(inner.next()?)?,
            ty: inner.next()?.as_str().to_string(),
        },
        Rule::comparison_assign => Statement::CompareAssign {
            target: build_target(inner.next()?)?,
            lhs: build_operand(inner.next()?)?,
            op: CmpOp::from_symbol(inner.next()?.as_str())?,
            rhs: build_operand(inner.next()?)?,
        },
        Rule::arith_assign => Statement::Arith {
            target: build_target(inner.next()?)?,
            lhs: build_operand(inner.next()?)?,
            op: ArithOp::from_symbol(inner.next()?.as_str())?,
            rhs: build_operand(inner.next()?)?,
        },
        Rule::negate => Statement::Negate {
            target: build_target(inner.next()?)?,
            value: build_operand(inner.next()?)?,
        },
        Rule::array_load => Statement::ArrayLoad {
            target: build_target(inner.next()?)?,
            array: var_name(&inner.next()?),
            index: build_operand(inner.next()?)?,
        },
        Rule::cast_assign => Statement::Cast {
            target: build_target(inner.next()?)?,
            ty: paren_type(inner.next()?)?,
            value: build_operand(inner.next()?)?,
        },
        Rule::copy => Statement::Copy {
            target: build_target(inner.next()?)?,
            value: build_operand(inner.next()?)?,
        },
        _ => return None,
    };
    Some(statement)
}

/// Children of a shape without the keyword tokens.
fn fields(pairs: Pairs<Rule>) -> impl Iterator<Item = Pair<Rule>> {
    pairs.filter(|p| {
        !matches!(
            p.as_rule(),
            Rule::kw_if
                | Rule::kw_goto
                | Rule::kw_lengthof
                | Rule::kw_newarray
                | Rule::kw_instanceof
                | Rule::kw_neg
                | Rule::jump_target
        )
    })
}

/// Strips the decompiler's `$` sigil.
fn var_name(pair: &Pair<Rule>) -> String {
    pair.as_str().trim_start_matches('$').to_string()
}

fn paren_type(pair: Pair<Rule>) -> Option<String> {
    Some(pair.into_inner().next()?.as_str().trim().to_string())
}

fn build_target(pair: Pair<Rule>) -> Option<Target> {
    let mut inner = pair.into_inner();
    let name = var_name(&inner.next()?);
    let ty = match inner.next() {
        Some(p) => Some(paren_type(p)?),
        None => None,
    };
    Some(Target { name, ty })
}

fn build_operand(pair: Pair<Rule>) -> Option<Operand> {
    let inner = pair.into_inner().next()?;
    match inner.as_rule() {
        Rule::variable => Some(Operand::Var(var_name(&inner))),
        Rule::literal => Literal::parse(inner.as_str()).map(Operand::Lit),
        _ => None,
    }
}

fn build_args(pair: Option<Pair<Rule>>) -> Option<Vec<Operand>> {
    match pair {
        Some(args) => args.into_inner().map(build_operand).collect(),
        None => Some(Vec::new()),
    }
}

fn build_field(pair: Pair<Rule>) -> Option<FieldRef> {
    let mut inner = pair.into_inner();
    Some(FieldRef {
        owner: inner.next()?.as_str().to_string(),
        ty: inner.next()?.as_str().to_string(),
        name: inner.next()?.as_str().to_string(),
    })
}
