use expressions::{Expr, Literal, Sort, SortId};
use indexmap::{IndexMap, IndexSet};
use log::debug;

/// The reference sorts registered while analysing one path.
///
/// A type name is interned once; asking again for the same name hands back
/// the same `SortId`, and with it the same null sentinel.
#[derive(Debug, Default, Clone)]
pub struct SortRegistry {
    names: IndexMap<String, SortId>,
    nulls: IndexSet<SortId>,
    minted: usize,
}

impl SortRegistry {
    pub fn new() -> SortRegistry {
        SortRegistry::default()
    }

    /// Registers `type_name` (or finds its existing registration).
    pub fn intern(&mut self, type_name: &str) -> SortId {
        if let Some(id) = self.lookup(type_name) {
            return id;
        }
        let key = normalize_type_name(type_name);
        let id = SortId::new(self.names.len());
        debug!("registered reference sort {} as #{}", key, id.index());
        self.names.insert(key, id);
        id
    }

    /// Mints a sort nobody else can name, for values whose type is unknown.
    pub fn fresh(&mut self, hint: &str) -> SortId {
        self.minted += 1;
        let name = format!("{}!unknown{}", hint, self.minted);
        self.intern(&name)
    }

    pub fn lookup(&self, type_name: &str) -> Option<SortId> {
        self.names.get(&normalize_type_name(type_name)).copied()
    }

    /// The null sentinel of a reference sort, created on first request.
    pub fn null_of(&mut self, id: SortId) -> Expr {
        self.nulls.insert(id);
        Expr::Null(id)
    }

    /// Sorts whose null sentinel has been requested, in request order.
    pub fn nulls(&self) -> impl Iterator<Item = SortId> + '_ {
        self.nulls.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SortId)> {
        self.names.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Sort named by a decompiled type, e.g. `int`, `java.lang.String`,
    /// `com.example.Order`.
    pub fn sort_of_type(&mut self, type_text: &str) -> Sort {
        let name = normalize_type_name(type_text);
        if let Some(elem) = name.strip_suffix("[]") {
            return Sort::Array(Box::new(self.sort_of_type(elem)), 0);
        }
        if let Some(sort) = primitive_sort(&name) {
            return sort;
        }
        let lower = name.to_lowercase();
        if lower.contains("string") {
            Sort::Str
        } else if lower.contains("boolean") {
            Sort::Bool
        } else {
            Sort::Ref(self.intern(&name))
        }
    }

    /// Sort of an intent extra or bundle entry, from the accessor's declared return type.
    /// Anything unrecognised is taken to be an integer.
    pub fn sort_of_parameter(&mut self, type_text: &str) -> Sort {
        let lower = type_text.to_lowercase();
        if lower.contains("string") {
            Sort::Str
        } else if lower.contains("bool") {
            Sort::Bool
        } else if lower.contains("float") || lower.contains("double") {
            Sort::Real
        } else if lower.contains("serializable") || lower.contains("parcelable") {
            Sort::Ref(self.intern(type_text))
        } else {
            Sort::Int
        }
    }

    /// Infers a sort from a declared type if there is one, otherwise from a
    /// literal token. Tokens that are neither literal nor typed get a fresh
    /// reference sort.
    pub fn infer(&mut self, name: &str, type_text: Option<&str>, literal: Option<&str>) -> Sort {
        if let Some(type_text) = type_text {
            return self.sort_of_type(type_text);
        }
        match literal.and_then(Literal::parse).and_then(|l| l.sort()) {
            Some(sort) => sort,
            None => Sort::Ref(self.fresh(name)),
        }
    }
}

fn primitive_sort(name: &str) -> Option<Sort> {
    match name {
        "int" | "long" | "short" | "byte" | "char" | "java.lang.Integer" | "java.lang.Long"
        | "java.lang.Short" | "java.lang.Byte" | "java.lang.Character" => Some(Sort::Int),
        "boolean" | "java.lang.Boolean" => Some(Sort::Bool),
        "float" | "double" | "java.lang.Float" | "java.lang.Double" => Some(Sort::Real),
        "java.lang.String" | "java.lang.CharSequence" => Some(Sort::Str),
        _ => None,
    }
}

/// Drops surrounding whitespace and generic arguments: `java.util.List<Foo>` is `java.util.List`.
pub fn normalize_type_name(type_text: &str) -> String {
    let trimmed = type_text.trim();
    match trimmed.find('<') {
        Some(i) if i > 0 => trimmed[..i].trim().to_string(),
        _ => trimmed.to_string(),
    }
}
