//! Type model
//!
//! [`Ty`] is the universal, immutable type value. Variants share their
//! payload through `Arc`, so cloning a type is cheap and an unchanged
//! substitution can hand back the very same allocation.
//!
//! Operations that may need the symbol index (alias resolution, super-class
//! traversal, member lookup) take a [`SearchContext`](crate::SearchContext)
//! and live in the submodules.

pub mod doc;
mod function;
mod generic;
mod relation;
mod substitutor;
mod union;

use std::fmt;
use std::sync::Arc;

use emmy_parser::NodeRef;

pub use function::{FunParam, FunSignature, FunctionSignatures, TyFunction};
pub use generic::GenericAnalyzer;
pub use relation::TyVarianceFlags;
pub use substitutor::{TyChainSubstitutor, TyParameterSubstitutor, TySelfSubstitutor, TySubstitutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TyPrimitiveKind {
    Boolean,
    Number,
    String,
    Function,
    Table,
}

impl TyPrimitiveKind {
    pub fn display_name(self) -> &'static str {
        match self {
            TyPrimitiveKind::Boolean => "boolean",
            TyPrimitiveKind::Number => "number",
            TyPrimitiveKind::String => "string",
            TyPrimitiveKind::Function => "function",
            TyPrimitiveKind::Table => "table",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// Declared with `---@class`
    Doc,
    /// Synthesized for a local variable
    Anonymous,
    /// Synthesized for a global variable while indexing
    Global,
    /// The `_G` namespace
    G,
    /// `self` in doc comments, replaced at call sites
    SelfType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyClass {
    pub name: String,
    pub var_name: Option<String>,
    pub kind: ClassKind,
}

/// Structural type of a table constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyTable {
    pub node: NodeRef,
    /// Generic bindings applied lazily to member types
    pub substitution: Vec<(String, Ty)>,
}

impl TyTable {
    pub fn class_name(&self) -> String {
        format!("table@{}", self.node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Name(String),
    Indexer(Ty),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyRecordField {
    pub key: RecordKey,
    pub ty: Ty,
}

/// Shape table from a doc comment: `{ name: string, [number]: boolean }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyRecord {
    pub fields: Vec<TyRecordField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyGenericParameter {
    pub name: String,
    /// Declaring function or class, so nested generics with the same name differ
    pub scope: String,
    pub bound: Option<Ty>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyAlias {
    pub name: String,
    pub params: Vec<TyGenericParameter>,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyGeneric {
    pub base: Ty,
    pub args: Vec<Ty>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TyMultipleResults {
    pub list: Vec<Ty>,
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Unknown,
    Void,
    Nil,
    Primitive(TyPrimitiveKind),
    Literal(TyPrimitiveKind, Arc<str>),
    Class(Arc<TyClass>),
    Table(Arc<TyTable>),
    Record(Arc<TyRecord>),
    Array(Arc<Ty>),
    Function(Arc<TyFunction>),
    Union(Arc<[Ty]>),
    MultipleResults(Arc<TyMultipleResults>),
    Alias(Arc<TyAlias>),
    GenericParameter(Arc<TyGenericParameter>),
    Generic(Arc<TyGeneric>),
}

impl Default for Ty {
    fn default() -> Self {
        Ty::Unknown
    }
}

/// Static truthiness of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truthiness {
    True,
    False,
    Unknown,
}

impl Ty {
    pub const BOOLEAN: Ty = Ty::Primitive(TyPrimitiveKind::Boolean);
    pub const NUMBER: Ty = Ty::Primitive(TyPrimitiveKind::Number);
    pub const STRING: Ty = Ty::Primitive(TyPrimitiveKind::String);
    pub const FUNCTION: Ty = Ty::Primitive(TyPrimitiveKind::Function);
    pub const TABLE: Ty = Ty::Primitive(TyPrimitiveKind::Table);

    pub fn boolean(value: bool) -> Ty {
        Ty::Literal(TyPrimitiveKind::Boolean, Arc::from(if value { "true" } else { "false" }))
    }

    pub fn number(value: impl AsRef<str>) -> Ty {
        Ty::Literal(TyPrimitiveKind::Number, Arc::from(value.as_ref()))
    }

    pub fn string(value: impl AsRef<str>) -> Ty {
        Ty::Literal(TyPrimitiveKind::String, Arc::from(value.as_ref()))
    }

    pub fn class(name: impl Into<String>) -> Ty {
        Ty::Class(Arc::new(TyClass {
            name: name.into(),
            var_name: None,
            kind: ClassKind::Doc,
        }))
    }

    /// Type synthesized for a global variable that could not be resolved yet.
    pub fn global(name: &str) -> Ty {
        Ty::Class(Arc::new(TyClass {
            name: format!("${}", name),
            var_name: Some(name.to_string()),
            kind: ClassKind::Global,
        }))
    }

    pub fn g() -> Ty {
        Ty::Class(Arc::new(TyClass {
            name: "_G".to_string(),
            var_name: Some("_G".to_string()),
            kind: ClassKind::G,
        }))
    }

    pub fn self_type() -> Ty {
        Ty::Class(Arc::new(TyClass {
            name: "self".to_string(),
            var_name: None,
            kind: ClassKind::SelfType,
        }))
    }

    pub fn table(node: NodeRef) -> Ty {
        Ty::Table(Arc::new(TyTable {
            node,
            substitution: Vec::new(),
        }))
    }

    pub fn array(base: Ty) -> Ty {
        Ty::Array(Arc::new(base))
    }

    pub fn function(function: TyFunction) -> Ty {
        Ty::Function(Arc::new(function))
    }

    pub fn generic(base: Ty, args: Vec<Ty>) -> Ty {
        Ty::Generic(Arc::new(TyGeneric { base, args }))
    }

    /// Multiple results, flattening nested multi-results.
    pub fn multiple(list: Vec<Ty>, variadic: bool) -> Ty {
        let count = list.len();
        let mut flat = Vec::with_capacity(count);
        let mut variadic = variadic;
        for (i, ty) in list.into_iter().enumerate() {
            match ty {
                Ty::MultipleResults(inner) if i + 1 == count => {
                    flat.extend(inner.list.iter().cloned());
                    variadic = variadic || inner.variadic;
                }
                Ty::MultipleResults(inner) => {
                    flat.push(inner.list.first().cloned().unwrap_or(Ty::Nil));
                }
                ty => flat.push(ty),
            }
        }
        Ty::MultipleResults(Arc::new(TyMultipleResults { list: flat, variadic }))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Ty::Unknown)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Void)
    }

    /// The primitive a literal belongs to; other types are returned unchanged.
    pub fn widen(&self) -> Ty {
        match self {
            Ty::Literal(kind, _) => Ty::Primitive(*kind),
            Ty::Union(list) => Ty::union_all(list.iter().map(Ty::widen)),
            other => other.clone(),
        }
    }

    /// Members of a union, or the type itself.
    pub fn members(&self) -> &[Ty] {
        match self {
            Ty::Union(list) => list,
            other => std::slice::from_ref(other),
        }
    }

    pub fn truthiness(&self) -> Truthiness {
        match self {
            Ty::Literal(TyPrimitiveKind::Boolean, value) => {
                if &**value == "true" {
                    Truthiness::True
                } else {
                    Truthiness::False
                }
            }
            Ty::Nil | Ty::Void => Truthiness::False,
            Ty::Unknown | Ty::Primitive(TyPrimitiveKind::Boolean) => Truthiness::Unknown,
            Ty::GenericParameter(_) | Ty::Alias(_) => Truthiness::Unknown,
            Ty::MultipleResults(multi) => multi
                .list
                .first()
                .map(Ty::truthiness)
                .unwrap_or(Truthiness::False),
            Ty::Union(list) => {
                let mut result = None;
                for member in list.iter() {
                    let t = member.truthiness();
                    match result {
                        None => result = Some(t),
                        Some(prev) if prev != t => return Truthiness::Unknown,
                        _ => {}
                    }
                }
                result.unwrap_or(Truthiness::Unknown)
            }
            _ => Truthiness::True,
        }
    }

    /// Select one value of a multi-value type; `index < 0` keeps all values.
    pub fn get_result(&self, index: i32) -> Ty {
        if index < 0 {
            return self.clone();
        }
        let index = index as usize;
        match self {
            Ty::MultipleResults(multi) => match multi.list.get(index) {
                Some(ty) if !multi.variadic || index + 1 < multi.list.len() => ty.clone(),
                _ if multi.variadic => multi.list.last().cloned().unwrap_or(Ty::Nil),
                _ => Ty::Nil,
            },
            Ty::Union(list) if list.iter().any(|t| matches!(t, Ty::MultipleResults(_))) => {
                Ty::union_all(list.iter().map(|t| t.get_result(index as i32)))
            }
            other if index == 0 => other.clone(),
            _ => Ty::Nil,
        }
    }

    /// Identifier used in index keys (`Class*[<id>]`).
    pub fn key_id(&self) -> String {
        match self {
            Ty::Unknown => "any".to_string(),
            Ty::Void => "void".to_string(),
            Ty::Nil => "nil".to_string(),
            Ty::Primitive(kind) => kind.display_name().to_string(),
            Ty::Literal(TyPrimitiveKind::String, value) => format!("\"{}\"", value),
            Ty::Literal(_, value) => value.to_string(),
            Ty::Class(class) => class.name.clone(),
            Ty::Table(table) => table.class_name(),
            Ty::Alias(alias) => alias.name.clone(),
            Ty::GenericParameter(param) => param.name.clone(),
            Ty::Array(base) => format!("{}[]", base.key_id()),
            Ty::Generic(generic) => {
                let args: Vec<String> = generic.args.iter().map(Ty::key_id).collect();
                format!("{}<{}>", generic.base.key_id(), args.join(","))
            }
            Ty::Union(list) => {
                let parts: Vec<String> = list.iter().map(Ty::key_id).collect();
                parts.join("|")
            }
            Ty::Record(_) => "table".to_string(),
            Ty::Function(_) => "function".to_string(),
            Ty::MultipleResults(multi) => multi
                .list
                .first()
                .map(Ty::key_id)
                .unwrap_or_else(|| "nil".to_string()),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key_id())
    }
}

/// Canonical text of a numeric literal.
pub fn normalize_number(text: &str) -> String {
    let text = text.trim();
    let lower = text.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        if let Ok(value) = i64::from_str_radix(hex, 16) {
            return value.to_string();
        }
        return text.to_string();
    }
    if let Ok(value) = text.parse::<i64>() {
        return value.to_string();
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() != 0.0 => value.to_string(),
        Ok(value) if value.is_finite() => format!("{:.1}", value),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_widens_to_primitive() {
        assert_eq!(Ty::string("hello").widen(), Ty::STRING);
        assert_eq!(Ty::number("3").widen(), Ty::NUMBER);
        assert_eq!(Ty::NUMBER.widen(), Ty::NUMBER);
    }

    #[test]
    fn test_multiple_results_indexing() {
        let multi = Ty::multiple(vec![Ty::NUMBER, Ty::STRING, Ty::BOOLEAN], false);
        assert_eq!(multi.get_result(0), Ty::NUMBER);
        assert_eq!(multi.get_result(1), Ty::STRING);
        assert_eq!(multi.get_result(2), Ty::BOOLEAN);
        assert_eq!(multi.get_result(3), Ty::Nil);
        assert_eq!(multi.get_result(-1), multi);
    }

    #[test]
    fn test_variadic_results_repeat_last() {
        let multi = Ty::multiple(vec![Ty::NUMBER, Ty::STRING], true);
        assert_eq!(multi.get_result(0), Ty::NUMBER);
        assert_eq!(multi.get_result(1), Ty::STRING);
        assert_eq!(multi.get_result(5), Ty::STRING);
    }

    #[test]
    fn test_single_value_indexing() {
        assert_eq!(Ty::NUMBER.get_result(0), Ty::NUMBER);
        assert_eq!(Ty::NUMBER.get_result(1), Ty::Nil);
    }

    #[test]
    fn test_nested_multiple_results_flatten() {
        let inner = Ty::multiple(vec![Ty::STRING, Ty::BOOLEAN], false);
        let outer = Ty::multiple(vec![inner.clone(), Ty::NUMBER, inner], false);
        let Ty::MultipleResults(multi) = outer else {
            panic!("expected multiple results");
        };
        assert_eq!(multi.list, vec![Ty::STRING, Ty::NUMBER, Ty::STRING, Ty::BOOLEAN]);
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(Ty::boolean(true).truthiness(), Truthiness::True);
        assert_eq!(Ty::Nil.truthiness(), Truthiness::False);
        assert_eq!(Ty::BOOLEAN.truthiness(), Truthiness::Unknown);
        assert_eq!(Ty::STRING.truthiness(), Truthiness::True);
        let mixed = Ty::STRING.union(&Ty::Nil);
        assert_eq!(mixed.truthiness(), Truthiness::Unknown);
    }

    #[test]
    fn test_normalize_number() {
        assert_eq!(normalize_number("42"), "42");
        assert_eq!(normalize_number("0x10"), "16");
        assert_eq!(normalize_number("1.5"), "1.5");
        assert_eq!(normalize_number("2.0"), "2.0");
        assert_eq!(normalize_number("1e2"), "100.0");
    }
}
