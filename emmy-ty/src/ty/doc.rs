//! Doc type expressions to [`Ty`].

use std::sync::Arc;

use emmy_parser::{DocFieldKey, DocFun, DocGeneric, DocTy};

use crate::index::find_alias;
use crate::search::SearchContext;

use super::{
    normalize_number, FunParam, FunSignature, FunctionSignatures, RecordKey, Ty, TyFunction,
    TyGenericParameter, TyRecord, TyRecordField,
};

/// Converts doc types inside one generic scope (a function, class or alias).
pub struct DocTyConverter<'c, 'p> {
    ctx: &'c SearchContext<'p>,
    scope: String,
    generics: Vec<TyGenericParameter>,
}

impl<'c, 'p> DocTyConverter<'c, 'p> {
    pub fn new(ctx: &'c SearchContext<'p>, scope: impl Into<String>) -> Self {
        Self {
            ctx,
            scope: scope.into(),
            generics: Vec::new(),
        }
    }

    pub fn with_generics(mut self, generics: impl IntoIterator<Item = TyGenericParameter>) -> Self {
        self.generics.extend(generics);
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Generic parameters visible to this converter, outermost first.
    pub fn generics(&self) -> &[TyGenericParameter] {
        &self.generics
    }

    /// Generic parameters declared in this scope; bounds may use earlier parameters.
    pub fn declare_generics(&self, params: &[DocGeneric]) -> Vec<TyGenericParameter> {
        let mut declared: Vec<TyGenericParameter> = Vec::with_capacity(params.len());
        for param in params {
            let bound = param.bound.as_ref().map(|b| {
                let inner = DocTyConverter {
                    ctx: self.ctx,
                    scope: self.scope.clone(),
                    generics: self.generics.iter().chain(declared.iter()).cloned().collect(),
                };
                inner.ty(b)
            });
            declared.push(TyGenericParameter {
                name: param.name.clone(),
                scope: self.scope.clone(),
                bound,
            });
        }
        declared
    }

    pub fn ty(&self, doc: &DocTy) -> Ty {
        match doc {
            DocTy::Name { name, args } if args.is_empty() => self.named(name),
            DocTy::Name { name, args } => {
                let args = args.iter().map(|a| self.ty(a)).collect();
                let base = if name == "table" { Ty::TABLE } else { self.named(name) };
                Ty::generic(base, args)
            }
            DocTy::Array(inner) => Ty::array(self.ty(inner)),
            DocTy::Union(list) => Ty::union_or_unknown(list.iter().map(|t| self.ty(t))),
            DocTy::Fun(fun) => Ty::function(TyFunction::Doc(Arc::new(FunctionSignatures::single(
                self.fun(fun, false),
            )))),
            DocTy::Table(fields) => {
                let fields = fields
                    .iter()
                    .map(|field| {
                        let key = match &field.key {
                            DocFieldKey::Name(name) => RecordKey::Name(name.clone()),
                            DocFieldKey::Indexer(key) => RecordKey::Indexer(self.ty(key)),
                        };
                        let mut ty = self.ty(&field.ty);
                        if field.optional {
                            ty = ty.union(&Ty::Nil);
                        }
                        TyRecordField { key, ty }
                    })
                    .collect();
                Ty::Record(Arc::new(TyRecord { fields }))
            }
            DocTy::StringLiteral(value) => Ty::string(value),
            DocTy::NumberLiteral(value) => Ty::number(normalize_number(value)),
            DocTy::BooleanLiteral(value) => Ty::boolean(*value),
            DocTy::Multiple { list, variadic } => {
                Ty::multiple(list.iter().map(|t| self.ty(t)).collect(), *variadic)
            }
        }
    }

    pub fn fun(&self, fun: &DocFun, colon_call: bool) -> FunSignature {
        let scope = format!("{}/fun", self.scope);
        let nested = DocTyConverter {
            ctx: self.ctx,
            scope,
            generics: self.generics.clone(),
        };
        let generics = nested.declare_generics(&fun.generics);
        let nested = nested.with_generics(generics.clone());
        FunSignature {
            colon_call,
            params: fun
                .params
                .iter()
                .map(|p| FunParam {
                    name: p.name.clone(),
                    ty: nested.ty(&p.ty),
                    optional: p.optional,
                })
                .collect(),
            vararg: fun.vararg.as_ref().map(|v| nested.ty(v)),
            returns: fun.returns.as_ref().map(|r| nested.ty(r)),
            generics,
        }
    }

    fn named(&self, name: &str) -> Ty {
        match name {
            "nil" => return Ty::Nil,
            "any" | "unknown" => return Ty::Unknown,
            "void" => return Ty::Void,
            "boolean" | "bool" => return Ty::BOOLEAN,
            "number" | "integer" | "float" => return Ty::NUMBER,
            "string" => return Ty::STRING,
            "function" => return Ty::FUNCTION,
            "table" => return Ty::TABLE,
            "self" => return Ty::self_type(),
            "true" => return Ty::boolean(true),
            "false" => return Ty::boolean(false),
            _ => {}
        }
        if let Some(param) = self.generics.iter().rev().find(|g| g.name == name) {
            return Ty::GenericParameter(Arc::new(param.clone()));
        }
        match find_alias(self.ctx, name) {
            Some(alias) => Ty::Alias(alias),
            None => Ty::class(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::settings::LuaSettings;
    use emmy_parser::doc::parse_type;

    fn convert(project: &Project, text: &str) -> Ty {
        let ctx = project.context();
        let doc = parse_type(text).unwrap();
        DocTyConverter::new(&ctx, "test").ty(&doc)
    }

    #[test]
    fn test_builtin_names() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        assert_eq!(convert(&project, "integer"), Ty::NUMBER);
        assert_eq!(convert(&project, "string|nil"), Ty::STRING.union(&Ty::Nil));
        assert_eq!(convert(&project, "string|any"), Ty::Unknown);
        assert_eq!(convert(&project, "Point"), Ty::class("Point"));
    }

    #[test]
    fn test_generic_table_and_array() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        assert_eq!(
            convert(&project, "table<string, number>"),
            Ty::generic(Ty::TABLE, vec![Ty::STRING, Ty::NUMBER])
        );
        assert_eq!(convert(&project, "number[]"), Ty::array(Ty::NUMBER));
    }

    #[test]
    fn test_fun_generics_are_scoped() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let Ty::Function(f) = convert(&project, "fun<T>(x: T): T") else {
            panic!("expected function");
        };
        let TyFunction::Doc(sigs) = &*f else {
            panic!("expected doc function");
        };
        let Ty::GenericParameter(param) = &sigs.main.params[0].ty else {
            panic!("expected generic parameter");
        };
        assert_eq!(param.name, "T");
        assert_eq!(param.scope, "test/fun");
        assert_eq!(sigs.main.returns, Some(sigs.main.params[0].ty.clone()));
    }

    #[test]
    fn test_literal_types() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        assert_eq!(convert(&project, "\"read\""), Ty::string("read"));
        assert_eq!(convert(&project, "0x10"), Ty::number("16"));
    }
}
