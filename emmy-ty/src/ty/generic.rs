use rustc_hash::FxHashMap;

use crate::infer::members_of;
use crate::search::SearchContext;

use super::{RecordKey, Ty, TyGenericParameter, TyParameterSubstitutor};

/// Infers generic parameter bindings by matching declared parameter types
/// against argument types.
pub struct GenericAnalyzer<'a> {
    params: &'a [TyGenericParameter],
    map: FxHashMap<String, Ty>,
}

impl<'a> GenericAnalyzer<'a> {
    pub fn new(params: &'a [TyGenericParameter]) -> Self {
        Self {
            params,
            map: FxHashMap::default(),
        }
    }

    fn is_param(&self, param: &TyGenericParameter) -> bool {
        self.params
            .iter()
            .any(|p| p.name == param.name && p.scope == param.scope)
    }

    fn bind(&mut self, name: &str, ty: &Ty) {
        let ty = ty.widen();
        let merged = match self.map.get(name) {
            Some(prev) => prev.union(&ty),
            None => ty,
        };
        self.map.insert(name.to_string(), merged);
    }

    pub fn analyze(&mut self, ctx: &SearchContext, param_ty: &Ty, arg_ty: &Ty) {
        match param_ty {
            Ty::GenericParameter(param) if self.is_param(param) => {
                if !matches!(arg_ty, Ty::Void) {
                    self.bind(&param.name, arg_ty);
                }
            }
            Ty::Array(base) => match arg_ty {
                Ty::Array(arg_base) => self.analyze(ctx, base, arg_base),
                Ty::Generic(generic) if generic.base == Ty::TABLE && generic.args.len() == 2 => {
                    self.analyze(ctx, base, &generic.args[1]);
                }
                Ty::Table(_) => {
                    let values = Ty::union_all(
                        members_of(ctx, arg_ty)
                            .into_iter()
                            .filter(|(key, _)| is_positional_key(key))
                            .map(|(_, ty)| ty),
                    );
                    if !values.is_void() {
                        self.analyze(ctx, base, &values);
                    }
                }
                _ => {}
            },
            Ty::Generic(generic) => match arg_ty {
                Ty::Generic(arg) if arg.args.len() == generic.args.len() => {
                    for (p, a) in generic.args.iter().zip(arg.args.iter()) {
                        self.analyze(ctx, p, a);
                    }
                }
                Ty::Array(base) if generic.base == Ty::TABLE && generic.args.len() == 2 => {
                    self.analyze(ctx, &generic.args[0], &Ty::NUMBER);
                    self.analyze(ctx, &generic.args[1], base);
                }
                Ty::Table(_) | Ty::Record(_) if generic.base == Ty::TABLE && generic.args.len() == 2 => {
                    let mut keys = Vec::new();
                    let mut values = Vec::new();
                    for (key, ty) in members_of(ctx, arg_ty) {
                        keys.push(key_type(&key));
                        values.push(ty);
                    }
                    if !keys.is_empty() {
                        self.analyze(ctx, &generic.args[0], &Ty::union_or_unknown(keys));
                        self.analyze(ctx, &generic.args[1], &Ty::union_or_unknown(values));
                    }
                }
                _ => {}
            },
            Ty::Union(list) => {
                for member in list.iter() {
                    if let Ty::GenericParameter(_) = member {
                        let narrowed = arg_ty.filter_members(|a| !list.contains(a));
                        self.analyze(ctx, member, &narrowed);
                    } else {
                        self.analyze(ctx, member, arg_ty);
                    }
                }
            }
            Ty::Function(function) => {
                let Ty::Function(arg_function) = arg_ty else {
                    return;
                };
                let own = function.main_signature(ctx);
                let theirs = arg_function.main_signature(ctx);
                for (p, a) in own.dot_params().iter().zip(theirs.dot_params().iter()) {
                    self.analyze(ctx, &p.ty, &a.ty);
                }
                if let (Some(p), Some(a)) = (&own.returns, &theirs.returns) {
                    self.analyze(ctx, p, a);
                }
            }
            Ty::Record(record) => {
                let arg_members = members_of(ctx, arg_ty);
                for field in &record.fields {
                    let RecordKey::Name(name) = &field.key else {
                        continue;
                    };
                    if let Some((_, ty)) = arg_members.iter().find(|(key, _)| key == name) {
                        self.analyze(ctx, &field.ty, ty);
                    }
                }
            }
            _ => {}
        }
    }

    /// Bindings; unconstrained parameters fall back to their bound.
    pub fn finish(mut self) -> TyParameterSubstitutor {
        for param in self.params {
            if self.map.contains_key(&param.name) {
                continue;
            }
            if let Some(bound) = &param.bound {
                self.map.insert(param.name.clone(), bound.clone());
            }
        }
        TyParameterSubstitutor::new(self.map)
    }
}

fn is_positional_key(key: &str) -> bool {
    key.strip_prefix('[')
        .and_then(|k| k.strip_suffix(']'))
        .is_some_and(|k| k == "number" || k.parse::<f64>().is_ok())
}

/// Type of a rendered member key: `name`, `[1]`, `["s"]` or `[T]`.
fn key_type(key: &str) -> Ty {
    let Some(inner) = key.strip_prefix('[').and_then(|k| k.strip_suffix(']')) else {
        return Ty::STRING;
    };
    if inner.parse::<f64>().is_ok() || inner == "number" {
        Ty::NUMBER
    } else {
        Ty::STRING
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::project::Project;
    use crate::settings::LuaSettings;
    use crate::ty::TySubstitutor;

    fn generic(name: &str, bound: Option<Ty>) -> TyGenericParameter {
        TyGenericParameter {
            name: name.to_string(),
            scope: "fn".to_string(),
            bound,
        }
    }

    #[test]
    fn test_binds_direct_and_array_parameters() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let params = vec![generic("T", None), generic("U", None)];
        let t = Ty::GenericParameter(Arc::new(params[0].clone()));
        let u = Ty::GenericParameter(Arc::new(params[1].clone()));

        let mut analyzer = GenericAnalyzer::new(&params);
        analyzer.analyze(&ctx, &t, &Ty::number("1"));
        analyzer.analyze(&ctx, &Ty::array(u.clone()), &Ty::array(Ty::STRING));
        let subst = analyzer.finish();
        assert_eq!(subst.substitute_ty(&ctx, &t), Some(Ty::NUMBER));
        assert_eq!(subst.substitute_ty(&ctx, &u), Some(Ty::STRING));
    }

    #[test]
    fn test_unconstrained_parameter_uses_bound() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let params = vec![generic("T", Some(Ty::class("Base")))];
        let t = Ty::GenericParameter(Arc::new(params[0].clone()));
        let subst = GenericAnalyzer::new(&params).finish();
        assert_eq!(subst.substitute_ty(&ctx, &t), Some(Ty::class("Base")));
    }

    #[test]
    fn test_foreign_parameter_is_ignored() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let params = vec![generic("T", None)];
        let other = Ty::GenericParameter(Arc::new(TyGenericParameter {
            name: "T".to_string(),
            scope: "elsewhere".to_string(),
            bound: None,
        }));
        let mut analyzer = GenericAnalyzer::new(&params);
        analyzer.analyze(&ctx, &other, &Ty::NUMBER);
        assert!(analyzer.finish().is_empty());
    }

    #[test]
    fn test_key_helpers() {
        assert!(is_positional_key("[1]"));
        assert!(is_positional_key("[number]"));
        assert!(!is_positional_key("name"));
        assert_eq!(key_type("name"), Ty::STRING);
        assert_eq!(key_type("[2]"), Ty::NUMBER);
    }
}
