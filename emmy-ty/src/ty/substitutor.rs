use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::search::SearchContext;

use super::{
    ClassKind, RecordKey, Ty, TyAlias, TyGeneric, TyGenericParameter, TyMultipleResults, TyRecord,
    TyRecordField, TyTable,
};

/// Rewrites generic placeholders and `self` inside a type.
pub trait TySubstitutor {
    /// Replacement for `ty` itself; `None` descends into its children.
    fn substitute_ty(&self, ctx: &SearchContext, ty: &Ty) -> Option<Ty>;

    /// Bindings recorded on table literals, which are substituted lazily.
    fn bindings(&self) -> Vec<(String, Ty)> {
        Vec::new()
    }
}

/// Binds generic parameters by name.
#[derive(Debug, Clone, Default)]
pub struct TyParameterSubstitutor {
    map: FxHashMap<String, Ty>,
}

impl TyParameterSubstitutor {
    pub fn new(map: FxHashMap<String, Ty>) -> Self {
        Self { map }
    }

    /// Pair declared parameters with arguments; missing arguments fall back to the bound.
    pub fn from_args(params: &[TyGenericParameter], args: &[Ty]) -> Self {
        let map = params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let ty = args
                    .get(i)
                    .cloned()
                    .or_else(|| p.bound.clone())
                    .unwrap_or(Ty::Unknown);
                (p.name.clone(), ty)
            })
            .collect();
        Self { map }
    }

    pub fn from_pairs(pairs: &[(String, Ty)]) -> Self {
        Self {
            map: pairs.iter().cloned().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Ty> {
        self.map.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl TySubstitutor for TyParameterSubstitutor {
    fn substitute_ty(&self, _ctx: &SearchContext, ty: &Ty) -> Option<Ty> {
        match ty {
            Ty::GenericParameter(param) => self.map.get(&param.name).cloned(),
            _ => None,
        }
    }

    fn bindings(&self) -> Vec<(String, Ty)> {
        let mut pairs: Vec<(String, Ty)> = self.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}

/// Replaces `self` with the receiver type of a call.
#[derive(Debug, Clone)]
pub struct TySelfSubstitutor {
    self_ty: Ty,
}

impl TySelfSubstitutor {
    pub fn new(self_ty: Ty) -> Self {
        Self { self_ty }
    }
}

impl TySubstitutor for TySelfSubstitutor {
    fn substitute_ty(&self, _ctx: &SearchContext, ty: &Ty) -> Option<Ty> {
        match ty {
            Ty::Class(class) if class.kind == ClassKind::SelfType => Some(self.self_ty.clone()),
            _ => None,
        }
    }
}

/// Applies several substitutors in order.
#[derive(Default)]
pub struct TyChainSubstitutor {
    list: Vec<Box<dyn TySubstitutor>>,
}

impl TyChainSubstitutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, substitutor: impl TySubstitutor + 'static) {
        self.list.push(Box::new(substitutor));
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl TySubstitutor for TyChainSubstitutor {
    fn substitute_ty(&self, ctx: &SearchContext, ty: &Ty) -> Option<Ty> {
        let mut current: Option<Ty> = None;
        for substitutor in &self.list {
            let input = current.as_ref().unwrap_or(ty);
            if let Some(next) = substitutor.substitute_ty(ctx, input) {
                current = Some(next);
            }
        }
        current
    }

    fn bindings(&self) -> Vec<(String, Ty)> {
        self.list.iter().flat_map(|s| s.bindings()).collect()
    }
}

impl Ty {
    /// Apply `substitutor`; an unchanged type comes back as the same value.
    pub fn substitute(&self, ctx: &SearchContext, substitutor: &dyn TySubstitutor) -> Ty {
        self.substitute_opt(ctx, substitutor).unwrap_or_else(|| self.clone())
    }

    /// Substituted type, or `None` when nothing changed.
    pub fn substitute_opt(&self, ctx: &SearchContext, substitutor: &dyn TySubstitutor) -> Option<Ty> {
        if let Some(replaced) = substitutor.substitute_ty(ctx, self) {
            return (replaced != *self).then_some(replaced);
        }
        match self {
            Ty::Array(base) => base.substitute_opt(ctx, substitutor).map(Ty::array),
            Ty::Union(list) => {
                let replaced = substitute_list(ctx, substitutor, list)?;
                Some(Ty::union_or_unknown(replaced))
            }
            Ty::MultipleResults(multi) => {
                let list = substitute_list(ctx, substitutor, &multi.list)?;
                Some(Ty::MultipleResults(Arc::new(TyMultipleResults {
                    list,
                    variadic: multi.variadic,
                })))
            }
            Ty::Generic(generic) => {
                let base = generic.base.substitute_opt(ctx, substitutor);
                let args = substitute_list(ctx, substitutor, &generic.args);
                if base.is_none() && args.is_none() {
                    return None;
                }
                Some(Ty::Generic(Arc::new(TyGeneric {
                    base: base.unwrap_or_else(|| generic.base.clone()),
                    args: args.unwrap_or_else(|| generic.args.clone()),
                })))
            }
            Ty::Function(function) => function.substitute_opt(ctx, substitutor).map(Ty::function),
            Ty::Record(record) => {
                let mut changed = false;
                let fields = record
                    .fields
                    .iter()
                    .map(|field| {
                        let key = match &field.key {
                            RecordKey::Indexer(key) => match key.substitute_opt(ctx, substitutor) {
                                Some(key) => {
                                    changed = true;
                                    RecordKey::Indexer(key)
                                }
                                None => field.key.clone(),
                            },
                            RecordKey::Name(_) => field.key.clone(),
                        };
                        let ty = match field.ty.substitute_opt(ctx, substitutor) {
                            Some(ty) => {
                                changed = true;
                                ty
                            }
                            None => field.ty.clone(),
                        };
                        TyRecordField { key, ty }
                    })
                    .collect();
                changed.then(|| Ty::Record(Arc::new(TyRecord { fields })))
            }
            Ty::Table(table) => {
                let bindings = substitutor.bindings();
                if bindings.is_empty() {
                    return None;
                }
                let mut substitution = table.substitution.clone();
                for (name, ty) in bindings {
                    match substitution.iter_mut().find(|(n, _)| *n == name) {
                        Some(slot) => slot.1 = ty,
                        None => substitution.push((name, ty)),
                    }
                }
                if substitution == table.substitution {
                    return None;
                }
                Some(Ty::Table(Arc::new(TyTable {
                    node: table.node,
                    substitution,
                })))
            }
            Ty::Alias(alias) => {
                let ty = alias.ty.substitute_opt(ctx, substitutor)?;
                Some(Ty::Alias(Arc::new(TyAlias {
                    name: alias.name.clone(),
                    params: alias.params.clone(),
                    ty,
                })))
            }
            Ty::Unknown
            | Ty::Void
            | Ty::Nil
            | Ty::Primitive(_)
            | Ty::Literal(..)
            | Ty::Class(_)
            | Ty::GenericParameter(_) => None,
        }
    }
}

fn substitute_list(ctx: &SearchContext, substitutor: &dyn TySubstitutor, list: &[Ty]) -> Option<Vec<Ty>> {
    let replaced: Vec<Option<Ty>> = list.iter().map(|t| t.substitute_opt(ctx, substitutor)).collect();
    if replaced.iter().all(Option::is_none) {
        return None;
    }
    Some(
        replaced
            .into_iter()
            .zip(list.iter())
            .map(|(new, old)| new.unwrap_or_else(|| old.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::settings::LuaSettings;

    fn param(name: &str) -> Ty {
        Ty::GenericParameter(Arc::new(TyGenericParameter {
            name: name.to_string(),
            scope: "test".to_string(),
            bound: None,
        }))
    }

    #[test]
    fn test_parameter_substitution() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let mut map = FxHashMap::default();
        map.insert("T".to_string(), Ty::NUMBER);
        let subst = TyParameterSubstitutor::new(map);

        assert_eq!(Ty::array(param("T")).substitute(&ctx, &subst), Ty::array(Ty::NUMBER));
        let union = param("T").union(&Ty::Nil);
        assert_eq!(union.substitute(&ctx, &subst), Ty::NUMBER.union(&Ty::Nil));
    }

    #[test]
    fn test_unchanged_type_is_identical() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let subst = TyParameterSubstitutor::default();
        let ty = Ty::array(Ty::STRING);
        assert!(ty.substitute_opt(&ctx, &subst).is_none());
        let Ty::Array(before) = &ty else { unreachable!() };
        let after = ty.substitute(&ctx, &subst);
        let Ty::Array(after) = &after else { unreachable!() };
        assert!(Arc::ptr_eq(before, after));
    }

    #[test]
    fn test_chain_applies_in_order() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let mut chain = TyChainSubstitutor::new();
        chain.push(TySelfSubstitutor::new(Ty::class("Point")));
        let mut map = FxHashMap::default();
        map.insert("T".to_string(), Ty::STRING);
        chain.push(TyParameterSubstitutor::new(map));

        let ty = Ty::multiple(vec![Ty::self_type(), param("T")], false);
        assert_eq!(
            ty.substitute(&ctx, &chain),
            Ty::multiple(vec![Ty::class("Point"), Ty::STRING], false)
        );
    }
}
