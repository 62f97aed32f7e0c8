use bitflags::bitflags;
use rustc_hash::FxHashSet;

use crate::index::{find_alias, find_class};
use crate::search::SearchContext;

use super::{ClassKind, Ty, TyFunction, TyParameterSubstitutor, TyPrimitiveKind};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TyVarianceFlags: u8 {
        /// `unknown` is not assignable to everything
        const STRICT_UNKNOWN = 1 << 0;
        /// `nil` is only assignable to types containing `nil`
        const STRICT_NIL = 1 << 1;
    }
}

impl Ty {
    /// Resolve aliases, named or applied, to their targets.
    pub fn resolve(&self, ctx: &SearchContext) -> Ty {
        match self {
            Ty::Alias(alias) => {
                let Some(_guard) = ctx.enter_alias(&alias.name) else {
                    return Ty::Unknown;
                };
                alias.ty.resolve(ctx)
            }
            Ty::Class(class) if class.kind == ClassKind::Doc => match find_alias(ctx, &class.name) {
                Some(alias) => Ty::Alias(alias).resolve(ctx),
                None => self.clone(),
            },
            Ty::Generic(generic) => {
                let alias = match &generic.base {
                    Ty::Alias(alias) => Some(alias.clone()),
                    Ty::Class(class) if class.kind == ClassKind::Doc => find_alias(ctx, &class.name),
                    _ => None,
                };
                let Some(alias) = alias else {
                    return self.clone();
                };
                let Some(_guard) = ctx.enter_alias(&alias.name) else {
                    return Ty::Unknown;
                };
                let substitutor = TyParameterSubstitutor::from_args(&alias.params, &generic.args);
                alias.ty.substitute(ctx, &substitutor).resolve(ctx)
            }
            _ => self.clone(),
        }
    }

    /// Union members with aliases resolved, flattened and deduplicated.
    pub fn resolved_members(&self, ctx: &SearchContext) -> Vec<Ty> {
        let mut out = Vec::new();
        collect_resolved(ctx, self, &mut out, 0);
        out
    }

    /// Direct super types: class supers, generic bounds.
    pub fn super_types(&self, ctx: &SearchContext) -> Vec<Ty> {
        match self {
            Ty::Class(class) if class.kind == ClassKind::Doc => find_class(ctx, &class.name)
                .map(|decl| decl.supers)
                .unwrap_or_default(),
            Ty::Generic(generic) => {
                let Ty::Class(class) = &generic.base else {
                    return Vec::new();
                };
                let Some(decl) = find_class(ctx, &class.name) else {
                    return Vec::new();
                };
                let substitutor = TyParameterSubstitutor::from_args(&decl.generics, &generic.args);
                decl.supers.iter().map(|s| s.substitute(ctx, &substitutor)).collect()
            }
            Ty::GenericParameter(param) => param.bound.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Whether a value of type `other` may be used where `self` is expected.
    pub fn contravariant_of(&self, ctx: &SearchContext, other: &Ty, flags: TyVarianceFlags) -> bool {
        if self == other {
            return true;
        }
        let target = self.resolve(ctx);
        let other = other.resolve(ctx);
        if target == other {
            return true;
        }
        match (&target, &other) {
            (Ty::Unknown, _) => true,
            (_, Ty::Unknown) => !flags.contains(TyVarianceFlags::STRICT_UNKNOWN),
            (_, Ty::Union(list)) => list.iter().all(|m| target.contravariant_of(ctx, m, flags)),
            (Ty::Union(list), _) => list.iter().any(|m| m.contravariant_of(ctx, &other, flags)),
            (_, Ty::Nil | Ty::Void) => {
                !flags.contains(TyVarianceFlags::STRICT_NIL) && !ctx.settings().nil_strict
            }
            (_, Ty::MultipleResults(multi)) => {
                let first = multi.list.first().cloned().unwrap_or(Ty::Nil);
                target.contravariant_of(ctx, &first, flags)
            }
            (Ty::MultipleResults(multi), _) => {
                let first = multi.list.first().cloned().unwrap_or(Ty::Nil);
                first.contravariant_of(ctx, &other, flags)
            }
            (Ty::Primitive(kind), Ty::Literal(other_kind, _)) => kind == other_kind,
            (Ty::Primitive(TyPrimitiveKind::Table), o) => matches!(
                o,
                Ty::Table(_) | Ty::Class(_) | Ty::Array(_) | Ty::Record(_) | Ty::Generic(_)
            ),
            (Ty::Primitive(TyPrimitiveKind::Function), Ty::Function(_)) => true,
            (Ty::Function(function), Ty::Primitive(TyPrimitiveKind::Function)) => {
                function.main_signature(ctx).is_unknown_variadic()
            }
            (Ty::Function(own), Ty::Function(theirs)) => function_contravariant(ctx, own, theirs, flags),
            (Ty::Array(base), Ty::Array(other_base)) => base.contravariant_of(ctx, other_base, flags),
            (Ty::Array(_), Ty::Table(_) | Ty::Primitive(TyPrimitiveKind::Table)) => true,
            (Ty::Class(own), Ty::Class(theirs)) => {
                if own.kind == ClassKind::Doc && theirs.kind == ClassKind::Doc {
                    is_subclass(ctx, &theirs.name, &own.name)
                } else {
                    own.name == theirs.name
                }
            }
            (Ty::Class(_), Ty::Generic(generic)) => target.contravariant_of(ctx, &generic.base, flags),
            (Ty::Class(_) | Ty::Record(_), Ty::Table(_)) => true,
            (Ty::Generic(own), Ty::Generic(theirs)) => {
                own.base.contravariant_of(ctx, &theirs.base, flags)
                    && own.args.len() == theirs.args.len()
                    && own
                        .args
                        .iter()
                        .zip(theirs.args.iter())
                        .all(|(a, b)| a.contravariant_of(ctx, b, flags))
            }
            (Ty::Generic(own), Ty::Array(base)) if own.base == Ty::TABLE && own.args.len() == 2 => {
                own.args[0].contravariant_of(ctx, &Ty::NUMBER, flags)
                    && own.args[1].contravariant_of(ctx, base, flags)
            }
            (Ty::Generic(own), Ty::Table(_) | Ty::Record(_)) => own.base == Ty::TABLE,
            (Ty::Generic(own), Ty::Class(_)) => own.base.contravariant_of(ctx, &other, flags),
            (Ty::GenericParameter(param), _) => {
                if ctx.is_abstract_generic_scope(&param.scope) {
                    return false;
                }
                match &param.bound {
                    Some(bound) => bound.contravariant_of(ctx, &other, flags),
                    None => true,
                }
            }
            (_, Ty::GenericParameter(param)) => match &param.bound {
                Some(bound) => target.contravariant_of(ctx, bound, flags),
                None => !flags.contains(TyVarianceFlags::STRICT_UNKNOWN),
            },
            _ => false,
        }
    }

    /// Equality modulo aliases and union member order.
    pub fn equals(&self, ctx: &SearchContext, other: &Ty, _flags: TyVarianceFlags) -> bool {
        if self == other {
            return true;
        }
        let a = self.resolved_members(ctx);
        let b = other.resolved_members(ctx);
        a.len() == b.len() && a.iter().all(|t| b.contains(t))
    }
}

fn collect_resolved(ctx: &SearchContext, ty: &Ty, out: &mut Vec<Ty>, depth: usize) {
    for member in ty.members() {
        let resolved = member.resolve(ctx);
        if matches!(resolved, Ty::Union(_)) && depth < 8 {
            collect_resolved(ctx, &resolved, out, depth + 1);
        } else if !out.contains(&resolved) {
            out.push(resolved);
        }
    }
}

/// Whether class `sub` is `sup` or inherits from it.
fn is_subclass(ctx: &SearchContext, sub: &str, sup: &str) -> bool {
    let mut visited = FxHashSet::default();
    let mut pending = vec![sub.to_string()];
    while let Some(name) = pending.pop() {
        if name == sup {
            return true;
        }
        if !visited.insert(name.clone()) {
            continue;
        }
        let Some(decl) = find_class(ctx, &name) else {
            continue;
        };
        for super_ty in decl.supers {
            match super_ty {
                Ty::Class(class) => pending.push(class.name.clone()),
                Ty::Generic(generic) => {
                    if let Ty::Class(class) = &generic.base {
                        pending.push(class.name.clone());
                    }
                }
                _ => {}
            }
        }
    }
    false
}

fn function_contravariant(
    ctx: &SearchContext,
    own: &TyFunction,
    theirs: &TyFunction,
    flags: TyVarianceFlags,
) -> bool {
    let own = own.signatures(ctx);
    let theirs = theirs.signatures(ctx);
    let scopes: Vec<String> = own
        .iter()
        .chain(theirs.iter())
        .filter_map(|s| s.generic_scope().map(str::to_string))
        .collect();
    ctx.with_abstract_generic_scope_names(scopes, |ctx| {
        own.iter()
            .any(|o| theirs.iter().any(|t| o.contravariant_of(ctx, t, flags)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::settings::LuaSettings;

    #[test]
    fn test_reflexive() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let samples = vec![
            Ty::Unknown,
            Ty::Nil,
            Ty::NUMBER,
            Ty::string("x"),
            Ty::class("Point"),
            Ty::array(Ty::BOOLEAN),
            Ty::NUMBER.union(&Ty::Nil),
            Ty::multiple(vec![Ty::NUMBER, Ty::STRING], true),
            Ty::generic(Ty::TABLE, vec![Ty::STRING, Ty::NUMBER]),
        ];
        for ty in samples {
            assert!(ty.contravariant_of(&ctx, &ty, TyVarianceFlags::empty()), "{}", ty);
            assert!(ty.contravariant_of(&ctx, &ty, TyVarianceFlags::all()), "{}", ty);
        }
    }

    #[test]
    fn test_primitive_accepts_literal() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        assert!(Ty::NUMBER.contravariant_of(&ctx, &Ty::number("3"), TyVarianceFlags::empty()));
        assert!(!Ty::number("3").contravariant_of(&ctx, &Ty::NUMBER, TyVarianceFlags::empty()));
        assert!(!Ty::STRING.contravariant_of(&ctx, &Ty::NUMBER, TyVarianceFlags::empty()));
    }

    #[test]
    fn test_nil_strictness() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        assert!(Ty::NUMBER.contravariant_of(&ctx, &Ty::Nil, TyVarianceFlags::empty()));
        assert!(!Ty::NUMBER.contravariant_of(&ctx, &Ty::Nil, TyVarianceFlags::STRICT_NIL));
        let optional = Ty::NUMBER.union(&Ty::Nil);
        assert!(optional.contravariant_of(&ctx, &Ty::Nil, TyVarianceFlags::STRICT_NIL));
    }

    #[test]
    fn test_union_target_and_source() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let target = Ty::NUMBER.union(&Ty::STRING);
        assert!(target.contravariant_of(&ctx, &Ty::string("a"), TyVarianceFlags::empty()));
        assert!(!Ty::NUMBER.contravariant_of(&ctx, &target, TyVarianceFlags::empty()));
    }

    #[test]
    fn test_unknown_strictness() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        assert!(Ty::NUMBER.contravariant_of(&ctx, &Ty::Unknown, TyVarianceFlags::empty()));
        assert!(!Ty::NUMBER.contravariant_of(&ctx, &Ty::Unknown, TyVarianceFlags::STRICT_UNKNOWN));
    }

    #[test]
    fn test_equals_ignores_union_order() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let a = Ty::NUMBER.union(&Ty::STRING);
        let b = Ty::STRING.union(&Ty::NUMBER);
        assert_ne!(a, b);
        assert!(a.equals(&ctx, &b, TyVarianceFlags::empty()));
    }
}
