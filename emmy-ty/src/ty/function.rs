use std::sync::Arc;

use emmy_parser::NodeRef;

use crate::infer::psi_signatures;
use crate::search::SearchContext;

use super::{Ty, TyGenericParameter, TySubstitutor, TyVarianceFlags};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunParam {
    pub name: String,
    pub ty: Ty,
    pub optional: bool,
}

impl FunParam {
    fn implicit_self() -> Self {
        FunParam {
            name: "self".to_string(),
            ty: Ty::Unknown,
            optional: false,
        }
    }
}

/// One callable shape of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunSignature {
    /// Declared with `:`, taking an implicit `self`
    pub colon_call: bool,
    pub params: Vec<FunParam>,
    pub vararg: Option<Ty>,
    pub returns: Option<Ty>,
    pub generics: Vec<TyGenericParameter>,
}

impl FunSignature {
    /// `fun(...: any): any...`, the signature of the bare `function` type.
    pub fn unknown_variadic() -> Self {
        FunSignature {
            colon_call: false,
            params: Vec::new(),
            vararg: Some(Ty::Unknown),
            returns: Some(Ty::multiple(vec![Ty::Unknown], true)),
            generics: Vec::new(),
        }
    }

    pub fn is_unknown_variadic(&self) -> bool {
        self.params.is_empty()
            && self.vararg.as_ref().is_some_and(Ty::is_unknown)
            && match &self.returns {
                None => true,
                Some(Ty::MultipleResults(multi)) => {
                    multi.variadic && multi.list.iter().all(Ty::is_unknown)
                }
                Some(other) => other.is_unknown(),
            }
    }

    /// Parameters as a call of the given style sees them.
    ///
    /// A dot call of a colon signature passes `self` explicitly, a colon
    /// call of a dot signature binds the first parameter to the prefix.
    pub fn process_parameters(&self, call_colon: bool, mut f: impl FnMut(usize, &FunParam) -> bool) {
        let implicit = FunParam::implicit_self();
        let params: Box<dyn Iterator<Item = &FunParam>> = match (call_colon, self.colon_call) {
            (false, true) => Box::new(std::iter::once(&implicit).chain(self.params.iter())),
            (true, false) => Box::new(self.params.iter().skip(1)),
            _ => Box::new(self.params.iter()),
        };
        for (i, param) in params.enumerate() {
            if !f(i, param) {
                break;
            }
        }
    }

    /// Parameters in dot-call form, with `self` made explicit.
    pub fn dot_params(&self) -> Vec<FunParam> {
        let mut params = Vec::with_capacity(self.params.len() + 1);
        self.process_parameters(false, |_, p| {
            params.push(p.clone());
            true
        });
        params
    }

    pub fn generic_scope(&self) -> Option<&str> {
        self.generics.first().map(|g| g.scope.as_str())
    }

    /// Whether a call passing `args` (dot-call form) fits this signature.
    pub fn matches_call(&self, ctx: &SearchContext, args: &[Ty], flags: TyVarianceFlags) -> bool {
        let params = self.dot_params();
        for (i, param) in params.iter().enumerate() {
            match args.get(i) {
                Some(arg) => {
                    if !param.ty.contravariant_of(ctx, arg, flags) {
                        return false;
                    }
                }
                None => {
                    if !param.optional && !param.ty.contravariant_of(ctx, &Ty::Nil, flags) {
                        return false;
                    }
                }
            }
        }
        if args.len() > params.len() {
            let Some(vararg) = &self.vararg else {
                return false;
            };
            return args[params.len()..]
                .iter()
                .all(|arg| vararg.contravariant_of(ctx, arg, flags));
        }
        true
    }

    /// Whether a function with signature `other` may be used where `self` is expected.
    pub fn contravariant_of(&self, ctx: &SearchContext, other: &FunSignature, flags: TyVarianceFlags) -> bool {
        let own = self.dot_params();
        for (i, other_param) in other.dot_params().iter().enumerate() {
            let Some(own_param) = own.get(i) else {
                if other_param.optional {
                    break;
                }
                match &self.vararg {
                    Some(vararg) if other_param.ty.contravariant_of(ctx, vararg, flags) => continue,
                    _ => return false,
                }
            };
            if own_param.optional
                && !other_param.optional
                && !other_param.ty.is_unknown()
                && !other_param.ty.contravariant_of(ctx, &Ty::Nil, flags | TyVarianceFlags::STRICT_NIL)
            {
                return false;
            }
            if !other_param.ty.contravariant_of(ctx, &own_param.ty, flags) {
                return false;
            }
        }
        match (&self.returns, &other.returns) {
            (None, _) | (Some(Ty::Void), _) => true,
            (Some(_), None) => false,
            (Some(own), Some(Ty::Void)) => own.contravariant_of(ctx, &Ty::Nil, flags),
            (Some(own), Some(theirs)) => own.contravariant_of(ctx, theirs, flags),
        }
    }

    /// Substituted copy, or `None` when nothing changed.
    pub fn substitute_opt(&self, ctx: &SearchContext, substitutor: &dyn TySubstitutor) -> Option<FunSignature> {
        let mut changed = false;
        let params = self
            .params
            .iter()
            .map(|p| match p.ty.substitute_opt(ctx, substitutor) {
                Some(ty) => {
                    changed = true;
                    FunParam { ty, ..p.clone() }
                }
                None => p.clone(),
            })
            .collect();
        let mut subst = |ty: &Option<Ty>| -> Option<Ty> {
            let ty = ty.as_ref()?;
            match ty.substitute_opt(ctx, substitutor) {
                Some(new) => {
                    changed = true;
                    Some(new)
                }
                None => Some(ty.clone()),
            }
        };
        let vararg = subst(&self.vararg);
        let returns = subst(&self.returns);
        changed.then(|| FunSignature {
            colon_call: self.colon_call,
            params,
            vararg,
            returns,
            generics: self.generics.clone(),
        })
    }
}

/// Main signature plus overloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignatures {
    pub main: FunSignature,
    pub overloads: Vec<FunSignature>,
}

impl FunctionSignatures {
    pub fn single(main: FunSignature) -> Self {
        Self {
            main,
            overloads: Vec::new(),
        }
    }

    /// Overloads first, then the main signature.
    pub fn iter(&self) -> impl Iterator<Item = &FunSignature> {
        self.overloads.iter().chain(std::iter::once(&self.main))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TyFunction {
    /// Function defined in source; signatures are derived from its body and docs
    Psi { node: NodeRef, colon: bool },
    /// Function written as a doc type, or a substituted source function
    Doc(Arc<FunctionSignatures>),
}

impl TyFunction {
    pub fn signatures(&self, ctx: &SearchContext) -> Arc<FunctionSignatures> {
        match self {
            TyFunction::Psi { node, colon } => psi_signatures(ctx, *node, *colon),
            TyFunction::Doc(signatures) => signatures.clone(),
        }
    }

    pub fn main_signature(&self, ctx: &SearchContext) -> FunSignature {
        self.signatures(ctx).main.clone()
    }

    /// Visit overloads then the main signature until `f` returns `false`.
    pub fn process_signatures(&self, ctx: &SearchContext, mut f: impl FnMut(&FunSignature) -> bool) -> bool {
        let signatures = self.signatures(ctx);
        for signature in signatures.iter() {
            if !f(signature) {
                return false;
            }
        }
        true
    }

    pub fn substitute_opt(&self, ctx: &SearchContext, substitutor: &dyn TySubstitutor) -> Option<TyFunction> {
        let signatures = self.signatures(ctx);
        let main = signatures.main.substitute_opt(ctx, substitutor);
        let overloads: Vec<Option<FunSignature>> = signatures
            .overloads
            .iter()
            .map(|o| o.substitute_opt(ctx, substitutor))
            .collect();
        if main.is_none() && overloads.iter().all(Option::is_none) {
            return None;
        }
        Some(TyFunction::Doc(Arc::new(FunctionSignatures {
            main: main.unwrap_or_else(|| signatures.main.clone()),
            overloads: overloads
                .into_iter()
                .zip(signatures.overloads.iter())
                .map(|(new, old)| new.unwrap_or_else(|| old.clone()))
                .collect(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::settings::LuaSettings;

    fn param(name: &str, ty: Ty, optional: bool) -> FunParam {
        FunParam {
            name: name.to_string(),
            ty,
            optional,
        }
    }

    fn sig(params: Vec<FunParam>, returns: Option<Ty>) -> FunSignature {
        FunSignature {
            colon_call: false,
            params,
            vararg: None,
            returns,
            generics: Vec::new(),
        }
    }

    #[test]
    fn test_process_parameters_adjusts_for_call_style() {
        let mut method = sig(vec![param("x", Ty::NUMBER, false)], None);
        method.colon_call = true;
        let mut names = Vec::new();
        method.process_parameters(false, |_, p| {
            names.push(p.name.clone());
            true
        });
        assert_eq!(names, vec!["self", "x"]);

        let plain = sig(vec![param("this", Ty::Unknown, false), param("x", Ty::NUMBER, false)], None);
        let mut names = Vec::new();
        plain.process_parameters(true, |_, p| {
            names.push(p.name.clone());
            true
        });
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn test_optional_parameter_accepts_shorter_call() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let f = sig(
            vec![param("a", Ty::NUMBER, false), param("b", Ty::STRING, true)],
            None,
        );
        assert!(f.matches_call(&ctx, &[Ty::NUMBER], TyVarianceFlags::empty()));
        assert!(f.matches_call(&ctx, &[Ty::number("1"), Ty::string("x")], TyVarianceFlags::empty()));
        assert!(!f.matches_call(&ctx, &[Ty::STRING], TyVarianceFlags::empty()));
        assert!(!f.matches_call(&ctx, &[Ty::NUMBER, Ty::STRING, Ty::STRING], TyVarianceFlags::empty()));
    }

    #[test]
    fn test_signature_contravariance() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let ctx = project.context();
        let long = sig(
            vec![param("a", Ty::NUMBER, false), param("b", Ty::STRING, true)],
            Some(Ty::NUMBER),
        );
        let short = sig(vec![param("a", Ty::NUMBER, false)], Some(Ty::NUMBER));
        assert!(long.contravariant_of(&ctx, &short, TyVarianceFlags::empty()));
        assert!(short.contravariant_of(&ctx, &long, TyVarianceFlags::empty()));

        let needs_more = sig(
            vec![param("a", Ty::NUMBER, false), param("c", Ty::BOOLEAN, false)],
            Some(Ty::NUMBER),
        );
        assert!(!short.contravariant_of(&ctx, &needs_more, TyVarianceFlags::empty()));

        let returns_string = sig(vec![param("a", Ty::NUMBER, false)], Some(Ty::STRING));
        assert!(!long.contravariant_of(&ctx, &returns_string, TyVarianceFlags::empty()));
    }

    #[test]
    fn test_unknown_variadic() {
        assert!(FunSignature::unknown_variadic().is_unknown_variadic());
        assert!(!sig(Vec::new(), None).is_unknown_variadic());
    }
}
