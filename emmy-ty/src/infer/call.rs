//! Call expressions and `require`.

use emmy_parser::{LiteralKind, NodeId, NodeKind};

use crate::project::LuaFile;
use crate::search::SearchContext;
use crate::ty::{
    FunSignature, GenericAnalyzer, Ty, TyChainSubstitutor, TyPrimitiveKind, TySelfSubstitutor,
    TyVarianceFlags,
};

use super::infer;

pub(super) fn infer_call(ctx: &SearchContext, file: &LuaFile, callee: NodeId, args: &[NodeId]) -> Option<Ty> {
    let tree = &file.tree;
    if let Some(name) = tree.name(callee) {
        if !ctx.is_dumb() && ctx.settings().is_require_like_function_name(name) && !is_local(file, callee) {
            return require_argument(ctx, file, args).and_then(|module| require(ctx, &module));
        }
    }

    let callee_ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(callee)))?;
    let (self_ty, colon) = match tree.kind(callee) {
        NodeKind::Index { prefix, colon, .. } => {
            let prefix_ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(*prefix)));
            (prefix_ty, *colon)
        }
        _ => (None, false),
    };

    let mut result = Ty::Void;
    for member in callee_ty.resolved_members(ctx) {
        let returns = match &member {
            Ty::Primitive(TyPrimitiveKind::Function) => Some(Ty::multiple(vec![Ty::Unknown], true)),
            Ty::Unknown => ctx.settings().unknown_callable.then_some(Ty::Unknown),
            Ty::Function(function) => {
                let arg_tys = call_arguments(ctx, file, args, colon, self_ty.as_ref());
                let signatures = function.signatures(ctx);
                let flags = TyVarianceFlags::empty();
                let signature = signatures
                    .iter()
                    .find(|s| s.matches_call(ctx, &arg_tys, flags))
                    .unwrap_or(&signatures.main);
                signature.returns.as_ref().map(|returns| {
                    let substitutor = create_substitutor(ctx, signature, &arg_tys, self_ty.as_ref());
                    returns.substitute(ctx, &substitutor)
                })
            }
            _ => None,
        };
        if let Some(returns) = returns {
            result = result.union(&returns);
        }
    }
    (!result.is_void()).then_some(result)
}

fn is_local(file: &LuaFile, name: NodeId) -> bool {
    matches!(
        file.decls.resolve(name),
        Some(emmy_parser::Resolution::Local(_))
    )
}

/// Argument types in dot-call form; the last argument spreads its results.
fn call_arguments(
    ctx: &SearchContext,
    file: &LuaFile,
    args: &[NodeId],
    colon: bool,
    self_ty: Option<&Ty>,
) -> Vec<Ty> {
    let mut out = Vec::with_capacity(args.len() + 1);
    if colon {
        out.push(self_ty.cloned().unwrap_or(Ty::Unknown));
    }
    for (i, &arg) in args.iter().enumerate() {
        if i + 1 == args.len() {
            let ty = ctx.with_multiple_results(|ctx| infer(ctx, file.node(arg)));
            match ty {
                Some(Ty::MultipleResults(multi)) => out.extend(multi.list.iter().cloned()),
                Some(ty) => out.push(ty),
                None => out.push(Ty::Unknown),
            }
        } else {
            let ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(arg)));
            out.push(ty.unwrap_or(Ty::Unknown));
        }
    }
    out
}

/// Binds `self` and the signature's generic parameters from the call arguments.
pub fn create_substitutor(
    ctx: &SearchContext,
    signature: &FunSignature,
    args: &[Ty],
    self_ty: Option<&Ty>,
) -> TyChainSubstitutor {
    let mut chain = TyChainSubstitutor::new();
    if let Some(self_ty) = self_ty {
        chain.push(TySelfSubstitutor::new(self_ty.clone()));
    }
    if signature.generics.is_empty() {
        return chain;
    }
    let mut analyzer = GenericAnalyzer::new(&signature.generics);
    let params = signature.dot_params();
    for (i, arg) in args.iter().enumerate() {
        match params.get(i) {
            Some(param) => analyzer.analyze(ctx, &param.ty, arg),
            None => {
                if let Some(vararg) = &signature.vararg {
                    analyzer.analyze(ctx, vararg, arg);
                }
            }
        }
    }
    chain.push(analyzer.finish());
    chain
}

/// Module name passed to a `require`-like call.
fn require_argument(ctx: &SearchContext, file: &LuaFile, args: &[NodeId]) -> Option<String> {
    let tree = &file.tree;
    if let Some(NodeKind::Literal {
        kind: LiteralKind::String,
        text,
    }) = args.first().map(|&a| tree.kind(a))
    {
        return Some(text.clone());
    }
    if let Some(module) = args.last().and_then(|&last| constant_field(ctx, file, last)) {
        return Some(module);
    }
    args.iter().find_map(|&arg| {
        match ctx.with_index(0, false, |ctx| infer(ctx, file.node(arg))) {
            Some(Ty::Literal(TyPrimitiveKind::String, text)) => Some(text.to_string()),
            _ => None,
        }
    })
}

/// `t.k` where `t` is a table constructor holding a string literal at `k`.
fn constant_field(ctx: &SearchContext, file: &LuaFile, arg: NodeId) -> Option<String> {
    let tree = &file.tree;
    let NodeKind::Index { prefix, key, .. } = tree.kind(arg) else {
        return None;
    };
    let emmy_parser::IndexKey::Name(key) = key else {
        return None;
    };
    let prefix_ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(*prefix)))?;
    let Ty::Table(table) = prefix_ty else {
        return None;
    };
    let table_file = ctx.file(table.node.file)?;
    let NodeKind::Table { fields } = table_file.tree.kind(table.node.node) else {
        return None;
    };
    fields.iter().find_map(|&field| match table_file.tree.kind(field) {
        NodeKind::TableField {
            key: emmy_parser::FieldKey::Name(name),
            value,
        } if name == key => match table_file.tree.kind(*value) {
            NodeKind::Literal {
                kind: LiteralKind::String,
                text,
            } => Some(text.clone()),
            _ => None,
        },
        _ => None,
    })
}

/// Type of the value a module returns.
fn require(ctx: &SearchContext, module: &str) -> Option<Ty> {
    let Some(file) = ctx.project().find_module(module) else {
        tracing::debug!(module, "required module not found");
        return None;
    };
    if !ctx.in_scope(file.id) {
        return None;
    }
    let ret = file.return_statement()?;
    let NodeKind::Return { exprs } = file.tree.kind(ret) else {
        return None;
    };
    let first = *exprs.first()?;
    tracing::debug!(module, file = %file.id, "resolving required module");
    ctx.with_multiple_results(|ctx| infer(ctx, file.node(first)))
}

#[cfg(test)]
mod tests {
    use crate::project::Project;
    use crate::settings::LuaSettings;
    use crate::ty::Ty;

    fn infer_local(project: &Project, path: &str, source: &str, name: &str) -> Option<Ty> {
        let id = project.add_file(path, source).unwrap();
        let file = project.file(id).unwrap();
        project.infer(file.node(file.find_local(name).unwrap()))
    }

    fn project() -> Project {
        Project::new("/p", LuaSettings::default()).unwrap()
    }

    #[test]
    fn test_call_returns() {
        let project = project();
        let source = "---@return string\nlocal function name() end\nlocal n = name()";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "n"), Some(Ty::STRING));
    }

    #[test]
    fn test_generic_call() {
        let project = project();
        let source = "---@generic T\n---@param v T\n---@return T\nlocal function id(v) end\nlocal x = id(1)";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "x"), Some(Ty::number("1")));
    }

    #[test]
    fn test_overload_selection() {
        let project = project();
        let source = "---@overload fun(a: number): number\n---@param a string\n---@return string\nlocal function conv(a) end\nlocal x, y = conv(1), conv('s')";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "x"), Some(Ty::NUMBER));
        assert_eq!(infer_local(&project, "/p/m.lua", source, "y"), Some(Ty::STRING));
    }

    #[test]
    fn test_self_return_is_bound_to_receiver() {
        let project = project();
        let source = "---@class Builder\nlocal B = {}\n---@return self\nfunction B:add() end\n---@type Builder\nlocal b\nlocal r = b:add()";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "r"), Some(Ty::class("Builder")));
    }

    #[test]
    fn test_require_module() {
        let project = project();
        project.add_file("/p/util.lua", "return { answer = 42 }").unwrap();
        let source = "local util = require('util')\nlocal a = util.answer";
        assert_eq!(infer_local(&project, "/p/main.lua", source, "a"), Some(Ty::number("42")));
    }

    #[test]
    fn test_require_missing_module() {
        let project = project();
        assert_eq!(infer_local(&project, "/p/main.lua", "local m = require('nope')", "m"), None);
    }

    #[test]
    fn test_function_typed_value_returns_unknown() {
        let project = project();
        let source = "---@type function\nlocal f\nlocal r = f()";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "r"), Some(Ty::Unknown));
    }
}
