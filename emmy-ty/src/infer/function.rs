//! Signatures of functions defined in source.
//!
//! Parameter, vararg and return types come from the doc comment of the
//! statement owning the function when present. Undocumented returns are
//! inferred from the `return` statements of the body.

use std::sync::Arc;

use emmy_parser::{DocTag, NodeId, NodeKind, NodeRef, SyntaxTree};

use crate::project::LuaFile;
use crate::search::SearchContext;
use crate::ty::{FunParam, FunSignature, FunctionSignatures, Ty, TyFunction};

use super::{converter_at, function_scope, infer};

pub fn psi_signatures(ctx: &SearchContext, func: NodeRef, colon: bool) -> Arc<FunctionSignatures> {
    if let Some(signatures) = ctx.cached_signatures(func, colon) {
        return signatures;
    }
    let Some(file) = ctx.file(func.file) else {
        return Arc::new(FunctionSignatures::single(FunSignature::unknown_variadic()));
    };
    let hits = ctx.guard_hits();
    let signatures = Arc::new(build_signatures(ctx, &file, func.node, colon));
    if ctx.guard_hits() == hits {
        ctx.store_signatures(func, colon, signatures.clone());
    }
    signatures
}

fn build_signatures(ctx: &SearchContext, file: &LuaFile, func: NodeId, colon: bool) -> FunctionSignatures {
    let tree = &file.tree;
    let NodeKind::FuncBody { params, vararg, .. } = tree.kind(func) else {
        return FunctionSignatures::single(FunSignature::unknown_variadic());
    };
    let converter = converter_at(ctx, file, func);
    let scope = function_scope(file.node(func));
    let generics: Vec<_> = converter
        .generics()
        .iter()
        .filter(|g| g.scope == scope)
        .cloned()
        .collect();
    let owner = tree.function_owner(func);
    let tags: Vec<&DocTag> = owner
        .map(|owner| tree.doc_tags(owner).map(|(_, tag)| tag).collect())
        .unwrap_or_default();

    let params = params
        .iter()
        .filter_map(|&p| tree.name(p))
        .map(|name| {
            let doc = tags.iter().find_map(|tag| match tag {
                DocTag::Param { name: n, ty, optional } if n == name => Some((ty, *optional)),
                _ => None,
            });
            match doc {
                Some((ty, optional)) => {
                    let ty = converter.ty(ty);
                    FunParam {
                        name: name.to_string(),
                        ty: if optional { ty.union(&Ty::Nil) } else { ty },
                        optional,
                    }
                }
                None => FunParam {
                    name: name.to_string(),
                    ty: Ty::Unknown,
                    optional: false,
                },
            }
        })
        .collect();

    let vararg = vararg.then(|| {
        tags.iter()
            .find_map(|tag| match tag {
                DocTag::Vararg { ty } => Some(converter.ty(ty)),
                _ => None,
            })
            .unwrap_or(Ty::Unknown)
    });

    let doc_returns: Vec<Ty> = tags
        .iter()
        .filter_map(|tag| match tag {
            DocTag::Return { ty } => Some(converter.ty(ty)),
            _ => None,
        })
        .collect();
    let returns = match doc_returns.len() {
        0 => {
            let node = file.node(func);
            match ctx.enter(node) {
                Some(_guard) => infer_returns(ctx, file, func),
                None => None,
            }
        }
        1 => doc_returns.into_iter().next(),
        _ => Some(Ty::multiple(doc_returns, false)),
    };

    let overloads = tags
        .iter()
        .filter_map(|tag| match tag {
            DocTag::Overload { fun } => Some(converter.fun(fun, colon)),
            _ => None,
        })
        .collect();

    FunctionSignatures {
        main: FunSignature {
            colon_call: colon,
            params,
            vararg,
            returns,
            generics,
        },
        overloads,
    }
}

/// Union of the values returned by the body of `func`.
fn infer_returns(ctx: &SearchContext, file: &LuaFile, func: NodeId) -> Option<Ty> {
    let tree = &file.tree;
    let this = file.node(func);
    let NodeKind::FuncBody { block, .. } = tree.kind(func) else {
        return None;
    };
    let mut returns = Vec::new();
    collect_returns(tree, *block, &mut returns);
    if returns.is_empty() {
        return Some(Ty::Void);
    }
    let mut result: Option<Ty> = None;
    for ret in returns {
        let NodeKind::Return { exprs } = tree.kind(ret) else {
            continue;
        };
        let ty = match exprs.as_slice() {
            [] => Some(Ty::Void),
            [single] => ctx.with_multiple_results(|ctx| infer(ctx, file.node(*single))),
            [init @ .., last] => {
                let mut list: Vec<Ty> = init
                    .iter()
                    .map(|&e| {
                        ctx.with_index(0, false, |ctx| infer(ctx, file.node(e)))
                            .unwrap_or(Ty::Unknown)
                    })
                    .collect();
                list.push(
                    ctx.with_multiple_results(|ctx| infer(ctx, file.node(*last)))
                        .unwrap_or(Ty::Unknown),
                );
                Some(Ty::multiple(list, false))
            }
        };
        let Some(ty) = ty else {
            continue;
        };
        if let Ty::Function(function) = &ty {
            if matches!(function.as_ref(), TyFunction::Psi { node, .. } if *node == this) {
                continue;
            }
        }
        result = Some(match result {
            Some(prev) => prev.union(&ty),
            None => ty,
        });
    }
    result
}

/// `return` statements of a block and its nested statement blocks, in
/// source order. Nested function bodies are not entered.
fn collect_returns(tree: &SyntaxTree, block: NodeId, out: &mut Vec<NodeId>) {
    let NodeKind::Block { stats } = tree.kind(block) else {
        return;
    };
    for &stat in stats {
        match tree.kind(stat) {
            NodeKind::Return { .. } => out.push(stat),
            NodeKind::Do { block }
            | NodeKind::While { block, .. }
            | NodeKind::Repeat { block, .. }
            | NodeKind::ForNum { block, .. }
            | NodeKind::ForIn { block, .. } => collect_returns(tree, *block, out),
            NodeKind::If { clauses } => {
                for (_, block) in clauses {
                    collect_returns(tree, *block, out);
                }
            }
            _ => {}
        }
    }
}

/// Declared type of `...` inside `func`.
pub(super) fn vararg_type(ctx: &SearchContext, file: &LuaFile, func: NodeId) -> Option<Ty> {
    let tree = &file.tree;
    let owner = tree.function_owner(func)?;
    tree.doc_tags(owner).find_map(|(_, tag)| match tag {
        DocTag::Vararg { ty } => Some(converter_at(ctx, file, func).ty(ty)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::settings::LuaSettings;

    fn signatures(source: &str, local: &str) -> (Project, Ty) {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let id = project.add_file("/p/m.lua", source).unwrap();
        let file = project.file(id).unwrap();
        let ty = project.infer(file.node(file.find_local(local).unwrap())).unwrap();
        (project, ty)
    }

    #[test]
    fn test_documented_signature() {
        let source = "---@param a number\n---@param b? string\n---@return boolean\nlocal function f(a, b, ...) end";
        let (project, ty) = signatures(source, "f");
        let Ty::Function(function) = ty else {
            panic!("expected a function");
        };
        let ctx = project.context();
        let main = function.main_signature(&ctx);
        assert_eq!(main.params.len(), 2);
        assert_eq!(main.params[0].ty, Ty::NUMBER);
        assert!(main.params[1].optional);
        assert_eq!(main.vararg, Some(Ty::Unknown));
        assert_eq!(main.returns, Some(Ty::BOOLEAN));
    }

    #[test]
    fn test_inferred_returns_union() {
        let source = "local function f(x)\n  if x then return 1 end\n  return 'a'\nend";
        let (project, ty) = signatures(source, "f");
        let Ty::Function(function) = ty else {
            panic!("expected a function");
        };
        let ctx = project.context();
        assert_eq!(
            function.main_signature(&ctx).returns,
            Some(Ty::number("1").union(&Ty::string("a")))
        );
    }

    #[test]
    fn test_no_return_is_void() {
        let (project, ty) = signatures("local function f() end", "f");
        let Ty::Function(function) = ty else {
            panic!("expected a function");
        };
        assert_eq!(function.main_signature(&project.context()).returns, Some(Ty::Void));
    }

    #[test]
    fn test_returns_in_nested_blocks() {
        let source = "local function f(x)\n  for i = 1, 2 do\n    while x do\n      if i then return 'a' else return true end\n    end\n  end\n  do return 1 end\nend";
        let (project, ty) = signatures(source, "f");
        let Ty::Function(function) = ty else {
            panic!("expected a function");
        };
        let expected = Ty::string("a").union(&Ty::boolean(true)).union(&Ty::number("1"));
        assert_eq!(function.main_signature(&project.context()).returns, Some(expected));
    }

    #[test]
    fn test_returns_of_local_function_inside_body_are_skipped() {
        let source = "local function f()\n  local function g() return 'inner' end\n  function h() return false end\n  return 1\nend";
        let (project, ty) = signatures(source, "f");
        let Ty::Function(function) = ty else {
            panic!("expected a function");
        };
        assert_eq!(
            function.main_signature(&project.context()).returns,
            Some(Ty::number("1"))
        );
    }

    #[test]
    fn test_nested_returns_are_not_collected() {
        let source = "local function f()\n  local g = function() return 'inner' end\n  return 1\nend";
        let (project, ty) = signatures(source, "f");
        let Ty::Function(function) = ty else {
            panic!("expected a function");
        };
        assert_eq!(
            function.main_signature(&project.context()).returns,
            Some(Ty::number("1"))
        );
    }
}
