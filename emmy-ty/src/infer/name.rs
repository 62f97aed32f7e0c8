//! Names, locals, parameters and declared variable types.

use emmy_parser::{DocTag, IndexKey, NodeId, NodeKind};

use crate::index::find_globals;
use crate::project::LuaFile;
use crate::search::SearchContext;
use crate::ty::{Ty, TyFunction};

use super::{converter_at, infer};

pub(super) fn infer_name(ctx: &SearchContext, file: &LuaFile, id: NodeId, name: &str) -> Option<Ty> {
    match name {
        "self" => {
            if let Some(ty) = self_type(ctx, file, id) {
                return Some(ty);
            }
        }
        "_G" => return Some(Ty::g()),
        _ => {}
    }
    if let Some(ty) = global_type(ctx, name) {
        return Some(ty);
    }
    if file.tree.is_assign_target(id) {
        if let Some(ty) = declared_type(ctx, file, id) {
            return Some(ty);
        }
    }
    (ctx.is_dumb() && file.decls.is_global(id)).then(|| Ty::global(name))
}

/// `self` inside `function T:m()` is the type of `T`.
fn self_type(ctx: &SearchContext, file: &LuaFile, id: NodeId) -> Option<Ty> {
    let tree = &file.tree;
    let method = tree
        .ancestors(id)
        .filter(|&n| matches!(tree.kind(n), NodeKind::FuncBody { .. }))
        .find_map(|func| {
            let owner = tree.function_owner(func)?;
            match tree.kind(owner) {
                NodeKind::ClassMethodDef { target, .. } => match tree.kind(*target) {
                    NodeKind::Index { prefix, colon: true, .. } => Some(*prefix),
                    _ => None,
                },
                _ => None,
            }
        })?;
    ctx.with_index(0, false, |ctx| infer(ctx, file.node(method)))
}

/// Union of the declared types of a global across the project.
pub(super) fn global_type(ctx: &SearchContext, name: &str) -> Option<Ty> {
    let limit = ctx.settings().max_resolve_candidates;
    let mut result: Option<Ty> = None;
    for node in find_globals(ctx, name).into_iter().take(limit) {
        let Some(file) = ctx.file(node.file) else {
            continue;
        };
        let Some((stat, _)) = file.tree.declaring_statement(node.node) else {
            continue;
        };
        let Some(_guard) = ctx.enter(file.node(stat)) else {
            continue;
        };
        if let Some(ty) = declared_type(ctx, &file, node.node) {
            result = Some(match result {
                Some(prev) => prev.union(&ty),
                None => ty,
            });
        }
    }
    result
}

/// Type of a local, parameter or loop variable declaration.
pub(super) fn variable_type(ctx: &SearchContext, file: &LuaFile, id: NodeId) -> Option<Ty> {
    let tree = &file.tree;
    if let NodeKind::Param { name } = tree.kind(id) {
        return param_type(ctx, file, id, name);
    }
    let parent = tree.parent(id)?;
    match tree.kind(parent) {
        NodeKind::ForNum { .. } => Some(Ty::NUMBER),
        NodeKind::ForIn { vars, exprs, .. } => {
            let pos = vars.iter().position(|&v| v == id)?;
            let iterator = ctx.with_index(0, false, |ctx| infer(ctx, file.node(*exprs.first()?)))?;
            let returns = Ty::union_all(iterator.resolved_members(ctx).into_iter().filter_map(|member| {
                let Ty::Function(function) = member else {
                    return None;
                };
                function.main_signature(ctx).returns.map(|r| r.get_result(pos as i32))
            }));
            (!returns.is_void()).then_some(returns)
        }
        _ => declared_type(ctx, file, id),
    }
}

fn param_type(ctx: &SearchContext, file: &LuaFile, id: NodeId, name: &str) -> Option<Ty> {
    let tree = &file.tree;
    let func = tree.parent(id)?;
    if let Some(owner) = tree.function_owner(func) {
        for (_, tag) in tree.doc_tags(owner) {
            if let DocTag::Param { name: param, ty, optional } = tag {
                if param == name {
                    let ty = converter_at(ctx, file, func).ty(ty);
                    return Some(if *optional { ty.union(&Ty::Nil) } else { ty });
                }
            }
        }
    }
    Some(callback_param_type(ctx, file, func, id).unwrap_or(Ty::Unknown))
}

/// Parameter type of a closure passed as an argument, taken from the
/// function type the callee declares for that argument.
fn callback_param_type(ctx: &SearchContext, file: &LuaFile, func: NodeId, param: NodeId) -> Option<Ty> {
    let tree = &file.tree;
    let NodeKind::FuncBody { params, .. } = tree.kind(func) else {
        return None;
    };
    let param_pos = params.iter().position(|&p| p == param)?;
    let closure = tree.parent(func)?;
    let call = tree.parent(closure)?;
    let NodeKind::Call { callee, args } = tree.kind(call) else {
        return None;
    };
    let arg_pos = args.iter().position(|&a| a == closure)?;
    let colon = matches!(tree.kind(*callee), NodeKind::Index { colon: true, .. });
    let callee_ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(*callee)))?;
    for member in callee_ty.resolved_members(ctx) {
        let Ty::Function(function) = member else {
            continue;
        };
        let mut expected = None;
        function.main_signature(ctx).process_parameters(colon, |i, p| {
            if i == arg_pos {
                expected = Some(p.ty.clone());
                return false;
            }
            true
        });
        for callback in expected.iter().flat_map(|t| t.resolved_members(ctx)) {
            let Ty::Function(callback) = callback else {
                continue;
            };
            if let Some(p) = callback.main_signature(ctx).params.get(param_pos) {
                return Some(p.ty.clone());
            }
        }
    }
    None
}

/// Type a declaring statement gives the variable `var`.
pub(crate) fn declared_type(ctx: &SearchContext, file: &LuaFile, var: NodeId) -> Option<Ty> {
    let tree = &file.tree;
    let (stat, pos) = tree.declaring_statement(var)?;
    match tree.kind(stat) {
        NodeKind::LocalDef { exprs, .. } | NodeKind::Assign { exprs, .. } => {
            if let Some(ty) = statement_doc_type(ctx, file, stat, pos) {
                return Some(ty);
            }
            value_type(ctx, file, exprs, pos)
        }
        NodeKind::LocalFuncDef { func, .. } | NodeKind::FuncDef { func, .. } => {
            Some(Ty::function(TyFunction::Psi {
                node: file.node(*func),
                colon: false,
            }))
        }
        NodeKind::ClassMethodDef { target, func } => {
            let colon = matches!(tree.kind(*target), NodeKind::Index { colon: true, .. });
            Some(Ty::function(TyFunction::Psi {
                node: file.node(*func),
                colon,
            }))
        }
        _ => None,
    }
}

/// `---@class` or `---@type` on a declaring statement, for the variable at `pos`.
pub(super) fn statement_doc_type(ctx: &SearchContext, file: &LuaFile, stat: NodeId, pos: usize) -> Option<Ty> {
    let tree = &file.tree;
    if !matches!(tree.kind(stat), NodeKind::LocalDef { .. } | NodeKind::Assign { .. }) {
        return None;
    }
    tree.doc_tags(stat).find_map(|(_, tag)| match tag {
        DocTag::Class { name, .. } if pos == 0 => Some(Ty::class(name.clone())),
        DocTag::Type { tys } => tys.get(pos).map(|t| converter_at(ctx, file, stat).ty(t)),
        _ => None,
    })
}

/// Value assigned to the variable at `pos`; the last expression spreads over
/// the remaining variables.
fn value_type(ctx: &SearchContext, file: &LuaFile, exprs: &[NodeId], pos: usize) -> Option<Ty> {
    let last = exprs.len().checked_sub(1)?;
    if pos < last {
        ctx.with_index(0, false, |ctx| infer(ctx, file.node(exprs[pos])))
    } else {
        let index = (pos - last) as i32;
        ctx.with_index(index, false, |ctx| infer(ctx, file.node(exprs[last])))
    }
}

/// Field name of an index expression: `a.b`, `a:b` or `a["b"]`.
pub(super) fn index_key_name(file: &LuaFile, key: &IndexKey) -> Option<String> {
    match key {
        IndexKey::Name(name) => Some(name.clone()),
        IndexKey::Expr(expr) => match file.tree.kind(*expr) {
            NodeKind::Literal {
                kind: emmy_parser::LiteralKind::String,
                text,
            } => Some(text.clone()),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::project::Project;
    use crate::settings::LuaSettings;
    use crate::ty::Ty;

    fn infer_local(source: &str, name: &str) -> Option<Ty> {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        let id = project.add_file("/p/main.lua", source).unwrap();
        let file = project.file(id).unwrap();
        project.infer(file.node(file.find_local(name).unwrap()))
    }

    #[test]
    fn test_uninitialized_local_is_unknown() {
        assert_eq!(infer_local("local a", "a"), None);
    }

    #[test]
    fn test_typed_local() {
        assert_eq!(infer_local("---@type number\nlocal a", "a"), Some(Ty::NUMBER));
        assert_eq!(
            infer_local("---@type number, string\nlocal a, b", "b"),
            Some(Ty::STRING)
        );
    }

    #[test]
    fn test_class_local() {
        assert_eq!(infer_local("---@class Point\nlocal P = {}", "P"), Some(Ty::class("Point")));
    }

    #[test]
    fn test_param_types() {
        let source = "---@param a number\n---@param b? string\nlocal function f(a, b, c)\n  local x, y, z = a, b, c\nend";
        assert_eq!(infer_local(source, "x"), Some(Ty::NUMBER));
        assert_eq!(infer_local(source, "y"), Some(Ty::STRING.union(&Ty::Nil)));
        assert_eq!(infer_local(source, "z"), Some(Ty::Unknown));
    }

    #[test]
    fn test_numeric_for_variable() {
        assert_eq!(infer_local("for i = 1, 10 do end", "i"), Some(Ty::NUMBER));
    }

    #[test]
    fn test_generic_for_variables() {
        let source = "---@return number, string\nlocal function step() end\nfor k, v in step do end";
        assert_eq!(infer_local(source, "k"), Some(Ty::NUMBER));
        assert_eq!(infer_local(source, "v"), Some(Ty::STRING));
    }

    #[test]
    fn test_callback_parameter() {
        let source = "---@param cb fun(n: number)\nlocal function each(cb) end\neach(function(item) local v = item end)";
        assert_eq!(infer_local(source, "v"), Some(Ty::NUMBER));
    }

    #[test]
    fn test_global_across_files() {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        project.add_file("/p/a.lua", "Config = { debug = true }").unwrap();
        let id = project.add_file("/p/b.lua", "local c = Config.debug").unwrap();
        let file = project.file(id).unwrap();
        let ty = project.infer(file.node(file.find_local("c").unwrap()));
        assert_eq!(ty, Some(Ty::boolean(true)));
    }

    #[test]
    fn test_self_in_method() {
        let source = "---@class Counter\nlocal Counter = {}\nfunction Counter:get() local me = self end";
        assert_eq!(infer_local(source, "me"), Some(Ty::class("Counter")));
    }
}
