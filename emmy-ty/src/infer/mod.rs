//! Type inference over syntax nodes.
//!
//! [`infer`] is the only entry point. It applies a `--[[---@type T]]` cast
//! attached to the node, otherwise computes the node's type in
//! multiple-results mode (memoized per node), subtracts `--[[---@not T]]`,
//! and finally selects the result index the caller asked for.
//!
//! A node that is not the first declaration of its variable takes the type
//! of the first declaration. A node re-entered while it is still being
//! inferred yields `None`, and nothing computed across such a cut is cached.

mod call;
mod expr;
mod function;
mod member;
mod name;

use emmy_parser::{DocTag, DocTy, NodeId, NodeKind, NodeRef};

use crate::index::{class_decl, find_class};
use crate::project::LuaFile;
use crate::search::SearchContext;
use crate::ty::doc::DocTyConverter;
use crate::ty::{Ty, TyFunction, TyVarianceFlags};

pub use call::create_substitutor;
pub use function::psi_signatures;
pub use member::{class_names, guess_indexer_type, guess_member_type, indexer_key_type, members_of};
pub(crate) use member::{field_converter, is_variadic_tail};

/// Type of `node`, or `None` when it cannot be determined.
pub fn infer(ctx: &SearchContext, node: NodeRef) -> Option<Ty> {
    if ctx.check_cancelled() {
        return None;
    }
    let file = ctx.file(node.file)?;
    if let Some(cast) = cast_type(ctx, &file, node.node) {
        return Some(select(ctx, cast));
    }
    let ty = infer_cached(ctx, &file, node)?;
    Some(match not_types(ctx, &file, node.node) {
        Some(not) => apply_not(ctx, ty, &not),
        None => select(ctx, ty),
    })
}

fn select(ctx: &SearchContext, ty: Ty) -> Ty {
    if ctx.supports_multiple_results() {
        ty
    } else {
        ty.get_result(ctx.index())
    }
}

fn infer_cached(ctx: &SearchContext, file: &LuaFile, node: NodeRef) -> Option<Ty> {
    let cacheable = !ctx.is_dumb() && ctx.scope_is_all() && !ctx.has_abstract_generic_scopes();
    if cacheable {
        if let Some(ty) = ctx.cached(node) {
            return ty;
        }
    }
    let generation = ctx.project().cache().generation();
    let hits = ctx.guard_hits();
    let _guard = ctx.enter(node)?;
    let ty = ctx.with_multiple_results(|ctx| infer_node(ctx, file, node.node));
    if cacheable && ctx.guard_hits() == hits && !ctx.is_cancelled() {
        ctx.store(node, generation, ty.clone());
    }
    ty
}

fn infer_node(ctx: &SearchContext, file: &LuaFile, id: NodeId) -> Option<Ty> {
    let tree = &file.tree;
    let kind = tree.kind(id);
    if matches!(kind, NodeKind::Name { .. } | NodeKind::Index { .. }) {
        if let Some(decl) = file.decls.first_declaration(id).filter(|&d| d != id) {
            return infer(ctx, file.node(decl));
        }
    }
    match kind {
        NodeKind::Unary { op, operand } => expr::unary(ctx, file, *op, *operand),
        NodeKind::Binary { op, left, right } => expr::binary(ctx, file, *op, *left, *right),
        NodeKind::Call { callee, args } => call::infer_call(ctx, file, *callee, args),
        NodeKind::Closure { func } => Some(Ty::function(TyFunction::Psi {
            node: file.node(*func),
            colon: false,
        })),
        NodeKind::Table { fields } => Some(expr::table(ctx, file, id, fields)),
        NodeKind::Paren { expr } => ctx.with_index(0, false, |ctx| infer(ctx, file.node(*expr))),
        NodeKind::Name { name } => name::infer_name(ctx, file, id, name),
        NodeKind::Literal { kind, text } => Some(expr::literal(ctx, file, id, *kind, text)),
        NodeKind::Index { .. } => member::infer_index(ctx, file, id),
        NodeKind::LocalName { .. } | NodeKind::Param { .. } => name::variable_type(ctx, file, id),
        NodeKind::TableField { value, .. } => ctx.with_index(0, false, |ctx| infer(ctx, file.node(*value))),
        _ => None,
    }
}

fn cast_type(ctx: &SearchContext, file: &LuaFile, id: NodeId) -> Option<Ty> {
    let tys = file.tree.doc_tags(id).find_map(|(_, tag)| match tag {
        DocTag::Type { tys } => Some(tys),
        _ => None,
    })?;
    Some(doc_list(&converter_at(ctx, file, id), tys))
}

fn not_types(ctx: &SearchContext, file: &LuaFile, id: NodeId) -> Option<Vec<Ty>> {
    let tys = file.tree.doc_tags(id).find_map(|(_, tag)| match tag {
        DocTag::Not { tys } => Some(tys),
        _ => None,
    })?;
    let converter = converter_at(ctx, file, id);
    Some(tys.iter().map(|t| converter.ty(t)).collect())
}

fn apply_not(ctx: &SearchContext, ty: Ty, not: &[Ty]) -> Ty {
    if ctx.supports_multiple_results() && not.len() > 1 {
        if let Ty::MultipleResults(multi) = &ty {
            let list = multi
                .list
                .iter()
                .enumerate()
                .map(|(i, t)| match not.get(i) {
                    Some(n) => subtract(ctx, t, n),
                    None => t.clone(),
                })
                .collect();
            return Ty::multiple(list, multi.variadic);
        }
    }
    let index = ctx.index().max(0);
    let selected = ty.get_result(index);
    let not_ty = if ctx.supports_multiple_results() {
        not.first()
    } else {
        not.get(index as usize)
    };
    match not_ty {
        Some(not_ty) => subtract(ctx, &selected, &not_ty.get_result(0)),
        None => selected,
    }
}

/// `ty` without the members `not` accepts.
fn subtract(ctx: &SearchContext, ty: &Ty, not: &Ty) -> Ty {
    let flags = TyVarianceFlags::STRICT_UNKNOWN | TyVarianceFlags::STRICT_NIL;
    ty.filter_members(|member| !not.contravariant_of(ctx, member, flags))
}

/// One doc type, or multiple results for a list.
pub(crate) fn doc_list(converter: &DocTyConverter, tys: &[DocTy]) -> Ty {
    match tys {
        [single] => converter.ty(single),
        list => Ty::multiple(list.iter().map(|t| converter.ty(t)).collect(), false),
    }
}

pub(crate) fn function_scope(func: NodeRef) -> String {
    format!("fn@{}", func)
}

/// Doc type converter with the generics of every function enclosing `node`
/// in scope (`node` itself included when it is a function body).
pub(crate) fn converter_at<'c, 'p>(
    ctx: &'c SearchContext<'p>,
    file: &LuaFile,
    node: NodeId,
) -> DocTyConverter<'c, 'p> {
    let tree = &file.tree;
    let mut funcs: Vec<NodeId> = std::iter::once(node)
        .chain(tree.ancestors(node))
        .filter(|&n| matches!(tree.kind(n), NodeKind::FuncBody { .. }))
        .collect();
    funcs.reverse();

    let mut generics = Vec::new();
    let mut scope = format!("file@{}", file.id);
    for func in funcs {
        scope = function_scope(file.node(func));
        let Some(owner) = tree.function_owner(func) else {
            continue;
        };
        generics.extend(method_class_generics(ctx, file, owner));
        for (_, tag) in tree.doc_tags(owner) {
            if let DocTag::Generic { params } = tag {
                let declared = DocTyConverter::new(ctx, scope.clone())
                    .with_generics(generics.clone())
                    .declare_generics(params);
                generics.extend(declared);
            }
        }
    }
    DocTyConverter::new(ctx, scope).with_generics(generics)
}

/// Generic parameters of the class a `function Class:method()` belongs to.
fn method_class_generics(
    ctx: &SearchContext,
    file: &LuaFile,
    owner: NodeId,
) -> Vec<crate::ty::TyGenericParameter> {
    let tree = &file.tree;
    let NodeKind::ClassMethodDef { target, .. } = tree.kind(owner) else {
        return Vec::new();
    };
    let NodeKind::Index { prefix, .. } = tree.kind(*target) else {
        return Vec::new();
    };
    let Some(name) = tree.name(*prefix) else {
        return Vec::new();
    };
    let local_class = file
        .decls
        .first_declaration(*prefix)
        .and_then(|decl| tree.declaring_statement(decl))
        .and_then(|(stat, _)| {
            tree.doc_tags(stat)
                .find(|(_, tag)| matches!(tag, DocTag::Class { .. }))
                .map(|(tag, _)| tag)
        })
        .and_then(|tag| class_decl(ctx, file.node(tag)));
    match local_class.or_else(|| find_class(ctx, name)) {
        Some(decl) => decl.generics,
        None => Vec::new(),
    }
}
