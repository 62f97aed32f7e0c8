//! Class member lookups over the `ClassMember` key space.
//!
//! Lookup order is own keys, then the alias target, then super classes when
//! `deep`, stopping at the first class that declares the key. Indexer lookups
//! fall back to the most specific indexer accepting the key type.

use emmy_parser::{DocTag, DocTy, NodeKind, NodeRef};
use rustc_hash::FxHashSet;

use crate::infer::indexer_key_type;
use crate::search::SearchContext;
use crate::ty::{Ty, TyVarianceFlags};

use super::{find_alias, find_class, StubKey};

/// Index class names a type's members are registered under, without
/// consulting the index.
pub(crate) fn direct_class_names(ty: &Ty) -> Vec<String> {
    match ty {
        Ty::Class(class) => vec![class.name.clone()],
        Ty::Table(table) => vec![table.class_name()],
        Ty::Generic(generic) => direct_class_names(&generic.base),
        Ty::Alias(alias) => vec![alias.name.clone()],
        Ty::Union(list) => list.iter().flat_map(direct_class_names).collect(),
        _ => Vec::new(),
    }
}

fn lookup_chain(
    ctx: &SearchContext,
    class: &str,
    key: &dyn Fn(&str) -> String,
    deep: bool,
    visited: &mut FxHashSet<String>,
) -> Vec<NodeRef> {
    if !visited.insert(class.to_string()) || ctx.is_cancelled() {
        return Vec::new();
    }
    let mut found = Vec::new();
    ctx.project()
        .index()
        .process(ctx, StubKey::ClassMember, &key(class), |node| {
            found.push(node);
            true
        });
    if !found.is_empty() {
        return found;
    }
    if let Some(alias) = find_alias(ctx, class) {
        for name in direct_class_names(&alias.ty) {
            let found = lookup_chain(ctx, &name, key, deep, visited);
            if !found.is_empty() {
                return found;
            }
        }
    }
    if deep {
        if let Some(decl) = find_class(ctx, class) {
            for super_ty in &decl.supers {
                for name in direct_class_names(super_ty) {
                    let found = lookup_chain(ctx, &name, key, deep, visited);
                    if !found.is_empty() {
                        return found;
                    }
                }
            }
        }
    }
    Vec::new()
}

/// Visit the declarations of member `name` of `class`.
pub fn process_member(
    ctx: &SearchContext,
    class: &str,
    name: &str,
    deep: bool,
    mut f: impl FnMut(NodeRef) -> bool,
) -> bool {
    let mut visited = FxHashSet::default();
    let key = |c: &str| format!("{}*{}", c, name);
    for node in lookup_chain(ctx, class, &key, deep, &mut visited) {
        if !f(node) {
            return false;
        }
    }
    true
}

/// Visit the indexer of `class` matching `index_ty`: the exact key if
/// declared, otherwise the most specific indexer accepting the key type.
pub fn process_indexer(
    ctx: &SearchContext,
    class: &str,
    index_ty: &Ty,
    deep: bool,
    mut f: impl FnMut(NodeRef) -> bool,
) -> bool {
    let mut visited = FxHashSet::default();
    let id = index_ty.key_id();
    let key = |c: &str| format!("{}*[{}]", c, id);
    let exact = lookup_chain(ctx, class, &key, deep, &mut visited);
    if !exact.is_empty() {
        for node in exact {
            if !f(node) {
                return false;
            }
        }
        return true;
    }
    let mut visited = FxHashSet::default();
    match best_indexer(ctx, class, index_ty, deep, &mut visited) {
        Some(node) => f(node),
        None => true,
    }
}

fn best_indexer(
    ctx: &SearchContext,
    class: &str,
    index_ty: &Ty,
    deep: bool,
    visited: &mut FxHashSet<String>,
) -> Option<NodeRef> {
    if !visited.insert(class.to_string()) || ctx.is_cancelled() {
        return None;
    }
    let mut best: Option<(Ty, NodeRef)> = None;
    ctx.project()
        .index()
        .process(ctx, StubKey::ClassMember, &format!("{}[]", class), |node| {
            let Some(key_ty) = indexer_key_type(ctx, node) else {
                return true;
            };
            if !key_ty.contravariant_of(ctx, index_ty, TyVarianceFlags::STRICT_UNKNOWN) {
                return true;
            }
            let more_specific = match &best {
                None => true,
                Some((current, _)) => {
                    current.contravariant_of(ctx, &key_ty, TyVarianceFlags::STRICT_UNKNOWN)
                        && *current != key_ty
                }
            };
            if more_specific {
                best = Some((key_ty, node));
            }
            true
        });
    if let Some((_, node)) = best {
        return Some(node);
    }
    if let Some(alias) = find_alias(ctx, class) {
        for name in direct_class_names(&alias.ty) {
            if let Some(node) = best_indexer(ctx, &name, index_ty, deep, visited) {
                return Some(node);
            }
        }
    }
    if deep {
        for super_ty in find_class(ctx, class).map(|d| d.supers).unwrap_or_default() {
            for name in direct_class_names(&super_ty) {
                if let Some(node) = best_indexer(ctx, &name, index_ty, deep, visited) {
                    return Some(node);
                }
            }
        }
    }
    None
}

/// Visit every member of `class` with its key (`name` or `[type id]`),
/// including members reached through the alias target and, when `deep`,
/// super classes.
pub fn process_all(
    ctx: &SearchContext,
    class: &str,
    deep: bool,
    mut f: impl FnMut(&str, NodeRef) -> bool,
) -> bool {
    let mut visited = FxHashSet::default();
    let mut pending = vec![class.to_string()];
    while let Some(class) = pending.pop() {
        if !visited.insert(class.clone()) || ctx.is_dumb() {
            continue;
        }
        let prefix = format!("{}*", class);
        for (name, nodes) in ctx.project().index().prefixed(StubKey::ClassMember, &prefix) {
            let member = &name[prefix.len()..];
            for node in nodes {
                if ctx.check_cancelled() {
                    return false;
                }
                if !ctx.in_scope(node.file) {
                    continue;
                }
                if !f(member, node) {
                    return false;
                }
            }
        }
        if let Some(alias) = find_alias(ctx, &class) {
            pending.extend(direct_class_names(&alias.ty));
        }
        if deep {
            if let Some(decl) = find_class(ctx, &class) {
                for super_ty in &decl.supers {
                    pending.extend(direct_class_names(super_ty));
                }
            }
        }
    }
    true
}

/// Members of `class` keyed by member key; the first declaration of a key wins.
pub fn members(ctx: &SearchContext, class: &str) -> Vec<(String, NodeRef)> {
    let mut out: Vec<(String, NodeRef)> = Vec::new();
    process_all(ctx, class, true, |key, node| {
        if !out.iter().any(|(k, _)| k == key) {
            out.push((key.to_string(), node));
        }
        true
    });
    out
}

/// First member `name` of `class` declared as a function.
pub fn find_method(ctx: &SearchContext, class: &str, name: &str, deep: bool) -> Option<NodeRef> {
    let mut found = None;
    process_member(ctx, class, name, deep, |node| {
        if is_function_member(ctx, node) {
            found = Some(node);
            return false;
        }
        true
    });
    found
}

fn is_function_member(ctx: &SearchContext, node: NodeRef) -> bool {
    let Some(file) = ctx.file(node.file) else {
        return false;
    };
    let tree = &file.tree;
    let is_closure = |id| matches!(tree.kind(id), NodeKind::Closure { .. });
    match tree.kind(node.node) {
        NodeKind::TableField { value, .. } => is_closure(*value),
        NodeKind::DocTag(DocTag::Field { ty, .. }) => {
            matches!(ty, DocTy::Fun(_)) || matches!(ty, DocTy::Name { name, .. } if name == "function")
        }
        _ => match tree.declaring_statement(node.node) {
            Some((stat, pos)) => match tree.kind(stat) {
                NodeKind::ClassMethodDef { .. } | NodeKind::FuncDef { .. } => true,
                NodeKind::Assign { exprs, .. } => exprs.get(pos).is_some_and(|&e| is_closure(e)),
                _ => false,
            },
            None => false,
        },
    }
}

/// Visit the declaration of class `namespace.name`.
pub fn process_namespace_member(
    ctx: &SearchContext,
    namespace: &str,
    name: &str,
    f: impl FnMut(NodeRef) -> bool,
) -> bool {
    let class = format!("{}.{}", namespace, name);
    ctx.project().index().process(ctx, StubKey::Class, &class, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::settings::LuaSettings;

    fn project(source: &str) -> Project {
        let project = Project::new("/p", LuaSettings::default()).unwrap();
        project.add_file("/p/m.lua", source).unwrap();
        project
    }

    fn count(ctx: &SearchContext, class: &str, name: &str, deep: bool) -> usize {
        let mut n = 0;
        process_member(ctx, class, name, deep, |_| {
            n += 1;
            true
        });
        n
    }

    #[test]
    fn test_super_members_need_deep_lookup() {
        let project = project(
            "---@class Base\n---@field id number\n\n---@class Derived : Base\n---@field name string\nlocal d",
        );
        let ctx = project.context();
        assert_eq!(count(&ctx, "Derived", "name", false), 1);
        assert_eq!(count(&ctx, "Derived", "id", false), 0);
        assert_eq!(count(&ctx, "Derived", "id", true), 1);

        let keys: Vec<String> = members(&ctx, "Derived").into_iter().map(|(k, _)| k).collect();
        assert!(keys.contains(&"id".to_string()));
        assert!(keys.contains(&"name".to_string()));
    }

    #[test]
    fn test_indexer_prefers_exact_then_accepting_key() {
        let project = project("---@class Map\n---@field [string] number\n---@field [number] boolean\nlocal m");
        let ctx = project.context();
        let mut found = Vec::new();
        process_indexer(&ctx, "Map", &Ty::string("k"), true, |node| {
            found.push(node);
            true
        });
        assert_eq!(found.len(), 1);
        assert_eq!(indexer_key_type(&ctx, found[0]), Some(Ty::STRING));

        let mut exact = Vec::new();
        process_indexer(&ctx, "Map", &Ty::NUMBER, true, |node| {
            exact.push(node);
            true
        });
        assert_eq!(exact.len(), 1);
        assert_eq!(indexer_key_type(&ctx, exact[0]), Some(Ty::NUMBER));
    }

    #[test]
    fn test_find_method() {
        let project = project("---@class Shape\nlocal Shape = {}\nShape.sides = 4\nfunction Shape:area() end");
        let ctx = project.context();
        assert!(find_method(&ctx, "Shape", "area", false).is_some());
        assert!(find_method(&ctx, "Shape", "sides", false).is_none());
        assert!(find_method(&ctx, "Shape", "missing", true).is_none());
    }

    #[test]
    fn test_namespace_member() {
        let project = project("---@class net.Client\nlocal Client = {}");
        let ctx = project.context();
        let mut hits = 0;
        process_namespace_member(&ctx, "net", "Client", |_| {
            hits += 1;
            true
        });
        assert_eq!(hits, 1);
        assert!(process_namespace_member(&ctx, "net", "Server", |_| false));
    }
}
