//! Index expressions and member lookup.

use emmy_parser::{DocTag, FieldKey, IndexKey, LiteralKind, NodeId, NodeKind, NodeRef};

use crate::index::{class_decl, find_class, members, process_indexer, process_member};
use crate::project::LuaFile;
use crate::search::SearchContext;
use crate::ty::doc::DocTyConverter;
use crate::ty::{
    ClassKind, RecordKey, Ty, TyChainSubstitutor, TyParameterSubstitutor, TyPrimitiveKind,
    TySelfSubstitutor, TyVarianceFlags,
};

use super::name::{declared_type, global_type, index_key_name, statement_doc_type};
use super::{converter_at, infer};

pub(super) fn infer_index(ctx: &SearchContext, file: &LuaFile, id: NodeId) -> Option<Ty> {
    let tree = &file.tree;
    let NodeKind::Index { prefix, key, .. } = tree.kind(id) else {
        return None;
    };
    let name = index_key_name(file, key);

    if let Some((stat, pos)) = tree.declaring_statement(id) {
        if let Some(ty) = statement_doc_type(ctx, file, stat, pos) {
            return Some(ty);
        }
        if let Some(name) = &name {
            let prefix_ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(*prefix)));
            if let Some(prefix_ty) = prefix_ty.filter(|t| !t.is_unknown()) {
                let exclude = file.node(id);
                let found = prefix_ty
                    .resolved_members(ctx)
                    .iter()
                    .filter_map(|member| find_member_type(ctx, member, name, Some(exclude)))
                    .reduce(|a, b| a.union(&b));
                if found.is_some() {
                    return found;
                }
            }
        }
        return declared_type(ctx, file, id);
    }

    let prefix_ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(*prefix)))?;
    if name.as_deref() == Some("__super") {
        return prefix_ty.resolved_members(ctx).iter().find_map(|m| m.super_types(ctx).into_iter().next());
    }
    let mut result: Option<Ty> = None;
    for member in prefix_ty.resolved_members(ctx) {
        let ty = match (&member, &name) {
            (Ty::Class(class), Some(name)) if class.kind == ClassKind::G => {
                global_type(ctx, name).or_else(|| ctx.is_dumb().then(|| Ty::global(name)))
            }
            (_, Some(name)) => guess_member_type(ctx, &member, name),
            (_, None) => {
                let IndexKey::Expr(expr) = key else {
                    continue;
                };
                let index_ty = ctx.with_index(0, false, |ctx| infer(ctx, file.node(*expr)))
                    .unwrap_or(Ty::Unknown);
                guess_indexer_type(ctx, &member, &index_ty)
            }
        };
        if let Some(ty) = ty {
            result = Some(match result {
                Some(prev) => prev.union(&ty),
                None => ty,
            });
        }
    }
    result
}

/// Type of member `name` of `ty`.
pub fn guess_member_type(ctx: &SearchContext, ty: &Ty, name: &str) -> Option<Ty> {
    find_member_type(ctx, ty, name, None)
}

fn find_member_type(ctx: &SearchContext, ty: &Ty, name: &str, exclude: Option<NodeRef>) -> Option<Ty> {
    match ty {
        Ty::Unknown => ctx.settings().unknown_indexable.then_some(Ty::Unknown),
        Ty::Record(record) => record.fields.iter().find_map(|field| match &field.key {
            RecordKey::Name(key) if key == name => Some(field.ty.clone()),
            RecordKey::Indexer(key)
                if key.contravariant_of(ctx, &Ty::string(name), TyVarianceFlags::STRICT_UNKNOWN) =>
            {
                Some(field.ty.clone())
            }
            _ => None,
        }),
        Ty::Generic(generic) if generic.base == Ty::TABLE => {
            let key = generic.args.first()?;
            key.contravariant_of(ctx, &Ty::string(name), TyVarianceFlags::STRICT_UNKNOWN)
                .then(|| generic.args.get(1).cloned())
                .flatten()
        }
        _ => {
            let substitutor = member_substitutor(ctx, ty);
            for class in class_names(ctx, ty) {
                let mut found = None;
                process_member(ctx, &class, name, true, |node| {
                    if Some(node) == exclude {
                        return true;
                    }
                    found = Some(node);
                    false
                });
                if let Some(node) = found {
                    return member_type(ctx, node).map(|t| t.substitute(ctx, &substitutor));
                }
            }
            None
        }
    }
}

/// Type of `ty[index_ty]`.
pub fn guess_indexer_type(ctx: &SearchContext, ty: &Ty, index_ty: &Ty) -> Option<Ty> {
    match ty {
        Ty::Unknown => ctx.settings().unknown_indexable.then_some(Ty::Unknown),
        Ty::Array(base) => Ty::NUMBER
            .contravariant_of(ctx, index_ty, TyVarianceFlags::empty())
            .then(|| (**base).clone()),
        Ty::Generic(generic) if generic.base == Ty::TABLE => {
            let key = generic.args.first()?;
            key.contravariant_of(ctx, index_ty, TyVarianceFlags::empty())
                .then(|| generic.args.get(1).cloned())
                .flatten()
        }
        Ty::Record(record) => {
            if let Ty::Literal(TyPrimitiveKind::String, name) = index_ty {
                if let Some(ty) = guess_member_type(ctx, ty, name) {
                    return Some(ty);
                }
            }
            record.fields.iter().find_map(|field| match &field.key {
                RecordKey::Indexer(key) if key.contravariant_of(ctx, index_ty, TyVarianceFlags::empty()) => {
                    Some(field.ty.clone())
                }
                _ => None,
            })
        }
        _ => {
            if let Ty::Literal(TyPrimitiveKind::String, name) = index_ty {
                if let Some(ty) = guess_member_type(ctx, ty, name) {
                    return Some(ty);
                }
            }
            let substitutor = member_substitutor(ctx, ty);
            for class in class_names(ctx, ty) {
                let mut found = None;
                process_indexer(ctx, &class, index_ty, true, |node| {
                    found = Some(node);
                    false
                });
                if let Some(node) = found {
                    return member_type(ctx, node).map(|t| t.substitute(ctx, &substitutor));
                }
            }
            None
        }
    }
}

/// Binds `self` and the class generics of `ty` in member types.
fn member_substitutor(ctx: &SearchContext, ty: &Ty) -> TyChainSubstitutor {
    let mut chain = TyChainSubstitutor::new();
    chain.push(TySelfSubstitutor::new(ty.clone()));
    match ty {
        Ty::Generic(generic) => {
            if let Ty::Class(class) = &generic.base {
                if let Some(decl) = find_class(ctx, &class.name) {
                    chain.push(TyParameterSubstitutor::from_args(&decl.generics, &generic.args));
                }
            }
        }
        Ty::Table(table) if !table.substitution.is_empty() => {
            chain.push(TyParameterSubstitutor::from_pairs(&table.substitution));
        }
        _ => {}
    }
    chain
}

/// Index class names the members of `ty` are registered under.
pub fn class_names(ctx: &SearchContext, ty: &Ty) -> Vec<String> {
    match ty {
        Ty::Class(class) => match class.kind {
            ClassKind::Doc => find_class(ctx, &class.name)
                .map(|decl| decl.class_names())
                .unwrap_or_else(|| vec![class.name.clone()]),
            ClassKind::SelfType => Vec::new(),
            _ => vec![class.name.clone()],
        },
        Ty::Table(table) => {
            let mut names = vec![table.class_name()];
            if let Some(global) = table_global_name(ctx, table.node) {
                names.push(format!("${}", global));
            }
            names
        }
        Ty::Generic(generic) => class_names(ctx, &generic.base),
        Ty::Alias(alias) => vec![alias.name.clone()],
        Ty::Primitive(TyPrimitiveKind::String) | Ty::Literal(TyPrimitiveKind::String, _) => {
            vec!["string".to_string()]
        }
        _ => Vec::new(),
    }
}

/// Name of the global a table constructor is assigned to.
fn table_global_name(ctx: &SearchContext, table: NodeRef) -> Option<String> {
    let file = ctx.file(table.file)?;
    let tree = &file.tree;
    let parent = tree.parent(table.node)?;
    let NodeKind::Assign { vars, exprs } = tree.kind(parent) else {
        return None;
    };
    let pos = exprs.iter().position(|&e| e == table.node)?;
    let var = *vars.get(pos)?;
    if !file.decls.is_global(var) {
        return None;
    }
    tree.name(var).map(str::to_string)
}

/// Type of a member declaration found in the index.
pub(crate) fn member_type(ctx: &SearchContext, node: NodeRef) -> Option<Ty> {
    let file = ctx.file(node.file)?;
    let tree = &file.tree;
    match tree.kind(node.node) {
        NodeKind::DocTag(DocTag::Field { ty, optional, .. }) => {
            let ty = field_converter(ctx, &file, node.node).ty(ty);
            Some(if *optional { ty.union(&Ty::Nil) } else { ty })
        }
        NodeKind::TableField { value, .. } => ctx.with_index(0, false, |ctx| infer(ctx, file.node(*value))),
        _ if tree.is_assign_target(node.node) => declared_type(ctx, &file, node.node),
        _ => ctx.with_index(0, false, |ctx| infer(ctx, node)),
    }
}

/// Converter for a `---@field` tag, in the scope of the class declared above it.
pub(crate) fn field_converter<'c, 'p>(
    ctx: &'c SearchContext<'p>,
    file: &LuaFile,
    field: NodeId,
) -> DocTyConverter<'c, 'p> {
    let tree = &file.tree;
    let class_tag = tree.parent(field).and_then(|doc| match tree.kind(doc) {
        NodeKind::DocComment { tags } => {
            let pos = tags.iter().position(|&t| t == field).unwrap_or(tags.len());
            tags[..pos]
                .iter()
                .rev()
                .find(|&&t| matches!(tree.kind(t), NodeKind::DocTag(DocTag::Class { .. })))
                .copied()
        }
        _ => None,
    });
    match class_tag.and_then(|tag| class_decl(ctx, file.node(tag))) {
        Some(decl) => DocTyConverter::new(ctx, format!("class:{}", decl.name)).with_generics(decl.generics),
        None => converter_at(ctx, file, field),
    }
}

/// Every member of `ty` with its type; the first declaration of a key wins.
pub fn members_of(ctx: &SearchContext, ty: &Ty) -> Vec<(String, Ty)> {
    let mut out: Vec<(String, Ty)> = Vec::new();
    for member in ty.resolved_members(ctx) {
        if let Ty::Record(record) = &member {
            for field in &record.fields {
                let key = match &field.key {
                    RecordKey::Name(name) => name.clone(),
                    RecordKey::Indexer(key) => format!("[{}]", key.key_id()),
                };
                if !out.iter().any(|(k, _)| *k == key) {
                    out.push((key, field.ty.clone()));
                }
            }
            continue;
        }
        let substitutor = member_substitutor(ctx, &member);
        for class in class_names(ctx, &member) {
            for (key, node) in members(ctx, &class) {
                if out.iter().any(|(k, _)| *k == key) {
                    continue;
                }
                if let Some(ty) = member_type(ctx, node) {
                    out.push((key, ty.substitute(ctx, &substitutor)));
                }
            }
        }
    }
    out
}

/// Key type of an indexer declaration.
pub fn indexer_key_type(ctx: &SearchContext, node: NodeRef) -> Option<Ty> {
    let file = ctx.file(node.file)?;
    let tree = &file.tree;
    match tree.kind(node.node) {
        NodeKind::DocTag(DocTag::Field {
            key: emmy_parser::DocFieldKey::Indexer(key),
            ..
        }) => Some(field_converter(ctx, &file, node.node).ty(key)),
        NodeKind::TableField { key: FieldKey::Expr(expr), .. } => {
            ctx.with_index(0, false, |ctx| infer(ctx, file.node(*expr)))
        }
        NodeKind::TableField { key: FieldKey::Positional(pos), .. } => {
            if is_variadic_tail(&file, node.node) {
                Some(Ty::NUMBER)
            } else {
                Some(Ty::number(pos.to_string()))
            }
        }
        NodeKind::Index { key: IndexKey::Expr(expr), .. } => {
            ctx.with_index(0, false, |ctx| infer(ctx, file.node(*expr)))
        }
        _ => None,
    }
}

/// Last positional field of a table constructor whose value may expand to
/// several values: `{ f() }`, `{ ... }`.
pub(crate) fn is_variadic_tail(file: &LuaFile, field: NodeId) -> bool {
    let tree = &file.tree;
    let NodeKind::TableField {
        key: FieldKey::Positional(_),
        value,
    } = tree.kind(field)
    else {
        return false;
    };
    let is_last = tree.parent(field).is_some_and(|table| match tree.kind(table) {
        NodeKind::Table { fields } => fields.last() == Some(&field),
        _ => false,
    });
    is_last
        && matches!(
            tree.kind(*value),
            NodeKind::Call { .. } | NodeKind::Literal { kind: LiteralKind::Varargs, .. }
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::settings::LuaSettings;

    fn project() -> Project {
        Project::new("/p", LuaSettings::default()).unwrap()
    }

    fn infer_local(project: &Project, path: &str, source: &str, name: &str) -> Option<Ty> {
        let id = project.add_file(path, source).unwrap();
        let file = project.file(id).unwrap();
        project.infer(file.node(file.find_local(name).unwrap()))
    }

    #[test]
    fn test_table_fields() {
        let project = project();
        let source = "local t = { a = 1, b = 'x' }\nt.c = true\nlocal a, b, c = t.a, t.b, t.c";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "a"), Some(Ty::number("1")));
        assert_eq!(infer_local(&project, "/p/m.lua", source, "b"), Some(Ty::string("x")));
        assert_eq!(infer_local(&project, "/p/m.lua", source, "c"), Some(Ty::boolean(true)));
    }

    #[test]
    fn test_doc_field_beats_assignment() {
        let project = project();
        let source = "---@class Point\n---@field x number\nlocal Point = {}\nPoint.x = 1\nlocal v = Point.x";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "v"), Some(Ty::NUMBER));
    }

    #[test]
    fn test_inherited_field() {
        let project = project();
        let source = "---@class Base\n---@field id string\n\n---@class Child : Base\n\n---@type Child\nlocal c\nlocal v = c.id";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "v"), Some(Ty::STRING));
    }

    #[test]
    fn test_array_and_map_indexing() {
        let project = project();
        let source = "---@type string[]\nlocal list\n---@type table<string, number>\nlocal map\nlocal a, b = list[1], map.key";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "a"), Some(Ty::STRING));
        assert_eq!(infer_local(&project, "/p/m.lua", source, "b"), Some(Ty::NUMBER));
    }

    #[test]
    fn test_positional_fields() {
        let project = project();
        let source = "local t = { 'a', 2 }\nlocal x, y = t[1], t[2]";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "x"), Some(Ty::string("a")));
        assert_eq!(infer_local(&project, "/p/m.lua", source, "y"), Some(Ty::number("2")));
    }

    #[test]
    fn test_generic_class_field_is_substituted() {
        let project = project();
        let source = "---@class Box<T>\n---@field value T\n\n---@type Box<number>\nlocal b\nlocal v = b.value";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "v"), Some(Ty::NUMBER));
    }

    #[test]
    fn test_unknown_indexing_follows_setting() {
        let project = project();
        let source = "local function f(x) local v = x.y end";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "v"), Some(Ty::Unknown));

        let strict = Project::new(
            "/q",
            LuaSettings {
                unknown_indexable: false,
                ..LuaSettings::default()
            },
        )
        .unwrap();
        assert_eq!(infer_local(&strict, "/q/m.lua", source, "v"), None);
    }

    #[test]
    fn test_members_of_table() {
        let project = project();
        let id = project.add_file("/p/m.lua", "local t = { a = 1, b = 'x' }").unwrap();
        let file = project.file(id).unwrap();
        let ty = project.infer(file.node(file.find_local("t").unwrap())).unwrap();
        let ctx = project.context();
        let members = members_of(&ctx, &ty);
        let keys: Vec<&str> = members.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_field_belongs_to_nearest_class() {
        let project = project();
        let source = "---@class A<T>\n---@class B<U>\n---@field x U\n\n---@type B<number>\nlocal b\n---@type A<string>\nlocal a\nlocal v, w = b.x, a.x";
        assert_eq!(infer_local(&project, "/p/m.lua", source, "v"), Some(Ty::NUMBER));
        assert_eq!(infer_local(&project, "/p/m.lua", source, "w"), None);
        assert_eq!(project.index().get(crate::index::StubKey::ClassMember, "B*x").len(), 1);
        assert!(project.index().get(crate::index::StubKey::ClassMember, "A*x").is_empty());
    }
}
