//! Stub builder: the index entries one file contributes.
//!
//! Runs with a dumb [`SearchContext`], so every type it infers is computed
//! from the file alone. Globals that cannot be resolved that way show up as
//! `$name` classes, which lookups later join with the table assigned to the
//! global.

use emmy_parser::{DocFieldKey, DocTag, DocTy, FieldKey, IndexKey, LiteralKind, NodeId, NodeKind};

use crate::infer::{class_names, field_converter, infer, is_variadic_tail};
use crate::project::LuaFile;
use crate::search::SearchContext;
use crate::ty::{ClassKind, Ty, TyPrimitiveKind};

use super::{IndexSink, StubKey};

pub(crate) fn build_stubs(ctx: &SearchContext, file: &LuaFile) -> IndexSink {
    let mut sink = IndexSink::new(file.id);
    doc_stubs(ctx, file, &mut sink);
    for (name, node) in file.decls.globals() {
        sink.occurrence(StubKey::Global, name, node);
    }
    let tree = &file.tree;
    for id in tree.ids() {
        match tree.kind(id) {
            NodeKind::Index { .. } if is_member_definition(file, id) => index_stubs(ctx, file, id, &mut sink),
            NodeKind::Table { fields } => table_stubs(ctx, file, id, fields, &mut sink),
            _ => {}
        }
    }
    tracing::trace!(file = %file.id, entries = sink.len(), "stubs built");
    sink
}

fn doc_stubs(ctx: &SearchContext, file: &LuaFile, sink: &mut IndexSink) {
    let tree = &file.tree;
    for &doc in tree.docs() {
        let NodeKind::DocComment { tags } = tree.kind(doc) else {
            continue;
        };
        let mut class: Option<&str> = None;
        for &tag in tags {
            let NodeKind::DocTag(doc_tag) = tree.kind(tag) else {
                continue;
            };
            match doc_tag {
                DocTag::Class { name, supers, .. } => {
                    sink.occurrence(StubKey::Class, name.as_str(), tag);
                    for super_ty in supers {
                        if let DocTy::Name { name: super_name, .. } = super_ty {
                            sink.occurrence(StubKey::SuperClass, super_name.as_str(), tag);
                        }
                    }
                    class = Some(name.as_str());
                }
                DocTag::Field { key, .. } => {
                    let Some(class) = class else {
                        continue;
                    };
                    match key {
                        DocFieldKey::Name(name) => {
                            sink.member(class, name, tag);
                            sink.occurrence(StubKey::ShortName, name.as_str(), tag);
                        }
                        DocFieldKey::Indexer(key) => {
                            let key_ty = field_converter(ctx, file, tag).ty(key);
                            index_stub(sink, class, &key_ty, tag);
                        }
                    }
                }
                DocTag::Alias { name, .. } => sink.occurrence(StubKey::Alias, name.as_str(), tag),
                _ => {}
            }
        }
    }
}

/// `a.b = v`, `a[k] = v` and `function a:b() end` define members of `a`.
fn is_member_definition(file: &LuaFile, id: NodeId) -> bool {
    let tree = &file.tree;
    match tree.declaring_statement(id) {
        Some((stat, _)) => matches!(tree.kind(stat), NodeKind::Assign { .. } | NodeKind::ClassMethodDef { .. }),
        None => false,
    }
}

fn index_stubs(ctx: &SearchContext, file: &LuaFile, id: NodeId, sink: &mut IndexSink) {
    let tree = &file.tree;
    let NodeKind::Index { prefix, key, .. } = tree.kind(id) else {
        return;
    };
    let name = match key {
        IndexKey::Name(name) => Some(name.clone()),
        IndexKey::Expr(expr) => match tree.kind(*expr) {
            NodeKind::Literal {
                kind: LiteralKind::String,
                text,
            } => Some(text.clone()),
            _ => None,
        },
    };
    let prefix_ty = ctx
        .with_index(0, false, |ctx| infer(ctx, file.node(*prefix)))
        .unwrap_or(Ty::Unknown);

    let mut classes = Vec::new();
    let mut on_g = false;
    for member in prefix_ty.members() {
        if let Ty::Class(class) = member {
            if class.kind == ClassKind::G {
                if let Some(name) = &name {
                    sink.occurrence(StubKey::Global, name.as_str(), id);
                }
                on_g = true;
                continue;
            }
        }
        classes.extend(class_names(ctx, member));
    }

    match (&name, key) {
        (Some(name), _) => {
            if classes.is_empty() && !on_g {
                sink.occurrence(StubKey::UnknownMember, name.as_str(), id);
            }
            for class in &classes {
                sink.member(class, name, id);
            }
            sink.occurrence(StubKey::ShortName, name.as_str(), id);
        }
        (None, IndexKey::Expr(expr)) => {
            let key_ty = ctx
                .with_index(0, false, |ctx| infer(ctx, file.node(*expr)))
                .unwrap_or(Ty::Unknown);
            for class in &classes {
                index_stub(sink, class, &key_ty, id);
            }
        }
        (None, IndexKey::Name(_)) => {}
    }
}

fn table_stubs(ctx: &SearchContext, file: &LuaFile, id: NodeId, fields: &[NodeId], sink: &mut IndexSink) {
    let tree = &file.tree;
    let class = attached_class(file, id).unwrap_or_else(|| format!("table@{}", file.node(id)));
    for &field in fields {
        let NodeKind::TableField { key, .. } = tree.kind(field) else {
            continue;
        };
        match key {
            FieldKey::Name(name) => {
                sink.member(&class, name, field);
                sink.occurrence(StubKey::ShortName, name.as_str(), field);
            }
            FieldKey::Expr(expr) => {
                let key_ty = ctx
                    .with_index(0, false, |ctx| infer(ctx, file.node(*expr)))
                    .unwrap_or(Ty::Unknown);
                index_stub(sink, &class, &key_ty, field);
            }
            FieldKey::Positional(pos) => {
                index_stub(sink, &class, &Ty::number(pos.to_string()), field);
                if is_variadic_tail(file, field) {
                    index_stub(sink, &class, &Ty::NUMBER, field);
                }
            }
        }
    }
}

/// `---@class` on the statement whose first value is the table constructor.
fn attached_class(file: &LuaFile, table: NodeId) -> Option<String> {
    let tree = &file.tree;
    let stat = tree.parent(table)?;
    let exprs = match tree.kind(stat) {
        NodeKind::LocalDef { exprs, .. } | NodeKind::Assign { exprs, .. } => exprs,
        _ => return None,
    };
    if exprs.first() != Some(&table) {
        return None;
    }
    tree.doc_tags(stat).find_map(|(_, tag)| match tag {
        DocTag::Class { name, .. } => Some(name.clone()),
        _ => None,
    })
}

/// Registers an indexer member; string literal keys become named members.
fn index_stub(sink: &mut IndexSink, class: &str, key_ty: &Ty, node: NodeId) {
    for member in key_ty.members() {
        match member {
            Ty::Literal(TyPrimitiveKind::String, value) => sink.member(class, value, node),
            other => {
                sink.member(class, &format!("[{}]", other.key_id()), node);
                sink.occurrence(StubKey::ClassMember, format!("{}[]", class), node);
            }
        }
    }
}
