use std::sync::Arc;

use emmy_parser::{DocTag, NodeId, NodeKind, NodeRef};

use crate::project::LuaFile;
use crate::search::SearchContext;
use crate::ty::doc::DocTyConverter;
use crate::ty::{Ty, TyAlias, TyGenericParameter};

use super::StubKey;

/// A `---@class` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub node: NodeRef,
    pub generics: Vec<TyGenericParameter>,
    pub supers: Vec<Ty>,
    /// Variable the class doc is attached to
    pub var_name: Option<String>,
    pub global: bool,
}

impl ClassDecl {
    /// Index class names the members of this class are registered under.
    pub fn class_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        if let (true, Some(var)) = (self.global, &self.var_name) {
            names.push(format!("${}", var));
        }
        names
    }
}

fn first(ctx: &SearchContext, key: StubKey, name: &str) -> Option<NodeRef> {
    let mut found = None;
    ctx.project().index().process(ctx, key, name, |node| {
        found = Some(node);
        false
    });
    found
}

pub fn find_class(ctx: &SearchContext, name: &str) -> Option<ClassDecl> {
    let node = first(ctx, StubKey::Class, name)?;
    class_decl(ctx, node)
}

/// Class declared by the doc tag at `tag`. Works in dumb mode.
pub(crate) fn class_decl(ctx: &SearchContext, tag: NodeRef) -> Option<ClassDecl> {
    let file = ctx.file(tag.file)?;
    let NodeKind::DocTag(DocTag::Class { name, generics, supers }) = file.tree.kind(tag.node) else {
        return None;
    };
    let converter = DocTyConverter::new(ctx, format!("class:{}", name));
    let generics = converter.declare_generics(generics);
    let converter = converter.with_generics(generics.clone());
    let supers = supers.iter().map(|s| converter.ty(s)).collect();
    let (var_name, global) = match attached_variable(&file, tag.node) {
        Some((name, global)) => (Some(name), global),
        None => (None, false),
    };
    Some(ClassDecl {
        name: name.clone(),
        node: tag,
        generics,
        supers,
        var_name,
        global,
    })
}

/// Statement a doc tag is attached to.
pub(crate) fn tag_owner(file: &LuaFile, tag: NodeId) -> Option<NodeId> {
    let tree = &file.tree;
    let doc = tree.parent(tag)?;
    let owner = tree.parent(doc)?;
    (tree.doc(owner) == Some(doc)).then_some(owner)
}

/// Name of the variable declared by the statement a doc tag is attached to,
/// and whether it is global.
fn attached_variable(file: &LuaFile, tag: NodeId) -> Option<(String, bool)> {
    let tree = &file.tree;
    let owner = tag_owner(file, tag)?;
    match tree.kind(owner) {
        NodeKind::LocalDef { names, .. } => {
            let name = tree.name(*names.first()?)?;
            Some((name.to_string(), false))
        }
        NodeKind::Assign { vars, .. } => {
            let var = *vars.first()?;
            let name = tree.name(var)?;
            Some((name.to_string(), file.decls.is_global(var)))
        }
        _ => None,
    }
}

pub fn find_alias(ctx: &SearchContext, name: &str) -> Option<Arc<TyAlias>> {
    let node = first(ctx, StubKey::Alias, name)?;
    let _guard = ctx.enter_alias(name)?;
    let file = ctx.file(node.file)?;
    let NodeKind::DocTag(DocTag::Alias { name, generics, ty }) = file.tree.kind(node.node) else {
        return None;
    };
    let converter = DocTyConverter::new(ctx, format!("alias:{}", name));
    let params = converter.declare_generics(generics);
    let converter = converter.with_generics(params.clone());
    Some(Arc::new(TyAlias {
        name: name.clone(),
        params,
        ty: converter.ty(ty),
    }))
}

/// Declaring nodes of a global variable across the project.
pub fn find_globals(ctx: &SearchContext, name: &str) -> Vec<NodeRef> {
    let mut found = Vec::new();
    ctx.project().index().process(ctx, StubKey::Global, name, |node| {
        found.push(node);
        true
    });
    found
}
