//! Lua syntax layer for the EmmyLua type engine.
//!
//! Parses Lua with tree-sitter, lowers the CST into an owned [`SyntaxTree`]
//! with EmmyLua doc comments attached, and resolves names to their first
//! declaration with [`DeclarationTree`].

pub mod declaration;
pub mod doc;
mod error;
mod incremental;
mod lower;
pub mod syntax;

use tree_sitter::Parser;

pub use declaration::{DeclarationTree, Resolution};
pub use doc::{DocError, DocFieldKey, DocFun, DocGeneric, DocParam, DocTableField, DocTag, DocTy};
pub use error::ParseError;
pub use incremental::{CachedParse, IncrementalParser};
pub use syntax::{
    BinaryOp, Diagnostic, FieldKey, FileId, IndexKey, LiteralKind, NodeId, NodeKind, NodeRef,
    SourcePosition, SourceRange, SyntaxNode, SyntaxTree, UnaryOp,
};

pub(crate) fn lua_parser() -> Result<Parser, ParseError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_lua::LANGUAGE.into())?;
    Ok(parser)
}

/// Parse Lua source into a lowered syntax tree.
pub fn parse(source: &str) -> Result<SyntaxTree, ParseError> {
    let mut parser = lua_parser()?;
    parse_with(&mut parser, source)
}

pub(crate) fn parse_with(parser: &mut Parser, source: &str) -> Result<SyntaxTree, ParseError> {
    let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
    let lowered = lower::lower(&tree, source);
    if tree.root_node().has_error() {
        tracing::debug!(
            diagnostics = lowered.diagnostics().len(),
            "parsed Lua source with syntax errors"
        );
    }
    Ok(lowered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(tree: &SyntaxTree) -> Vec<NodeId> {
        let NodeKind::Chunk { block } = tree.kind(tree.root()) else {
            panic!("root is not a chunk");
        };
        let NodeKind::Block { stats } = tree.kind(*block) else {
            panic!("chunk without block");
        };
        stats.clone()
    }

    #[test]
    fn test_parse_local_declaration() {
        let tree = parse("local a, b = 1, 'two'").unwrap();
        let stats = stats(&tree);
        assert_eq!(stats.len(), 1);
        let NodeKind::LocalDef { names, exprs } = tree.kind(stats[0]) else {
            panic!("expected local definition, got {:?}", tree.kind(stats[0]));
        };
        assert_eq!(names.len(), 2);
        assert_eq!(tree.name(names[1]), Some("b"));
        assert_eq!(
            tree.kind(exprs[1]),
            &NodeKind::Literal {
                kind: LiteralKind::String,
                text: "two".into()
            }
        );
    }

    #[test]
    fn test_parse_method_definition() {
        let tree = parse("function M:get(x) return x end").unwrap();
        let stats = stats(&tree);
        let NodeKind::ClassMethodDef { target, func } = tree.kind(stats[0]) else {
            panic!("expected method definition");
        };
        assert!(matches!(tree.kind(*target), NodeKind::Index { colon: true, .. }));
        let NodeKind::FuncBody { params, vararg, .. } = tree.kind(*func) else {
            panic!("expected function body");
        };
        assert_eq!(params.len(), 1);
        assert!(!vararg);
    }

    #[test]
    fn test_parse_local_function() {
        let tree = parse("local function f(...) end").unwrap();
        let stats = stats(&tree);
        let NodeKind::LocalFuncDef { name, func } = tree.kind(stats[0]) else {
            panic!("expected local function, got {:?}", tree.kind(stats[0]));
        };
        assert_eq!(tree.name(*name), Some("f"));
        assert!(matches!(tree.kind(*func), NodeKind::FuncBody { vararg: true, .. }));
    }

    #[test]
    fn test_parse_table_fields() {
        let tree = parse("local t = { a = 1, [k] = 2, 'x', 'y' }").unwrap();
        let table = tree
            .ids()
            .find(|&id| matches!(tree.kind(id), NodeKind::Table { .. }))
            .unwrap();
        let NodeKind::Table { fields } = tree.kind(table) else {
            unreachable!()
        };
        let keys: Vec<&FieldKey> = fields
            .iter()
            .map(|&f| match tree.kind(f) {
                NodeKind::TableField { key, .. } => key,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(keys[0], &FieldKey::Name("a".into()));
        assert!(matches!(keys[1], FieldKey::Expr(_)));
        assert_eq!(keys[2], &FieldKey::Positional(1));
        assert_eq!(keys[3], &FieldKey::Positional(2));
    }

    #[test]
    fn test_doc_comment_attaches_to_statement() {
        let code = r#"
---@class Point
---@field x number
local Point = {}
"#;
        let tree = parse(code).unwrap();
        let stats = stats(&tree);
        let tags: Vec<&DocTag> = tree.doc_tags(stats[0]).map(|(_, t)| t).collect();
        assert_eq!(tags.len(), 2);
        assert!(matches!(tags[0], DocTag::Class { name, .. } if name == "Point"));
    }

    #[test]
    fn test_detached_doc_comment_is_free() {
        let code = "---@alias Id number\n\nlocal x = 1\n";
        let tree = parse(code).unwrap();
        let stats = stats(&tree);
        assert!(tree.doc(stats[0]).is_none());
        assert_eq!(tree.docs().len(), 1);
    }

    #[test]
    fn test_alias_continuation_lines() {
        let code = "---@alias Mode\n---| \"read\"\n---| \"write\"\nlocal m\n";
        let tree = parse(code).unwrap();
        let stats = stats(&tree);
        let tags: Vec<&DocTag> = tree.doc_tags(stats[0]).map(|(_, t)| t).collect();
        let DocTag::Alias { ty: DocTy::Union(list), .. } = tags[0] else {
            panic!("expected alias union, got {:?}", tags[0]);
        };
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_inline_cast_attaches_to_expression() {
        let tree = parse("local x = --[[---@type string]] get()").unwrap();
        let call = tree
            .ids()
            .find(|&id| matches!(tree.kind(id), NodeKind::Call { .. }))
            .unwrap();
        let tags: Vec<&DocTag> = tree.doc_tags(call).map(|(_, t)| t).collect();
        assert_eq!(tags, vec![&DocTag::Type { tys: vec![DocTy::named("string")] }]);
    }

    #[test]
    fn test_invalid_doc_is_reported() {
        let tree = parse("---@type fun(\nlocal x = 1").unwrap();
        assert_eq!(tree.diagnostics().len(), 1);
    }

    #[test]
    fn test_binary_and_unary() {
        let tree = parse("local x = not a and -b .. c").unwrap();
        let ops: Vec<BinaryOp> = tree
            .ids()
            .filter_map(|id| match tree.kind(id) {
                NodeKind::Binary { op, .. } => Some(*op),
                _ => None,
            })
            .collect();
        assert!(ops.contains(&BinaryOp::And));
        assert!(ops.contains(&BinaryOp::Concat));
        assert!(tree
            .ids()
            .any(|id| matches!(tree.kind(id), NodeKind::Unary { op: UnaryOp::Not, .. })));
    }
}
