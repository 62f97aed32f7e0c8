//! Lowers a tree-sitter Lua CST into a [`SyntaxTree`].
//!
//! Doc comments are not part of the grammar (they are `comment` extras), so
//! they are collected up front and attached by position: a run of `---`
//! lines goes to the statement that starts right after it, and a
//! `--[[---@type T]]` block comment goes to the expression right after it.

use std::collections::HashMap;
use std::ops::Range;

use tree_sitter::Node;

use crate::doc::{DocTag, DocTy, parse_alias_variant, parse_tag};
use crate::syntax::{
    BinaryOp, Diagnostic, FieldKey, IndexKey, LiteralKind, NodeId, NodeKind, SourcePosition,
    SourceRange, SyntaxNode, SyntaxTree, UnaryOp,
};

#[derive(Debug, Clone)]
struct CommentLine {
    text: String,
    range: SourceRange,
    bytes: Range<usize>,
}

#[derive(Debug, Clone, Default)]
struct CommentGroup {
    lines: Vec<CommentLine>,
}

impl CommentGroup {
    fn range(&self) -> SourceRange {
        match (self.lines.first(), self.lines.last()) {
            (Some(first), Some(last)) => SourceRange {
                start: first.range.start,
                end: last.range.end,
            },
            _ => SourceRange::default(),
        }
    }

    fn bytes(&self) -> Range<usize> {
        match (self.lines.first(), self.lines.last()) {
            (Some(first), Some(last)) => first.bytes.start..last.bytes.end,
            _ => 0..0,
        }
    }
}

fn range_of(node: Node) -> SourceRange {
    let start = node.start_position();
    let end = node.end_position();
    SourceRange {
        start: SourcePosition {
            line: start.row,
            column: start.column,
        },
        end: SourcePosition {
            line: end.row,
            column: end.column,
        },
    }
}

/// First non-whitespace byte at or after `from`, and how many newlines were skipped.
fn next_token(source: &str, from: usize) -> (usize, usize) {
    let mut newlines = 0;
    for (offset, c) in source[from.min(source.len())..].char_indices() {
        if c == '\n' {
            newlines += 1;
        } else if !c.is_whitespace() {
            return (from + offset, newlines);
        }
    }
    (source.len(), newlines)
}

fn unquote(text: &str) -> String {
    if text.starts_with('[') {
        let level = text[1..].chars().take_while(|&c| c == '=').count();
        let open = level + 2;
        let close = format!("]{}]", "=".repeat(level));
        let Some(body) = text.get(open..).and_then(|rest| rest.strip_suffix(close.as_str())) else {
            return String::new();
        };
        return body
            .strip_prefix("\r\n")
            .or_else(|| body.strip_prefix('\n'))
            .unwrap_or(body)
            .to_string();
    }

    let inner: &str = match text.chars().next() {
        Some(q @ ('"' | '\'')) => {
            let rest = &text[1..];
            rest.strip_suffix(q).unwrap_or(rest)
        }
        _ => text,
    };
    unescape(inner)
}

/// Decodes Lua short-string escapes. `\ddd` and `\xXX` produce raw bytes,
/// so invalid UTF-8 is replaced rather than rejected.
fn unescape(inner: &str) -> String {
    let mut out: Vec<u8> = Vec::with_capacity(inner.len());
    let mut iter = inner.chars().peekable();
    while let Some(c) = iter.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let Some(next) = iter.next() else {
            break;
        };
        match next {
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'v' => out.push(0x0b),
            '\n' => {
                out.push(b'\n');
                iter.next_if_eq(&'\r');
            }
            '\r' => {
                out.push(b'\n');
                iter.next_if_eq(&'\n');
            }
            'z' => while iter.next_if(|c| c.is_whitespace()).is_some() {},
            'x' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    let Some(d) = iter.next_if(|c| c.is_ascii_hexdigit()).and_then(|c| c.to_digit(16)) else {
                        break;
                    };
                    value = value * 16 + d;
                    digits += 1;
                }
                if digits == 0 {
                    out.push(b'x');
                } else {
                    out.push(value as u8);
                }
            }
            'u' if iter.peek() == Some(&'{') => {
                iter.next();
                let mut value = 0u32;
                while let Some(d) = iter.next_if(|c| c.is_ascii_hexdigit()).and_then(|c| c.to_digit(16)) {
                    value = value.saturating_mul(16).saturating_add(d);
                }
                iter.next_if_eq(&'}');
                let c = char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER);
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            d if d.is_ascii_digit() => {
                let mut value = d.to_digit(10).unwrap_or(0);
                for _ in 0..2 {
                    let Some(d) = iter.next_if(|c| c.is_ascii_digit()).and_then(|c| c.to_digit(10)) else {
                        break;
                    };
                    value = value * 10 + d;
                }
                out.push(value.min(255) as u8);
            }
            other => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub(crate) struct Lowering<'a> {
    source: &'a str,
    nodes: Vec<SyntaxNode>,
    docs: Vec<NodeId>,
    diagnostics: Vec<Diagnostic>,
    statement_docs: HashMap<usize, CommentGroup>,
    free_docs: Vec<CommentGroup>,
    casts: HashMap<usize, CommentGroup>,
}

pub(crate) fn lower(tree: &tree_sitter::Tree, source: &str) -> SyntaxTree {
    let mut lowering = Lowering {
        source,
        nodes: Vec::new(),
        docs: Vec::new(),
        diagnostics: Vec::new(),
        statement_docs: HashMap::new(),
        free_docs: Vec::new(),
        casts: HashMap::new(),
    };
    lowering.collect_comments(tree.root_node());
    let root = lowering.chunk(tree.root_node());

    let mut leftover: Vec<CommentGroup> = lowering.statement_docs.drain().map(|(_, g)| g).collect();
    leftover.append(&mut lowering.free_docs);
    leftover.sort_by_key(|g| g.bytes().start);
    for group in leftover {
        lowering.doc_comment(group, root);
    }

    let Lowering {
        nodes,
        mut docs,
        diagnostics,
        ..
    } = lowering;
    docs.sort_by_key(|d| nodes[d.0 as usize].bytes.start);

    SyntaxTree {
        nodes,
        root,
        docs,
        diagnostics,
    }
}

impl<'a> Lowering<'a> {
    fn text(&self, node: Node) -> &'a str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    fn collect_comments(&mut self, root: Node) {
        let mut comments = Vec::new();
        gather_comments(root, &mut comments);
        comments.sort_by_key(|c| c.start_byte());

        let mut current: Option<(CommentGroup, usize)> = None;
        for comment in comments {
            let text = self.text(comment);
            let range = range_of(comment);
            let bytes = comment.start_byte()..comment.end_byte();

            if let Some(body) = text.strip_prefix("--[") {
                self.flush_group(current.take());
                let level = body.chars().take_while(|&c| c == '=').count();
                let inner = body
                    .get(level + 1..body.len().saturating_sub(level + 2))
                    .unwrap_or("")
                    .trim();
                if let Some(tag) = inner.strip_prefix("---") {
                    if tag.trim_start().starts_with('@') {
                        let (anchor, _) = next_token(self.source, comment.end_byte());
                        let group = CommentGroup {
                            lines: vec![CommentLine {
                                text: tag.to_string(),
                                range,
                                bytes,
                            }],
                        };
                        self.casts.insert(anchor, group);
                    }
                }
                continue;
            }

            let Some(line) = text.strip_prefix("---") else {
                self.flush_group(current.take());
                continue;
            };
            let line = CommentLine {
                text: line.trim_end().to_string(),
                range,
                bytes,
            };
            match current.as_mut() {
                Some((group, last_row)) if *last_row + 1 == range.start.line => {
                    group.lines.push(line);
                    *last_row = range.start.line;
                }
                _ => {
                    self.flush_group(current.take());
                    current = Some((CommentGroup { lines: vec![line] }, range.start.line));
                }
            }
        }
        self.flush_group(current);
    }

    fn flush_group(&mut self, group: Option<(CommentGroup, usize)>) {
        let Some((group, _)) = group else {
            return;
        };
        let (anchor, newlines) = next_token(self.source, group.bytes().end);
        if newlines <= 1 && anchor < self.source.len() && !self.source[anchor..].starts_with("--") {
            self.statement_docs.insert(anchor, group);
        } else {
            self.free_docs.push(group);
        }
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>, range: SourceRange, bytes: Range<usize>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SyntaxNode {
            kind,
            parent,
            range,
            bytes,
            doc: None,
        });
        id
    }

    fn reserve(&mut self, node: Node, parent: Option<NodeId>) -> NodeId {
        self.push(
            NodeKind::Error,
            parent,
            range_of(node),
            node.start_byte()..node.end_byte(),
        )
    }

    fn set(&mut self, id: NodeId, kind: NodeKind) -> NodeId {
        if let Some(slot) = self.nodes.get_mut(id.0 as usize) {
            slot.kind = kind;
        }
        id
    }

    fn error(&mut self, node: Node, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            message: message.into(),
            range: range_of(node),
        });
    }

    fn doc_comment(&mut self, group: CommentGroup, owner: NodeId) -> NodeId {
        let id = self.push(
            NodeKind::DocComment { tags: Vec::new() },
            Some(owner),
            group.range(),
            group.bytes(),
        );
        let mut tags: Vec<NodeId> = Vec::new();
        for line in group.lines {
            let trimmed = line.text.trim_start();
            if let Some(body) = trimmed.strip_prefix('@') {
                match parse_tag(body) {
                    Ok(tag) => tags.push(self.push(NodeKind::DocTag(tag), Some(id), line.range, line.bytes)),
                    Err(e) => self.diagnostics.push(Diagnostic {
                        message: format!("invalid doc tag '@{}': {}", body.trim(), e),
                        range: line.range,
                    }),
                }
            } else if let Some(variant) = trimmed.strip_prefix('|') {
                let Some(&last) = tags.last() else {
                    continue;
                };
                let parsed = parse_alias_variant(variant);
                let Some(NodeKind::DocTag(DocTag::Alias { ty, .. })) =
                    self.nodes.get_mut(last.0 as usize).map(|n| &mut n.kind)
                else {
                    continue;
                };
                match parsed {
                    Ok(variant) => match ty {
                        DocTy::Union(list) => list.push(variant),
                        other => {
                            let prev = std::mem::replace(other, DocTy::Union(Vec::new()));
                            *other = DocTy::Union(vec![prev, variant]);
                        }
                    },
                    Err(e) => self.diagnostics.push(Diagnostic {
                        message: format!("invalid alias variant '{}': {}", variant.trim(), e),
                        range: line.range,
                    }),
                }
            }
        }
        self.docs.push(id);
        self.set(id, NodeKind::DocComment { tags })
    }

    fn chunk(&mut self, root: Node) -> NodeId {
        let id = self.reserve(root, None);
        let block = self.block(Some(root), root, id);
        self.set(id, NodeKind::Chunk { block })
    }

    /// `container` holds the statements; `at` gives the range when it is absent.
    fn block(&mut self, container: Option<Node>, at: Node, parent: NodeId) -> NodeId {
        let id = self.reserve(container.unwrap_or(at), Some(parent));
        let mut stats = Vec::new();
        if let Some(container) = container {
            let mut cursor = container.walk();
            for child in container.named_children(&mut cursor) {
                match child.kind() {
                    "comment" | "hash_bang_line" => {}
                    _ => stats.push(self.statement(child, id)),
                }
            }
        }
        self.set(id, NodeKind::Block { stats })
    }

    fn statement(&mut self, node: Node, parent: NodeId) -> NodeId {
        let id = self.reserve(node, Some(parent));
        if let Some(group) = self.statement_docs.remove(&node.start_byte()) {
            let doc = self.doc_comment(group, id);
            if let Some(slot) = self.nodes.get_mut(id.0 as usize) {
                slot.doc = Some(doc);
            }
        }

        let kind = match node.kind() {
            "variable_declaration" => self.local_declaration(node, id),
            "assignment_statement" => {
                let (vars, exprs) = self.assignment_lists(node, id);
                NodeKind::Assign { vars, exprs }
            }
            "function_declaration" => self.function_declaration(node, id, false),
            "function_call" => NodeKind::ExprStat {
                expr: self.expr(node, id),
            },
            "return_statement" => {
                let mut exprs = Vec::new();
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    match child.kind() {
                        "expression_list" => exprs = self.expr_list(child, id),
                        "comment" => {}
                        _ => exprs.push(self.expr(child, id)),
                    }
                }
                NodeKind::Return { exprs }
            }
            "do_statement" => NodeKind::Do {
                block: self.block(node.child_by_field_name("body"), node, id),
            },
            "while_statement" => {
                let cond = self.field_expr(node, "condition", id);
                let block = self.block(node.child_by_field_name("body"), node, id);
                NodeKind::While { cond, block }
            }
            "repeat_statement" => {
                let block = self.block(node.child_by_field_name("body"), node, id);
                let cond = self.field_expr(node, "condition", id);
                NodeKind::Repeat { block, cond }
            }
            "if_statement" => {
                let mut clauses = Vec::new();
                let cond = self.field_expr(node, "condition", id);
                let block = self.block(node.child_by_field_name("consequence"), node, id);
                clauses.push((Some(cond), block));
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    match child.kind() {
                        "elseif_statement" => {
                            let cond = self.field_expr(child, "condition", id);
                            let block = self.block(child.child_by_field_name("consequence"), child, id);
                            clauses.push((Some(cond), block));
                        }
                        "else_statement" => {
                            let block = self.block(child.child_by_field_name("body"), child, id);
                            clauses.push((None, block));
                        }
                        _ => {}
                    }
                }
                NodeKind::If { clauses }
            }
            "for_statement" => self.for_statement(node, id),
            "ERROR" => {
                self.error(node, "syntax error");
                NodeKind::OtherStat
            }
            _ => NodeKind::OtherStat,
        };
        self.set(id, kind)
    }

    fn local_declaration(&mut self, node: Node, id: NodeId) -> NodeKind {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "attribute_name_list" | "variable_list" => {
                    let names = self.local_names(child, id);
                    return NodeKind::LocalDef {
                        names,
                        exprs: Vec::new(),
                    };
                }
                "assignment_statement" => {
                    let mut names = Vec::new();
                    let mut exprs = Vec::new();
                    let mut inner = child.walk();
                    for part in child.named_children(&mut inner) {
                        match part.kind() {
                            "variable_list" | "attribute_name_list" => names = self.local_names(part, id),
                            "expression_list" => exprs = self.expr_list(part, id),
                            _ => {}
                        }
                    }
                    return NodeKind::LocalDef { names, exprs };
                }
                "function_declaration" => return self.function_declaration(child, id, true),
                _ => {}
            }
        }
        NodeKind::LocalDef {
            names: Vec::new(),
            exprs: Vec::new(),
        }
    }

    fn local_names(&mut self, list: Node, parent: NodeId) -> Vec<NodeId> {
        let mut names: Vec<NodeId> = Vec::new();
        let mut cursor = list.walk();
        for child in list.named_children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    let name = self.text(child).to_string();
                    let id = self.reserve(child, Some(parent));
                    names.push(self.set(id, NodeKind::LocalName { name, attrib: None }));
                }
                "attribute" => {
                    let attrib = self
                        .text(child)
                        .trim_matches(|c: char| c == '<' || c == '>' || c.is_whitespace())
                        .to_string();
                    if let Some(&last) = names.last() {
                        if let Some(NodeKind::LocalName { attrib: slot, .. }) =
                            self.nodes.get_mut(last.0 as usize).map(|n| &mut n.kind)
                        {
                            *slot = Some(attrib);
                        }
                    }
                }
                _ => {}
            }
        }
        names
    }

    fn assignment_lists(&mut self, node: Node, parent: NodeId) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut vars = Vec::new();
        let mut exprs = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "variable_list" => vars = self.expr_list(child, parent),
                "expression_list" => exprs = self.expr_list(child, parent),
                _ => {}
            }
        }
        (vars, exprs)
    }

    fn function_declaration(&mut self, node: Node, id: NodeId, local: bool) -> NodeKind {
        let mut cursor = node.walk();
        let local = local || node.children(&mut cursor).next().is_some_and(|c| c.kind() == "local");

        let Some(name_node) = node.child_by_field_name("name") else {
            self.error(node, "function declaration without a name");
            let func = self.func_body(node, id);
            let name = self.push(NodeKind::Error, Some(id), range_of(node), node.start_byte()..node.start_byte());
            return NodeKind::FuncDef { name, func };
        };

        if local {
            let name = self.text(name_node).to_string();
            let name_id = self.reserve(name_node, Some(id));
            self.set(name_id, NodeKind::LocalName { name, attrib: None });
            let func = self.func_body(node, id);
            return NodeKind::LocalFuncDef { name: name_id, func };
        }

        match name_node.kind() {
            "dot_index_expression" | "method_index_expression" => {
                let target = self.expr(name_node, id);
                let func = self.func_body(node, id);
                NodeKind::ClassMethodDef { target, func }
            }
            _ => {
                let name = self.expr(name_node, id);
                let func = self.func_body(node, id);
                NodeKind::FuncDef { name, func }
            }
        }
    }

    fn func_body(&mut self, node: Node, parent: NodeId) -> NodeId {
        let id = self.reserve(node, Some(parent));
        let mut params = Vec::new();
        let mut vararg = false;
        if let Some(list) = node.child_by_field_name("parameters") {
            let mut cursor = list.walk();
            for child in list.named_children(&mut cursor) {
                match child.kind() {
                    "identifier" => {
                        let name = self.text(child).to_string();
                        let param = self.reserve(child, Some(id));
                        params.push(self.set(param, NodeKind::Param { name }));
                    }
                    "vararg_expression" => vararg = true,
                    _ => {}
                }
            }
        }
        let block = self.block(node.child_by_field_name("body"), node, id);
        self.set(id, NodeKind::FuncBody { params, vararg, block })
    }

    fn for_statement(&mut self, node: Node, id: NodeId) -> NodeKind {
        let Some(clause) = node.child_by_field_name("clause") else {
            self.error(node, "for statement without a clause");
            return NodeKind::OtherStat;
        };
        match clause.kind() {
            "for_numeric_clause" => {
                let var = match clause.child_by_field_name("name") {
                    Some(name) => {
                        let text = self.text(name).to_string();
                        let var = self.reserve(name, Some(id));
                        self.set(var, NodeKind::LocalName { name: text, attrib: None })
                    }
                    None => self.missing(clause, id),
                };
                let start = self.field_expr(clause, "start", id);
                let end = self.field_expr(clause, "end", id);
                let step = clause.child_by_field_name("step").map(|s| self.expr(s, id));
                let block = self.block(node.child_by_field_name("body"), node, id);
                NodeKind::ForNum {
                    var,
                    start,
                    end,
                    step,
                    block,
                }
            }
            _ => {
                let mut vars = Vec::new();
                let mut exprs = Vec::new();
                let mut cursor = clause.walk();
                for child in clause.named_children(&mut cursor) {
                    match child.kind() {
                        "variable_list" => vars = self.local_names(child, id),
                        "expression_list" => exprs = self.expr_list(child, id),
                        _ => {}
                    }
                }
                let block = self.block(node.child_by_field_name("body"), node, id);
                NodeKind::ForIn { vars, exprs, block }
            }
        }
    }

    fn missing(&mut self, at: Node, parent: NodeId) -> NodeId {
        self.push(NodeKind::Error, Some(parent), range_of(at), at.end_byte()..at.end_byte())
    }

    fn field_expr(&mut self, node: Node, field: &str, parent: NodeId) -> NodeId {
        match node.child_by_field_name(field) {
            Some(child) => self.expr(child, parent),
            None => self.missing(node, parent),
        }
    }

    fn expr_list(&mut self, list: Node, parent: NodeId) -> Vec<NodeId> {
        let mut exprs = Vec::new();
        let mut cursor = list.walk();
        for child in list.named_children(&mut cursor) {
            if child.kind() != "comment" {
                exprs.push(self.expr(child, parent));
            }
        }
        exprs
    }

    fn expr(&mut self, node: Node, parent: NodeId) -> NodeId {
        let id = self.reserve(node, Some(parent));
        if let Some(group) = self.casts.remove(&node.start_byte()) {
            let doc = self.doc_comment(group, id);
            if let Some(slot) = self.nodes.get_mut(id.0 as usize) {
                slot.doc = Some(doc);
            }
        }

        let kind = match node.kind() {
            "identifier" => NodeKind::Name {
                name: self.text(node).to_string(),
            },
            "dot_index_expression" | "method_index_expression" => {
                let prefix = self.field_expr(node, "table", id);
                let field = if node.kind() == "method_index_expression" { "method" } else { "field" };
                let key = node
                    .child_by_field_name(field)
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default();
                NodeKind::Index {
                    prefix,
                    key: IndexKey::Name(key),
                    colon: node.kind() == "method_index_expression",
                }
            }
            "bracket_index_expression" => {
                let prefix = self.field_expr(node, "table", id);
                let key = self.field_expr(node, "field", id);
                NodeKind::Index {
                    prefix,
                    key: IndexKey::Expr(key),
                    colon: false,
                }
            }
            "function_call" => {
                let callee = self.field_expr(node, "name", id);
                let mut args = Vec::new();
                if let Some(arguments) = node.child_by_field_name("arguments") {
                    match arguments.kind() {
                        "table_constructor" | "string" => args.push(self.expr(arguments, id)),
                        _ => args = self.expr_list(arguments, id),
                    }
                }
                NodeKind::Call { callee, args }
            }
            "parenthesized_expression" => {
                let mut cursor = node.walk();
                let inner = node.named_children(&mut cursor).find(|c| c.kind() != "comment");
                let expr = match inner {
                    Some(inner) => self.expr(inner, id),
                    None => self.missing(node, id),
                };
                NodeKind::Paren { expr }
            }
            "function_definition" => NodeKind::Closure {
                func: self.func_body(node, id),
            },
            "table_constructor" => self.table(node, id),
            "binary_expression" => {
                let left = self.field_expr(node, "left", id);
                let right = self.field_expr(node, "right", id);
                let mut cursor = node.walk();
                let op = node
                    .children(&mut cursor)
                    .filter(|c| !c.is_named())
                    .find_map(|c| BinaryOp::from_token(c.kind()));
                match op {
                    Some(op) => NodeKind::Binary { op, left, right },
                    None => {
                        self.error(node, "unknown binary operator");
                        NodeKind::Error
                    }
                }
            }
            "unary_expression" => {
                let mut cursor = node.walk();
                let op = node
                    .children(&mut cursor)
                    .filter(|c| !c.is_named())
                    .find_map(|c| match c.kind() {
                        "-" => Some(UnaryOp::Minus),
                        "not" => Some(UnaryOp::Not),
                        "#" => Some(UnaryOp::Len),
                        "~" => Some(UnaryOp::BitNot),
                        _ => None,
                    });
                let operand = self.field_expr(node, "operand", id);
                match op {
                    Some(op) => NodeKind::Unary { op, operand },
                    None => {
                        self.error(node, "unknown unary operator");
                        NodeKind::Error
                    }
                }
            }
            "string" => NodeKind::Literal {
                kind: LiteralKind::String,
                text: unquote(self.text(node)),
            },
            "number" => NodeKind::Literal {
                kind: LiteralKind::Number,
                text: self.text(node).to_string(),
            },
            "nil" => literal(LiteralKind::Nil, "nil"),
            "true" => literal(LiteralKind::True, "true"),
            "false" => literal(LiteralKind::False, "false"),
            "vararg_expression" => literal(LiteralKind::Varargs, "..."),
            other => {
                self.error(node, format!("unexpected {} in expression", other));
                NodeKind::Error
            }
        };
        self.set(id, kind)
    }

    fn table(&mut self, node: Node, id: NodeId) -> NodeKind {
        let mut fields = Vec::new();
        let mut position = 0;
        let mut cursor = node.walk();
        for field in node.named_children(&mut cursor) {
            if field.kind() != "field" {
                continue;
            }
            let field_id = self.reserve(field, Some(id));
            let mut inner = field.walk();
            let bracketed = field.children(&mut inner).next().is_some_and(|c| c.kind() == "[");
            let key = match field.child_by_field_name("name") {
                Some(name) if bracketed => FieldKey::Expr(self.expr(name, field_id)),
                Some(name) => FieldKey::Name(self.text(name).to_string()),
                None => {
                    position += 1;
                    FieldKey::Positional(position)
                }
            };
            let value = self.field_expr(field, "value", field_id);
            fields.push(self.set(field_id, NodeKind::TableField { key, value }));
        }
        NodeKind::Table { fields }
    }
}

fn literal(kind: LiteralKind, text: &str) -> NodeKind {
    NodeKind::Literal {
        kind,
        text: text.to_string(),
    }
}

fn gather_comments<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "comment" {
            out.push(child);
        } else if child.child_count() > 0 {
            gather_comments(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"hello\""), "hello");
        assert_eq!(unquote("'a\\nb'"), "a\nb");
        assert_eq!(unquote("[[line]]"), "line");
        assert_eq!(unquote("[==[\nx]]y]==]"), "x]]y");
    }

    #[test]
    fn test_unterminated_long_string() {
        assert_eq!(unquote("[[abc"), "");
        assert_eq!(unquote("[==[abc]]"), "");
    }

    #[test]
    fn test_unquote_escapes() {
        assert_eq!(unquote("\"\\65\\x42\""), "AB");
        assert_eq!(unquote("'\\097\\0989'"), "ab9");
        assert_eq!(unquote("'\\x4a\\x6B'"), "Jk");
        assert_eq!(unquote("'a\\z  \n   b'"), "ab");
        assert_eq!(unquote("'\\u{48}\\u{e9}\\u{1F600}'"), "H\u{e9}\u{1F600}");
        assert_eq!(unquote("'\\a\\b\\f\\v'"), "\u{7}\u{8}\u{c}\u{b}");
        assert_eq!(unquote("'\\\\\\\"\\''"), "\\\"'");
        assert_eq!(unquote("'a\\\nb'"), "a\nb");
        assert_eq!(unquote("'\\xff'"), "\u{FFFD}");
    }

    #[test]
    fn test_next_token() {
        let source = "--x\n\n  local";
        assert_eq!(next_token(source, 3), (7, 2));
        assert_eq!(next_token("abc", 3), (3, 0));
    }
}
