//! Owned Lua syntax tree
//!
//! The tree-sitter CST is lowered into a flat arena of [`SyntaxNode`]s. Nodes
//! refer to each other through [`NodeId`] handles, so a tree can be shared
//! between threads and a node can be named across files with a [`NodeRef`].

use std::fmt;
use std::ops::Range;

use crate::doc::DocTag;

/// Identifies a file inside a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// Index of a node inside its [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// A node anywhere in a project: file plus arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub file: FileId,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(file: FileId, node: NodeId) -> Self {
        Self { file, node }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.0, self.node.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceRange {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Nil,
    True,
    False,
    Number,
    String,
    Varargs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    Not,
    Len,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "or" => BinaryOp::Or,
            "and" => BinaryOp::And,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "~=" => BinaryOp::Ne,
            "|" => BinaryOp::BitOr,
            "~" => BinaryOp::BitXor,
            "&" => BinaryOp::BitAnd,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            ".." => BinaryOp::Concat,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "//" => BinaryOp::IDiv,
            "%" => BinaryOp::Mod,
            "^" => BinaryOp::Pow,
            _ => return None,
        };
        Some(op)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }
}

/// Key of an index expression: `a.b` / `a:b` or `a[expr]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexKey {
    Name(String),
    Expr(NodeId),
}

/// Key of a table constructor field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKey {
    /// `name = value`
    Name(String),
    /// `[expr] = value`
    Expr(NodeId),
    /// Positional field, 1-based
    Positional(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Chunk { block: NodeId },
    Block { stats: Vec<NodeId> },

    // Statements
    LocalDef { names: Vec<NodeId>, exprs: Vec<NodeId> },
    Assign { vars: Vec<NodeId>, exprs: Vec<NodeId> },
    LocalFuncDef { name: NodeId, func: NodeId },
    FuncDef { name: NodeId, func: NodeId },
    /// `function a.b() end` / `function a:b() end`, target is the index expression
    ClassMethodDef { target: NodeId, func: NodeId },
    Return { exprs: Vec<NodeId> },
    ExprStat { expr: NodeId },
    Do { block: NodeId },
    While { cond: NodeId, block: NodeId },
    Repeat { block: NodeId, cond: NodeId },
    /// Each clause is `(condition, block)`; the `else` clause has no condition
    If { clauses: Vec<(Option<NodeId>, NodeId)> },
    ForNum { var: NodeId, start: NodeId, end: NodeId, step: Option<NodeId>, block: NodeId },
    ForIn { vars: Vec<NodeId>, exprs: Vec<NodeId>, block: NodeId },
    OtherStat,

    // Declarations
    LocalName { name: String, attrib: Option<String> },
    Param { name: String },
    FuncBody { params: Vec<NodeId>, vararg: bool, block: NodeId },

    // Expressions
    Name { name: String },
    Index { prefix: NodeId, key: IndexKey, colon: bool },
    Call { callee: NodeId, args: Vec<NodeId> },
    Closure { func: NodeId },
    Table { fields: Vec<NodeId> },
    TableField { key: FieldKey, value: NodeId },
    Literal { kind: LiteralKind, text: String },
    Unary { op: UnaryOp, operand: NodeId },
    Binary { op: BinaryOp, left: NodeId, right: NodeId },
    Paren { expr: NodeId },

    // Doc comments
    DocComment { tags: Vec<NodeId> },
    DocTag(DocTag),

    Error,
}

static ERROR_KIND: NodeKind = NodeKind::Error;

impl NodeKind {
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            NodeKind::Name { .. }
                | NodeKind::Index { .. }
                | NodeKind::Call { .. }
                | NodeKind::Closure { .. }
                | NodeKind::Table { .. }
                | NodeKind::Literal { .. }
                | NodeKind::Unary { .. }
                | NodeKind::Binary { .. }
                | NodeKind::Paren { .. }
        )
    }

    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::LocalDef { .. }
                | NodeKind::Assign { .. }
                | NodeKind::LocalFuncDef { .. }
                | NodeKind::FuncDef { .. }
                | NodeKind::ClassMethodDef { .. }
                | NodeKind::Return { .. }
                | NodeKind::ExprStat { .. }
                | NodeKind::Do { .. }
                | NodeKind::While { .. }
                | NodeKind::Repeat { .. }
                | NodeKind::If { .. }
                | NodeKind::ForNum { .. }
                | NodeKind::ForIn { .. }
                | NodeKind::OtherStat
        )
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub range: SourceRange,
    pub bytes: Range<usize>,
    /// Attached doc comment (`DocComment` node)
    pub doc: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub range: SourceRange,
}

#[derive(Debug, Clone)]
pub struct SyntaxTree {
    pub(crate) nodes: Vec<SyntaxNode>,
    pub(crate) root: NodeId,
    pub(crate) docs: Vec<NodeId>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl SyntaxTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&SyntaxNode> {
        self.nodes.get(id.0 as usize)
    }

    /// Kind of `id`, or [`NodeKind::Error`] for a handle from another tree.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        self.get(id).map(|n| &n.kind).unwrap_or(&ERROR_KIND)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    pub fn doc(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.doc)
    }

    pub fn range(&self, id: NodeId) -> SourceRange {
        self.get(id).map(|n| n.range).unwrap_or_default()
    }

    /// All doc comments, attached or free-standing, in source order.
    pub fn docs(&self) -> &[NodeId] {
        &self.docs
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Every node id in allocation order (parents before children).
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// Name carried by `Name`, `LocalName` and `Param` nodes.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Name { name } | NodeKind::LocalName { name, .. } | NodeKind::Param { name } => {
                Some(name.as_str())
            }
            _ => None,
        }
    }

    /// Tags of the doc comment attached to `id`.
    pub fn doc_tags(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &DocTag)> + '_ {
        let tags: &[NodeId] = match self.doc(id).map(|d| self.kind(d)) {
            Some(NodeKind::DocComment { tags }) => tags,
            _ => &[],
        };
        tags.iter().filter_map(move |&t| match self.kind(t) {
            NodeKind::DocTag(tag) => Some((t, tag)),
            _ => None,
        })
    }

    /// Innermost `FuncBody` containing `id`.
    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&n| matches!(self.kind(n), NodeKind::FuncBody { .. }))
    }

    /// The statement (or other declaring construct) that owns a function body.
    pub fn function_owner(&self, func: NodeId) -> Option<NodeId> {
        let parent = self.parent(func)?;
        match self.kind(parent) {
            NodeKind::Closure { .. } => {
                let holder = self.parent(parent)?;
                match self.kind(holder) {
                    NodeKind::LocalDef { .. } | NodeKind::Assign { .. } => Some(holder),
                    _ => None,
                }
            }
            _ => Some(parent),
        }
    }

    /// Statement owning a variable declared by `LocalDef`, `Assign`,
    /// `LocalFuncDef`, `FuncDef` or `ClassMethodDef`, with its position.
    pub fn declaring_statement(&self, var: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(var)?;
        match self.kind(parent) {
            NodeKind::LocalDef { names, .. } => {
                names.iter().position(|&n| n == var).map(|i| (parent, i))
            }
            NodeKind::Assign { vars, .. } => vars.iter().position(|&n| n == var).map(|i| (parent, i)),
            NodeKind::LocalFuncDef { name, .. } | NodeKind::FuncDef { name, .. } if *name == var => {
                Some((parent, 0))
            }
            NodeKind::ClassMethodDef { target, .. } if *target == var => Some((parent, 0)),
            _ => None,
        }
    }

    pub fn is_assign_target(&self, var: NodeId) -> bool {
        self.declaring_statement(var).is_some()
    }
}
