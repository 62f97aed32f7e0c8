//! Per-file name resolution.
//!
//! Walks a [`SyntaxTree`] with a scope stack and records, for every name and
//! index expression, the *first* declaration of the variable it refers to:
//! the local, parameter or loop variable that introduced it, the first
//! assignment of a global in this file, or the first assignment of a field
//! path such as `M.config.debug`.

use std::collections::HashMap;

use crate::syntax::{FieldKey, IndexKey, LiteralKind, NodeId, NodeKind, SyntaxTree};

#[derive(Debug, Clone, Default)]
struct Scope {
    symbols: HashMap<String, NodeId>,
}

/// Result of resolving a single reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Local variable, parameter or loop variable
    Local(NodeId),
    /// Global whose first assignment in this file is the given node
    Global(NodeId),
    /// Field path whose first assignment is the given index expression
    Field(NodeId),
}

impl Resolution {
    pub fn node(self) -> NodeId {
        match self {
            Resolution::Local(n) | Resolution::Global(n) | Resolution::Field(n) => n,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeclarationTree {
    resolved: HashMap<NodeId, Resolution>,
    globals: HashMap<String, NodeId>,
    /// Names referring to globals, whether assigned here or not
    global_refs: HashMap<NodeId, String>,
}

impl DeclarationTree {
    pub fn build(tree: &SyntaxTree) -> Self {
        let mut builder = Builder {
            tree,
            scopes: vec![Scope::default()],
            paths: HashMap::new(),
            out: DeclarationTree::default(),
        };
        builder.node(tree.root());
        builder.out
    }

    /// First declaration of the variable referenced by `node`.
    pub fn resolve(&self, node: NodeId) -> Option<Resolution> {
        self.resolved.get(&node).copied()
    }

    pub fn first_declaration(&self, node: NodeId) -> Option<NodeId> {
        self.resolve(node).map(Resolution::node)
    }

    /// Whether a `Name` node refers to a global variable.
    pub fn is_global(&self, node: NodeId) -> bool {
        self.global_refs.contains_key(&node)
    }

    /// First assignment of each global in this file.
    pub fn globals(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.globals.iter().map(|(name, &node)| (name.as_str(), node))
    }

    pub fn global(&self, name: &str) -> Option<NodeId> {
        self.globals.get(name).copied()
    }
}

struct Builder<'t> {
    tree: &'t SyntaxTree,
    scopes: Vec<Scope>,
    /// `"<root decl>.a.b"` -> first assigned index expression
    paths: HashMap<String, NodeId>,
    out: DeclarationTree,
}

impl Builder<'_> {
    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    fn declare(&mut self, node: NodeId) {
        let Some(name) = self.tree.name(node) else {
            return;
        };
        let name = name.to_string();
        self.out.resolved.insert(node, Resolution::Local(node));
        if let Some(scope) = self.scopes.last_mut() {
            scope.symbols.insert(name, node);
        }
    }

    fn lookup(&self, name: &str) -> Option<NodeId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name).copied())
    }

    /// `a.b["c"]` -> `"<decl of a>.b.c"`; `None` when the chain has a dynamic key.
    fn path(&self, node: NodeId) -> Option<String> {
        match self.tree.kind(node) {
            NodeKind::Name { name } => match self.out.resolve(node) {
                Some(resolution) => Some(format!("#{}", resolution.node().0)),
                None => Some(format!("${}", name)),
            },
            NodeKind::Index { prefix, key, .. } => {
                let key = match key {
                    IndexKey::Name(name) => name.clone(),
                    IndexKey::Expr(expr) => match self.tree.kind(*expr) {
                        NodeKind::Literal { kind: LiteralKind::String, text } => text.clone(),
                        _ => return None,
                    },
                };
                let prefix = self.path(*prefix)?;
                Some(format!("{}.{}", prefix, key))
            }
            _ => None,
        }
    }

    /// A name or index expression being assigned to.
    fn target(&mut self, node: NodeId) {
        match self.tree.kind(node) {
            NodeKind::Name { name } => {
                if let Some(local) = self.lookup(name) {
                    self.out.resolved.insert(node, Resolution::Local(local));
                    return;
                }
                let first = *self.out.globals.entry(name.clone()).or_insert(node);
                self.out.global_refs.insert(node, name.clone());
                self.out.resolved.insert(node, Resolution::Global(first));
            }
            NodeKind::Index { prefix, key, .. } => {
                self.node(*prefix);
                if let IndexKey::Expr(expr) = key {
                    self.node(*expr);
                }
                if let Some(path) = self.path(node) {
                    let first = *self.paths.entry(path).or_insert(node);
                    self.out.resolved.insert(node, Resolution::Field(first));
                }
            }
            _ => self.node(node),
        }
    }

    fn block(&mut self, block: NodeId) {
        self.push_scope();
        self.node(block);
        self.pop_scope();
    }

    fn node(&mut self, id: NodeId) {
        match self.tree.kind(id) {
            NodeKind::Chunk { block } => self.node(*block),
            NodeKind::Block { stats } => {
                for &stat in stats {
                    self.node(stat);
                }
            }
            NodeKind::LocalDef { names, exprs } => {
                for &expr in exprs {
                    self.node(expr);
                }
                for &name in names {
                    self.declare(name);
                }
            }
            NodeKind::Assign { vars, exprs } => {
                for &expr in exprs {
                    self.node(expr);
                }
                for &var in vars {
                    self.target(var);
                }
            }
            NodeKind::LocalFuncDef { name, func } => {
                self.declare(*name);
                self.node(*func);
            }
            NodeKind::FuncDef { name, func } | NodeKind::ClassMethodDef { target: name, func } => {
                self.target(*name);
                self.node(*func);
            }
            NodeKind::Return { exprs } => {
                for &expr in exprs {
                    self.node(expr);
                }
            }
            NodeKind::ExprStat { expr } => self.node(*expr),
            NodeKind::Do { block } => self.block(*block),
            NodeKind::While { cond, block } => {
                self.node(*cond);
                self.block(*block);
            }
            NodeKind::Repeat { block, cond } => {
                // `until` sees the locals of the loop body
                self.push_scope();
                self.node(*block);
                self.node(*cond);
                self.pop_scope();
            }
            NodeKind::If { clauses } => {
                for (cond, block) in clauses {
                    if let Some(cond) = cond {
                        self.node(*cond);
                    }
                    self.block(*block);
                }
            }
            NodeKind::ForNum {
                var,
                start,
                end,
                step,
                block,
            } => {
                self.node(*start);
                self.node(*end);
                if let Some(step) = step {
                    self.node(*step);
                }
                self.push_scope();
                self.declare(*var);
                self.node(*block);
                self.pop_scope();
            }
            NodeKind::ForIn { vars, exprs, block } => {
                for &expr in exprs {
                    self.node(expr);
                }
                self.push_scope();
                for &var in vars {
                    self.declare(var);
                }
                self.node(*block);
                self.pop_scope();
            }
            NodeKind::FuncBody { params, block, .. } => {
                self.push_scope();
                for &param in params {
                    self.declare(param);
                }
                self.node(*block);
                self.pop_scope();
            }
            NodeKind::Name { name } => {
                if let Some(local) = self.lookup(name) {
                    self.out.resolved.insert(id, Resolution::Local(local));
                    return;
                }
                self.out.global_refs.insert(id, name.clone());
                if let Some(&first) = self.out.globals.get(name) {
                    self.out.resolved.insert(id, Resolution::Global(first));
                }
            }
            NodeKind::Index { prefix, key, .. } => {
                self.node(*prefix);
                if let IndexKey::Expr(expr) = key {
                    self.node(*expr);
                }
                if let Some(first) = self.path(id).and_then(|p| self.paths.get(&p).copied()) {
                    self.out.resolved.insert(id, Resolution::Field(first));
                }
            }
            NodeKind::Call { callee, args } => {
                self.node(*callee);
                for &arg in args {
                    self.node(arg);
                }
            }
            NodeKind::Closure { func } => self.node(*func),
            NodeKind::Table { fields } => {
                for &field in fields {
                    self.node(field);
                }
            }
            NodeKind::TableField { key, value } => {
                if let FieldKey::Expr(expr) = key {
                    self.node(*expr);
                }
                self.node(*value);
            }
            NodeKind::Unary { operand, .. } => self.node(*operand),
            NodeKind::Binary { left, right, .. } => {
                self.node(*left);
                self.node(*right);
            }
            NodeKind::Paren { expr } => self.node(*expr),
            NodeKind::LocalName { .. }
            | NodeKind::Param { .. }
            | NodeKind::Literal { .. }
            | NodeKind::DocComment { .. }
            | NodeKind::DocTag(_)
            | NodeKind::OtherStat
            | NodeKind::Error => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn find_names(tree: &SyntaxTree, wanted: &str) -> Vec<NodeId> {
        tree.ids()
            .filter(|&id| matches!(tree.kind(id), NodeKind::Name { name } if name == wanted))
            .collect()
    }

    fn find_local(tree: &SyntaxTree, wanted: &str) -> NodeId {
        tree.ids()
            .find(|&id| matches!(tree.kind(id), NodeKind::LocalName { name, .. } if name == wanted))
            .unwrap()
    }

    #[test]
    fn test_local_reference_resolves_to_declaration() {
        let tree = parse("local x = 1\nprint(x)").unwrap();
        let decls = DeclarationTree::build(&tree);
        let local = find_local(&tree, "x");
        let use_site = find_names(&tree, "x")[0];
        assert_eq!(decls.resolve(use_site), Some(Resolution::Local(local)));
        assert!(!decls.is_global(use_site));
    }

    #[test]
    fn test_shadowing() {
        let tree = parse("local x = 1\ndo\n  local x = 'a'\n  print(x)\nend\nprint(x)").unwrap();
        let decls = DeclarationTree::build(&tree);
        let uses = find_names(&tree, "x");
        let inner = decls.first_declaration(uses[0]).unwrap();
        let outer = decls.first_declaration(uses[1]).unwrap();
        assert_ne!(inner, outer);
        assert!(tree.range(inner).start.line > tree.range(outer).start.line);
    }

    #[test]
    fn test_global_first_assignment() {
        let tree = parse("G = 1\nG = 2\nprint(G)").unwrap();
        let decls = DeclarationTree::build(&tree);
        let names = find_names(&tree, "G");
        assert_eq!(names.len(), 3);
        assert_eq!(decls.first_declaration(names[1]), Some(names[0]));
        assert_eq!(decls.first_declaration(names[2]), Some(names[0]));
        assert_eq!(decls.global("G"), Some(names[0]));
        assert!(decls.is_global(names[2]));
    }

    #[test]
    fn test_unassigned_global_is_unresolved() {
        let tree = parse("print(undefined_thing)").unwrap();
        let decls = DeclarationTree::build(&tree);
        let name = find_names(&tree, "undefined_thing")[0];
        assert!(decls.resolve(name).is_none());
        assert!(decls.is_global(name));
    }

    #[test]
    fn test_field_path_first_assignment() {
        let tree = parse("local t = {}\nt.x = 1\nt.x = 2\nprint(t.x)").unwrap();
        let decls = DeclarationTree::build(&tree);
        let indexes: Vec<NodeId> = tree
            .ids()
            .filter(|&id| matches!(tree.kind(id), NodeKind::Index { .. }))
            .collect();
        assert_eq!(indexes.len(), 3);
        assert_eq!(decls.first_declaration(indexes[0]), Some(indexes[0]));
        assert_eq!(decls.first_declaration(indexes[1]), Some(indexes[0]));
        assert_eq!(decls.first_declaration(indexes[2]), Some(indexes[0]));
    }

    #[test]
    fn test_params_and_loop_vars() {
        let tree = parse("local function f(a)\n  for i = 1, a do print(i) end\nend").unwrap();
        let decls = DeclarationTree::build(&tree);
        let a_use = find_names(&tree, "a")[0];
        let i_use = find_names(&tree, "i")[0];
        assert!(matches!(tree.kind(decls.first_declaration(a_use).unwrap()), NodeKind::Param { .. }));
        assert!(matches!(
            tree.kind(decls.first_declaration(i_use).unwrap()),
            NodeKind::LocalName { .. }
        ));
    }

    #[test]
    fn test_local_function_is_visible_in_its_body() {
        let tree = parse("local function f() return f() end").unwrap();
        let decls = DeclarationTree::build(&tree);
        let f_local = find_local(&tree, "f");
        let f_use = find_names(&tree, "f")[0];
        assert_eq!(decls.first_declaration(f_use), Some(f_local));
    }
}
