//! Project host: files, symbol index and inference cache.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use emmy_parser::{DeclarationTree, FileId, IncrementalParser, NodeId, NodeKind, NodeRef, SyntaxTree};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::ProjectError;
use crate::index::{build_stubs, SymbolIndex};
use crate::render::render;
use crate::search::{InferCache, SearchContext};
use crate::settings::LuaSettings;
use crate::ty::Ty;

#[derive(Debug)]
pub struct LuaFile {
    pub id: FileId,
    pub path: PathBuf,
    /// `require` name, e.g. `net.http` for `net/http/init.lua`
    pub module: String,
    pub tree: Arc<SyntaxTree>,
    pub decls: DeclarationTree,
}

impl LuaFile {
    pub fn node(&self, id: NodeId) -> NodeRef {
        NodeRef::new(self.id, id)
    }

    pub fn statements(&self) -> &[NodeId] {
        let NodeKind::Chunk { block } = self.tree.kind(self.tree.root()) else {
            return &[];
        };
        match self.tree.kind(*block) {
            NodeKind::Block { stats } => stats,
            _ => &[],
        }
    }

    /// The chunk's `return` statement.
    pub fn return_statement(&self) -> Option<NodeId> {
        self.statements()
            .iter()
            .rev()
            .copied()
            .find(|&s| matches!(self.tree.kind(s), NodeKind::Return { .. }))
    }

    /// Variables declared by top-level statements, in source order.
    pub fn declarations(&self) -> Vec<(String, NodeId)> {
        let tree = &self.tree;
        let mut out = Vec::new();
        let mut push = |node: NodeId| {
            if let Some(name) = variable_name(tree, node) {
                if !out.iter().any(|(n, _): &(String, NodeId)| *n == name) {
                    out.push((name, node));
                }
            }
        };
        for &stat in self.statements() {
            match tree.kind(stat) {
                NodeKind::LocalDef { names, .. } => names.iter().for_each(|&n| push(n)),
                NodeKind::Assign { vars, .. } => vars.iter().for_each(|&v| push(v)),
                NodeKind::LocalFuncDef { name, .. } | NodeKind::FuncDef { name, .. } => push(*name),
                NodeKind::ClassMethodDef { target, .. } => push(*target),
                _ => {}
            }
        }
        out
    }

    /// First local named `name`, anywhere in the file.
    pub fn find_local(&self, name: &str) -> Option<NodeId> {
        self.tree
            .ids()
            .find(|&id| matches!(self.tree.kind(id), NodeKind::LocalName { name: n, .. } if n == name))
    }
}

/// Dotted source text of a name or index chain: `a`, `a.b`, `a:c`.
pub(crate) fn variable_name(tree: &SyntaxTree, node: NodeId) -> Option<String> {
    match tree.kind(node) {
        NodeKind::Name { name } | NodeKind::LocalName { name, .. } => Some(name.clone()),
        NodeKind::Index {
            prefix,
            key: emmy_parser::IndexKey::Name(key),
            colon,
        } => {
            let prefix = variable_name(tree, *prefix)?;
            Some(format!("{}{}{}", prefix, if *colon { ":" } else { "." }, key))
        }
        _ => None,
    }
}

/// Cooperative cancellation shared with long index scans.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Keeps the project in dumb mode while alive.
struct DumbGuard<'a>(&'a AtomicUsize);

impl<'a> DumbGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for DumbGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct Project {
    root: PathBuf,
    settings: LuaSettings,
    files: RwLock<FxHashMap<FileId, Arc<LuaFile>>>,
    paths: RwLock<FxHashMap<PathBuf, FileId>>,
    modules: RwLock<FxHashMap<String, FileId>>,
    next_id: AtomicU32,
    index: SymbolIndex,
    cache: InferCache,
    dumb: AtomicUsize,
    cancellation: Cancellation,
    parser: Mutex<IncrementalParser>,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, settings: LuaSettings) -> Result<Self, ProjectError> {
        Ok(Self {
            root: root.into(),
            settings,
            files: RwLock::new(FxHashMap::default()),
            paths: RwLock::new(FxHashMap::default()),
            modules: RwLock::new(FxHashMap::default()),
            next_id: AtomicU32::new(0),
            index: SymbolIndex::new(),
            cache: InferCache::new(),
            dumb: AtomicUsize::new(0),
            cancellation: Cancellation::new(),
            parser: Mutex::new(IncrementalParser::new()?),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &LuaSettings {
        &self.settings
    }

    pub fn index(&self) -> &SymbolIndex {
        &self.index
    }

    pub fn cache(&self) -> &InferCache {
        &self.cache
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Whether an index rebuild is in progress.
    pub fn is_dumb(&self) -> bool {
        self.dumb.load(Ordering::Acquire) > 0
    }

    pub fn context(&self) -> SearchContext<'_> {
        SearchContext::new(self)
    }

    pub fn file(&self, id: FileId) -> Option<Arc<LuaFile>> {
        self.files.read().get(&id).cloned()
    }

    pub fn file_by_path(&self, path: impl AsRef<Path>) -> Option<Arc<LuaFile>> {
        let id = *self.paths.read().get(path.as_ref())?;
        self.file(id)
    }

    /// All files ordered by id.
    pub fn files(&self) -> Vec<Arc<LuaFile>> {
        let mut files: Vec<Arc<LuaFile>> = self.files.read().values().cloned().collect();
        files.sort_by_key(|f| f.id);
        files
    }

    pub fn find_module(&self, name: &str) -> Option<Arc<LuaFile>> {
        let normalized = name.replace('/', ".");
        let id = *self.modules.read().get(&normalized)?;
        self.file(id)
    }

    pub fn module_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if let Some(last) = parts.last_mut() {
            if let Some(stem) = last.strip_suffix(".lua") {
                *last = stem.to_string();
            }
        }
        if parts.len() > 1 && parts.last().is_some_and(|p| p == "init") {
            parts.pop();
        }
        parts.join(".")
    }

    /// Add a file, or update it when the path is already known.
    pub fn add_file(&self, path: impl AsRef<Path>, source: &str) -> Result<FileId, ProjectError> {
        let path = path.as_ref().to_path_buf();
        let existing = self.paths.read().get(&path).copied();
        let id = existing.unwrap_or_else(|| FileId(self.next_id.fetch_add(1, Ordering::AcqRel)));
        self.load(id, path, source)?;
        Ok(id)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<FileId, ProjectError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.add_file(path, &source)
    }

    pub fn update_file(&self, id: FileId, source: &str) -> Result<(), ProjectError> {
        let file = self.file(id).ok_or(ProjectError::UnknownFile(id))?;
        self.load(id, file.path.clone(), source)
    }

    pub fn remove_file(&self, id: FileId) -> Result<(), ProjectError> {
        let file = self.files.write().remove(&id).ok_or(ProjectError::UnknownFile(id))?;
        self.paths.write().remove(&file.path);
        {
            let mut modules = self.modules.write();
            if modules.get(&file.module) == Some(&id) {
                modules.remove(&file.module);
            }
        }
        self.parser.lock().invalidate(&file.path.to_string_lossy());
        self.index.remove_file(id);
        self.cache.invalidate();
        tracing::debug!(file = %id, path = %file.path.display(), "file removed");
        Ok(())
    }

    fn load(&self, id: FileId, path: PathBuf, source: &str) -> Result<(), ProjectError> {
        let tree = self.parser.lock().parse(&path.to_string_lossy(), source)?;
        let decls = DeclarationTree::build(&tree);
        let module = self.module_name(&path);
        let file = Arc::new(LuaFile {
            id,
            path: path.clone(),
            module: module.clone(),
            tree,
            decls,
        });

        let dumb = DumbGuard::enter(&self.dumb);
        let previous = self.files.write().insert(id, file.clone());
        self.paths.write().insert(path, id);
        {
            let mut modules = self.modules.write();
            if let Some(previous) = previous.filter(|p| p.module != module) {
                if modules.get(&previous.module) == Some(&id) {
                    modules.remove(&previous.module);
                }
            }
            modules.insert(module, id);
        }
        let ctx = SearchContext::dumb(self);
        let sink = build_stubs(&ctx, &file);
        self.index.replace_file(sink);
        drop(dumb);

        self.cache.invalidate();
        Ok(())
    }

    /// Type of `node`, `None` when it cannot be determined.
    pub fn infer(&self, node: NodeRef) -> Option<Ty> {
        let ctx = self.context();
        ctx.with_default(None, |ctx| Ok(crate::infer::infer(ctx, node)))
    }

    pub fn render(&self, ty: &Ty) -> String {
        render(&self.context(), ty)
    }
}
