//! Request-scoped inference state.
//!
//! A [`SearchContext`] is created per top-level request and passed by
//! reference through the whole inference call graph. Scratch fields (result
//! index, multi-result mode, dumb mode, search scope, abstract generic
//! scopes) are changed only through the `with_*` helpers, which restore the
//! previous value when the action returns or unwinds.

mod cache;

use std::cell::{Cell, RefCell};
use std::hash::Hash;
use std::sync::Arc;

use emmy_parser::{FileId, NodeRef};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::InferError;
use crate::project::{LuaFile, Project};
use crate::settings::LuaSettings;
use crate::ty::{FunctionSignatures, Ty};

pub use cache::InferCache;

/// Which files lookups may see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchScope {
    #[default]
    All,
    Files(FxHashSet<FileId>),
    Empty,
}

impl SearchScope {
    pub fn contains(&self, file: FileId) -> bool {
        match self {
            SearchScope::All => true,
            SearchScope::Files(files) => files.contains(&file),
            SearchScope::Empty => false,
        }
    }
}

/// Restores a `Cell` when dropped.
struct CellGuard<'a, T: Copy> {
    cell: &'a Cell<T>,
    saved: T,
}

impl<'a, T: Copy> CellGuard<'a, T> {
    fn set(cell: &'a Cell<T>, value: T) -> Self {
        let saved = cell.replace(value);
        Self { cell, saved }
    }
}

impl<T: Copy> Drop for CellGuard<'_, T> {
    fn drop(&mut self) {
        self.cell.set(self.saved);
    }
}

/// Restores a `RefCell` when dropped.
struct ReplaceGuard<'a, T> {
    cell: &'a RefCell<T>,
    saved: Option<T>,
}

impl<'a, T> ReplaceGuard<'a, T> {
    fn set(cell: &'a RefCell<T>, value: T) -> Self {
        let saved = cell.replace(value);
        Self {
            cell,
            saved: Some(saved),
        }
    }
}

impl<T> Drop for ReplaceGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.cell.borrow_mut() = saved;
        }
    }
}

/// RAII guard that removes a key from an in-progress set on drop.
pub(crate) struct InProgressGuard<'a, K: Eq + Hash> {
    set: &'a RefCell<FxHashSet<K>>,
    key: Option<K>,
}

impl<'a, K: Eq + Hash + Clone> InProgressGuard<'a, K> {
    /// `None` when `key` is already in progress.
    fn enter(set: &'a RefCell<FxHashSet<K>>, key: K) -> Option<Self> {
        if !set.borrow_mut().insert(key.clone()) {
            return None;
        }
        Some(Self { set, key: Some(key) })
    }
}

impl<K: Eq + Hash> Drop for InProgressGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(ref key) = self.key {
            self.set.borrow_mut().remove(key);
        }
    }
}

pub struct SearchContext<'p> {
    project: &'p Project,
    index: Cell<i32>,
    multiple_results: Cell<bool>,
    dumb: Cell<bool>,
    in_stack: Cell<bool>,
    cancelled: Cell<bool>,
    guard_hits: Cell<u64>,
    scope: RefCell<SearchScope>,
    abstract_generic_scope_names: RefCell<FxHashSet<String>>,
    in_progress: RefCell<FxHashSet<NodeRef>>,
    aliases_in_progress: RefCell<FxHashSet<String>>,
    files: RefCell<FxHashMap<FileId, Arc<LuaFile>>>,
    local_cache: RefCell<FxHashMap<NodeRef, Option<Ty>>>,
    signatures: RefCell<FxHashMap<(NodeRef, bool), Arc<FunctionSignatures>>>,
}

impl<'p> SearchContext<'p> {
    pub fn new(project: &'p Project) -> Self {
        Self {
            project,
            index: Cell::new(0),
            multiple_results: Cell::new(false),
            dumb: Cell::new(false),
            in_stack: Cell::new(false),
            cancelled: Cell::new(false),
            guard_hits: Cell::new(0),
            scope: RefCell::new(SearchScope::All),
            abstract_generic_scope_names: RefCell::new(FxHashSet::default()),
            in_progress: RefCell::new(FxHashSet::default()),
            aliases_in_progress: RefCell::new(FxHashSet::default()),
            files: RefCell::new(FxHashMap::default()),
            local_cache: RefCell::new(FxHashMap::default()),
            signatures: RefCell::new(FxHashMap::default()),
        }
    }

    /// Context used while building index stubs: every index lookup is empty.
    pub fn dumb(project: &'p Project) -> Self {
        let ctx = Self::new(project);
        ctx.dumb.set(true);
        ctx
    }

    pub fn project(&self) -> &'p Project {
        self.project
    }

    pub fn settings(&self) -> &'p LuaSettings {
        self.project.settings()
    }

    /// Result index requested by the caller, `-1` for all results.
    pub fn index(&self) -> i32 {
        self.index.get()
    }

    pub fn supports_multiple_results(&self) -> bool {
        self.multiple_results.get()
    }

    pub fn is_dumb(&self) -> bool {
        self.dumb.get() || self.project.is_dumb()
    }

    /// Effective scope; nothing is visible in dumb mode.
    pub fn scope(&self) -> SearchScope {
        if self.is_dumb() {
            return SearchScope::Empty;
        }
        self.scope.borrow().clone()
    }

    pub fn in_scope(&self, file: FileId) -> bool {
        !self.is_dumb() && self.scope.borrow().contains(file)
    }

    pub(crate) fn scope_is_all(&self) -> bool {
        matches!(*self.scope.borrow(), SearchScope::All)
    }

    pub fn with_index<T>(&self, index: i32, supports_multiple: bool, action: impl FnOnce(&Self) -> T) -> T {
        let _index = CellGuard::set(&self.index, index);
        let _multiple = CellGuard::set(&self.multiple_results, supports_multiple);
        action(self)
    }

    pub fn with_multiple_results<T>(&self, action: impl FnOnce(&Self) -> T) -> T {
        self.with_index(-1, true, action)
    }

    pub fn with_scope<T>(&self, scope: SearchScope, action: impl FnOnce(&Self) -> T) -> T {
        let _scope = ReplaceGuard::set(&self.scope, scope);
        action(self)
    }

    pub fn with_abstract_generic_scope_names<T>(
        &self,
        names: impl IntoIterator<Item = String>,
        action: impl FnOnce(&Self) -> T,
    ) -> T {
        let mut merged = self.abstract_generic_scope_names.borrow().clone();
        merged.extend(names);
        let _names = ReplaceGuard::set(&self.abstract_generic_scope_names, merged);
        action(self)
    }

    pub fn with_dumb<T>(&self, action: impl FnOnce(&Self) -> T) -> T {
        let _dumb = CellGuard::set(&self.dumb, true);
        action(self)
    }

    /// Generic parameters of these scopes are treated as opaque when comparing.
    pub fn is_abstract_generic_scope(&self, scope: &str) -> bool {
        self.abstract_generic_scope_names.borrow().contains(scope)
    }

    pub(crate) fn has_abstract_generic_scopes(&self) -> bool {
        !self.abstract_generic_scope_names.borrow().is_empty()
    }

    /// Run a top-level action. Nested calls on the same context run directly.
    pub fn try_with<T>(&self, action: impl FnOnce(&Self) -> Result<T, InferError>) -> Result<T, InferError> {
        if self.in_stack.get() {
            return action(self);
        }
        let _stack = CellGuard::set(&self.in_stack, true);
        let value = action(self)?;
        if self.cancelled.get() {
            return Err(InferError::Cancelled);
        }
        Ok(value)
    }

    /// [`try_with`](Self::try_with), substituting `default` on failure.
    pub fn with_default<T>(&self, default: T, action: impl FnOnce(&Self) -> Result<T, InferError>) -> T {
        match self.try_with(action) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "search action failed, using default");
                default
            }
        }
    }

    /// Poll the project's cancellation token; once cancelled, stays cancelled.
    pub fn check_cancelled(&self) -> bool {
        if !self.cancelled.get() && self.project.cancellation().is_cancelled() {
            tracing::debug!("search cancelled");
            self.cancelled.set(true);
        }
        self.cancelled.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Mark `node` as being inferred; `None` on re-entry.
    pub(crate) fn enter(&self, node: NodeRef) -> Option<InProgressGuard<'_, NodeRef>> {
        let guard = InProgressGuard::enter(&self.in_progress, node);
        if guard.is_none() {
            self.guard_hits.set(self.guard_hits.get() + 1);
        }
        guard
    }

    pub(crate) fn enter_alias(&self, name: &str) -> Option<InProgressGuard<'_, String>> {
        InProgressGuard::enter(&self.aliases_in_progress, name.to_string())
    }

    /// Number of cycles cut so far; results computed across a cut are not cached.
    pub(crate) fn guard_hits(&self) -> u64 {
        self.guard_hits.get()
    }

    pub fn file(&self, id: FileId) -> Option<Arc<LuaFile>> {
        if let Some(file) = self.files.borrow().get(&id) {
            return Some(file.clone());
        }
        let file = self.project.file(id)?;
        self.files.borrow_mut().insert(id, file.clone());
        Some(file)
    }

    pub(crate) fn cached(&self, node: NodeRef) -> Option<Option<Ty>> {
        if self.settings().use_global_cache {
            self.project.cache().get(node)
        } else {
            self.local_cache.borrow().get(&node).cloned()
        }
    }

    pub(crate) fn store(&self, node: NodeRef, generation: u64, ty: Option<Ty>) {
        if self.settings().use_global_cache {
            self.project.cache().insert(node, generation, ty);
        } else {
            self.local_cache.borrow_mut().insert(node, ty);
        }
    }

    pub(crate) fn cached_signatures(&self, func: NodeRef, colon: bool) -> Option<Arc<FunctionSignatures>> {
        self.signatures.borrow().get(&(func, colon)).cloned()
    }

    pub(crate) fn store_signatures(&self, func: NodeRef, colon: bool, signatures: Arc<FunctionSignatures>) {
        self.signatures.borrow_mut().insert((func, colon), signatures);
    }
}
