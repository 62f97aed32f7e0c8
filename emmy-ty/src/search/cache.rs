use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use emmy_parser::NodeRef;

use crate::ty::Ty;

#[derive(Debug, Clone)]
struct CachedTy {
    generation: u64,
    ty: Option<Ty>,
}

/// Process-wide memo of inferred node types.
///
/// Entries are tagged with the generation they were computed in. Any edit
/// bumps the generation and clears the map, and an insert computed under an
/// older generation is dropped, so a result racing an edit never survives it.
#[derive(Debug, Default)]
pub struct InferCache {
    generation: AtomicU64,
    map: DashMap<NodeRef, CachedTy>,
}

impl InferCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cached result for `node`; the inner `None` is a cached "unknown".
    pub fn get(&self, node: NodeRef) -> Option<Option<Ty>> {
        let entry = self.map.get(&node)?;
        if entry.generation != self.generation() {
            return None;
        }
        tracing::trace!(%node, "infer cache hit");
        Some(entry.ty.clone())
    }

    pub fn insert(&self, node: NodeRef, generation: u64, ty: Option<Ty>) {
        if generation != self.generation() {
            return;
        }
        self.map.insert(node, CachedTy { generation, ty });
    }

    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.map.clear();
        tracing::debug!(generation, "infer cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
