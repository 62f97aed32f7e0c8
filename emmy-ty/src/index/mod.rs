//! Symbol index
//!
//! A string-keyed multimap from stub keys to declaring nodes, rebuilt one
//! file at a time. Entries are produced by the stub builder while the
//! project is in dumb mode and consumed through a [`SearchContext`], which
//! hides every entry while dumb and filters by search scope.
//!
//! Class members use the key schema:
//!
//! - `Class` bare class name, one occurrence per member
//! - `Class*member` named member
//! - `Class*[<type id>]` indexer member
//! - `Class[]` every non-string indexer of the class

mod builder;
mod classes;
mod members;

use std::collections::BTreeMap;

use emmy_parser::{FileId, NodeId, NodeRef};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::search::SearchContext;

pub(crate) use builder::build_stubs;
pub(crate) use classes::class_decl;
pub use classes::{find_alias, find_class, find_globals, ClassDecl};
pub use members::{
    find_method, members, process_all, process_indexer, process_member, process_namespace_member,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StubKey {
    ClassMember,
    UnknownMember,
    ShortName,
    Class,
    SuperClass,
    Alias,
    Global,
}

impl StubKey {
    pub const ALL: [StubKey; 7] = [
        StubKey::ClassMember,
        StubKey::UnknownMember,
        StubKey::ShortName,
        StubKey::Class,
        StubKey::SuperClass,
        StubKey::Alias,
        StubKey::Global,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StubKey::ClassMember => "class_member",
            StubKey::UnknownMember => "unknown_member",
            StubKey::ShortName => "short_name",
            StubKey::Class => "class",
            StubKey::SuperClass => "super_class",
            StubKey::Alias => "alias",
            StubKey::Global => "global",
        }
    }
}

/// Occurrences collected for one file.
#[derive(Debug, Clone)]
pub struct IndexSink {
    file: FileId,
    entries: Vec<(StubKey, String, NodeRef)>,
    seen: FxHashSet<(StubKey, String, NodeRef)>,
}

impl IndexSink {
    pub fn new(file: FileId) -> Self {
        Self {
            file,
            entries: Vec::new(),
            seen: FxHashSet::default(),
        }
    }

    pub fn occurrence(&mut self, key: StubKey, name: impl Into<String>, node: NodeId) {
        let entry = (key, name.into(), NodeRef::new(self.file, node));
        if self.seen.insert(entry.clone()) {
            self.entries.push(entry);
        }
    }

    /// Registers `class` and `class*member`.
    pub fn member(&mut self, class: &str, member: &str, node: NodeId) {
        self.occurrence(StubKey::ClassMember, class, node);
        self.occurrence(StubKey::ClassMember, format!("{}*{}", class, member), node);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct IndexData {
    keys: FxHashMap<StubKey, BTreeMap<String, Vec<NodeRef>>>,
    files: FxHashMap<FileId, Vec<(StubKey, String, NodeRef)>>,
}

impl IndexData {
    fn remove_file(&mut self, file: FileId) {
        let Some(entries) = self.files.remove(&file) else {
            return;
        };
        for (key, name, node) in entries {
            let Some(map) = self.keys.get_mut(&key) else {
                continue;
            };
            if let Some(nodes) = map.get_mut(&name) {
                nodes.retain(|n| *n != node);
                if nodes.is_empty() {
                    map.remove(&name);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct SymbolIndex {
    data: RwLock<IndexData>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap the entries of `sink`'s file for the new ones.
    pub fn replace_file(&self, sink: IndexSink) {
        let mut data = self.data.write();
        data.remove_file(sink.file);
        for (key, name, node) in &sink.entries {
            let nodes = data.keys.entry(*key).or_default().entry(name.clone()).or_default();
            if let Err(pos) = nodes.binary_search(node) {
                nodes.insert(pos, *node);
            }
        }
        tracing::debug!(file = %sink.file, entries = sink.entries.len(), "index rebuilt for file");
        data.files.insert(sink.file, sink.entries);
    }

    pub fn remove_file(&self, file: FileId) {
        self.data.write().remove_file(file);
    }

    /// Raw entries for `name`, ignoring dumb mode and scope.
    pub fn get(&self, key: StubKey, name: &str) -> Vec<NodeRef> {
        self.data
            .read()
            .keys
            .get(&key)
            .and_then(|map| map.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Every key name of one key space, sorted.
    pub fn keys(&self, key: StubKey) -> Vec<String> {
        self.data
            .read()
            .keys
            .get(&key)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Key names starting with `prefix`, with their nodes.
    pub fn prefixed(&self, key: StubKey, prefix: &str) -> Vec<(String, Vec<NodeRef>)> {
        let data = self.data.read();
        let Some(map) = data.keys.get(&key) else {
            return Vec::new();
        };
        map.range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, nodes)| (name.clone(), nodes.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data.read().files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit the visible nodes of `name`; `false` once `f` or cancellation stopped the scan.
    pub fn process(
        &self,
        ctx: &SearchContext,
        key: StubKey,
        name: &str,
        mut f: impl FnMut(NodeRef) -> bool,
    ) -> bool {
        if ctx.is_dumb() {
            return true;
        }
        for node in self.get(key, name) {
            if ctx.check_cancelled() {
                return false;
            }
            if !ctx.in_scope(node.file) {
                continue;
            }
            if !f(node) {
                return false;
            }
        }
        true
    }

    /// Visible key names of one key space.
    pub fn visible_keys(&self, ctx: &SearchContext, key: StubKey) -> Vec<String> {
        if ctx.is_dumb() {
            return Vec::new();
        }
        let data = self.data.read();
        let Some(map) = data.keys.get(&key) else {
            return Vec::new();
        };
        let mut keys = Vec::new();
        for (name, nodes) in map {
            if ctx.check_cancelled() {
                break;
            }
            if nodes.iter().any(|n| ctx.in_scope(n.file)) {
                keys.push(name.clone());
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(file: u32) -> IndexSink {
        IndexSink::new(FileId(file))
    }

    #[test]
    fn test_member_registers_class_and_member_keys() {
        let index = SymbolIndex::new();
        let mut s = sink(0);
        s.member("Point", "x", NodeId(4));
        index.replace_file(s);
        assert_eq!(index.get(StubKey::ClassMember, "Point").len(), 1);
        assert_eq!(
            index.get(StubKey::ClassMember, "Point*x"),
            vec![NodeRef::new(FileId(0), NodeId(4))]
        );
    }

    #[test]
    fn test_sink_drops_repeated_occurrences() {
        let mut s = sink(0);
        s.member("Point", "x", NodeId(4));
        s.member("Point", "x", NodeId(4));
        s.member("Point", "y", NodeId(4));
        s.occurrence(StubKey::Global, "Point", NodeId(4));
        s.occurrence(StubKey::Global, "Point", NodeId(4));
        assert_eq!(s.len(), 4);

        let index = SymbolIndex::new();
        index.replace_file(s);
        assert_eq!(index.get(StubKey::ClassMember, "Point").len(), 1);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_replace_file_drops_old_entries() {
        let index = SymbolIndex::new();
        let mut first = sink(1);
        first.occurrence(StubKey::Global, "a", NodeId(1));
        index.replace_file(first);
        let mut other = sink(2);
        other.occurrence(StubKey::Global, "a", NodeId(9));
        index.replace_file(other);

        let mut second = sink(1);
        second.occurrence(StubKey::Global, "b", NodeId(2));
        index.replace_file(second);

        assert_eq!(index.get(StubKey::Global, "a"), vec![NodeRef::new(FileId(2), NodeId(9))]);
        assert_eq!(index.keys(StubKey::Global), vec!["a".to_string(), "b".to_string()]);

        index.remove_file(FileId(2));
        assert!(index.get(StubKey::Global, "a").is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_entries_are_sorted() {
        let index = SymbolIndex::new();
        let mut b = sink(3);
        b.occurrence(StubKey::ShortName, "x", NodeId(1));
        index.replace_file(b);
        let mut a = sink(1);
        a.occurrence(StubKey::ShortName, "x", NodeId(5));
        a.occurrence(StubKey::ShortName, "x", NodeId(2));
        index.replace_file(a);
        let files: Vec<(u32, u32)> = index
            .get(StubKey::ShortName, "x")
            .iter()
            .map(|n| (n.file.0, n.node.0))
            .collect();
        assert_eq!(files, vec![(1, 2), (1, 5), (3, 1)]);
    }

    #[test]
    fn test_prefixed() {
        let index = SymbolIndex::new();
        let mut s = sink(0);
        s.member("A", "x", NodeId(1));
        s.member("A", "y", NodeId(2));
        s.member("AB", "z", NodeId(3));
        index.replace_file(s);
        let names: Vec<String> = index
            .prefixed(StubKey::ClassMember, "A*")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["A*x".to_string(), "A*y".to_string()]);
    }
}
