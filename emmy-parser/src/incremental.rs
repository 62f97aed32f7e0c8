use std::collections::HashMap;
use std::sync::Arc;

use tree_sitter::Parser;

use crate::error::ParseError;
use crate::syntax::SyntaxTree;
use crate::{lua_parser, parse_with};

#[derive(Debug, Clone)]
pub struct CachedParse {
    pub tree: Arc<SyntaxTree>,
    pub hash: u64,
}

/// Parse cache keyed by file path. Unchanged sources reuse the lowered tree.
pub struct IncrementalParser {
    cache: HashMap<String, CachedParse>,
    parser: Parser,
}

impl IncrementalParser {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            cache: HashMap::new(),
            parser: lua_parser()?,
        })
    }

    pub fn parse(&mut self, uri: &str, source: &str) -> Result<Arc<SyntaxTree>, ParseError> {
        let hash = compute_hash(source);

        if let Some(cached) = self.cache.get(uri) {
            if cached.hash == hash {
                tracing::trace!(uri, "parse cache hit");
                return Ok(cached.tree.clone());
            }
        }

        let tree = Arc::new(parse_with(&mut self.parser, source)?);
        self.cache.insert(
            uri.to_string(),
            CachedParse {
                tree: tree.clone(),
                hash,
            },
        );
        Ok(tree)
    }

    pub fn invalidate(&mut self, uri: &str) {
        self.cache.remove(uri);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

fn compute_hash(source: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash() {
        let source = "print('hello')";
        assert_eq!(compute_hash(source), compute_hash(source));
        assert_ne!(compute_hash(source), compute_hash("print('world')"));
    }

    #[test]
    fn test_unchanged_source_reuses_tree() {
        let mut parser = IncrementalParser::new().unwrap();
        let first = parser.parse("test.lua", "local x = 42").unwrap();
        let second = parser.parse("test.lua", "local x = 42").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let changed = parser.parse("test.lua", "local x = 43").unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
    }

    #[test]
    fn test_cache_entry_tracks_source_hash() {
        let mut parser = IncrementalParser::new().unwrap();
        let tree = parser.parse("a.lua", "local x = 1").unwrap();
        let cached = parser.cache.get("a.lua").unwrap();
        assert_eq!(cached.hash, compute_hash("local x = 1"));
        assert!(Arc::ptr_eq(&cached.tree, &tree));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut parser = IncrementalParser::new().unwrap();
        parser.parse("a.lua", "local x = 1").unwrap();
        parser.parse("b.lua", "local y = 2").unwrap();
        assert_eq!(parser.cache.len(), 2);

        parser.invalidate("a.lua");
        assert!(!parser.cache.contains_key("a.lua"));

        parser.clear();
        assert!(parser.cache.is_empty());
    }
}
