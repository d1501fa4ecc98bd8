//! Product alias resolution.
//!
//! The alias table is loaded once per transform run into an in-memory cache;
//! a new run gets a new cache. Safe for concurrent reads after load.

use std::collections::HashMap;

use reco_core::model::ProductAlias;
use tracing::info;

/// In-memory `label_norm -> product_key` cache.
#[derive(Debug, Default)]
pub struct AliasResolver {
    cache: HashMap<String, String>,
    loaded: bool,
}

impl AliasResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the alias table for this run.
    pub fn load(&mut self, aliases: Vec<ProductAlias>) {
        info!(aliases = aliases.len(), "loaded product alias cache");
        self.cache = aliases
            .into_iter()
            .map(|alias| (alias.label_norm, alias.product_key))
            .collect();
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Resolve a normalized product label to its canonical key.
    pub fn resolve(&self, label_norm: &str) -> Option<&str> {
        self.cache.get(label_norm).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// All known mappings (used to build batch references for ingestion).
    pub fn mappings(&self) -> &HashMap<String, String> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(label_norm: &str, product_key: &str) -> ProductAlias {
        ProductAlias {
            label_norm: label_norm.to_string(),
            product_key: product_key.to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn resolves_loaded_aliases() {
        let mut resolver = AliasResolver::new();
        resolver.load(vec![
            alias("riesling 2020", "WINE001"),
            alias("gewurztraminer vt", "WINE002"),
        ]);

        assert!(resolver.is_loaded());
        assert_eq!(resolver.resolve("riesling 2020"), Some("WINE001"));
        assert_eq!(resolver.resolve("unknown"), None);
    }

    #[test]
    fn unloaded_resolver_resolves_nothing() {
        let resolver = AliasResolver::new();
        assert!(!resolver.is_loaded());
        assert_eq!(resolver.resolve("riesling 2020"), None);
    }
}
