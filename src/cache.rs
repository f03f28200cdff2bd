//! Explicit caches for compiled state.
//!
//! Compiling routes and filters is the expensive part of an export, so a
//! long-lived host keeps the compiled exporters around between calls. The
//! cache is keyed by the configuration itself ([`ConfigKey`]); a changed
//! configuration hashes to a new key and can never hit stale entries.
//!
//! ```text
//! ExportConfig ── key() ──> ConfigKey ──┬─ hit  ──> Arc<Exporters>
//!                                       └─ miss ──> compile, insert, Arc<Exporters>
//! ```
//!
//! Entries are handed out as `Arc`s, so invalidating an entry does not affect
//! callers still holding it.

use crate::api::{EventExporter, FunctionExporter};
use crate::config::{ConfigKey, ExportConfig};
use crate::engine::{Environment, OutputPoint};
use crate::error::{ConfigError, ExportError};
use crate::Value;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Construct-on-miss cache with explicit invalidation.
#[derive(Debug)]
pub struct ResourceCache<K, V> {
    entries: HashMap<K, Arc<V>>,
}

impl<K: Eq + Hash, V> ResourceCache<K, V> {
    pub fn new() -> Self {
        ResourceCache { entries: HashMap::new() }
    }

    /// Return the entry for `key`, building it with `init` on a miss.
    ///
    /// A failed `init` leaves the cache unchanged.
    pub fn get_or_try_insert_with<E, F>(&mut self, key: K, init: F) -> Result<Arc<V>, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Some(value) = self.entries.get(&key) {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(init(&key)?);
        self.entries.insert(key, Arc::clone(&value));
        Ok(value)
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).cloned()
    }

    /// Drop the entry for `key`, returning it if present.
    pub fn invalidate(&mut self, key: &K) -> Option<Arc<V>> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for ResourceCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exporters compiled from one configuration.
#[derive(Debug)]
pub struct Exporters {
    pub functions: FunctionExporter,
    pub events: EventExporter,
}

impl Exporters {
    pub fn compile(config: &ExportConfig) -> Result<Self, ConfigError> {
        Ok(Exporters { functions: FunctionExporter::new(config)?, events: EventExporter::new(config)? })
    }
}

/// Compiled exporters keyed by configuration.
#[derive(Debug, Default)]
pub struct PipelineCache {
    inner: ResourceCache<ConfigKey, Exporters>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled exporters for `config`, compiling them on first use.
    pub fn exporters(&mut self, config: &ExportConfig) -> Result<Arc<Exporters>, ConfigError> {
        self.inner.get_or_try_insert_with(config.key(), |_| {
            tracing::debug!("compiling exporters for new configuration");
            Exporters::compile(config)
        })
    }

    /// Export one function return with the exporters for `config`.
    pub fn export_return(
        &mut self,
        config: &ExportConfig,
        ret: &Value,
        env: &Environment,
    ) -> Result<Option<OutputPoint>, ExportError> {
        let exporters = self.exporters(config)?;
        exporters.functions.export(ret, env)
    }

    /// Export a batch of events with the exporters for `config`.
    pub fn export_events(
        &mut self,
        config: &ExportConfig,
        events: &[Value],
        env: &Environment,
    ) -> Result<Vec<OutputPoint>, ExportError> {
        let exporters = self.exporters(config)?;
        Ok(exporters.events.export_batch(events, env))
    }

    pub fn invalidate(&mut self, config: &ExportConfig) -> bool {
        self.inner.invalidate(&config.key()).is_some()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_once_per_key() {
        let mut cache: ResourceCache<&str, usize> = ResourceCache::new();
        let mut builds = 0;

        let a = cache
            .get_or_try_insert_with("a", |_| {
                builds += 1;
                Ok::<_, ()>(1)
            })
            .unwrap();
        let again = cache.get_or_try_insert_with("a", |_| Ok::<_, ()>(2)).unwrap();

        assert_eq!(builds, 1);
        assert_eq!(*a, 1);
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_build_is_not_cached() {
        let mut cache: ResourceCache<&str, usize> = ResourceCache::new();
        assert_eq!(cache.get_or_try_insert_with("a", |_| Err("boom")), Err("boom"));
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn invalidate_drops_entry_but_not_handles() {
        let mut cache: ResourceCache<&str, String> = ResourceCache::new();
        let held = cache.get_or_try_insert_with("a", |k| Ok::<_, ()>(k.to_uppercase())).unwrap();

        assert_eq!(cache.invalidate(&"a").as_deref().map(String::as_str), Some("A"));
        assert_eq!(cache.invalidate(&"a"), None);
        assert_eq!(held.as_str(), "A");

        cache.get_or_try_insert_with("b", |_| Ok::<_, ()>(String::new())).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn changed_configuration_compiles_new_exporters() {
        let mut cache = PipelineCache::new();
        let config = ExportConfig::default();

        let first = cache.exporters(&config).unwrap();
        let second = cache.exporters(&config.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let mut changed = config.clone();
        changed.functions_blocklist.push(r"test\.ping".into());
        let third = cache.exporters(&changed).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate(&config));
        assert!(!cache.invalidate(&config));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalid_configuration_is_reported_and_not_cached() {
        let mut cache = PipelineCache::new();
        let config = ExportConfig { events_blocklist: vec!["(".into()], ..ExportConfig::default() };
        assert!(matches!(cache.exporters(&config), Err(ConfigError::Filter(_))));
        assert!(cache.is_empty());

        let events = vec![Value::from(serde_json::json!({"tag": "salt/auth", "data": {}}))];
        let err = cache.export_events(&config, &events, &Environment::new()).unwrap_err();
        assert!(matches!(err, ExportError::Config(ConfigError::Filter(_))));
    }

    #[test]
    fn exports_through_cached_exporters() {
        let mut cache = PipelineCache::new();
        let config = ExportConfig::default();
        let env = Environment::new().with_salt_version("3006.4");
        let ret = Value::from(serde_json::json!({
            "fun": "test.ping", "id": "web1", "jid": "1", "retcode": 0, "return": true,
        }));

        let point = cache.export_return(&config, &ret, &env).unwrap().unwrap();
        assert_eq!(point.tags["fun"], "test.ping");

        let events = vec![
            Value::from(serde_json::json!({"tag": "salt/auth", "data": {"id": "web1", "act": "accept"}})),
            Value::from(serde_json::json!({"tag": "12345678901234567890", "data": {}})),
        ];
        assert_eq!(cache.export_events(&config, &events, &env).unwrap().len(), 1);
        assert_eq!(cache.len(), 1);
    }
}
