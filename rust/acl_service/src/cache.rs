// =============================================================================
// Access verdict cache + ACL reader caches
// =============================================================================

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use acl_core::reference::PermissionReference;
use acl_core::rules::Authorities;
use acl_core::types::{AccessControlListProperties, AccessStatus, NodeRef};
use ahash::AHashSet;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

/// Which evaluation a cached verdict belongs to.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheType {
    /// Full `has_permission` result.
    HasPermission,
    /// Single-permission walk from a node with no inherited denials.
    SinglePermission,
    /// Single-permission check including model-wide grants.
    SinglePermissionGlobal,
}

/// Key of one cached verdict.
///
/// The authority set is folded into a BLAKE3 digest of its sorted members, so
/// keys stay small and equal sets hash equally regardless of iteration order.
/// The change transaction makes any write to the node a different key.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct AccessKey {
    permission: PermissionReference,
    authorities: [u8; 32],
    node: NodeRef,
    change_txn: Option<u64>,
    cache_type: CacheType,
}

impl AccessKey {
    pub fn new(
        permission: PermissionReference,
        authorities: &Authorities,
        node: &NodeRef,
        change_txn: Option<u64>,
        cache_type: CacheType,
    ) -> Self {
        Self {
            permission,
            authorities: digest_authorities(authorities),
            node: node.clone(),
            change_txn,
            cache_type,
        }
    }
}

fn digest_authorities(authorities: &Authorities) -> [u8; 32] {
    let mut sorted: Vec<&str> = authorities.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = blake3::Hasher::new();
    for authority in sorted {
        hasher.update(authority.as_bytes());
        hasher.update(&[0]);
    }
    *hasher.finalize().as_bytes()
}

/// Hit/miss counters and current size of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Concurrent cache of access verdicts.
///
/// Readers never block. A wholesale [`clear`](Self::clear) after a mutation
/// may race with in-flight evaluations; keys carry the node's change
/// transaction, so a verdict stored late for old node state is never served
/// for the new state.
pub struct AccessCache {
    cache: DashMap<AccessKey, AccessStatus>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AccessCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: DashMap::with_capacity(max_entries.min(4096)),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &AccessKey) -> Option<AccessStatus> {
        match self.cache.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(*entry.value())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: AccessKey, status: AccessStatus) {
        if self.cache.len() >= self.max_entries {
            // DashMap has no ordering: drop ~10% arbitrarily to make room
            let to_remove = (self.max_entries / 10).max(1);
            let keys_to_remove: Vec<AccessKey> = self
                .cache
                .iter()
                .take(to_remove)
                .map(|entry| entry.key().clone())
                .collect();
            for k in &keys_to_remove {
                self.cache.remove(k);
            }
            tracing::warn!(
                evicted = keys_to_remove.len(),
                max_entries = self.max_entries,
                "access cache full, evicting"
            );
        }
        self.cache.insert(key, status);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
        }
    }
}

/// Authority sets computed per ACL version.
///
/// Keyed by the ACL's immutable properties: any change to an ACL yields a new
/// version, so entries never go stale and need no invalidation.
pub struct ReadersCache {
    cache: Mutex<LruCache<AccessControlListProperties, Arc<AHashSet<String>>>>,
}

impl ReadersCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, properties: &AccessControlListProperties) -> Option<Arc<AHashSet<String>>> {
        self.cache.lock().get(properties).cloned()
    }

    pub fn put(&self, properties: AccessControlListProperties, readers: Arc<AHashSet<String>>) {
        self.cache.lock().put(properties, readers);
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acl_core::reference::PermissionRegistry;
    use acl_core::types::AclType;

    fn auths(names: &[&str]) -> Authorities {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn node(id: &str) -> NodeRef {
        format!("workspace://SpacesStore/{}", id).parse().unwrap()
    }

    fn read() -> PermissionReference {
        PermissionRegistry::new().intern("sys:base", "Read")
    }

    fn props(version: u64) -> AccessControlListProperties {
        AccessControlListProperties {
            id: 7,
            acl_id: "acl-7".to_string(),
            version,
            acl_type: AclType::Defining,
            inherits: true,
            latest: true,
            versioned: false,
            change_set: None,
        }
    }

    #[test]
    fn key_ignores_authority_order() {
        let key = |names: &[&str]| {
            AccessKey::new(read(), &auths(names), &node("n"), Some(1), CacheType::HasPermission)
        };
        let (a, b) = (key(&["b", "a"]), key(&["a", "b"]));
        assert_eq!(a, b);
    }

    #[test]
    fn key_includes_change_txn_and_type() {
        let auths = auths(&["andy"]);
        let key = |txn, cache_type| {
            AccessKey::new(read(), &auths, &node("n"), Some(txn), cache_type)
        };
        let base = key(1, CacheType::HasPermission);
        let later = key(2, CacheType::HasPermission);
        let single = key(1, CacheType::SinglePermission);
        assert_ne!(base, later);
        assert_ne!(base, single);
    }

    #[test]
    fn digest_separates_concatenations() {
        assert_ne!(
            digest_authorities(&auths(&["ab", "c"])),
            digest_authorities(&auths(&["a", "bc"]))
        );
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = AccessCache::new(100);
        let andy = auths(&["andy"]);
        let key = AccessKey::new(read(), &andy, &node("n"), None, CacheType::HasPermission);
        assert_eq!(cache.get(&key), None);
        cache.put(key.clone(), AccessStatus::Allowed);
        assert_eq!(cache.get(&key), Some(AccessStatus::Allowed));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn eviction_keeps_cache_bounded() {
        let cache = AccessCache::new(20);
        let auths = auths(&["andy"]);
        for i in 0..100 {
            let n = node(&i.to_string());
            let key = AccessKey::new(read(), &auths, &n, None, CacheType::HasPermission);
            cache.put(key, AccessStatus::Denied);
        }
        assert!(cache.len() <= 20);
    }

    #[test]
    fn readers_cache_is_keyed_by_version() {
        let cache = ReadersCache::new(2);
        let readers: Arc<AHashSet<String>> = Arc::new(auths(&["GROUP_EVERYONE"]));
        cache.put(props(1), readers.clone());
        assert_eq!(cache.get(&props(1)), Some(readers));
        assert_eq!(cache.get(&props(2)), None);
    }

    #[test]
    fn readers_cache_evicts_least_recent() {
        let cache = ReadersCache::new(1);
        cache.put(props(1), Arc::new(AHashSet::new()));
        cache.put(props(2), Arc::new(AHashSet::new()));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&props(1)).is_none());
    }
}
