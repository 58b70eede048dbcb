//! 带过期时间的实例缓存
//!
//! 只服务于声明了 TTL 的类：没有额外提供者时，构造结果在 TTL 内被复用。
//! 与单例缓存相互独立。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::object::Object;

struct CacheEntry {
    instance: Arc<Object>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InstanceCache {
    entries: RwLock<HashMap<u64, CacheEntry>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取未过期的实例，过期条目顺便移除
    pub fn get(&self, class_id: u64) -> Option<Arc<Object>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(&class_id) {
                Some(entry) if entry.expires_at > now => return Some(Arc::clone(&entry.instance)),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().remove(&class_id);
        tracing::trace!("Instance cache entry for class #{} expired", class_id);
        None
    }

    pub fn put(&self, class_id: u64, instance: Arc<Object>, ttl: Duration) {
        self.entries.write().insert(
            class_id,
            CacheEntry {
                instance,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&self, class_id: u64) -> bool {
        self.entries.write().remove(&class_id).is_some()
    }

    /// 清理全部过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;

    fn object() -> Arc<Object> {
        let class = Class::builder("Cached").build();
        Arc::new(Object::new(class, Box::new(())))
    }

    #[test]
    fn test_get_within_ttl() {
        let cache = InstanceCache::new();
        let instance = object();
        cache.put(1, Arc::clone(&instance), Duration::from_secs(60));

        let cached = cache.get(1).unwrap();
        assert!(Arc::ptr_eq(&cached, &instance));
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = InstanceCache::new();
        cache.put(1, object(), Duration::ZERO);
        cache.put(2, object(), Duration::ZERO);
        cache.put(3, object(), Duration::from_secs(60));

        assert!(cache.get(1).is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
