//! The bounded hash-root cache.
//!
//! Roots are keyed by content: the SHA-256 fingerprint of the value's serialization,
//! together with the descriptor fingerprint and the capacity in force. Entries live in
//! an LRU bounded by a constructor parameter. Concurrent lookups for the same key
//! compute at most once: the first thread installs a promise that later arrivals wait
//! on. A process-wide toggle disables consultation of the cache without invalidating
//! it.

use crate::codec::SszUtils;
use crate::error::Error;
use crate::hashing;
use crate::size::determine_size;
use crate::value::Value;
use crate::Hash256;
use lazy_static::lazy_static;
use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Default bound on the number of cached roots.
pub(crate) const DEFAULT_CACHE_SIZE: usize = 100_000;

static USE_CACHE: AtomicBool = AtomicBool::new(true);

lazy_static! {
    static ref HASH_CACHE: HashCache = HashCache::new(DEFAULT_CACHE_SIZE);
}

/// Enables or disables consultation of the process-wide cache.
pub(crate) fn set_enabled(enabled: bool) {
    USE_CACHE.store(enabled, Ordering::Relaxed);
}

fn enabled() -> bool {
    USE_CACHE.load(Ordering::Relaxed)
}

/// Cache-aware hash tree root over the process-wide cache.
pub(crate) fn lookup(
    utils: &Arc<SszUtils>,
    value: &Value,
    max_capacity: u64,
) -> Result<Hash256, Error> {
    HASH_CACHE.lookup(utils, value, max_capacity)
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fingerprint: Hash256,
    descriptor: u64,
    max_capacity: u64,
}

pub(crate) struct HashCache {
    roots: Mutex<LruCache<CacheKey, Hash256>>,
    in_flight: Mutex<HashMap<CacheKey, Receiver>>,
}

impl HashCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            roots: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn lookup(
        &self,
        utils: &Arc<SszUtils>,
        value: &Value,
        max_capacity: u64,
    ) -> Result<Hash256, Error> {
        if !enabled() {
            return utils.hash_tree_root(value, max_capacity);
        }

        let mut buf = vec![0; determine_size(value) as usize];
        utils.marshal_to(value, &mut buf, 0)?;
        let key = CacheKey {
            fingerprint: Hash256::from(hashing::hash_fixed(&buf)),
            descriptor: utils.descriptor_hash(),
            max_capacity,
        };

        if let Some(root) = self.roots.lock().get(&key) {
            return Ok(*root);
        }

        enum Role {
            Waiter(Receiver),
            Worker(Sender),
        }
        let role = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(receiver) => Role::Waiter(receiver.clone()),
                None => {
                    let (sender, receiver) = promise();
                    in_flight.insert(key.clone(), receiver);
                    Role::Worker(sender)
                }
            }
        };
        match role {
            Role::Waiter(receiver) => receiver.recv(),
            Role::Worker(sender) => {
                let result = utils.hash_tree_root(value, max_capacity);
                if let Ok(root) = &result {
                    self.roots.lock().put(key.clone(), *root);
                }
                self.in_flight.lock().remove(&key);
                sender.send(result.clone());
                result
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.roots.lock().len()
    }
}

// A one-shot broadcast promise: the worker sends its result once, every waiter
// receives a clone. A worker that disappears without sending (it panicked) is
// detected through the dropped `Arc` token and surfaces as a hash failure rather
// than a hang.

enum PromiseState {
    Pending(Weak<()>),
    Ready(Result<Hash256, Error>),
}

struct PromiseInner {
    state: Mutex<PromiseState>,
    condvar: Condvar,
}

struct Sender(Arc<PromiseInner>, Option<Arc<()>>);

impl Sender {
    fn send(self, item: Result<Hash256, Error>) {
        *self.0.state.lock() = PromiseState::Ready(item);
        // Waiters are notified by the `Drop` implementation.
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.1 = None;
        self.0.condvar.notify_all();
    }
}

#[derive(Clone)]
struct Receiver(Arc<PromiseInner>);

impl Receiver {
    fn recv(self) -> Result<Hash256, Error> {
        let mut state = self.0.state.lock();
        loop {
            match &*state {
                PromiseState::Ready(result) => return result.clone(),
                PromiseState::Pending(worker) if worker.upgrade().is_some() => {
                    self.0.condvar.wait(&mut state);
                }
                PromiseState::Pending(_) => {
                    return Err(Error::HashFailure(
                        "hash computation was dropped before completing".to_string(),
                    ))
                }
            }
        }
    }
}

fn promise() -> (Sender, Receiver) {
    let token = Arc::new(());
    let inner = Arc::new(PromiseInner {
        state: Mutex::new(PromiseState::Pending(Arc::downgrade(&token))),
        condvar: Condvar::new(),
    });
    let receiver = Receiver(inner.clone());
    (Sender(inner, Some(token)), receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec_cache::cached_ssz_utils;
    use crate::descriptor::describe;

    #[test]
    fn promise_delivers_to_late_waiter() {
        let (sender, receiver) = promise();
        sender.send(Ok(Hash256::from([7; 32])));
        assert_eq!(receiver.recv(), Ok(Hash256::from([7; 32])));
    }

    #[test]
    fn dropped_sender_is_a_hash_failure() {
        let (sender, receiver) = promise();
        drop(sender);
        assert!(matches!(receiver.recv(), Err(Error::HashFailure(_))));
    }

    #[test]
    fn repeated_lookups_agree_and_hit_the_cache() {
        let cache = HashCache::new(16);
        let value = Value::Uint64(1234);
        let utils = cached_ssz_utils(&describe(&value)).unwrap();
        let first = cache.lookup(&utils, &value, 0).unwrap();
        let second = cache.lookup(&utils, &value, 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lru_bound_is_respected() {
        let cache = HashCache::new(2);
        let utils = cached_ssz_utils(&describe(&Value::Uint64(0))).unwrap();
        for i in 0..5u64 {
            cache.lookup(&utils, &Value::Uint64(i), 0).unwrap();
        }
        assert_eq!(cache.len(), 2);
    }
}
