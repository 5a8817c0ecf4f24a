//! Interfaces to the class-file backend.
//!
//! Reading and writing the class-file byte format, recomputing stack-map
//! frames, and verifying rewritten bytecode are the backend's business; the
//! driver only needs the three operations of [`ClassFileCodec`] plus a way
//! to resolve type names for the verifier.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use untwine_bytecode::MethodBody;

/// A parsed class, reduced to what the rewriter needs.
#[derive(Debug, Default, Clone)]
pub struct ClassUnit {
    /// Internal name (`com/example/Foo`).
    pub name: String,
    pub methods: Vec<MethodBody>,
}

/// Errors produced by a class-file backend.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed class file: {0}")]
    Malformed(String),

    #[error("failed to serialize class: {0}")]
    Emit(String),

    /// Verifier diagnostics; always fatal for the containing file.
    #[error("bytecode verification failed: {0}")]
    Verification(String),
}

/// Resolves internal class names to class-file bytes, for the verifier's
/// type hierarchy queries.
pub trait TypeResolver: Sync {
    fn find_class(&self, internal_name: &str) -> Option<Arc<[u8]>>;
}

/// Class-file backend: parse to the rewriter's method model, serialize back
/// (recomputing stack-map frames and max stack/locals), and verify.
pub trait ClassFileCodec: Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ClassUnit, CodecError>;

    fn emit(&self, class: &ClassUnit) -> Result<Vec<u8>, CodecError>;

    fn verify(&self, bytes: &[u8], resolver: &dyn TypeResolver) -> Result<(), CodecError>;
}

/// Memoizing wrapper around a [`TypeResolver`].
///
/// The driver shares one cache across its worker tasks; resolution results
/// are immutable, so the cache is read-mostly.
pub struct ResolverCache<'a> {
    inner: &'a dyn TypeResolver,
    cache: RwLock<HashMap<String, Option<Arc<[u8]>>>>,
}

impl<'a> ResolverCache<'a> {
    pub fn new(inner: &'a dyn TypeResolver) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl TypeResolver for ResolverCache<'_> {
    fn find_class(&self, internal_name: &str) -> Option<Arc<[u8]>> {
        if let Some(hit) = self.cache.read().get(internal_name) {
            return hit.clone();
        }
        let resolved = self.inner.find_class(internal_name);
        self.cache
            .write()
            .insert(internal_name.to_string(), resolved.clone());
        resolved
    }
}

/// A resolver that knows no classes; suitable for backends whose verifier
/// does not need hierarchy information.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyResolver;

impl TypeResolver for EmptyResolver {
    fn find_class(&self, _internal_name: &str) -> Option<Arc<[u8]>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl TypeResolver for CountingResolver {
        fn find_class(&self, internal_name: &str) -> Option<Arc<[u8]>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (internal_name == "known/Class").then(|| Arc::from(vec![1u8, 2].into_boxed_slice()))
        }
    }

    #[test]
    fn cache_memoizes_hits_and_misses() {
        let inner = CountingResolver {
            calls: AtomicUsize::new(0),
        };
        let cache = ResolverCache::new(&inner);

        assert!(cache.find_class("known/Class").is_some());
        assert!(cache.find_class("known/Class").is_some());
        assert!(cache.find_class("unknown/Class").is_none());
        assert!(cache.find_class("unknown/Class").is_none());

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
