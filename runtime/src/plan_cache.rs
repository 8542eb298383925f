//! Shared cache of synthesized plans.
//!
//! Maps a [`PlanKey`] to a per-key once-cell in papaya's lock-free map. The
//! first caller for a key builds the plan; concurrent callers for the same key
//! block on that build and receive the same `Arc`.
//!
//! # Thread Safety
//!
//! All operations are thread-safe. Plans are immutable once built and live
//! until [`PlanCache::clear`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::{Lazy, OnceCell};
use papaya::HashMap;
use tracing::debug;
use weft_codegen::{CompiledOperation, PlanKey, PlanStore};

type Slot = Arc<OnceCell<Arc<CompiledOperation>>>;

#[derive(Debug, Default)]
pub struct PlanCache {
    plans: HashMap<PlanKey, Slot>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key`, building the plan with `build` if it is absent.
    ///
    /// A failed build leaves the key empty; the next request retries.
    pub fn get_plan(
        &self,
        key: PlanKey,
        build: impl FnOnce() -> weft_codegen::Result<CompiledOperation>,
    ) -> weft_codegen::Result<Arc<CompiledOperation>> {
        let slot = {
            let guard = self.plans.guard();
            Arc::clone(self.plans.get_or_insert_with(key.clone(), || Arc::new(OnceCell::new()), &guard))
        };

        let mut built = false;
        let plan = slot.get_or_try_init(|| {
            built = true;
            debug!(family = %key.family, field = %key.field_type, parameter = key.parameter, "plan cache miss");
            build().map(Arc::new)
        })?;

        let counter = if built { &self.misses } else { &self.hits };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::clone(plan))
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of keys with a cell, built or not.
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Drop every plan and reset the counters.
    pub fn clear(&self) {
        self.plans.pin().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl PlanStore for PlanCache {
    fn get_or_build(
        &self,
        key: PlanKey,
        build: &mut dyn FnMut() -> weft_codegen::Result<CompiledOperation>,
    ) -> weft_codegen::Result<Arc<CompiledOperation>> {
        self.get_plan(key, build)
    }
}

static PLANS: Lazy<Arc<PlanCache>> = Lazy::new(|| Arc::new(PlanCache::new()));

/// Process-wide plan cache shared by every construction context.
pub fn global_plan_cache() -> Arc<PlanCache> {
    Arc::clone(&PLANS)
}
