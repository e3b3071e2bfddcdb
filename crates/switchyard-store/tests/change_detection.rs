//! Randomized mutation sequences against the polling entity cache.
//!
//! Each step applies one store mutation, advances the shared clock and
//! refreshes. A refresh must report a change exactly when the mutation was
//! an upsert or a delete of an existing entity, and after a change the
//! cache must hold what the store holds.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use switchyard_core::Cluster;
use switchyard_store::{
    notify, EntityCache, EntityCacheConfig, EntityStore, MemoryStore, WatermarkDetector,
};

#[derive(Clone, Debug)]
enum Op {
    Upsert { name: u8, port: u32 },
    Delete { name: u8 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6, 1u32..65535).prop_map(|(name, port)| Op::Upsert { name, port }),
        (0u8..6).prop_map(|name| Op::Delete { name }),
    ]
}

fn sorted(mut clusters: Vec<Cluster>) -> Vec<(String, u32)> {
    clusters.sort_by(|a, b| a.name.cmp(&b.name));
    clusters.into_iter().map(|c| (c.name, c.port)).collect()
}

proptest! {
    #[test]
    fn refresh_detects_every_single_mutation(ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let now = Arc::new(AtomicI64::new(1_000));
            let clock = {
                let now = Arc::clone(&now);
                Arc::new(move || now.load(Ordering::SeqCst))
            };
            let store = Arc::new(MemoryStore::with_clock(clock.clone()));
            let (notifier, mut rx) = notify::channel(64);
            let cache = EntityCache::with_detector(
                store.clone(),
                EntityCacheConfig::default(),
                notifier,
                Arc::new(WatermarkDetector::with_clock(clock)),
            );

            for op in ops {
                now.fetch_add(5, Ordering::SeqCst);
                let expect_change = match op {
                    Op::Upsert { name, port } => {
                        store.upsert(Cluster::new(format!("c{name}"), "backend", port));
                        true
                    }
                    Op::Delete { name } => store.delete::<Cluster>(&format!("c{name}")),
                };
                now.fetch_add(5, Ordering::SeqCst);

                let changed = cache.refresh_clusters().await;
                prop_assert_eq!(changed, expect_change);
                prop_assert_eq!(rx.try_recv().is_ok(), expect_change);

                let stored = store.get_all_clusters().await.unwrap();
                prop_assert_eq!(sorted(cache.clusters().to_vec()), sorted(stored));
            }
            Ok(())
        })?;
    }
}
