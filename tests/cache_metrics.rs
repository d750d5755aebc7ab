use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use plaudit::cache::{
    CacheConfig, CacheConsumer, CacheKey, CacheRegistry, EventKind, EventQueue, ListStore,
};
use plaudit::domain::catalog::SubjectKind;
use uuid::Uuid;

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // List store hit/miss/evict
    let config = CacheConfig {
        list_limit: 1,
        ..Default::default()
    };
    let registry = Arc::new(CacheRegistry::new());
    let store = Arc::new(ListStore::new(&config, registry.clone()));
    let songs = CacheKey::Popular {
        kind: SubjectKind::Song,
        limit: 10,
    };
    let podcasts = CacheKey::Popular {
        kind: SubjectKind::Podcast,
        limit: 10,
    };

    assert!(store.get(&songs).is_none());
    store.insert(
        songs.clone(),
        vec![Uuid::new_v4()],
        Duration::from_secs(60),
        &[SubjectKind::Song],
    );
    assert!(store.get(&songs).is_some());
    // Limit 1: inserting a second key evicts the first.
    store.insert(
        podcasts,
        vec![Uuid::new_v4()],
        Duration::from_secs(60),
        &[SubjectKind::Podcast],
    );

    // Event queue length gauge + consume latency histogram
    let queue = Arc::new(EventQueue::new());
    let consumer = CacheConsumer::new(CacheConfig::default(), store, registry, queue.clone());
    queue.publish(EventKind::SubjectReviewed {
        kind: SubjectKind::Podcast,
        subject_id: Uuid::new_v4(),
    });
    assert!(consumer.consume().await);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "plaudit_cache_list_hit_total",
        "plaudit_cache_list_miss_total",
        "plaudit_cache_list_evict_total",
        "plaudit_cache_event_queue_len",
        "plaudit_cache_consume_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
