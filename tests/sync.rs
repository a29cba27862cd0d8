//! Sync engine behaviour: filtering, atomic replace, failure handling and
//! cache invalidation.

mod common;

use std::time::Duration;

use common::{countries, fields, harness, harness_with_config, raw, CacheCall};
use country_sync::{
    Country, CountryError, CountrySyncConfig, RawCountry, SourceError, StaticSource,
};

const FAMILY_PATTERNS: [&str; 3] = ["country:*", "countries:list:*", "countries:region:*"];

#[tokio::test]
async fn population_threshold_is_strict() {
    let source = StaticSource::new(vec![
        raw("Just Below", Some(999_999), "A"),
        raw("Exactly", Some(1_000_000), "A"),
        raw("Just Above", Some(1_000_001), "A"),
        raw("Unknown", None, "A"),
    ]);
    let h = harness(Vec::new(), source);

    assert_eq!(h.service.sync().await.unwrap(), 1);

    let rows = h.store.inner.snapshot();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name(), "Just Above");
    assert_eq!(rows[0].created_at, rows[0].updated_at);
}

#[tokio::test]
async fn sync_replaces_dataset_and_invalidates_every_family() {
    let source = StaticSource::new(vec![
        raw("Brazil", Some(215_000_000), "Americas"),
        raw("Egypt", Some(110_000_000), "Africa"),
    ]);
    let h = harness(countries(4), source);
    h.service.list(None, None).await.unwrap();
    h.service.list_by_region("Region").await.unwrap();
    h.cache.clear_calls();

    let persisted = h.service.sync().await.unwrap();
    assert_eq!(persisted, 2);

    let names: Vec<String> = h.store.inner.snapshot().iter().map(|c| c.name().to_string()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Brazil".to_string()));
    assert!(names.contains(&"Egypt".to_string()));

    assert_eq!(h.cache.deleted_patterns(), FAMILY_PATTERNS);
    assert!(h.cache.keys().is_empty());
}

#[tokio::test]
async fn batch_shares_one_timestamp() {
    let source = StaticSource::new(
        (0..50).map(|i| raw(&format!("Land {i}"), Some(2_000_000), "X")).collect(),
    );
    let h = harness(Vec::new(), source);
    h.service.sync().await.unwrap();

    let rows = h.store.inner.snapshot();
    assert_eq!(rows.len(), 50);
    assert!(rows.iter().all(|c| c.created_at == rows[0].created_at));
}

#[tokio::test]
async fn resync_keeps_ids_of_known_names() {
    let source = StaticSource::new(vec![
        raw("Kenya", Some(54_000_000), "Africa"),
        raw("Chad", Some(17_000_000), "Africa"),
    ]);
    let h = harness(Vec::new(), source);
    h.service.sync().await.unwrap();
    let before = h.store.inner.snapshot();

    h.service.sync().await.unwrap();
    let after = h.store.inner.snapshot();

    let ids = |rows: &[country_sync::Country]| {
        let mut ids: Vec<_> = rows.iter().map(|c| (c.name().to_string(), c.id, c.created_at)).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn mid_batch_failure_rolls_back_to_previous_dataset() {
    let original = countries(5);
    let source = StaticSource::new(
        (0..10).map(|i| raw(&format!("New {i}"), Some(3_000_000), "Y")).collect(),
    );
    let h = harness(original.clone(), source);
    h.service.list(None, None).await.unwrap();
    h.cache.clear_calls();

    h.store.inner.fail_batch_after(Some(4));
    let err = h.service.sync().await.unwrap_err();
    assert!(matches!(err, CountryError::PersistenceFailure(_)));

    assert_eq!(h.store.inner.snapshot(), {
        let mut rows = original;
        rows.sort_by_key(|c| c.id);
        rows
    });
    assert!(h.cache.mutations().is_empty(), "failed sync must not invalidate");
    assert!(h.cache.contains_key("countries:list:null:20"));
}

#[tokio::test]
async fn source_failure_before_any_record_is_source_unavailable() {
    let h = harness(countries(3), StaticSource::failing(SourceError::Status(503)));
    h.cache.clear_calls();

    let err = h.service.sync().await.unwrap_err();
    assert!(matches!(err, CountryError::SourceUnavailable(_)));
    assert_eq!(h.store.inner.len(), 3);
    assert!(h.cache.mutations().is_empty());
}

#[tokio::test]
async fn source_failure_after_records_persists_partial_batch() {
    let source = StaticSource::new(vec![
        raw("Vietnam", Some(98_000_000), "Asia"),
        raw("Laos", Some(7_000_000), "Asia"),
        raw("Never Seen", Some(9_000_000), "Asia"),
    ])
    .fail_after(2, SourceError::Decode("truncated body".into()));
    let h = harness(countries(2), source);

    let report = h.service.engine().sync_with_report().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.persisted, 2);
    assert!(h.store.inner.snapshot().iter().all(|c| c.name() != "Never Seen"));
}

#[tokio::test(start_paused = true)]
async fn fetch_timeout_is_source_unavailable() {
    let config = CountrySyncConfig { fetch_timeout_secs: 5, ..Default::default() };
    let source = StaticSource::new(vec![raw("Slowland", Some(5_000_000), "Z")])
        .with_delay(Duration::from_secs(60));
    let h = harness_with_config(countries(2), source, config);

    let err = h.service.sync().await.unwrap_err();
    assert!(matches!(err, CountryError::SourceUnavailable(msg) if msg.contains("timed out")));
    assert_eq!(h.store.inner.len(), 2);
}

#[tokio::test]
async fn empty_filtered_batch_keeps_dataset_and_cache() {
    let source = StaticSource::new(vec![raw("Tiny", Some(10), "Z"), RawCountry::named("Nameless")]);
    let h = harness(countries(3), source);
    h.service.list(None, None).await.unwrap();
    h.cache.clear_calls();

    let report = h.service.engine().sync_with_report().await.unwrap();
    assert_eq!(report.persisted, 0);
    assert_eq!(report.filtered_out, 2);
    assert_eq!(h.store.inner.len(), 3);
    assert!(h.cache.mutations().is_empty());
}

#[tokio::test]
async fn cache_reads_after_sync_see_new_data() {
    let source = StaticSource::new(vec![raw("Ghana", Some(33_000_000), "Africa")]);
    let h = harness(Vec::new(), source);
    h.service.create(fields("Togo", "Africa")).await.unwrap();
    assert_eq!(h.service.list_by_region("Africa").await.unwrap().len(), 1);

    h.service.sync().await.unwrap();

    let africa = h.service.list_by_region("Africa").await.unwrap();
    assert_eq!(africa.len(), 1);
    assert_eq!(africa[0].name(), "Ghana");
    assert!(h
        .cache
        .calls()
        .iter()
        .any(|c| matches!(c, CacheCall::Set(k) if k == "countries:region:Africa")));
}

#[tokio::test(start_paused = true)]
async fn sync_dropped_mid_invalidation_still_clears_stale_pages() {
    let source = StaticSource::new(vec![raw("Brazil", Some(215_000_000), "Americas")]);
    let h = harness(countries(3), source);
    assert_eq!(h.service.list(None, None).await.unwrap().len(), 3);
    h.service.list_by_region("Region").await.unwrap();
    h.cache.delay_pattern_deletes(Duration::from_millis(300));

    assert!(tokio::time::timeout(Duration::from_millis(100), h.service.sync()).await.is_err());
    assert_eq!(h.store.inner.snapshot().len(), 1, "replace committed before the caller gave up");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.cache.deleted_patterns(), FAMILY_PATTERNS);

    let after = h.service.list(None, None).await.unwrap();
    assert_eq!(after.items.iter().map(Country::name).collect::<Vec<_>>(), vec!["Brazil"]);
    assert!(h.service.list_by_region("Region").await.unwrap().is_empty());
}
