mod support;

use chrono::NaiveDate;
use reqwest::Method;
use std::sync::Arc;
use tokio_test::assert_ok;

use ipo_pilot::api::RetryableFetchClient;
use ipo_pilot::core::HealthChecker;
use ipo_pilot::monitoring::records::{NewSource, SourceKind};
use ipo_pilot::monitoring::RecordStore;
use ipo_pilot::scanner::sources::GenericRestSource;
use ipo_pilot::scanner::{Aggregator, SourceRegistry};
use support::*;

fn rest_source(name: &str, priority: i64, is_active: bool) -> NewSource {
    NewSource {
        name: name.to_string(),
        kind: SourceKind::GenericRest,
        base_url: format!("http://{}.test/ipos", name),
        api_key: None,
        is_active,
        priority,
        description: None,
    }
}

#[tokio::test]
async fn test_higher_priority_source_wins_duplicates() {
    let harness = Harness::new().await;
    let store = harness.store.clone();

    let a = assert_ok!(store.insert_source(rest_source("a", 10, true)).await);
    let b = assert_ok!(store.insert_source(rest_source("b", 5, true)).await);
    let c = assert_ok!(store.insert_source(rest_source("c", 7, true)).await);
    assert_ok!(store.insert_source(rest_source("off", 100, false)).await);

    harness.transport.ok(
        Method::GET,
        "http://a.test/ipos",
        200,
        r#"[{"company_share_id":"SCRIP1","company_name":"Foo","issue_open_date":"2026-10-20"}]"#,
    );
    harness.transport.ok(
        Method::GET,
        "http://b.test/ipos",
        200,
        r#"[
            {"company_share_id":"SCRIP1","company_name":"Foo-stale"},
            {"company_share_id":"SCRIP2","company_name":"Bar","issue_open_date":"2026-10-10"}
        ]"#,
    );
    harness
        .transport
        .ok(Method::GET, "http://c.test/ipos", 503, "maintenance");

    let health = HealthChecker::new();
    let aggregator = harness.context.aggregator.clone().with_health(health.clone());

    let listings = assert_ok!(aggregator.fetch_all().await);
    let view: Vec<(&str, &str, i64)> = listings
        .iter()
        .map(|l| (l.issue_id.as_str(), l.company_name.as_str(), l.source_id))
        .collect();
    assert_eq!(view, vec![("SCRIP1", "Foo", a.id), ("SCRIP2", "Bar", b.id)]);

    // The failing source was retried, then skipped; the inactive one never called.
    assert_eq!(harness.transport.calls_to("http://c.test/ipos"), 2);
    assert_eq!(harness.transport.calls_to("http://off.test/ipos"), 0);

    let stamped = |id: i64| {
        let store = store.clone();
        async move { store.get_source(id).await.unwrap().unwrap().last_checked }
    };
    assert!(stamped(a.id).await.is_some());
    assert!(stamped(b.id).await.is_some());
    assert!(stamped(c.id).await.is_none());

    let status = health.get_status().await;
    assert_eq!(status.components.get(&format!("source:{}", c.id)), Some(false));
    assert_eq!(status.components.get(&format!("source:{}", a.id)), Some(true));

    let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
    let upcoming = assert_ok!(aggregator.fetch_upcoming(today).await);
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].issue_id, "SCRIP1");
}

#[tokio::test]
async fn test_sources_without_adapter_are_skipped() {
    let harness = Harness::new().await;
    harness.add_native_source().await;
    assert_ok!(harness.store.insert_source(rest_source("a", 1, true)).await);

    harness.transport.ok(
        Method::GET,
        "http://a.test/ipos",
        200,
        r#"[{"company_share_id":"SCRIP9","company_name":"Qux"}]"#,
    );

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(GenericRestSource));
    let store: Arc<dyn RecordStore> = harness.store.clone();
    let aggregator = Aggregator::new(
        store,
        RetryableFetchClient::new(harness.transport.clone(), fast_policy()),
        Arc::new(registry),
    );

    let listings = assert_ok!(aggregator.fetch_all().await);
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].issue_id, "SCRIP9");
    assert_eq!(harness.transport.calls_to(&issues_url()), 0);
}
