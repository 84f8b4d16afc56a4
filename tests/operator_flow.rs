mod support;

use chrono::NaiveDate;
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use ipo_pilot::api::HttpResponse;
use ipo_pilot::core::ProfileError;
use ipo_pilot::monitoring::records::{ApplicationStatus, NewSource, SessionState, SourceKind};
use ipo_pilot::monitoring::{RecordStore, SessionSupervisor};
use ipo_pilot::operator::{Operator, SourceUpdate};
use ipo_pilot::profiles::ProfileUpdate;
use support::*;

fn operator(harness: &Harness) -> Operator {
    let supervisor = Arc::new(SessionSupervisor::new(
        harness.context.clone(),
        Duration::from_secs(300),
    ));
    Operator::new(harness.context.clone(), supervisor)
}

#[tokio::test]
async fn test_profile_lifecycle_through_operator() {
    let harness = Harness::new().await;
    harness.add_native_source().await;
    let operator = operator(&harness);

    script_login(&harness.transport);
    harness
        .transport
        .ok(Method::POST, issues_url(), 200, r#"{"object":[]}"#);

    let profile = assert_ok!(operator.create_profile(new_profile("alice")).await);
    let updated = assert_ok!(
        operator
            .update_profile(
                profile.id,
                ProfileUpdate {
                    ask_for_quantity: Some(true),
                    ..Default::default()
                },
            )
            .await
    );
    assert!(updated.ask_for_quantity);

    let session = assert_ok!(operator.start_session(profile.id, None).await);
    assert_eq!(operator.sessions().await.len(), 1);

    let refused = operator.delete_profile(profile.id).await;
    assert!(matches!(refused, Err(ProfileError::Validation(_))));

    assert_ok!(operator.stop_session(session.id).await);
    tokio::time::timeout(Duration::from_secs(10), async {
        while operator.delete_profile(profile.id).await.is_err() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(assert_ok!(operator.profiles().await).is_empty());
    assert!(assert_ok!(operator.history(None).await).is_empty());
}

#[tokio::test]
async fn test_source_management_and_listings() {
    let harness = Harness::new().await;
    let operator = operator(&harness);

    assert_err!(
        operator
            .create_source(NewSource {
                name: "blank".to_string(),
                kind: SourceKind::GenericRest,
                base_url: " ".to_string(),
                api_key: None,
                is_active: true,
                priority: 1,
                description: None,
            })
            .await
    );

    let source = assert_ok!(
        operator
            .create_source(NewSource {
                name: "partner".to_string(),
                kind: SourceKind::PublicResultFeed,
                base_url: FEED.to_string(),
                api_key: None,
                is_active: false,
                priority: 3,
                description: None,
            })
            .await
    );

    harness.transport.ok(
        Method::GET,
        format!("{}/result/openIpo", FEED),
        200,
        r#"{"data":[{"companyName":"Foo Hydropower","stockSymbol":"FOO","issueOpenDate":"2026-11-01"}]}"#,
    );

    assert!(assert_ok!(operator.open_listings().await).is_empty());

    let enabled = assert_ok!(
        operator
            .update_source(
                source.id,
                SourceUpdate {
                    is_active: Some(true),
                    priority: Some(8),
                    ..Default::default()
                },
            )
            .await
    );
    assert!(enabled.is_active);
    assert_eq!(enabled.priority, 8);

    let open = assert_ok!(operator.open_listings().await);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].issue_id, "FOO");

    let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    assert_eq!(assert_ok!(operator.upcoming_listings(today).await).len(), 1);

    let sources = assert_ok!(operator.sources().await);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name, "partner");
}

#[tokio::test]
async fn test_delete_refused_while_stopped_session_drains() {
    let harness = Harness::new().await;
    harness.add_native_source().await;
    let operator = operator(&harness);
    let profile_id = harness.add_profile("alice").await;

    script_login(&harness.transport);
    harness.transport.ok(
        Method::POST,
        issues_url(),
        200,
        r#"{"object":[{"companyShareId":571,"companyName":"Foo Hydropower"}]}"#,
    );
    harness.transport.on(
        Method::POST,
        apply_url(),
        Ok(HttpResponse::new(StatusCode::CREATED, r#"{"message":"ok"}"#)),
    );

    harness.transport.set_delay(Duration::from_millis(200));

    let session = assert_ok!(operator.start_session(profile_id, None).await);

    let transport = harness.transport.clone();
    tokio::time::timeout(Duration::from_secs(10), async {
        while transport.calls_to(&apply_url()) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let stopped = assert_ok!(operator.stop_session(session.id).await);
    assert_eq!(stopped.state, SessionState::Stopped);

    let refused = operator.delete_profile(profile_id).await;
    assert!(matches!(refused, Err(ProfileError::Validation(_))));

    tokio::time::timeout(Duration::from_secs(10), async {
        while operator.delete_profile(profile_id).await.is_err() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert!(assert_ok!(operator.profiles().await).is_empty());
}

#[tokio::test]
async fn test_run_once_applies_for_active_profiles() {
    let harness = Harness::new().await;
    harness.add_native_source().await;
    let operator = operator(&harness);
    let alice = harness.add_profile("alice").await;
    let bob = harness.add_profile("bob").await;

    script_login(&harness.transport);
    harness.transport.ok(
        Method::POST,
        issues_url(),
        200,
        r#"{"object":[
            {"companyShareId":571,"scrip":"FOO","companyName":"Foo Hydropower"},
            {"companyShareId":572,"scrip":"BAR","companyName":"Bar Bank"}
        ]}"#,
    );
    harness.transport.ok(Method::POST, apply_url(), 201, r#"{"message":"ok"}"#);

    let reports = assert_ok!(operator.run_once(None).await);
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.started == 2 && r.error.is_none()));
    assert_eq!(harness.transport.calls_to(&apply_url()), 4);

    for profile_id in [alice, bob] {
        let history = assert_ok!(operator.history(Some(profile_id)).await);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.status == ApplicationStatus::Success));
    }

    let session_id = reports[0].session_id.unwrap();
    let row = harness.store.get_session(session_id).await.unwrap().unwrap();
    assert_eq!(row.state, SessionState::Stopped);
    assert!(!row.is_active);

    let again = assert_ok!(operator.run_once(Some(&[alice])).await);
    assert_eq!(again[0].started, 0);
    assert_eq!(harness.transport.calls_to(&apply_url()), 4);
}

#[tokio::test]
async fn test_run_once_skips_profile_with_running_session() {
    let harness = Harness::new().await;
    harness.add_native_source().await;
    let operator = operator(&harness);
    let profile_id = harness.add_profile("alice").await;

    script_login(&harness.transport);
    harness
        .transport
        .ok(Method::POST, issues_url(), 200, r#"{"object":[]}"#);

    let session = assert_ok!(operator.start_session(profile_id, None).await);

    let reports = assert_ok!(operator.run_once(Some(&[profile_id])).await);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].started, 0);
    assert!(reports[0].session_id.is_none());
    assert!(reports[0].error.is_some());

    assert_ok!(operator.stop_session(session.id).await);
}
