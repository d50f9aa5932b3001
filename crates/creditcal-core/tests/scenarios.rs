//! End-to-end calendar scenarios against a mock credits API.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use creditcal_client::{ApiClientConfig, HttpCreditsApi, RetryConfig, StaticToken};
use creditcal_core::{
    CalendarConfig, CreditTrackingService, DegradeReason, FixedClock, MonthLoad, SyncError,
};
use creditcal_models::{CalendarQuery, CalendarUserCredits, CreditPeriod, UsageEdit, UsageState};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Helpers
// =============================================================================

fn service(server: &MockServer) -> CreditTrackingService {
    let config = ApiClientConfig {
        retry: RetryConfig::disabled(),
        ..ApiClientConfig::with_base_url(server.uri())
    };
    let api = HttpCreditsApi::new(config, Arc::new(StaticToken::new("test-token"))).unwrap();
    let calendar = CalendarConfig {
        sync_debounce: Duration::from_millis(20),
        ..CalendarConfig::default()
    };
    let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 4, 10).unwrap()));
    CreditTrackingService::new(Arc::new(api), calendar, clock)
}

fn march_body() -> serde_json::Value {
    json!({
        "year": 2024,
        "credits": [{
            "cardId": "amex-gold",
            "creditId": "dining",
            "associatedPeriod": "quarterly",
            "history": [{"periodNumber": 1, "usage": "partially_used", "valueUsed": 4.5}]
        }],
        "_month": 3
    })
}

// =============================================================================
// Month loads
// =============================================================================

#[tokio::test]
async fn test_month_load_happy_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/cards/credits/month/2024/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(march_body()))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server);
    let query = CalendarQuery::default();

    let load = service.load_month_data(2024, 3, &query).await.unwrap();
    let expected: CalendarUserCredits = serde_json::from_value(march_body()).unwrap();
    assert_eq!(load, MonthLoad::Loaded { slice: expected });
    assert_eq!(service.store().cached_keys(), vec!["2024-3--false".to_string()]);

    // Served from cache.
    service.load_month_data(2024, 3, &query).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_month_loads_send_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/cards/credits/month/2024/3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(march_body())
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server);
    let query = CalendarQuery::default();

    let (a, b) = tokio::join!(
        service.load_month_data(2024, 3, &query),
        service.load_month_data(2024, 3, &query),
    );
    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn test_missing_year_syncs_once_then_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/cards/credits/month/2024/3"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Year not found"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/cards/credits/sync"))
        .and(query_param("year", "2024"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"year": 2024, "credits": []})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server);
    let load = service
        .load_month_data(2024, 3, &CalendarQuery::default())
        .await
        .unwrap();

    assert!(matches!(
        load,
        MonthLoad::Degraded {
            reason: DegradeReason::YearNotSynced,
            ..
        }
    ));
    assert_eq!(
        serde_json::to_value(load.slice()).unwrap(),
        json!({"year": 2024, "credits": [], "_month": 3})
    );
}

#[tokio::test]
async fn test_missing_year_recovers_after_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/cards/credits/month/2024/3"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Year not found"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/cards/credits/month/2024/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(march_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/cards/credits/sync"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"year": 2024, "credits": []})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server);
    let load = service
        .load_month_data(2024, 3, &CalendarQuery::default())
        .await
        .unwrap();

    assert!(load.is_loaded());
    assert_eq!(load.slice().credits.len(), 1);
}

#[tokio::test]
async fn test_past_year_makes_no_requests() {
    let server = MockServer::start().await;
    let service = service(&server);

    let load = service
        .load_month_data(2023, 1, &CalendarQuery::default())
        .await
        .unwrap();

    assert!(matches!(load, MonthLoad::OutOfPolicy { .. }));
    assert!(load.slice().is_empty());
    assert_eq!(load.slice().month, Some(1));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_session_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/cards/credits/month/2024/3"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server);
    let err = service
        .load_month_data(2024, 3, &CalendarQuery::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NotAuthenticated));
}

// =============================================================================
// Usage edits
// =============================================================================

#[tokio::test]
async fn test_usage_edit_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/cards/credits/month/2024/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(march_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/users/cards/credits/history"))
        .and(body_json(json!({
            "cardId": "amex-gold",
            "creditId": "dining",
            "periodNumber": 1,
            "usage": "used",
            "valueUsed": 10.0,
            "year": 2024
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cardId": "amex-gold",
            "creditId": "dining",
            "associatedPeriod": "quarterly",
            "history": [{"periodNumber": 1, "usage": "used", "valueUsed": 10.0}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server);
    service
        .load_month_data(2024, 3, &CalendarQuery::default())
        .await
        .unwrap();

    let credit = service
        .update_credit_history_entry(&UsageEdit {
            card_id: "amex-gold".to_string(),
            credit_id: "dining".to_string(),
            period: CreditPeriod::Quarterly,
            period_number: 1,
            year: Some(2024),
            usage: Some(UsageState::Used),
            value_used: None,
            max_value: 10.0,
        })
        .await
        .unwrap();

    assert_eq!(credit.history_for(1).unwrap().usage, UsageState::Used);
    assert!(service.store().cached_keys().is_empty());
    assert!(!service.is_protected("amex-gold", "dining", 1));
}

#[tokio::test]
async fn test_year_load_racing_an_edit_does_not_restore_stale_months() {
    let server = MockServer::start().await;
    let mut stale_year = march_body();
    stale_year.as_object_mut().unwrap().remove("_month");
    Mock::given(method("GET"))
        .and(path("/users/cards/credits/year/2024"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(stale_year)
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/users/cards/credits/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cardId": "amex-gold",
            "creditId": "dining",
            "associatedPeriod": "quarterly",
            "history": [{"periodNumber": 1, "usage": "used", "valueUsed": 10.0}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/cards/credits/month/2024/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "year": 2024,
            "credits": [{
                "cardId": "amex-gold",
                "creditId": "dining",
                "associatedPeriod": "quarterly",
                "history": [{"periodNumber": 1, "usage": "used", "valueUsed": 10.0}]
            }],
            "_month": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server);
    let query = CalendarQuery::default();
    let edit = UsageEdit {
        card_id: "amex-gold".to_string(),
        credit_id: "dining".to_string(),
        period: CreditPeriod::Quarterly,
        period_number: 1,
        year: Some(2024),
        usage: Some(UsageState::Used),
        value_used: None,
        max_value: 10.0,
    };

    let (credit, edited) = tokio::join!(
        service.get_credit_with_full_history("amex-gold", "dining", 2024, &query),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            service.update_credit_history_entry(&edit).await
        },
    );
    assert!(credit.unwrap().is_some());
    edited.unwrap();
    assert!(service.store().cached_keys().is_empty());

    let march = service.load_month_data(2024, 3, &query).await.unwrap();
    let dining = march.slice().find_credit("amex-gold", "dining").unwrap();
    assert_eq!(dining.history_for(1).unwrap().usage, UsageState::Used);
}

#[tokio::test]
async fn test_rejected_edit_is_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/users/cards/credits/history"))
        .respond_with(ResponseTemplate::new(500).set_body_string("write failed"))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server);
    let err = service
        .update_credit_history_entry(&UsageEdit {
            card_id: "amex-gold".to_string(),
            credit_id: "dining".to_string(),
            period: CreditPeriod::Quarterly,
            period_number: 2,
            year: Some(2024),
            usage: None,
            value_used: Some(0.0),
            max_value: 10.0,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Api(_)));
    assert!(service.guard().is_empty());
}
