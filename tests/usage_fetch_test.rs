//! Integration tests for the usage fetch and attribute derivation against a
//! wiremock GraphQL endpoint.

use std::time::Duration;

use chrono::Utc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xfinity_usage::core::http::build_client;
use xfinity_usage::core::metrics::RunMetrics;
use xfinity_usage::core::usage::fetch_at;
use xfinity_usage::error::{ErrorCategory, UsageError};

fn usage_response() -> serde_json::Value {
    serde_json::json!({
        "data": {
            "accountByServiceAccountId": {
                "internet": {
                    "usage": {
                        "inPaidOverage": false,
                        "courtesy": {
                            "totalAllowableCourtesy": 2,
                            "usedCourtesy": 0,
                            "remainingCourtesy": 2
                        },
                        "monthlyUsage": [{
                            "policy": "1.2 Terabyte Data Plan",
                            "month": 5,
                            "year": 2024,
                            "startDate": "2024-05-01",
                            "endDate": "2024-05-31",
                            "daysRemaining": 12,
                            "currentUsage": {"value": 842.17, "unit": "GB"},
                            "allowableUsage": {"value": 1.23, "unit": "TB"},
                            "overage": false,
                            "overageCharge": 0,
                            "maximumOverageCharge": 100,
                            "courtesyCredit": false
                        }]
                    }
                }
            }
        }
    })
}

#[tokio::test]
async fn fetch_sends_bearer_and_operation_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("x-id-token", "test-token"))
        .and(header("x-apollo-operation-name", "InternetDataUsage"))
        .and(header("client", "digital-home-android"))
        .and(body_string_contains("InternetDataUsage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(usage_response()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = build_client(Duration::from_secs(5)).expect("client build");
    let metrics = RunMetrics::new();
    let url = format!("{}/graphql", mock_server.uri());

    let report = fetch_at(&client, &metrics, &url, "test-token")
        .await
        .expect("fetch should succeed");

    let (usage, period) = report.first_period().expect("structure should validate");
    assert_eq!(usage.in_paid_overage, Some(false));
    assert_eq!(period.policy, "1.2 Terabyte Data Plan");
}

#[tokio::test]
async fn fetch_derives_publishable_attributes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(usage_response()))
        .mount(&mock_server)
        .await;

    let client = build_client(Duration::from_secs(5)).expect("client build");
    let metrics = RunMetrics::new();
    let url = format!("{}/graphql", mock_server.uri());

    let report = fetch_at(&client, &metrics, &url, "test-token")
        .await
        .expect("fetch should succeed");
    let attrs = report
        .to_attributes(Utc::now(), &metrics)
        .expect("attributes should derive");

    assert_eq!(attrs.allowable_usage, 1230);
    assert_eq!(attrs.usage_remaining, 387); // trunc(1230 - 842.17)
    assert_eq!(attrs.overage_used, 0);
    assert_eq!(attrs.start_date, "2024-05-01");
    assert_eq!(attrs.days_remaining, 12);

    let json = serde_json::to_value(&attrs).expect("attributes serialize");
    assert_eq!(json["friendly_name"], "Xfinity Usage");
    assert_eq!(json["state_class"], "measurement");
}

#[tokio::test]
async fn fetch_retries_transient_server_errors() {
    let mock_server = MockServer::start().await;

    // First attempt fails with 503, the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(usage_response()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = build_client(Duration::from_secs(10)).expect("client build");
    let metrics = RunMetrics::new();
    let url = format!("{}/graphql", mock_server.uri());

    let report = fetch_at(&client, &metrics, &url, "test-token")
        .await
        .expect("fetch should succeed after retry");
    assert!(report.first_period().is_ok());

    let text = metrics.encode().expect("metrics encode");
    assert!(text.contains(r#"status_code="503""#));
}

#[tokio::test]
async fn fetch_maps_client_error_to_usage_fetch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&mock_server)
        .await;

    let client = build_client(Duration::from_secs(5)).expect("client build");
    let metrics = RunMetrics::new();
    let url = format!("{}/graphql", mock_server.uri());

    let err = fetch_at(&client, &metrics, &url, "test-token")
        .await
        .expect_err("fetch should fail");
    assert!(matches!(
        err,
        UsageError::UsageFetch {
            status: Some(403),
            ..
        }
    ));
    assert_eq!(err.category(), ErrorCategory::UsageFetch);
}

#[tokio::test]
async fn truncated_response_is_a_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": {"accou"#))
        .mount(&mock_server)
        .await;

    let client = build_client(Duration::from_secs(5)).expect("client build");
    let metrics = RunMetrics::new();
    let url = format!("{}/graphql", mock_server.uri());

    let err = fetch_at(&client, &metrics, &url, "test-token")
        .await
        .expect_err("fetch should fail");
    assert!(matches!(err, UsageError::InvalidUsageStructure(_)));
    assert_eq!(err.category(), ErrorCategory::UsageParse);
}

#[tokio::test]
async fn missing_nesting_level_fails_attribute_derivation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"accountByServiceAccountId": {}}
        })))
        .mount(&mock_server)
        .await;

    let client = build_client(Duration::from_secs(5)).expect("client build");
    let metrics = RunMetrics::new();
    let url = format!("{}/graphql", mock_server.uri());

    let report = fetch_at(&client, &metrics, &url, "test-token")
        .await
        .expect("fetch itself succeeds");
    let err = report
        .to_attributes(Utc::now(), &metrics)
        .expect_err("derivation should fail");
    assert!(matches!(err, UsageError::InvalidUsageStructure(_)));
}
