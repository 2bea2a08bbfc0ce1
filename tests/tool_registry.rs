mod common;

use std::time::Duration;

use serde_json::json;

use common::{FakeUpstream, Reply};
use geoglows_mcp::client::GeoglowsClient;
use geoglows_mcp::models::ReturnPeriodTable;

#[tokio::test]
async fn forecast_without_date_omits_the_parameter() {
    let upstream = FakeUpstream::start(Reply::Json(json!([]))).await;

    upstream
        .client()
        .forecasted_streamflow(12345, None)
        .await
        .unwrap();

    let hits = upstream.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "/forecast/12345");
    assert_eq!(hits[0].param("format").as_deref(), Some("json"));
    assert_eq!(hits[0].param("date"), None);
}

#[tokio::test]
async fn forecast_date_is_sent_in_compact_form() {
    let upstream = FakeUpstream::start(Reply::Json(json!([]))).await;

    upstream
        .client()
        .forecast_stats(760701588, Some("2025-10-24"))
        .await
        .unwrap();

    let hits = upstream.hits();
    assert_eq!(hits[0].path, "/forecaststats/760701588");
    assert_eq!(hits[0].param("date").as_deref(), Some("20251024"));
}

#[tokio::test]
async fn historical_range_is_forwarded() {
    let upstream = FakeUpstream::start(Reply::Json(json!([]))).await;

    upstream
        .client()
        .historical_streamflow(760701588, Some("20200101"), Some("2020-12-31"))
        .await
        .unwrap();

    let hits = upstream.hits();
    assert_eq!(hits[0].path, "/retrospective/760701588");
    assert_eq!(hits[0].param("start_date").as_deref(), Some("20200101"));
    assert_eq!(hits[0].param("end_date").as_deref(), Some("20201231"));
}

#[tokio::test]
async fn reversed_range_fails_before_any_call() {
    let upstream = FakeUpstream::start(Reply::Json(json!([]))).await;

    let err = upstream
        .client()
        .historical_streamflow(760701588, Some("20200201"), Some("20200101"))
        .await
        .unwrap_err();

    assert!(err.is_invalid_parameter());
    assert!(upstream.hits().is_empty());
}

#[tokio::test]
async fn malformed_date_fails_before_any_call() {
    let upstream = FakeUpstream::start(Reply::Json(json!([]))).await;

    let err = upstream
        .client()
        .forecasted_streamflow(12345, Some("next tuesday"))
        .await
        .unwrap_err();

    assert!(err.is_invalid_parameter());
    assert!(upstream.hits().is_empty());
}

#[tokio::test]
async fn non_positive_river_id_fails_for_every_operation() {
    let upstream = FakeUpstream::start(Reply::Json(json!([]))).await;
    let client = upstream.client();

    for river_id in [0, -1, -760701588] {
        let results = [
            client.forecasted_streamflow(river_id, None).await,
            client.historical_streamflow(river_id, None, None).await,
            client.forecast_stats(river_id, None).await,
            client.return_periods(river_id).await,
        ];
        for result in results {
            assert!(result.unwrap_err().is_invalid_parameter());
        }
    }

    assert!(upstream.hits().is_empty());
}

#[tokio::test]
async fn server_error_is_upstream_error_without_retry() {
    let upstream = FakeUpstream::start(Reply::Status(500)).await;

    let err = upstream
        .client()
        .forecasted_streamflow(12345, None)
        .await
        .unwrap_err();

    assert!(err.is_upstream());
    assert!(err.to_string().contains("500"));
    assert_eq!(upstream.hits().len(), 1);
}

#[tokio::test]
async fn malformed_json_is_upstream_error() {
    let upstream = FakeUpstream::start(Reply::Body("{\"time\": [")).await;

    let err = upstream.client().return_periods(12345).await.unwrap_err();

    assert!(err.is_upstream());
    assert_eq!(upstream.hits().len(), 1);
}

#[tokio::test]
async fn slow_upstream_times_out_as_upstream_error() {
    let upstream = FakeUpstream::start(Reply::Slow(Duration::from_secs(5), json!([]))).await;
    let config = upstream.config().with_http_timeout(Duration::from_millis(200));

    let err = GeoglowsClient::new(&config)
        .unwrap()
        .forecasted_streamflow(12345, None)
        .await
        .unwrap_err();

    assert!(err.is_upstream());
    assert_eq!(upstream.hits().len(), 1);
}

#[tokio::test]
async fn return_periods_pass_through_verbatim() {
    let fixture = json!({
        "12345": {"2-year": 22801.988, "10-year": 33551.224, "100-year": 45235.886}
    });
    let upstream = FakeUpstream::start(Reply::Json(fixture.clone())).await;

    let payload = upstream.client().return_periods(12345).await.unwrap();
    assert_eq!(payload, fixture);
    assert_eq!(upstream.hits()[0].path, "/returnperiods/12345");

    let table = ReturnPeriodTable::from_payload(&payload).unwrap();
    assert_eq!(table.get("2-year"), Some(22801.988));
    assert_eq!(table.get("100-year"), Some(45235.886));
}
