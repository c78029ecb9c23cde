use congress_sync::api::ApiClient;
use congress_sync::config::ApiConfig;
use congress_sync::error::SyncError;
use httpmock::prelude::*;
use serde_json::json;

fn client(server: &MockServer, page_limit: u32) -> ApiClient {
    let config = ApiConfig {
        base_url: server.base_url(),
        page_limit,
        request_delay_ms: 0,
        max_retries: 3,
        base_delay_ms: 1,
        timeout_secs: 5,
        ..Default::default()
    };
    ApiClient::with_api_key(&config, Some("test-key".into())).unwrap()
}

#[tokio::test]
async fn every_request_carries_key_and_format() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/member/P000197")
                .query_param("api_key", "test-key")
                .query_param("format", "json");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"member": {"bioguideId": "P000197"}}));
        })
        .await;

    let doc = client(&server, 250)
        .fetch("member/P000197", &[])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(doc["member"]["bioguideId"], "P000197");
}

#[tokio::test]
async fn pagination_stops_without_next_link() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET).path("/bill").query_param("offset", "0");
            then.status(200).json_body(json!({
                "bills": [{"number": "1"}, {"number": "2"}],
                "pagination": {"count": 3, "next": "https://api.congress.gov/v3/bill?offset=2"}
            }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/bill")
                .query_param("offset", "2")
                .query_param("limit", "2");
            then.status(200).json_body(json!({
                "bills": [{"number": "3"}],
                "pagination": {}
            }));
        })
        .await;

    let items = client(&server, 2)
        .fetch_all_pages("bill", &[], Some("bills"))
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    let numbers: Vec<_> = items.iter().map(|b| b["number"].as_str().unwrap()).collect();
    assert_eq!(numbers, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn pagination_stops_at_reported_count() {
    let server = MockServer::start_async().await;
    let page = |offset: &'static str| {
        json!({
            "members": [{"bioguideId": format!("A{}", offset)}, {"bioguideId": format!("B{}", offset)}],
            "pagination": {"count": 4, "next": "https://api.congress.gov/v3/member?offset=next"}
        })
    };
    let first = server
        .mock_async(|when, then| {
            when.method(GET).path("/member").query_param("offset", "0");
            then.status(200).json_body(page("0"));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET).path("/member").query_param("offset", "2");
            then.status(200).json_body(page("2"));
        })
        .await;
    let beyond = server
        .mock_async(|when, then| {
            when.method(GET).path("/member").query_param("offset", "4");
            then.status(200).json_body(json!({"members": []}));
        })
        .await;

    let items = client(&server, 2)
        .fetch_all_pages("member", &[], None)
        .await
        .unwrap();

    assert_eq!(items.len(), 4);
    first.assert_async().await;
    second.assert_async().await;
    beyond.assert_calls_async(0).await;
}

#[tokio::test]
async fn full_page_without_next_link_is_the_last() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET).path("/bill").query_param("offset", "0");
            then.status(200).json_body(json!({
                "bills": [{"number": "1"}, {"number": "2"}]
            }));
        })
        .await;
    let beyond = server
        .mock_async(|when, then| {
            when.method(GET).path("/bill").query_param("offset", "2");
            then.status(200).json_body(json!({"bills": [{"number": "3"}]}));
        })
        .await;

    let items = client(&server, 2)
        .fetch_all_pages("bill", &[], Some("bills"))
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    first.assert_async().await;
    beyond.assert_calls_async(0).await;
}

#[tokio::test]
async fn empty_page_stops_despite_next_link() {
    let server = MockServer::start_async().await;
    let next = json!({"next": "https://api.congress.gov/v3/member?offset=next"});
    let first = server
        .mock_async(|when, then| {
            when.method(GET).path("/member").query_param("offset", "0");
            then.status(200).json_body(json!({
                "members": [{"bioguideId": "A1"}, {"bioguideId": "B1"}],
                "pagination": next.clone()
            }));
        })
        .await;
    let empty = server
        .mock_async(|when, then| {
            when.method(GET).path("/member").query_param("offset", "2");
            then.status(200)
                .json_body(json!({"members": [], "pagination": next.clone()}));
        })
        .await;
    let beyond = server
        .mock_async(|when, then| {
            when.method(GET).path("/member").query_param("offset", "4");
            then.status(200).json_body(json!({"members": [{"bioguideId": "C1"}]}));
        })
        .await;

    let items = client(&server, 2)
        .fetch_all_pages("member", &[], Some("members"))
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    first.assert_async().await;
    empty.assert_async().await;
    beyond.assert_calls_async(0).await;
}

#[tokio::test]
async fn paging_starts_at_caller_offset() {
    let server = MockServer::start_async().await;
    let from_zero = server
        .mock_async(|when, then| {
            when.method(GET).path("/bill").query_param("offset", "0");
            then.status(200).json_body(json!({"bills": []}));
        })
        .await;
    let resumed = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/bill")
                .query_param("offset", "500")
                .query_param("limit", "250");
            then.status(200).json_body(json!({
                "bills": [{"number": "501"}],
                "pagination": {"count": 501}
            }));
        })
        .await;

    let query = [
        ("offset", "500".to_string()),
        ("limit", "10".to_string()),
        ("sort", "updateDate desc".to_string()),
    ];
    let items = client(&server, 250)
        .fetch_all_pages("bill", &query, Some("bills"))
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    resumed.assert_async().await;
    from_zero.assert_calls_async(0).await;
}

#[tokio::test]
async fn server_errors_are_retried_until_exhausted() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/bill/118/hr/1");
            then.status(503).body("unavailable");
        })
        .await;

    let err = client(&server, 250)
        .fetch("bill/118/hr/1", &[])
        .await
        .unwrap_err();

    mock.assert_calls_async(3).await;
    match err {
        SyncError::Upstream {
            attempts, message, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(message.contains("503"), "unexpected message: {}", message);
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn not_found_fails_without_retry() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/bill/118/hr/99999");
            then.status(404).json_body(json!({"error": "not found"}));
        })
        .await;

    let err = client(&server, 250)
        .fetch("bill/118/hr/99999", &[])
        .await
        .unwrap_err();

    mock.assert_calls_async(1).await;
    assert!(matches!(err, SyncError::Upstream { attempts: 1, .. }));
    assert!(!err.is_per_record());
}

#[tokio::test]
async fn upstream_sub_resource_links_hit_the_configured_server() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/bill/118/hr/1/actions")
                .query_param("format", "json");
            then.status(200).json_body(json!({"actions": []}));
        })
        .await;

    client(&server, 250)
        .fetch(
            "https://api.congress.gov/v3/bill/118/hr/1/actions?format=json",
            &[],
        )
        .await
        .unwrap();

    mock.assert_async().await;
}
