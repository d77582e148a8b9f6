//! End-to-end fan-out tests against in-process OpenTSDB stand-ins

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use tsdb_relay::client::{ClientConfig, ClientError, Context, Target, TsdbClient};
use tsdb_relay::multi::MultiSource;
use tsdb_relay::query::{parse_request, Version};
use tsdb_relay::tags::TagSet;

const EAST: &str = r#"[
    {"metric":"sys.cpu","tags":{"host":"web01"},"aggregateTags":[],
     "query":{"aggregator":"sum","metric":"sys.cpu","index":0},
     "dps":{"100":1.0,"110":2.0}}
]"#;

const WEST: &str = r#"[
    {"metric":"sys.cpu","tags":{"host":"web02"},"aggregateTags":[],
     "query":{"aggregator":"sum","metric":"sys.cpu","index":0},
     "dps":{"100":5.0}},
    {"metric":"sys.cpu","tags":{"host":"web01"},"aggregateTags":[],
     "query":{"aggregator":"sum","metric":"sys.cpu","index":0},
     "dps":{"110":3.0,"120":4.0}}
]"#;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr.to_string()
}

async fn backend(status: StatusCode, body: &'static str) -> String {
    serve(Router::new().route("/api/query", post(move || async move { (status, body) }))).await
}

fn client() -> TsdbClient {
    TsdbClient::new(ClientConfig {
        timeout_ms: 5_000,
        ..Default::default()
    })
    .unwrap()
}

fn request() -> tsdb_relay::query::Request {
    parse_request("start=1h-ago&m=sum:sys.cpu{host=*}", Version::V2_2).unwrap()
}

#[tokio::test]
async fn test_merges_backends_in_target_order() {
    let east = backend(StatusCode::OK, EAST).await;
    let west = backend(StatusCode::OK, WEST).await;

    let multi = MultiSource::new()
        .add(Target::new(client(), east))
        .add(Target::new(client(), west));
    let merged = multi.query(&request()).await.unwrap();

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].tags.get("host"), Some("web01"));
    assert_eq!(merged[0].dps.sorted_times(), vec![100, 110, 120]);
    assert_eq!(merged[0].dps.get(110), Some(5.0));
    assert_eq!(merged[1].tags.get("host"), Some("web02"));
    assert_eq!(merged[1].dps.get(100), Some(5.0));
}

#[tokio::test]
async fn test_posts_request_as_json() {
    let seen: Arc<Mutex<Option<Value>>> = Arc::default();
    let captured = seen.clone();
    let router = Router::new().route(
        "/api/query",
        post(move |Json(body): Json<Value>| {
            let captured = captured.clone();
            async move {
                *captured.lock().unwrap() = Some(body);
                (StatusCode::OK, "[]")
            }
        }),
    );
    let host = serve(router).await;

    let result = Target::new(client(), host).query(&request()).await.unwrap();
    assert!(result.is_empty());

    let body = seen.lock().unwrap().take().unwrap();
    assert_eq!(body["start"], "1h-ago");
    assert_eq!(body["queries"][0]["metric"], "sys.cpu");
    assert_eq!(body["queries"][0]["aggregator"], "sum");
    assert_eq!(body["queries"][0]["filters"][0]["type"], "wildcard");
    assert_eq!(body["queries"][0]["filters"][0]["groupBy"], true);
}

#[tokio::test]
async fn test_synthetic_tags_keep_sources_apart() {
    let east = backend(StatusCode::OK, EAST).await;
    let west = backend(StatusCode::OK, EAST).await;

    let tags = |dc: &str| [("dc", dc)].into_iter().collect::<TagSet>();
    let multi = MultiSource::new()
        .add(Target::new(client(), east).synthetic_tags(tags("east")))
        .add(Target::new(client(), west).synthetic_tags(tags("west")));
    let merged = multi.query(&request()).await.unwrap();

    let dcs: Vec<_> = merged.iter().map(|r| r.tags.get("dc").unwrap()).collect();
    assert_eq!(dcs, vec!["east", "west"]);
    assert_eq!(merged[0].dps.get(110), Some(2.0));
}

#[tokio::test]
async fn test_filter_tags_drops_unrequested_keys() {
    const BODY: &str = r#"[{"metric":"sys.cpu","tags":{"host":"web01","rack":"r1"},"dps":{}}]"#;
    let host = backend(StatusCode::OK, BODY).await;

    let set = Target::new(client(), host)
        .filter_tags(true)
        .query(&request())
        .await
        .unwrap();
    assert_eq!(set[0].tags.get("host"), Some("web01"));
    assert!(!set[0].tags.contains_key("rack"));
}

#[tokio::test]
async fn test_response_limit() {
    let host = backend(StatusCode::OK, EAST).await;

    let err = Target::new(client(), host.clone())
        .limit(16)
        .query(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ResponseTooLarge { limit: 16 }));

    let ok = Target::new(client(), host).limit(-1).query(&request()).await;
    assert_eq!(ok.unwrap().len(), 1);
}

#[tokio::test]
async fn test_upstream_error() {
    const BODY: &str = r#"{"error":{"code":400,"message":"No such name for 'metrics': 'sys.cpu'"}}"#;
    let bad = backend(StatusCode::BAD_REQUEST, BODY).await;
    let good = backend(StatusCode::OK, EAST).await;

    let multi = MultiSource::new()
        .add(Target::new(client(), good))
        .add(Target::new(client(), bad));
    match multi.query(&request()).await.unwrap_err() {
        ClientError::Upstream { code, message, request, .. } => {
            assert_eq!(code, 400);
            assert!(message.starts_with("No such name"));
            assert!(request.contains("sys.cpu"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_error() {
    let host = backend(StatusCode::BAD_GATEWAY, "upstream gone").await;

    let err = Target::new(client(), host).query(&request()).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Transport { status: 502, body: Some(ref b) } if b == "upstream gone"
    ));
}
