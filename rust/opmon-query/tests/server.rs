mod support;

use http::StatusCode;
use opmon_query::{backend::HealthProbe, model::defaults};
use serde_json::json;
use support::{RecordingBackend, TestServer, API_KEY};

#[tokio::test]
async fn health_is_open() {
    let server = TestServer::new(&RecordingBackend::new());
    let (status, body) = server.get("/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn api_routes_require_the_key() {
    let server = TestServer::new(&RecordingBackend::new());

    let (status, body) = server.get("/api/test", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication failed");

    let (status, _) = server.get("/api/test", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn normalize_route_applies_scope_from_body() {
    let server = TestServer::new(&RecordingBackend::new());
    let (status, body) = server
        .post(
            "/api/normalize",
            &json!({
                "query": { "mode": 2, "host": "db1", "service": "svcA", "metric": "$m" },
                "variables": [{ "id": "m", "type": "constant", "current": { "value": "load" } }]
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], 2);
    assert_eq!(body["host"], "");
    assert_eq!(body["service"], "");
    assert_eq!(body["metric"], "load");
    assert_eq!(body["timeCut"], defaults::TIME_CUT);
}

#[tokio::test]
async fn query_route_returns_empty_data_for_filtered_batch() {
    let backend = RecordingBackend::new();
    let server = TestServer::new(&backend);
    let (status, body) = server
        .post(
            "/api/query",
            &json!({
                "targets": [
                    { "refId": "A", "hide": true },
                    { "refId": "B", "mode": 1, "service": defaults::SERVICE }
                ]
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": [] }));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn request_route_merges_scoped_vars() {
    let server = TestServer::new(&RecordingBackend::new());
    let (status, body) = server
        .post(
            "/api/request",
            &json!({
                "targets": [{
                    "refId": "A",
                    "host": "$h",
                    "service": "http",
                    "hostgroup": defaults::HOSTGROUP,
                    "servicegroup": defaults::SERVICEGROUP,
                    "serviceCatalog": defaults::SERVICE_CATALOG,
                    "metric": defaults::METRIC
                }],
                "scopedVars": { "h": { "value": ["a", "b"] } },
                "variables": [{ "id": "h", "type": "custom", "current": { "value": "z" } }]
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["targets"][0]["host"], "/^(a|b)$/");
    assert_eq!(body["scopedVars"]["h"]["value"], json!(["a", "b"]));
}

#[tokio::test]
async fn host_shaped_variables_and_scoped_values_are_accepted() {
    let backend = RecordingBackend::new();
    backend.reply("query", json!([]));
    let server = TestServer::new(&backend);
    let body = json!({
        "targets": [{
            "refId": "A",
            "host": "$site",
            "service": "http",
            "hostgroup": defaults::HOSTGROUP,
            "servicegroup": defaults::SERVICEGROUP,
            "serviceCatalog": defaults::SERVICE_CATALOG,
            "metric": defaults::METRIC
        }],
        "scopedVars": {
            "__interval": { "text": "1s", "value": "1s" },
            "__interval_ms": { "text": "1000", "value": 1000 }
        },
        "variables": [{
            "id": "site",
            "name": "site",
            "type": "textbox",
            "current": { "text": "north", "value": "north" }
        }]
    });

    let (status, built) = server.post("/api/request", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(built["targets"][0]["host"], "north");
    assert_eq!(built["scopedVars"]["__interval_ms"]["value"], "1000");

    let (status, answered) = server.post("/api/query", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answered, json!({ "data": [] }));
    assert_eq!(backend.calls()[0].payload["targets"][0]["host"], "north");
}

#[tokio::test]
async fn options_route_dispatches_by_field_name() {
    let backend = RecordingBackend::new();
    backend.reply("hostgroup", json!(["linux", "windows"]));
    let server = TestServer::new(&backend);

    let (status, body) = server
        .post("/api/options/hostGroup", &json!({ "query": {} }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            { "label": "linux", "value": "linux" },
            { "label": "windows", "value": "windows" }
        ])
    );
    assert_eq!(backend.calls()[0].path, "hostgroup");
}

#[tokio::test]
async fn unknown_option_field_is_bad_request() {
    let server = TestServer::new(&RecordingBackend::new());
    let (status, body) = server
        .post("/api/options/uptime", &json!({ "query": {} }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "query syntax error, got no url, unknown type: uptime"
    );
}

#[tokio::test]
async fn backend_failure_on_options_is_bad_gateway() {
    let backend = RecordingBackend::new();
    backend.fail("hosts", "connection refused");
    let server = TestServer::new(&backend);

    let (status, body) = server
        .post("/api/options/host", &json!({ "query": {} }))
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "backend request failed: connection refused");
}

#[tokio::test]
async fn malformed_body_is_invalid_request() {
    let server = TestServer::new(&RecordingBackend::new());
    let (status, body) = server.post_raw("/api/query", "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.starts_with("invalid request:")));
}

#[tokio::test]
async fn test_route_reports_backend_status() {
    let backend = RecordingBackend::new();
    backend.set_health(HealthProbe {
        status: 401,
        status_text: Some("Unauthorized".into()),
        body: Some(json!({ "error": { "code": "E01", "message": "invalid share" } })),
    });
    let server = TestServer::new(&backend);

    let (status, body) = server.get("/api/test", Some(API_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "error",
            "message": "Unauthorized: E01. invalid share",
            "title": "Error"
        })
    );
}

#[tokio::test]
async fn editor_plan_and_change() {
    let server = TestServer::new(&RecordingBackend::new());

    let (status, plan) = server
        .post(
            "/api/editor/plan",
            &json!({ "query": { "mode": 1, "objecttype": "Hostgroup" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["editorMode"], "code");
    assert_eq!(
        plan["objectTypes"],
        json!(["Service", "Hostgroup", "Servicegroup"])
    );
    assert_eq!(plan["initialFetches"], json!(["host", "hostgroup", "timeCut"]));

    let (status, update) = server
        .post(
            "/api/editor/change",
            &json!({
                "query": { "host": "web01", "service": "http" },
                "change": { "field": "hostgroup", "value": "linux" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(update["query"]["host"], defaults::HOST);
    assert_eq!(update["query"]["service"], defaults::SERVICE);
    assert_eq!(update["clear"], json!(["host", "service"]));
}
