//! End-to-end calls against a static endpoint.

mod common;

use std::time::Duration;

use axum::Router;
use axum::response::IntoResponse;
use axum::routing::post;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use jsonrpc_http_client::{
    CallOptions, CatalogTarget, ClientBuilder, ClientError, CodecError, ErrorCode, JsonRpcClient,
    ServiceCatalog,
};
use serde_json::{Value, json};

use common::{calculator, gzipped, json_rpc, raw, scripted, serve, url};

#[tokio::test]
async fn test_static_call_reaches_exact_url() {
    let (addr, recorder) = calculator().await;
    let client = JsonRpcClient::builder(url(addr, "/rpc")).build().unwrap();

    let sum: i64 = client.call("add", &json!({"a": 1, "b": 2})).await.unwrap();
    assert_eq!(sum, 3);

    let request = recorder.last();
    assert_eq!(request.path, "/rpc");
    assert_eq!(request.body["jsonrpc"], "2.0");
    assert_eq!(request.body["method"], "add");
    assert_eq!(request.body["params"], json!({"a": 1, "b": 2}));
    assert_eq!(
        request.headers.get(header::CONTENT_TYPE).unwrap(),
        "application/json-rpc"
    );
}

#[tokio::test]
async fn test_request_ids_increase() {
    let (addr, recorder) = calculator().await;
    let client = JsonRpcClient::builder(url(addr, "/rpc")).build().unwrap();

    for _ in 0..3 {
        client.invoke("add", &json!({"a": 1, "b": 1})).await.unwrap();
    }
    let ids: Vec<_> = recorder
        .requests()
        .iter()
        .map(|r| r.body["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, [1, 2, 3]);
}

#[tokio::test]
async fn test_error_object_on_success_status() {
    let (addr, _) = scripted(|_, request| {
        json_rpc(
            StatusCode::OK,
            json!({"jsonrpc": "2.0", "id": request["id"], "error": {"code": -32601, "message": "no such method"}}),
        )
    })
    .await;
    let client = JsonRpcClient::builder(url(addr, "/rpc")).build().unwrap();

    let response = client.invoke("sub", &json!([])).await.unwrap();
    assert_eq!(response.error().unwrap().code(), ErrorCode::MethodNotFound);

    let err = client.call::<_, i64>("sub", &json!([])).await.unwrap_err();
    let rpc = err.rpc_error().unwrap();
    assert_eq!(rpc.code(), ErrorCode::MethodNotFound);
    assert_eq!(rpc.message(), "no such method");
}

#[tokio::test]
async fn test_error_status_with_json_rpc_body_is_decoded() {
    let (addr, _) = scripted(|_, _| {
        json_rpc(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": {"code": -32000}}),
        )
    })
    .await;
    let client = JsonRpcClient::builder(url(addr, "/rpc")).build().unwrap();

    let response = client.invoke("add", &json!({"a": 1, "b": 2})).await.unwrap();
    assert_eq!(
        response.error().unwrap().code(),
        ErrorCode::ServerError(-32000)
    );
    assert!(response.result().is_none());
}

#[tokio::test]
async fn test_undecodable_error_body_is_protocol_error() {
    let (addr, _) = scripted(|_, _| raw(StatusCode::BAD_GATEWAY, b"<html>Bad Gateway</html>")).await;
    let client = JsonRpcClient::builder(url(addr, "/rpc")).build().unwrap();

    let err = client.invoke("add", &Value::Null).await.unwrap_err();
    match err {
        ClientError::Protocol { status, body } => {
            assert_eq!(status, Some(StatusCode::BAD_GATEWAY));
            assert_eq!(body.as_ref(), b"<html>Bad Gateway</html>");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_undecodable_success_body_is_codec_error() {
    let (addr, _) = scripted(|_, _| raw(StatusCode::OK, b"not json at all")).await;
    let client = JsonRpcClient::builder(url(addr, "/rpc")).build().unwrap();

    let err = client.invoke("add", &Value::Null).await.unwrap_err();
    assert!(matches!(err, ClientError::Codec(CodecError::Decode(_))));
}

#[tokio::test]
async fn test_result_type_mismatch_is_codec_error() {
    let (addr, _) = calculator().await;
    let client = JsonRpcClient::builder(url(addr, "/rpc")).build().unwrap();

    let err = client
        .call::<_, String>("add", &json!({"a": 1, "b": 2}))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Codec(CodecError::ResultType(_))));
}

#[tokio::test]
async fn test_gzip_on_both_channels() {
    let (addr, _) = scripted(|path, _| match path {
        "/ok" => gzipped(StatusCode::OK, br#"{"id":1,"result":"zipped"}"#),
        _ => gzipped(
            StatusCode::INTERNAL_SERVER_ERROR,
            br#"{"error":{"code":-32603,"message":"zipped failure"}}"#,
        ),
    })
    .await;

    let ok = JsonRpcClient::builder(url(addr, "/ok")).build().unwrap();
    let value: String = ok.call("echo", &json!([])).await.unwrap();
    assert_eq!(value, "zipped");

    let failing = JsonRpcClient::builder(url(addr, "/fail")).build().unwrap();
    let response = failing.invoke("echo", &json!([])).await.unwrap();
    assert_eq!(response.error().unwrap().code(), ErrorCode::InternalError);
    assert_eq!(response.error().unwrap().message(), "zipped failure");
}

#[tokio::test]
async fn test_header_precedence() {
    let (addr, recorder) = calculator().await;
    let client = JsonRpcClient::builder(url(addr, "/rpc"))
        .content_type("application/json")
        .header("x-a", "default")
        .header("x-b", "default")
        .header("x-b3-sampled", "default")
        .build()
        .unwrap();

    let options = CallOptions::new()
        .header(
            HeaderName::from_static("x-b"),
            HeaderValue::from_static("extra"),
        )
        .header(
            HeaderName::from_static("x-c"),
            HeaderValue::from_static("extra"),
        );
    client
        .invoke_with_options("add", &json!({"a": 1, "b": 2}), options)
        .await
        .unwrap();

    let headers = recorder.last().headers;
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
    assert_eq!(headers.get("x-a").unwrap(), "default");
    assert_eq!(headers.get("x-b").unwrap(), "extra");
    assert_eq!(headers.get("x-c").unwrap(), "extra");
    // The trace stage overrides the default header.
    assert_eq!(headers.get("x-b3-sampled").unwrap(), "0");
}

#[tokio::test]
async fn test_extra_headers_override_content_type() {
    let (addr, recorder) = calculator().await;
    let client = JsonRpcClient::builder(url(addr, "/rpc")).build().unwrap();

    let mut extra = HeaderMap::new();
    extra.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    client
        .invoke_with_options("add", &json!({}), CallOptions::new().headers(extra))
        .await
        .unwrap();
    assert_eq!(
        recorder.last().headers.get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
}

#[tokio::test]
async fn test_redirect_is_followed_with_post() {
    let (addr, recorder) = scripted(|path, request| match path {
        "/old" => (
            StatusCode::TEMPORARY_REDIRECT,
            [(header::LOCATION, "/rpc")],
        )
            .into_response(),
        _ => json_rpc(StatusCode::OK, common::add_result(request)),
    })
    .await;
    let client = JsonRpcClient::builder(url(addr, "/old")).build().unwrap();

    let sum: i64 = client.call("add", &json!({"a": 2, "b": 2})).await.unwrap();
    assert_eq!(sum, 4);

    let requests = recorder.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, "/old");
    assert_eq!(requests[1].path, "/rpc");
    assert_eq!(requests[1].body["method"], "add");
}

#[tokio::test]
async fn test_redirects_disabled() {
    let (addr, recorder) = scripted(|_, _| {
        (StatusCode::FOUND, [(header::LOCATION, "/elsewhere")]).into_response()
    })
    .await;
    let client = JsonRpcClient::builder(url(addr, "/old"))
        .follow_redirects(false)
        .build()
        .unwrap();

    let err = client.invoke("add", &json!({})).await.unwrap_err();
    assert!(err.is_protocol());
    assert_eq!(recorder.requests().len(), 1);
}

#[tokio::test]
async fn test_redirect_loop_is_transport_error() {
    let (addr, recorder) = scripted(|_, _| {
        (StatusCode::FOUND, [(header::LOCATION, "/loop")]).into_response()
    })
    .await;
    let client = JsonRpcClient::builder(url(addr, "/loop"))
        .max_redirects(3)
        .build()
        .unwrap();

    let err = client.invoke("add", &json!({})).await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(recorder.requests().len(), 4);
}

#[tokio::test]
async fn test_cross_origin_redirect_drops_credentials() {
    let (target, target_recorder) = calculator().await;
    let location = url(target, "/rpc");
    let (origin, origin_recorder) = scripted(move |_, _| {
        (
            StatusCode::TEMPORARY_REDIRECT,
            [(header::LOCATION, location.clone())],
        )
            .into_response()
    })
    .await;
    let client = JsonRpcClient::builder(url(origin, "/rpc"))
        .header("authorization", "Bearer secret")
        .header("cookie", "session=1")
        .header("x-caller", "billing")
        .build()
        .unwrap();

    let sum: i64 = client.call("add", &json!({"a": 1, "b": 1})).await.unwrap();
    assert_eq!(sum, 2);

    let first = origin_recorder.last().headers;
    assert_eq!(first.get(header::AUTHORIZATION).unwrap(), "Bearer secret");
    let followed = target_recorder.last().headers;
    assert!(followed.get(header::AUTHORIZATION).is_none());
    assert!(followed.get(header::COOKIE).is_none());
    assert_eq!(followed.get("x-caller").unwrap(), "billing");
}

#[tokio::test]
async fn test_same_origin_redirect_keeps_credentials() {
    let (addr, recorder) = scripted(|path, request| match path {
        "/old" => (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, "/rpc")]).into_response(),
        _ => json_rpc(StatusCode::OK, common::add_result(request)),
    })
    .await;
    let client = JsonRpcClient::builder(url(addr, "/old"))
        .header("authorization", "Bearer secret")
        .build()
        .unwrap();

    client.invoke("add", &json!({})).await.unwrap();
    let requests = recorder.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].headers.get(header::AUTHORIZATION).unwrap(),
        "Bearer secret"
    );
}

#[tokio::test]
async fn test_oversized_decompressed_response_is_transport_error() {
    let (addr, _) = scripted(|_, _| {
        let body = format!(r#"{{"id":1,"result":"{}"}}"#, "a".repeat(8 * 1024));
        gzipped(StatusCode::OK, body.as_bytes())
    })
    .await;

    let limited = JsonRpcClient::builder(url(addr, "/rpc"))
        .max_response_size(1024)
        .build()
        .unwrap();
    let err = limited.invoke("echo", &json!([])).await.unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err:?}");

    let unlimited = JsonRpcClient::builder(url(addr, "/rpc"))
        .max_response_size(None)
        .build()
        .unwrap();
    let value: String = unlimited.call("echo", &json!([])).await.unwrap();
    assert_eq!(value.len(), 8 * 1024);
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = JsonRpcClient::builder(url(addr, "/rpc"))
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let err = client.invoke("add", &json!({})).await.unwrap_err();
    match err {
        ClientError::Transport { source, .. } => {
            assert_eq!(source.kind(), std::io::ErrorKind::ConnectionRefused);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_read_timeout() {
    let router = Router::new().route(
        "/slow",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "{}"
        }),
    );
    let addr = serve(router).await;
    let client = JsonRpcClient::builder(url(addr, "/slow"))
        .read_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let err = client.invoke("add", &json!({})).await.unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_concurrent_calls_share_client() {
    let (addr, recorder) = calculator().await;
    let client = JsonRpcClient::builder(url(addr, "/rpc")).build().unwrap();

    let calls: Vec<_> = (0..8i64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.call::<_, i64>("add", &json!({"a": i, "b": 1})).await })
        })
        .collect();
    for (i, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.unwrap().unwrap(), i as i64 + 1);
    }
    assert_eq!(recorder.requests().len(), 8);
}

#[tokio::test]
async fn test_catalog_clients_call_joined_urls() {
    let (addr, recorder) = calculator().await;
    let catalog = ServiceCatalog::builder(
        CatalogTarget::BaseUrl(url(addr, "/api/")),
        ClientBuilder::new(),
    )
    .register("com.example.Calculator", None)
    .register("com.example.Billing", Some("billing"))
    .build()
    .unwrap();

    let calculator = catalog.get("com.example.Calculator").unwrap();
    let sum: i64 = calculator.call("add", &json!({"a": 5, "b": 5})).await.unwrap();
    assert_eq!(sum, 10);
    assert_eq!(recorder.last().path, "/api/com/example/Calculator");

    let billing = catalog.get("com.example.Billing").unwrap();
    billing.invoke("add", &json!({})).await.unwrap();
    assert_eq!(recorder.last().path, "/api/billing");
}
