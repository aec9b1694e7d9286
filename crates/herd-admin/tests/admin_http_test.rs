//! Admin API integration tests over a real socket.
//!
//! The inventory updater is asynchronous to the handlers, so tests poll
//! reads after mutations instead of assuming immediate visibility.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;

use herd_admin::AdminServer;
use herd_common::{auth, HealthCheck, QueryMode};
use herd_metrics::MetricsRegistry;
use herd_proxy::ProxyServer;

async fn start_admin() -> (Arc<ProxyServer>, String) {
    let (registry, metrics) = MetricsRegistry::start();
    let check = HealthCheck {
        seconds: 1,
        url: "/".to_string(),
        pattern: String::new(),
    };
    let query_mode = QueryMode {
        round_robin: false,
        by_priority: true,
    };
    let server = ProxyServer::with_response_timeout(
        query_mode,
        &check,
        metrics,
        Duration::from_millis(200),
    )
    .unwrap();

    let admin = AdminServer::new(server.inventory(), auth::from_config(None), registry);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        admin.serve_on(listener).await.unwrap();
    });
    (server, format!("http://{addr}"))
}

async fn get_json(client: &reqwest::Client, url: &str) -> (u16, Value) {
    let response = client.get(url).send().await.unwrap();
    let status = response.status().as_u16();
    let body = response.text().await.unwrap();
    let value = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, value)
}

/// Polls a read until the expected status shows up.
async fn wait_for_status(client: &reqwest::Client, url: &str, expected: u16) -> Value {
    for _ in 0..200 {
        let (status, value) = get_json(client, url).await;
        if status == expected {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{url} never answered {expected}");
}

#[tokio::test]
async fn test_empty_inventory_reads_are_404_envelopes() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    let (status, value) = get_json(&client, &format!("{base}/nodes")).await;
    assert_eq!(status, 404);
    assert_eq!(value["success"], false);
    assert_eq!(value["error"], 404);
    assert_eq!(value["message"], "Record(s) not found");
}

#[tokio::test]
async fn test_put_creates_then_updates() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("{base}/nodes/10.0.0.1/9001"))
        .body(r#"{"priority":2}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(created["results"][0]["priority"], 2);
    assert_eq!(created["results"][0]["active"], false);

    let url = format!("{base}/nodes/10.0.0.1/9001");
    wait_for_status(&client, &url, 200).await;

    let response = client
        .put(&url)
        .body(r#"{"priority":3}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);

    for _ in 0..200 {
        let (status, value) = get_json(&client, &url).await;
        if status == 200 && value["results"][0]["priority"] == 3 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("update never became visible");
}

#[tokio::test]
async fn test_put_merges_over_the_existing_record() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();
    let url = format!("{base}/nodes/n1/8080");

    client
        .put(&url)
        .body(r#"{"priority":5}"#)
        .send()
        .await
        .unwrap();
    wait_for_status(&client, &url, 200).await;

    let response = client
        .put(&url)
        .body(r#"{"maintenance":true}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let merged: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(merged["results"][0]["priority"], 5);
    assert_eq!(merged["results"][0]["maintenance"], true);
}

#[tokio::test]
async fn test_put_rename_moves_the_identity() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    client
        .put(format!("{base}/nodes/h1/1"))
        .body("{}")
        .send()
        .await
        .unwrap();
    wait_for_status(&client, &format!("{base}/nodes/h1/1"), 200).await;

    let response = client
        .put(format!("{base}/nodes/h1/1"))
        .body(r#"{"host":"h2"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);

    wait_for_status(&client, &format!("{base}/nodes/h2/1"), 200).await;
    wait_for_status(&client, &format!("{base}/nodes/h1/1"), 404).await;
}

#[tokio::test]
async fn test_parameter_validation() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    let (status, value) = get_json(&client, &format!("{base}/nodes/bad!host/1")).await;
    assert_eq!(status, 400);
    assert_eq!(value["success"], false);

    let (status, value) = get_json(&client, &format!("{base}/nodes/h/0")).await;
    assert_eq!(status, 400);
    assert!(value["message"]
        .as_str()
        .unwrap()
        .contains("could not be zero"));

    let (status, _) = get_json(&client, &format!("{base}/nodes/h/not-a-number")).await;
    assert_eq!(status, 400);

    // unparseable single-record body
    let response = client
        .put(format!("{base}/nodes/h/1"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // a batch without identities aborts as a whole
    let response = client
        .put(format!("{base}/nodes"))
        .body(r#"[{"host":"a"}]"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // a batch parse failure aborts as a whole
    let response = client
        .put(format!("{base}/nodes"))
        .body("[{")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_batch_put_then_priority_sorted_read() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("{base}/nodes"))
        .body(r#"[{"host":"h","port":1,"priority":-1},{"host":"h","port":2,"priority":1}]"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let accepted: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(accepted["total"], 2);

    for _ in 0..200 {
        let (status, value) = get_json(&client, &format!("{base}/nodes")).await;
        if status == 200 && value["total"] == 2 {
            // positive priority first, negative last
            assert_eq!(value["results"][0]["port"], 2);
            assert_eq!(value["results"][1]["port"], 1);
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("batch never became visible");
}

#[tokio::test]
async fn test_delete_flow() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();
    let url = format!("{base}/nodes/gone/1");

    client.put(&url).body("{}").send().await.unwrap();
    wait_for_status(&client, &url, 200).await;

    let response = client.delete(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(body["success"], true);

    wait_for_status(&client, &url, 404).await;
    let response = client.delete(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // the host map entry disappeared with its last port
    let response = client
        .delete(format!("{base}/nodes/gone"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // deleting everything always succeeds
    let response = client
        .delete(format!("{base}/nodes"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_login_info_logout_round_trip() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/login"))
        .header("content-type", "application/json")
        .body(r#"{"username":"alice","password":"secret"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let login: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    let token = login["token"].as_str().unwrap().to_string();

    let (status, value) = get_json(&client, &format!("{base}/login/{token}")).await;
    assert_eq!(status, 200);
    assert_eq!(value["info"]["uid"], "alice");

    let response = client
        .delete(format!("{base}/logout/{token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let (status, _) = get_json(&client, &format!("{base}/login/{token}")).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_login_with_form_body_and_missing_credentials() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/login"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("username=bob&password=hunter2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .post(format!("{base}/login"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(body["info"], "Username/Password is required");
}

#[tokio::test]
async fn test_cors_echo_and_preflight() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/nodes"))
        .header("origin", "http://operator.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://operator.example"
    );

    let response = client
        .request(reqwest::Method::OPTIONS, format!("{base}/nodes"))
        .header("origin", "http://operator.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let methods = response
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("PUT"));
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-headers")
            .unwrap(),
        "content-type"
    );
}

#[tokio::test]
async fn test_info_list_metrics_and_fallback() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    let (status, value) = get_json(&client, &format!("{base}/info")).await;
    assert_eq!(status, 200);
    assert!(value["Herd Proxy Service"]["Release"]["Number"].is_string());

    let response = client.get(format!("{base}/list")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await.unwrap().contains("Get Node"));

    let response = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let (status, value) = get_json(&client, &format!("{base}/no/such/route")).await;
    assert_eq!(status, 404);
    assert_eq!(value["message"], "Method not found");
}

#[tokio::test]
async fn test_pretty_printing() {
    let (_server, base) = start_admin().await;
    let client = reqwest::Client::new();

    client
        .put(format!("{base}/nodes/p/1"))
        .body("{}")
        .send()
        .await
        .unwrap();
    wait_for_status(&client, &format!("{base}/nodes/p/1"), 200).await;

    let compact = client
        .get(format!("{base}/nodes"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(!compact.contains('\n'));

    let pretty = client
        .get(format!("{base}/nodes?pretty=true"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(pretty.contains('\n'));
}
