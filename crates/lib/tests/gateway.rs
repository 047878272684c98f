//! Integration test: start the gateway on a free port against mock QingLong/DingTalk servers,
//! probe health and push a relayed stream event. The server task is left running when the test ends.

mod common;

use common::{env, free_port, MockDingTalk, MockQingLong};
use lib::config::Config;
use lib::gateway::{self, RELAY_SECRET_HEADER};
use serde_json::{json, Value};
use std::time::Duration;

fn qinglong_config(ql_base: &str) -> Config {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.gateway.bind = "127.0.0.1".to_string();
    config.qinglong.url = Some(ql_base.to_string());
    config.qinglong.client_id = Some("ql-id".to_string());
    config.qinglong.client_secret = Some("ql-secret".to_string());
    config
}

/// Start the gateway and wait until GET / answers; returns the health JSON.
async fn start(config: Config) -> (String, Value) {
    let base = format!("http://127.0.0.1:{}", config.gateway.port);
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(format!("{}/", base)).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: Value = resp.json().await.expect("parse JSON");
                return (base, json);
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway at {} did not become healthy within 5s; last error: {:?}", base, last_err);
}

#[tokio::test]
async fn gateway_without_dingtalk_reports_health_and_refuses_relay() {
    let qinglong = MockQingLong::new(vec![]);
    let ql_base = qinglong.serve().await;

    let (base, health) = start(qinglong_config(&ql_base)).await;

    assert_eq!(health["runtime"], "running");
    assert_eq!(health["qinglong"], ql_base.as_str());
    assert_eq!(health["dingtalk"], false);

    let resp = reqwest::Client::new()
        .post(format!("{}/dingtalk/stream", base))
        .json(&json!({ "headers": { "messageId": "m" }, "data": "{}" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 503);
}

#[tokio::test]
async fn missing_qinglong_config_is_fatal() {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.qinglong.url = Some("http://127.0.0.1:1".to_string());
    let result = gateway::run_gateway(config).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn relayed_event_is_answered_with_ack_frame() {
    let qinglong = MockQingLong::new(vec![env(1, "FOO", "1"), env(2, "BAR", "2")]);
    let ql_base = qinglong.serve().await;
    let dingtalk = MockDingTalk::new();
    let dt_base = dingtalk.serve().await;

    let mut config = qinglong_config(&ql_base);
    config.gateway.relay_secret = Some("relay-s3cret".to_string());
    config.dingtalk.client_id = Some("app-key".to_string());
    config.dingtalk.client_secret = Some("app-secret".to_string());
    config.dingtalk.api_base = Some(dt_base.clone());
    let (base, health) = start(config).await;
    assert_eq!(health["dingtalk"], true);

    let data = json!({
        "text": { "content": "LIST" },
        "senderStaffId": "staff-1",
        "sessionWebhook": format!("{}/robot/send", dt_base),
    });
    let frame = json!({
        "specVersion": "1.0",
        "type": "CALLBACK",
        "headers": { "messageId": "msg-relay", "topic": "/v1.0/im/bot/messages/get" },
        "data": data.to_string(),
    });
    let client = reqwest::Client::new();

    let forbidden = client
        .post(format!("{}/dingtalk/stream", base))
        .json(&frame)
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);
    assert!(dingtalk.replies().is_empty());

    let resp = client
        .post(format!("{}/dingtalk/stream", base))
        .header(RELAY_SECRET_HEADER, "relay-s3cret")
        .json(&frame)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["code"], 200);
    assert_eq!(ack["message"], "OK");
    assert_eq!(ack["headers"]["messageId"], "msg-relay");
    let payload: Value = serde_json::from_str(ack["data"].as_str().unwrap()).unwrap();
    assert_eq!(payload["errcode"], 0);

    let replies = dingtalk.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].body["markdown"]["text"], "Environment variables:\nFOO\nBAR");

    let bad = client
        .post(format!("{}/dingtalk/stream", base))
        .header(RELAY_SECRET_HEADER, "relay-s3cret")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status().as_u16(), 400);
}
