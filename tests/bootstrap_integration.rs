//! Integration tests: full startup sequence and the JSON-lines transport.
//!
//! These tests boot the runtime with in-process modules and the in-memory
//! pipeline, then drive it the way the binary does.

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use warden::bootstrap::{boot, Collaborators};
use warden::config::WardenConfig;
use warden::scheduler::{RemoteRefresh, ScheduledTask};
use warden::stdio::serve;
use warden_core::{Error, ModuleId, SettingKey};
use warden_modules::ModuleAction;
use warden_pipeline::{
    DirectListeners, PipelineStatus, RequestPipeline, RequestState, Stage, OWNER,
};
use warden_router::OutboundQueue;
use warden_settings::{ChangeDispatcher, ConfigStore};

fn config_with(settings: Value) -> WardenConfig {
    let mut config = WardenConfig::default();
    if let Value::Object(map) = settings {
        config.settings = map.into_iter().collect();
    }
    config
}

async fn run_lines(router: &warden_router::MessageRouter, input: &str) -> Vec<Value> {
    let (client, server) = tokio::io::duplex(1 << 16);
    serve(router, input.as_bytes(), server, None, CancellationToken::new())
        .await
        .unwrap();
    read_lines(client).await
}

async fn read_lines(mut client: tokio::io::DuplexStream) -> Vec<Value> {
    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    out.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
}

// ============================================================
// Startup sequence
// ============================================================

#[tokio::test]
async fn boot_starts_configured_modules_and_pipelines() {
    let config = config_with(json!({ "enable_ad_block": false, "enable_human_web": true }));
    let (collaborators, pipeline) = Collaborators::in_process(&config);
    let runtime = boot(&config, collaborators).await.unwrap();

    assert_eq!(runtime.report.settings_loaded, 2);
    assert_eq!(runtime.report.modules_started, 2);
    assert_eq!(runtime.report.pipeline, PipelineStatus::Pipelined);
    assert!(runtime.report.reconcile.failed.is_empty());
    assert!(!runtime.orchestrator.context().is_loading());

    let states = runtime.orchestrator.states();
    assert_eq!(states[&ModuleId::HumanWeb], warden_modules::ModuleState::Enabled);
    assert_eq!(states[&ModuleId::AdBlocker], warden_modules::ModuleState::Disabled);

    assert_eq!(pipeline.step_names(Stage::PreSend), vec!["warden.onBeforeRequest"]);
    assert!(!pipeline.has_listener(Stage::PreSend, OWNER));
}

#[tokio::test]
async fn boot_survives_unavailable_pipeline() {
    let config = WardenConfig::default();
    let (mut collaborators, _) = Collaborators::in_process(&config);
    let degraded = Arc::new(RequestPipeline::unavailable());
    collaborators.facility = degraded.clone();
    collaborators.listeners = degraded.clone();
    collaborators.blocker = Some(Arc::new(|state: &RequestState, _: &BTreeSet<u64>| {
        state.host == "ads.test"
    }));

    let runtime = boot(&config, collaborators).await.unwrap();
    assert!(matches!(runtime.report.pipeline, PipelineStatus::Degraded(_)));
    assert!(degraded.has_listener(Stage::PreSend, OWNER));

    let response = degraded.run_pre_send(&mut RequestState::new(Some(1), "https://ads.test/x.js"));
    assert!(response.cancel);
    assert_eq!(runtime.activity.summary(1).unwrap().blocked, 1);
}

#[tokio::test(start_paused = true)]
async fn allowlist_reaches_modules_and_interceptor() {
    let config = WardenConfig::default();
    let (collaborators, pipeline) = Collaborators::in_process(&config);
    let runtime = boot(&config, collaborators).await.unwrap();

    runtime
        .store
        .set(SettingKey::SiteAllowlist, json!(["trusted.test"]))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(runtime.allowlist.contains("cdn.trusted.test"));

    let module = runtime
        .orchestrator
        .registry()
        .get(ModuleId::AntiTracking)
        .unwrap();
    let allowed = module
        .action(ModuleAction::IsAllowlisted { host: "www.trusted.test".into() })
        .await
        .unwrap();
    assert_eq!(allowed, Value::Bool(true));

    let response = pipeline.run_pre_send(&mut RequestState::new(Some(2), "https://trusted.test/"));
    assert!(response.is_empty());
}

// ============================================================
// JSON-lines transport
// ============================================================

#[tokio::test]
async fn serve_replies_per_line() {
    let config = WardenConfig::default();
    let (collaborators, _) = Collaborators::in_process(&config);
    let runtime = boot(&config, collaborators).await.unwrap();

    let input = [
        r#"{"name":"ping","messageId":"a"}"#,
        "not json",
        "",
        r#"{"origin":"panel","name":"getModuleStates","messageId":"b"}"#,
        r#"{"origin":"click_to_play","name":"processC2P","message":{"action":"always","app_ids":[7]},"messageId":"c","sender":{"tabId":3}}"#,
        r#"{"origin":"panel","name":"noSuchThing"}"#,
    ]
    .join("\n");
    let lines = run_lines(&runtime.router, &input).await;

    assert_eq!(lines.len(), 4);
    let by_id = |id: &str| {
        lines
            .iter()
            .find(|l| l["messageId"] == json!(id))
            .cloned()
            .unwrap()
    };
    assert_eq!(by_id("a")["reply"], json!({"type": "ok", "data": "pong"}));
    assert_eq!(by_id("b")["reply"]["data"]["antitracking"], json!("enabled"));
    assert_eq!(by_id("c")["reply"]["data"]["app_ids"], json!([7]));
    assert!(lines
        .iter()
        .any(|l| l["reply"]["type"] == json!("error") && l.get("messageId").is_none()));
    assert_eq!(
        runtime.store.get(SettingKey::ClickToPlayAllowlist).to_json(),
        json!([7])
    );
}

#[tokio::test]
async fn serve_emits_follow_ups_for_secondary_instances() {
    let mut config = WardenConfig::default();
    config.router.legacy_platform = true;
    let (queue, follow_ups) = OutboundQueue::new();
    let (mut collaborators, _) = Collaborators::in_process(&config);
    collaborators.follow_ups = Some(Arc::new(queue));
    let runtime = boot(&config, collaborators).await.unwrap();

    let input = r#"{"name":"ping","messageId":"f-1","sender":{"tabId":8,"secondaryInstance":true}}"#;
    let (client, server) = tokio::io::duplex(1 << 16);
    serve(
        &runtime.router,
        input.as_bytes(),
        server,
        Some(follow_ups),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let lines = read_lines(client).await;

    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["kind"], json!("followUp"));
    assert_eq!(lines[0]["destination"], json!({"tab": 8}));
    assert_eq!(lines[0]["messageId"], json!("f-1"));
}

#[tokio::test]
async fn serve_stops_on_shutdown() {
    let config = WardenConfig::default();
    let (collaborators, _) = Collaborators::in_process(&config);
    let runtime = boot(&config, collaborators).await.unwrap();

    let (_input_writer, input_reader) = tokio::io::duplex(1024);
    let (_client, server) = tokio::io::duplex(1024);
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let stats = serve(
        &runtime.router,
        tokio::io::BufReader::new(input_reader),
        server,
        None,
        shutdown,
    )
    .await
    .unwrap();
    assert_eq!(stats.received, 0);
}

// ============================================================
// Remote refresh
// ============================================================

async fn one_shot_http(body: &'static str, status: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; 4096];
        let _ = socket.read(&mut request).await;
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{}/config.json", addr)
}

#[tokio::test]
async fn remote_refresh_stores_fetched_document() {
    let url = one_shot_http(r#"{"experiment":"b"}"#, "200 OK").await;
    let store = Arc::new(ConfigStore::new(Arc::new(ChangeDispatcher::new())));
    let task = RemoteRefresh::new(
        "ab-tests",
        url,
        SettingKey::AbTestConfig,
        reqwest::Client::new(),
        store.clone(),
    );
    task.run().await.unwrap();
    assert_eq!(
        store.get(SettingKey::AbTestConfig).to_json(),
        json!({"experiment": "b"})
    );
}

#[tokio::test]
async fn remote_refresh_failure_leaves_store() {
    let url = one_shot_http("oops", "503 Service Unavailable").await;
    let store = Arc::new(ConfigStore::new(Arc::new(ChangeDispatcher::new())));
    let task = RemoteRefresh::new("cmp", url, SettingKey::CmpData, reqwest::Client::new(), store.clone());

    let err = task.run().await.unwrap_err();
    assert!(matches!(err, Error::ScheduledTask { .. }));
    assert!(!store.is_set(SettingKey::CmpData));
}

#[tokio::test]
async fn remote_refresh_gives_up_on_silent_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/config.json", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let store = Arc::new(ConfigStore::new(Arc::new(ChangeDispatcher::new())));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let task = RemoteRefresh::new("library", url, SettingKey::LibraryManifest, client, store.clone());

    let outcome = tokio::time::timeout(Duration::from_secs(5), task.run()).await;
    let err = outcome.expect("request timeout should end the run").unwrap_err();
    assert!(matches!(err, Error::ScheduledTask { .. }));
    assert!(!store.is_set(SettingKey::LibraryManifest));
}
