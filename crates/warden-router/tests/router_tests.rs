//! Integration tests for warden-router
//!
//! - Route resolution and sync/async response semantics
//! - Settings handlers, including export/import integrity
//! - Follow-up path for secondary instances on legacy platforms

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use warden_core::*;
use warden_modules::{
    CapabilityModule, InProcessModule, ModuleOrchestrator, ModuleRegistry, OrchestratorContext,
};
use warden_pipeline::{PipelineInserter, RequestPipeline, TabActivity};
use warden_router::*;
use warden_settings::{ChangeDispatcher, ConfigStore};

#[derive(Default)]
struct RecordingTabs {
    reloaded: Mutex<Vec<i64>>,
}

#[async_trait]
impl TabControl for RecordingTabs {
    async fn reload(&self, tab_id: i64) -> Result<()> {
        self.reloaded.lock().unwrap().push(tab_id);
        Ok(())
    }
}

struct Harness {
    router: MessageRouter,
    tabs: Arc<RecordingTabs>,
    adblocker: Arc<InProcessModule>,
}

fn harness(config: RouterConfig) -> Harness {
    let store = Arc::new(ConfigStore::new(Arc::new(ChangeDispatcher::new())));
    let adblocker = Arc::new(InProcessModule::new(ModuleId::AdBlocker));
    let registry: ModuleRegistry = [
        adblocker.clone() as Arc<dyn CapabilityModule>,
        Arc::new(InProcessModule::new(ModuleId::AntiTracking)) as Arc<dyn CapabilityModule>,
    ]
    .into_iter()
    .collect();
    let orchestrator = ModuleOrchestrator::new(
        Arc::new(OrchestratorContext::new()),
        Arc::new(registry),
        store,
    );
    orchestrator.attach();
    orchestrator.context().mark_running();

    let pipeline = Arc::new(RequestPipeline::new());
    let tabs = Arc::new(RecordingTabs::default());
    let ctx = RouterContext {
        orchestrator,
        activity: Arc::new(TabActivity::new()),
        pipeline: Arc::new(PipelineInserter::new(pipeline.clone(), pipeline)),
        tabs: tabs.clone(),
    };
    Harness {
        router: MessageRouter::new(Arc::new(ctx), config),
        tabs,
        adblocker,
    }
}

fn responder() -> (Option<Responder>, oneshot::Receiver<Reply>) {
    let (tx, rx) = oneshot::channel();
    let respond: Responder = Box::new(move |reply| {
        let _ = tx.send(reply);
    });
    (Some(respond), rx)
}

fn msg(origin: Option<&str>, name: &str, payload: Value) -> InboundMessage {
    InboundMessage::new(origin, name).with_payload(payload)
}

fn store(h: &Harness) -> Arc<ConfigStore> {
    h.router.context().store().clone()
}

// ============================================================
// Dispatch semantics
// ============================================================

#[tokio::test]
async fn process_c2p_is_async_with_callback() {
    let h = harness(RouterConfig::default());
    let (respond, rx) = responder();
    let pending = h.router.dispatch(
        msg(Some("click_to_play"), "processC2P", json!({"action": "always", "app_ids": [1, 2]})),
        SenderContext::tab(9, "https://video.test/"),
        respond,
    );
    assert!(pending);

    let reply = rx.await.unwrap();
    assert!(!reply.is_error());
    assert_eq!(reply.value().unwrap()["reloaded"], json!(true));
    assert_eq!(store(&h).get(SettingKey::ClickToPlayAllowlist).to_json(), json!([1, 2]));
    assert_eq!(*h.tabs.reloaded.lock().unwrap(), vec![9]);
}

#[tokio::test]
async fn process_c2p_without_callback_is_not_pending() {
    let h = harness(RouterConfig::default());
    let pending = h.router.dispatch(
        msg(Some("click_to_play"), "processC2P", json!({"action": "once", "app_ids": [5]})),
        SenderContext::tab(3, "https://video.test/"),
        None,
    );
    assert!(!pending);

    for _ in 0..50 {
        if !h.tabs.reloaded.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(*h.tabs.reloaded.lock().unwrap(), vec![3]);
    assert!(h.router.context().activity.allowed_apps(3).contains(&5));
}

#[tokio::test]
async fn sync_handlers_reply_before_return() {
    let h = harness(RouterConfig::default());
    let (respond, mut rx) = responder();
    let pending = h
        .router
        .dispatch(InboundMessage::new(None, "ping"), SenderContext::default(), respond);
    assert!(!pending);
    assert_eq!(rx.try_recv().unwrap(), Reply::ok(json!("pong")));
}

#[tokio::test]
async fn unhandled_messages_are_ignored() {
    let h = harness(RouterConfig::default());
    let (respond, mut rx) = responder();
    let pending = h.router.dispatch(
        InboundMessage::new(Some("panel"), "selfDestruct"),
        SenderContext::default(),
        respond,
    );
    assert!(!pending);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn malformed_payload_gets_error_reply() {
    let h = harness(RouterConfig::default());
    let (respond, rx) = responder();
    h.router.dispatch(
        msg(Some("click_to_play"), "processC2P", json!({"action": "sometimes"})),
        SenderContext::tab(1, "https://a.test/"),
        respond,
    );
    assert!(rx.await.unwrap().is_error());
}

// ============================================================
// Settings handlers
// ============================================================

#[tokio::test]
async fn export_import_round_trip() {
    let source = harness(RouterConfig::default());
    store(&source).set(SettingKey::EnableHumanWeb, true).unwrap();
    store(&source).set(SettingKey::SiteAllowlist, json!(["example.com"])).unwrap();

    let (respond, mut rx) = responder();
    source.router.dispatch(
        InboundMessage::new(Some("panel"), "exportSettings"),
        SenderContext::default(),
        respond,
    );
    let exported = rx.try_recv().unwrap().value().cloned().unwrap();

    let target = harness(RouterConfig::default());
    let (respond, mut rx) = responder();
    target.router.dispatch(
        msg(Some("panel"), "importSettings", exported),
        SenderContext::default(),
        respond,
    );
    assert!(!rx.try_recv().unwrap().is_error());
    assert_eq!(
        store(&target).watched_snapshot(),
        store(&source).watched_snapshot()
    );
}

#[tokio::test]
async fn corrupted_import_is_rejected() {
    let source = harness(RouterConfig::default());
    store(&source).set(SettingKey::EnableMetrics, true).unwrap();
    let (respond, mut rx) = responder();
    source.router.dispatch(
        InboundMessage::new(Some("panel"), "exportSettings"),
        SenderContext::default(),
        respond,
    );
    let mut exported = rx.try_recv().unwrap().value().cloned().unwrap();
    exported["hash"] = json!("AAAA");

    let target = harness(RouterConfig::default());
    let before = store(&target).snapshot();
    let (respond, mut rx) = responder();
    target.router.dispatch(
        msg(Some("panel"), "importSettings", exported),
        SenderContext::default(),
        respond,
    );
    assert!(rx.try_recv().unwrap().is_error());
    assert_eq!(store(&target).snapshot(), before);
}

#[tokio::test]
async fn set_panel_data_is_all_or_nothing() {
    let h = harness(RouterConfig::default());
    let (respond, mut rx) = responder();
    h.router.dispatch(
        msg(Some("panel"), "setPanelData", json!({"show_alert": false, "no_such_key": 1})),
        SenderContext::default(),
        respond,
    );
    assert!(rx.try_recv().unwrap().is_error());
    assert!(store(&h).get_bool(SettingKey::ShowAlert));

    let (respond, mut rx) = responder();
    h.router.dispatch(
        msg(Some("panel"), "setPanelData", json!({"show_alert": false, "language": "de"})),
        SenderContext::default(),
        respond,
    );
    assert_eq!(rx.try_recv().unwrap(), Reply::ok(json!({"updated": 2})));
    assert!(!store(&h).get_bool(SettingKey::ShowAlert));
}

#[tokio::test]
async fn set_module_enabled_drives_the_module() {
    let h = harness(RouterConfig::default());
    h.router.dispatch(
        msg(None, "setModuleEnabled", json!({"module": "adblocker", "enabled": true})),
        SenderContext::default(),
        None,
    );
    for _ in 0..50 {
        if h.adblocker.is_enabled() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(h.adblocker.is_enabled());
    assert_eq!(h.adblocker.enable_calls(), 1);
}

#[tokio::test]
async fn overlay_and_status_queries() {
    let h = harness(RouterConfig::default());
    let (respond, mut rx) = responder();
    h.router.dispatch(
        msg(Some("page_overlay"), "updateAlertConf", json!({"alert_expanded": true})),
        SenderContext::tab(2, "https://a.test/"),
        respond,
    );
    assert_eq!(
        rx.try_recv().unwrap(),
        Reply::ok(json!({"show_alert": true, "alert_expanded": true}))
    );

    let (respond, mut rx) = responder();
    h.router.dispatch(
        InboundMessage::new(None, "getPipelineStatus"),
        SenderContext::default(),
        respond,
    );
    assert_eq!(rx.try_recv().unwrap(), Reply::ok(json!({"state": "pending"})));
}

#[tokio::test]
async fn tab_closed_releases_once_grants() {
    let h = harness(RouterConfig::default());
    let activity = h.router.context().activity.clone();
    activity.allow_once(6, [40]);
    assert_eq!(activity.tracked_tabs(), 1);

    let (respond, mut rx) = responder();
    h.router.dispatch(
        InboundMessage::new(None, "tabClosed"),
        SenderContext::tab(6, "https://a.test/"),
        respond,
    );
    assert_eq!(rx.try_recv().unwrap(), Reply::ok(json!({"tab_id": 6, "released": true})));
    assert!(activity.allowed_apps(6).is_empty());
    assert_eq!(activity.tracked_tabs(), 0);

    let (respond, mut rx) = responder();
    h.router.dispatch(
        msg(None, "tabClosed", json!({"tab_id": 6})),
        SenderContext::default(),
        respond,
    );
    assert_eq!(rx.try_recv().unwrap(), Reply::ok(json!({"tab_id": 6, "released": false})));

    let (respond, mut rx) = responder();
    h.router.dispatch(InboundMessage::new(None, "tabClosed"), SenderContext::default(), respond);
    assert!(rx.try_recv().unwrap().is_error());
}

#[tokio::test]
async fn panel_data_collects_state() {
    let h = harness(RouterConfig::default());
    h.adblocker.enable().await.unwrap();
    let (respond, rx) = responder();
    assert!(h.router.dispatch(
        InboundMessage::new(Some("panel"), "getPanelData"),
        SenderContext::default(),
        respond,
    ));
    let data = rx.await.unwrap().value().cloned().unwrap();
    assert_eq!(data["modules"]["adblocker"], json!("enabled"));
    assert_eq!(data["modules"]["antitracking"], json!("disabled"));
    assert_eq!(data["pipeline"]["state"], json!("pending"));
    assert_eq!(data["antitracking"], Value::Null);
}

// ============================================================
// Follow-up path
// ============================================================

fn secondary(tab_id: Option<i64>) -> SenderContext {
    SenderContext {
        tab_id,
        tab_url: None,
        secondary_instance: true,
    }
}

#[tokio::test]
async fn legacy_secondary_sender_gets_follow_up() {
    let (queue, mut outbound) = OutboundQueue::new();
    let mut h = harness(RouterConfig { legacy_platform: true });
    h.router = h.router.with_follow_ups(Arc::new(queue));

    let (respond, mut direct) = responder();
    let pending = h.router.dispatch(
        InboundMessage::new(Some("click_to_play"), "processC2P")
            .with_payload(json!({"action": "once", "app_ids": [4]}))
            .with_message_id("m-1"),
        secondary(Some(12)),
        respond,
    );
    assert!(!pending);

    let follow_up = outbound.recv().await.unwrap();
    assert_eq!(follow_up.destination, Destination::Tab(12));
    assert_eq!(follow_up.message_id, "m-1");
    assert_eq!(follow_up.name, "processC2P");
    assert!(!follow_up.reply.is_error());
    assert!(direct.try_recv().is_err());
}

#[tokio::test]
async fn follow_up_without_tab_goes_to_panel() {
    let (queue, mut outbound) = OutboundQueue::new();
    let h = harness(RouterConfig { legacy_platform: true });
    let router = h.router.with_follow_ups(Arc::new(queue));

    router.dispatch(
        InboundMessage::new(None, "ping").with_message_id("m-2"),
        secondary(None),
        None,
    );
    let follow_up = outbound.try_recv().unwrap();
    assert_eq!(follow_up.destination, Destination::Panel);
    assert_eq!(follow_up.reply, Reply::ok(json!("pong")));
}

#[tokio::test]
async fn callback_used_without_message_id_or_off_legacy() {
    let (queue, mut outbound) = OutboundQueue::new();
    let h = harness(RouterConfig { legacy_platform: true });
    let router = h.router.with_follow_ups(Arc::new(queue));
    let (respond, mut rx) = responder();
    router.dispatch(InboundMessage::new(None, "ping"), secondary(Some(1)), respond);
    assert!(rx.try_recv().is_ok());

    let (queue, mut modern_outbound) = OutboundQueue::new();
    let h = harness(RouterConfig::default());
    let router = h.router.with_follow_ups(Arc::new(queue));
    let (respond, mut rx) = responder();
    router.dispatch(
        InboundMessage::new(None, "ping").with_message_id("m-3"),
        secondary(Some(1)),
        respond,
    );
    assert!(rx.try_recv().is_ok());
    assert!(outbound.try_recv().is_err());
    assert!(modern_outbound.try_recv().is_err());
}
