mod common;

use std::sync::Arc;

use common::{config, url, ScriptedFetcher, StickyStorage};
use swcache_agent::{
    ActivateReport, AgentError, AgentEvent, AgentState, CacheStorage, CacheVersion, ControlMessage,
    FetchDisposition, LifecycleController, MemoryStorage,
};
use swcache_net::Request;
use tokio::sync::{mpsc, oneshot};

fn drain(events: &mut mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn states(events: &[AgentEvent]) -> Vec<AgentState> {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::StateChange { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_install_activates_after_successful_precache() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::serving_manifest();
    let (agent, mut events) =
        LifecycleController::new(&config("v1"), storage.clone(), fetcher).unwrap();
    assert_eq!(agent.state().await, AgentState::Parsed);

    let report = agent.install().await.unwrap();

    assert_eq!(report.stored, Some(4));
    assert!(report.failed.is_empty());
    assert!(report.activated);
    assert_eq!(agent.state().await, AgentState::Activated);
    assert_eq!(
        states(&drain(&mut events)),
        vec![
            AgentState::Installing,
            AgentState::Installed,
            AgentState::Activating,
            AgentState::Activated,
        ]
    );
}

#[tokio::test]
async fn test_activation_deletes_other_versions() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::serving_manifest();

    let (old, _) = LifecycleController::new(&config("v1"), storage.clone(), fetcher.clone()).unwrap();
    old.install().await.unwrap();
    assert_eq!(storage.keys().await.unwrap(), vec!["v1".to_string()]);

    let (new, mut events) =
        LifecycleController::new(&config("v2"), storage.clone(), fetcher).unwrap();
    new.install().await.unwrap();

    assert_eq!(storage.keys().await.unwrap(), vec!["v2".to_string()]);
    assert_eq!(storage.entries("v2").await.unwrap().len(), 4);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, AgentEvent::CacheDeleted { name } if name == "v1")));
}

#[tokio::test]
async fn test_activation_survives_delete_failures() {
    let storage = Arc::new(StickyStorage::default());
    storage.open("v0").await.unwrap();
    let fetcher = ScriptedFetcher::serving_manifest();
    let (agent, _) = LifecycleController::new(&config("v1"), storage.clone(), fetcher).unwrap();

    let report = agent.install().await.unwrap();

    assert!(report.activated);
    assert_eq!(agent.state().await, AgentState::Activated);
    assert!(storage.has("v0").await.unwrap());
}

#[tokio::test]
async fn test_activation_claims_open_clients() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::serving_manifest();
    let (agent, mut events) =
        LifecycleController::new(&config("v1"), storage, fetcher).unwrap();

    let page = agent.client_opened(url("./")).await;
    assert!(page.controller.is_none());

    agent.install().await.unwrap();

    let controlled = agent.controlled_clients().await;
    assert_eq!(controlled.len(), 1);
    assert_eq!(controlled[0].id, page.id);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, AgentEvent::ControllerChange { client_id } if *client_id == page.id)));

    // Pages opened later are controlled straight away.
    let later = agent.client_opened(url("./about.html")).await;
    assert_eq!(later.controller, Some(CacheVersion::from("v1")));
}

#[tokio::test]
async fn test_failed_precache_waits_for_old_clients() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::serving_manifest();
    fetcher.fail(url("./index.html").as_str());
    let (agent, _) = LifecycleController::new(&config("v2"), storage, fetcher).unwrap();
    let old_page = agent
        .adopt_client(url("./"), CacheVersion::from("v1"))
        .await;

    let report = agent.install().await.unwrap();

    assert_eq!(report.stored, None);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.activated);
    assert_eq!(agent.state().await, AgentState::Installed);

    // Closing the last old page lets the waiting version take over.
    agent.client_closed(&old_page.id).await.unwrap();
    assert_eq!(agent.state().await, AgentState::Activated);
}

#[tokio::test]
async fn test_failed_precache_without_old_clients_activates() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::serving_manifest();
    fetcher.fail(url("./index.html").as_str());
    let (agent, _) = LifecycleController::new(&config("v1"), storage, fetcher).unwrap();

    let report = agent.install().await.unwrap();

    assert!(!report.failed.is_empty());
    assert!(report.activated);
}

#[tokio::test]
async fn test_install_can_be_retried_while_waiting() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::serving_manifest();
    let index = url("./index.html");
    fetcher.fail(index.as_str());
    let (agent, _) = LifecycleController::new(&config("v2"), storage.clone(), fetcher.clone()).unwrap();
    agent.adopt_client(url("./"), CacheVersion::from("v1")).await;

    assert!(!agent.install().await.unwrap().activated);

    fetcher.respond(index.as_str(), 200, "<html>index</html>");
    let report = agent.install().await.unwrap();

    assert_eq!(report.stored, Some(4));
    assert!(report.activated);
    assert_eq!(storage.entries("v2").await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_install_rejected_once_active() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::serving_manifest();
    let (agent, _) = LifecycleController::new(&config("v1"), storage, fetcher).unwrap();
    agent.install().await.unwrap();

    assert!(matches!(agent.install().await, Err(AgentError::State(_))));
    // Activating again is a no-op.
    assert_eq!(agent.activate().await.unwrap(), ActivateReport::default());
}

#[tokio::test]
async fn test_skip_waiting_message_activates_waiting_version() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::serving_manifest();
    fetcher.fail(url("./products.json").as_str());
    let (agent, _) = LifecycleController::new(&config("v2"), storage.clone(), fetcher).unwrap();
    let old_page = agent
        .adopt_client(url("./"), CacheVersion::from("v1"))
        .await;
    storage.open("v1").await.unwrap();

    agent.install().await.unwrap();
    assert_eq!(agent.state().await, AgentState::Installed);
    assert!(matches!(
        agent.handle_fetch(&Request::get(url("./index.html"))).await.unwrap(),
        FetchDisposition::Passthrough
    ));

    agent
        .handle_message_json(r#"{"type":"SKIP_WAITING"}"#, None)
        .await
        .unwrap();

    assert_eq!(agent.state().await, AgentState::Activated);
    assert!(!storage.has("v1").await.unwrap());
    let controlled = agent.controlled_clients().await;
    assert_eq!(controlled.len(), 1);
    assert_eq!(controlled[0].id, old_page.id);
}

#[tokio::test]
async fn test_skip_waiting_before_install_is_remembered() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::serving_manifest();
    fetcher.fail(url("./").as_str());
    let (agent, _) = LifecycleController::new(&config("v2"), storage, fetcher).unwrap();
    agent.adopt_client(url("./"), CacheVersion::from("v1")).await;

    agent.handle_message(ControlMessage::SkipWaiting, None).await.unwrap();
    assert_eq!(agent.state().await, AgentState::Parsed);

    assert!(agent.install().await.unwrap().activated);
}

#[tokio::test]
async fn test_get_version_replies_on_port() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::new();
    let (agent, _) =
        LifecycleController::new(&config("Boikot!-v3"), storage, fetcher.clone()).unwrap();

    let (tx, rx) = oneshot::channel();
    agent
        .handle_message_json(r#"{"type":"GET_VERSION"}"#, Some(tx))
        .await
        .unwrap();
    assert_eq!(rx.await.unwrap().version, "Boikot!-v3");

    // Answered in any state, without touching the network.
    assert_eq!(agent.state().await, AgentState::Parsed);
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_unknown_and_malformed_messages() {
    let storage = Arc::new(MemoryStorage::new());
    let (agent, _) =
        LifecycleController::new(&config("v1"), storage, ScriptedFetcher::new()).unwrap();

    agent
        .handle_message_json(r#"{"type":"CLEAR_CACHE"}"#, None)
        .await
        .unwrap();
    assert_eq!(agent.state().await, AgentState::Parsed);

    assert!(matches!(
        agent.handle_message_json("{not json", None).await,
        Err(AgentError::Serialization(_))
    ));

    // GET_VERSION without a port is dropped quietly.
    agent
        .handle_message(ControlMessage::GetVersion, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_push_requests_notification() {
    let storage = Arc::new(MemoryStorage::new());
    let (agent, mut events) =
        LifecycleController::new(&config("v1"), storage, ScriptedFetcher::new()).unwrap();

    let shown = agent.handle_push(Some("Flash sale"));
    assert_eq!(shown.body, "Flash sale");
    assert_eq!(shown.actions.len(), 2);

    let fallback = agent.handle_push(None);
    assert_eq!(fallback.body, config("v1").notification.default_body);

    let notifications: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            AgentEvent::ShowNotification(n) => Some(n),
            _ => None,
        })
        .collect();
    assert_eq!(notifications, vec![shown, fallback]);
}

#[tokio::test]
async fn test_notification_click_opens_root() {
    let storage = Arc::new(MemoryStorage::new());
    let mut cfg = config("v1");
    cfg.scope = "https://app.example/shop/".to_string();
    let (agent, mut events) =
        LifecycleController::new(&cfg, storage, ScriptedFetcher::new()).unwrap();

    let client = agent.handle_notification_click().await;

    assert_eq!(client.url.as_str(), "https://app.example/");
    assert!(client.focused);
    assert!(drain(&mut events).iter().any(
        |e| matches!(e, AgentEvent::OpenWindow { client_id, url } if *client_id == client.id && url.path() == "/")
    ));
}

#[tokio::test]
async fn test_sync_tags() {
    let storage = Arc::new(MemoryStorage::new());
    let (agent, _) =
        LifecycleController::new(&config("v1"), storage, ScriptedFetcher::new()).unwrap();

    assert!(agent.handle_sync("background-sync"));
    assert!(!agent.handle_sync("outbox"));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let storage = Arc::new(MemoryStorage::new());
    let mut cfg = config("v1");
    cfg.cache_version = String::new();

    assert!(LifecycleController::new(&cfg, storage, ScriptedFetcher::new()).is_err());
}
