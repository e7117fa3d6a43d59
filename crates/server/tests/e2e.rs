use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{routing::post, Json, Router};
use reqwest::StatusCode as HttpStatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use service::actions::{ActionRegistry, WebhookAction};
use service::dispatcher::DispatchOptions;
use service::storage::MemoryBackend;
use service::StateStore;

struct TestApp {
    base_url: String,
    store: Arc<StateStore>,
    hooks: Arc<Mutex<Vec<Value>>>,
}

async fn bind() -> anyhow::Result<(TcpListener, String)> {
    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    Ok((listener, format!("http://{}:{}", addr.ip(), addr.port())))
}

/// Receiver standing in for the host's action endpoints; records every body it gets.
async fn start_hook_receiver() -> anyhow::Result<(String, Arc<Mutex<Vec<Value>>>)> {
    let hooks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&hooks);
    let app = Router::new().route(
        "/hooks/:name",
        post(move |Json(body): Json<Value>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(body);
                Json(json!({ "ok": true }))
            }
        }),
    );
    let (listener, base_url) = bind().await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await { eprintln!("hook receiver error: {}", e); }
    });
    Ok((base_url, hooks))
}

async fn start_server() -> anyhow::Result<TestApp> {
    let (hook_url, hooks) = start_hook_receiver().await?;

    let registry = Arc::new(ActionRegistry::new());
    let client = reqwest::Client::new();
    for name in ["highlight.jump", "panel.refresh"] {
        let action = WebhookAction::new(name, &format!("{hook_url}/hooks/{name}"), client.clone())?;
        registry.register(name, action).await;
    }

    let store = StateStore::start(
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryBackend::new()),
        registry,
        DispatchOptions::default(),
    )
    .await;

    let app = server::startup::build_app(Arc::clone(&store));
    let (listener, base_url) = bind().await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await { eprintln!("server error: {}", e); }
    });

    Ok(TestApp { base_url, store, hooks })
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn e2e_public_health() -> anyhow::Result<()> {
    let app = start_server().await?;
    let res = client().get(format!("{}/health", app.base_url)).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({ "status": "ok" }));
    Ok(())
}

#[tokio::test]
async fn e2e_set_and_get_state() -> anyhow::Result<()> {
    let app = start_server().await?;
    let c = client();

    let res = c.get(format!("{}/state/verseRef", app.base_url)).send().await?;
    assert_eq!(res.status(), HttpStatusCode::NOT_FOUND);

    let res = c
        .put(format!("{}/state/verseRef", app.base_url))
        .json(&json!({ "value": "GEN.1.1" }))
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::OK);

    let res = c.get(format!("{}/state/verseRef", app.base_url)).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({ "key": "verseRef", "value": "GEN.1.1" }));

    // updateStoreState body shape
    let res = c
        .post(format!("{}/state", app.base_url))
        .json(&json!({ "key": "layout", "value": { "panels": ["left", "right"] } }))
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    assert_eq!(app.store.get("layout").await?, Some(json!({ "panels": ["left", "right"] })));
    Ok(())
}

#[tokio::test]
async fn e2e_missing_arguments_are_rejected() -> anyhow::Result<()> {
    let app = start_server().await?;
    let c = client();

    let res = c.put(format!("{}/state/k", app.base_url)).json(&json!({})).send().await?;
    assert_eq!(res.status(), HttpStatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Operation cancelled. Value was missing.");

    let res = c.post(format!("{}/state", app.base_url)).json(&json!({ "value": 1 })).send().await?;
    assert_eq!(res.status(), HttpStatusCode::BAD_REQUEST);

    let res = c.post(format!("{}/listeners/k", app.base_url)).json(&json!({})).send().await?;
    assert_eq!(res.status(), HttpStatusCode::BAD_REQUEST);

    assert_eq!(app.store.get("k").await?, None);
    assert!(app.store.listeners("k").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn e2e_listeners_fire_webhooks_in_order() -> anyhow::Result<()> {
    let app = start_server().await?;
    let c = client();

    for cb in ["highlight.jump", "panel.refresh"] {
        let res = c
            .post(format!("{}/listeners/verseRef", app.base_url))
            .json(&json!({ "callback": cb }))
            .send()
            .await?;
        assert_eq!(res.status(), HttpStatusCode::CREATED);
    }
    let res = c.get(format!("{}/listeners/verseRef", app.base_url)).send().await?;
    let body: Value = res.json().await?;
    assert_eq!(body["listeners"], json!(["highlight.jump", "panel.refresh"]));

    let res = c
        .put(format!("{}/state/verseRef", app.base_url))
        .json(&json!({ "value": "GEN.1.1" }))
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::OK);

    // dispatch completes before the write returns
    let hooks = app.hooks.lock().unwrap().clone();
    assert_eq!(
        hooks,
        vec![
            json!({ "action": "highlight.jump", "key": "verseRef", "value": "GEN.1.1" }),
            json!({ "action": "panel.refresh", "key": "verseRef", "value": "GEN.1.1" }),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn e2e_unknown_callback_does_not_fail_the_write() -> anyhow::Result<()> {
    let app = start_server().await?;
    let c = client();

    c.post(format!("{}/listeners/k", app.base_url)).json(&json!({ "callback": "not.configured" })).send().await?;
    c.post(format!("{}/listeners/k", app.base_url)).json(&json!({ "callback": "panel.refresh" })).send().await?;

    let res = c.put(format!("{}/state/k", app.base_url)).json(&json!({ "value": 7 })).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let hooks = app.hooks.lock().unwrap().clone();
    assert_eq!(hooks, vec![json!({ "action": "panel.refresh", "key": "k", "value": 7 })]);
    Ok(())
}

#[tokio::test]
async fn e2e_metrics_exposed() -> anyhow::Result<()> {
    let app = start_server().await?;
    let res = client().get(format!("{}/metrics", app.base_url)).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let text = res.text().await?;
    assert!(text.contains("state_store_change_events_total"));
    Ok(())
}
