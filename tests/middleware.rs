use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    middleware,
    routing::get,
};
use http_body_util::BodyExt;
use httpmock::MockServer;
use prerender_gate::{
    application::{BackendRegistry, RenderBackend, error::ErrorReport},
    cache::{CachingBackend, MemoryStore, StoreRegistry},
    config::SharedSettings,
    infra::{
        http::{PrerenderState, UserAgentPolicy, log_failures, prerender_layer},
        prerender::{PrerenderHosted, PrerenderIo, PrerenderOptions},
    },
};
use tower::ServiceExt;

const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

struct App {
    router: Router,
    calls: Arc<AtomicUsize>,
}

fn app_with(backend: Arc<dyn RenderBackend>, settings: SharedSettings) -> App {
    let calls = Arc::new(AtomicUsize::new(0));
    let state = PrerenderState::with_backend(backend, Arc::new(UserAgentPolicy::new(settings)));

    let handler_calls = Arc::clone(&calls);
    let router = Router::new()
        .fallback(move || {
            let calls = Arc::clone(&handler_calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "from the application"
            }
        })
        .layer(middleware::from_fn_with_state(state, prerender_layer))
        .layer(middleware::from_fn(log_failures));

    App { router, calls }
}

fn hosted(server: &MockServer) -> Arc<dyn RenderBackend> {
    let options = PrerenderOptions::new(server.url("/render/"), server.url("/update/"));
    Arc::new(PrerenderHosted::new(options).expect("hosted backend"))
}

async fn send(router: &Router, uri: &str, user_agent: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .uri(uri)
        .header(header::HOST, "testserver")
        .header(header::USER_AGENT, user_agent)
        .body(Body::empty())
        .expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

fn defaults() -> SharedSettings {
    SharedSettings::defaults().expect("default settings")
}

#[tokio::test]
async fn crawler_receives_rendered_snapshot() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET").path("/render/http://testserver/app");
            then.status(200)
                .header("content-type", "text/html")
                .body("<h1>Hello there.</h1>");
        })
        .await;
    let app = app_with(hosted(&server), defaults());

    let (status, body) = send(&app.router, "/app", GOOGLEBOT).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<h1>Hello there.</h1>");
    assert_eq!(app.calls.load(Ordering::SeqCst), 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn crawler_asset_request_passes_through() {
    let server = MockServer::start_async().await;
    let app = app_with(hosted(&server), defaults());

    let (status, body) = send(&app.router, "/static/app.css", GOOGLEBOT).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "from the application");
    assert_eq!(app.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn browsers_pass_through() {
    let server = MockServer::start_async().await;
    let app = app_with(hosted(&server), defaults());

    let (status, body) = send(&app.router, "/app", FIREFOX).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "from the application");
    assert_eq!(app.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disabling_at_runtime_stops_interception() {
    let server = MockServer::start_async().await;
    let settings = defaults();
    let app = app_with(hosted(&server), settings.clone());

    settings
        .apply(&prerender_gate::config::SettingChange::set(
            "ssr_enabled",
            serde_json::json!(false),
        ))
        .expect("apply");

    let (_, body) = send(&app.router, "/app", GOOGLEBOT).await;
    assert_eq!(body, "from the application");
}

#[tokio::test]
async fn saas_backend_sends_token_through_the_middleware() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/render/http://testserver/app")
                .header("x-prerender-token", "abc");
            then.status(200).body("rendered with token");
        })
        .await;
    let options = PrerenderOptions::new(server.url("/render/"), server.url("/update/"));
    let backend = Arc::new(PrerenderIo::new("abc", options).expect("saas backend"));
    let app = app_with(backend, defaults());

    let (status, body) = send(&app.router, "/app", GOOGLEBOT).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "rendered with token");
    mock.assert_async().await;
}

#[tokio::test]
async fn render_service_failure_is_a_bad_gateway() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET").path("/render/http://testserver/app");
            then.status(503);
        })
        .await;
    let app = app_with(hosted(&server), defaults());

    let request = Request::builder()
        .uri("/app")
        .header(header::HOST, "testserver")
        .header(header::USER_AGENT, GOOGLEBOT)
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    // consumed by the logging layer
    assert!(response.extensions().get::<ErrorReport>().is_none());
    assert_eq!(app.calls.load(Ordering::SeqCst), 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn cached_snapshot_is_served_without_calling_the_service() {
    let server = MockServer::start_async().await;
    let mut mock = server
        .mock_async(|when, then| {
            when.method("GET").path("/render/http://testserver/app");
            then.status(200).body("cached snapshot");
        })
        .await;
    let store = Arc::new(MemoryStore::new(NonZeroUsize::new(8).expect("non-zero")));
    let backend = Arc::new(CachingBackend::new(
        hosted(&server),
        store,
        "test",
        Duration::from_secs(60),
    ));
    let app = app_with(backend, defaults());

    let (_, body) = send(&app.router, "/app", GOOGLEBOT).await;
    assert_eq!(body, "cached snapshot");
    mock.assert_async().await;

    // the service no longer knows the page; only the cache can answer
    mock.delete_async().await;
    for _ in 0..2 {
        let (status, body) = send(&app.router, "/app", GOOGLEBOT).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "cached snapshot");
    }
}

#[tokio::test]
async fn route_layer_limits_interception_to_selected_routes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/render/http://testserver/landing");
            then.status(200).body("rendered landing");
        })
        .await;
    let settings = defaults();
    let state = PrerenderState::with_backend(
        hosted(&server),
        Arc::new(UserAgentPolicy::new(settings)),
    );

    let rendered = Router::new()
        .route("/landing", get(|| async { "landing" }))
        .route_layer(middleware::from_fn_with_state(state, prerender_layer));
    let router = Router::new()
        .route("/account", get(|| async { "account" }))
        .merge(rendered);

    let (_, landing) = send(&router, "/landing", GOOGLEBOT).await;
    let (_, account) = send(&router, "/account", GOOGLEBOT).await;

    assert_eq!(landing, "rendered landing");
    assert_eq!(account, "account");
}

#[tokio::test]
async fn state_from_settings_uses_the_configured_backend() {
    let server = MockServer::start_async().await;
    let mut mock = server
        .mock_async(|when, then| {
            when.method("GET").path("/render/http://testserver/app");
            then.status(200).body("configured");
        })
        .await;
    let settings = SharedSettings::from_toml_str(&format!(
        r#"
        backend = "prerender_io_hosted"

        [prerender]
        hosted_url = "{}"
        hosted_update_url = "{}"
        "#,
        server.url("/render/"),
        server.url("/update/"),
    ))
    .expect("settings");
    let stores = StoreRegistry::with_default(Arc::new(MemoryStore::new(
        NonZeroUsize::new(8).expect("non-zero"),
    )));

    let state = PrerenderState::from_settings(
        &settings,
        &BackendRegistry::with_defaults(),
        &stores,
        Arc::new(UserAgentPolicy::new(settings.clone())),
    )
    .expect("state");
    let router = Router::new()
        .fallback(|| async { "from the application" })
        .layer(middleware::from_fn_with_state(state, prerender_layer));

    let (_, body) = send(&router, "/app", GOOGLEBOT).await;
    assert_eq!(body, "configured");
    mock.assert_async().await;

    mock.delete_async().await;
    let (_, body) = send(&router, "/app", GOOGLEBOT).await;
    assert_eq!(body, "configured");
}

#[test]
fn state_from_settings_reports_construction_errors() {
    let settings = defaults();
    let result = PrerenderState::from_settings(
        &settings,
        &BackendRegistry::with_defaults(),
        &StoreRegistry::new(),
        Arc::new(UserAgentPolicy::new(settings.clone())),
    );
    assert!(result.is_err());
}
