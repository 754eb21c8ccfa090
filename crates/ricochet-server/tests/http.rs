//! Integration tests for the HTTP surface
//!
//! Each test serves the router on an ephemeral port and drives it with reqwest.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::StatusCode;
use ricochet::{Engine, ExpressionRunner};
use ricochet_config::ResolvedConfig;
use ricochet_server::{AppState, RenderInfo, build_router, spawn_idle_sweeper};

const CONFIG: &str = r#"
jobs:
  - name: deploy
    full_name: team/deploy
    parameters:
      - name: REGION
        kind: choice
        filterable: true
        filter_length: 2
        script: { primary: "{'us': 'United States', 'eu': 'Europe', 'ap': 'Asia Pacific'}" }
      - name: ZONE
        kind: cascade
        referenced_parameters: REGION
        script:
          primary: "[REGION ~ '-1', REGION ~ '-2']"
          fallback: "['EMPTY!']"
        visibility_script: { primary: "REGION != ''" }
      - name: BANNER
        kind: dynamic_reference
        choice_type: ET_FORMATTED_HTML
        omit_value_field: true
        referenced_parameters: REGION
        script: { primary: "'<b>' ~ REGION ~ '</b>'" }
"#;

fn state() -> AppState {
    let config = ResolvedConfig::from_yaml(CONFIG, Utf8Path::new("test.yaml")).unwrap();
    let engine = Engine::new(Arc::new(ExpressionRunner::new()));
    AppState::new(engine, config)
}

async fn serve() -> SocketAddr {
    serve_state(Arc::new(state())).await
}

async fn serve_state(state: Arc<AppState>) -> SocketAddr {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn open(client: &reqwest::Client, addr: SocketAddr, job: &str) -> Vec<RenderInfo> {
    let resp = client
        .post(format!("http://{addr}/jobs/{job}/renders"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    serde_json::from_str(&resp.text().await.unwrap()).unwrap()
}

fn render_id<'a>(renders: &'a [RenderInfo], name: &str) -> &'a str {
    &renders.iter().find(|r| r.name == name).unwrap().render_id
}

async fn get(client: &reqwest::Client, addr: SocketAddr, path: &str) -> (StatusCode, String) {
    let resp = client.get(format!("http://{addr}{path}")).send().await.unwrap();
    (resp.status(), resp.text().await.unwrap())
}

async fn update(client: &reqwest::Client, addr: SocketAddr, id: &str, payload: &str) -> StatusCode {
    client
        .post(format!("http://{addr}/renders/{id}/update"))
        .body(payload.to_string())
        .send()
        .await
        .unwrap()
        .status()
}

#[test_log::test(tokio::test)]
async fn test_open_renders_for_job() {
    let addr = serve().await;
    let client = reqwest::Client::new();

    let renders = open(&client, addr, "deploy").await;
    assert_eq!(
        renders.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        ["REGION", "ZONE", "BANNER"]
    );
    let zone = &renders[1];
    assert_eq!(zone.kind, "cascade");
    assert_eq!(zone.choice_type, "PT_SINGLE_SELECT");
    assert_eq!(zone.referenced_parameters, ["REGION"]);
    assert!(!zone.omit_value_field);
    assert!(renders[2].omit_value_field);
    assert_ne!(renders[0].render_id, renders[1].render_id);
}

#[tokio::test]
async fn test_unknown_job_and_render_are_not_found() {
    let addr = serve().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/jobs/nope/renders"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.text().await.unwrap().contains("nope"));

    let (status, _) = get(&client, addr, "/renders/missing/choices").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(update(&client, addr, "missing", "a=1").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_drives_cascade() {
    let addr = serve().await;
    let client = reqwest::Client::new();
    let renders = open(&client, addr, "deploy").await;
    let zone = render_id(&renders, "ZONE");

    let (status, body) = get(&client, addr, &format!("/renders/{zone}/choices")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"[["EMPTY!"],["EMPTY!"]]"#);

    assert_eq!(update(&client, addr, zone, "REGION=eu").await, StatusCode::NO_CONTENT);
    let (_, body) = get(&client, addr, &format!("/renders/{zone}/choices")).await;
    assert_eq!(body, r#"[["eu-1","eu-2"],["eu-1","eu-2"]]"#);

    let (_, body) = get(&client, addr, &format!("/renders/{zone}/choices-as-string")).await;
    assert_eq!(body, "[eu-1, eu-2]");
}

#[tokio::test]
async fn test_visibility_follows_state() {
    let addr = serve().await;
    let client = reqwest::Client::new();
    let renders = open(&client, addr, "deploy").await;
    let zone = render_id(&renders, "ZONE");

    let (_, body) = get(&client, addr, &format!("/renders/{zone}/visible")).await;
    assert_eq!(body, "false");

    update(&client, addr, zone, "REGION=us").await;
    let (_, body) = get(&client, addr, &format!("/renders/{zone}/visible")).await;
    assert_eq!(body, "true");

    let region = render_id(&renders, "REGION");
    let (_, body) = get(&client, addr, &format!("/renders/{region}/visible")).await;
    assert_eq!(body, "true");
}

#[tokio::test]
async fn test_filter_query() {
    let addr = serve().await;
    let client = reqwest::Client::new();
    let renders = open(&client, addr, "deploy").await;
    let region = render_id(&renders, "REGION");

    let (_, body) = get(&client, addr, &format!("/renders/{region}/choices?filter=e")).await;
    let ui: (Vec<String>, Vec<String>) = serde_json::from_str(&body).unwrap();
    assert_eq!(ui.1, ["us", "eu", "ap"]);

    let (_, body) = get(&client, addr, &format!("/renders/{region}/choices?filter=euro")).await;
    assert_eq!(body, r#"[["Europe"],["eu"]]"#);
}

#[tokio::test]
async fn test_html_output_is_escaped() {
    let addr = serve().await;
    let client = reqwest::Client::new();
    let renders = open(&client, addr, "deploy").await;
    let banner = render_id(&renders, "BANNER");

    update(&client, addr, banner, "REGION=<script>").await;
    let (_, body) = get(&client, addr, &format!("/renders/{banner}/choices-as-string")).await;
    assert_eq!(body, "&lt;b&gt;&lt;script&gt;&lt;/b&gt;");

    let (_, body) = get(&client, addr, &format!("/renders/{banner}/choices")).await;
    assert!(!body.contains('<'), "{body}");
}

#[tokio::test]
async fn test_renders_are_isolated_and_deletable() {
    let addr = serve().await;
    let client = reqwest::Client::new();
    let first = open(&client, addr, "deploy").await;
    let second = open(&client, addr, "deploy").await;
    let a = render_id(&first, "ZONE");
    let b = render_id(&second, "ZONE");

    update(&client, addr, a, "REGION=us").await;
    update(&client, addr, b, "REGION=ap").await;
    let (_, body) = get(&client, addr, &format!("/renders/{a}/choices")).await;
    assert!(body.contains("us-1"));
    let (_, body) = get(&client, addr, &format!("/renders/{b}/choices")).await;
    assert!(body.contains("ap-1"));

    let resp = client
        .delete(format!("http://{addr}/renders/{a}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let (status, _) = get(&client, addr, &format!("/renders/{a}/choices")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_responses_carry_served_by_header() {
    let addr = serve().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/jobs/deploy/renders"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-served-by"], "ricochet-serve");

    let resp = client
        .get(format!("http://{addr}/renders/missing/visible"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()["x-served-by"], "ricochet-serve");
}

#[test_log::test(tokio::test)]
async fn test_idle_renders_are_closed() {
    let state = Arc::new(state().with_render_ttl(Duration::from_millis(100)));
    let addr = serve_state(state.clone()).await;
    let client = reqwest::Client::new();
    let renders = open(&client, addr, "deploy").await;
    let zone = render_id(&renders, "ZONE");

    let (status, _) = get(&client, addr, &format!("/renders/{zone}/visible")).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let (status, _) = get(&client, addr, &format!("/renders/{zone}/visible")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(update(&client, addr, zone, "REGION=eu").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sweeper_closes_idle_renders() {
    let state = Arc::new(state().with_render_ttl(Duration::from_millis(50)));
    let addr = serve_state(state.clone()).await;
    let client = reqwest::Client::new();
    open(&client, addr, "deploy").await;
    assert_eq!(state.renders.len(), 3);

    let sweeper = spawn_idle_sweeper(state.clone());
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(state.renders.is_empty());
    sweeper.abort();
}
