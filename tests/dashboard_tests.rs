mod common;

use common::{harness, profile};
use maintdash::auth::MemorySessionStore;
use maintdash::config::InvalidationPolicy;
use maintdash::dashboard::{Dashboard, DashboardError, RouteDecision};
use maintdash::navigation::Route;
use maintdash::{ApiSuccess, ErrorInfo};
use serde_json::json;

#[tokio::test]
async fn test_unauthenticated_views_make_no_requests() {
    let h = harness(MemorySessionStore::new(), InvalidationPolicy::AnyError);
    let dashboard = Dashboard::new(h.session.clone(), h.client.clone());

    assert_eq!(dashboard.deployments().await, Err(DashboardError::NotAuthenticated));
    assert_eq!(
        dashboard.project_env("gyft").await,
        Err(DashboardError::NotAuthenticated)
    );
    assert_eq!(dashboard.greeting(), "Not authenticated.");
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn test_authenticated_views() {
    let h = harness(MemorySessionStore::with_token("tok"), InvalidationPolicy::AnyError);
    h.backend.reply("tok", profile("alice"));
    h.session.initialize().await;

    let dashboard = Dashboard::new(h.session.clone(), h.client.clone());
    assert_eq!(dashboard.greeting(), "Welcome alice!");

    // Every authenticated request carries the same bearer token
    h.backend.reply(
        "tok",
        Ok(ApiSuccess {
            message: "ok".to_string(),
            status_code: 200,
            data: json!([{ "name": "gyft", "repo_url": "https://github.com/metakgp/gyft" }]),
        }),
    );
    let deployments = dashboard.deployments().await.unwrap();
    assert_eq!(deployments.len(), 1);
    assert_eq!(deployments[0].name, "gyft");

    h.backend.reply(
        "tok",
        Ok(ApiSuccess {
            message: "ok".to_string(),
            status_code: 200,
            data: json!([{ "key": "PORT", "value": "8000" }]),
        }),
    );
    let vars = dashboard.project_env("  gyft ").await.unwrap();
    assert_eq!(vars[0].key, "PORT");
    assert_eq!(vars[0].value, "8000");
}

#[tokio::test]
async fn test_empty_project_name() {
    let h = harness(MemorySessionStore::with_token("tok"), InvalidationPolicy::AnyError);
    h.backend.reply("tok", profile("alice"));
    h.session.initialize().await;
    let calls = h.backend.calls();

    let dashboard = Dashboard::new(h.session.clone(), h.client.clone());
    let error = dashboard.project_env("   ").await.unwrap_err();

    assert_eq!(error, DashboardError::MissingProjectName);
    assert_eq!(error.to_string(), "Project name not found.");
    assert_eq!(h.backend.calls(), calls);
}

#[tokio::test]
async fn test_api_error_is_wrapped() {
    let h = harness(MemorySessionStore::with_token("tok"), InvalidationPolicy::AnyError);
    h.backend.reply("tok", profile("alice"));
    h.session.initialize().await;

    h.backend
        .reply("tok", Err(ErrorInfo::http(500, "Could not reach GitHub.")));

    let dashboard = Dashboard::new(h.session.clone(), h.client.clone());
    let error = dashboard.deployments().await.unwrap_err();

    assert_eq!(
        error.to_string(),
        "Error fetching deployments (500): Could not reach GitHub."
    );
    // A failed view request leaves the session alone
    assert!(h.session.state().is_authenticated());
}

#[tokio::test]
async fn test_route_guard() {
    let h = harness(MemorySessionStore::new(), InvalidationPolicy::AnyError);
    let dashboard = Dashboard::new(h.session.clone(), h.client.clone());
    let project = Route::Project("gyft".to_string());

    // Before the startup check
    assert_eq!(dashboard.guard(&Route::Home), RouteDecision::Pending);
    assert_eq!(dashboard.guard(&Route::OAuth), RouteDecision::Render);

    h.session.initialize().await;
    assert_eq!(
        dashboard.guard(&Route::Home),
        RouteDecision::RedirectToProvider
    );
    assert_eq!(
        dashboard.guard(&project),
        RouteDecision::Redirect(Route::Home)
    );
    assert_eq!(dashboard.guard(&Route::OAuth), RouteDecision::Render);

    h.backend.reply("tok", profile("alice"));
    h.session.login("tok").await.unwrap();
    assert_eq!(dashboard.guard(&Route::Home), RouteDecision::Render);
    assert_eq!(dashboard.guard(&project), RouteDecision::Render);
}
