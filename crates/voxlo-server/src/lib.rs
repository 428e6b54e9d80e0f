pub mod admin;
pub mod config;
pub mod maintenance;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use voxlo_gateway::Hub;
use voxlo_gateway::connection;
use voxlo_types::api::{HealthResponse, StatusResponse};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub hub: Hub,
    /// Admin routes are only mounted when this is set
    pub admin_token: Option<String>,
}

pub fn app_state(hub: Hub, admin_token: Option<String>) -> AppState {
    Arc::new(AppStateInner { hub, admin_token })
}

/// Full HTTP surface: status, health, the WebSocket gateway and, when
/// configured, the admin routes.
pub fn app(state: AppState, cors: CorsLayer) -> Router {
    let mut router = Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .route("/gateway", get(ws_upgrade));

    if state.admin_token.is_some() {
        let admin_routes = Router::new()
            .route(
                "/admin/identities/{identity_id}/deactivate",
                post(admin::deactivate_identity),
            )
            .route(
                "/admin/identities/{identity_id}/reactivate",
                post(admin::reactivate_identity),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                admin::require_admin,
            ));
        router = router.merge(admin_routes);
    }

    router
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.hub.stats().await;
    Json(StatusResponse {
        message: "VOXLO Server Running".into(),
        active_users: stats.online,
        conversations: stats.conversations,
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".into(),
        timestamp: chrono::Utc::now(),
    })
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, hub))
}
