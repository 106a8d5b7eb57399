use crate::chain::{ChainResolver, QuestId};
use crate::config::Config;
use crate::error::{QuestchainError, Result};
use crate::mcp::server::McpServer;
use crate::mcp::types::*;
use crate::zone::{validate_zone_id, MapId};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .is_ok()
}

/// HTTP transport: MCP over `POST /mcp` plus a small read-only JSON API
pub struct HttpMcpServer {
    server: Arc<McpServer>,
    allowed_origins: Vec<String>,
}

impl HttpMcpServer {
    pub fn new(resolver: Arc<ChainResolver>, config: &Config) -> Self {
        Self {
            server: Arc::new(McpServer::new(resolver)),
            allowed_origins: config.http_server.allowed_origins.clone(),
        }
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.create_router();

        let addr = format!("127.0.0.1:{}", port);

        if !check_port_available(port).await {
            return Err(QuestchainError::Config(format!(
                "Port {} is already in use. Stop the other process or set http_server.port in config.toml",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            QuestchainError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Starting HTTP server on http://{}", addr);
        log::info!("MCP endpoint: http://{}/mcp", addr);

        axum::serve(listener, app).await.map_err(|e| {
            QuestchainError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }

    /// Create the axum router
    pub fn create_router(&self) -> Router {
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/mcp", post(handle_post))
            .route("/health", get(handle_health))
            .route("/api/zones", get(handle_list_zones))
            .route("/api/zones/:zone_id/quest-chains", get(handle_zone_chains))
            .route("/api/zones/:zone_id/boundaries", get(handle_zone_boundaries))
            .route("/api/quests/:quest_id/chain", get(handle_quest_chain))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(AppState {
                server: Arc::clone(&self.server),
                allowed_origins: self.allowed_origins.clone(),
            })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    server: Arc<McpServer>,
    allowed_origins: Vec<String>,
}

impl AppState {
    fn resolver(&self) -> &ChainResolver {
        self.server.resolver()
    }
}

/// JSON error body with a status chosen from the error kind.
#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    message: String,
}

impl From<QuestchainError> for HttpApiError {
    fn from(err: QuestchainError) -> Self {
        let status = match &err {
            QuestchainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            QuestchainError::QuestNotFound(_) => StatusCode::NOT_FOUND,
            QuestchainError::StoreUnavailable(_) | QuestchainError::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("API request failed: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "error": self.status.canonical_reason().unwrap_or("error"),
                "message": self.message,
            })),
        )
            .into_response()
    }
}

type ApiResult = std::result::Result<Response, HttpApiError>;

/// Handle POST /mcp (JSON-RPC; response in the body)
async fn handle_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if let Err(response) = validate_origin(&headers, &state.allowed_origins) {
        return response;
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                )),
            )
                .into_response();
        }
    };

    // Each HTTP request stands alone; initialization is not tracked
    let mut initialized = false;
    match state.server.process_mcp_request(request, &mut initialized).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(e) => HttpApiError::from(e).into_response(),
    }
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "questchain",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ZonesQuery {
    map_id: Option<MapId>,
}

/// GET /api/zones[?map_id=N]
async fn handle_list_zones(State(state): State<AppState>, Query(query): Query<ZonesQuery>) -> ApiResult {
    let zones = state.resolver().list_zones(query.map_id).await?;
    Ok(Json(serde_json::json!({
        "mapId": query.map_id,
        "zoneCount": zones.len(),
        "zones": zones,
    }))
    .into_response())
}

/// GET /api/zones/:zone_id/quest-chains
async fn handle_zone_chains(State(state): State<AppState>, Path(zone_id): Path<String>) -> ApiResult {
    let zone_id = validate_zone_id(parse_path_id("zone_id", &zone_id)?)?;
    let chains = state.resolver().find_quest_chains_in_zone(zone_id).await?;
    Ok(Json(serde_json::json!({
        "zoneId": zone_id,
        "chainCount": chains.len(),
        "chains": chains,
    }))
    .into_response())
}

/// GET /api/zones/:zone_id/boundaries
async fn handle_zone_boundaries(State(state): State<AppState>, Path(zone_id): Path<String>) -> ApiResult {
    let zone_id = validate_zone_id(parse_path_id("zone_id", &zone_id)?)?;
    let boundaries = state.resolver().zone_boundaries(zone_id).await?;
    Ok(Json(serde_json::json!({
        "zoneId": zone_id,
        "spatialFallback": !boundaries.is_empty(),
        "boundaries": boundaries,
    }))
    .into_response())
}

/// GET /api/quests/:quest_id/chain
async fn handle_quest_chain(State(state): State<AppState>, Path(quest_id): Path<String>) -> ApiResult {
    let raw = parse_path_id("quest_id", &quest_id)?;
    let quest_id = QuestId::try_from(raw)
        .map_err(|_| QuestchainError::InvalidInput(format!("quest_id out of range: {}", raw)))?;
    let chain = state.resolver().trace_quest_chain(quest_id).await?;
    Ok(Json(chain).into_response())
}

fn parse_path_id(name: &str, raw: &str) -> std::result::Result<i64, HttpApiError> {
    raw.parse::<i64>().map_err(|_| {
        HttpApiError::from(QuestchainError::InvalidInput(format!(
            "{} must be an integer, got {:?}",
            name, raw
        )))
    })
}

/// Reject browser requests from origins outside the configured list
fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // Non-browser clients send no Origin
    let Some(origin) = headers.get("origin").and_then(|h| h.to_str().ok()) else {
        return Ok(());
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Origin not allowed",
                "message": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{QuestRecord, ResolverOptions};
    use crate::store::InMemoryQuestStore;
    use crate::zone::SpawnPoint;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn router(allowed_origins: Vec<String>) -> Router {
        let store = InMemoryQuestStore::new()
            .with_quest(QuestRecord::new(1, "Q1"))
            .with_quest(QuestRecord::new(2, "Q2").with_prerequisite(1))
            .with_spawn(10, SpawnPoint { map_id: 0, zone_id: 12, x: 0.0, y: 0.0 })
            .with_offering(10, 1);
        let resolver = Arc::new(ChainResolver::new(Arc::new(store), ResolverOptions::default()));
        HttpMcpServer {
            server: Arc::new(McpServer::new(resolver)),
            allowed_origins,
        }
        .create_router()
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(router(vec![]), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "questchain");
    }

    #[tokio::test]
    async fn test_zone_chains_endpoint() {
        let (status, body) = get_json(router(vec![]), "/api/zones/12/quest-chains").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chainCount"], 1);
        assert_eq!(body["chains"][0]["quests"][1]["id"], 2);
    }

    #[tokio::test]
    async fn test_bad_zone_is_400() {
        let (status, _) = get_json(router(vec![]), "/api/zones/0/quest-chains").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(router(vec![]), "/api/zones/elwynn/quest-chains").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_quest_is_404() {
        let (status, body) = get_json(router(vec![]), "/api/quests/424242/chain").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().contains("424242"));
    }

    #[tokio::test]
    async fn test_list_zones_endpoint() {
        let (status, body) = get_json(router(vec![]), "/api/zones?map_id=0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["zones"][0]["zoneId"], 12);
    }

    #[tokio::test]
    async fn test_post_mcp() {
        let request = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#))
            .unwrap();
        let response = router(vec![]).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_mcp_rejects_foreign_origin() {
        let request = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("origin", "http://evil.example")
            .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#))
            .unwrap();
        let response = router(vec!["http://localhost:3000".to_string()])
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
