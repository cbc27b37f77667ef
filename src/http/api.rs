//! REST API endpoints
//!
//! - POST   /api/boards                          - Create a board
//! - GET    /api/boards                          - List boards
//! - GET    /api/boards/:board/state             - Current piece set
//! - POST   /api/boards/:board/states            - Save a named snapshot
//! - GET    /api/boards/:board/states            - List snapshots
//! - POST   /api/boards/:board/states/:id/load   - Make a snapshot current
//! - DELETE /api/boards/:board/states/:id        - Delete a snapshot
//! - POST   /api/assets                          - Register asset metadata
//! - GET    /api/assets                          - List assets
//! - GET    /api/assets/:id                      - Get one asset record
//! - DELETE /api/assets/:id                      - Delete an asset record

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::board::{Asset, BoardId, Piece, SnapshotId, SnapshotSummary};
use crate::store::{StateStore, StoreError};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    /// The store every handler reads and writes through.
    pub store: Arc<dyn StateStore>,
}

/// API error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// HTTP API error types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Target resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Store failure.
    #[error("Internal error")]
    Internal(#[source] StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(e) => {
                error!("store failure behind HTTP surface: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ErrorBody {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBoardRequest {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BoardListResponse {
    boards: Vec<BoardId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentStateResponse {
    board: String,
    pieces: Vec<Piece>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveStateRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveStateResponse {
    state_id: SnapshotId,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListStatesQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    manual_only: bool,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateListResponse {
    states: Vec<SnapshotSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterAssetRequest {
    id: String,
    filename: String,
    original_name: String,
    mime_type: String,
    size: u64,
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_board(
    State(state): State<ApiState>,
    Json(req): Json<CreateBoardRequest>,
) -> Result<StatusCode, ApiError> {
    if req.id.trim().is_empty() {
        return Err(ApiError::BadRequest("board id must not be empty".into()));
    }
    let board = BoardId::new(req.id.clone());
    let name = req.name.unwrap_or(req.id);
    state.store.create_board(&board, &name).await?;
    Ok(StatusCode::CREATED)
}

async fn list_boards(State(state): State<ApiState>) -> Result<Json<BoardListResponse>, ApiError> {
    let boards = state.store.list_boards().await?;
    Ok(Json(BoardListResponse { boards }))
}

async fn current_state(
    State(state): State<ApiState>,
    Path(board): Path<String>,
) -> Result<Json<CurrentStateResponse>, ApiError> {
    let pieces = state.store.get_current_state(&BoardId::new(&board)).await?;
    Ok(Json(CurrentStateResponse { board, pieces }))
}

async fn save_state(
    State(state): State<ApiState>,
    Path(board): Path<String>,
    Json(req): Json<SaveStateRequest>,
) -> Result<(StatusCode, Json<SaveStateResponse>), ApiError> {
    let board = BoardId::new(board);
    let pieces = state.store.get_current_state(&board).await?;
    // Saves taken over HTTP are always deliberate.
    let receipt = state.store.save_state(&board, pieces, req.name, true).await?;
    Ok((
        StatusCode::CREATED,
        Json(SaveStateResponse {
            state_id: receipt.state_id,
            saved_at: receipt.saved_at,
        }),
    ))
}

async fn list_states(
    State(state): State<ApiState>,
    Path(board): Path<String>,
    Query(query): Query<ListStatesQuery>,
) -> Result<Json<StateListResponse>, ApiError> {
    let states = state
        .store
        .list_states(&BoardId::new(board), query.limit, query.manual_only)
        .await?;
    Ok(Json(StateListResponse { states }))
}

async fn load_state(
    State(state): State<ApiState>,
    Path((board, state_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let switched = state
        .store
        .switch_to_state(&SnapshotId::new(state_id.clone()), &BoardId::new(board))
        .await?;
    if switched {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("state {state_id}")))
    }
}

async fn delete_state(
    State(state): State<ApiState>,
    Path((board, state_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let removed = state
        .store
        .delete_state(&SnapshotId::new(state_id.clone()), &BoardId::new(board))
        .await?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("state {state_id}")))
    }
}

async fn register_asset(
    State(state): State<ApiState>,
    Json(req): Json<RegisterAssetRequest>,
) -> Result<StatusCode, ApiError> {
    if req.id.trim().is_empty() {
        return Err(ApiError::BadRequest("asset id must not be empty".into()));
    }
    state
        .store
        .put_asset(Asset {
            id: req.id,
            filename: req.filename,
            original_name: req.original_name,
            mime_type: req.mime_type,
            size: req.size,
            uploaded_at: Utc::now(),
        })
        .await?;
    Ok(StatusCode::CREATED)
}

async fn list_assets(State(state): State<ApiState>) -> Result<Json<Vec<Asset>>, ApiError> {
    Ok(Json(state.store.list_assets().await?))
}

async fn get_asset(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Asset>, ApiError> {
    state
        .store
        .get_asset(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("asset {id}")))
}

async fn delete_asset(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_asset(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("asset {id}")))
    }
}

/// Build the API router around a store.
pub fn router(store: Arc<dyn StateStore>) -> Router {
    let state = ApiState { store };
    Router::new()
        .route("/api/boards", post(create_board).get(list_boards))
        .route("/api/boards/:board/state", get(current_state))
        .route(
            "/api/boards/:board/states",
            post(save_state).get(list_states),
        )
        .route("/api/boards/:board/states/:id/load", post(load_state))
        .route("/api/boards/:board/states/:id", delete(delete_state))
        .route("/api/assets", post(register_asset).get(list_assets))
        .route("/api/assets/:id", get(get_asset).delete(delete_asset))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::PieceId;
    use crate::store::MemoryStore;

    fn state() -> ApiState {
        ApiState {
            store: Arc::new(MemoryStore::new()),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_boards() {
        let s = state();
        let status = create_board(
            State(s.clone()),
            Json(CreateBoardRequest {
                id: "b1".into(),
                name: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(list) = list_boards(State(s)).await.unwrap();
        assert_eq!(list.boards, vec![BoardId::new("b1")]);
    }

    #[tokio::test]
    async fn test_empty_board_id_rejected() {
        let s = state();
        let result = create_board(
            State(s),
            Json(CreateBoardRequest {
                id: "  ".into(),
                name: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_save_and_load_state() {
        let s = state();
        let board = BoardId::new("b1");
        s.store
            .save_state(
                &board,
                vec![Piece::new(PieceId::new("p1"), "/a.png", 1.0, 2.0)],
                None,
                false,
            )
            .await
            .unwrap();

        let (status, Json(saved)) = save_state(
            State(s.clone()),
            Path("b1".into()),
            Json(SaveStateRequest {
                name: Some("opening".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(saved.state_id, SnapshotId::new("opening"));

        let status = load_state(State(s.clone()), Path(("b1".into(), "opening".into())))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let result = load_state(State(s), Path(("b1".into(), "missing".into()))).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_current_state_of_unknown_board_is_empty() {
        let s = state();
        let Json(body) = current_state(State(s), Path("nowhere".into()))
            .await
            .unwrap();
        assert!(body.pieces.is_empty());
    }

    #[tokio::test]
    async fn test_asset_endpoints() {
        let s = state();
        let status = register_asset(
            State(s.clone()),
            Json(RegisterAssetRequest {
                id: "a1".into(),
                filename: "a1.png".into(),
                original_name: "dragon.png".into(),
                mime_type: "image/png".into(),
                size: 512,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(asset) = get_asset(State(s.clone()), Path("a1".into())).await.unwrap();
        assert_eq!(asset.original_name, "dragon.png");

        let status = delete_asset(State(s.clone()), Path("a1".into())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let result = get_asset(State(s), Path("a1".into())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
