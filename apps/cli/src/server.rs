//! Read-only status endpoint served by `steward agent`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use steward_core::PlanId;
use steward_engine::{Health, PlanSnapshot, StatusBoard};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

type BoardState = Arc<StatusBoard>;

/// `GET /healthz`, `GET /plans`, `GET /plans/{id}`.
pub fn routes(board: BoardState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/plans", get(list_plans))
        .route("/plans/{id}", get(get_plan))
        .with_state(board)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    addr: &str,
    board: BoardState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "status endpoint listening");
    axum::serve(listener, routes(board))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn healthz(State(board): State<BoardState>) -> Json<Health> {
    Json(board.health())
}

async fn list_plans(State(board): State<BoardState>) -> Json<Vec<Arc<PlanSnapshot>>> {
    Json(board.list())
}

async fn get_plan(
    State(board): State<BoardState>,
    Path(id): Path<String>,
) -> Result<Json<Arc<PlanSnapshot>>, (StatusCode, String)> {
    let plan_id = PlanId::parse(&id)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid plan id `{id}`: {e}")))?;
    board
        .snapshot(plan_id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("plan {plan_id} not found")))
}
