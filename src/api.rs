use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{
    engine::{NewOrder, OrderAck},
    errors::ExchangeError,
    journal::JournalError,
    orderbook::BookSnapshot,
    orders::{AccountId, Order},
    state::AppState,
    trade::TransactionRecord,
};

const DEFAULT_PAGE: usize = 100;
const MAX_PAGE: usize = 1000;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("transaction journal is not enabled")]
    JournalDisabled,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Exchange(ExchangeError::Validation(_) | ExchangeError::Instrument(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Exchange(ExchangeError::InsufficientFunds { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Exchange(ExchangeError::OrderNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Exchange(ExchangeError::MissingLedger(_) | ExchangeError::Store(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Journal(JournalError::BadCursor) => StatusCode::BAD_REQUEST,
            ApiError::Journal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::JournalDisabled => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct DepthQuery {
    pub depth: Option<usize>,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub owner: AccountId,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub after: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionPage {
    pub items: Vec<TransactionRecord>,
    pub next: Option<String>,
}

#[debug_handler]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<NewOrder>,
) -> Result<Json<OrderAck>, ApiError> {
    let ack = state.exchange.place_order(payload).await?;
    Ok(Json(ack))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path((pair, order_id)): Path<(String, Uuid)>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<Order>, ApiError> {
    let order = state.exchange.cancel_order(&pair, order_id, q.owner).await?;
    Ok(Json(order))
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(pair): Path<String>,
    Query(q): Query<DepthQuery>,
) -> Result<Json<BookSnapshot>, ApiError> {
    let depth = q.depth.unwrap_or(usize::MAX);
    let snapshot = state.exchange.order_book_snapshot(&pair, depth).await?;
    Ok(Json(snapshot))
}

pub async fn list_pairs(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.exchange.markets().supported().map(|p| p.code()).collect())
}

pub async fn get_transactions(
    State(state): State<AppState>,
    Path(pair): Path<String>,
    Query(q): Query<PageQuery>,
) -> Result<(HeaderMap, Json<TransactionPage>), ApiError> {
    let pair = state
        .exchange
        .markets()
        .resolve(&pair)
        .map_err(ExchangeError::from)?;
    let journal = state
        .exchange
        .store()
        .journal()
        .ok_or(ApiError::JournalDisabled)?;

    let limit = q.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let (items, next) = journal.page_asc(&pair.code(), q.after.as_deref(), limit)?;

    let mut headers = HeaderMap::new();
    headers.insert("x-effective-limit", HeaderValue::from(limit));
    Ok((headers, Json(TransactionPage { items, next })))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{pair}/{id}", delete(cancel_order))
        .route("/book/{pair}", get(get_book))
        .route("/pairs", get(list_pairs))
        .route("/transactions/{pair}", get(get_transactions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
