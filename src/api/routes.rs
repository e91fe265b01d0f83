use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::api::dto::{
    DepositRequest, HistoryQuery, HistoryResponse, TransactionResponse, TransferRequest,
};
use crate::api::{SharedEngine, errors};
use crate::domain::{DeadLetterQueue, Money};
use crate::engine::DEFAULT_DEPOSIT_SOURCE;
use crate::ledger::{HistoryFilter, SortOrder};

pub fn router() -> Router {
    Router::new()
        .route("/wallet/deposit", post(deposit))
        .route("/wallet/transfer", post(transfer))
        .route("/wallet/status/:username", get(status))
        .route("/wallet/history/:username", get(history))
        .route("/wallet/reconcile/:username", get(reconcile))
}

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to the wallet ledger API",
        "status": "online",
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

pub async fn deposit(
    Extension(engine): Extension<SharedEngine>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return errors::json_error(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let amount = match Money::parse_json(&body.amount) {
        Ok(amount) => amount,
        Err(e) => {
            engine.dlq().report(&e);
            return errors::error_to_response(e);
        }
    };
    let source = body.source.as_deref().unwrap_or(DEFAULT_DEPOSIT_SOURCE);

    match engine.deposit_from(&body.username, amount.amount(), source) {
        Ok(entry) => (
            StatusCode::OK,
            Json(TransactionResponse { transaction: entry }),
        )
            .into_response(),
        Err(e) => errors::error_to_response(e),
    }
}

pub async fn transfer(
    Extension(engine): Extension<SharedEngine>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return errors::json_error(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let amount = match Money::parse_json(&body.amount) {
        Ok(amount) => amount,
        Err(e) => {
            engine.dlq().report(&e);
            return errors::error_to_response(e);
        }
    };

    match engine.transfer(&body.from_user, &body.to_user, amount.amount()) {
        Ok(receipt) => (
            StatusCode::OK,
            Json(TransactionResponse {
                transaction: receipt.outgoing,
            }),
        )
            .into_response(),
        Err(e) => errors::error_to_response(e),
    }
}

pub async fn status(
    Extension(engine): Extension<SharedEngine>,
    Path(username): Path<String>,
) -> Response {
    match engine.status(&username) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => errors::error_to_response(e),
    }
}

pub async fn history(
    Extension(engine): Extension<SharedEngine>,
    Path(username): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let filter = match query.filter.as_deref().unwrap_or_default().parse::<HistoryFilter>() {
        Ok(f) => f,
        Err(e) => return errors::error_to_response(e),
    };
    let order = match query.order.as_deref().unwrap_or_default().parse::<SortOrder>() {
        Ok(o) => o,
        Err(e) => return errors::error_to_response(e),
    };

    match engine.history(&username, filter, order) {
        Ok(transactions) => (StatusCode::OK, Json(HistoryResponse { transactions })).into_response(),
        Err(e) => errors::error_to_response(e),
    }
}

pub async fn reconcile(
    Extension(engine): Extension<SharedEngine>,
    Path(username): Path<String>,
) -> Response {
    match engine.reconcile(&username) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::error_to_response(e),
    }
}
