//! Router, wiring, and error → status-code mapping.
//!
//! The HTTP layer is deliberately thin: parse, call the service, map the
//! error kind. Numbering errors (exhausted/invalid/duplicate) are caller
//! errors (400); business-rule refusals are conflicts (409); storage
//! failures are 500.

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use freightdesk_core::{InvoiceId, LorryReceiptId, PaymentId, ThnId};
use freightdesk_infra::backup::BackupBundle;
use freightdesk_infra::service::{
    LedgerError, LedgerService, NewInvoice, NewLorryReceipt, NewPayment, NewTruckHiringNote,
    PaymentUpdate, RangeConfig,
};
use freightdesk_numbering::DocumentKind;

/// Build the production application: Postgres when the `postgres` feature and
/// `DATABASE_URL` are both present, in-memory otherwise.
pub async fn build_app() -> Router {
    let service = match std::env::var("DATABASE_URL") {
        Ok(url) => build_postgres_service(&url).await,
        Err(_) => {
            tracing::info!("DATABASE_URL not set; using in-memory stores");
            LedgerService::in_memory()
        }
    };
    router(Arc::new(service))
}

#[cfg(feature = "postgres")]
async fn build_postgres_service(url: &str) -> LedgerService {
    use freightdesk_infra::store::PostgresStores;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(url)
        .await
        .expect("failed to connect to DATABASE_URL");
    let stores = PostgresStores::new(pool);
    stores.ensure_schema().await.expect("failed to apply schema");
    tracing::info!("using postgres stores");
    LedgerService::with_postgres(stores)
}

#[cfg(not(feature = "postgres"))]
async fn build_postgres_service(_url: &str) -> LedgerService {
    tracing::warn!("DATABASE_URL set but postgres feature not enabled; using in-memory stores");
    LedgerService::in_memory()
}

/// The routing tree over an already-wired service.
pub fn router(service: Arc<LedgerService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/lorry-receipts", post(create_lorry_receipt).get(list_lorry_receipts))
        .route(
            "/lorry-receipts/:id",
            get(get_lorry_receipt).delete(delete_lorry_receipt),
        )
        .route("/lorry-receipts/:id/delivery", post(record_delivery))
        .route("/lorry-receipts/:id/transit", post(mark_in_transit))
        .route("/lorry-receipts/:id/paid", post(mark_paid))
        .route("/invoices", post(create_invoice).get(list_invoices))
        .route("/invoices/:id", get(get_invoice).delete(delete_invoice))
        .route("/invoices/:id/lorry-receipts", put(update_invoice_lrs))
        .route(
            "/truck-hiring-notes",
            post(create_truck_hiring_note).get(list_truck_hiring_notes),
        )
        .route("/truck-hiring-notes/:id", get(get_truck_hiring_note))
        .route("/payments", post(record_payment).get(list_payments))
        .route(
            "/payments/:id",
            get(get_payment).put(update_payment).delete(delete_payment),
        )
        .route("/settings/numbering", get(list_ranges))
        .route("/settings/numbering/:kind", put(upsert_range))
        .route("/backup", get(export_backup))
        .route("/restore", post(restore_backup))
        .layer(Extension(service))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

fn map_ledger_error(err: LedgerError) -> Response {
    match &err {
        LedgerError::RangeExhausted(_) => {
            json_error(StatusCode::BAD_REQUEST, "range_exhausted", err.to_string())
        }
        LedgerError::InvalidRange(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_range", err.to_string())
        }
        LedgerError::DuplicateNumber(_) => {
            json_error(StatusCode::BAD_REQUEST, "duplicate_number", err.to_string())
        }
        LedgerError::Validation(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
        }
        LedgerError::InvariantViolation(_) => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            err.to_string(),
        ),
        LedgerError::InvoiceHasPayments { .. } => {
            json_error(StatusCode::CONFLICT, "invoice_has_payments", err.to_string())
        }
        LedgerError::LrAlreadyInvoiced { .. } => {
            json_error(StatusCode::CONFLICT, "lr_already_invoiced", err.to_string())
        }
        LedgerError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        LedgerError::Store(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            err.to_string(),
        ),
    }
}

// ----- lorry receipts -----

async fn create_lorry_receipt(
    Extension(service): Extension<Arc<LedgerService>>,
    Json(body): Json<NewLorryReceipt>,
) -> Response {
    match service.create_lorry_receipt(body).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn list_lorry_receipts(Extension(service): Extension<Arc<LedgerService>>) -> Response {
    match service.list_lorry_receipts().await {
        Ok(receipts) => (StatusCode::OK, Json(receipts)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn get_lorry_receipt(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.get_lorry_receipt(LorryReceiptId::from_uuid(id)).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn delete_lorry_receipt(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.delete_lorry_receipt(LorryReceiptId::from_uuid(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_ledger_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct DeliveryRequest {
    delivered_at: Option<DateTime<Utc>>,
}

async fn record_delivery(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
    Json(body): Json<DeliveryRequest>,
) -> Response {
    let when = body.delivered_at.unwrap_or_else(Utc::now);
    match service.record_delivery(LorryReceiptId::from_uuid(id), when).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn mark_in_transit(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.mark_lr_in_transit(LorryReceiptId::from_uuid(id)).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn mark_paid(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.mark_lr_paid(LorryReceiptId::from_uuid(id)).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

// ----- invoices -----

async fn create_invoice(
    Extension(service): Extension<Arc<LedgerService>>,
    Json(body): Json<NewInvoice>,
) -> Response {
    match service.create_invoice(body).await {
        Ok(invoice) => (StatusCode::CREATED, Json(invoice)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn list_invoices(Extension(service): Extension<Arc<LedgerService>>) -> Response {
    match service.list_invoices().await {
        Ok(invoices) => (StatusCode::OK, Json(invoices)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn get_invoice(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.get_invoice(InvoiceId::from_uuid(id)).await {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn delete_invoice(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.delete_invoice(InvoiceId::from_uuid(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_ledger_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateInvoiceLrsRequest {
    lr_ids: Vec<LorryReceiptId>,
}

async fn update_invoice_lrs(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateInvoiceLrsRequest>,
) -> Response {
    match service
        .update_invoice_lrs(InvoiceId::from_uuid(id), body.lr_ids)
        .await
    {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

// ----- truck hiring notes -----

async fn create_truck_hiring_note(
    Extension(service): Extension<Arc<LedgerService>>,
    Json(body): Json<NewTruckHiringNote>,
) -> Response {
    match service.create_truck_hiring_note(body).await {
        Ok(note) => (StatusCode::CREATED, Json(note)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn list_truck_hiring_notes(Extension(service): Extension<Arc<LedgerService>>) -> Response {
    match service.list_truck_hiring_notes().await {
        Ok(notes) => (StatusCode::OK, Json(notes)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn get_truck_hiring_note(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.get_truck_hiring_note(ThnId::from_uuid(id)).await {
        Ok(note) => (StatusCode::OK, Json(note)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

// ----- payments -----

async fn record_payment(
    Extension(service): Extension<Arc<LedgerService>>,
    Json(body): Json<NewPayment>,
) -> Response {
    match service.record_payment(body).await {
        Ok(payment) => (StatusCode::CREATED, Json(payment)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn list_payments(Extension(service): Extension<Arc<LedgerService>>) -> Response {
    match service.list_payments().await {
        Ok(payments) => (StatusCode::OK, Json(payments)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn get_payment(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.get_payment(PaymentId::from_uuid(id)).await {
        Ok(payment) => (StatusCode::OK, Json(payment)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn update_payment(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
    Json(body): Json<PaymentUpdate>,
) -> Response {
    match service.update_payment(PaymentId::from_uuid(id), body).await {
        Ok(payment) => (StatusCode::OK, Json(payment)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn delete_payment(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.delete_payment(PaymentId::from_uuid(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_ledger_error(e),
    }
}

// ----- numbering settings -----

async fn list_ranges(Extension(service): Extension<Arc<LedgerService>>) -> Response {
    match service.list_ranges().await {
        Ok(ranges) => (StatusCode::OK, Json(ranges)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn upsert_range(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(kind): Path<String>,
    Json(body): Json<RangeConfig>,
) -> Response {
    let kind = match DocumentKind::parse(&kind) {
        Ok(kind) => kind,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, "unknown_kind", e.to_string()),
    };
    match service.upsert_range(kind, body).await {
        Ok(range) => (StatusCode::OK, Json(range)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

// ----- backup / restore -----

async fn export_backup(Extension(service): Extension<Arc<LedgerService>>) -> Response {
    match service.export_backup().await {
        Ok(bundle) => (StatusCode::OK, Json(bundle)).into_response(),
        Err(e) => map_ledger_error(e),
    }
}

async fn restore_backup(
    Extension(service): Extension<Arc<LedgerService>>,
    Json(bundle): Json<BackupBundle>,
) -> Response {
    match service.restore_backup(bundle).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_ledger_error(e),
    }
}
