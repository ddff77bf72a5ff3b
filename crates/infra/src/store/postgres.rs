//! Postgres-backed stores.
//!
//! Documents are persisted as JSONB bodies with the key columns (id, kind,
//! number) extracted for lookups and the `(kind, number)` unique index.
//! The two racy sequences never round-trip through the application:
//!
//! - legacy counters increment via `INSERT .. ON CONFLICT .. DO UPDATE ..
//!   RETURNING` (one statement, atomic),
//! - range claims issue via a conditional `UPDATE .. RETURNING` that only
//!   matches while `current_number <= end_number` (one statement, atomic).
//!
//! ## Error mapping
//!
//! | SQLx error                    | Postgres code | StoreError      |
//! |-------------------------------|---------------|-----------------|
//! | Database (unique violation)   | `23505`       | `Duplicate`     |
//! | Database (other)              | any other     | `Backend`       |
//! | Pool / connection / protocol  | n/a           | `Backend`       |

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use freightdesk_core::{InvoiceId, LorryReceiptId, PaymentId, ThnId};
use freightdesk_hiring::TruckHiringNote;
use freightdesk_invoicing::Invoice;
use freightdesk_numbering::{DocumentKind, DocumentNumber, NumberingRange, SequenceCounter};
use freightdesk_payments::{Payment, PaymentTarget};
use freightdesk_receipts::LorryReceipt;

use super::{
    CounterStore, InvoiceStore, LorryReceiptStore, PaymentStore, RangeClaim, RangeStore,
    StoreError, ThnStore,
};

/// Schema for all freightdesk tables. Idempotent; applied by
/// [`PostgresStores::ensure_schema`].
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sequence_counters (
    name  TEXT PRIMARY KEY,
    value BIGINT NOT NULL CHECK (value >= 0)
);

CREATE TABLE IF NOT EXISTS numbering_ranges (
    document_kind       TEXT PRIMARY KEY,
    prefix              TEXT NOT NULL,
    start_number        BIGINT NOT NULL,
    end_number          BIGINT NOT NULL,
    current_number      BIGINT NOT NULL,
    allow_manual_entry  BOOLEAN NOT NULL,
    allow_outside_range BOOLEAN NOT NULL,
    CHECK (start_number <= end_number)
);

CREATE TABLE IF NOT EXISTS documents (
    id     UUID PRIMARY KEY,
    kind   TEXT NOT NULL,
    number TEXT NOT NULL,
    body   JSONB NOT NULL,
    UNIQUE (kind, number)
);

CREATE TABLE IF NOT EXISTS payments (
    id          UUID PRIMARY KEY,
    target_kind TEXT NOT NULL,
    target_id   UUID NOT NULL,
    body        JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS payments_target_idx ON payments (target_kind, target_id);
"#;

fn map_sqlx(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            return StoreError::Duplicate(db.message().to_string());
        }
    }
    StoreError::Backend(e.to_string())
}

fn to_body<T: Serialize>(doc: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(doc).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_body<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn target_columns(target: PaymentTarget) -> (&'static str, Uuid) {
    match target {
        PaymentTarget::Invoice(id) => ("invoice", id.into()),
        PaymentTarget::TruckHiringNote(id) => ("truck_hiring_note", id.into()),
    }
}

/// All stores over one connection pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresStores {
    pool: PgPool,
}

impl PostgresStores {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_document<T: Serialize + Sync>(
        &self,
        kind: DocumentKind,
        id: Uuid,
        number: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO documents (id, kind, number, body) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(kind.as_str())
            .bind(number)
            .bind(to_body(doc)?)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn put_document<T: Serialize + Sync>(
        &self,
        kind: DocumentKind,
        id: Uuid,
        number: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (id, kind, number, body) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET number = EXCLUDED.number, body = EXCLUDED.body",
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(number)
        .bind(to_body(doc)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_document<T: DeserializeOwned>(
        &self,
        kind: DocumentKind,
        id: Uuid,
    ) -> Result<Option<T>, StoreError> {
        let row = sqlx::query("SELECT body FROM documents WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        match row {
            Some(row) => {
                let body: serde_json::Value = row.try_get("body").map_err(map_sqlx)?;
                Ok(Some(from_body(body)?))
            }
            None => Ok(None),
        }
    }

    async fn remove_document(&self, kind: DocumentKind, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_documents<T: DeserializeOwned>(
        &self,
        kind: DocumentKind,
    ) -> Result<Vec<T>, StoreError> {
        let rows = sqlx::query("SELECT body FROM documents WHERE kind = $1 ORDER BY number")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let body: serde_json::Value = row.try_get("body").map_err(map_sqlx)?;
            documents.push(from_body(body)?);
        }
        Ok(documents)
    }

    async fn replace_documents(
        &self,
        kind: DocumentKind,
        docs: Vec<(Uuid, String, serde_json::Value)>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM documents WHERE kind = $1")
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        for (id, number, body) in docs {
            sqlx::query("INSERT INTO documents (id, kind, number, body) VALUES ($1, $2, $3, $4)")
                .bind(id)
                .bind(kind.as_str())
                .bind(number)
                .bind(body)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }
        tx.commit().await.map_err(map_sqlx)
    }
}

#[async_trait]
impl CounterStore for PostgresStores {
    async fn increment_and_get(&self, name: &str) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO sequence_counters (name, value) VALUES ($1, 1) \
             ON CONFLICT (name) DO UPDATE SET value = sequence_counters.value + 1 \
             RETURNING value",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let value: i64 = row.try_get("value").map_err(map_sqlx)?;
        Ok(value as u64)
    }

    async fn dump(&self) -> Result<Vec<SequenceCounter>, StoreError> {
        let rows = sqlx::query("SELECT name, value FROM sequence_counters ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter()
            .map(|row| {
                let name: String = row.try_get("name").map_err(map_sqlx)?;
                let value: i64 = row.try_get("value").map_err(map_sqlx)?;
                Ok(SequenceCounter {
                    name,
                    value: value as u64,
                })
            })
            .collect()
    }

    async fn replace_all(&self, counters: Vec<SequenceCounter>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM sequence_counters")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        for c in counters {
            sqlx::query("INSERT INTO sequence_counters (name, value) VALUES ($1, $2)")
                .bind(&c.name)
                .bind(c.value as i64)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }
        tx.commit().await.map_err(map_sqlx)
    }
}

fn range_from_row(row: &sqlx::postgres::PgRow) -> Result<NumberingRange, StoreError> {
    let kind: String = row.try_get("document_kind").map_err(map_sqlx)?;
    let document_kind = DocumentKind::parse(&kind)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let prefix: String = row.try_get("prefix").map_err(map_sqlx)?;
    let start_number: i64 = row.try_get("start_number").map_err(map_sqlx)?;
    let end_number: i64 = row.try_get("end_number").map_err(map_sqlx)?;
    let current_number: i64 = row.try_get("current_number").map_err(map_sqlx)?;
    let allow_manual_entry: bool = row.try_get("allow_manual_entry").map_err(map_sqlx)?;
    let allow_outside_range: bool = row.try_get("allow_outside_range").map_err(map_sqlx)?;
    Ok(NumberingRange {
        document_kind,
        prefix,
        start_number: start_number as u64,
        end_number: end_number as u64,
        current_number: current_number as u64,
        allow_manual_entry,
        allow_outside_range,
    })
}

#[async_trait]
impl RangeStore for PostgresStores {
    async fn get(&self, kind: DocumentKind) -> Result<Option<NumberingRange>, StoreError> {
        let row = sqlx::query("SELECT * FROM numbering_ranges WHERE document_kind = $1")
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(range_from_row).transpose()
    }

    async fn put(&self, range: NumberingRange) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO numbering_ranges \
               (document_kind, prefix, start_number, end_number, current_number, \
                allow_manual_entry, allow_outside_range) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (document_kind) DO UPDATE SET \
               prefix = EXCLUDED.prefix, \
               start_number = EXCLUDED.start_number, \
               end_number = EXCLUDED.end_number, \
               current_number = EXCLUDED.current_number, \
               allow_manual_entry = EXCLUDED.allow_manual_entry, \
               allow_outside_range = EXCLUDED.allow_outside_range",
        )
        .bind(range.document_kind.as_str())
        .bind(&range.prefix)
        .bind(range.start_number as i64)
        .bind(range.end_number as i64)
        .bind(range.current_number as i64)
        .bind(range.allow_manual_entry)
        .bind(range.allow_outside_range)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn claim_next(&self, kind: DocumentKind) -> Result<RangeClaim, StoreError> {
        // The conditional UPDATE is the whole atomic claim: it only matches
        // while a value is still in range, and returns what it issued.
        let claimed = sqlx::query(
            "UPDATE numbering_ranges \
             SET current_number = current_number + 1 \
             WHERE document_kind = $1 AND current_number <= end_number \
             RETURNING current_number - 1 AS issued, prefix",
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = claimed {
            let issued: i64 = row.try_get("issued").map_err(map_sqlx)?;
            let prefix: String = row.try_get("prefix").map_err(map_sqlx)?;
            let number = if prefix.is_empty() {
                DocumentNumber::bare(issued as u64)
            } else {
                DocumentNumber::prefixed(prefix, issued as u64)
            };
            return Ok(RangeClaim::Issued(number));
        }

        let row = sqlx::query(
            "SELECT allow_outside_range FROM numbering_ranges WHERE document_kind = $1",
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        match row {
            Some(row) => {
                let allow_outside_range: bool =
                    row.try_get("allow_outside_range").map_err(map_sqlx)?;
                Ok(RangeClaim::Exhausted {
                    allow_outside_range,
                })
            }
            None => Ok(RangeClaim::Unconfigured),
        }
    }

    async fn list(&self) -> Result<Vec<NumberingRange>, StoreError> {
        let rows = sqlx::query("SELECT * FROM numbering_ranges ORDER BY document_kind")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(range_from_row).collect()
    }

    async fn replace_all(&self, ranges: Vec<NumberingRange>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM numbering_ranges")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        for range in ranges {
            sqlx::query(
                "INSERT INTO numbering_ranges \
                   (document_kind, prefix, start_number, end_number, current_number, \
                    allow_manual_entry, allow_outside_range) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(range.document_kind.as_str())
            .bind(&range.prefix)
            .bind(range.start_number as i64)
            .bind(range.end_number as i64)
            .bind(range.current_number as i64)
            .bind(range.allow_manual_entry)
            .bind(range.allow_outside_range)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }
        tx.commit().await.map_err(map_sqlx)
    }
}

#[async_trait]
impl LorryReceiptStore for PostgresStores {
    async fn insert(&self, receipt: LorryReceipt) -> Result<(), StoreError> {
        self.insert_document(
            DocumentKind::LorryReceipt,
            receipt.id_typed().into(),
            receipt.number(),
            &receipt,
        )
        .await
    }

    async fn get(&self, id: LorryReceiptId) -> Result<Option<LorryReceipt>, StoreError> {
        self.get_document(DocumentKind::LorryReceipt, id.into()).await
    }

    async fn put(&self, receipt: LorryReceipt) -> Result<(), StoreError> {
        self.put_document(
            DocumentKind::LorryReceipt,
            receipt.id_typed().into(),
            receipt.number(),
            &receipt,
        )
        .await
    }

    async fn remove(&self, id: LorryReceiptId) -> Result<bool, StoreError> {
        self.remove_document(DocumentKind::LorryReceipt, id.into()).await
    }

    async fn list(&self) -> Result<Vec<LorryReceipt>, StoreError> {
        self.list_documents(DocumentKind::LorryReceipt).await
    }

    async fn replace_all(&self, receipts: Vec<LorryReceipt>) -> Result<(), StoreError> {
        let docs = receipts
            .iter()
            .map(|r| Ok((Uuid::from(r.id_typed()), r.number().to_string(), to_body(r)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.replace_documents(DocumentKind::LorryReceipt, docs).await
    }
}

#[async_trait]
impl InvoiceStore for PostgresStores {
    async fn insert(&self, invoice: Invoice) -> Result<(), StoreError> {
        self.insert_document(
            DocumentKind::Invoice,
            invoice.id_typed().into(),
            invoice.number(),
            &invoice,
        )
        .await
    }

    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        self.get_document(DocumentKind::Invoice, id.into()).await
    }

    async fn put(&self, invoice: Invoice) -> Result<(), StoreError> {
        self.put_document(
            DocumentKind::Invoice,
            invoice.id_typed().into(),
            invoice.number(),
            &invoice,
        )
        .await
    }

    async fn remove(&self, id: InvoiceId) -> Result<bool, StoreError> {
        self.remove_document(DocumentKind::Invoice, id.into()).await
    }

    async fn list(&self) -> Result<Vec<Invoice>, StoreError> {
        self.list_documents(DocumentKind::Invoice).await
    }

    async fn replace_all(&self, invoices: Vec<Invoice>) -> Result<(), StoreError> {
        let docs = invoices
            .iter()
            .map(|i| Ok((Uuid::from(i.id_typed()), i.number().to_string(), to_body(i)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.replace_documents(DocumentKind::Invoice, docs).await
    }
}

#[async_trait]
impl ThnStore for PostgresStores {
    async fn insert(&self, note: TruckHiringNote) -> Result<(), StoreError> {
        self.insert_document(
            DocumentKind::TruckHiringNote,
            note.id_typed().into(),
            note.number(),
            &note,
        )
        .await
    }

    async fn get(&self, id: ThnId) -> Result<Option<TruckHiringNote>, StoreError> {
        self.get_document(DocumentKind::TruckHiringNote, id.into()).await
    }

    async fn put(&self, note: TruckHiringNote) -> Result<(), StoreError> {
        self.put_document(
            DocumentKind::TruckHiringNote,
            note.id_typed().into(),
            note.number(),
            &note,
        )
        .await
    }

    async fn remove(&self, id: ThnId) -> Result<bool, StoreError> {
        self.remove_document(DocumentKind::TruckHiringNote, id.into()).await
    }

    async fn list(&self) -> Result<Vec<TruckHiringNote>, StoreError> {
        self.list_documents(DocumentKind::TruckHiringNote).await
    }

    async fn replace_all(&self, notes: Vec<TruckHiringNote>) -> Result<(), StoreError> {
        let docs = notes
            .iter()
            .map(|n| Ok((Uuid::from(n.id_typed()), n.number().to_string(), to_body(n)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.replace_documents(DocumentKind::TruckHiringNote, docs).await
    }
}

#[async_trait]
impl PaymentStore for PostgresStores {
    async fn insert(&self, payment: Payment) -> Result<(), StoreError> {
        let (target_kind, target_id) = target_columns(payment.target());
        sqlx::query(
            "INSERT INTO payments (id, target_kind, target_id, body) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::from(payment.id_typed()))
        .bind(target_kind)
        .bind(target_id)
        .bind(to_body(&payment)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query("SELECT body FROM payments WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        match row {
            Some(row) => {
                let body: serde_json::Value = row.try_get("body").map_err(map_sqlx)?;
                Ok(Some(from_body(body)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, payment: Payment) -> Result<(), StoreError> {
        let (target_kind, target_id) = target_columns(payment.target());
        sqlx::query(
            "INSERT INTO payments (id, target_kind, target_id, body) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET target_kind = EXCLUDED.target_kind, \
               target_id = EXCLUDED.target_id, body = EXCLUDED.body",
        )
        .bind(Uuid::from(payment.id_typed()))
        .bind(target_kind)
        .bind(target_id)
        .bind(to_body(&payment)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn remove(&self, id: PaymentId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query("SELECT body FROM payments")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter()
            .map(|row| {
                let body: serde_json::Value = row.try_get("body").map_err(map_sqlx)?;
                from_body(body)
            })
            .collect()
    }

    async fn list_for_target(&self, target: PaymentTarget) -> Result<Vec<Payment>, StoreError> {
        let (target_kind, target_id) = target_columns(target);
        let rows = sqlx::query("SELECT body FROM payments WHERE target_kind = $1 AND target_id = $2")
            .bind(target_kind)
            .bind(target_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter()
            .map(|row| {
                let body: serde_json::Value = row.try_get("body").map_err(map_sqlx)?;
                from_body(body)
            })
            .collect()
    }

    async fn replace_all(&self, payments: Vec<Payment>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM payments")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        for payment in &payments {
            let (target_kind, target_id) = target_columns(payment.target());
            sqlx::query(
                "INSERT INTO payments (id, target_kind, target_id, body) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::from(payment.id_typed()))
            .bind(target_kind)
            .bind(target_id)
            .bind(to_body(payment)?)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }
        tx.commit().await.map_err(map_sqlx)
    }
}
