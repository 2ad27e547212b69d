//! Numbering collaborator: sequential human-readable requisition numbers,
//! monotonic and unique per calendar year.

use chrono::{Datelike, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::entities::requisition;
use crate::errors::WorkflowError;

/// Issues the next `REQ-YYYY-NNNN` number for the current year. Must be
/// called inside the transaction that inserts the requisition; the unique
/// index on `number` turns a lost race into a transaction failure instead
/// of a duplicate.
pub async fn next_requisition_number<C: ConnectionTrait>(conn: &C) -> Result<String, WorkflowError> {
    next_for_year(conn, Utc::now().year()).await
}

pub async fn next_for_year<C: ConnectionTrait>(
    conn: &C,
    year: i32,
) -> Result<String, WorkflowError> {
    let prefix = format!("REQ-{year}-");
    // Requisitions are never hard-deleted once submitted, so the count is
    // monotonic within a year.
    let existing = requisition::Entity::find()
        .filter(requisition::Column::Number.starts_with(&prefix))
        .count(conn)
        .await?;
    Ok(format!("{prefix}{:04}", existing + 1))
}
