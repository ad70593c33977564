//! Database operations for `attributes` and `attribute_values`.
//!
//! Attribute writes carry the full set of values for the attribute; the
//! update path reconciles the persisted set against the submitted one
//! (delete absent ids, update rows with ids, insert the rest) inside a
//! single transaction.

use sqlx::{PgConnection, PgPool};

use crate::{generate_unique_slug, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `attributes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttributeRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// A row from the `attribute_values` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttributeValueRow {
    pub id: i64,
    pub attribute_id: i64,
    pub name: String,
    pub value: String,
}

/// A submitted attribute value. `id` present means "update that row",
/// absent means "insert".
#[derive(Debug, Clone)]
pub struct ValueInput {
    pub id: Option<i64>,
    pub name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns all attributes, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_attributes(pool: &PgPool) -> Result<Vec<AttributeRow>, DbError> {
    let rows = sqlx::query_as::<_, AttributeRow>("SELECT id, name, slug FROM attributes ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Returns a single attribute by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_attribute(pool: &PgPool, id: i64) -> Result<Option<AttributeRow>, DbError> {
    let row = sqlx::query_as::<_, AttributeRow>("SELECT id, name, slug FROM attributes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Returns the values belonging to an attribute, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_attribute_values(
    pool: &PgPool,
    attribute_id: i64,
) -> Result<Vec<AttributeValueRow>, DbError> {
    let rows = sqlx::query_as::<_, AttributeValueRow>(
        "SELECT id, attribute_id, name, value \
         FROM attribute_values \
         WHERE attribute_id = $1 \
         ORDER BY id",
    )
    .bind(attribute_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns a single attribute value by id, or `None` if not found.
///
/// Used by the API layer to verify that a chosen value belongs to a
/// connection's attribute before persisting a connected attribute.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_attribute_value(
    pool: &PgPool,
    id: i64,
) -> Result<Option<AttributeValueRow>, DbError> {
    let row = sqlx::query_as::<_, AttributeValueRow>(
        "SELECT id, attribute_id, name, value FROM attribute_values WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Creates an attribute together with its initial values, in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is persisted in
/// that case.
pub async fn create_attribute(
    pool: &PgPool,
    name: &str,
    values: &[ValueInput],
) -> Result<AttributeRow, DbError> {
    let mut tx = pool.begin().await?;

    let slug = generate_unique_slug(
        &mut *tx,
        "SELECT EXISTS(SELECT 1 FROM attributes WHERE slug = $1)",
    )
    .await?;

    let row = sqlx::query_as::<_, AttributeRow>(
        "INSERT INTO attributes (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
    )
    .bind(name)
    .bind(&slug)
    .fetch_one(&mut *tx)
    .await?;

    for value in values {
        sqlx::query("INSERT INTO attribute_values (attribute_id, name, value) VALUES ($1, $2, $3)")
            .bind(row.id)
            .bind(&value.name)
            .bind(&value.value)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Updates an attribute and, when `values` is supplied, reconciles its value
/// set: persisted values absent from the submitted list are deleted, values
/// with ids are updated in place, and the rest are inserted. Runs in one
/// transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the attribute does not exist,
/// [`DbError::MissingChild`] if a submitted value id does not belong to this
/// attribute, or [`DbError::Sqlx`] on other failures. Any error rolls back
/// the whole write.
pub async fn update_attribute(
    pool: &PgPool,
    id: i64,
    name: Option<&str>,
    values: Option<&[ValueInput]>,
) -> Result<AttributeRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, AttributeRow>(
        "UPDATE attributes SET name = COALESCE($2, name) WHERE id = $1 RETURNING id, name, slug",
    )
    .bind(id)
    .bind(name)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    if let Some(values) = values {
        reconcile_values(&mut tx, id, values).await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Deletes an attribute; values and junction rows cascade. Returns whether a
/// row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn delete_attribute(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM attributes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn reconcile_values(
    tx: &mut PgConnection,
    attribute_id: i64,
    values: &[ValueInput],
) -> Result<(), DbError> {
    let keep: Vec<i64> = values.iter().filter_map(|v| v.id).collect();

    sqlx::query("DELETE FROM attribute_values WHERE attribute_id = $1 AND NOT (id = ANY($2))")
        .bind(attribute_id)
        .bind(&keep)
        .execute(&mut *tx)
        .await?;

    for value in values {
        match value.id {
            Some(value_id) => {
                let result = sqlx::query(
                    "UPDATE attribute_values SET name = $3, value = $4 \
                     WHERE id = $1 AND attribute_id = $2",
                )
                .bind(value_id)
                .bind(attribute_id)
                .bind(&value.name)
                .bind(&value.value)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(DbError::MissingChild {
                        entity: "attribute value",
                        id: value_id,
                    });
                }
            }
            None => {
                sqlx::query(
                    "INSERT INTO attribute_values (attribute_id, name, value) VALUES ($1, $2, $3)",
                )
                .bind(attribute_id)
                .bind(&value.name)
                .bind(&value.value)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    Ok(())
}
