//! Database operations for `product_variants` and
//! `connected_variant_attributes`.
//!
//! Variants are the sellable items. They can be written on their own through
//! this module or as children of a product write (`products` module), which
//! reuses the row-level helpers here so both paths behave identically.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use crate::products::ConnectedAttributeInput;
use crate::{generate_unique_slug, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `product_variants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub product_id: i64,
    pub price_amount: Decimal,
    pub price_currency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from `connected_variant_attributes`, joined with the connection's
/// attribute id for hyperlinked representations.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConnectedVariantAttributeRow {
    pub id: i64,
    pub variant_id: i64,
    pub connection_id: i64,
    pub value_id: i64,
    pub attribute_id: i64,
}

/// A submitted variant, with price fields already validated by the caller.
///
/// `set_*` fields follow overlay semantics: on update, `None` keeps the
/// current value; on insert, `None` falls back to the column default
/// (amount 0, the configured default currency, inactive).
#[derive(Debug, Clone)]
pub struct VariantWrite {
    pub id: Option<i64>,
    pub name: String,
    pub set_price_amount: Option<Decimal>,
    pub set_price_currency: Option<String>,
    pub set_active: Option<bool>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

const VARIANT_COLUMNS: &str =
    "id, name, slug, product_id, price_amount, price_currency, active, created_at, updated_at";

/// Returns all variants, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_variants(pool: &PgPool) -> Result<Vec<VariantRow>, DbError> {
    let rows = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns the variants of a product, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_variants_by_product(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<VariantRow>, DbError> {
    let rows = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE product_id = $1 ORDER BY id"
    ))
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns a single variant by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_variant(pool: &PgPool, id: i64) -> Result<Option<VariantRow>, DbError> {
    let row = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Returns the connected attributes of a variant, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_connected_variant_attributes(
    pool: &PgPool,
    variant_id: i64,
) -> Result<Vec<ConnectedVariantAttributeRow>, DbError> {
    let rows = sqlx::query_as::<_, ConnectedVariantAttributeRow>(
        "SELECT cva.id, cva.variant_id, cva.connection_id, cva.value_id, av.attribute_id \
         FROM connected_variant_attributes cva \
         JOIN attribute_variants av ON av.id = cva.connection_id \
         WHERE cva.variant_id = $1 \
         ORDER BY cva.id",
    )
    .bind(variant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Creates a variant together with its connected attributes, in one
/// transaction. `write.id` is ignored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is persisted in
/// that case.
pub async fn create_variant(
    pool: &PgPool,
    product_id: i64,
    write: &VariantWrite,
    attributes: &[ConnectedAttributeInput],
    default_currency: &str,
) -> Result<VariantRow, DbError> {
    let mut tx = pool.begin().await?;

    let id = insert_variant(&mut tx, product_id, write, default_currency).await?;

    for item in attributes {
        sqlx::query(
            "INSERT INTO connected_variant_attributes (variant_id, connection_id, value_id) \
             VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(item.connection_id)
        .bind(item.value_id)
        .execute(&mut *tx)
        .await?;
    }

    let row = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = $1"
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

/// Updates a variant and, when `attributes` is supplied, reconciles its
/// connected attributes. Runs in one transaction. The owning product cannot
/// be changed.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the variant does not exist,
/// [`DbError::MissingChild`] if a submitted connected-attribute id does not
/// belong to this variant, or [`DbError::Sqlx`] on other failures. Any error
/// rolls back the whole write.
pub async fn update_variant(
    pool: &PgPool,
    id: i64,
    name: Option<&str>,
    set_price_amount: Option<Decimal>,
    set_price_currency: Option<&str>,
    set_active: Option<bool>,
    attributes: Option<&[ConnectedAttributeInput]>,
) -> Result<VariantRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, VariantRow>(&format!(
        "UPDATE product_variants \
         SET name = COALESCE($2, name), \
             price_amount = COALESCE($3, price_amount), \
             price_currency = COALESCE($4, price_currency), \
             active = COALESCE($5, active), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {VARIANT_COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(set_price_amount)
    .bind(set_price_currency)
    .bind(set_active)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    if let Some(items) = attributes {
        reconcile_connected_attributes(&mut tx, id, items).await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Deletes a variant; connected attributes cascade. Returns whether a row
/// was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn delete_variant(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM product_variants WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Row-level helpers shared with the products module
// ---------------------------------------------------------------------------

/// Insert a variant row, generating a fresh slug. Returns the new id.
pub(crate) async fn insert_variant(
    tx: &mut PgConnection,
    product_id: i64,
    write: &VariantWrite,
    default_currency: &str,
) -> Result<i64, DbError> {
    let slug = generate_unique_slug(
        &mut *tx,
        "SELECT EXISTS(SELECT 1 FROM product_variants WHERE slug = $1)",
    )
    .await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO product_variants \
             (name, slug, product_id, price_amount, price_currency, active) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(&write.name)
    .bind(&slug)
    .bind(product_id)
    .bind(write.set_price_amount.unwrap_or(Decimal::ZERO))
    .bind(write.set_price_currency.as_deref().unwrap_or(default_currency))
    .bind(write.set_active.unwrap_or(false))
    .fetch_one(&mut *tx)
    .await?;

    Ok(id)
}

/// Update a variant row scoped to its owning product (nested reconcile path).
pub(crate) async fn update_variant_of_product(
    tx: &mut PgConnection,
    id: i64,
    product_id: i64,
    write: &VariantWrite,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE product_variants \
         SET name = $3, \
             price_amount = COALESCE($4, price_amount), \
             price_currency = COALESCE($5, price_currency), \
             active = COALESCE($6, active), \
             updated_at = NOW() \
         WHERE id = $1 AND product_id = $2",
    )
    .bind(id)
    .bind(product_id)
    .bind(&write.name)
    .bind(write.set_price_amount)
    .bind(write.set_price_currency.as_deref())
    .bind(write.set_active)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::MissingChild {
            entity: "product variant",
            id,
        });
    }
    Ok(())
}

async fn reconcile_connected_attributes(
    tx: &mut PgConnection,
    variant_id: i64,
    items: &[ConnectedAttributeInput],
) -> Result<(), DbError> {
    let keep: Vec<i64> = items.iter().filter_map(|i| i.id).collect();

    sqlx::query("DELETE FROM connected_variant_attributes WHERE variant_id = $1 AND NOT (id = ANY($2))")
        .bind(variant_id)
        .bind(&keep)
        .execute(&mut *tx)
        .await?;

    for item in items {
        match item.id {
            Some(connected_id) => {
                let result = sqlx::query(
                    "UPDATE connected_variant_attributes SET connection_id = $3, value_id = $4 \
                     WHERE id = $1 AND variant_id = $2",
                )
                .bind(connected_id)
                .bind(variant_id)
                .bind(item.connection_id)
                .bind(item.value_id)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(DbError::MissingChild {
                        entity: "connected variant attribute",
                        id: connected_id,
                    });
                }
            }
            None => {
                sqlx::query(
                    "INSERT INTO connected_variant_attributes (variant_id, connection_id, value_id) \
                     VALUES ($1, $2, $3)",
                )
                .bind(variant_id)
                .bind(item.connection_id)
                .bind(item.value_id)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    Ok(())
}
