//! Database operations for `products` and `connected_product_attributes`.
//!
//! Product writes can carry two nested child lists: the connected attribute
//! choices and the product's variants. Both are reconciled against the
//! persisted children inside the same transaction as the parent row, so a
//! failed child write never leaves a half-applied product behind.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use crate::variants::{insert_variant, update_variant_of_product, VariantWrite};
use crate::{generate_unique_slug, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub product_template_id: i64,
    pub min_price_amount: Decimal,
    pub min_price_currency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from `connected_product_attributes`, joined with the connection's
/// attribute id for hyperlinked representations.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConnectedProductAttributeRow {
    pub id: i64,
    pub product_id: i64,
    pub connection_id: i64,
    pub value_id: i64,
    pub attribute_id: i64,
}

/// A submitted connected-attribute choice. `id` present means "update that
/// row", absent means "insert". Validity of the (connection, value) pair is
/// checked by the API layer before the write reaches this module.
#[derive(Debug, Clone, Copy)]
pub struct ConnectedAttributeInput {
    pub id: Option<i64>,
    pub connection_id: i64,
    pub value_id: i64,
}

/// Fields for a product insert, with price fields already validated and the
/// currency already resolved by the caller.
#[derive(Debug, Clone, Copy)]
pub struct NewProduct<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub product_template_id: i64,
    pub min_price_amount: Decimal,
    pub min_price_currency: &'a str,
    pub active: bool,
}

/// Overlay fields for a product update. `None` keeps the current value;
/// `description` distinguishes "not submitted" from "set to NULL". The
/// owning template is fixed at creation and has no field here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductPatch<'a> {
    pub name: Option<&'a str>,
    pub description: Option<Option<&'a str>>,
    pub set_min_price_amount: Option<Decimal>,
    pub set_min_price_currency: Option<&'a str>,
    pub active: Option<bool>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

const PRODUCT_COLUMNS: &str = "id, name, slug, description, product_template_id, \
     min_price_amount, min_price_currency, active, created_at, updated_at";

/// Returns products ordered by id, optionally filtered by `active` state.
/// `None` returns every row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    active: Option<bool>,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE $1::BOOL IS NULL OR active = $1 \
         ORDER BY id"
    ))
    .bind(active)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns a single product by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, id: i64) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Returns the connected attributes of a product, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_connected_product_attributes(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<ConnectedProductAttributeRow>, DbError> {
    let rows = sqlx::query_as::<_, ConnectedProductAttributeRow>(
        "SELECT cpa.id, cpa.product_id, cpa.connection_id, cpa.value_id, ap.attribute_id \
         FROM connected_product_attributes cpa \
         JOIN attribute_products ap ON ap.id = cpa.connection_id \
         WHERE cpa.product_id = $1 \
         ORDER BY cpa.id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Creates a product together with its connected attributes and variants, in
/// one transaction. Ids on the submitted children are ignored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is persisted in
/// that case.
pub async fn create_product(
    pool: &PgPool,
    new: &NewProduct<'_>,
    attributes: &[ConnectedAttributeInput],
    variants: &[VariantWrite],
    default_currency: &str,
) -> Result<ProductRow, DbError> {
    let mut tx = pool.begin().await?;

    let slug = generate_unique_slug(
        &mut tx,
        "SELECT EXISTS(SELECT 1 FROM products WHERE slug = $1)",
    )
    .await?;

    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "INSERT INTO products \
             (name, slug, description, product_template_id, \
              min_price_amount, min_price_currency, active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(new.name)
    .bind(&slug)
    .bind(new.description)
    .bind(new.product_template_id)
    .bind(new.min_price_amount)
    .bind(new.min_price_currency)
    .bind(new.active)
    .fetch_one(&mut *tx)
    .await?;

    for item in attributes {
        sqlx::query(
            "INSERT INTO connected_product_attributes (product_id, connection_id, value_id) \
             VALUES ($1, $2, $3)",
        )
        .bind(row.id)
        .bind(item.connection_id)
        .bind(item.value_id)
        .execute(&mut *tx)
        .await?;
    }

    for write in variants {
        insert_variant(&mut tx, row.id, write, default_currency).await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Updates a product and reconciles whichever child lists were supplied:
/// persisted children absent from a submitted list are deleted, children
/// with ids are updated in place, and the rest are inserted. Runs in one
/// transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist,
/// [`DbError::MissingChild`] if a submitted child id does not belong to this
/// product, or [`DbError::Sqlx`] on other failures. Any error rolls back the
/// whole write.
pub async fn update_product(
    pool: &PgPool,
    id: i64,
    patch: &ProductPatch<'_>,
    attributes: Option<&[ConnectedAttributeInput]>,
    variants: Option<&[VariantWrite]>,
    default_currency: &str,
) -> Result<ProductRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products \
         SET name = COALESCE($2, name), \
             description = CASE WHEN $3::BOOL THEN $4 ELSE description END, \
             min_price_amount = COALESCE($5, min_price_amount), \
             min_price_currency = COALESCE($6, min_price_currency), \
             active = COALESCE($7, active), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(id)
    .bind(patch.name)
    .bind(patch.description.is_some())
    .bind(patch.description.flatten())
    .bind(patch.set_min_price_amount)
    .bind(patch.set_min_price_currency)
    .bind(patch.active)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    if let Some(items) = attributes {
        reconcile_connected_attributes(&mut tx, id, items).await?;
    }
    if let Some(writes) = variants {
        reconcile_variants(&mut tx, id, writes, default_currency).await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Deletes a product; variants and connected attributes cascade. Returns
/// whether a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn delete_product(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Child reconciliation
// ---------------------------------------------------------------------------

async fn reconcile_connected_attributes(
    tx: &mut PgConnection,
    product_id: i64,
    items: &[ConnectedAttributeInput],
) -> Result<(), DbError> {
    let keep: Vec<i64> = items.iter().filter_map(|i| i.id).collect();

    sqlx::query("DELETE FROM connected_product_attributes WHERE product_id = $1 AND NOT (id = ANY($2))")
        .bind(product_id)
        .bind(&keep)
        .execute(&mut *tx)
        .await?;

    for item in items {
        match item.id {
            Some(connected_id) => {
                let result = sqlx::query(
                    "UPDATE connected_product_attributes SET connection_id = $3, value_id = $4 \
                     WHERE id = $1 AND product_id = $2",
                )
                .bind(connected_id)
                .bind(product_id)
                .bind(item.connection_id)
                .bind(item.value_id)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(DbError::MissingChild {
                        entity: "connected product attribute",
                        id: connected_id,
                    });
                }
            }
            None => {
                sqlx::query(
                    "INSERT INTO connected_product_attributes (product_id, connection_id, value_id) \
                     VALUES ($1, $2, $3)",
                )
                .bind(product_id)
                .bind(item.connection_id)
                .bind(item.value_id)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    Ok(())
}

async fn reconcile_variants(
    tx: &mut PgConnection,
    product_id: i64,
    writes: &[VariantWrite],
    default_currency: &str,
) -> Result<(), DbError> {
    let keep: Vec<i64> = writes.iter().filter_map(|w| w.id).collect();

    sqlx::query("DELETE FROM product_variants WHERE product_id = $1 AND NOT (id = ANY($2))")
        .bind(product_id)
        .bind(&keep)
        .execute(&mut *tx)
        .await?;

    for write in writes {
        match write.id {
            Some(variant_id) => {
                update_variant_of_product(&mut *tx, variant_id, product_id, write).await?;
            }
            None => {
                insert_variant(&mut *tx, product_id, write, default_currency).await?;
            }
        }
    }

    Ok(())
}
