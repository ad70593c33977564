//! Database operations for `product_templates` and the template-level
//! attribute junctions (`attribute_products`, `attribute_variants`).
//!
//! The junctions declare which attributes are applicable to products and
//! variants of a template; the chosen values per instance live in the
//! connected-attribute tables handled by the `products`/`variants` modules.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::{generate_unique_slug, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `product_templates` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductTemplateRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub has_variants: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from `attribute_products`, joined with the attribute name for
/// hyperlinked representations.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttributeProductRow {
    pub id: i64,
    pub attribute_id: i64,
    pub product_template_id: i64,
    pub attribute_name: String,
}

/// A row from `attribute_variants`, joined with the attribute name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttributeVariantRow {
    pub id: i64,
    pub attribute_id: i64,
    pub product_template_id: i64,
    pub attribute_name: String,
}

/// A submitted template-level junction. `id` present means "update that
/// junction row", absent means "insert".
#[derive(Debug, Clone)]
pub struct JunctionInput {
    pub id: Option<i64>,
    pub attribute_id: i64,
}

// ---------------------------------------------------------------------------
// Template queries
// ---------------------------------------------------------------------------

/// Returns all product templates, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_templates(pool: &PgPool) -> Result<Vec<ProductTemplateRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductTemplateRow>(
        "SELECT id, name, slug, has_variants, created_at, updated_at \
         FROM product_templates \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns a single product template by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_template(pool: &PgPool, id: i64) -> Result<Option<ProductTemplateRow>, DbError> {
    let row = sqlx::query_as::<_, ProductTemplateRow>(
        "SELECT id, name, slug, has_variants, created_at, updated_at \
         FROM product_templates \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Creates a template together with its product/variant attribute junctions,
/// in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails (including unique
/// violations on a duplicate (attribute, template) pair); nothing is
/// persisted in that case.
pub async fn create_template(
    pool: &PgPool,
    name: &str,
    has_variants: bool,
    product_attributes: &[JunctionInput],
    variant_attributes: &[JunctionInput],
) -> Result<ProductTemplateRow, DbError> {
    let mut tx = pool.begin().await?;

    let slug = generate_unique_slug(
        &mut tx,
        "SELECT EXISTS(SELECT 1 FROM product_templates WHERE slug = $1)",
    )
    .await?;

    let row = sqlx::query_as::<_, ProductTemplateRow>(
        "INSERT INTO product_templates (name, slug, has_variants) \
         VALUES ($1, $2, $3) \
         RETURNING id, name, slug, has_variants, created_at, updated_at",
    )
    .bind(name)
    .bind(&slug)
    .bind(has_variants)
    .fetch_one(&mut *tx)
    .await?;

    for item in product_attributes {
        sqlx::query(
            "INSERT INTO attribute_products (attribute_id, product_template_id) VALUES ($1, $2)",
        )
        .bind(item.attribute_id)
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    }

    for item in variant_attributes {
        sqlx::query(
            "INSERT INTO attribute_variants (attribute_id, product_template_id) VALUES ($1, $2)",
        )
        .bind(item.attribute_id)
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Updates a template and reconciles whichever junction lists were supplied.
/// Runs in one transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the template does not exist,
/// [`DbError::MissingChild`] if a submitted junction id does not belong to
/// this template, or [`DbError::Sqlx`] on other failures. Any error rolls
/// back the whole write.
pub async fn update_template(
    pool: &PgPool,
    id: i64,
    name: Option<&str>,
    has_variants: Option<bool>,
    product_attributes: Option<&[JunctionInput]>,
    variant_attributes: Option<&[JunctionInput]>,
) -> Result<ProductTemplateRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, ProductTemplateRow>(
        "UPDATE product_templates \
         SET name = COALESCE($2, name), \
             has_variants = COALESCE($3, has_variants), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING id, name, slug, has_variants, created_at, updated_at",
    )
    .bind(id)
    .bind(name)
    .bind(has_variants)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    if let Some(items) = product_attributes {
        reconcile_junctions(&mut tx, "attribute_products", id, items).await?;
    }
    if let Some(items) = variant_attributes {
        reconcile_junctions(&mut tx, "attribute_variants", id, items).await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Deletes a template; products, variants, and junction rows cascade.
/// Returns whether a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn delete_template(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM product_templates WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Junction queries
// ---------------------------------------------------------------------------

/// Returns the product-attribute junctions of a template, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_attribute_products(
    pool: &PgPool,
    template_id: i64,
) -> Result<Vec<AttributeProductRow>, DbError> {
    let rows = sqlx::query_as::<_, AttributeProductRow>(
        "SELECT ap.id, ap.attribute_id, ap.product_template_id, a.name AS attribute_name \
         FROM attribute_products ap \
         JOIN attributes a ON a.id = ap.attribute_id \
         WHERE ap.product_template_id = $1 \
         ORDER BY ap.id",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns the variant-attribute junctions of a template, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_attribute_variants(
    pool: &PgPool,
    template_id: i64,
) -> Result<Vec<AttributeVariantRow>, DbError> {
    let rows = sqlx::query_as::<_, AttributeVariantRow>(
        "SELECT av.id, av.attribute_id, av.product_template_id, a.name AS attribute_name \
         FROM attribute_variants av \
         JOIN attributes a ON a.id = av.attribute_id \
         WHERE av.product_template_id = $1 \
         ORDER BY av.id",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns a single product-attribute junction by id, or `None` if not found.
///
/// The API layer uses this to check that a connected product attribute's
/// connection belongs to the owning product's template.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_attribute_product(
    pool: &PgPool,
    id: i64,
) -> Result<Option<AttributeProductRow>, DbError> {
    let row = sqlx::query_as::<_, AttributeProductRow>(
        "SELECT ap.id, ap.attribute_id, ap.product_template_id, a.name AS attribute_name \
         FROM attribute_products ap \
         JOIN attributes a ON a.id = ap.attribute_id \
         WHERE ap.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Returns a single variant-attribute junction by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_attribute_variant(
    pool: &PgPool,
    id: i64,
) -> Result<Option<AttributeVariantRow>, DbError> {
    let row = sqlx::query_as::<_, AttributeVariantRow>(
        "SELECT av.id, av.attribute_id, av.product_template_id, a.name AS attribute_name \
         FROM attribute_variants av \
         JOIN attributes a ON a.id = av.attribute_id \
         WHERE av.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Reconcile one junction table against the submitted list for a template.
///
/// `table` is one of the two fixed junction table names; it is interpolated
/// into the statements because Postgres placeholders cannot name tables.
async fn reconcile_junctions(
    tx: &mut PgConnection,
    table: &'static str,
    template_id: i64,
    items: &[JunctionInput],
) -> Result<(), DbError> {
    let keep: Vec<i64> = items.iter().filter_map(|i| i.id).collect();

    sqlx::query(&format!(
        "DELETE FROM {table} WHERE product_template_id = $1 AND NOT (id = ANY($2))"
    ))
    .bind(template_id)
    .bind(&keep)
    .execute(&mut *tx)
    .await?;

    for item in items {
        match item.id {
            Some(junction_id) => {
                let result = sqlx::query(&format!(
                    "UPDATE {table} SET attribute_id = $3 \
                     WHERE id = $1 AND product_template_id = $2"
                ))
                .bind(junction_id)
                .bind(template_id)
                .bind(item.attribute_id)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(DbError::MissingChild {
                        entity: "attribute connection",
                        id: junction_id,
                    });
                }
            }
            None => {
                sqlx::query(&format!(
                    "INSERT INTO {table} (attribute_id, product_template_id) VALUES ($1, $2)"
                ))
                .bind(item.attribute_id)
                .bind(template_id)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    Ok(())
}
