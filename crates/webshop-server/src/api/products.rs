//! Product handlers: CRUD with two nested child lists — connected attribute
//! choices (`product_attributes`) and variants (`product_variants`) — both
//! reconciled against the persisted children on update.
//!
//! Cross-entity checks run before any write: a connection must belong to the
//! product's template, and a chosen value must belong to the connection's
//! attribute.

use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::attributes::attribute_url;
use super::templates::template_url;
use super::variants::variant_url;
use super::{map_db_error, money_error, ApiError, ApiResponse, AppState, ResponseMeta};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ConnectedAttributePayload {
    pub id: Option<i64>,
    pub connection_id: i64,
    pub value_id: i64,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct VariantPayload {
    pub id: Option<i64>,
    pub name: String,
    pub price_amount: Option<Decimal>,
    pub price_currency: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub product_template_id: i64,
    pub min_price_amount: Option<Decimal>,
    pub min_price_currency: Option<String>,
    pub active: Option<bool>,
    #[serde(default)]
    pub product_attributes: Vec<ConnectedAttributePayload>,
    #[serde(default)]
    pub product_variants: Vec<VariantPayload>,
}

// `product_template_id` is accepted here but ignored: the owning template is
// fixed at creation. Option<Option<T>> on description gives PATCH semantics
// (outer None = keep, Some(None) = clear).
#[allow(clippy::option_option)]
#[derive(Debug, Deserialize)]
pub(in crate::api) struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub product_template_id: Option<i64>,
    pub min_price_amount: Option<Decimal>,
    pub min_price_currency: Option<String>,
    pub active: Option<bool>,
    pub product_attributes: Option<Vec<ConnectedAttributePayload>>,
    pub product_variants: Option<Vec<VariantPayload>>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(in crate::api) struct ConnectedAttributeItem {
    pub id: i64,
    pub connection_id: i64,
    pub value_id: i64,
    pub attribute_id: i64,
    pub attribute: String,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct NestedVariantItem {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub slug: String,
    pub price_amount: Decimal,
    pub price_currency: String,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct ProductItem {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub product_template_id: i64,
    pub product_template: String,
    pub min_price_amount: Decimal,
    pub min_price_currency: String,
    pub active: bool,
    pub product_attributes: Vec<ConnectedAttributeItem>,
    pub product_variants: Vec<NestedVariantItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(in crate::api) fn product_url(id: i64) -> String {
    format!("/api/v1/products/{id}")
}

async fn product_item(
    pool: &sqlx::PgPool,
    rid: &str,
    row: webshop_db::ProductRow,
) -> Result<ProductItem, ApiError> {
    let product_attributes = webshop_db::list_connected_product_attributes(pool, row.id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .into_iter()
        .map(|c| ConnectedAttributeItem {
            id: c.id,
            connection_id: c.connection_id,
            value_id: c.value_id,
            attribute_id: c.attribute_id,
            attribute: attribute_url(c.attribute_id),
        })
        .collect();

    let product_variants = webshop_db::list_variants_by_product(pool, row.id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .into_iter()
        .map(|v| NestedVariantItem {
            id: v.id,
            url: variant_url(v.id),
            name: v.name,
            slug: v.slug,
            price_amount: v.price_amount.normalize(),
            price_currency: v.price_currency,
            active: v.active,
        })
        .collect();

    Ok(ProductItem {
        id: row.id,
        url: product_url(row.id),
        name: row.name,
        slug: row.slug,
        description: row.description,
        product_template_id: row.product_template_id,
        product_template: template_url(row.product_template_id),
        min_price_amount: row.min_price_amount.normalize(),
        min_price_currency: row.min_price_currency,
        active: row.active,
        product_attributes,
        product_variants,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_name(req_id: &str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() || value.chars().count() > 200 {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            "name must be 1-200 characters",
        ));
    }
    Ok(())
}

/// Check the submitted connected-attribute list against the owning template:
/// each connection must belong to `template_id` and each value to the
/// connection's attribute. Duplicate connections within one list are
/// rejected up front.
pub(in crate::api) async fn validate_product_connections(
    pool: &sqlx::PgPool,
    rid: &str,
    template_id: i64,
    payloads: &[ConnectedAttributePayload],
) -> Result<Vec<webshop_db::ConnectedAttributeInput>, ApiError> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::with_capacity(payloads.len());

    for payload in payloads {
        if !seen.insert(payload.connection_id) {
            return Err(ApiError::new(
                rid,
                "validation_error",
                format!("duplicate connection {} in request", payload.connection_id),
            ));
        }

        let connection = webshop_db::get_attribute_product(pool, payload.connection_id)
            .await
            .map_err(|e| map_db_error(rid.to_owned(), &e))?
            .ok_or_else(|| {
                ApiError::new(
                    rid,
                    "validation_error",
                    format!("connection {} does not exist", payload.connection_id),
                )
            })?;
        if connection.product_template_id != template_id {
            return Err(ApiError::new(
                rid,
                "validation_error",
                "ProductTemplate is not same.",
            ));
        }

        let value = webshop_db::get_attribute_value(pool, payload.value_id)
            .await
            .map_err(|e| map_db_error(rid.to_owned(), &e))?
            .ok_or_else(|| {
                ApiError::new(
                    rid,
                    "validation_error",
                    format!("attribute value {} does not exist", payload.value_id),
                )
            })?;
        if value.attribute_id != connection.attribute_id {
            return Err(ApiError::new(
                rid,
                "validation_error",
                "Attribute is not same.",
            ));
        }

        inputs.push(webshop_db::ConnectedAttributeInput {
            id: payload.id,
            connection_id: payload.connection_id,
            value_id: payload.value_id,
        });
    }

    Ok(inputs)
}

/// Validate price fields on each submitted variant and resolve currencies
/// (blank resolves to the configured default).
pub(in crate::api) fn validate_variant_payloads(
    rid: &str,
    payloads: &[VariantPayload],
    default_currency: &str,
) -> Result<Vec<webshop_db::VariantWrite>, ApiError> {
    let mut writes = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let name = payload.name.trim().to_owned();
        validate_name(rid, &name)?;
        if let Some(amount) = payload.price_amount {
            webshop_core::validate_amount(amount).map_err(|e| money_error(rid, &e))?;
        }
        let currency = payload
            .price_currency
            .as_deref()
            .map(|c| webshop_core::resolve_currency(Some(c), default_currency))
            .transpose()
            .map_err(|e| money_error(rid, &e))?;

        writes.push(webshop_db::VariantWrite {
            id: payload.id,
            name,
            set_price_amount: payload.price_amount,
            set_price_currency: currency,
            set_active: payload.active,
        });
    }
    Ok(writes)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ListProductsParams {
    pub active: Option<bool>,
}

/// GET /api/v1/products — list products with nested children.
///
/// Only active products are listed unless `?active=false` asks for the
/// inactive ones (the catalog has always hidden inactive products here).
pub(in crate::api) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<ListProductsParams>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let rid = &req_id.0;
    let active = params.active.unwrap_or(true);
    let rows = webshop_db::list_products(&state.pool, Some(active))
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(product_item(&state.pool, rid, row).await?);
    }

    Ok(Json(ApiResponse {
        data: items,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/products/:id — fetch one product.
pub(in crate::api) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let rid = &req_id.0;
    let row = webshop_db::get_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("product {id} not found")))?;

    let item = product_item(&state.pool, rid, row).await?;
    Ok(Json(ApiResponse {
        data: item,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/products — create a product with nested children.
pub(in crate::api) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductItem>>), ApiError> {
    let rid = &req_id.0;
    let name = body.name.trim().to_owned();
    validate_name(rid, &name)?;

    let template = webshop_db::get_template(&state.pool, body.product_template_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                rid,
                "validation_error",
                format!(
                    "product template {} does not exist",
                    body.product_template_id
                ),
            )
        })?;

    let min_price_amount = body.min_price_amount.unwrap_or(Decimal::ZERO);
    webshop_core::validate_amount(min_price_amount).map_err(|e| money_error(rid, &e))?;
    let min_price_currency = webshop_core::resolve_currency(
        body.min_price_currency.as_deref(),
        &state.default_currency,
    )
    .map_err(|e| money_error(rid, &e))?;

    let attributes =
        validate_product_connections(&state.pool, rid, template.id, &body.product_attributes)
            .await?;
    let variants =
        validate_variant_payloads(rid, &body.product_variants, &state.default_currency)?;

    let row = webshop_db::create_product(
        &state.pool,
        &webshop_db::NewProduct {
            name: &name,
            description: body.description.as_deref(),
            product_template_id: template.id,
            min_price_amount,
            min_price_currency: &min_price_currency,
            active: body.active.unwrap_or(false),
        },
        &attributes,
        &variants,
        &state.default_currency,
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let item = product_item(&state.pool, rid, row).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: item,
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// PUT /api/v1/products/:id — update a product, reconciling each submitted
/// child list. A submitted `product_template_id` is silently ignored.
pub(in crate::api) async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let rid = &req_id.0;

    let current = webshop_db::get_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("product {id} not found")))?;

    if let Some(template_id) = body.product_template_id {
        if template_id != current.product_template_id {
            tracing::debug!(product = id, "ignoring product_template change on update");
        }
    }

    let trimmed_name = body.name.as_ref().map(|n| n.trim().to_owned());
    if let Some(ref name) = trimmed_name {
        validate_name(rid, name)?;
    }
    if let Some(amount) = body.min_price_amount {
        webshop_core::validate_amount(amount).map_err(|e| money_error(rid, &e))?;
    }
    let min_price_currency = body
        .min_price_currency
        .as_deref()
        .map(|c| webshop_core::resolve_currency(Some(c), &state.default_currency))
        .transpose()
        .map_err(|e| money_error(rid, &e))?;

    let attributes = match body.product_attributes.as_deref() {
        Some(payloads) => Some(
            validate_product_connections(
                &state.pool,
                rid,
                current.product_template_id,
                payloads,
            )
            .await?,
        ),
        None => None,
    };
    let variants = body
        .product_variants
        .as_deref()
        .map(|payloads| validate_variant_payloads(rid, payloads, &state.default_currency))
        .transpose()?;

    let row = webshop_db::update_product(
        &state.pool,
        id,
        &webshop_db::ProductPatch {
            name: trimmed_name.as_deref(),
            description: body.description.as_ref().map(|opt| opt.as_deref()),
            set_min_price_amount: body.min_price_amount,
            set_min_price_currency: min_price_currency.as_deref(),
            active: body.active,
        },
        attributes.as_deref(),
        variants.as_deref(),
        &state.default_currency,
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let item = product_item(&state.pool, rid, row).await?;
    Ok(Json(ApiResponse {
        data: item,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/products/:id — delete a product; variants and connected
/// attributes cascade.
pub(in crate::api) async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let deleted = webshop_db::delete_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !deleted {
        return Err(ApiError::new(
            rid,
            "not_found",
            format!("product {id} not found"),
        ));
    }

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}
