//! Product-variant handlers: CRUD with the nested `variant_attributes` list
//! reconciled against `connected_variant_attributes`. The owning product is
//! fixed at creation; submitting a different `product_id` on update is a
//! validation error.

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::attributes::attribute_url;
use super::products::{product_url, ConnectedAttributeItem, ConnectedAttributePayload};
use super::{map_db_error, money_error, ApiError, ApiResponse, AppState, ResponseMeta};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateVariantRequest {
    pub name: String,
    pub product_id: i64,
    pub price_amount: Option<Decimal>,
    pub price_currency: Option<String>,
    pub active: Option<bool>,
    #[serde(default)]
    pub variant_attributes: Vec<ConnectedAttributePayload>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct UpdateVariantRequest {
    pub name: Option<String>,
    pub product_id: Option<i64>,
    pub price_amount: Option<Decimal>,
    pub price_currency: Option<String>,
    pub active: Option<bool>,
    pub variant_attributes: Option<Vec<ConnectedAttributePayload>>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(in crate::api) struct VariantItem {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub slug: String,
    pub product_id: i64,
    pub product: String,
    pub price_amount: Decimal,
    pub price_currency: String,
    pub active: bool,
    pub variant_attributes: Vec<ConnectedAttributeItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(in crate::api) fn variant_url(id: i64) -> String {
    format!("/api/v1/product-variants/{id}")
}

async fn variant_item(
    pool: &sqlx::PgPool,
    rid: &str,
    row: webshop_db::VariantRow,
) -> Result<VariantItem, ApiError> {
    let variant_attributes = webshop_db::list_connected_variant_attributes(pool, row.id)
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

    Ok(VariantItem {
        id: row.id,
        url: variant_url(row.id),
        name: row.name,
        slug: row.slug,
        product_id: row.product_id,
        product: product_url(row.product_id),
        price_amount: row.price_amount.normalize(),
        price_currency: row.price_currency,
        active: row.active,
        variant_attributes,
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

/// Check the submitted connected-attribute list against the owning product's
/// template: each connection must be a variant-attribute junction of that
/// template, and each value must belong to the connection's attribute.
async fn validate_variant_connections(
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

        let connection = webshop_db::get_attribute_variant(pool, payload.connection_id)
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

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/product-variants — list variants with their connected
/// attributes.
pub(in crate::api) async fn list_variants(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<VariantItem>>>, ApiError> {
    let rid = &req_id.0;
    let rows = webshop_db::list_variants(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(variant_item(&state.pool, rid, row).await?);
    }

    Ok(Json(ApiResponse {
        data: items,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/product-variants/:id — fetch one variant.
pub(in crate::api) async fn get_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<VariantItem>>, ApiError> {
    let rid = &req_id.0;
    let row = webshop_db::get_variant(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("variant {id} not found")))?;

    let item = variant_item(&state.pool, rid, row).await?;
    Ok(Json(ApiResponse {
        data: item,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/product-variants — create a variant under an existing product.
pub(in crate::api) async fn create_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateVariantRequest>,
) -> Result<(StatusCode, Json<ApiResponse<VariantItem>>), ApiError> {
    let rid = &req_id.0;
    let name = body.name.trim().to_owned();
    validate_name(rid, &name)?;

    let product = webshop_db::get_product(&state.pool, body.product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                rid,
                "validation_error",
                format!("product {} does not exist", body.product_id),
            )
        })?;

    if let Some(amount) = body.price_amount {
        webshop_core::validate_amount(amount).map_err(|e| money_error(rid, &e))?;
    }
    let currency = body
        .price_currency
        .as_deref()
        .map(|c| webshop_core::resolve_currency(Some(c), &state.default_currency))
        .transpose()
        .map_err(|e| money_error(rid, &e))?;

    let attributes = validate_variant_connections(
        &state.pool,
        rid,
        product.product_template_id,
        &body.variant_attributes,
    )
    .await?;

    let row = webshop_db::create_variant(
        &state.pool,
        product.id,
        &webshop_db::VariantWrite {
            id: None,
            name,
            set_price_amount: body.price_amount,
            set_price_currency: currency,
            set_active: body.active,
        },
        &attributes,
        &state.default_currency,
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let item = variant_item(&state.pool, rid, row).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: item,
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// PUT /api/v1/product-variants/:id — update a variant, reconciling its
/// connected attributes when a list is submitted.
pub(in crate::api) async fn update_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateVariantRequest>,
) -> Result<Json<ApiResponse<VariantItem>>, ApiError> {
    let rid = &req_id.0;

    let current = webshop_db::get_variant(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("variant {id} not found")))?;

    if let Some(product_id) = body.product_id {
        if product_id != current.product_id {
            return Err(ApiError::new(
                rid,
                "validation_error",
                "product cannot be changed after creation",
            ));
        }
    }

    let trimmed_name = body.name.as_ref().map(|n| n.trim().to_owned());
    if let Some(ref name) = trimmed_name {
        validate_name(rid, name)?;
    }
    if let Some(amount) = body.price_amount {
        webshop_core::validate_amount(amount).map_err(|e| money_error(rid, &e))?;
    }
    let currency = body
        .price_currency
        .as_deref()
        .map(|c| webshop_core::resolve_currency(Some(c), &state.default_currency))
        .transpose()
        .map_err(|e| money_error(rid, &e))?;

    let attributes = match body.variant_attributes.as_deref() {
        Some(payloads) => {
            let product = webshop_db::get_product(&state.pool, current.product_id)
                .await
                .map_err(|e| map_db_error(rid.clone(), &e))?
                .ok_or_else(|| {
                    ApiError::new(rid, "not_found", format!("product {} not found", current.product_id))
                })?;
            Some(
                validate_variant_connections(
                    &state.pool,
                    rid,
                    product.product_template_id,
                    payloads,
                )
                .await?,
            )
        }
        None => None,
    };

    let row = webshop_db::update_variant(
        &state.pool,
        id,
        trimmed_name.as_deref(),
        body.price_amount,
        currency.as_deref(),
        body.active,
        attributes.as_deref(),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let item = variant_item(&state.pool, rid, row).await?;
    Ok(Json(ApiResponse {
        data: item,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/product-variants/:id — delete a variant; connected
/// attributes cascade.
pub(in crate::api) async fn delete_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let deleted = webshop_db::delete_variant(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !deleted {
        return Err(ApiError::new(
            rid,
            "not_found",
            format!("variant {id} not found"),
        ));
    }

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}
