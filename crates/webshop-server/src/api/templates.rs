//! Product-template handlers: CRUD with the nested `product_attributes` and
//! `variant_attributes` junction lists reconciled on update. A junction
//! declares that an attribute applies to products (or variants) built from
//! the template; the chosen values live on the product/variant side.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::attributes::attribute_url;
use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(in crate::api) struct JunctionPayload {
    pub id: Option<i64>,
    pub attribute_id: i64,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub has_variants: bool,
    #[serde(default)]
    pub product_attributes: Vec<JunctionPayload>,
    #[serde(default)]
    pub variant_attributes: Vec<JunctionPayload>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub has_variants: Option<bool>,
    pub product_attributes: Option<Vec<JunctionPayload>>,
    pub variant_attributes: Option<Vec<JunctionPayload>>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(in crate::api) struct JunctionItem {
    pub id: i64,
    pub attribute_id: i64,
    pub attribute: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct TemplateItem {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub slug: String,
    pub has_variants: bool,
    pub product_attributes: Vec<JunctionItem>,
    pub variant_attributes: Vec<JunctionItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(in crate::api) fn template_url(id: i64) -> String {
    format!("/api/v1/product-templates/{id}")
}

async fn template_item(
    pool: &sqlx::PgPool,
    rid: &str,
    row: webshop_db::ProductTemplateRow,
) -> Result<TemplateItem, ApiError> {
    let product_attributes = webshop_db::list_attribute_products(pool, row.id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .into_iter()
        .map(|j| JunctionItem {
            id: j.id,
            attribute_id: j.attribute_id,
            attribute: attribute_url(j.attribute_id),
            name: j.attribute_name,
        })
        .collect();

    let variant_attributes = webshop_db::list_attribute_variants(pool, row.id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .into_iter()
        .map(|j| JunctionItem {
            id: j.id,
            attribute_id: j.attribute_id,
            attribute: attribute_url(j.attribute_id),
            name: j.attribute_name,
        })
        .collect();

    Ok(TemplateItem {
        id: row.id,
        url: template_url(row.id),
        name: row.name,
        slug: row.slug,
        has_variants: row.has_variants,
        product_attributes,
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

/// Every referenced attribute must exist before the junction write starts.
async fn validate_junctions(
    pool: &sqlx::PgPool,
    rid: &str,
    payloads: &[JunctionPayload],
) -> Result<Vec<webshop_db::JunctionInput>, ApiError> {
    let mut inputs = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let exists = webshop_db::get_attribute(pool, payload.attribute_id)
            .await
            .map_err(|e| map_db_error(rid.to_owned(), &e))?
            .is_some();
        if !exists {
            return Err(ApiError::new(
                rid,
                "validation_error",
                format!("attribute {} does not exist", payload.attribute_id),
            ));
        }
        inputs.push(webshop_db::JunctionInput {
            id: payload.id,
            attribute_id: payload.attribute_id,
        });
    }
    Ok(inputs)
}

fn map_junction_conflict(rid: &str, e: &webshop_db::DbError) -> ApiError {
    if e.is_unique_violation() {
        return ApiError::new(
            rid,
            "conflict",
            "attribute is already connected to this template",
        );
    }
    map_db_error(rid.to_owned(), e)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/product-templates — list templates with their junctions.
pub(in crate::api) async fn list_templates(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<TemplateItem>>>, ApiError> {
    let rid = &req_id.0;
    let rows = webshop_db::list_templates(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(template_item(&state.pool, rid, row).await?);
    }

    Ok(Json(ApiResponse {
        data: items,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/product-templates/:id — fetch one template.
pub(in crate::api) async fn get_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<TemplateItem>>, ApiError> {
    let rid = &req_id.0;
    let row = webshop_db::get_template(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(rid, "not_found", format!("product template {id} not found"))
        })?;

    let item = template_item(&state.pool, rid, row).await?;
    Ok(Json(ApiResponse {
        data: item,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/product-templates — create a template with its junctions.
pub(in crate::api) async fn create_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TemplateItem>>), ApiError> {
    let rid = &req_id.0;
    let name = body.name.trim().to_owned();
    validate_name(rid, &name)?;

    let product_inputs = validate_junctions(&state.pool, rid, &body.product_attributes).await?;
    let variant_inputs = validate_junctions(&state.pool, rid, &body.variant_attributes).await?;

    let row = webshop_db::create_template(
        &state.pool,
        &name,
        body.has_variants,
        &product_inputs,
        &variant_inputs,
    )
    .await
    .map_err(|e| map_junction_conflict(rid, &e))?;

    let item = template_item(&state.pool, rid, row).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: item,
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// PUT /api/v1/product-templates/:id — update a template, reconciling each
/// junction list that is submitted.
pub(in crate::api) async fn update_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTemplateRequest>,
) -> Result<Json<ApiResponse<TemplateItem>>, ApiError> {
    let rid = &req_id.0;

    let trimmed_name = body.name.as_ref().map(|n| n.trim().to_owned());
    if let Some(ref name) = trimmed_name {
        validate_name(rid, name)?;
    }

    let product_inputs = match body.product_attributes.as_deref() {
        Some(payloads) => Some(validate_junctions(&state.pool, rid, payloads).await?),
        None => None,
    };
    let variant_inputs = match body.variant_attributes.as_deref() {
        Some(payloads) => Some(validate_junctions(&state.pool, rid, payloads).await?),
        None => None,
    };

    let row = webshop_db::update_template(
        &state.pool,
        id,
        trimmed_name.as_deref(),
        body.has_variants,
        product_inputs.as_deref(),
        variant_inputs.as_deref(),
    )
    .await
    .map_err(|e| map_junction_conflict(rid, &e))?;

    let item = template_item(&state.pool, rid, row).await?;
    Ok(Json(ApiResponse {
        data: item,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/product-templates/:id — delete a template; products and
/// junctions cascade.
pub(in crate::api) async fn delete_template(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let deleted = webshop_db::delete_template(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !deleted {
        return Err(ApiError::new(
            rid,
            "not_found",
            format!("product template {id} not found"),
        ));
    }

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}
