//! Attribute handlers: CRUD with the nested `values` list reconciled against
//! `attribute_values` on update.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ValuePayload {
    pub id: Option<i64>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateAttributeRequest {
    pub name: String,
    #[serde(default)]
    pub values: Vec<ValuePayload>,
}

// Absent `values` leaves the persisted set untouched; a present list (even an
// empty one) is reconciled exactly.
#[derive(Debug, Deserialize)]
pub(in crate::api) struct UpdateAttributeRequest {
    pub name: Option<String>,
    pub values: Option<Vec<ValuePayload>>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(in crate::api) struct AttributeValueItem {
    pub id: i64,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct AttributeItem {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub slug: String,
    pub values: Vec<AttributeValueItem>,
}

pub(in crate::api) fn attribute_url(id: i64) -> String {
    format!("/api/v1/attributes/{id}")
}

async fn attribute_item(
    pool: &sqlx::PgPool,
    rid: &str,
    row: webshop_db::AttributeRow,
) -> Result<AttributeItem, ApiError> {
    let values = webshop_db::list_attribute_values(pool, row.id)
        .await
        .map_err(|e| map_db_error(rid.to_owned(), &e))?
        .into_iter()
        .map(|v| AttributeValueItem {
            id: v.id,
            name: v.name,
            value: v.value,
        })
        .collect();

    Ok(AttributeItem {
        id: row.id,
        url: attribute_url(row.id),
        name: row.name,
        slug: row.slug,
        values,
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

fn to_value_inputs(payloads: &[ValuePayload]) -> Vec<webshop_db::ValueInput> {
    payloads
        .iter()
        .map(|p| webshop_db::ValueInput {
            id: p.id,
            name: p.name.clone(),
            value: p.value.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/attributes — list attributes with their values.
pub(in crate::api) async fn list_attributes(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<AttributeItem>>>, ApiError> {
    let rid = &req_id.0;
    let rows = webshop_db::list_attributes(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(attribute_item(&state.pool, rid, row).await?);
    }

    Ok(Json(ApiResponse {
        data: items,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/attributes/:id — fetch one attribute.
pub(in crate::api) async fn get_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AttributeItem>>, ApiError> {
    let rid = &req_id.0;
    let row = webshop_db::get_attribute(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("attribute {id} not found")))?;

    let item = attribute_item(&state.pool, rid, row).await?;
    Ok(Json(ApiResponse {
        data: item,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/attributes — create an attribute with initial values.
pub(in crate::api) async fn create_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateAttributeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AttributeItem>>), ApiError> {
    let rid = &req_id.0;
    let name = body.name.trim().to_owned();
    validate_name(rid, &name)?;

    let inputs = to_value_inputs(&body.values);
    let row = webshop_db::create_attribute(&state.pool, &name, &inputs)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let item = attribute_item(&state.pool, rid, row).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: item,
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// PUT /api/v1/attributes/:id — update an attribute, reconciling its values
/// when a `values` list is submitted.
pub(in crate::api) async fn update_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAttributeRequest>,
) -> Result<Json<ApiResponse<AttributeItem>>, ApiError> {
    let rid = &req_id.0;

    let trimmed_name = body.name.as_ref().map(|n| n.trim().to_owned());
    if let Some(ref name) = trimmed_name {
        validate_name(rid, name)?;
    }

    let inputs = body.values.as_deref().map(to_value_inputs);
    let row = webshop_db::update_attribute(
        &state.pool,
        id,
        trimmed_name.as_deref(),
        inputs.as_deref(),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let item = attribute_item(&state.pool, rid, row).await?;
    Ok(Json(ApiResponse {
        data: item,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/attributes/:id — delete an attribute and cascade its values.
pub(in crate::api) async fn delete_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let deleted = webshop_db::delete_attribute(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !deleted {
        return Err(ApiError::new(
            rid,
            "not_found",
            format!("attribute {id} not found"),
        ));
    }

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}
