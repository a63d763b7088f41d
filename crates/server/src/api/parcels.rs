//! Parcel intake API handlers: photo measurement, confirmation, queries and deletion.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use parcelhub_core::{
    Allocation, AuditEvent, ConfirmParcelRequest, DispatchError, ImageUpload, Measurement,
    MeasurementError, Parcel, ParcelFilter, SizeClass,
};

use super::error::{
    bad_request, dispatch_error, error_response, measurement_error, ApiResult,
};
use super::middleware::AuthUser;
use crate::metrics::UPLOADS_TOTAL;
use crate::state::AppState;

/// Maximum allowed limit for parcel queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for parcel queries
const DEFAULT_LIMIT: i64 = 100;

/// Extension used when the uploaded file name carries none.
const DEFAULT_EXTENSION: &str = "jpg";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Draft returned after measuring a photo. Nothing is stored in the dispatch
/// database until the draft is confirmed.
#[derive(Debug, Serialize)]
pub struct MeasureResponse {
    pub image_name: String,
    pub image_url: String,
    pub measurement: Measurement,
    /// Size class the parcel would be routed to.
    pub size_class: SizeClass,
}

/// Request body for confirming a measured parcel
#[derive(Debug, Deserialize)]
pub struct ConfirmParcelBody {
    pub external_id: String,
    #[serde(default)]
    pub dimensions: String,
    pub weight: f64,
    pub volume: f64,
    pub delivery_address: String,
    /// Stored upload returned by the measure endpoint
    pub image_name: Option<String>,
}

/// Query parameters for listing parcels
#[derive(Debug, Deserialize)]
pub struct ListParcelsParams {
    /// Substring match on external id or delivery address
    pub search: Option<String>,
    pub batch_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListParcelsResponse {
    pub parcels: Vec<Parcel>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct BulkIdsBody {
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct DeleteParcelsResponse {
    pub deleted: Vec<Parcel>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Store an uploaded parcel photo and measure it.
pub async fn measure_parcel(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<MeasureResponse>> {
    state
        .dispatcher()
        .admin(&identity)
        .map_err(dispatch_error)?;

    let provider = state
        .measurement()
        .cloned()
        .ok_or_else(|| measurement_error(MeasurementError::NotConfigured))?;

    let mut upload: Option<(Option<String>, Option<String>, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(bad_request(format!("Invalid multipart body: {}", e))),
        };
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Failed to read image: {}", e)))?;
        upload = Some((file_name, content_type, bytes.to_vec()));
    }

    let Some((original_name, content_type, bytes)) = upload else {
        UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
        return Err(bad_request("Missing 'image' field"));
    };
    if bytes.is_empty() {
        UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
        return Err(bad_request("Uploaded image is empty"));
    }
    let max_bytes = state.uploads().max_bytes;
    if bytes.len() > max_bytes {
        UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
        return Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Image exceeds {} bytes", max_bytes),
        ));
    }

    let image_name = stored_image_name(original_name.as_deref());
    let upload_dir = state.uploads().dir.clone();
    let image_path = upload_dir.join(&image_name);
    store_upload(&upload_dir, &image_path, &bytes)
        .await
        .map_err(|e| {
            warn!(error = %e, path = ?image_path, "Failed to store upload");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to store image: {}", e),
            )
        })?;
    UPLOADS_TOTAL.with_label_values(&["stored"]).inc();
    debug!(image_name = %image_name, size = bytes.len(), "Upload stored");

    let image = ImageUpload {
        file_name: image_name.clone(),
        content_type,
        bytes,
    };
    let measurement = match provider.measure(&image).await {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, provider = provider.name(), "Measurement failed");
            // Orphaned upload
            if let Err(rm) = tokio::fs::remove_file(&image_path).await {
                warn!(error = %rm, path = ?image_path, "Failed to remove upload");
            }
            return Err(measurement_error(e));
        }
    };

    state.audit().try_emit(AuditEvent::ParcelMeasured {
        user_id: identity.user_id.clone(),
        image_name: image_name.clone(),
        external_id: measurement.external_id.clone(),
        volume: measurement.volume,
    });
    info!(
        image_name = %image_name,
        external_id = %measurement.external_id,
        volume = measurement.volume,
        "Parcel measured"
    );

    let size_class = state.dispatcher().config().classify(measurement.volume);
    Ok(Json(MeasureResponse {
        image_url: format!("/uploads/{}", image_name),
        image_name,
        measurement,
        size_class,
    }))
}

/// Confirm a parcel and allocate it to a batch
pub async fn confirm_parcel(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(body): Json<ConfirmParcelBody>,
) -> ApiResult<(StatusCode, Json<Allocation>)> {
    if let Some(ref name) = body.image_name {
        if !is_plain_file_name(name) {
            return Err(bad_request(format!("Invalid image name: {}", name)));
        }
    }

    let request = ConfirmParcelRequest {
        external_id: body.external_id,
        dimensions: body.dimensions,
        weight: body.weight,
        volume: body.volume,
        delivery_address: body.delivery_address,
        image_name: body.image_name,
        created_by: String::new(),
    };

    let allocation = state
        .dispatcher()
        .admin(&identity)
        .and_then(|ops| ops.confirm_parcel(request))
        .map_err(dispatch_error)?;

    Ok((StatusCode::CREATED, Json(allocation)))
}

/// List parcels with optional search and batch filter
pub async fn list_parcels(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParcelsParams>,
) -> ApiResult<Json<ListParcelsResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = ParcelFilter::new();
    if let Some(search) = params.search.filter(|s| !s.trim().is_empty()) {
        filter = filter.with_search(search.trim());
    }
    if let Some(batch_id) = params.batch_id {
        filter = filter.with_batch(batch_id);
    }

    let store = state.dispatcher().store();
    let total = store.count_parcels(&filter).map_err(dispatch_error)?;
    let parcels = store
        .list_parcels(&filter.with_limit(limit).with_offset(offset))
        .map_err(dispatch_error)?;

    Ok(Json(ListParcelsResponse {
        parcels,
        total,
        limit,
        offset,
    }))
}

pub async fn get_parcel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Parcel>> {
    state
        .dispatcher()
        .store()
        .get_parcel(id)
        .and_then(|p| p.ok_or_else(|| DispatchError::parcel_not_found(id)))
        .map(Json)
        .map_err(dispatch_error)
}

pub async fn delete_parcel(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteParcelsResponse>> {
    delete_many(&state, &identity, &[id])
}

/// Delete several parcels; fails as a whole if any id is unknown
pub async fn bulk_delete_parcels(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(body): Json<BulkIdsBody>,
) -> ApiResult<Json<DeleteParcelsResponse>> {
    if body.ids.is_empty() {
        return Err(bad_request("No parcel ids given"));
    }
    delete_many(&state, &identity, &body.ids)
}

fn delete_many(
    state: &AppState,
    identity: &parcelhub_core::Identity,
    ids: &[i64],
) -> ApiResult<Json<DeleteParcelsResponse>> {
    let deleted = state
        .dispatcher()
        .admin(identity)
        .and_then(|ops| ops.delete_parcels(ids))
        .map_err(dispatch_error)?;
    Ok(Json(DeleteParcelsResponse { deleted }))
}

// ============================================================================
// Upload naming
// ============================================================================

async fn store_upload(
    dir: &std::path::Path,
    path: &std::path::Path,
    bytes: &[u8],
) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, bytes).await
}

/// Fresh storage name for an upload, keeping a sanitized extension.
fn stored_image_name(original: Option<&str>) -> String {
    let extension = original
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    format!("{}.{}", uuid::Uuid::new_v4(), extension)
}

/// A bare file name with no directory components.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}
