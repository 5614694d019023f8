use super::certificates::models as certificates;
use super::certificates::models::{Certificate, CertificateType, ServiceMethod};
use super::models::{Trainee, router as crudrouter};
use crate::common::auth::Role;
use crate::common::state::AppState;
use crate::services::import::cells::TypeClassification;
use crate::services::import::cleanup::{CleanupReport, cleanup_duplicates};
use crate::services::import_service::{ImportReport, ImportService};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum_keycloak_auth::{PassthroughMode, layer::KeycloakAuthLayer};
use chrono::{DateTime, Utc};
use crudcrate::CRUDResource;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, ModelTrait, PaginatorTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

pub fn router(state: &AppState) -> OpenApiRouter {
    let mut mutating_router = crudrouter(&state.db.clone());

    mutating_router = mutating_router
        .route("/import", post(import_excel).with_state(state.clone()))
        .route("/cleanup", post(cleanup).with_state(state.clone()))
        .route("/stats", get(get_stats).with_state(state.clone()))
        .route("/all", delete(delete_all).with_state(state.clone()))
        .route(
            "/{id}/certificates",
            post(add_certificate).with_state(state.clone()),
        )
        .route(
            "/{id}/certificates/{certificate_id}",
            get(get_certificate)
                .put(update_certificate)
                .delete(delete_certificate)
                .with_state(state.clone()),
        );

    if let Some(instance) = state.keycloak_auth_instance.clone() {
        mutating_router = mutating_router.layer(
            KeycloakAuthLayer::<Role>::builder()
                .instance(instance)
                .passthrough_mode(PassthroughMode::Block)
                .persist_raw_claims(false)
                .expected_audiences(vec![String::from("account")])
                .required_roles(vec![Role::Administrator])
                .build(),
        );
    } else if !state.config.tests_running {
        println!(
            "Warning: Mutating routes of {} router are not protected",
            Trainee::RESOURCE_NAME_PLURAL
        );
    }

    mutating_router
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CertificatePayload {
    pub service_method: ServiceMethod,
    pub certificate_type: CertificateType,
    pub expiry_date: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CertificateUpdatePayload {
    pub certificate_type: Option<CertificateType>,
    pub expiry_date: Option<DateTime<Utc>>,
}

type ApiError = (StatusCode, Json<Value>);

fn db_error(err: sea_orm::DbErr) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": format!("Database error: {err}")})),
    )
}

async fn find_trainee(state: &AppState, id: Uuid) -> Result<super::models::Model, ApiError> {
    super::models::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Trainee not found"})),
            )
        })
}

/// Upload a certificate workbook and reconcile it into the registry
#[utoipa::path(
    post,
    path = "/trainees/import",
    request_body(content = String, description = "Excel file as multipart/form-data", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Import finished; row-level problems are in the report", body = ImportReport),
        (status = 400, description = "Missing or unreadable file"),
        (status = 500, description = "Internal server error")
    ),
    tag = "trainees"
)]
pub async fn import_excel(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportReport>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Multipart error: {e}")})),
        )
    })? {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name == "excel_file" || field_name == "file" {
            file_name = field.file_name().map(std::string::ToString::to_string);
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| {
                        (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": format!("Failed to read file data: {e}")})),
                        )
                    })?
                    .to_vec(),
            );
            break;
        }
    }

    let file_data = file_data.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No Excel file found in request"})),
        )
    })?;

    let file_name = file_name.unwrap_or_else(|| "uploaded_file.xlsx".to_string());
    let is_excel = std::path::Path::new(&file_name)
        .extension()
        .is_some_and(|ext| {
            ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls")
        });
    if !is_excel {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "File must be an Excel file (.xlsx or .xls)"})),
        ));
    }

    let report = ImportService::new(&state.db)
        .import_excel(file_data, TypeClassification::Fuzzy)
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("Excel processing error: {e}")})),
            )
        })?;

    Ok(Json(report))
}

/// Merge or rename trainees whose serials carry a 6-digit duplicate suffix
#[utoipa::path(
    post,
    path = "/trainees/cleanup",
    responses(
        (status = 200, description = "Cleanup finished", body = CleanupReport),
        (status = 500, description = "Internal server error")
    ),
    tag = "trainees"
)]
pub async fn cleanup(State(state): State<AppState>) -> Result<Json<CleanupReport>, ApiError> {
    let report = cleanup_duplicates(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Cleanup error: {e:#}")})),
        )
    })?;
    Ok(Json(report))
}

/// Registry statistics by method, type, and expiry state
#[utoipa::path(
    get,
    path = "/trainees/stats",
    responses(
        (status = 200, description = "Aggregate statistics"),
        (status = 500, description = "Internal server error")
    ),
    tag = "trainees"
)]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let total_trainees = super::models::Entity::find()
        .count(&state.db)
        .await
        .map_err(db_error)?;

    let all_certificates = certificates::Entity::find()
        .all(&state.db)
        .await
        .map_err(db_error)?;

    let now = Utc::now();
    let mut by_method = serde_json::Map::new();
    for method in ServiceMethod::ALL {
        let count = all_certificates
            .iter()
            .filter(|c| c.service_method == method)
            .count();
        by_method.insert(method.code().to_string(), json!(count));
    }

    let initial = all_certificates
        .iter()
        .filter(|c| c.certificate_type == CertificateType::Initial)
        .count();
    let expired = all_certificates.iter().filter(|c| c.is_expired(now)).count();

    Ok(Json(json!({
        "totalTrainees": total_trainees,
        "totalCertificates": all_certificates.len(),
        "byMethod": by_method,
        "byType": {
            "initial": initial,
            "recertificate": all_certificates.len() - initial,
        },
        "expired": expired,
        "active": all_certificates.len() - expired,
    })))
}

/// Delete every trainee and certificate
#[utoipa::path(
    delete,
    path = "/trainees/all",
    responses(
        (status = 200, description = "Registry emptied"),
        (status = 500, description = "Internal server error")
    ),
    tag = "trainees"
)]
pub async fn delete_all(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let deleted_certificates = certificates::Entity::delete_many()
        .exec(&state.db)
        .await
        .map_err(db_error)?;
    let deleted_trainees = super::models::Entity::delete_many()
        .exec(&state.db)
        .await
        .map_err(db_error)?;

    Ok(Json(json!({
        "message": "All trainees deleted",
        "deletedTrainees": deleted_trainees.rows_affected,
        "deletedCertificates": deleted_certificates.rows_affected,
    })))
}

/// Add a certificate to a trainee
#[utoipa::path(
    post,
    path = "/trainees/{id}/certificates",
    params(("id" = Uuid, Path, description = "Trainee ID")),
    request_body = CertificatePayload,
    responses(
        (status = 201, description = "Certificate created", body = Certificate),
        (status = 404, description = "Trainee not found"),
        (status = 409, description = "Trainee already holds a certificate for this method"),
        (status = 500, description = "Internal server error")
    ),
    tag = "trainees"
)]
pub async fn add_certificate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CertificatePayload>,
) -> Result<(StatusCode, Json<Certificate>), ApiError> {
    let trainee = find_trainee(&state, id).await?;

    let conflict = certificates::Entity::find()
        .filter(certificates::Column::TraineeId.eq(trainee.id))
        .filter(certificates::Column::ServiceMethod.eq(payload.service_method))
        .one(&state.db)
        .await
        .map_err(db_error)?;
    if conflict.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!(
                    "Trainee already holds a {} certificate",
                    payload.service_method.code()
                )
            })),
        ));
    }

    let now = Utc::now();
    let model = certificates::ActiveModel {
        id: Set(Uuid::new_v4()),
        trainee_id: Set(trainee.id),
        service_method: Set(payload.service_method),
        certificate_type: Set(payload.certificate_type),
        expiry_date: Set(payload.expiry_date),
        created_at: Set(now),
        last_updated: Set(now),
    }
    .insert(&state.db)
    .await
    .map_err(db_error)?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

/// Get one certificate of a trainee
#[utoipa::path(
    get,
    path = "/trainees/{id}/certificates/{certificate_id}",
    params(
        ("id" = Uuid, Path, description = "Trainee ID"),
        ("certificate_id" = Uuid, Path, description = "Certificate ID")
    ),
    responses(
        (status = 200, description = "Certificate", body = Certificate),
        (status = 404, description = "Not found")
    ),
    tag = "trainees"
)]
pub async fn get_certificate(
    Path((id, certificate_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<Certificate>, ApiError> {
    let certificate = find_certificate(&state, id, certificate_id).await?;
    Ok(Json(certificate.into()))
}

/// Update a certificate's type or expiry date
#[utoipa::path(
    put,
    path = "/trainees/{id}/certificates/{certificate_id}",
    params(
        ("id" = Uuid, Path, description = "Trainee ID"),
        ("certificate_id" = Uuid, Path, description = "Certificate ID")
    ),
    request_body = CertificateUpdatePayload,
    responses(
        (status = 200, description = "Updated certificate", body = Certificate),
        (status = 404, description = "Not found")
    ),
    tag = "trainees"
)]
pub async fn update_certificate(
    Path((id, certificate_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    Json(payload): Json<CertificateUpdatePayload>,
) -> Result<Json<Certificate>, ApiError> {
    let certificate = find_certificate(&state, id, certificate_id).await?;

    let mut active = certificate.into_active_model();
    if let Some(certificate_type) = payload.certificate_type {
        active.certificate_type = Set(certificate_type);
    }
    if let Some(expiry_date) = payload.expiry_date {
        active.expiry_date = Set(expiry_date);
    }
    active.last_updated = Set(Utc::now());

    let updated = active.update(&state.db).await.map_err(db_error)?;
    Ok(Json(updated.into()))
}

/// Delete one certificate of a trainee
#[utoipa::path(
    delete,
    path = "/trainees/{id}/certificates/{certificate_id}",
    params(
        ("id" = Uuid, Path, description = "Trainee ID"),
        ("certificate_id" = Uuid, Path, description = "Certificate ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "trainees"
)]
pub async fn delete_certificate(
    Path((id, certificate_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let certificate = find_certificate(&state, id, certificate_id).await?;
    certificate.delete(&state.db).await.map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn find_certificate(
    state: &AppState,
    trainee_id: Uuid,
    certificate_id: Uuid,
) -> Result<certificates::Model, ApiError> {
    certificates::Entity::find_by_id(certificate_id)
        .filter(certificates::Column::TraineeId.eq(trainee_id))
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Certificate not found"})),
            )
        })
}
