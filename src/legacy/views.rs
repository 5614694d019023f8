use super::models::{
    LegacyCertificate, LegacyCertificateCreate, LegacyCertificateUpdate, ListQuery, PagedResult,
    SearchQuery, split_method_suffix,
};
use crate::common::auth::Role;
use crate::common::state::AppState;
use crate::services::import::cells::TypeClassification;
use crate::services::import_service::{ImportReport, ImportService};
use crate::trainees::certificates::models as certificates;
use crate::trainees::models as trainees;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum_keycloak_auth::{PassthroughMode, layer::KeycloakAuthLayer};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, ModelTrait, QueryFilter, Set,
};
use serde_json::{Value, json};
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

pub fn router(state: &AppState) -> OpenApiRouter {
    let mut legacy_router = OpenApiRouter::new()
        .route("/", get(list_certificates).post(create_certificate))
        .route("/search", get(search_certificates))
        .route("/import", post(import_excel))
        .route(
            "/{id}",
            get(get_certificate)
                .put(update_certificate)
                .delete(delete_certificate),
        )
        .with_state(state.clone());

    if let Some(instance) = state.keycloak_auth_instance.clone() {
        legacy_router = legacy_router.layer(
            KeycloakAuthLayer::<Role>::builder()
                .instance(instance)
                .passthrough_mode(PassthroughMode::Block)
                .persist_raw_claims(false)
                .expected_audiences(vec![String::from("account")])
                .required_roles(vec![Role::Administrator])
                .build(),
        );
    } else if !state.config.tests_running {
        println!("Warning: Mutating routes of legacy certificates router are not protected");
    }

    legacy_router
}

type ApiError = (StatusCode, Json<Value>);

fn db_error(err: sea_orm::DbErr) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": format!("Database error: {err}")})),
    )
}

/// Every (trainee, certificate) pair as a flat legacy record.
async fn flatten_all(state: &AppState) -> Result<Vec<LegacyCertificate>, ApiError> {
    let pairs = trainees::Entity::find()
        .find_with_related(certificates::Entity)
        .all(&state.db)
        .await
        .map_err(db_error)?;

    let mut records = Vec::new();
    for (trainee, certs) in pairs {
        for certificate in certs {
            records.push(LegacyCertificate::from_pair(&trainee, &certificate));
        }
    }
    records.sort_by(|a, b| a.serial_number.cmp(&b.serial_number));
    Ok(records)
}

/// List flattened certificate records
#[utoipa::path(
    get,
    path = "/",
    params(
        ("page" = Option<u64>, Query, description = "1-based page number"),
        ("page_size" = Option<u64>, Query, description = "Records per page, max 500")
    ),
    responses((status = 200, description = "Paged legacy records", body = PagedResult<LegacyCertificate>)),
    tag = "legacy"
)]
pub async fn list_certificates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PagedResult<LegacyCertificate>>, ApiError> {
    let all = flatten_all(&state).await?;
    Ok(Json(PagedResult::paginate(
        all,
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(50),
    )))
}

/// Search flattened records by serial, name, or method
#[utoipa::path(
    get,
    path = "/search",
    params(
        ("serial_number" = Option<String>, Query, description = "Serial, optionally with a method suffix like 1001-VT"),
        ("name" = Option<String>, Query, description = "Person name substring"),
        ("method" = Option<String>, Query, description = "Method code (VT, PT, MT, RT, UT)")
    ),
    responses((status = 200, description = "Matching legacy records", body = Vec<LegacyCertificate>)),
    tag = "legacy"
)]
pub async fn search_certificates(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<LegacyCertificate>>, ApiError> {
    let mut records = flatten_all(&state).await?;

    if let Some(serial) = query.serial_number.as_deref().map(str::trim)
        && !serial.is_empty()
    {
        if let Some((base, method)) = split_method_suffix(serial) {
            // A suffixed serial addresses exactly one record.
            let composite = format!("{base}-{}", method.code());
            records.retain(|record| record.serial_number == composite);
        } else {
            records.retain(|record| {
                record
                    .serial_number
                    .rsplit_once('-')
                    .is_some_and(|(base, _)| base == serial)
                    || record.serial_number.contains(serial)
            });
        }
    }

    if let Some(name) = query.name.as_deref().map(str::trim)
        && !name.is_empty()
    {
        let needle = name.to_lowercase();
        records.retain(|record| record.name.to_lowercase().contains(&needle));
    }

    if let Some(method) = query.method.as_deref()
        && let Some(method) = crate::trainees::certificates::models::ServiceMethod::from_code(method)
    {
        records.retain(|record| record.service_method == method.code());
    }

    Ok(Json(records))
}

/// Get one flattened record by certificate id
#[utoipa::path(
    get,
    path = "/{id}",
    params(("id" = Uuid, Path, description = "Certificate ID")),
    responses(
        (status = 200, description = "Legacy record", body = LegacyCertificate),
        (status = 404, description = "Not found")
    ),
    tag = "legacy"
)]
pub async fn get_certificate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<LegacyCertificate>, ApiError> {
    let (certificate, trainee) = find_pair(&state, id).await?;
    Ok(Json(LegacyCertificate::from_pair(&trainee, &certificate)))
}

/// Create a certificate, creating its trainee when the serial is new
#[utoipa::path(
    post,
    path = "/",
    request_body = LegacyCertificateCreate,
    responses(
        (status = 201, description = "Created record", body = LegacyCertificate),
        (status = 409, description = "Trainee already holds a certificate for this method"),
        (status = 500, description = "Internal server error")
    ),
    tag = "legacy"
)]
pub async fn create_certificate(
    State(state): State<AppState>,
    Json(payload): Json<LegacyCertificateCreate>,
) -> Result<(StatusCode, Json<LegacyCertificate>), ApiError> {
    // Strip any method suffix so "1001-VT" resolves to trainee 1001.
    let base_serial = split_method_suffix(payload.serial_number.trim())
        .map_or_else(|| payload.serial_number.trim().to_string(), |(base, _)| base.to_string());

    let existing = trainees::Entity::find()
        .filter(trainees::Column::SerialNumber.eq(base_serial.as_str()))
        .one(&state.db)
        .await
        .map_err(db_error)?;

    let now = Utc::now();
    let trainee = match existing {
        Some(trainee) => trainee,
        None => trainees::ActiveModel {
            id: Set(Uuid::new_v4()),
            serial_number: Set(base_serial.clone()),
            person_name: Set(payload.name.clone()),
            country: Set(None),
            state: Set(None),
            street_address: Set(None),
            created_at: Set(now),
            last_updated: Set(now),
        }
        .insert(&state.db)
        .await
        .map_err(db_error)?,
    };

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
                    "Serial {} already holds a {} certificate",
                    base_serial,
                    payload.service_method.code()
                )
            })),
        ));
    }

    let certificate = certificates::ActiveModel {
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

    Ok((
        StatusCode::CREATED,
        Json(LegacyCertificate::from_pair(&trainee, &certificate)),
    ))
}

/// Update a flattened record (name, type, expiry)
#[utoipa::path(
    put,
    path = "/{id}",
    params(("id" = Uuid, Path, description = "Certificate ID")),
    request_body = LegacyCertificateUpdate,
    responses(
        (status = 200, description = "Updated record", body = LegacyCertificate),
        (status = 404, description = "Not found")
    ),
    tag = "legacy"
)]
pub async fn update_certificate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<LegacyCertificateUpdate>,
) -> Result<Json<LegacyCertificate>, ApiError> {
    let (certificate, trainee) = find_pair(&state, id).await?;

    let trainee = if let Some(name) = payload.name {
        let mut active = trainee.into_active_model();
        active.person_name = Set(name);
        active.last_updated = Set(Utc::now());
        active.update(&state.db).await.map_err(db_error)?
    } else {
        trainee
    };

    let mut active = certificate.into_active_model();
    if let Some(certificate_type) = payload.certificate_type {
        active.certificate_type = Set(certificate_type);
    }
    if let Some(expiry_date) = payload.expiry_date {
        active.expiry_date = Set(expiry_date);
    }
    active.last_updated = Set(Utc::now());
    let certificate = active.update(&state.db).await.map_err(db_error)?;

    Ok(Json(LegacyCertificate::from_pair(&trainee, &certificate)))
}

/// Delete one certificate
#[utoipa::path(
    delete,
    path = "/{id}",
    params(("id" = Uuid, Path, description = "Certificate ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "legacy"
)]
pub async fn delete_certificate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let (certificate, _) = find_pair(&state, id).await?;
    certificate.delete(&state.db).await.map_err(db_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Import a workbook through the legacy entry point (strict type codes)
#[utoipa::path(
    post,
    path = "/import",
    request_body(content = String, description = "Excel file as multipart/form-data", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Import finished", body = ImportReport),
        (status = 400, description = "Missing or unreadable file")
    ),
    tag = "legacy"
)]
pub async fn import_excel(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportReport>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Multipart error: {e}")})),
        )
    })? {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name == "excel_file" || field_name == "file" {
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

    let report = ImportService::new(&state.db)
        .import_excel(file_data, TypeClassification::Strict)
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("Excel processing error: {e}")})),
            )
        })?;

    Ok(Json(report))
}

async fn find_pair(
    state: &AppState,
    certificate_id: Uuid,
) -> Result<(certificates::Model, trainees::Model), ApiError> {
    let certificate = certificates::Entity::find_by_id(certificate_id)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Certificate not found"})),
            )
        })?;

    let trainee = certificate
        .find_related(trainees::Entity)
        .one(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Trainee not found"})),
            )
        })?;

    Ok((certificate, trainee))
}
