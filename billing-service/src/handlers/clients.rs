//! Client account handlers: registration, login, profile management,
//! password reset, uploaded-file listings and GPS locations.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::{DateTime, Document};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        AddLocationRequest, BatchClientsRequest, BillingDetailsResponse, ClientFilesResponse,
        ClientResponse, ClientSummaryResponse, FileRecordResponse, LocationResponse, LoginRequest,
        PasswordResetConfirmRequest, PasswordResetRequest, RegisterClientRequest,
        UpdateClientRequest,
    },
    models::{Client, GeoPoint},
    services::otp,
    services::ClientStore as _,
    utils::password::{hash_password, verify_password},
    AppState,
};
use service_core::error::AppError;

/// Register a new client account.
///
/// POST /clients/register
#[tracing::instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterClientRequest>,
) -> Result<(StatusCode, Json<ClientResponse>), AppError> {
    payload.validate()?;

    if state.clients.find_by_email(&payload.email).await?.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!("Email already exists")));
    }
    if state
        .clients
        .find_by_mobile(&payload.mobile)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Mobile number already exists"
        )));
    }

    let customer_id = state.clients.next_customer_id().await.map_err(|e| {
        tracing::error!("Failed to allocate customer id: {}", e);
        AppError::DatabaseError(e)
    })?;
    let password_hash = hash_password(&payload.password)?;

    let now = DateTime::now();
    let client = Client {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.clone(),
        name: payload.name,
        business_name: payload.business_name,
        email: payload.email,
        password_hash,
        mobile: payload.mobile,
        address: payload.address,
        gst_number: payload.gst_number,
        role: "client".to_string(),
        file_urls: vec![],
        locations: vec![],
        created_at: now,
        updated_at: now,
    };

    state.clients.create(client.clone()).await?;

    tracing::info!(customer_id = %customer_id, "Client registered");

    Ok((StatusCode::CREATED, Json(ClientResponse::from(client))))
}

/// Authenticate by email, mobile or customer id.
///
/// POST /clients/login
#[tracing::instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ClientResponse>, AppError> {
    // Identifier precedence: email, then mobile, then customer id.
    let client = if let Some(email) = payload.email.as_deref() {
        state.clients.find_by_email(email).await?
    } else if let Some(mobile) = payload.mobile.as_deref() {
        state.clients.find_by_mobile(mobile).await?
    } else if let Some(customer_id) = payload.customer_id.as_deref() {
        state.clients.find_by_customer_id(customer_id).await?
    } else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Either email, mobile, or customer id must be provided"
        )));
    };

    let client =
        client.ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Client not found")))?;

    verify_password(&payload.password, &client.password_hash)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Password does not match")))?;

    Ok(Json(ClientResponse::from(client)))
}

/// GET /clients
pub async fn list_clients(
    State(state): State<AppState>,
) -> Result<Json<Vec<ClientResponse>>, AppError> {
    let clients = state.clients.find_all().await?;
    Ok(Json(clients.into_iter().map(Into::into).collect()))
}

/// GET /clients/:customer_id
pub async fn get_client(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<ClientResponse>, AppError> {
    let client = find_client(&state, &customer_id).await?;
    Ok(Json(ClientResponse::from(client)))
}

/// Partial profile update; a new password is re-hashed before storage.
///
/// PATCH /clients/:customer_id
#[tracing::instrument(skip(state, payload), fields(customer_id = %customer_id))]
pub async fn update_client(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(payload): Json<UpdateClientRequest>,
) -> Result<Json<ClientResponse>, AppError> {
    payload.validate()?;

    let mut fields = Document::new();
    if let Some(name) = payload.name {
        fields.insert("name", name);
    }
    if let Some(business_name) = payload.business_name {
        fields.insert("business_name", business_name);
    }
    if let Some(email) = payload.email {
        fields.insert("email", email);
    }
    if let Some(password) = payload.password {
        fields.insert("password_hash", hash_password(&password)?);
    }
    if let Some(mobile) = payload.mobile {
        fields.insert("mobile", mobile);
    }
    if let Some(address) = payload.address {
        fields.insert("address", address);
    }
    if let Some(gst_number) = payload.gst_number {
        fields.insert("gst_number", gst_number);
    }

    if fields.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "No fields to update"
        )));
    }

    let client = state
        .clients
        .update_fields(&customer_id, fields)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    Ok(Json(ClientResponse::from(client)))
}

/// DELETE /clients/:customer_id
#[tracing::instrument(skip(state), fields(customer_id = %customer_id))]
pub async fn remove_client(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.clients.delete_by_customer_id(&customer_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Client not found")));
    }

    tracing::info!("Client deleted");
    Ok(Json(json!({ "message": "Client deleted" })))
}

/// Fetch several client profiles at once.
///
/// POST /clients/batch
pub async fn batch_clients(
    State(state): State<AppState>,
    Json(payload): Json<BatchClientsRequest>,
) -> Result<Json<Vec<ClientResponse>>, AppError> {
    payload.validate()?;

    let clients = state.clients.find_many(&payload.customer_ids).await?;
    if clients.is_empty() {
        return Err(AppError::NotFound(anyhow::anyhow!("No clients found")));
    }

    Ok(Json(clients.into_iter().map(Into::into).collect()))
}

/// GET /clients/:customer_id/summary
pub async fn client_summary(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<ClientSummaryResponse>, AppError> {
    let client = find_client(&state, &customer_id).await?;
    Ok(Json(ClientSummaryResponse {
        name: client.name,
        business_name: client.business_name,
    }))
}

/// The customer-detail fields rendered onto invoices.
///
/// GET /clients/:customer_id/billing-details
pub async fn billing_details(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<BillingDetailsResponse>, AppError> {
    let client = find_client(&state, &customer_id).await?;
    Ok(Json(BillingDetailsResponse::from(client)))
}

/// Issue a password-reset code to a registered email.
///
/// POST /clients/password-reset/request
#[tracing::instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn password_reset_request(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    payload.validate()?;

    if state.clients.find_by_email(&payload.email).await?.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!("Email not found")));
    }

    let code = otp::generate_code();
    state.otp.put(&payload.email, &code).await?;
    state
        .email
        .send_password_reset_code(&payload.email, &code)
        .await?;

    tracing::info!("Password reset code issued");
    Ok(Json(json!({ "message": "OTP sent to your email" })))
}

/// Consume a reset code and set the new password.
///
/// POST /clients/password-reset/confirm
#[tracing::instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn password_reset_confirm(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirmRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    payload.validate()?;

    if !state.otp.verify(&payload.email, &payload.code).await? {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid or expired OTP"
        )));
    }

    let password_hash = hash_password(&payload.new_password)?;
    let updated = state
        .clients
        .set_password_hash(&payload.email, &password_hash)
        .await?;
    if !updated {
        return Err(AppError::NotFound(anyhow::anyhow!("Client not found")));
    }

    tracing::info!("Password reset completed");
    Ok(Json(json!({ "message": "Password reset successful" })))
}

/// Append a GPS location for a client site.
///
/// POST /clients/:customer_id/locations
pub async fn add_location(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(payload): Json<AddLocationRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    payload.validate()?;

    let point = GeoPoint {
        latitude: payload.latitude,
        longitude: payload.longitude,
        recorded_at: DateTime::now(),
    };

    let matched = state.clients.push_location(&customer_id, &point).await?;
    if !matched {
        return Err(AppError::NotFound(anyhow::anyhow!("Client not found")));
    }

    Ok(Json(json!({
        "message": "Location added successfully",
        "location": LocationResponse::from(&point),
    })))
}

/// GET /clients/:customer_id/locations/latest
pub async fn latest_location(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<LocationResponse>, AppError> {
    let client = find_client(&state, &customer_id).await?;

    let point = client.latest_location().ok_or_else(|| {
        AppError::NotFound(anyhow::anyhow!("No locations found for this client"))
    })?;

    Ok(Json(LocationResponse::from(point)))
}

/// Uploaded file URLs for one client.
///
/// GET /clients/:customer_id/files
pub async fn list_files(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let client = find_client(&state, &customer_id).await?;
    let file_urls: Vec<FileRecordResponse> =
        client.file_urls.into_iter().map(Into::into).collect();
    Ok(Json(json!({ "file_urls": file_urls })))
}

/// File URLs across all clients.
///
/// GET /clients/files
pub async fn all_file_urls(
    State(state): State<AppState>,
) -> Result<Json<Vec<ClientFilesResponse>>, AppError> {
    let clients = state.clients.find_all().await?;
    if clients.is_empty() {
        return Err(AppError::NotFound(anyhow::anyhow!("No clients found")));
    }

    let responses = clients
        .into_iter()
        .map(|client| ClientFilesResponse {
            customer_id: client.customer_id,
            file_urls: client.file_urls.into_iter().map(Into::into).collect(),
        })
        .collect();

    Ok(Json(responses))
}

async fn find_client(state: &AppState, customer_id: &str) -> Result<Client, AppError> {
    state
        .clients
        .find_by_customer_id(customer_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Client not found for customer id: {}",
                customer_id
            ))
        })
}
