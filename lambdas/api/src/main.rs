use std::sync::Arc;

use anyhow::Context;
use aws_config::BehaviorVersion;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use domain::{
    config::EventStoreKind,
    dispensing::{scan, CqrsGateway, PrescriptionGateway},
    prescriptions::{self, inputs, MedicationLine, PrescriptionStatus},
    Config,
};
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

#[derive(Clone)]
struct AppState {
    gateway: Arc<dyn PrescriptionGateway>,
}

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let state = AppState {
        gateway: init_gateway(&config).await,
    };

    let app = tower::ServiceBuilder::new()
        .layer(axum_aws_lambda::LambdaLayer::default())
        .service(router(state));

    lambda_http::run(app).await?;
    Ok(())
}

async fn init_gateway(config: &Config) -> Arc<dyn PrescriptionGateway> {
    match config.event_store {
        EventStoreKind::DynamoDb => {
            let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            let dynamodb_client = aws_sdk_dynamodb::Client::new(&aws_config);

            let repo = prescriptions::cqrs::init_repo(dynamodb_client.clone(), config);
            let cqrs = prescriptions::cqrs::init(dynamodb_client, repo.clone(), config);
            Arc::new(CqrsGateway::new(cqrs, repo))
        }
        EventStoreKind::Memory => {
            tracing::warn!("using in-memory event store, data is lost on exit");
            let (cqrs, repo) = prescriptions::cqrs::init_in_memory();
            Arc::new(CqrsGateway::new(cqrs, repo))
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/prescriptions", post(issue_prescription))
        .route("/prescriptions/scan", post(scan_prescription))
        .route("/prescriptions/:id", get(get_prescription))
        .route("/prescriptions/:id/dispense", post(dispense))
        .route("/prescriptions/:id/status", put(update_status))
        .route("/prescriptions/:id/reconcile", post(reconcile_status))
        .with_state(state)
}

fn error_response(err: domain::Error) -> (StatusCode, String) {
    let status = match &err {
        domain::Error::NotFound { .. } => StatusCode::NOT_FOUND,
        domain::Error::Conflict { .. } | domain::Error::Uniqueness { .. } => StatusCode::CONFLICT,
        domain::Error::InvalidStateTransition { .. } | domain::Error::Validation { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        domain::Error::Persistence { .. } | domain::Error::Configuration { .. } => {
            tracing::error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

// Issue prescription
async fn issue_prescription(
    State(state): State<AppState>,
    Json(input): Json<inputs::IssuePrescriptionInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = Ulid::new().to_string();

    let medications = input
        .medications
        .into_iter()
        .map(|line| MedicationLine {
            id: line.id.unwrap_or_else(|| Ulid::new().to_string()),
            name: line.name,
            dosage: line.dosage,
            frequency: line.frequency,
            duration: line.duration,
            route: line.route,
            instructions: line.instructions,
            refill_count: 0,
            refill_limit: line.refill_limit.unwrap_or(1),
        })
        .collect();

    let command = prescriptions::Command::IssuePrescription {
        id: id.clone(),
        patient_id: input.patient_id,
        doctor_id: input.doctor_id,
        issued_on: input.issued_on,
        expires_on: input.expires_on,
        diagnosis: input.diagnosis,
        notes: input.notes,
        medications,
    };

    state.gateway.execute(&id, command).await.map_err(error_response)?;
    let view = state.gateway.fetch_view(&id).await.map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(view)))
}

// Get prescription
async fn get_prescription(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let view = state.gateway.fetch_view(&id).await.map_err(error_response)?;

    Ok(Json(view))
}

// Resolve a scanned code
async fn scan_prescription(
    State(state): State<AppState>,
    Json(input): Json<inputs::ScanInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = scan::resolve(&input.code)
        .ok_or_else(|| error_response(domain::Error::not_found(prescriptions::AGGREGATE_TYPE)))?;

    let view = state.gateway.fetch_view(&id).await.map_err(error_response)?;

    Ok(Json(view))
}

// Dispense refills
async fn dispense(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(input): Json<inputs::DispenseInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let command = prescriptions::Command::DispenseRefills {
        expected_version: input.version,
        refills: input.refills,
    };

    state.gateway.execute(&id, command).await.map_err(error_response)?;
    let view = state.gateway.fetch_view(&id).await.map_err(error_response)?;

    Ok(Json(view))
}

// Update status
async fn update_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(input): Json<inputs::UpdateStatusInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let command = match input.status {
        PrescriptionStatus::Filled => prescriptions::Command::MarkFilled,
        PrescriptionStatus::Cancelled => prescriptions::Command::CancelPrescription,
        PrescriptionStatus::Expired => prescriptions::Command::ExpirePrescription,
        PrescriptionStatus::Active => {
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                "Prescriptions cannot be reactivated".to_string(),
            ))
        }
    };

    state.gateway.execute(&id, command).await.map_err(error_response)?;
    let view = state.gateway.fetch_view(&id).await.map_err(error_response)?;

    Ok(Json(view))
}

// Re-derive expired status
async fn reconcile_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .gateway
        .execute(&id, prescriptions::Command::ReconcileStatus)
        .await
        .map_err(error_response)?;
    let view = state.gateway.fetch_view(&id).await.map_err(error_response)?;

    Ok(Json(view))
}
