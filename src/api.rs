use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::error::{ErrorKind, LibError};
use crate::lookup::Reference;
use crate::models::{CreateEmployeePayload, EmployeeId, UpdateEmployeePayload};
use crate::operations::HierarchyOperations;

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Database | ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(kind = ?self.0.kind, code = self.0.code, error = %self.0.source, "hierarchy api request failed");
        } else {
            tracing::warn!(kind = ?self.0.kind, code = self.0.code, error = %self.0.source, "hierarchy api request rejected");
        }

        let mut error = json!({
            "code": self.0.code,
            "message": self.0.public,
        });
        if let Some(details) = &self.0.details {
            error["details"] = json!(details);
        }
        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// State handed to the hierarchy routes.
pub trait HierarchyApp {
    fn operations(&self) -> HierarchyOperations;
}

fn parse_employee_id(raw: &str) -> Result<EmployeeId, AppError> {
    raw.trim().parse::<EmployeeId>().map_err(|err| {
        AppError(LibError::invalid(
            "Invalid employee ID format",
            anyhow!("invalid employee id '{}': {}", raw, err),
        ))
    })
}

fn employee_not_found(employee_id: EmployeeId) -> AppError {
    AppError(Reference::Employee.not_found(employee_id))
}

async fn create_employee_handler<S>(
    State(app): State<S>,
    Json(payload): Json<CreateEmployeePayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    let employee = app.operations().create_employee(payload).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn list_employees_handler<S>(State(app): State<S>) -> Result<impl IntoResponse, AppError>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    let employees = app.operations().list_employees().await?;
    Ok(Json(employees))
}

async fn get_employee_handler<S>(
    State(app): State<S>,
    Path(employee_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    let employee_id = parse_employee_id(&employee_id)?;
    let employee = app
        .operations()
        .get_employee(employee_id)
        .await?
        .ok_or_else(|| employee_not_found(employee_id))?;
    Ok(Json(employee))
}

async fn update_employee_handler<S>(
    State(app): State<S>,
    Path(employee_id): Path<String>,
    Json(payload): Json<UpdateEmployeePayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    let employee_id = parse_employee_id(&employee_id)?;
    let patch = payload.normalize()?;
    let employee = app
        .operations()
        .update_employee(employee_id, patch)
        .await?
        .ok_or_else(|| employee_not_found(employee_id))?;
    Ok(Json(employee))
}

async fn delete_employee_handler<S>(
    State(app): State<S>,
    Path(employee_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    let employee_id = parse_employee_id(&employee_id)?;
    app.operations()
        .delete_employee(employee_id)
        .await?
        .ok_or_else(|| employee_not_found(employee_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_subordinates_handler<S>(
    State(app): State<S>,
    Path(employee_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    let employee_id = parse_employee_id(&employee_id)?;
    let subordinates = app
        .operations()
        .list_subordinates(employee_id)
        .await?
        .ok_or_else(|| employee_not_found(employee_id))?;
    Ok(Json(subordinates))
}

async fn reporting_chain_handler<S>(
    State(app): State<S>,
    Path(employee_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    let employee_id = parse_employee_id(&employee_id)?;
    let chain = app
        .operations()
        .reporting_chain(employee_id)
        .await?
        .ok_or_else(|| employee_not_found(employee_id))?;
    Ok(Json(chain))
}

async fn add_subordinates_handler<S>(
    State(app): State<S>,
    Path(supervisor_id): Path<String>,
    Json(subordinate_ids): Json<Vec<EmployeeId>>,
) -> Result<impl IntoResponse, AppError>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    let supervisor_id = parse_employee_id(&supervisor_id)?;
    let supervisor = app
        .operations()
        .add_subordinates(supervisor_id, &subordinate_ids)
        .await?;
    Ok(Json(supervisor))
}

async fn integrity_handler<S>(State(app): State<S>) -> Result<impl IntoResponse, AppError>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    let report = app.operations().check_integrity().await?;
    Ok(Json(report))
}

pub fn routes<S>() -> Router<S>
where
    S: HierarchyApp + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /employees [GET,POST]");
    tracing::info!("Registering route /employees/integrity [GET]");
    tracing::info!("Registering route /employees/{{id}} [GET,PATCH,DELETE]");
    tracing::info!("Registering route /employees/{{id}}/subordinates [GET]");
    tracing::info!("Registering route /employees/{{id}}/reporting-chain [GET]");
    tracing::info!("Registering route /employees/{{id}}/add-subordinates [POST]");

    Router::new()
        .route(
            "/employees",
            get(list_employees_handler::<S>).post(create_employee_handler::<S>),
        )
        .route("/employees/integrity", get(integrity_handler::<S>))
        .route(
            "/employees/{id}",
            get(get_employee_handler::<S>)
                .patch(update_employee_handler::<S>)
                .delete(delete_employee_handler::<S>),
        )
        .route(
            "/employees/{id}/subordinates",
            get(list_subordinates_handler::<S>),
        )
        .route(
            "/employees/{id}/reporting-chain",
            get(reporting_chain_handler::<S>),
        )
        .route(
            "/employees/{id}/add-subordinates",
            post(add_subordinates_handler::<S>),
        )
}
