use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;

use reports_to::api::HierarchyApp;
use reports_to::memory::InMemoryEmployeeStore;
use reports_to::models::{CreateEmployeePayload, EmployeeId};
use reports_to::operations::HierarchyOperations;

#[derive(Clone)]
struct ExampleApp {
    operations: HierarchyOperations,
}

impl HierarchyApp for ExampleApp {
    fn operations(&self) -> HierarchyOperations {
        self.operations.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info")?;

    let bind = env::var("HIERARCHY_BIND").unwrap_or_else(|_| "127.0.0.1:4020".to_string());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid HIERARCHY_BIND '{}'", bind))?;
    let max_connections = match env::var("HIERARCHY_MAX_CONNECTIONS") {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid HIERARCHY_MAX_CONNECTIONS '{}'", raw))?,
        Err(_) => 5,
    };

    let operations = match env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(&database_url)
                .await
                .context("failed to connect to postgres")?;
            reports_to::db::create_employee_tables(&pool)
                .await
                .context("failed to run hierarchy migrations")?;
            tracing::info!(max_connections, "using postgres employee store");
            HierarchyOperations::from_pool(&pool)
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, using in-memory employee store");
            HierarchyOperations::new(Arc::new(InMemoryEmployeeStore::new()))
        }
    };

    if env_flag("HIERARCHY_SEED_DEMO") {
        seed_demo(&operations).await?;
    }

    let report = operations
        .check_integrity()
        .await
        .map_err(|err| anyhow!("integrity check failed: {}", err))?;
    tracing::info!(
        valid = report.valid,
        employees = report.employee_count,
        "startup integrity check"
    );

    let app_state = ExampleApp { operations };
    let api = Router::new()
        .route("/healthz", get(health_handler))
        .merge(reports_to::api::routes::<ExampleApp>());
    let app = Router::new().nest("/api", api).with_state(app_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    println!("reports_to example server listening on http://{}", bind_addr);
    println!("api base path: /api");
    println!("set HIERARCHY_SEED_DEMO=true to seed a small org chart");

    axum::serve(listener, app)
        .await
        .context("example server failed")
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes"
        }
        Err(_) => false,
    }
}

async fn seed_demo(operations: &HierarchyOperations) -> anyhow::Result<()> {
    let existing = operations
        .list_employees()
        .await
        .map_err(|err| anyhow!("failed to list employees: {}", err))?;
    if !existing.is_empty() {
        tracing::info!(employees = existing.len(), "store already populated, skipping seed");
        return Ok(());
    }

    let mut supervisor: Option<EmployeeId> = None;
    for (first_name, last_name, position) in [
        ("Grace", "Hopper", "Chief Executive Officer"),
        ("Alan", "Turing", "Chief Technology Officer"),
        ("Ada", "Lovelace", "Staff Engineer"),
    ] {
        let employee = operations
            .create_employee(CreateEmployeePayload {
                first_name: Some(first_name.to_string()),
                last_name: Some(last_name.to_string()),
                position: Some(position.to_string()),
                supervisor_id: supervisor.map(|id| json!(id.0)),
            })
            .await
            .map_err(|err| anyhow!("failed to seed {}: {}", first_name, err))?;
        supervisor = Some(employee.id);
    }

    tracing::info!("seeded demo org chart");
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}
