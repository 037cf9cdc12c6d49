use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::error::{LibError, Result};
use crate::models::{Employee, EmployeeId, NewEmployee};
use crate::store::{EmployeeStore, EmployeeTx};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_employee_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Debug, Clone, FromRow)]
struct EmployeeRow {
    id: i64,
    first_name: String,
    last_name: String,
    position: String,
    supervisor_id: Option<i64>,
    created_at: NaiveDateTime,
}

impl From<EmployeeRow> for Employee {
    fn from(value: EmployeeRow) -> Self {
        Self {
            id: EmployeeId(value.id),
            first_name: value.first_name,
            last_name: value.last_name,
            position: value.position,
            supervisor_id: value.supervisor_id.map(EmployeeId),
            created_at: value.created_at,
        }
    }
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    let mapped = LibError::from(err);
    match mapped.kind {
        crate::error::ErrorKind::Database => LibError::database(public, mapped.source),
        _ => mapped,
    }
}

/// Postgres-backed store. Every transaction runs at `SERIALIZABLE`, so a
/// supervisor chain read by the cycle guard cannot change underneath it
/// before commit; a losing concurrent transaction fails with
/// `serialization_conflict`.
#[derive(Debug, Clone)]
pub struct PgEmployeeStore {
    pool: Arc<PgPool>,
}

impl PgEmployeeStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn from_pool(pool: &PgPool) -> Self {
        Self {
            pool: Arc::new(pool.clone()),
        }
    }
}

#[async_trait]
impl EmployeeStore for PgEmployeeStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn EmployeeTx + 'a>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;

        Ok(Box::new(PgEmployeeTx { tx }))
    }
}

struct PgEmployeeTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl EmployeeTx for PgEmployeeTx {
    async fn get(&mut self, id: EmployeeId) -> Result<Option<Employee>> {
        let row = sqlx::query_as::<_, EmployeeRow>(
            r#"
            SELECT id, first_name, last_name, position, supervisor_id, created_at
            FROM hierarchy.employees
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query employee", err))?;

        Ok(row.map(Employee::from))
    }

    async fn get_by_supervisor(&mut self, supervisor_id: EmployeeId) -> Result<Vec<Employee>> {
        let rows = sqlx::query_as::<_, EmployeeRow>(
            r#"
            SELECT id, first_name, last_name, position, supervisor_id, created_at
            FROM hierarchy.employees
            WHERE supervisor_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(supervisor_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to query subordinates", err))?;

        Ok(rows.into_iter().map(Employee::from).collect())
    }

    async fn list(&mut self) -> Result<Vec<Employee>> {
        let rows = sqlx::query_as::<_, EmployeeRow>(
            r#"
            SELECT id, first_name, last_name, position, supervisor_id, created_at
            FROM hierarchy.employees
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to list employees", err))?;

        Ok(rows.into_iter().map(Employee::from).collect())
    }

    async fn count(&mut self) -> Result<usize> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)::bigint
            FROM hierarchy.employees
            "#,
        )
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to count employees", err))?;

        usize::try_from(count.0).map_err(|err| {
            LibError::database("Failed to count employees", anyhow!("invalid count: {}", err))
        })
    }

    async fn insert(
        &mut self,
        employee: NewEmployee,
        created_at: NaiveDateTime,
    ) -> Result<Employee> {
        let row = sqlx::query_as::<_, EmployeeRow>(
            r#"
            INSERT INTO hierarchy.employees (
                first_name,
                last_name,
                position,
                supervisor_id,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, first_name, last_name, position, supervisor_id, created_at
            "#,
        )
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(&employee.position)
        .bind(employee.supervisor_id.map(|id| id.0))
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to create employee", err))?;

        Ok(row.into())
    }

    async fn save(&mut self, employee: &Employee) -> Result<Employee> {
        let row = sqlx::query_as::<_, EmployeeRow>(
            r#"
            UPDATE hierarchy.employees
            SET first_name = $1,
                last_name = $2,
                position = $3,
                supervisor_id = $4
            WHERE id = $5
            RETURNING id, first_name, last_name, position, supervisor_id, created_at
            "#,
        )
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(&employee.position)
        .bind(employee.supervisor_id.map(|id| id.0))
        .bind(employee.id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to update employee", err))?;

        row.map(Employee::from).ok_or_else(|| {
            LibError::not_found_with_code(
                "employee_not_found",
                "Employee not found",
                anyhow!("cannot save unknown employee {}", employee.id),
            )
        })
    }

    async fn delete(&mut self, id: EmployeeId) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM hierarchy.employees
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| db_err("Failed to delete employee", err))?;

        if result.rows_affected() == 0 {
            return Err(LibError::not_found_with_code(
                "employee_not_found",
                "Employee not found",
                anyhow!("cannot delete unknown employee {}", id),
            ));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))
    }
}
