use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;
use crate::models::{Employee, EmployeeId, NewEmployee};

/// Durable keyed storage for employees.
///
/// All access goes through a transaction so that every hierarchy operation
/// commits or rolls back as a unit.
#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn begin<'a>(&'a self) -> Result<Box<dyn EmployeeTx + 'a>>;
}

/// A single store transaction. Dropping it without calling [`EmployeeTx::commit`]
/// discards every write made through it.
#[async_trait]
pub trait EmployeeTx: Send {
    async fn get(&mut self, id: EmployeeId) -> Result<Option<Employee>>;

    /// Direct subordinates of `supervisor_id`, ordered by id.
    async fn get_by_supervisor(&mut self, supervisor_id: EmployeeId) -> Result<Vec<Employee>>;

    /// Every employee, ordered by id.
    async fn list(&mut self) -> Result<Vec<Employee>>;

    async fn count(&mut self) -> Result<usize>;

    async fn insert(&mut self, employee: NewEmployee, created_at: NaiveDateTime)
    -> Result<Employee>;

    async fn save(&mut self, employee: &Employee) -> Result<Employee>;

    async fn delete(&mut self, id: EmployeeId) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
