use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::{Employee, EmployeeId};
use crate::store::EmployeeTx;

/// Which reference an id was resolved for; picks the not-found error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Employee,
    Supervisor,
    Subordinate,
}

impl Reference {
    pub fn not_found(self, id: EmployeeId) -> LibError {
        match self {
            Reference::Employee => LibError::not_found_with_code(
                "employee_not_found",
                "Employee not found",
                anyhow!("employee {} not found", id),
            ),
            Reference::Supervisor => LibError::not_found_with_code(
                "supervisor_not_found",
                "Supervisor not found",
                anyhow!("supervisor {} not found", id),
            ),
            Reference::Subordinate => LibError::not_found_with_code(
                "subordinate_not_found",
                "Subordinate not found",
                anyhow!("subordinate {} not found", id),
            ),
        }
    }
}

pub async fn find(tx: &mut dyn EmployeeTx, id: EmployeeId) -> Result<Option<Employee>> {
    tx.get(id).await
}

/// Resolves a referenced id, turning absence into the matching not-found error.
pub async fn require(
    tx: &mut dyn EmployeeTx,
    id: EmployeeId,
    reference: Reference,
) -> Result<Employee> {
    find(tx, id)
        .await?
        .ok_or_else(|| reference.not_found(id))
}
