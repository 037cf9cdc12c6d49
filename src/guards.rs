//! Hierarchy guards run inside an operation's transaction.
//!
//! Both guards only read through the transaction handed to them, so the
//! answer they give holds until that transaction commits.

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::lookup::{self, Reference};
use crate::models::EmployeeId;
use crate::store::EmployeeTx;

/// Returns `true` when making `proposed_supervisor` the supervisor of `subject`
/// would close a loop in the reporting lines.
///
/// Walks the supervisor chain upward from `proposed_supervisor`. The walk is
/// bounded by the number of stored employees; a chain longer than that can only
/// mean the stored data already loops, which is reported as an error instead of
/// spinning.
pub async fn would_create_cycle(
    tx: &mut dyn EmployeeTx,
    subject: EmployeeId,
    proposed_supervisor: EmployeeId,
) -> Result<bool> {
    if subject == proposed_supervisor {
        return Ok(true);
    }

    let mut current = lookup::require(tx, proposed_supervisor, Reference::Supervisor).await?;
    let bound = tx.count().await?;
    let mut visited = 0usize;

    loop {
        if current.id == subject {
            return Ok(true);
        }

        visited += 1;
        if visited > bound {
            tracing::error!(
                employee_id = %subject,
                supervisor_id = %proposed_supervisor,
                bound,
                "supervisor chain exceeds employee count"
            );
            return Err(LibError::inconsistent(
                "Reporting hierarchy is inconsistent",
                anyhow!(
                    "supervisor chain above {} did not reach a root within {} hops",
                    proposed_supervisor,
                    bound
                ),
            ));
        }

        let Some(next_id) = current.supervisor_id else {
            return Ok(false);
        };
        match lookup::find(tx, next_id).await? {
            Some(next) => current = next,
            None => {
                tracing::warn!(
                    employee_id = %current.id,
                    supervisor_id = %next_id,
                    "supervisor chain ends at a missing employee"
                );
                return Ok(false);
            }
        }
    }
}

/// Returns `true` when any employee reports directly to `id`.
pub async fn has_subordinates(tx: &mut dyn EmployeeTx, id: EmployeeId) -> Result<bool> {
    Ok(!tx.get_by_supervisor(id).await?.is_empty())
}
