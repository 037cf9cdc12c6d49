use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};
use crate::guards;
use crate::invariants;
use crate::lookup::{self, Reference};
use crate::models::{
    CreateEmployeePayload, Employee, EmployeeId, EmployeePatch, IntegrityReport,
    SupervisorAssignment, UpdateEmployeePayload,
};
use crate::store::{EmployeeStore, EmployeeTx};

/// High-level hierarchy actions for tool-style callers.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum EmployeeOperation {
    Create {
        payload: CreateEmployeePayload,
    },
    List,
    Get {
        employee_id: EmployeeId,
    },
    Update {
        employee_id: EmployeeId,
        payload: UpdateEmployeePayload,
    },
    Delete {
        employee_id: EmployeeId,
    },
    AddSubordinates {
        supervisor_id: EmployeeId,
        subordinate_ids: Vec<EmployeeId>,
    },
    Subordinates {
        employee_id: EmployeeId,
    },
    ReportingChain {
        employee_id: EmployeeId,
    },
    CheckIntegrity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EmployeeOperationResult {
    Employee { employee: Employee },
    Employees { items: Vec<Employee> },
    Integrity { report: IntegrityReport },
    Deleted { employee: Employee },
    NotFound { employee_id: EmployeeId },
}

#[derive(Clone)]
pub struct HierarchyOperations {
    store: Arc<dyn EmployeeStore>,
}

impl HierarchyOperations {
    pub fn new(store: Arc<dyn EmployeeStore>) -> Self {
        Self { store }
    }

    #[cfg(feature = "sqlx")]
    pub fn from_pool(pool: &sqlx::PgPool) -> Self {
        Self::new(Arc::new(crate::db::PgEmployeeStore::from_pool(pool)))
    }

    pub async fn execute(&self, operation: EmployeeOperation) -> Result<EmployeeOperationResult> {
        match operation {
            EmployeeOperation::Create { payload } => {
                let employee = self.create_employee(payload).await?;
                Ok(EmployeeOperationResult::Employee { employee })
            }
            EmployeeOperation::List => {
                let items = self.list_employees().await?;
                Ok(EmployeeOperationResult::Employees { items })
            }
            EmployeeOperation::Get { employee_id } => Ok(self
                .get_employee(employee_id)
                .await?
                .map(|employee| EmployeeOperationResult::Employee { employee })
                .unwrap_or(EmployeeOperationResult::NotFound { employee_id })),
            EmployeeOperation::Update {
                employee_id,
                payload,
            } => {
                let patch = payload.normalize()?;
                Ok(self
                    .update_employee(employee_id, patch)
                    .await?
                    .map(|employee| EmployeeOperationResult::Employee { employee })
                    .unwrap_or(EmployeeOperationResult::NotFound { employee_id }))
            }
            EmployeeOperation::Delete { employee_id } => Ok(self
                .delete_employee(employee_id)
                .await?
                .map(|employee| EmployeeOperationResult::Deleted { employee })
                .unwrap_or(EmployeeOperationResult::NotFound { employee_id })),
            EmployeeOperation::AddSubordinates {
                supervisor_id,
                subordinate_ids,
            } => {
                let employee = self.add_subordinates(supervisor_id, &subordinate_ids).await?;
                Ok(EmployeeOperationResult::Employee { employee })
            }
            EmployeeOperation::Subordinates { employee_id } => Ok(self
                .list_subordinates(employee_id)
                .await?
                .map(|items| EmployeeOperationResult::Employees { items })
                .unwrap_or(EmployeeOperationResult::NotFound { employee_id })),
            EmployeeOperation::ReportingChain { employee_id } => Ok(self
                .reporting_chain(employee_id)
                .await?
                .map(|items| EmployeeOperationResult::Employees { items })
                .unwrap_or(EmployeeOperationResult::NotFound { employee_id })),
            EmployeeOperation::CheckIntegrity => {
                let report = self.check_integrity().await?;
                Ok(EmployeeOperationResult::Integrity { report })
            }
        }
    }

    pub async fn create_employee(&self, payload: CreateEmployeePayload) -> Result<Employee> {
        let new_employee = payload.normalize()?;

        let mut tx = self.store.begin().await?;
        if let Some(supervisor_id) = new_employee.supervisor_id {
            lookup::require(tx.as_mut(), supervisor_id, Reference::Supervisor).await?;
        }
        let employee = tx.insert(new_employee, Utc::now().naive_utc()).await?;
        tx.commit().await?;

        tracing::info!(
            employee_id = %employee.id,
            supervisor_id = ?employee.supervisor_id,
            "employee created"
        );
        Ok(employee)
    }

    pub async fn list_employees(&self) -> Result<Vec<Employee>> {
        let mut tx = self.store.begin().await?;
        tx.list().await
    }

    pub async fn get_employee(&self, employee_id: EmployeeId) -> Result<Option<Employee>> {
        let mut tx = self.store.begin().await?;
        lookup::find(tx.as_mut(), employee_id).await
    }

    /// Applies the fields named in `patch`. `Ok(None)` means the employee does
    /// not exist; any error leaves the stored employee untouched.
    pub async fn update_employee(
        &self,
        employee_id: EmployeeId,
        patch: EmployeePatch,
    ) -> Result<Option<Employee>> {
        let mut tx = self.store.begin().await?;
        let Some(mut employee) = lookup::find(tx.as_mut(), employee_id).await? else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(Some(employee));
        }

        patch.apply_attributes(&mut employee);
        match patch.supervisor {
            None => {}
            Some(SupervisorAssignment::Clear) => employee.supervisor_id = None,
            Some(SupervisorAssignment::Assign(supervisor_id)) => {
                assign_supervisor(tx.as_mut(), employee.id, supervisor_id).await?;
                employee.supervisor_id = Some(supervisor_id);
            }
        }

        let employee = tx.save(&employee).await?;
        tx.commit().await?;

        tracing::info!(employee_id = %employee.id, "employee updated");
        Ok(Some(employee))
    }

    /// Removes an employee with no subordinates. `Ok(None)` means the employee
    /// does not exist.
    pub async fn delete_employee(&self, employee_id: EmployeeId) -> Result<Option<Employee>> {
        let mut tx = self.store.begin().await?;
        let Some(employee) = lookup::find(tx.as_mut(), employee_id).await? else {
            return Ok(None);
        };

        if guards::has_subordinates(tx.as_mut(), employee_id).await? {
            tracing::debug!(employee_id = %employee_id, "delete refused, employee has subordinates");
            return Err(LibError::conflict(
                "supervisor_has_subordinates",
                "Cannot delete supervisor with subordinates. Reassign or remove subordinates first.",
                anyhow!("employee {} still has subordinates", employee_id),
            ));
        }

        tx.delete(employee_id).await?;
        tx.commit().await?;

        tracing::info!(employee_id = %employee_id, "employee deleted");
        Ok(Some(employee))
    }

    /// Re-points every listed employee at `supervisor_id` in one transaction.
    /// The first unknown id or cycle aborts the whole batch.
    pub async fn add_subordinates(
        &self,
        supervisor_id: EmployeeId,
        subordinate_ids: &[EmployeeId],
    ) -> Result<Employee> {
        let mut tx = self.store.begin().await?;
        lookup::require(tx.as_mut(), supervisor_id, Reference::Supervisor).await?;

        for subordinate_id in subordinate_ids {
            let mut subordinate =
                lookup::require(tx.as_mut(), *subordinate_id, Reference::Subordinate).await?;
            if subordinate.supervisor_id == Some(supervisor_id) {
                continue;
            }
            assign_supervisor(tx.as_mut(), subordinate.id, supervisor_id).await?;
            subordinate.supervisor_id = Some(supervisor_id);
            tx.save(&subordinate).await?;
        }

        let supervisor = lookup::require(tx.as_mut(), supervisor_id, Reference::Supervisor).await?;
        tx.commit().await?;

        tracing::info!(
            supervisor_id = %supervisor_id,
            subordinate_count = subordinate_ids.len(),
            "subordinates assigned"
        );
        Ok(supervisor)
    }

    pub async fn list_subordinates(&self, employee_id: EmployeeId) -> Result<Option<Vec<Employee>>> {
        let mut tx = self.store.begin().await?;
        if lookup::find(tx.as_mut(), employee_id).await?.is_none() {
            return Ok(None);
        }
        tx.get_by_supervisor(employee_id).await.map(Some)
    }

    /// Supervisors of `employee_id`, nearest first, ending at a root.
    pub async fn reporting_chain(&self, employee_id: EmployeeId) -> Result<Option<Vec<Employee>>> {
        let mut tx = self.store.begin().await?;
        let Some(employee) = lookup::find(tx.as_mut(), employee_id).await? else {
            return Ok(None);
        };

        let bound = tx.count().await?;
        let mut chain = Vec::new();
        let mut next = employee.supervisor_id;
        while let Some(supervisor_id) = next {
            if chain.len() >= bound {
                return Err(LibError::inconsistent(
                    "Reporting hierarchy is inconsistent",
                    anyhow!("reporting chain of {} exceeds {} employees", employee_id, bound),
                ));
            }
            let Some(supervisor) = lookup::find(tx.as_mut(), supervisor_id).await? else {
                break;
            };
            next = supervisor.supervisor_id;
            chain.push(supervisor);
        }

        Ok(Some(chain))
    }

    pub async fn check_integrity(&self) -> Result<IntegrityReport> {
        let mut tx = self.store.begin().await?;
        let employees = tx.list().await?;
        let report = invariants::integrity_report(&employees);
        if !report.valid {
            tracing::warn!(violations = ?report.violations, "hierarchy integrity violations found");
        }
        Ok(report)
    }
}

/// Runs the cycle guard for one supervisor assignment.
async fn assign_supervisor(
    tx: &mut dyn EmployeeTx,
    employee_id: EmployeeId,
    supervisor_id: EmployeeId,
) -> Result<()> {
    if guards::would_create_cycle(tx, employee_id, supervisor_id).await? {
        tracing::debug!(
            employee_id = %employee_id,
            supervisor_id = %supervisor_id,
            "supervisor assignment refused, cycle"
        );
        return Err(LibError::conflict(
            "hierarchy_cycle",
            "Cannot assign supervisor that creates a cycle",
            anyhow!(
                "assigning supervisor {} to employee {} creates a cycle",
                supervisor_id,
                employee_id
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::invariants::ensure_hierarchy_invariants;
    use crate::memory::InMemoryEmployeeStore;

    fn operations() -> HierarchyOperations {
        HierarchyOperations::new(Arc::new(InMemoryEmployeeStore::new()))
    }

    fn payload(first_name: &str, supervisor_id: Option<EmployeeId>) -> CreateEmployeePayload {
        CreateEmployeePayload {
            first_name: Some(first_name.to_string()),
            last_name: Some("Doe".to_string()),
            position: Some("Engineer".to_string()),
            supervisor_id: supervisor_id.map(|id| json!(id.0)),
        }
    }

    async fn create(ops: &HierarchyOperations, name: &str, supervisor: Option<EmployeeId>) -> Employee {
        ops.create_employee(payload(name, supervisor))
            .await
            .expect("create should succeed")
    }

    async fn fetch(ops: &HierarchyOperations, id: EmployeeId) -> Employee {
        ops.get_employee(id)
            .await
            .expect("get should succeed")
            .expect("employee should exist")
    }

    fn supervisor_patch(supervisor_id: EmployeeId) -> EmployeePatch {
        EmployeePatch {
            supervisor: Some(SupervisorAssignment::Assign(supervisor_id)),
            ..Default::default()
        }
    }

    async fn assert_hierarchy_holds(ops: &HierarchyOperations) {
        let employees = ops.list_employees().await.expect("list should succeed");
        ensure_hierarchy_invariants(&employees).expect("hierarchy should be a forest");
    }

    #[tokio::test]
    async fn create_with_unknown_supervisor_fails() {
        let ops = operations();
        let err = ops
            .create_employee(payload("A", Some(EmployeeId(41))))
            .await
            .expect_err("unknown supervisor should fail");

        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.code, "supervisor_not_found");
        assert!(ops.list_employees().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn cycle_through_update_is_rejected_and_leaves_employee_unchanged() {
        let ops = operations();
        let a = create(&ops, "A", None).await;
        let b = create(&ops, "B", Some(a.id)).await;
        assert_eq!(b.supervisor_id, Some(a.id));

        let patch = EmployeePatch {
            first_name: Some("Renamed".to_string()),
            ..supervisor_patch(b.id)
        };
        let err = ops
            .update_employee(a.id, patch)
            .await
            .expect_err("cycle should be rejected");

        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.code, "hierarchy_cycle");
        assert_eq!(err.public, "Cannot assign supervisor that creates a cycle");
        assert_eq!(fetch(&ops, a.id).await, a);
    }

    #[tokio::test]
    async fn self_supervision_is_rejected() {
        let ops = operations();
        let a = create(&ops, "A", None).await;

        let err = ops
            .update_employee(a.id, supervisor_patch(a.id))
            .await
            .expect_err("self supervision should be rejected");
        assert_eq!(err.code, "hierarchy_cycle");
    }

    #[tokio::test]
    async fn update_with_unknown_supervisor_fails() {
        let ops = operations();
        let a = create(&ops, "A", None).await;

        let err = ops
            .update_employee(a.id, supervisor_patch(EmployeeId(999)))
            .await
            .expect_err("unknown supervisor should fail");
        assert_eq!(err.code, "supervisor_not_found");
    }

    #[tokio::test]
    async fn delete_requires_no_subordinates() {
        let ops = operations();
        let a = create(&ops, "A", None).await;
        let b = create(&ops, "B", Some(a.id)).await;

        let err = ops
            .delete_employee(a.id)
            .await
            .expect_err("supervisor delete should fail");
        assert_eq!(err.code, "supervisor_has_subordinates");
        assert_eq!(fetch(&ops, a.id).await, a);

        assert!(ops.delete_employee(b.id).await.expect("delete b").is_some());
        assert!(ops.delete_employee(a.id).await.expect("delete a").is_some());
        assert!(ops.list_employees().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_employee_is_empty() {
        let ops = operations();
        assert!(ops.delete_employee(EmployeeId(5)).await.expect("delete").is_none());
    }

    #[tokio::test]
    async fn add_subordinates_reassigns_and_rejects_cycles() {
        let ops = operations();
        let a = create(&ops, "A", None).await;
        let b = create(&ops, "B", None).await;
        let c = create(&ops, "C", None).await;

        let supervisor = ops
            .add_subordinates(a.id, &[b.id, c.id])
            .await
            .expect("batch should succeed");
        assert_eq!(supervisor, a);
        assert_eq!(fetch(&ops, b.id).await.supervisor_id, Some(a.id));
        assert_eq!(fetch(&ops, c.id).await.supervisor_id, Some(a.id));

        let before = ops.list_employees().await.expect("list");
        let err = ops
            .add_subordinates(c.id, &[a.id])
            .await
            .expect_err("cycle should be rejected");
        assert_eq!(err.code, "hierarchy_cycle");
        assert_eq!(ops.list_employees().await.expect("list"), before);
    }

    #[tokio::test]
    async fn add_subordinates_is_all_or_nothing() {
        let ops = operations();
        let a = create(&ops, "A", None).await;
        let b = create(&ops, "B", None).await;
        let c = create(&ops, "C", None).await;
        let before = ops.list_employees().await.expect("list");

        let err = ops
            .add_subordinates(a.id, &[b.id, EmployeeId(404), c.id])
            .await
            .expect_err("unknown subordinate should fail");
        assert_eq!(err.code, "subordinate_not_found");
        assert_eq!(ops.list_employees().await.expect("list"), before);
    }

    #[tokio::test]
    async fn add_subordinates_rejects_supervisor_in_its_own_list() {
        let ops = operations();
        let a = create(&ops, "A", None).await;
        let b = create(&ops, "B", None).await;

        let err = ops
            .add_subordinates(a.id, &[b.id, a.id])
            .await
            .expect_err("self supervision should be rejected");
        assert_eq!(err.code, "hierarchy_cycle");
        assert_eq!(fetch(&ops, b.id).await.supervisor_id, None);
    }

    #[tokio::test]
    async fn add_subordinates_with_unknown_supervisor_fails() {
        let ops = operations();
        let b = create(&ops, "B", None).await;
        let err = ops
            .add_subordinates(EmployeeId(77), &[b.id])
            .await
            .expect_err("unknown supervisor should fail");
        assert_eq!(err.code, "supervisor_not_found");
    }

    #[tokio::test]
    async fn add_subordinates_with_empty_list_returns_supervisor() {
        let ops = operations();
        let a = create(&ops, "A", None).await;
        let supervisor = ops.add_subordinates(a.id, &[]).await.expect("no-op batch");
        assert_eq!(supervisor, a);
    }

    #[tokio::test]
    async fn update_unknown_employee_is_empty() {
        let ops = operations();
        let patch = EmployeePatch {
            first_name: Some("X".to_string()),
            ..Default::default()
        };
        assert!(ops.update_employee(EmployeeId(999), patch).await.expect("update").is_none());
    }

    #[tokio::test]
    async fn blank_supervisor_makes_employee_a_root() {
        let ops = operations();
        let a = create(&ops, "A", None).await;
        let b = create(&ops, "B", Some(a.id)).await;

        let payload: UpdateEmployeePayload =
            serde_json::from_value(json!({ "supervisorId": "" })).expect("payload");
        let updated = ops
            .update_employee(b.id, payload.normalize().expect("patch"))
            .await
            .expect("update")
            .expect("employee exists");
        assert_eq!(updated.supervisor_id, None);
        assert_eq!(updated.first_name, b.first_name);
        assert_eq!(updated.created_at, b.created_at);
    }

    #[tokio::test]
    async fn update_touches_only_named_fields() {
        let ops = operations();
        let a = create(&ops, "A", None).await;
        let b = create(&ops, "B", Some(a.id)).await;

        let patch = EmployeePatch {
            position: Some("Manager".to_string()),
            ..Default::default()
        };
        let updated = ops
            .update_employee(b.id, patch)
            .await
            .expect("update")
            .expect("employee exists");
        assert_eq!(updated.position, "Manager");
        assert_eq!(updated.first_name, "B");
        assert_eq!(updated.supervisor_id, Some(a.id));
    }

    #[tokio::test]
    async fn subordinates_and_reporting_chain() {
        let ops = operations();
        let ceo = create(&ops, "CEO", None).await;
        let cto = create(&ops, "CTO", Some(ceo.id)).await;
        let dev = create(&ops, "Dev", Some(cto.id)).await;

        let reports = ops
            .list_subordinates(ceo.id)
            .await
            .expect("subordinates")
            .expect("ceo exists");
        assert_eq!(reports, vec![cto.clone()]);

        let chain = ops
            .reporting_chain(dev.id)
            .await
            .expect("chain")
            .expect("dev exists");
        assert_eq!(chain, vec![cto, ceo]);

        assert!(ops.reporting_chain(EmployeeId(50)).await.expect("chain").is_none());
    }

    #[tokio::test]
    async fn execute_dispatches_tagged_operations() {
        let ops = operations();
        let created = ops
            .execute(
                serde_json::from_value(json!({
                    "operation": "create",
                    "payload": { "firstName": "A", "lastName": "Doe", "position": "CEO" }
                }))
                .expect("operation"),
            )
            .await
            .expect("create");
        let EmployeeOperationResult::Employee { employee } = created else {
            panic!("expected an employee result");
        };

        let missing = ops
            .execute(EmployeeOperation::Get {
                employee_id: EmployeeId(employee.id.0 + 1),
            })
            .await
            .expect("get");
        assert!(matches!(missing, EmployeeOperationResult::NotFound { .. }));

        let report = ops
            .execute(EmployeeOperation::CheckIntegrity)
            .await
            .expect("integrity");
        assert!(matches!(
            report,
            EmployeeOperationResult::Integrity { report } if report.valid && report.employee_count == 1
        ));
    }

    #[tokio::test]
    async fn random_reassignments_keep_the_hierarchy_a_forest() {
        let ops = operations();
        let mut ids = Vec::new();
        for idx in 0..12 {
            ids.push(create(&ops, &format!("E{idx}"), None).await.id);
        }

        let mut state = 0x9e37_79b9_7f4a_7c15u64;
        for _ in 0..300 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let subject = ids[(state >> 33) as usize % ids.len()];
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let supervisor = ids[(state >> 33) as usize % ids.len()];

            let outcome = if state % 2 == 0 {
                ops.update_employee(subject, supervisor_patch(supervisor))
                    .await
                    .map(|_| ())
            } else {
                ops.add_subordinates(supervisor, &[subject]).await.map(|_| ())
            };
            if let Err(err) = outcome {
                assert_eq!(err.code, "hierarchy_cycle");
            }
            assert_hierarchy_holds(&ops).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reassignments_cannot_race_into_a_cycle() {
        let ops = operations();
        let a = create(&ops, "A", None).await.id;
        let b = create(&ops, "B", None).await.id;

        for _ in 0..50 {
            let first = {
                let ops = ops.clone();
                tokio::spawn(async move { ops.update_employee(a, supervisor_patch(b)).await })
            };
            let second = {
                let ops = ops.clone();
                tokio::spawn(async move { ops.add_subordinates(a, &[b]).await })
            };
            let first = first.await.expect("task should finish");
            let second = second.await.expect("task should finish");
            assert!(first.is_err() || second.is_err());
            assert_hierarchy_holds(&ops).await;

            for id in [a, b] {
                let reset = EmployeePatch {
                    supervisor: Some(SupervisorAssignment::Clear),
                    ..Default::default()
                };
                ops.update_employee(id, reset).await.expect("reset");
            }
        }
    }
}
