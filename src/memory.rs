use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{LibError, Result};
use crate::models::{Employee, EmployeeId, NewEmployee};
use crate::store::{EmployeeStore, EmployeeTx};

#[derive(Debug, Clone, Default)]
struct Table {
    next_id: i64,
    employees: BTreeMap<EmployeeId, Employee>,
    reports: HashMap<EmployeeId, BTreeSet<EmployeeId>>,
}

impl Table {
    fn link(&mut self, employee_id: EmployeeId, supervisor_id: Option<EmployeeId>) {
        if let Some(supervisor_id) = supervisor_id {
            self.reports
                .entry(supervisor_id)
                .or_default()
                .insert(employee_id);
        }
    }

    fn unlink(&mut self, employee_id: EmployeeId, supervisor_id: Option<EmployeeId>) {
        let Some(supervisor_id) = supervisor_id else {
            return;
        };
        if let Some(reports) = self.reports.get_mut(&supervisor_id) {
            reports.remove(&employee_id);
            if reports.is_empty() {
                self.reports.remove(&supervisor_id);
            }
        }
    }

    fn ensure_supervisor_exists(&self, supervisor_id: Option<EmployeeId>) -> Result<()> {
        match supervisor_id {
            Some(supervisor_id) if !self.employees.contains_key(&supervisor_id) => {
                Err(LibError::conflict(
                    "hierarchy_reference_conflict",
                    "Request conflicts with the current reporting hierarchy",
                    anyhow!("supervisor {} does not exist", supervisor_id),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Process-local employee store.
///
/// Transactions are serialised behind one async mutex. Each transaction works on
/// a private copy of the table and swaps it in on commit, so readers never see
/// a half-applied operation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEmployeeStore {
    table: Arc<Mutex<Table>>,
}

impl InMemoryEmployeeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads rows verbatim, without hierarchy checks. New ids continue after
    /// the highest loaded id.
    pub fn from_snapshot(employees: Vec<Employee>) -> Self {
        let mut table = Table::default();
        for employee in employees {
            table.next_id = table.next_id.max(employee.id.0);
            table.link(employee.id, employee.supervisor_id);
            table.employees.insert(employee.id, employee);
        }
        Self {
            table: Arc::new(Mutex::new(table)),
        }
    }
}

#[async_trait]
impl EmployeeStore for InMemoryEmployeeStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn EmployeeTx + 'a>> {
        let committed = self.table.lock().await;
        let working = committed.clone();
        Ok(Box::new(MemoryTx { committed, working }))
    }
}

struct MemoryTx<'a> {
    committed: MutexGuard<'a, Table>,
    working: Table,
}

#[async_trait]
impl EmployeeTx for MemoryTx<'_> {
    async fn get(&mut self, id: EmployeeId) -> Result<Option<Employee>> {
        Ok(self.working.employees.get(&id).cloned())
    }

    async fn get_by_supervisor(&mut self, supervisor_id: EmployeeId) -> Result<Vec<Employee>> {
        let Some(reports) = self.working.reports.get(&supervisor_id) else {
            return Ok(Vec::new());
        };
        Ok(reports
            .iter()
            .filter_map(|id| self.working.employees.get(id))
            .cloned()
            .collect())
    }

    async fn list(&mut self) -> Result<Vec<Employee>> {
        Ok(self.working.employees.values().cloned().collect())
    }

    async fn count(&mut self) -> Result<usize> {
        Ok(self.working.employees.len())
    }

    async fn insert(
        &mut self,
        employee: NewEmployee,
        created_at: NaiveDateTime,
    ) -> Result<Employee> {
        self.working.ensure_supervisor_exists(employee.supervisor_id)?;

        self.working.next_id += 1;
        let stored = Employee {
            id: EmployeeId(self.working.next_id),
            first_name: employee.first_name,
            last_name: employee.last_name,
            position: employee.position,
            supervisor_id: employee.supervisor_id,
            created_at,
        };
        self.working.link(stored.id, stored.supervisor_id);
        self.working.employees.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn save(&mut self, employee: &Employee) -> Result<Employee> {
        self.working.ensure_supervisor_exists(employee.supervisor_id)?;

        let previous = self.working.employees.get(&employee.id).ok_or_else(|| {
            LibError::not_found_with_code(
                "employee_not_found",
                "Employee not found",
                anyhow!("cannot save unknown employee {}", employee.id),
            )
        })?;
        let previous_supervisor = previous.supervisor_id;

        let mut stored = employee.clone();
        // created_at is fixed at insert time.
        stored.created_at = previous.created_at;
        self.working.unlink(stored.id, previous_supervisor);
        self.working.link(stored.id, stored.supervisor_id);
        self.working.employees.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete(&mut self, id: EmployeeId) -> Result<()> {
        if self.working.reports.contains_key(&id) {
            return Err(LibError::conflict(
                "hierarchy_reference_conflict",
                "Request conflicts with the current reporting hierarchy",
                anyhow!("employee {} is still referenced as a supervisor", id),
            ));
        }
        let removed = self.working.employees.remove(&id).ok_or_else(|| {
            LibError::not_found_with_code(
                "employee_not_found",
                "Employee not found",
                anyhow!("cannot delete unknown employee {}", id),
            )
        })?;
        self.working.unlink(removed.id, removed.supervisor_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx {
            mut committed,
            working,
        } = *self;
        *committed = working;
        Ok(())
    }
}
