pub mod algorithms;
#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod guards;
pub mod invariants;
pub mod lookup;
pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

pub mod prelude {
    pub use crate::algorithms::{has_cycle, subordinate_map, top_down_order};
    #[cfg(feature = "api")]
    pub use crate::api::{AppError, HierarchyApp};
    #[cfg(feature = "sqlx")]
    pub use crate::db::{PgEmployeeStore, create_employee_tables};
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::guards::{has_subordinates, would_create_cycle};
    pub use crate::invariants::{ensure_hierarchy_invariants, integrity_report};
    pub use crate::memory::InMemoryEmployeeStore;
    pub use crate::models::{
        CreateEmployeePayload, Employee, EmployeeId, EmployeePatch, HierarchyViolation,
        IntegrityReport, NewEmployee, SupervisorAssignment, UpdateEmployeePayload,
    };
    pub use crate::operations::{EmployeeOperation, EmployeeOperationResult, HierarchyOperations};
    pub use crate::store::{EmployeeStore, EmployeeTx};
}
