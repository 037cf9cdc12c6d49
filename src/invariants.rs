use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::anyhow;

use crate::algorithms::top_down_order;
use crate::error::{LibError, Result};
use crate::models::{Employee, EmployeeId, HierarchyViolation, IntegrityReport};

pub fn hierarchy_violations(employees: &[Employee]) -> Vec<HierarchyViolation> {
    let supervisors: HashMap<EmployeeId, Option<EmployeeId>> = employees
        .iter()
        .map(|employee| (employee.id, employee.supervisor_id))
        .collect();

    let mut violations = Vec::new();
    for employee in employees {
        let Some(supervisor_id) = employee.supervisor_id else {
            continue;
        };
        if supervisor_id == employee.id {
            violations.push(HierarchyViolation::SelfSupervision {
                employee_id: employee.id,
            });
        } else if !supervisors.contains_key(&supervisor_id) {
            violations.push(HierarchyViolation::UnknownSupervisorReference {
                employee_id: employee.id,
                supervisor_id,
            });
        }
    }

    let ordered: HashSet<EmployeeId> = top_down_order(employees)
        .into_iter()
        .map(|employee| employee.id)
        .collect();
    let unordered: Vec<EmployeeId> = employees
        .iter()
        .map(|employee| employee.id)
        .filter(|id| !ordered.contains(id))
        .collect();

    // Unordered employees sit on a loop or report into one; keep the loops only.
    let mut seen_loops = HashSet::new();
    for start in &unordered {
        let Some(members) = loop_through(*start, &supervisors, unordered.len()) else {
            continue;
        };
        if members.len() < 2 {
            continue;
        }
        let employee_ids = members.into_iter().collect::<Vec<_>>();
        if seen_loops.insert(employee_ids.clone()) {
            violations.push(HierarchyViolation::CycleDetected { employee_ids });
        }
    }

    violations
}

/// Follows supervisor links from `start` and returns the loop members when the
/// walk comes back to `start` within `bound` hops.
fn loop_through(
    start: EmployeeId,
    supervisors: &HashMap<EmployeeId, Option<EmployeeId>>,
    bound: usize,
) -> Option<BTreeSet<EmployeeId>> {
    let mut members = BTreeSet::from([start]);
    let mut current = start;
    for _ in 0..bound {
        let next = supervisors.get(&current).copied().flatten()?;
        if next == start {
            return Some(members);
        }
        members.insert(next);
        current = next;
    }
    None
}

pub fn integrity_report(employees: &[Employee]) -> IntegrityReport {
    let violations = hierarchy_violations(employees);
    IntegrityReport {
        valid: violations.is_empty(),
        employee_count: employees.len(),
        violations,
    }
}

pub fn ensure_hierarchy_invariants(employees: &[Employee]) -> Result<()> {
    let violations = hierarchy_violations(employees);
    if let Some(first) = violations.first() {
        return Err(LibError::inconsistent(
            first.public_message(),
            anyhow!(
                "hierarchy validation failed ({}): {:?}",
                first.error_code(),
                violations
            ),
        ));
    }

    Ok(())
}
