use std::collections::{HashMap, VecDeque};

use crate::models::{Employee, EmployeeId};

/// Supervisor id to the ids of its direct subordinates, in input order.
pub fn subordinate_map(employees: &[Employee]) -> HashMap<EmployeeId, Vec<EmployeeId>> {
    let mut subordinates: HashMap<EmployeeId, Vec<EmployeeId>> =
        HashMap::with_capacity(employees.len());
    for employee in employees {
        subordinates.entry(employee.id).or_default();
    }
    for employee in employees {
        let Some(supervisor_id) = employee.supervisor_id else {
            continue;
        };
        // Best-effort behavior: references to unknown supervisors are skipped.
        if let Some(children) = subordinates.get_mut(&supervisor_id) {
            children.push(employee.id);
        }
    }
    subordinates
}

/// Orders employees so that every supervisor comes before its subordinates.
///
/// Employees on a loop never become ready and are left out, so a result
/// shorter than the input means the reporting lines contain a cycle.
pub fn top_down_order(employees: &[Employee]) -> Vec<&Employee> {
    let lookup: HashMap<EmployeeId, &Employee> =
        employees.iter().map(|employee| (employee.id, employee)).collect();
    let subordinates = subordinate_map(employees);

    let mut queue = employees
        .iter()
        .filter(|employee| match employee.supervisor_id {
            None => true,
            Some(supervisor_id) => !lookup.contains_key(&supervisor_id),
        })
        .map(|employee| employee.id)
        .collect::<VecDeque<_>>();

    let mut ordered = Vec::with_capacity(employees.len());
    while let Some(employee_id) = queue.pop_front() {
        if let Some(employee) = lookup.get(&employee_id) {
            ordered.push(*employee);
        }
        if let Some(children) = subordinates.get(&employee_id) {
            // Each employee has at most one supervisor, so every child is
            // ready as soon as its supervisor is placed.
            queue.extend(children.iter().copied());
        }
    }

    ordered
}

pub fn has_cycle(employees: &[Employee]) -> bool {
    top_down_order(employees).len() != employees.len()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::models::{Employee, EmployeeId};

    fn employee(id: i64, supervisor_id: Option<i64>) -> Employee {
        Employee {
            id: EmployeeId(id),
            first_name: format!("E{id}"),
            last_name: "Doe".to_string(),
            position: "Engineer".to_string(),
            supervisor_id: supervisor_id.map(EmployeeId),
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn forest_has_no_cycle() {
        let employees = vec![
            employee(3, Some(1)),
            employee(1, None),
            employee(2, Some(1)),
            employee(4, None),
        ];
        assert!(!super::has_cycle(&employees));

        let order = super::top_down_order(&employees)
            .into_iter()
            .map(|employee| employee.id.0)
            .collect::<Vec<_>>();
        let position = |id: i64| order.iter().position(|candidate| *candidate == id);
        assert_eq!(order.len(), 4);
        assert!(position(1) < position(3));
        assert!(position(1) < position(2));
    }

    #[test]
    fn cycle_detects_properly() {
        let employees = vec![employee(1, Some(2)), employee(2, Some(1)), employee(3, None)];
        assert!(super::has_cycle(&employees));
        assert_eq!(super::top_down_order(&employees).len(), 1);
    }

    #[test]
    fn self_supervision_is_a_cycle() {
        let employees = vec![employee(1, Some(1))];
        assert!(super::has_cycle(&employees));
    }

    #[test]
    fn subordinate_map_skips_unknown_supervisors() {
        let employees = vec![employee(1, None), employee(2, Some(1)), employee(3, Some(9))];
        let map = super::subordinate_map(&employees);
        assert_eq!(map[&EmployeeId(1)], vec![EmployeeId(2)]);
        assert!(!map.contains_key(&EmployeeId(9)));
    }
}
