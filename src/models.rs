use std::collections::BTreeMap;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LibError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub i64);

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EmployeeId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        i64::from_str(s).map(Self)
    }
}

impl From<i64> for EmployeeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A persisted employee. Always carries a store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub position: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<EmployeeId>,
    pub created_at: NaiveDateTime,
}

/// An employee that has not been persisted yet; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    pub first_name: String,
    pub last_name: String,
    pub position: String,
    pub supervisor_id: Option<EmployeeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorAssignment {
    /// The employee becomes a root.
    Clear,
    Assign(EmployeeId),
}

/// Field-presence patch: `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub supervisor: Option<SupervisorAssignment>,
}

impl EmployeePatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.position.is_none()
            && self.supervisor.is_none()
    }

    /// Applies the attribute fields. The supervisor field needs the hierarchy
    /// checks and is left to the caller.
    pub fn apply_attributes(&self, employee: &mut Employee) {
        if let Some(first_name) = &self.first_name {
            employee.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            employee.last_name = last_name.clone();
        }
        if let Some(position) = &self.position {
            employee.position = position.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HierarchyViolation {
    UnknownSupervisorReference {
        employee_id: EmployeeId,
        supervisor_id: EmployeeId,
    },
    SelfSupervision {
        employee_id: EmployeeId,
    },
    CycleDetected {
        employee_ids: Vec<EmployeeId>,
    },
}

impl HierarchyViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            HierarchyViolation::UnknownSupervisorReference { .. } => "hierarchy_unknown_supervisor",
            HierarchyViolation::SelfSupervision { .. } => "hierarchy_self_supervision",
            HierarchyViolation::CycleDetected { .. } => "hierarchy_cycle",
        }
    }

    pub const fn public_message(&self) -> &'static str {
        match self {
            HierarchyViolation::UnknownSupervisorReference { .. } => {
                "Employee references a supervisor that does not exist"
            }
            HierarchyViolation::SelfSupervision { .. } => "Employee cannot supervise themselves",
            HierarchyViolation::CycleDetected { .. } => "Reporting lines must not form a cycle",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub valid: bool,
    pub employee_count: usize,
    pub violations: Vec<HierarchyViolation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmployeePayload {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub supervisor_id: Option<Value>,
}

/// Raw PATCH body. Only the keys present in the object are touched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct UpdateEmployeePayload(pub Map<String, Value>);

const FIRST_NAME_REQUIRED: &str = "First name is required";
const LAST_NAME_REQUIRED: &str = "Last name is required";
const POSITION_REQUIRED: &str = "Position is required";
const INVALID_SUPERVISOR_ID: &str = "Invalid supervisor ID format";

impl CreateEmployeePayload {
    pub fn normalize(self) -> Result<NewEmployee> {
        let mut rejected = BTreeMap::new();
        let first_name = required_text(
            &mut rejected,
            "firstName",
            FIRST_NAME_REQUIRED,
            self.first_name,
        );
        let last_name = required_text(&mut rejected, "lastName", LAST_NAME_REQUIRED, self.last_name);
        let position = required_text(&mut rejected, "position", POSITION_REQUIRED, self.position);

        let supervisor_id = match self.supervisor_id.as_ref().map(parse_supervisor_ref) {
            None => None,
            Some(Ok(supervisor_id)) => supervisor_id,
            Some(Err(message)) => {
                rejected.insert("supervisorId", message);
                None
            }
        };

        match (first_name, last_name, position) {
            (Some(first_name), Some(last_name), Some(position)) if rejected.is_empty() => {
                Ok(NewEmployee {
                    first_name,
                    last_name,
                    position,
                    supervisor_id,
                })
            }
            _ => Err(LibError::invalid_fields(rejected)),
        }
    }
}

impl UpdateEmployeePayload {
    pub fn normalize(self) -> Result<EmployeePatch> {
        let mut rejected = BTreeMap::new();
        let mut patch = EmployeePatch::default();

        for (field, value) in self.0 {
            match field.as_str() {
                "firstName" => {
                    patch.first_name =
                        required_text(&mut rejected, "firstName", FIRST_NAME_REQUIRED, as_text(value));
                }
                "lastName" => {
                    patch.last_name =
                        required_text(&mut rejected, "lastName", LAST_NAME_REQUIRED, as_text(value));
                }
                "position" => {
                    patch.position =
                        required_text(&mut rejected, "position", POSITION_REQUIRED, as_text(value));
                }
                "supervisorId" => match parse_supervisor_ref(&value) {
                    Ok(Some(supervisor_id)) => {
                        patch.supervisor = Some(SupervisorAssignment::Assign(supervisor_id));
                    }
                    Ok(None) => patch.supervisor = Some(SupervisorAssignment::Clear),
                    Err(message) => {
                        rejected.insert("supervisorId", message);
                    }
                },
                // id and createdAt are immutable; unknown keys are ignored.
                _ => {}
            }
        }

        if rejected.is_empty() {
            Ok(patch)
        } else {
            Err(LibError::invalid_fields(rejected))
        }
    }
}

/// Accepts a number, a numeric string, `null` or a blank string (no supervisor).
pub fn parse_supervisor_ref(value: &Value) -> std::result::Result<Option<EmployeeId>, &'static str> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .map(|id| Some(EmployeeId(id)))
            .ok_or(INVALID_SUPERVISOR_ID),
        Value::String(raw) => {
            let raw = raw.trim();
            if raw.is_empty() {
                Ok(None)
            } else {
                raw.parse::<EmployeeId>()
                    .map(Some)
                    .map_err(|_| INVALID_SUPERVISOR_ID)
            }
        }
        _ => Err(INVALID_SUPERVISOR_ID),
    }
}

fn as_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        _ => None,
    }
}

fn required_text(
    rejected: &mut BTreeMap<&'static str, &'static str>,
    field: &'static str,
    message: &'static str,
    value: Option<String>,
) -> Option<String> {
    let text = value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    if text.is_none() {
        rejected.insert(field, message);
    }
    text
}
