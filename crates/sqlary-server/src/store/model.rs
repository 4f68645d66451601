use serde::{Deserialize, Serialize};

/// A persisted salary row. `id` is assigned by the store on insert and is
/// never reused. `on_contract` is stored as INTEGER 0/1 and exposed as bool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryRecord {
    pub id: i64,
    pub name: String,
    pub salary: f64,
    pub currency: String,
    pub on_contract: bool,
    pub department: String,
    pub sub_department: String,
}

/// Input side of a create operation — everything but the identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSalary {
    pub name: String,
    pub salary: f64,
    pub currency: String,
    pub on_contract: bool,
    pub department: String,
    pub sub_department: String,
}

impl NewSalary {
    pub fn into_record(self, id: i64) -> SalaryRecord {
        SalaryRecord {
            id,
            name: self.name,
            salary: self.salary,
            currency: self.currency,
            on_contract: self.on_contract,
            department: self.department,
            sub_department: self.sub_department,
        }
    }
}

/// Aggregates over the matching record set. SQL aggregates over an empty set
/// are NULL, surfaced here as `None` and serialized as JSON null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryStats {
    pub avg: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
}

/// One row per distinct `department` value in the matching set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentStats {
    pub department: String,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
}

/// One row per distinct `(department, sub_department)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubDepartmentStats {
    pub department: String,
    pub sub_department: String,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
}

/// Optional equality constraints narrowing an aggregate query. When both
/// fields are set, both must hold. `currency` is expected uppercased by the
/// caller; this layer applies no normalization of its own.
#[derive(Debug, Clone, Default)]
pub struct SalaryFilter {
    pub currency: Option<String>,
    pub on_contract: Option<bool>,
}
