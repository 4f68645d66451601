pub mod db;
pub mod model;

pub use db::Store;
pub use model::{
    DepartmentStats, NewSalary, SalaryFilter, SalaryRecord, SalaryStats, SubDepartmentStats,
};
