//! 规划层：计划类型与规划 oracle 的边界适配

pub mod adapter;
pub mod plan;

pub use adapter::PlannerAdapter;
pub use plan::{ActionStep, LongRangePlan, Plan, PlanError, PlannedStep, Target};
