//! Budget-based cost/quality grading of traces.

mod budget;
mod scoring;

pub use budget::{
    default_budget_config, BudgetConfig, BudgetScenario, CostBudget, CostBudgetOverride, CostResult, QualityBudget, QualityBudgetOverride, QualityResult,
};
pub use scoring::{EvalError, EvalReport, EvalResult, Evaluator, SuiteRunner};
