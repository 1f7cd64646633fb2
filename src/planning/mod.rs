//! 行程计划：类型、构建、重新规划、执行引擎、过程事件与结果追问

pub mod builder;
pub mod engine;
pub mod events;
pub mod inquiry;
pub mod replanner;
pub mod types;

pub use builder::build_plan;
pub use engine::{progress_line, report, ExecutionReport, PlanExecutor};
pub use events::PlanEvent;
pub use inquiry::{answer_inquiry, inquiry_topic, InquiryAnswer};
pub use replanner::{ReplanDecision, Replanner};
pub use types::{Plan, PlanStep, ResultMap, StepKind, StepStatus};
