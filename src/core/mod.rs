//! 核心编排层：错误与恢复、回合状态、任务调度、主控回合

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;
pub mod task_scheduler;

pub use error::{ErrorKind, TripError};
pub use orchestrator::{build_orchestrator, create_orchestrator, TripOrchestrator};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use state::{StepView, TurnResponse, TurnStatus};
pub use task_scheduler::TaskScheduler;
