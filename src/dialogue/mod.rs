//! 对话状态：行程上下文、槽位追踪、语义分类器接缝

pub mod classifier;
pub mod context;
pub mod slots;

pub use classifier::{
    ExtractedSlot, Intent, IntentDecision, KeywordClassifier, SemanticClassifier, SlotExtraction,
};
pub use context::{ContextKey, MissingSlot, SetOutcome, TripContext, TripSignature};
pub use slots::{
    Provenance, SlotName, SlotSource, SlotStatus, SlotTracker, SlotValue, REQUIRED_SLOT_ORDER,
};
