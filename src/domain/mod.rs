pub mod learning;
pub mod tool;

pub use learning::{
    ErrorType, ExecutionContext, ExecutionRecord, Insight, InsightType, LearningStats, Pattern,
    PatternType, Priority, ToolStats,
};
pub use tool::{FunctionTool, Tool, ToolFuture, ToolMetadata};
