pub mod answer_flow;
pub mod unit_ctx;

pub use answer_flow::{AnswerFlow, AnswerSource};
pub use unit_ctx::UnitCtx;
