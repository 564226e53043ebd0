pub mod answer_store;
pub mod prompt_builder;
pub mod query_protocol;
pub mod response_parser;
pub mod scripts;

pub use answer_store::{AnswerRecord, AnswerStore};
pub use prompt_builder::PromptBuilder;
pub use query_protocol::{QueryStream, StreamEvent, StreamStatus, StreamingQueryProtocol};
pub use response_parser::{parse_answer, try_parse_partial, BilingualAnswer, UNPARSED_SENTINEL};
