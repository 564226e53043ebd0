pub mod guard;
pub mod logging;

pub use guard::{ProcessingFlag, ProcessingGuard};
