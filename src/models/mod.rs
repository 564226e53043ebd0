pub mod loaders;
pub mod work_item;

pub use loaders::{load_all_job_files, load_job_file, load_jobs};
pub use work_item::{Conversation, ExistingVariants, JobFile, WorkItem};
