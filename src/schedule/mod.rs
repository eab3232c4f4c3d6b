// Scheduled uploads: the JSON queue, folder import and the polling daemon

pub mod import;
pub mod models;
pub mod runner;
pub mod store;

pub use import::{import_folder, list_videos, ImportOptions};
pub use models::{parse_schedule_time, ScheduledUpload, UploadStatus};
pub use runner::{install_shutdown_handler, PassSummary, ScheduleRunner};
pub use store::{ScheduleStore, UploadHistory};
