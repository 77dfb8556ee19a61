pub mod error;
pub mod handler;
pub mod queue;
pub mod sanitize;
pub mod types;

pub use error::PipelineError;
pub use handler::{HandlerSettings, MediaDownloader, MediaIngestionHandler};
pub use queue::{channel, DispatchSummary, Dispatcher, JobQueue, JobReceiver};
pub use sanitize::{sanitize, SanitizedTitle};
pub use types::{CleanupOutcome, HandlerReport, HandlerState, MediaHandle, MediaNotification};
