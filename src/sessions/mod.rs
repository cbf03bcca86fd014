pub mod loader;
pub mod models;
pub mod reconstructor;

pub use loader::{group_and_sort, load_events, parse_record, LoadOutcome};
pub use models::{Event, EventKind, Session, UserEvents, UserSessionSummary};
pub use reconstructor::{reconstruct, reconstruct_all, MalformedEvent};
