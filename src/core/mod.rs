pub mod errors;
pub mod models;
pub mod status;

pub use errors::{FetchError, MutationError, SubscriptionError};
pub use models::{Field, JobRecord, PLACEHOLDER, Parameter, Progress, RawJob};
pub use status::{cancel_allowed, status_label};
