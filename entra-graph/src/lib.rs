mod credential;
mod graph_client;
mod models;
mod retry;

pub use credential::*;
pub use graph_client::*;
pub use models::*;
pub use retry::{parse_retry_after, RetryPolicy, Throttle};
