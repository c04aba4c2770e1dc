//! HTTP surface for the Agora discussion board.
//!
//! JSON endpoints for posts, comments and likes, plus one Server-Sent Events
//! stream per event kind.

mod error;
mod identity;
mod routes;
mod sse;

pub use error::WebError;
pub use identity::{ClientIdentity, connection_meta};
pub use routes::{AppState, DEFAULT_BODY_LIMIT, WebConfig, create_router};
pub use sse::{SubscriptionScope, create_sse_stream};
