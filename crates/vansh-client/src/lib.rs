//! Network side of the VANSH client: configuration, the session context,
//! the HTTP API client and the Socket.IO push subscriber.

pub mod api;
pub mod backoff;
pub mod config;
pub mod error;
pub mod push;
pub mod session;

pub use api::{ApiClient, JobAccepted, ProjectPatch};
pub use backoff::Backoff;
pub use config::{Config, Overrides};
pub use error::{ApiError, ConfigError, PushError, SessionError};
pub use push::{PushClient, PushHandle, PushNotice};
pub use session::{Session, SessionContext, SessionStore};
