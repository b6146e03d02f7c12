//! HTTP client layer for the OctoFHIR platform provider
//!
//! - [`Session`]: validated configuration, derived endpoints, IAM and UAA
//!   token slots with single-flight refresh
//! - [`Orchestrator`]: bounded retries with exponential backoff, credential
//!   refresh on auth failures and cooperative cancellation
//! - [`RestClient`] and [`ServiceApi`]: the uniform call contract every
//!   service adapter is written against

pub mod envelope;
pub mod error;
pub mod grant;
pub mod rest;
pub mod retry;
pub mod session;

pub use envelope::ResponseEnvelope;
pub use error::{CallError, ClientError, ErrorKind, Result};
pub use grant::Token;
pub use rest::{RestClient, ServiceApi, ServiceResult};
pub use retry::{DEFAULT_RETRY_ON, Orchestrator, Refresher, RetryPolicy, retry_on_with};
pub use session::{Realm, Session, SessionRefresher};

pub use tokio_util::sync::CancellationToken;
