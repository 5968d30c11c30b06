//! Flex Web Service report jobs
//!
//! Two-phase protocol: `SendRequest` returns a reference code, and
//! `GetStatement` is polled with it until the statement has been generated.

pub mod backoff;
pub mod envelope;
pub mod parser;
pub mod registry;
pub mod service;
pub mod transport;

pub use backoff::PollSchedule;
pub use envelope::{FetchOutcome, ResponseClassifier, SubmitOutcome};
pub use parser::parse;
pub use registry::{IdempotencyResult, JobRegistry};
pub use service::FlexQueryService;
pub use transport::{RemoteResponse, StatementTransport, TransportError};
