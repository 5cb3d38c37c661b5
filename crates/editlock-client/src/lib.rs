//! editlock-client: IO boundary to the lease authority.
//! HTTP lease and save calls behind a mock-injectable transport, and the
//! WebSocket push channel. No session logic lives here.

pub mod backoff;
pub mod error;
pub mod lease;
pub mod push;
pub mod save;
pub mod transport;
pub mod wire;

pub use backoff::{BackoffPolicy, ReconnectBackoff};
pub use error::TransportError;
pub use lease::{LeaseClient, ReleaseOutcome};
pub use push::{PushChannel, PushSignal, parse_push_frame};
pub use save::SaveCoordinator;
pub use transport::{HttpTransport, LockTransport, Method, Reply};
