//! editlock-core: edit-lease state machines for collaborative documents.
//! Activity tracking, lease reconciliation, edit buffers, timers and the
//! per-document edit session. No IO: time is passed in and every remote
//! call leaves as a `Command`.

pub mod activity;
pub mod buffer;
pub mod command;
pub mod config;
pub mod error;
pub mod generation;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod types;

pub use activity::ActivityTracker;
pub use buffer::{EditBuffer, SaveTicket};
pub use command::{Command, Completion, InactivityChoice, Input, Intent, LeaveChoice, Prompt};
pub use config::TimingConfig;
pub use error::{ConfigError, SessionError};
pub use generation::{Generation, GenerationCounter};
pub use reconciler::{LeaseReconciler, LeaseView};
pub use registry::SessionRegistry;
pub use scheduler::{TimerKind, TimerPlan, TimerSet};
pub use session::{AfterExit, EditSession, LeaseLoss, Mode, Phase};
pub use types::{
    AcquireOutcome, DocumentId, DocumentSnapshot, ForceTakeOutcome, HeartbeatOutcome, Holder,
    Lease, LeaseStatus, Notice, Participant, PollOutcome, PushEvent, Role, SaveOutcome, UserId,
};
