//! Durable session management.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────────┐        ┌───────────────┐
//!  │ SessionRegistry │──owns──▶ SessionActor  │  (one per session, runs in a tokio task)
//!  │  (ID → Handle)  │        │  owns state,  │
//!  └────────┬────────┘        │  drains the   │
//!           │                 │  FIFO queue   │
//!           │ clone           └───────▲───────┘
//!           ▼                         │ mpsc commands
//!  ┌─────────────────┐                │
//!  │  SessionHandle  │────────────────┘  (cheap cloneable sender)
//!  └─────────────────┘
//!
//!  ┌──────────────┐   gate → routing graph → capability tasks
//!  │  TurnEngine  │   one pending event in, one ChatInteraction out
//!  └──────────────┘
//! ```
//!
//! - **SessionActor** — owns mutable session state; drains pending events
//!   one turn at a time so no locks are held across await points and no
//!   two turns run concurrently for a session.
//! - **TurnEngine** — stateless turn execution: admission gate, handoff
//!   routing, capability invocation, interaction assembly.
//! - **SessionHandle** — cloneable reference that sends commands to an
//!   actor. All external code interacts with sessions through handles.
//! - **SessionRegistry** — maps session IDs to handles; manages actor
//!   lifecycle (create, recover, shutdown).

mod actor;
mod actor_types;
mod events;
mod handle;
mod interaction;
mod registry;
mod snapshot;
mod turn;

pub use actor_types::{ActorError, CompactionSettings, SessionMetadata};
pub use events::{PendingEvent, SessionEndReason, SessionEvent, SessionEventPayload};
pub use handle::SessionHandle;
pub use interaction::{ChatInteraction, TranscriptEntry};
pub use registry::{RecoveryResult, SessionRegistry, SessionServices};
pub use snapshot::SessionSnapshot;
pub use turn::{TurnEngine, TurnError, TurnRecord};
