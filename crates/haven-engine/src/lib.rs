//! The client engine: conversation routing, streamed-reply assembly, the
//! session timer, history loading, and the session facade that ties them
//! together over a connection manager and a chat backend.

pub mod assembler;
pub mod history;
pub mod router;
pub mod session;
pub mod timer;
pub mod welcome;

pub use assembler::ReplyAssembler;
pub use history::{HistoryLoader, DEFAULT_HISTORY_LIMIT};
pub use router::ConversationRouter;
pub use session::{ChatSession, SessionSignal};
pub use timer::{SessionTimer, TimerEvent, TimerState, DEFAULT_SESSION_BUDGET_SECS};
pub use welcome::WelcomeCatalog;
