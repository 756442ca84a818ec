pub mod dispatcher;
pub mod health;
pub mod manifest;
pub mod protocol;
pub mod reaper;
pub mod rpc;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use dispatcher::{DispatchOutcome, RequestDispatcher, RequestKind};
pub use protocol::{McpHandler, ProtocolHandler, ServerInfo};
pub use reaper::IdleReaper;
pub use server::{build_router, start, AppState, ServerHandle};
pub use session::{McpSessionFactory, SessionEntry, SessionFactory, SessionRegistry};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use transport::{ResponseFraming, SessionTransport, StreamableHttpTransport, TransportResponse};

/// Header carrying the session token in both directions.
pub const SESSION_HEADER: &str = "mcp-session-id";
