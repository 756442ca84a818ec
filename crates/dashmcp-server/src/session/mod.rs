//! Session multiplexing core.
//!
//! One process serves many clients, each of which sees a private, stateful
//! protocol connection. A session id maps to exactly one [`SessionEntry`]
//! owning a handler and its transport.
//!
//! ```text
//!  HTTP /mcp ──▶ RequestDispatcher ──▶ SessionRegistry ──(miss)──▶ SessionFactory
//!                      │                     ▲    ▲
//!                      ▼                     │    │
//!            transport.handle_post     IdleReaper  ShutdownCoordinator
//!                      │
//!                      ▼
//!             handler.dispatch(raw)
//! ```

mod entry;
mod factory;
mod registry;

pub use entry::SessionEntry;
pub use factory::{McpSessionFactory, SessionFactory};
pub use registry::SessionRegistry;

#[cfg(test)]
pub(crate) mod testing;
