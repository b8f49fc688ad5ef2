pub mod app;
pub mod conn;
pub mod error;
pub mod handler;
pub mod server;
pub mod session;

pub use conn::{ConnectionHandle, ConnectionId, StreamInfo};
pub use error::{Error, Result};
pub use handler::Handler;
pub use server::Server;
pub use session::{SessionHandle, SessionId, SessionState};
