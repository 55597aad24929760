//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, layers: request id, trace, timeout, concurrency)
//!     → context.rs (RequestContext from the buffered request)
//!     → routing → filters (incl. authentication gate) → upstream dispatcher
//!     → response.rs (gateway errors as JSON) or the relayed upstream response
//!     → Send to client
//! ```

pub mod context;
pub mod request;
pub mod response;
pub mod server;

pub use context::RequestContext;
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use response::error_response;
pub use server::{Gateway, HttpServer, StartupError};
