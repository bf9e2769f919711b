//! Petrel is an HTTP application framework core for Rust: a hierarchical
//! router with parameter capture, composable middleware, a streaming
//! response lifecycle with chained writers, content-negotiated compression,
//! rate limiting, CORS, request body parsing, WebSockets with a graceful
//! close handshake, and structured logging.
//!
//! ```no_run
//! use petrel::config::Config;
//! use petrel::http::{Request, Response};
//! use petrel::petrel_error::PetrelResult;
//! use petrel::server::ServerBuilder;
//!
//! fn hello(request: &mut Request, response: &mut Response) -> PetrelResult<()> {
//!   let name = request.param("name").unwrap_or("world").to_string();
//!   response.string(format!("Hello, {}!", name))
//! }
//!
//! fn main() -> PetrelResult<()> {
//!   petrel::logging::init_pretty(log::LevelFilter::Info).ok();
//!
//!   let server = ServerBuilder::new()
//!     .config(Config::default())
//!     .router(|r| r.route_get("/hello/{name}", hello))?
//!     .build()?;
//!
//!   server.run()
//! }
//! ```

pub mod config;
pub mod data;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod multipart;
pub mod petrel_error;
pub mod router;
pub mod server;
pub mod stream;
pub mod testing;
pub mod walk;
pub mod websocket;

mod util;

pub use config::Config;
pub use data::Data;
pub use http::{Request, Response, StatusCode};
pub use petrel_error::{PetrelError, PetrelResult};
pub use router::{Router, RouterBuilder};
pub use server::{Server, ServerBuilder};
