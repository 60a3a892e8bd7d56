//! HTTP front end: static home page, `/chat` endpoint, health, and `/static` assets.

mod error;
mod handlers;
mod router;
mod server;

pub use error::GatewayError;
pub use server::GatewayServer;
