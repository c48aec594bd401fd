pub mod handlers;
pub mod server;

pub use handlers::{ApiError, DevServiceConfig, DevState};
pub use server::DevServer;
