mod client;
mod handlers;
mod models;
mod state;

pub use client::RelayClient;
pub use handlers::{router, run_server};
pub use models::RecognizeRequest;
pub use state::ServerState;
