pub mod http;
pub mod webhook;

pub use http::{router, AppState, Server};
