pub mod sample;
pub mod service;
pub mod store;

pub use service::{AppState, ServiceConfig, build_router, create_app};
pub use store::BlobStore;
