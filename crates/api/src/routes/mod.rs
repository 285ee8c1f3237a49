mod api;
mod engine;
mod health;

pub use api::api_router;
pub use engine::engine_router;
pub use health::health_router;
