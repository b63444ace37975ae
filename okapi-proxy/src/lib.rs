pub mod connection;
pub mod engine;
pub mod pool;
pub mod response;
pub mod worker;

pub use engine::{run_pipeline, Body, Outcome};
pub use worker::{spawn_bus_listener, spawn_workers, SharedState};
