pub mod postgres;
pub mod store;
pub mod sync;

pub use postgres::PostgresStore;
pub use store::{FakeStore, Store};
pub use sync::{Bus, ClusterSync, InMemoryBus};
