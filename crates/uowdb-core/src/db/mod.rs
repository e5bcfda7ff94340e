//! The runtime: engine, committed tables, pool, instances, sessions,
//! and the query surface.

pub mod engine;
pub mod instance;
pub mod pool;
pub mod query;
pub mod row;
pub mod session;

pub(crate) mod table;

pub use engine::{DEFAULT_POOL_CAPACITY, Engine};
pub use instance::{Instance, Lifecycle};
pub use pool::{Connection, ConnectionPool};
pub use query::Query;
pub use row::Row;
pub use session::Session;
