pub mod guarded_fetch;
pub mod queries;
pub mod sql_client;

pub use guarded_fetch::{GuardedFetcher, QueryState};
pub use queries::{BudokanQueries, PhaseFilter};
pub use sql_client::{SqlClient, SqlRow, SqlTransport};
