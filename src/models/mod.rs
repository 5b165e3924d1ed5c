//! Plain records exchanged between the proxy, the queries and the dashboard.

pub mod pagination;
pub mod records;
pub mod resource;
pub mod snapshot;
