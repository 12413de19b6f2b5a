//! Cloud HTTP API backend: REST client, connection, and table.

pub mod client;
pub mod db;
pub mod table;

pub use client::{QueryResponse, RestClient, TableDescription, TableSummary};
pub use db::RemoteConnection;
pub use table::RemoteTable;
