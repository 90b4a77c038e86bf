//! SSMS MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools and resources
//! for AI assistants to work with two SQL Server databases, `master` and
//! `datamgmt`: guarded queries, generated CRUD statements, catalog
//! introspection and stored procedure calls.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::SsmsService;
