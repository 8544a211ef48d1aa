pub mod connection;
pub mod connections;
pub mod executor;
pub mod logging;
pub mod records;
pub mod row_key;
pub mod schema;
pub mod session;
pub mod sort;
pub mod sql_builder;
pub mod tabs;

#[cfg(test)]
pub(crate) mod testing;
