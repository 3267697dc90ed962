//! Database layer
//!
//! SQLite (default, single file deployment) and MySQL are both supported.
//! The driver is selected by configuration; repositories dispatch on
//! [`DatabasePool::backend`] and keep one query function per backend.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
