pub mod component;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod invocation;
pub mod transaction;
