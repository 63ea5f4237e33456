// Library for the daemon, the status tool and tests

pub mod checkpoint_worker;
pub mod clock;
pub mod config;
pub mod history_repo;
pub mod models;
pub mod query;
pub mod rate;
pub mod reader;
pub mod routes;
pub mod sampler;
pub mod store;
pub mod version;
