pub mod config;
pub mod delta;
pub mod output;
pub mod partition;
pub mod pipeline;
pub mod project;
pub mod reading;
pub mod routes;
