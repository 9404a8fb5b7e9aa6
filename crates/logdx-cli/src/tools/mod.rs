//! Log query tools available to the workflow

mod log_query;

pub use log_query::HttpLogQueryTool;
