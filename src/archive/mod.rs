pub mod aggregate;
pub mod audit;
pub mod category;
pub mod config;
pub mod grep;
pub mod manifest;
pub mod match_set;
pub mod paths;
pub mod pipeline;
pub mod remote;
pub mod scx_log;
pub mod users;
pub mod util;
pub mod warn;
