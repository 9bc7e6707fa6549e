pub mod concepts;
pub mod config;
pub mod etx;
pub mod feedback;
pub mod forward;
pub mod framework;
pub mod hello;
pub mod metric_file;
pub mod mpr;
pub mod route_calc;
pub mod router;
pub mod stats;
pub mod tc;
pub mod timeout;
pub mod tuple_base;
pub mod util;
