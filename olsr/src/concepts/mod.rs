pub mod dedup;
pub mod interface;
pub mod link;
pub mod metric;
pub mod neighbour;
pub mod packet;
pub mod route;
pub mod topology;
