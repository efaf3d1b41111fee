pub mod cluster;
pub mod common;
pub mod filter;
pub mod galaxy;
pub mod generation_config;
pub mod job;
pub mod region;
pub mod sector;
pub mod warp_tunnel;

pub use cluster::*;
pub use common::*;
pub use filter::*;
pub use galaxy::*;
pub use generation_config::*;
pub use job::*;
pub use region::*;
pub use sector::*;
pub use warp_tunnel::*;
