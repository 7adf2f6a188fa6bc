// draftsync-daemon library entry point.

pub mod config;
pub mod engine;
pub mod fs;
pub mod rpc;
pub mod runtime;
pub mod security;
pub mod store;
pub mod transmit;
