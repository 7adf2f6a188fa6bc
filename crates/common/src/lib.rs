// draftsync-common: wire types and utilities shared by the daemon and its clients

pub mod path;
pub mod protocol;
pub mod types;
