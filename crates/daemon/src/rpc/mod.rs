// JSON-RPC bridge: method dispatch over newline-delimited stdio.

pub mod methods;
pub mod stdio;
