// Persistence: backing files for working copies.

pub mod backing;
