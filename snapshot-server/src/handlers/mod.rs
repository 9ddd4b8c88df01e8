pub mod snapshot;
pub mod ws;
