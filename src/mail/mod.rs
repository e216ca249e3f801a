pub mod classify;
pub mod decoders;
pub mod fetch;
pub mod query;
