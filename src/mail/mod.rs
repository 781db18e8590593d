pub mod delegates;
pub mod endpoints;
pub mod error;
pub mod relay;
pub mod schemas;
