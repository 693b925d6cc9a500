pub mod client;
pub mod mime;
pub mod provider;
pub mod rules;
