pub mod api;
pub mod coordinator;
pub mod model;
pub mod setup;
pub mod switch;

pub use api::{Error, ErrorKind};
