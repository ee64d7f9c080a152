pub mod models;
pub mod stomp;

pub use models::*;
