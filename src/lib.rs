pub mod connection;
pub mod daemon;
pub mod error;
pub mod expression;
pub mod session;
pub mod settings;

pub use error::Error;
