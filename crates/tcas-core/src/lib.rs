pub mod config;
pub mod error;
pub mod proto;

pub use error::{CasError, CasResult, Code, TcasError, TcasResult};
