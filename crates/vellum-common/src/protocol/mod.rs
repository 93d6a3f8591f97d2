pub mod commands;
pub mod error;
pub mod headers;
pub mod topology;


pub use commands::{next_write_id, Command, WriteId};
pub use error::{Result, VellumError};
pub use topology::{ServerNode, ServerRole, Topology};
