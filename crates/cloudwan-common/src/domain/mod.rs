//! CloudWAN domain primitives
//!
//! - **Value Objects**: validated identifiers and provider handles
//! - **References**: ARN-style resource references for the attachment primitive
//! - **Network**: subnets and route bindings shared by every component

pub mod value_objects;
pub mod references;
pub mod network;

pub use value_objects::*;
pub use references::*;
pub use network::*;
