//! Generated protobuf types for the Porto supervisor protocol.

#![allow(clippy::enum_variant_names)]

/// Request/response messages (porto.rpc)
pub mod rpc {
    tonic::include_proto!("porto.rpc");
}

pub use rpc::*;
