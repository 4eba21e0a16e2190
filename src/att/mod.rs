//! Attribute Protocol.
//!
//! PDU encoders used by the host API ([`notification`], [`indication`]) and
//! [`AttServer`], the default [`AttributeServer`](crate::core::AttributeServer).

mod pdu;
mod server;

pub use pdu::{
    ERROR_RSP_LEN, error, error_response, exchange_mtu_response, expects_response, indication,
    notification, opcode,
};
pub use server::AttServer;
