//! Default attribute server.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::pdu::{self, error, opcode};
use crate::core::{ATT_DEFAULT_MTU, ATT_MAX_MTU, AttributeServer, DEFAULT_SERVER_MTU};
use crate::hci::ConnHandle;

/// Minimal ATT server with an empty attribute database.
///
/// Negotiates the MTU and answers every other request with
/// "Request Not Supported". Applications with a GATT database plug in their
/// own [`AttributeServer`].
#[derive(Debug)]
pub struct AttServer {
    server_mtu: u16,
    mtus: HashMap<ConnHandle, u16>,
}

impl AttServer {
    /// Create a server offering `server_mtu`, clamped to `23..=517`.
    pub fn new(server_mtu: u16) -> Self {
        Self {
            server_mtu: server_mtu.clamp(ATT_DEFAULT_MTU, ATT_MAX_MTU),
            mtus: HashMap::new(),
        }
    }

    /// MTU offered in Exchange MTU Responses.
    pub fn server_mtu(&self) -> u16 {
        self.server_mtu
    }

    /// Negotiated MTU for `handle` (23 until exchanged).
    pub fn mtu(&self, handle: ConnHandle) -> u16 {
        self.mtus.get(&handle).copied().unwrap_or(ATT_DEFAULT_MTU)
    }

    fn exchange_mtu(&mut self, handle: ConnHandle, request: &[u8], response: &mut [u8]) -> Option<usize> {
        let [_, lo, hi] = *request else {
            return pdu::error_response(opcode::EXCHANGE_MTU_REQ, 0, error::INVALID_PDU, response);
        };
        let client_mtu = u16::from_le_bytes([lo, hi]);
        let mtu = client_mtu.clamp(ATT_DEFAULT_MTU, self.server_mtu);
        debug!(%handle, client_mtu, mtu, "ATT MTU exchanged");
        self.mtus.insert(handle, mtu);
        pdu::exchange_mtu_response(self.server_mtu, response)
    }
}

impl Default for AttServer {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_MTU)
    }
}

impl AttributeServer for AttServer {
    fn handle_pdu(&mut self, handle: ConnHandle, request: &[u8], response: &mut [u8]) -> Option<usize> {
        let op = *request.first()?;
        trace!(%handle, op, len = request.len(), "ATT PDU");
        match op {
            opcode::EXCHANGE_MTU_REQ => self.exchange_mtu(handle, request, response),
            op if pdu::expects_response(op) => {
                pdu::error_response(op, 0x0000, error::REQUEST_NOT_SUPPORTED, response)
            }
            _ => None,
        }
    }

    fn on_disconnect(&mut self, handle: ConnHandle) {
        self.mtus.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDLE: ConnHandle = ConnHandle::new(0x0040);

    #[test]
    fn test_exchange_mtu() {
        let mut server = AttServer::new(247);
        let mut rsp = [0u8; 32];

        let len = server
            .handle_pdu(HANDLE, &[opcode::EXCHANGE_MTU_REQ, 0x00, 0x02], &mut rsp)
            .unwrap();
        // server always reports its own receive MTU
        assert_eq!(&rsp[..len], &[opcode::EXCHANGE_MTU_RSP, 0xf7, 0x00]);
        assert_eq!(server.mtu(HANDLE), 247);

        server
            .handle_pdu(HANDLE, &[opcode::EXCHANGE_MTU_REQ, 0x40, 0x00], &mut rsp)
            .unwrap();
        assert_eq!(server.mtu(HANDLE), 64);

        server
            .handle_pdu(HANDLE, &[opcode::EXCHANGE_MTU_REQ, 0x05, 0x00], &mut rsp)
            .unwrap();
        assert_eq!(server.mtu(HANDLE), ATT_DEFAULT_MTU);
    }

    #[test]
    fn test_malformed_mtu_request() {
        let mut server = AttServer::default();
        let mut rsp = [0u8; 32];
        let len = server
            .handle_pdu(HANDLE, &[opcode::EXCHANGE_MTU_REQ, 0x00], &mut rsp)
            .unwrap();
        assert_eq!(
            &rsp[..len],
            &[opcode::ERROR_RSP, opcode::EXCHANGE_MTU_REQ, 0, 0, error::INVALID_PDU]
        );
    }

    #[test]
    fn test_unsupported_request() {
        let mut server = AttServer::default();
        let mut rsp = [0u8; 32];
        let len = server
            .handle_pdu(HANDLE, &[opcode::READ_REQ, 0x03, 0x00], &mut rsp)
            .unwrap();
        assert_eq!(
            &rsp[..len],
            &[opcode::ERROR_RSP, opcode::READ_REQ, 0, 0, error::REQUEST_NOT_SUPPORTED]
        );
    }

    #[test]
    fn test_no_response() {
        let mut server = AttServer::default();
        let mut rsp = [0u8; 32];
        assert_eq!(server.handle_pdu(HANDLE, &[], &mut rsp), None);
        assert_eq!(
            server.handle_pdu(HANDLE, &[opcode::WRITE_CMD, 0x03, 0x00, 0x01], &mut rsp),
            None
        );
        assert_eq!(
            server.handle_pdu(HANDLE, &[opcode::HANDLE_VALUE_CFM], &mut rsp),
            None
        );
    }

    #[test]
    fn test_disconnect_forgets_mtu() {
        let mut server = AttServer::new(1000);
        assert_eq!(server.server_mtu(), ATT_MAX_MTU);

        let mut rsp = [0u8; 8];
        server.handle_pdu(HANDLE, &[opcode::EXCHANGE_MTU_REQ, 0x00, 0x01], &mut rsp);
        assert_eq!(server.mtu(HANDLE), 256);

        server.on_disconnect(HANDLE);
        assert_eq!(server.mtu(HANDLE), ATT_DEFAULT_MTU);
    }
}
