use alloc::{string::String, vec::Vec};

use crate::{eio::ErrorKind, net::Transport};

/// Records every call of the client. Fails connects or writes on request.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub connects: Vec<(String, u16, bool)>,
    pub written: Vec<Vec<u8>>,
    pub closes: usize,
    pub fail_connect: Option<ErrorKind>,
    pub fail_write: Option<ErrorKind>,
}

impl MockTransport {
    /// The first byte of every written packet.
    pub fn written_types(&self) -> Vec<u8> {
        self.written.iter().map(|p| p[0]).collect()
    }
}

impl Transport for MockTransport {
    type Error = ErrorKind;

    fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<(), Self::Error> {
        if let Some(e) = self.fail_connect {
            return Err(e);
        }
        self.connects.push((host.into(), port, tls));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if let Some(e) = self.fail_write {
            return Err(e);
        }
        self.written.push(bytes.into());
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}
