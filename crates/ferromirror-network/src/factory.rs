//! Protocol client construction

use crate::ftp::FtpClient;
use crate::sftp::SftpClient;
use ferromirror_types::{Protocol, ProtocolClient, TimeoutConfig};

/// Builds a fresh, disconnected client for a protocol tag
///
/// This is the one place that knows which type speaks which protocol; the
/// rest of the workspace only sees [`ProtocolClient`].
pub trait ClientFactory: Send + Sync {
    /// Create a client for `protocol`
    fn create(&self, protocol: Protocol) -> Box<dyn ProtocolClient>;
}

/// Factory for the built-in FTP, FTPS and SFTP clients
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClientFactory {
    timeouts: TimeoutConfig,
}

impl DefaultClientFactory {
    /// Factory with custom transport timeouts
    pub fn with_timeouts(timeouts: TimeoutConfig) -> Self {
        Self { timeouts }
    }
}

impl ClientFactory for DefaultClientFactory {
    fn create(&self, protocol: Protocol) -> Box<dyn ProtocolClient> {
        match protocol {
            Protocol::Ftp => Box::new(FtpClient::new().with_timeouts(self.timeouts)),
            Protocol::Ftps => Box::new(FtpClient::secure().with_timeouts(self.timeouts)),
            Protocol::Sftp => Box::new(SftpClient::new().with_timeouts(self.timeouts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Protocol::Ftp)]
    #[case(Protocol::Ftps)]
    #[case(Protocol::Sftp)]
    fn test_factory_matches_protocol(#[case] protocol: Protocol) {
        let client = DefaultClientFactory::default().create(protocol);
        assert_eq!(client.protocol(), protocol);
        assert!(!client.is_connected());
    }
}
