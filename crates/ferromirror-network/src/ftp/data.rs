//! Passive-mode data connections (EPSV first, PASV as fallback)

use super::control::ControlChannel;
use super::stream::{FtpStream, TlsSettings};
use ferromirror_types::{Error, Result};
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use tokio::net::TcpStream;
use tracing::debug;

fn epsv_pattern() -> Option<&'static Regex> {
    static EPSV: OnceLock<Option<Regex>> = OnceLock::new();
    EPSV.get_or_init(|| Regex::new(r"\|\|\|(\d+)\|").ok()).as_ref()
}

fn pasv_pattern() -> Option<&'static Regex> {
    static PASV: OnceLock<Option<Regex>> = OnceLock::new();
    PASV.get_or_init(|| Regex::new(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)").ok())
        .as_ref()
}

/// Port from a `229 Entering Extended Passive Mode (|||port|)` reply
pub fn parse_epsv(text: &str) -> Option<u16> {
    epsv_pattern()?.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Address from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply
pub fn parse_pasv(text: &str) -> Option<SocketAddr> {
    let caps = pasv_pattern()?.captures(text)?;
    let mut parts = [0u8; 6];
    for (i, part) in parts.iter_mut().enumerate() {
        *part = caps.get(i + 1)?.as_str().parse().ok()?;
    }
    let ip = Ipv4Addr::new(parts[0], parts[1], parts[2], parts[3]);
    let port = (u16::from(parts[4]) << 8) | u16::from(parts[5]);
    Some(SocketAddr::new(IpAddr::V4(ip), port))
}

/// Open a data connection for the next transfer command
///
/// The PASV address is only trusted for its port; the host is taken from the
/// control connection, since servers behind NAT routinely advertise private
/// addresses.
pub async fn open_data_stream(
    control: &mut ControlChannel,
    tls: Option<&TlsSettings>,
) -> Result<FtpStream> {
    let peer = control.peer_ip()?;

    let reply = control.execute("EPSV").await?;
    let addr = if reply.code == 229 {
        let port = parse_epsv(&reply.text())
            .ok_or_else(|| Error::protocol(Some(229), format!("unparsable EPSV reply: {}", reply.text())))?;
        SocketAddr::new(peer, port)
    } else {
        debug!("EPSV refused ({}), falling back to PASV", reply.code);
        let reply = control.expect_ok("PASV").await?;
        let advertised = parse_pasv(&reply.text())
            .ok_or_else(|| Error::protocol(Some(reply.code), format!("unparsable PASV reply: {}", reply.text())))?;
        SocketAddr::new(peer, advertised.port())
    };

    debug!("Opening data connection to {}", addr);
    let tcp = TcpStream::connect(addr).await?;
    match tls {
        Some(tls) if control.is_secure() => tls.wrap(tcp).await,
        _ => Ok(FtpStream::Plain(tcp)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Entering Extended Passive Mode (|||50123|)", Some(50123))]
    #[case("Entering Extended Passive Mode (|||0|)", Some(0))]
    #[case("Entering Extended Passive Mode", None)]
    fn test_parse_epsv(#[case] text: &str, #[case] expected: Option<u16>) {
        assert_eq!(parse_epsv(text), expected);
    }

    #[test]
    fn test_parse_pasv() {
        let addr = parse_pasv("Entering Passive Mode (192,168,1,10,195,80).").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(addr.port(), 195 * 256 + 80);
    }

    #[test]
    fn test_parse_pasv_rejects_out_of_range() {
        assert!(parse_pasv("Entering Passive Mode (300,1,1,1,1,1)").is_none());
        assert!(parse_pasv("Entering Passive Mode").is_none());
    }
}
