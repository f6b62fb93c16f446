//! FTP control channel: commands out, (multi-line) replies in

use super::stream::{FtpStream, TlsSettings};
use ferromirror_types::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::trace;

/// A complete server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three digit reply code
    pub code: u32,
    /// Reply lines with the code prefix kept
    pub lines: Vec<String>,
}

impl Reply {
    /// Text of the reply without codes, lines joined by spaces
    pub fn text(&self) -> String {
        let code = self.code.to_string();
        self.lines
            .iter()
            .map(|line| {
                if line.starts_with(&code) {
                    line.get(4..).unwrap_or("").trim()
                } else {
                    line.trim()
                }
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 1xx
    pub fn is_preliminary(&self) -> bool {
        self.code / 100 == 1
    }

    /// 2xx
    pub fn is_completion(&self) -> bool {
        self.code / 100 == 2
    }

    /// 3xx
    pub fn is_intermediate(&self) -> bool {
        self.code / 100 == 3
    }

    /// Turn an unexpected reply into an error
    pub fn into_error(self) -> Error {
        let text = self.text();
        match self.code {
            421 => Error::network(format!("421 {text} (server closing control connection)")),
            530 => Error::connection(format!("Login failed: {text}")),
            code => Error::protocol(Some(code), text),
        }
    }
}

/// The control connection of one FTP session
pub struct ControlChannel {
    stream: BufReader<FtpStream>,
}

impl ControlChannel {
    /// Wrap a connected stream
    pub fn new(stream: FtpStream) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Whether the control connection is encrypted
    pub fn is_secure(&self) -> bool {
        self.stream.get_ref().is_secure()
    }

    /// Host the control connection is attached to
    pub fn peer_ip(&self) -> Result<std::net::IpAddr> {
        Ok(self.stream.get_ref().peer_addr()?.ip())
    }

    /// Upgrade a plain control connection after `AUTH TLS`
    pub async fn upgrade(self, tls: &TlsSettings) -> Result<Self> {
        match self.stream.into_inner() {
            FtpStream::Plain(tcp) => Ok(Self::new(tls.wrap(tcp).await?)),
            FtpStream::Tls(_) => Err(Error::connection("Control connection is already encrypted")),
        }
    }

    /// Send one command line
    pub async fn send(&mut self, command: &str) -> Result<()> {
        if command.starts_with("PASS ") {
            trace!(">>> PASS ***");
        } else {
            trace!(">>> {}", command);
        }
        let stream = self.stream.get_mut();
        stream.write_all(format!("{command}\r\n").as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(Error::network("connection closed by server"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Read one reply, following `NNN-` continuation lines
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let mut lines = vec![first];

        if lines[0].as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{code} ");
            loop {
                let next = self.read_line().await?;
                let done = next.starts_with(&terminator) || next == code.to_string();
                lines.push(next);
                if done {
                    break;
                }
            }
        }

        let reply = Reply { code, lines };
        trace!("<<< {} {}", reply.code, reply.text());
        Ok(reply)
    }

    /// Send a command and read its reply
    pub async fn execute(&mut self, command: &str) -> Result<Reply> {
        self.send(command).await?;
        self.read_reply().await
    }

    /// Send a command and require a 2xx reply
    pub async fn expect_ok(&mut self, command: &str) -> Result<Reply> {
        let reply = self.execute(command).await?;
        if reply.is_completion() {
            Ok(reply)
        } else {
            Err(reply.into_error())
        }
    }
}

fn parse_code(line: &str) -> Result<u32> {
    line.get(..3)
        .and_then(|code| code.parse::<u32>().ok())
        .filter(|code| (100..600).contains(code))
        .ok_or_else(|| Error::network(format!("malformed reply from server: '{line}'")))
}

/// Extract the directory from a `257 "/path" ...` reply; `""` inside is an escaped quote
pub fn parse_pwd(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let mut path = String::new();
    let mut chars = text[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                path.push('"');
                chars.next();
            } else {
                return Some(path);
            }
        } else {
            path.push(c);
        }
    }
    None
}
