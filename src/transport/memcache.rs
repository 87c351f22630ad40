//! Memcached ASCII Protocol Client
//!
//! A blocking, single-connection client speaking the memcached text
//! protocol: `get`, `set`, `delete`, `flush_all` and `version`.
//!
//! ## Compression
//!
//! Payloads larger than the configured threshold are zlib-compressed when
//! that shrinks them by at least the configured fraction. Compressed items
//! carry [`FLAG_COMPRESSED`] in their flags and are inflated on `get`.

use std::borrow::Cow;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::trace;

use super::{Transport, TransportError, TransportResult};

// == Public Constants ==
/// Payload size above which compression is attempted.
pub const COMPRESS_THRESHOLD: usize = 20_000;

/// Minimum fraction a compressed payload must save to be stored compressed.
pub const COMPRESS_SAVINGS: f64 = 0.2;

/// Item flag marking a zlib-compressed payload.
pub const FLAG_COMPRESSED: u32 = 0x2;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const IO_TIMEOUT: Duration = Duration::from_secs(3);

// == Memcache Transport ==
#[derive(Debug)]
pub struct MemcacheTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    /// `0` disables compression
    compress_threshold: usize,
    compress_savings: f64,
}

impl MemcacheTransport {
    /// Opens a connection to `host:port`, trying each resolved address.
    pub fn connect(host: &str, port: u16) -> TransportResult<Self> {
        let mut last_err = None;

        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address resolved for {}:{}", host, port),
                )
            })
            .into())
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> TransportResult<Self> {
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        stream.set_nodelay(true)?;

        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            compress_threshold: 0,
            compress_savings: 0.0,
        })
    }

    fn send(&mut self, parts: &[&[u8]]) -> io::Result<()> {
        for part in parts {
            self.writer.write_all(part)?;
        }
        self.writer.flush()
    }

    fn read_line(&mut self) -> TransportResult<String> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            return Err(TransportError::Protocol("connection closed".to_string()));
        }
        if !line.ends_with(b"\r\n") {
            return Err(TransportError::Protocol(
                "unterminated reply line".to_string(),
            ));
        }
        line.truncate(line.len() - 2);

        let line = String::from_utf8(line)
            .map_err(|_| TransportError::Protocol("reply line is not UTF-8".to_string()))?;
        trace!(reply = %line, "memcached reply");
        Ok(line)
    }

    fn encode<'a>(&self, payload: &'a [u8]) -> (u32, Cow<'a, [u8]>) {
        if self.compress_threshold > 0 && payload.len() > self.compress_threshold {
            if let Ok(compressed) = deflate(payload) {
                let ceiling = payload.len() as f64 * (1.0 - self.compress_savings);
                if (compressed.len() as f64) < ceiling {
                    return (FLAG_COMPRESSED, Cow::Owned(compressed));
                }
            }
        }
        (0, Cow::Borrowed(payload))
    }
}

impl Transport for MemcacheTransport {
    fn get(&mut self, key: &str) -> TransportResult<Option<Vec<u8>>> {
        let key = wire_key(key);
        self.send(&[b"get ", key.as_bytes(), b"\r\n"])?;

        let line = self.read_line()?;
        if line == "END" {
            return Ok(None);
        }
        check_server_error(&line)?;

        // VALUE <key> <flags> <bytes> [<cas unique>]
        let mut fields = line.split(' ');
        if fields.next() != Some("VALUE") {
            return Err(unexpected(&line));
        }
        if fields.next() != Some(&*key) {
            return Err(TransportError::Protocol(format!(
                "reply for another key: {}",
                line
            )));
        }
        let flags: u32 = parse_field(fields.next(), &line)?;
        let len: usize = parse_field(fields.next(), &line)?;

        let mut data = vec![0u8; len + 2];
        self.reader.read_exact(&mut data)?;
        if !data.ends_with(b"\r\n") {
            return Err(TransportError::Protocol(
                "data block not terminated".to_string(),
            ));
        }
        data.truncate(len);

        let end = self.read_line()?;
        if end != "END" {
            return Err(unexpected(&end));
        }

        if flags & FLAG_COMPRESSED != 0 {
            data = inflate(&data)?;
        }

        Ok(Some(data))
    }

    fn set(&mut self, key: &str, payload: &[u8], exptime: u64) -> TransportResult<bool> {
        let key = wire_key(key);
        let (flags, data) = self.encode(payload);
        let header = format!("set {} {} {} {}\r\n", key, flags, exptime, data.len());

        self.send(&[header.as_bytes(), &data[..], b"\r\n"])?;

        match self.read_line()?.as_str() {
            "STORED" => Ok(true),
            "NOT_STORED" => Ok(false),
            other => {
                check_server_error(other)?;
                Err(unexpected(other))
            }
        }
    }

    fn delete(&mut self, key: &str) -> TransportResult<bool> {
        let key = wire_key(key);
        self.send(&[b"delete ", key.as_bytes(), b"\r\n"])?;

        match self.read_line()?.as_str() {
            "DELETED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => {
                check_server_error(other)?;
                Err(unexpected(other))
            }
        }
    }

    fn flush(&mut self) -> TransportResult<bool> {
        self.send(&[b"flush_all\r\n"])?;

        match self.read_line()?.as_str() {
            "OK" => Ok(true),
            other => {
                check_server_error(other)?;
                Err(unexpected(other))
            }
        }
    }

    fn version(&mut self) -> TransportResult<String> {
        self.send(&[b"version\r\n"])?;

        let line = self.read_line()?;
        check_server_error(&line)?;
        line.strip_prefix("VERSION ")
            .map(str::to_string)
            .ok_or_else(|| unexpected(&line))
    }

    fn set_compress_threshold(&mut self, threshold: usize, min_savings: f64) -> TransportResult<()> {
        if !(0.0..=1.0).contains(&min_savings) {
            return Err(TransportError::Protocol(format!(
                "compression savings {} must lie between 0 and 1",
                min_savings
            )));
        }
        self.compress_threshold = threshold;
        self.compress_savings = min_savings;
        Ok(())
    }
}

// == Helpers ==
/// Replaces whitespace and control characters, which the text protocol
/// cannot carry inside a key.
fn wire_key(key: &str) -> Cow<'_, str> {
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Cow::Owned(
            key.chars()
                .map(|c| if c.is_whitespace() || c.is_control() { '_' } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(key)
    }
}

fn check_server_error(line: &str) -> TransportResult<()> {
    if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") {
        return Err(TransportError::Server(line.to_string()));
    }
    Ok(())
}

fn unexpected(line: &str) -> TransportError {
    TransportError::Protocol(format!("unexpected reply: {}", line))
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, line: &str) -> TransportResult<T> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| unexpected(line))
}

fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}
