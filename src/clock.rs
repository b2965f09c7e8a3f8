//! Wall-clock sources used to timestamp real-world payments.
//!
//! The amortization core never reads the time itself; callers pick a
//! [`TimeSource`] and pass timestamps in.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET: i64 = 2_208_988_800;
pub const NTP_PORT: u16 = 123;
pub const DEFAULT_TIME_SERVER: &str = "pool.ntp.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

const PACKET_LEN: usize = 48;
// LI = 0, VN = 3, Mode = 3 (client)
const CLIENT_REQUEST: u8 = 0x1b;
const MODE_SERVER: u8 = 4;

#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("cannot resolve time server {server}: {source}")]
    Resolve {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("time server {server} resolved to no address")]
    NoAddress { server: String },

    #[error("network error talking to {server}: {source}")]
    Io {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed reply from {server}: {reason}")]
    Malformed { server: String, reason: String },
}

impl ClockError {
    /// True when the server simply did not answer in time.
    pub fn is_timeout(&self) -> bool {
        match self {
            ClockError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

pub trait TimeSource {
    fn now(&self) -> Result<DateTime<Utc>, ClockError>;
}

/// The local wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        Ok(Utc::now())
    }
}

/// Always returns the same instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedClock(pub DateTime<Utc>);

impl TimeSource for FixedClock {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        Ok(self.0)
    }
}

/// Asks an SNTP server for the time, falling back to another clock when the
/// server does not answer within `timeout`. Any other failure is an error.
#[derive(Clone, Debug)]
pub struct SntpClock<F = SystemClock> {
    host: String,
    port: u16,
    timeout: Duration,
    fallback: F,
}

impl SntpClock<SystemClock> {
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_fallback(host, SystemClock)
    }
}

impl Default for SntpClock<SystemClock> {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_SERVER)
    }
}

impl<F: TimeSource> SntpClock<F> {
    pub fn with_fallback(host: impl Into<String>, fallback: F) -> Self {
        Self {
            host: host.into(),
            port: NTP_PORT,
            timeout: DEFAULT_TIMEOUT,
            fallback,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn resolve(&self) -> Result<SocketAddr, ClockError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| ClockError::Resolve {
                server: self.server(),
                source,
            })?
            .next()
            .ok_or_else(|| ClockError::NoAddress {
                server: self.server(),
            })
    }

    fn query(&self) -> Result<DateTime<Utc>, ClockError> {
        let addr = self.resolve()?;
        let io_err = |source| ClockError::Io {
            server: self.server(),
            source,
        };

        let local = if addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).map_err(io_err)?;
        socket.set_read_timeout(Some(self.timeout)).map_err(io_err)?;
        socket.set_write_timeout(Some(self.timeout)).map_err(io_err)?;

        let mut request = [0u8; PACKET_LEN];
        request[0] = CLIENT_REQUEST;
        socket.send_to(&request, addr).map_err(io_err)?;

        let mut reply = [0u8; 1024];
        let (len, _) = socket.recv_from(&mut reply).map_err(io_err)?;
        decode_reply(&reply[..len]).map_err(|reason| ClockError::Malformed {
            server: self.server(),
            reason,
        })
    }
}

impl<F: TimeSource> TimeSource for SntpClock<F> {
    fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        match self.query() {
            Ok(now) => {
                debug!("{} says it is {}", self.server(), now);
                Ok(now)
            }
            Err(err) if err.is_timeout() => {
                warn!("{}; using the fallback clock", err);
                self.fallback.now()
            }
            Err(err) => Err(err),
        }
    }
}

/// Reads the transmit timestamp out of an SNTP server reply.
pub fn decode_reply(reply: &[u8]) -> Result<DateTime<Utc>, String> {
    if reply.len() < PACKET_LEN {
        return Err(format!(
            "expected at least {} bytes, got {}",
            PACKET_LEN,
            reply.len()
        ));
    }
    let mode = reply[0] & 0x07;
    if mode != MODE_SERVER {
        return Err(format!("unexpected mode {}", mode));
    }

    let word = |at: usize| {
        u32::from_be_bytes([reply[at], reply[at + 1], reply[at + 2], reply[at + 3]])
    };
    let secs = word(40);
    let fraction = word(44);
    if secs == 0 {
        return Err("server sent no transmit timestamp".to_string());
    }

    let unix = i64::from(secs) - NTP_UNIX_OFFSET;
    let nanos = ((u64::from(fraction) * 1_000_000_000) >> 32) as u32;
    DateTime::from_timestamp(unix, nanos).ok_or_else(|| format!("timestamp {} out of range", unix))
}

#[cfg(test)]
mod tests {
    use super::{decode_reply, ClockError, FixedClock, SntpClock, TimeSource, NTP_UNIX_OFFSET};
    use chrono::{DateTime, TimeZone, Utc};
    use std::net::UdpSocket;
    use std::thread;
    use std::time::Duration;
    use test_log::test;

    fn reply_for(unix: i64, fraction: u32) -> [u8; 48] {
        let mut reply = [0u8; 48];
        reply[0] = 0x1c; // LI = 0, VN = 3, Mode = 4
        let secs = (unix + NTP_UNIX_OFFSET) as u32;
        reply[40..44].copy_from_slice(&secs.to_be_bytes());
        reply[44..48].copy_from_slice(&fraction.to_be_bytes());
        reply
    }

    fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_decode_reply() {
        let when = fixed();
        let decoded = decode_reply(&reply_for(when.timestamp(), 1 << 31)).unwrap();
        assert_eq!(decoded.timestamp(), when.timestamp());
        assert_eq!(decoded.timestamp_subsec_millis(), 500);

        assert!(decode_reply(&[0x1c; 12]).is_err());

        let mut client = reply_for(when.timestamp(), 0);
        client[0] = 0x1b;
        assert!(decode_reply(&client).is_err());

        let mut empty = [0u8; 48];
        empty[0] = 0x1c;
        assert!(decode_reply(&empty).is_err());
    }

    #[test]
    fn test_fixed_clock() {
        assert_eq!(FixedClock(fixed()).now().unwrap(), fixed());
    }

    #[test]
    fn test_sntp_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();
        let when = fixed();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 48];
            let (_, peer) = server.recv_from(&mut buf).unwrap();
            assert_eq!(buf[0], 0x1b);
            server.send_to(&reply_for(when.timestamp(), 0), peer).unwrap();
        });

        let clock = SntpClock::with_fallback("127.0.0.1", FixedClock(Utc::now()))
            .port(port)
            .timeout(Duration::from_secs(5));
        assert_eq!(clock.now().unwrap(), when);
        handle.join().unwrap();
    }

    #[test]
    fn test_timeout_falls_back() {
        // bound but silent
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();

        let clock = SntpClock::with_fallback("127.0.0.1", FixedClock(fixed()))
            .port(port)
            .timeout(Duration::from_millis(50));
        assert_eq!(clock.now().unwrap(), fixed());
        drop(server);
    }

    #[test]
    fn test_malformed_reply_propagates() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 48];
            let (_, peer) = server.recv_from(&mut buf).unwrap();
            server.send_to(b"nope", peer).unwrap();
        });

        let clock = SntpClock::with_fallback("127.0.0.1", FixedClock(fixed()))
            .port(port)
            .timeout(Duration::from_secs(5));
        let err = clock.now().unwrap_err();
        assert!(matches!(err, ClockError::Malformed { .. }));
        assert!(!err.is_timeout());
        handle.join().unwrap();
    }
}
