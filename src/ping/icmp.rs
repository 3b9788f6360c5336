// Copyright 2017-2021 Lukas Pustina <lukas@pustina.de>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! ICMP echo transport on top of `socket2`.
//!
//! Privileged mode uses a raw socket and requires `CAP_NET_RAW` or root. Unprivileged mode uses a datagram ICMP
//! socket which only works if the caller's group is within `net.ipv4.ping_group_range`.

use std::io::{self, ErrorKind, Read};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};

const ECHO_REQUEST: u8 = 8;
const ECHO_REPLY: u8 = 0;
const HEADER_LEN: usize = 8;
const RECV_BUFFER_LEN: usize = 1500;

/// Opens echo sessions to a single address.
///
/// Implementations block and are driven from `tokio::task::spawn_blocking`.
pub trait Echo: Send + Sync {
    /// Prepares sending echo requests to `addr`. Errors are setup failures and are not retried.
    fn connect(&self, addr: Ipv4Addr) -> io::Result<Box<dyn EchoSession>>;
}

/// An open echo session.
pub trait EchoSession: Send {
    /// Sends one echo request and waits up to `timeout` for the matching reply. Returns the round trip time.
    fn echo(&mut self, seq: u16, payload: &[u8], timeout: Duration) -> io::Result<Duration>;
}

#[derive(Debug, Clone, Copy)]
pub struct IcmpEcho {
    privileged: bool,
    ttl: u32,
}

impl IcmpEcho {
    pub fn new(privileged: bool, ttl: u8) -> IcmpEcho {
        IcmpEcho {
            privileged,
            ttl: u32::from(ttl),
        }
    }
}

impl Echo for IcmpEcho {
    fn connect(&self, addr: Ipv4Addr) -> io::Result<Box<dyn EchoSession>> {
        let ty = if self.privileged { Type::RAW } else { Type::DGRAM };
        let socket = Socket::new(Domain::IPV4, ty, Some(Protocol::ICMPV4))?;
        socket.set_ttl_v4(self.ttl)?;
        socket.connect(&SocketAddrV4::new(addr, 0).into())?;

        Ok(Box::new(IcmpSession {
            socket,
            privileged: self.privileged,
            ident: rand::random(),
        }))
    }
}

struct IcmpSession {
    socket: Socket,
    privileged: bool,
    ident: u16,
}

impl EchoSession for IcmpSession {
    fn echo(&mut self, seq: u16, payload: &[u8], timeout: Duration) -> io::Result<Duration> {
        let request = echo_request(self.ident, seq, payload);
        let started = Instant::now();
        self.socket.send(&request)?;

        let mut buf = [0u8; RECV_BUFFER_LEN];
        loop {
            let remaining = timeout
                .checked_sub(started.elapsed())
                .filter(|x| !x.is_zero())
                .ok_or_else(|| io::Error::new(ErrorKind::TimedOut, "no echo reply within timeout"))?;
            self.socket.set_read_timeout(Some(remaining))?;
            let len = (&self.socket).read(&mut buf)?;

            match parse_echo_reply(&buf[..len], self.privileged) {
                // The kernel rewrites the identifier of datagram ICMP sockets
                Some((ident, reply_seq)) if reply_seq == seq && (!self.privileged || ident == self.ident) => {
                    return Ok(started.elapsed())
                }
                _ => continue,
            }
        }
    }
}

pub(crate) fn echo_request(ident: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
    packet.extend_from_slice(&[ECHO_REQUEST, 0, 0, 0]);
    packet.extend_from_slice(&ident.to_be_bytes());
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(payload);

    let checksum = checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());

    packet
}

/// Internet checksum (RFC 1071).
pub(crate) fn checksum(buf: &[u8]) -> u16 {
    let mut sum = buf
        .chunks(2)
        .map(|word| {
            let hi = u32::from(word[0]) << 8;
            let lo = word.get(1).copied().map(u32::from).unwrap_or(0);
            hi | lo
        })
        .fold(0u32, u32::wrapping_add);
    while (sum >> 16) > 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Returns identifier and sequence number of an echo reply. Raw sockets deliver the IPv4 header as well.
pub(crate) fn parse_echo_reply(buf: &[u8], with_ip_header: bool) -> Option<(u16, u16)> {
    let icmp = if with_ip_header {
        let ihl = usize::from(buf.first()? & 0x0f) * 4;
        buf.get(ihl..)?
    } else {
        buf
    };
    if icmp.len() < HEADER_LEN || icmp[0] != ECHO_REPLY {
        return None;
    }

    Some((
        u16::from_be_bytes([icmp[4], icmp[5]]),
        u16::from_be_bytes([icmp[6], icmp[7]]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    fn reply_from(request: &[u8]) -> Vec<u8> {
        let mut reply = request.to_vec();
        reply[0] = ECHO_REPLY;
        reply
    }

    fn with_ip_header(icmp: &[u8]) -> Vec<u8> {
        // Version 4, IHL 5
        let mut packet = vec![0x45];
        packet.extend_from_slice(&[0u8; 19]);
        packet.extend_from_slice(icmp);
        packet
    }

    #[test]
    fn echo_request_layout() {
        let packet = echo_request(0x1234, 7, &[8; 24]);

        assert_that(&packet.len()).is_equal_to(32);
        assert_that(&packet[0]).is_equal_to(ECHO_REQUEST);
        assert_that(&packet[1]).is_equal_to(0);
        assert_that(&packet[4..8].to_vec()).is_equal_to(vec![0x12u8, 0x34, 0x00, 0x07]);
    }

    #[test]
    fn echo_request_checksum_verifies() {
        let packet = echo_request(0xbeef, 3, b"odd length payload!");

        assert_that(&checksum(&packet)).is_equal_to(0);
    }

    #[test]
    fn checksum_of_known_header() {
        // Type 8, code 0, ident 1, seq 1
        let header = [8u8, 0, 0, 0, 0, 1, 0, 1];

        assert_that(&checksum(&header)).is_equal_to(0xf7fd);
    }

    #[test]
    fn parses_raw_reply_behind_ip_header() {
        let reply = reply_from(&echo_request(42, 2, &[8; 24]));

        assert_that(&parse_echo_reply(&with_ip_header(&reply), true))
            .is_some()
            .is_equal_to((42, 2));
    }

    #[test]
    fn parses_datagram_reply_without_ip_header() {
        let reply = reply_from(&echo_request(42, 2, &[8; 24]));

        assert_that(&parse_echo_reply(&reply, false))
            .is_some()
            .is_equal_to((42, 2));
    }

    #[test]
    fn ignores_own_echo_request() {
        let request = echo_request(42, 2, &[8; 24]);

        assert_that(&parse_echo_reply(&with_ip_header(&request), true)).is_none();
    }

    #[test]
    fn ignores_truncated_packets() {
        assert_that(&parse_echo_reply(&[], true)).is_none();
        assert_that(&parse_echo_reply(&[ECHO_REPLY, 0, 0], false)).is_none();
        assert_that(&parse_echo_reply(&[0x4f, 0, 0], true)).is_none();
    }
}
