// Copyright 2017-2021 Lukas Pustina <lukas@pustina.de>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Measures round trip times of candidate addresses with ICMP echo requests.

use std::fmt;
use std::io::{self, ErrorKind};
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::{Error, Result};

mod icmp;

pub use icmp::{Echo, EchoSession, IcmpEcho};

static PAYLOAD: [u8; 24] = [8; 24];

/// Measures the latency of a single address.
pub trait Probe: Send + Sync {
    fn probe<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Result<Duration>>;
}

/// How the round trip times of all echo replies are condensed into one latency value.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Aggregate {
    Min,
    Max,
}

impl Aggregate {
    pub fn apply(&self, samples: &[Duration]) -> Option<Duration> {
        match self {
            Aggregate::Min => samples.iter().min().copied(),
            Aggregate::Max => samples.iter().max().copied(),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct PingerOpts {
    /// Number of echo requests per address
    pub count: usize,
    /// Minimum time between the start of two echo requests
    pub interval: Duration,
    /// Time to wait for a single echo reply
    pub timeout: Duration,
    pub ttl: u8,
    pub aggregate: Aggregate,
    /// Use a raw ICMP socket; otherwise fall back to a datagram ICMP socket
    pub privileged: bool,
}

impl Default for PingerOpts {
    fn default() -> Self {
        PingerOpts {
            count: 3,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
            ttl: 128,
            aggregate: Aggregate::Min,
            privileged: true,
        }
    }
}

impl PingerOpts {
    pub fn with_aggregate(self, aggregate: Aggregate) -> PingerOpts {
        PingerOpts { aggregate, ..self }
    }

    pub fn with_privileged(self, privileged: bool) -> PingerOpts {
        PingerOpts { privileged, ..self }
    }
}

#[derive(Clone)]
pub struct Pinger {
    opts: PingerOpts,
    echo: Arc<dyn Echo>,
}

impl Default for Pinger {
    fn default() -> Self {
        Pinger::new(PingerOpts::default())
    }
}

impl Pinger {
    /// Creates a `Pinger` sending echo requests over a raw or datagram ICMP socket depending on `opts.privileged`.
    pub fn new(opts: PingerOpts) -> Pinger {
        let echo = Arc::new(IcmpEcho::new(opts.privileged, opts.ttl));
        Pinger::with_echo(opts, echo)
    }

    pub fn with_echo(opts: PingerOpts, echo: Arc<dyn Echo>) -> Pinger {
        Pinger { opts, echo }
    }

    pub fn opts(&self) -> &PingerOpts {
        &self.opts
    }

    /// Sends `count` echo requests to `ip` and returns the aggregated round trip time of all replies.
    ///
    /// Lost replies and unreachable hosts are tolerated per echo request. Fails immediately if `ip` is not a valid
    /// IPv4 address, if the ICMP socket cannot be opened, or if sending fails for any other reason. Fails after all
    /// echo requests if not a single reply has been received.
    pub async fn ping(&self, ip: &str) -> Result<Duration> {
        let addr = Ipv4Addr::from_str(ip).map_err(|_| Error::ProbeError {
            addr: ip.to_string(),
            why: "is not a valid IPv4 address".to_string(),
        })?;

        let echo = self.echo.clone();
        let mut session = task::spawn_blocking(move || echo.connect(addr))
            .await?
            .map_err(|err| Error::ProbeError {
                addr: ip.to_string(),
                why: format!("failed to open ICMP socket: {}", err),
            })?;

        let mut samples = Vec::with_capacity(self.opts.count);
        for seq in 0..self.opts.count {
            let started = Instant::now();
            let timeout = self.opts.timeout;
            let (returned, res) = task::spawn_blocking(move || {
                let res = session.echo(seq as u16, &PAYLOAD, timeout);
                (session, res)
            })
            .await?;
            session = returned;

            match res {
                Ok(rtt) => {
                    trace!("Echo reply {} from {} in {:?}", seq, addr, rtt);
                    samples.push(rtt);
                }
                Err(err) if is_lost_reply(&err) => trace!("Echo request {} to {} got no reply: {}", seq, addr, err),
                Err(err) => {
                    return Err(Error::ProbeError {
                        addr: ip.to_string(),
                        why: format!("echo request {} failed: {}", seq, err),
                    })
                }
            }
            if seq + 1 < self.opts.count {
                time::sleep_until(started + self.opts.interval).await;
            }
        }

        let latency = self.opts.aggregate.apply(&samples).ok_or_else(|| Error::ProbeError {
            addr: ip.to_string(),
            why: format!("received no reply to {} echo requests", self.opts.count),
        })?;
        debug!(
            "{} rtt of {} is {:?} ({}/{} replies)",
            self.opts.aggregate,
            addr,
            latency,
            samples.len(),
            self.opts.count
        );

        Ok(latency)
    }
}

/// Timeouts and unreachable destinations count as a lost reply; everything else aborts the probe.
fn is_lost_reply(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
            | ErrorKind::ConnectionRefused
    )
}

impl Probe for Pinger {
    fn probe<'a>(&'a self, ip: &'a str) -> BoxFuture<'a, Result<Duration>> {
        self.ping(ip).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of echo outcomes; replies in milliseconds, lost replies as error kinds.
    struct ScriptedEcho {
        connect_error: Option<ErrorKind>,
        outcomes: Arc<Mutex<VecDeque<std::result::Result<u64, ErrorKind>>>>,
        echoes: Arc<AtomicUsize>,
    }

    impl ScriptedEcho {
        fn new(outcomes: Vec<std::result::Result<u64, ErrorKind>>) -> ScriptedEcho {
            ScriptedEcho {
                connect_error: None,
                outcomes: Arc::new(Mutex::new(outcomes.into())),
                echoes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing_to_connect(kind: ErrorKind) -> ScriptedEcho {
            ScriptedEcho {
                connect_error: Some(kind),
                ..ScriptedEcho::new(vec![])
            }
        }

        fn echoes(&self) -> usize {
            self.echoes.load(Ordering::SeqCst)
        }
    }

    struct ScriptedSession {
        outcomes: Arc<Mutex<VecDeque<std::result::Result<u64, ErrorKind>>>>,
        echoes: Arc<AtomicUsize>,
    }

    impl Echo for ScriptedEcho {
        fn connect(&self, _: Ipv4Addr) -> io::Result<Box<dyn EchoSession>> {
            if let Some(kind) = self.connect_error {
                return Err(io::Error::new(kind, "Operation not permitted"));
            }
            Ok(Box::new(ScriptedSession {
                outcomes: self.outcomes.clone(),
                echoes: self.echoes.clone(),
            }))
        }
    }

    impl EchoSession for ScriptedSession {
        fn echo(&mut self, _: u16, _: &[u8], _: Duration) -> io::Result<Duration> {
            self.echoes.fetch_add(1, Ordering::SeqCst);
            match self.outcomes.lock().unwrap().pop_front() {
                Some(Ok(ms)) => Ok(Duration::from_millis(ms)),
                Some(Err(kind)) => Err(io::Error::new(kind, "scripted")),
                None => Err(io::Error::new(ErrorKind::TimedOut, "scripted")),
            }
        }
    }

    fn pinger(echo: Arc<ScriptedEcho>, interval: Duration, aggregate: Aggregate) -> Pinger {
        let opts = PingerOpts {
            interval,
            aggregate,
            ..Default::default()
        };
        Pinger::with_echo(opts, echo)
    }

    fn millis(ms: &[u64]) -> Vec<Duration> {
        ms.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn aggregate_min() {
        let samples = millis(&[30, 10, 20]);

        assert_that(&Aggregate::Min.apply(&samples))
            .is_some()
            .is_equal_to(Duration::from_millis(10));
    }

    #[test]
    fn aggregate_max() {
        let samples = millis(&[30, 10, 20]);

        assert_that(&Aggregate::Max.apply(&samples))
            .is_some()
            .is_equal_to(Duration::from_millis(30));
    }

    #[test]
    fn aggregate_without_samples() {
        assert_that(&Aggregate::Min.apply(&[])).is_none();
    }

    #[test]
    fn defaults_to_privileged_socket() {
        assert_that(&PingerOpts::default().privileged).is_true();
        assert_that(&PingerOpts::default().with_privileged(false).privileged).is_false();
    }

    #[tokio::test]
    async fn out_of_range_address_is_rejected() {
        let echo = Arc::new(ScriptedEcho::new(vec![Ok(1)]));
        let pinger = pinger(echo.clone(), Duration::from_millis(10), Aggregate::Min);

        let res = pinger.ping("999.999.999.999").await;

        assert_that(&matches!(res, Err(Error::ProbeError { .. }))).is_true();
        assert_that(&echo.echoes()).is_equal_to(0);
    }

    #[tokio::test]
    async fn sends_three_echoes_at_interval() {
        let echo = Arc::new(ScriptedEcho::new(vec![Ok(30), Ok(10), Ok(20)]));
        let interval = Duration::from_millis(50);
        let pinger = pinger(echo.clone(), interval, Aggregate::Min);

        let started = std::time::Instant::now();
        let res = pinger.ping("192.0.2.1").await;

        assert_that(&res).is_ok().is_equal_to(Duration::from_millis(10));
        assert_that(&echo.echoes()).is_equal_to(3);
        assert_that(&(started.elapsed() >= interval * 2)).is_true();
    }

    #[tokio::test]
    async fn aggregates_partial_replies() {
        let outcomes = vec![Ok(30), Err(ErrorKind::TimedOut), Ok(20)];
        let echo = Arc::new(ScriptedEcho::new(outcomes));
        let pinger = pinger(echo.clone(), Duration::from_millis(5), Aggregate::Max);

        let res = pinger.ping("192.0.2.1").await;

        assert_that(&res).is_ok().is_equal_to(Duration::from_millis(30));
        assert_that(&echo.echoes()).is_equal_to(3);
    }

    #[tokio::test]
    async fn unreachable_echoes_count_as_lost() {
        let outcomes = vec![Err(ErrorKind::HostUnreachable), Err(ErrorKind::WouldBlock), Ok(7)];
        let echo = Arc::new(ScriptedEcho::new(outcomes));
        let pinger = pinger(echo.clone(), Duration::from_millis(5), Aggregate::Min);

        let res = pinger.ping("192.0.2.1").await;

        assert_that(&res).is_ok().is_equal_to(Duration::from_millis(7));
    }

    #[tokio::test]
    async fn no_reply_fails_after_all_echoes() {
        let echo = Arc::new(ScriptedEcho::new(vec![]));
        let pinger = pinger(echo.clone(), Duration::from_millis(5), Aggregate::Min);

        let res = pinger.ping("192.0.2.1").await;

        assert_that(&echo.echoes()).is_equal_to(3);
        match res {
            Err(Error::ProbeError { addr, why }) => {
                assert_that(&addr.as_str()).is_equal_to("192.0.2.1");
                assert_that(&why.as_str()).contains("no reply to 3 echo requests");
            }
            other => panic!("expected ProbeError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn socket_setup_failure_fails_immediately_with_cause() {
        let echo = Arc::new(ScriptedEcho::failing_to_connect(ErrorKind::PermissionDenied));
        let interval = Duration::from_secs(1);
        let pinger = pinger(echo.clone(), interval, Aggregate::Min);

        let started = std::time::Instant::now();
        let res = pinger.ping("192.0.2.1").await;

        assert_that(&(started.elapsed() < interval)).is_true();
        assert_that(&echo.echoes()).is_equal_to(0);
        match res {
            Err(Error::ProbeError { why, .. }) => {
                assert_that(&why.as_str()).contains("failed to open ICMP socket");
                assert_that(&why.as_str()).contains("Operation not permitted");
            }
            other => panic!("expected ProbeError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_failure_is_not_retried() {
        let outcomes = vec![Err(ErrorKind::PermissionDenied), Ok(1), Ok(1)];
        let echo = Arc::new(ScriptedEcho::new(outcomes));
        let pinger = pinger(echo.clone(), Duration::from_secs(1), Aggregate::Min);

        let res = pinger.ping("192.0.2.1").await;

        assert_that(&echo.echoes()).is_equal_to(1);
        match res {
            Err(Error::ProbeError { why, .. }) => assert_that(&why.as_str()).contains("echo request 0 failed"),
            other => panic!("expected ProbeError, got {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore = "requires CAP_NET_RAW"]
    async fn ping_localhost_over_raw_socket() {
        let pinger = Pinger::default();

        let res = pinger.ping("127.0.0.1").await;

        assert_that(&res).is_ok();
    }

    #[tokio::test]
    #[ignore = "requires net.ipv4.ping_group_range to include the caller"]
    async fn ping_localhost_over_datagram_socket() {
        let pinger = Pinger::new(PingerOpts::default().with_privileged(false));

        let res = pinger.ping("127.0.0.1").await;

        assert_that(&res).is_ok();
    }
}
