// Copyright 2017-2021 Lukas Pustina <lukas@pustina.de>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Resolves many domain names concurrently and collects the chosen address of each.

use std::collections::btree_map::Iter;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::task::{self, JoinHandle};
use tokio::time;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::lookup::Lookup;
use crate::selector::Selector;
use crate::Error;

/// How domain names are distributed onto tasks.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FanOut {
    /// At most `workers` domain names are in flight at any time
    Bounded { workers: usize },
    /// One task per domain name, all started at once
    Unbounded,
}

impl Default for FanOut {
    fn default() -> Self {
        FanOut::Bounded { workers: 32 }
    }
}

impl FromStr for FanOut {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bounded" => Ok(FanOut::default()),
            "unbounded" => Ok(FanOut::Unbounded),
            _ => Err(Error::ParseError {
                what: s.to_string(),
                why: "unsupported fan-out strategy".to_string(),
            }),
        }
    }
}

impl fmt::Display for FanOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanOut::Bounded { workers } => write!(f, "bounded ({} workers)", workers),
            FanOut::Unbounded => f.write_str("unbounded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOpts {
    pub fan_out: FanOut,
    /// Deadline for looking up and selecting the address of a single domain name
    pub timeout: Duration,
}

impl Default for ResolverOpts {
    fn default() -> Self {
        ResolverOpts {
            fan_out: FanOut::default(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Chosen address per domain name, ordered by domain name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolutions {
    inner: BTreeMap<String, String>,
}

impl Resolutions {
    pub fn new() -> Resolutions {
        Resolutions::default()
    }

    pub fn insert<D: Into<String>, I: Into<String>>(&mut self, domain: D, ip: I) {
        self.inner.insert(domain.into(), ip.into());
    }

    pub fn get(&self, domain: &str) -> Option<&String> {
        self.inner.get(domain)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, String, String> {
        self.inner.iter()
    }
}

impl<'a> IntoIterator for &'a Resolutions {
    type Item = (&'a String, &'a String);
    type IntoIter = Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<D: Into<String>, I: Into<String>> FromIterator<(D, I)> for Resolutions {
    fn from_iter<T: IntoIterator<Item = (D, I)>>(iter: T) -> Self {
        let mut resolutions = Resolutions::new();
        for (domain, ip) in iter {
            resolutions.insert(domain, ip);
        }
        resolutions
    }
}

#[derive(Clone)]
pub struct Resolver {
    lookup: Arc<dyn Lookup>,
    selector: Arc<Selector>,
    opts: Arc<ResolverOpts>,
}

impl Resolver {
    pub fn new(lookup: Arc<dyn Lookup>, selector: Selector, opts: ResolverOpts) -> Resolver {
        Resolver {
            lookup,
            selector: Arc::new(selector),
            opts: Arc::new(opts),
        }
    }

    pub fn opts(&self) -> &ResolverOpts {
        &self.opts
    }

    /// Resolves all `domains` and returns once every single one has either been recorded or skipped.
    ///
    /// Domain names that fail to resolve are skipped, they never fail the whole batch.
    pub async fn resolve_all<I: IntoIterator<Item = String>>(&self, domains: I) -> Resolutions {
        let results = Arc::new(Mutex::new(Resolutions::new()));
        let domains: Vec<String> = domains.into_iter().collect();
        let total = domains.len();
        debug!("Resolving {} domain names with {} fan out", total, self.opts.fan_out);

        let spawn = |domain: String| -> JoinHandle<()> {
            let resolver = self.clone();
            let results = results.clone();
            let span = info_span!("resolve", domain = %domain);
            task::spawn(async move { resolver.resolve_one(domain, results).await }.instrument(span))
        };

        let outcomes = match self.opts.fan_out {
            FanOut::Bounded { workers } => {
                stream::iter(domains)
                    .map(spawn)
                    .buffer_unordered(workers.max(1))
                    .collect::<Vec<_>>()
                    .await
            }
            FanOut::Unbounded => {
                let handles: Vec<_> = domains.into_iter().map(spawn).collect();
                join_all(handles).await
            }
        };
        for err in outcomes.into_iter().filter_map(|x| x.err()) {
            warn!("Resolution task aborted: {}", Error::from(err));
        }

        // All tasks have finished, so this is the last reference.
        let resolutions = match Arc::try_unwrap(results) {
            Ok(results) => results.into_inner(),
            Err(results) => results.lock().await.clone(),
        };

        info!("Resolved {} of {} domain names", resolutions.len(), total);
        if resolutions.is_empty() && total > 0 {
            warn!("Failed to resolve any domain name");
        }

        resolutions
    }

    async fn resolve_one(&self, domain: String, results: Arc<Mutex<Resolutions>>) {
        trace!("Resolving '{}'", domain);
        let selected = time::timeout(self.opts.timeout, self.lookup_and_select(&domain)).await;

        let ip = match selected {
            Ok(Some(ip)) => ip,
            Ok(None) => return,
            Err(_) => {
                debug!("Skipping '{}': timed out after {:?}", domain, self.opts.timeout);
                return;
            }
        };

        debug!("Recording {} for '{}'", ip, domain);
        results.lock().await.insert(domain, ip);
    }

    async fn lookup_and_select(&self, domain: &str) -> Option<String> {
        let candidates = match self.lookup.candidates(domain).await {
            Ok(candidates) if candidates.is_empty() => {
                debug!("Skipping '{}': no candidates found", domain);
                return None;
            }
            Ok(candidates) => candidates,
            Err(err) => {
                skip(domain, &err);
                return None;
            }
        };
        trace!("Candidates for '{}': {:?}", domain, candidates);

        match self.selector.select(&candidates).await {
            Ok(ip) => Some(ip),
            Err(err) => {
                skip(domain, &err);
                None
            }
        }
    }
}

fn skip(domain: &str, err: &Error) {
    if err.is_domain_scoped() {
        debug!("Skipping '{}': {}", domain, err);
    } else {
        warn!("Skipping '{}' after unexpected error: {}", domain, err);
    }
}
