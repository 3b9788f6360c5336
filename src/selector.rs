// Copyright 2017-2021 Lukas Pustina <lukas@pustina.de>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::ping::{Aggregate, Pinger, PingerOpts, Probe};
use crate::{Error, Result};

/// Strategy to choose one address out of the candidates of a domain name.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SelectionMode {
    /// Lowest latency with the fastest echo reply per candidate
    MinLatency,
    /// Lowest latency with the slowest echo reply per candidate
    MaxLatency,
    Last,
    Random,
}

impl SelectionMode {
    /// Aggregate the prober uses in this mode; `None` for modes that do not probe.
    pub fn aggregate(&self) -> Option<Aggregate> {
        match self {
            SelectionMode::MinLatency => Some(Aggregate::Min),
            SelectionMode::MaxLatency => Some(Aggregate::Max),
            SelectionMode::Last | SelectionMode::Random => None,
        }
    }
}

impl Default for SelectionMode {
    fn default() -> Self {
        SelectionMode::MinLatency
    }
}

impl FromStr for SelectionMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "min-latency" => Ok(SelectionMode::MinLatency),
            "max-latency" => Ok(SelectionMode::MaxLatency),
            "last" => Ok(SelectionMode::Last),
            "random" => Ok(SelectionMode::Random),
            _ => Err(Error::ParseError {
                what: s.to_string(),
                why: "unsupported selection mode".to_string(),
            }),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectionMode::MinLatency => "min-latency",
            SelectionMode::MaxLatency => "max-latency",
            SelectionMode::Last => "last",
            SelectionMode::Random => "random",
        };
        f.write_str(s)
    }
}

#[derive(Clone)]
pub struct Selector {
    mode: SelectionMode,
    prober: Arc<dyn Probe>,
}

impl Selector {
    pub fn new(mode: SelectionMode, prober: Arc<dyn Probe>) -> Selector {
        Selector { mode, prober }
    }

    /// Creates a `Selector` that probes with a default `Pinger` aggregating as required by `mode`.
    pub fn from_mode(mode: SelectionMode) -> Selector {
        Selector::with_pinger_opts(mode, PingerOpts::default())
    }

    /// Creates a `Selector` that probes with a `Pinger` using `opts`; the aggregate is overridden as required by `mode`.
    pub fn with_pinger_opts(mode: SelectionMode, opts: PingerOpts) -> Selector {
        let opts = match mode.aggregate() {
            Some(aggregate) => opts.with_aggregate(aggregate),
            None => opts,
        };
        Selector::new(mode, Arc::new(Pinger::new(opts)))
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub async fn select(&self, candidates: &[String]) -> Result<String> {
        match self.mode {
            SelectionMode::MinLatency | SelectionMode::MaxLatency => {
                lowest_latency(self.prober.as_ref(), candidates).await
            }
            SelectionMode::Last => last(candidates),
            SelectionMode::Random => random(candidates),
        }
    }
}

/// Probes all candidates one after another and returns the one with the lowest latency.
///
/// Candidates that fail to probe are skipped. If no candidate could be probed, the first one is returned. On equal
/// latencies the earlier candidate wins.
pub async fn lowest_latency(prober: &dyn Probe, candidates: &[String]) -> Result<String> {
    let first = candidates.first().ok_or(Error::EmptyInputError)?;

    let mut min_latency = Duration::MAX;
    let mut selected = first;
    for candidate in candidates {
        let latency = match prober.probe(candidate).await {
            Ok(latency) => latency,
            Err(err) => {
                debug!("Excluding candidate {}: {}", candidate, err);
                continue;
            }
        };
        if latency < min_latency {
            trace!("New lowest latency {:?} for {}", latency, candidate);
            min_latency = latency;
            selected = candidate;
        }
    }

    if min_latency == Duration::MAX {
        warn!("No candidate answered; falling back to {}", first);
    }

    Ok(selected.clone())
}

pub fn last(candidates: &[String]) -> Result<String> {
    candidates.last().cloned().ok_or(Error::EmptyInputError)
}

pub fn random(candidates: &[String]) -> Result<String> {
    if candidates.is_empty() {
        return Err(Error::EmptyInputError);
    }
    let idx = rand::rng().random_range(0..candidates.len());
    Ok(candidates[idx].clone())
}
