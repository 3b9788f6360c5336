// Copyright 2017-2021 Lukas Pustina <lukas@pustina.de>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Resolves GitHub related domain names to the fastest reachable address and renders a hosts file snippet.
//!
//! Candidate addresses are scraped from ipaddress.com, probed with ICMP echo requests, and the selected address of
//! each domain name is collected concurrently into a [`Resolutions`] map which [`hosts::render`] turns into text.

pub mod domains;
pub mod error;
pub mod hosts;
pub mod lookup;
pub mod ping;
pub mod resolver;
pub mod selector;

#[cfg(feature = "app-cli")]
pub mod app;

pub use error::Error;
pub use hosts::HostsDocument;
pub use lookup::{CandidateSet, IpLookup, IpLookupOpts, Lookup};
pub use ping::{Aggregate, Echo, EchoSession, IcmpEcho, Pinger, PingerOpts, Probe};
pub use resolver::{FanOut, Resolutions, Resolver, ResolverOpts};
pub use selector::{SelectionMode, Selector};

pub type Result<T> = std::result::Result<T, Error>;
