// Copyright 2017-2021 Lukas Pustina <lukas@pustina.de>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Scrapes candidate IPv4 addresses of a domain name from ipaddress.com.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use tracing::{debug, trace};

use crate::{Error, Result};

static BASE_URI: &str = "https://www.ipaddress.com/site/";
static ADDRESS_LIST_SELECTOR: &str = "ul.separated2";
static ADDRESS_ITEM_SELECTOR: &str = "li";

lazy_static! {
    // Only checks for dotted quads; octets are not range checked.
    static ref IPV4_LITERAL: Regex = Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap();
}

/// IPv4 literals found for one domain name in encounter order. May be empty.
pub type CandidateSet = Vec<String>;

/// Source of candidate addresses for a domain name.
pub trait Lookup: Send + Sync {
    fn candidates<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<CandidateSet>>;
}

#[derive(Debug, Clone)]
pub struct IpLookupOpts {
    base_uri: String,
    timeout: Duration,
}

impl Default for IpLookupOpts {
    fn default() -> Self {
        IpLookupOpts::new(BASE_URI, Duration::from_secs(10))
    }
}

impl IpLookupOpts {
    pub fn new<T: Into<String>>(base_uri: T, timeout: Duration) -> IpLookupOpts {
        IpLookupOpts {
            base_uri: base_uri.into(),
            timeout,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> IpLookupOpts {
        IpLookupOpts { timeout, ..self }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Clone)]
pub struct IpLookup {
    http_client: Arc<reqwest::Client>,
    opts: Arc<IpLookupOpts>,
}

impl Default for IpLookup {
    fn default() -> Self {
        IpLookup::new(IpLookupOpts::default())
    }
}

impl IpLookup {
    pub fn new(opts: IpLookupOpts) -> IpLookup {
        IpLookup::with_client(opts, reqwest::Client::new())
    }

    pub fn with_client(opts: IpLookupOpts, http_client: reqwest::Client) -> IpLookup {
        IpLookup {
            http_client: Arc::new(http_client),
            opts: Arc::new(opts),
        }
    }

    pub fn url(&self, domain: &str) -> String {
        format!("{}{}", self.opts.base_uri, domain)
    }

    /// Fetches the lookup page for `domain` and extracts all IPv4 literals from its address list.
    ///
    /// Any status other than `200 OK` fails with `StatusError`.
    pub async fn resolve_candidates(&self, domain: &str) -> Result<CandidateSet> {
        let url = self.url(domain);
        trace!("Fetching candidates from url '{}'", &url);

        let res = self
            .http_client
            .get(&url)
            .timeout(self.opts.timeout)
            .send()
            .await
            .map_err(|e| Error::NetworkError {
                why: "call failed",
                source: e,
            })?;

        // Only a plain 200 carries the address page; other 2xx answers are treated as failures, too.
        if res.status() != StatusCode::OK {
            return Err(Error::StatusError {
                url,
                status: res.status().as_u16(),
            });
        }

        let body = res.text().await.map_err(|e| Error::NetworkError {
            why: "reading body failed",
            source: e,
        })?;

        let candidates = extract_candidates(&body)?;
        debug!("Found {} candidates for '{}'", candidates.len(), domain);

        Ok(candidates)
    }
}

impl Lookup for IpLookup {
    fn candidates<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<CandidateSet>> {
        self.resolve_candidates(domain).boxed()
    }
}

/// Extracts all IPv4 literals from the list items of the first address list in `html`.
///
/// A page without an address list yields an empty `CandidateSet`.
pub fn extract_candidates(html: &str) -> Result<CandidateSet> {
    let list_selector = parse_selector(ADDRESS_LIST_SELECTOR)?;
    let item_selector = parse_selector(ADDRESS_ITEM_SELECTOR)?;

    let document = Html::parse_document(html);
    let list = match document.select(&list_selector).next() {
        Some(list) => list,
        None => return Ok(Vec::new()),
    };

    let candidates = list
        .select(&item_selector)
        .map(|item| item.text().collect::<String>())
        .flat_map(|text| {
            IPV4_LITERAL
                .find_iter(&text)
                .map(|m| m.as_str().to_string())
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(candidates)
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::ParseError {
        what: selector.to_string(),
        why: format!("{:?}", e),
    })
}
