// Copyright 2017-2021 Lukas Pustina <lukas@pustina.de>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::convert::TryFrom;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::ping::PingerOpts;
use crate::resolver::{FanOut, ResolverOpts};
use crate::selector::SelectionMode;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub list_domains: bool,
    pub selection_mode: SelectionMode,
    pub fan_out: FanOut,
    pub timeout: Duration,
    pub http_timeout: Duration,
    pub privileged: bool,
}

impl AppConfig {
    pub fn resolver_opts(&self) -> ResolverOpts {
        ResolverOpts {
            fan_out: self.fan_out,
            timeout: self.timeout,
        }
    }

    pub fn pinger_opts(&self) -> PingerOpts {
        PingerOpts::default().with_privileged(self.privileged)
    }
}

impl TryFrom<&ArgMatches> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: &ArgMatches) -> std::result::Result<Self, Self::Error> {
        let selection_mode = args
            .get_one::<String>("mode")
            .map(|x| SelectionMode::from_str(x).context("failed to parse selection mode"))
            .context("No selection mode specified")??;
        let config = AppConfig {
            list_domains: args.get_flag("list-domains"),
            selection_mode,
            fan_out: fan_out(args)?,
            timeout: seconds(args, "timeout")?,
            http_timeout: seconds(args, "http-timeout")?,
            privileged: !args.get_flag("unprivileged"),
        };

        Ok(config)
    }
}

fn fan_out(args: &ArgMatches) -> Result<FanOut> {
    let fan_out = args
        .get_one::<String>("fan-out")
        .map(|x| FanOut::from_str(x).context("failed to parse fan-out strategy"))
        .context("No fan-out strategy specified")??;
    let fan_out = match fan_out {
        FanOut::Bounded { .. } => {
            let workers = *args.get_one::<usize>("workers").context("No number of workers specified")?;
            if workers == 0 {
                anyhow::bail!("number of workers must be at least 1");
            }
            FanOut::Bounded { workers }
        }
        FanOut::Unbounded => FanOut::Unbounded,
    };

    Ok(fan_out)
}

fn seconds(args: &ArgMatches, name: &str) -> Result<Duration> {
    let secs = args
        .get_one::<u64>(name)
        .with_context(|| format!("No value for {} specified", name))?;
    Ok(Duration::from_secs(*secs))
}
