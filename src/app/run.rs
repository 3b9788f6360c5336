use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

use crate::app::{AppConfig, ExitStatus};
use crate::domains;
use crate::hosts;
use crate::lookup::{IpLookup, IpLookupOpts};
use crate::resolver::Resolver;
use crate::selector::Selector;

pub async fn run(app_config: &AppConfig) -> Result<ExitStatus> {
    if app_config.list_domains {
        list_domains();
        return Ok(ExitStatus::Ok);
    }

    let lookup = IpLookup::new(IpLookupOpts::default().with_timeout(app_config.http_timeout));
    let selector = Selector::with_pinger_opts(app_config.selection_mode, app_config.pinger_opts());
    let resolver = Resolver::new(Arc::new(lookup), selector, app_config.resolver_opts());

    let domains = domains::predefined();
    info!(
        "Resolving {} domain names; mode={}, fan out={}, timeout={}s, privileged={}.",
        domains.len(),
        app_config.selection_mode,
        app_config.fan_out,
        app_config.timeout.as_secs(),
        app_config.privileged
    );
    let start_time = Instant::now();
    let resolutions = resolver.resolve_all(domains).await;
    let total_run_time = Instant::now() - start_time;
    info!(
        "Finished resolving {} domain names within {} ms of total run time.",
        resolutions.len(),
        total_run_time.as_millis()
    );

    let doc = hosts::render(&resolutions, &Local::now());

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write!(handle, "{}", doc).context("Failed to print hosts to stdout")?;
    handle.flush().context("Failed to flush stdout")?;

    Ok(ExitStatus::Ok)
}

fn list_domains() {
    println!("List of predefined domain names:");
    for domain in domains::DOMAINS {
        println!("* {}", domain);
    }
}
