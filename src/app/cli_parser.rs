//! This file is used by the build script. Therefore all functions generating the app command line parser must be included
//! here and may only depend on clap.

use clap::{value_parser, Arg, ArgAction, Command};

pub const SUPPORTED_SELECTION_MODES: [&str; 4] = ["min-latency", "max-latency", "last", "random"];

pub const SUPPORTED_FAN_OUTS: [&str; 2] = ["bounded", "unbounded"];

pub fn create_parser() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .default_value("min-latency")
                .value_parser(SUPPORTED_SELECTION_MODES)
                .help("Sets the strategy to select one address per domain name")
                .long_help(
                    "* min-latency: probes all candidates and selects the lowest of their fastest echo replies
* max-latency: probes all candidates and selects the lowest of their slowest echo replies
* last: selects the last candidate without probing
* random: selects a random candidate without probing",
                ),
        )
        .arg(
            Arg::new("fan-out")
                .long("fan-out")
                .value_name("STRATEGY")
                .default_value("bounded")
                .value_parser(SUPPORTED_FAN_OUTS)
                .help("Sets how domain names are distributed onto concurrent tasks"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_name("NUMBER")
                .default_value("32")
                .value_parser(value_parser!(usize))
                .help("Sets max. number of domain names resolved concurrently with bounded fan out"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("TIMEOUT")
                .default_value("60")
                .value_parser(value_parser!(u64))
                .help("Sets timeout in seconds to resolve a single domain name"),
        )
        .arg(
            Arg::new("http-timeout")
                .long("http-timeout")
                .value_name("TIMEOUT")
                .default_value("10")
                .value_parser(value_parser!(u64))
                .help("Sets timeout in seconds for each request to the lookup site"),
        )
        .arg(
            Arg::new("unprivileged")
                .long("unprivileged")
                .action(ArgAction::SetTrue)
                .help("Sends echo requests over a datagram ICMP socket instead of a raw socket")
                .long_help(
                    "Raw ICMP sockets require root or CAP_NET_RAW. Datagram ICMP sockets work without privileges if the \
group of the current user is within net.ipv4.ping_group_range.",
                ),
        )
        .arg(
            Arg::new("list-domains")
                .long("list-domains")
                .action(ArgAction::SetTrue)
                .help("Lists all predefined domain names"),
        )
        // This is a special option that is not reflected in AppConfig, but is checked during
        // setup in `domaintoip.rs`.
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .action(ArgAction::SetTrue)
                .help("Disables colorful log output"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Prints span events and targets in log output"),
        )
        .arg(
            Arg::new("v")
                .short('v')
                .action(ArgAction::Count)
                .help("Sets the level of verbosity"),
        )
}
