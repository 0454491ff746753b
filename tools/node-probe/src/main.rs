//
// Copyright 2020 Joyent, Inc.
//

//
// Probes a single replica set member with a ping command and prints the
// node's health after every attempt. A down node is refreshed before the next
// ping, the way a replica set monitor would.
//
// Stop and start the server while this runs to watch the node go down and
// come back up.
//

mod util;

use std::thread;
use std::time::Duration;

use bson::doc;
use clap::{App, Arg};
use slog::Level;

use replica_node::node::types::NodeOptions;
use replica_node::node::Node;
use replica_node::resolver::SystemResolver;
use replica_node_tcp_stream_connection::{
    TcpStreamConnection, TcpStreamConnectionConfig,
};

const DEFAULT_ADDRESS: &str = "127.0.0.1:27017";
const DEFAULT_COUNT: u64 = 1;
const DEFAULT_INTERVAL_MS: u64 = 1000;

struct ProbeArgs {
    address: String,
    config: TcpStreamConnectionConfig,
    count: u64,
    interval: Duration,
    level: Level,
}

fn main() {
    let matches = App::new("Replica Node Probe")
        .version("0.1.0")
        .about("Pings one replica set member and reports its health")
        .arg(
            Arg::with_name("address")
                .index(1)
                .help(
                    format!(
                        "Address of the member, host or host:port\n\
                         (default: {})",
                        DEFAULT_ADDRESS
                    )
                    .as_str(),
                ),
        )
        .arg(
            Arg::with_name("connect timeout")
                .long("connect-timeout")
                .takes_value(true)
                .help("Connect timeout in milliseconds (default: 5000)"),
        )
        .arg(
            Arg::with_name("socket timeout")
                .long("socket-timeout")
                .takes_value(true)
                .help("Read and write timeout in milliseconds (default: none)"),
        )
        .arg(
            Arg::with_name("count")
                .short("c")
                .long("count")
                .takes_value(true)
                .help(
                    format!(
                        "Number of pings to send, 0 to run forever\n\
                         (default: {})",
                        DEFAULT_COUNT
                    )
                    .as_str(),
                ),
        )
        .arg(
            Arg::with_name("interval")
                .short("i")
                .long("interval")
                .takes_value(true)
                .help(
                    format!(
                        "Milliseconds between pings (default: {})",
                        DEFAULT_INTERVAL_MS
                    )
                    .as_str(),
                ),
        )
        .arg(
            Arg::with_name("log level")
                .short("l")
                .long("log-level")
                .takes_value(true)
                .help(
                    format!(
                        "Log level: trace|debug|info|warning|error|critical\n\
                         (uses {} env var if flag not given)\n\
                         (default: {})",
                        util::LOG_LEVEL_ENV_VAR,
                        format!("{:?}", util::DEFAULT_LOG_LEVEL).to_lowercase()
                    )
                    .as_str(),
                ),
        )
        .get_matches();

    let args = parse_args(&matches);

    std::process::exit(match args.and_then(run) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("error: {}", err);
            1
        }
    });
}

fn parse_millis(
    matches: &clap::ArgMatches,
    name: &str,
) -> Result<Option<u64>, String> {
    matches
        .value_of(name)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| format!("invalid {}: {:?}", name, v))
        })
        .transpose()
}

fn parse_args(matches: &clap::ArgMatches) -> Result<ProbeArgs, String> {
    let address = matches
        .value_of("address")
        .unwrap_or(DEFAULT_ADDRESS)
        .to_string();

    let config = TcpStreamConnectionConfig {
        connect_timeout: parse_millis(matches, "connect timeout")?
            .map(Duration::from_millis),
        socket_timeout: parse_millis(matches, "socket timeout")?
            .map(Duration::from_millis),
    };

    let count = parse_millis(matches, "count")?.unwrap_or(DEFAULT_COUNT);
    let interval = Duration::from_millis(
        parse_millis(matches, "interval")?.unwrap_or(DEFAULT_INTERVAL_MS),
    );

    //
    // Try to get the log level from the CLI arg and, if that fails, the
    // environment variable. If both fail, just use the default.
    //
    let level = match matches.value_of("log level") {
        Some(level_str) => util::parse_log_level(level_str)?,
        None => util::log_level_from_env()?.unwrap_or(util::DEFAULT_LOG_LEVEL),
    };

    Ok(ProbeArgs {
        address,
        config,
        count,
        interval,
        level,
    })
}

fn run(args: ProbeArgs) -> Result<(), String> {
    let log = util::standard_log(args.level);

    let mut node = Node::new(
        &args.address,
        NodeOptions { log: Some(log) },
        SystemResolver,
        TcpStreamConnection::connection_creator(args.config),
    )
    .map_err(|e| e.to_string())?;

    let mut sent = 0;
    while args.count == 0 || sent < args.count {
        if sent > 0 {
            thread::sleep(args.interval);
        }
        sent += 1;

        if node.is_down() {
            node.refresh();
        }

        let outcome = node
            .ensure_connected(|conn| conn.command("admin", doc! { "ping": 1 }));
        let down_at = node
            .down_at()
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| String::from("-"));
        match outcome {
            Ok(reply) => println!(
                "{} health={} down_at={} reply={}",
                node.address(),
                node.health(),
                down_at,
                reply
            ),
            Err(e) => println!(
                "{} health={} down_at={} error={}",
                node.address(),
                node.health(),
                down_at,
                e
            ),
        }
    }

    Ok(())
}
