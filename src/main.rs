use std::path::PathBuf;
use std::process;
use std::time::Duration;
use anyhow::Result;
use env_logger::Builder;
use gumdrop::Options;
use log::{error, info, LevelFilter};
use tokio::signal;
use contrail::agent::Agent;
use contrail::config::Config;
use contrail::forward::Forwarder;
use contrail::sink::Store;
use contrail::transport::DockerSocket;

#[derive(Options)]
pub struct Args {
    #[options(help = "print help")]
    help: bool,
    #[options(no_short, help = "runtime control socket")]
    socket: Option<PathBuf>,
    #[options(no_short, help = "runtime API version")]
    api_version: Option<String>,
    #[options(no_short, help = "store backend: influx, prometheus or stdout")]
    store: Option<String>,
    #[options(no_short, help = "store options as key=value,...")]
    store_options: Option<String>,
    #[options(no_short, help = "seconds between buffered retries")]
    retry_delay: Option<u64>,
    #[options(no_short, help = "seconds between periodic buffer drains")]
    drain_interval: Option<u64>,
    #[options(no_short, help = "maximum buffered records")]
    buffer_limit: Option<usize>,
    #[options(count, help = "increase log verbosity")]
    verbose: u32,
}

impl Args {
    fn config(self) -> Config {
        let mut config = Config::from_env();

        if let Some(socket) = self.socket {
            config.socket = socket;
        }

        if let Some(version) = self.api_version {
            config.version = version;
        }

        if let Some(store) = self.store {
            config.store = store.to_ascii_lowercase();
        }

        if let Some(options) = self.store_options {
            config.store_options = options;
        }

        if let Some(secs) = self.retry_delay {
            config.retry_delay = Duration::from_secs(secs);
        }

        if let Some(secs) = self.drain_interval {
            config.drain_interval = Duration::from_secs(secs);
        }

        if self.buffer_limit.is_some() {
            config.buffer_limit = self.buffer_limit;
        }

        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args_default_or_exit();

    let mut builder = Builder::from_default_env();
    builder.filter(None, match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });
    builder.init();

    let config = args.config();

    let forwarder = match Store::open(&config.store, &config.store_options) {
        Ok(store) => {
            info!("forwarding to {}", store.kind());
            Some(Forwarder::new(store, config.retry_delay).with_limit(config.buffer_limit))
        }
        Err(e) => {
            error!("forwarding disabled: {:#}", e);
            None
        }
    };

    let transport = DockerSocket::new(&config.socket);
    let agent     = Agent::new(transport, &config.version, forwarder);
    let agent     = agent.with_drain_interval(config.drain_interval);

    tokio::select! {
        result = agent.run() => {
            if let Err(e) = result {
                error!("agent failed: {:?}", e);
            }
            info!("agent stopped");
        }
        _ = signal::ctrl_c() => info!("interrupted"),
    }

    process::exit(1);
}
