//! Command-line arguments for the `kumabridge` server.

use std::path::PathBuf;

use clap::Parser;

/// kumabridge -- HTTP request/response bridge to Uptime Kuma
#[derive(Debug, Parser)]
#[command(
    name = "kumabridge",
    version,
    about = "Bridge HTTP requests onto authenticated Uptime Kuma Socket.IO connections",
    long_about = "Serves a small HTTP API that forwards events to Uptime Kuma style\n\
        Socket.IO servers and answers monitor queries from a live cache.\n\n\
        Connections are opened on first use, logged in once, and reused."
)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "KUMABRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (overrides config and PORT)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_parse() {
        let cli = Cli::try_parse_from(["kumabridge", "--port", "8080", "-vv"]).ok();
        let cli = cli.as_ref();
        assert_eq!(cli.and_then(|c| c.port), Some(8080));
        assert_eq!(cli.map(|c| c.verbose), Some(2));
        assert_eq!(cli.and_then(|c| c.host.clone()), None);
    }
}
