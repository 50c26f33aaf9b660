//! keywarden: AuthorizedKeysCommand agent for sshd.
//!
//! Invoked once per login attempt; prints authorized_keys lines on stdout
//! and communicates everything else through the exit code, which sshd and
//! monitoring tooling key off.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use keywarden::config::{
    Config, ConfigError, Overrides, Settings, DEFAULT_CACHE_DIR, DEFAULT_CONFIG_FILE,
};
use keywarden::install::{self, InstallOptions};
use keywarden::query::{self, QueryError};
use keywarden::remote::FetchError;
use keywarden::{keys, version};

/// Process exit codes, stable across releases; monitoring depends on them.
mod exit {
    pub const OK: u8 = 0;
    pub const USAGE: u8 = 1;
    pub const CONFIG_READ: u8 = 5;
    pub const HOSTNAME: u8 = 6;
    pub const CONFIG_PARSE: u8 = 7;
    pub const REQUEST_BUILD: u8 = 8;
    pub const NO_KEYS: u8 = 9;
    pub const MISSING_TRUST_KEY: u8 = 10;
    pub const AUTHORITY: u8 = 20;
    pub const CACHE_WRITE: u8 = 21;
}

#[derive(Parser, Debug)]
#[command(name = version::NAME, version = version::VERSION)]
#[command(about = "Fetch, verify and print SSH authorized keys for an account")]
struct Cli {
    /// Account to look up (%u from sshd).
    account: Option<String>,

    /// Config file path.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config_file: PathBuf,

    /// Authority base URL (overrides the config file).
    #[arg(long)]
    url: Option<String>,

    /// Authority bearer token (overrides the config file).
    #[arg(long)]
    token: Option<String>,

    /// Cache directory (overrides the config file).
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Require a valid signature on every key.
    #[arg(long)]
    verify: bool,

    /// Trusted signer public key: a PEM file path or an inline PEM block.
    /// Replaces the config file's list.
    #[arg(long, value_name = "KEY")]
    public_key: Option<String>,

    /// Client key fingerprint (%f from sshd); restricts output to the one
    /// matching key and records the login.
    #[arg(long, value_name = "FP")]
    fingerprint: Option<String>,

    /// sshd connection info; its client-address token is forwarded to the
    /// authority.
    #[arg(long, value_name = "INFO")]
    connection: Option<String>,

    /// Prefix applied to the local hostname in the request path.
    #[arg(long, value_name = "PREFIX")]
    hostname_prefix: Option<String>,

    /// Suffix applied to the local hostname in the request path.
    #[arg(long, value_name = "SUFFIX")]
    hostname_suffix: Option<String>,

    /// Request timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    timeout: Option<u64>,

    /// Log at debug level to stderr.
    #[arg(long)]
    debug: bool,

    /// Run the interactive installer instead of a lookup.
    #[arg(long)]
    install: bool,

    /// Installer: never prompt; fail on missing values instead.
    #[arg(long)]
    no_interactive: bool,

    /// Installer: edit sshd_config in place.
    #[arg(long)]
    sshd_config: bool,

    /// Installer: path to sshd_config.
    #[arg(long, value_name = "FILE", default_value = "/etc/ssh/sshd_config")]
    sshd_config_path: PathBuf,

    /// Installer: system user sshd runs the agent as.
    #[arg(long, default_value = "keywarden")]
    user: String,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(err: &QueryError) -> u8 {
    match err {
        QueryError::MissingTrustKeys => exit::MISSING_TRUST_KEY,
        QueryError::Hostname(_) => exit::HOSTNAME,
        QueryError::NoKeys { fetch } => match fetch {
            FetchError::Build(_) => exit::REQUEST_BUILD,
            FetchError::Transport(_) => exit::NO_KEYS,
            FetchError::Status(_) | FetchError::Parse(_) => exit::AUTHORITY,
        },
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if cli.install {
        let opts = InstallOptions {
            url: cli.url,
            token: cli.token,
            public_key: cli.public_key,
            verify: cli.verify,
            no_interactive: cli.no_interactive,
            user: cli.user,
            config_file: cli.config_file,
            cache_dir: cli.cache_dir.unwrap_or_else(|| DEFAULT_CACHE_DIR.into()),
            edit_sshd_config: cli.sshd_config,
            sshd_config_path: cli.sshd_config_path,
        };
        return match install::run(opts).await {
            Ok(()) => ExitCode::from(exit::OK),
            Err(err) => {
                eprintln!("install failed: {err:#}");
                ExitCode::from(exit::USAGE)
            }
        };
    }

    let Some(account) = cli.account else {
        let _ = Cli::command().print_help();
        return ExitCode::from(exit::USAGE);
    };

    let config = match Config::load(&cli.config_file) {
        Ok(config) => config,
        Err(err @ ConfigError::Read { .. }) => {
            tracing::error!("{err}");
            return ExitCode::from(exit::CONFIG_READ);
        }
        Err(err @ ConfigError::Parse { .. }) => {
            tracing::error!("{err}");
            return ExitCode::from(exit::CONFIG_PARSE);
        }
    };

    let settings = Settings::resolve(
        config,
        Overrides {
            url: cli.url,
            token: cli.token,
            cache_dir: cli.cache_dir,
            verify: cli.verify,
            public_key: cli.public_key,
            timeout_ms: cli.timeout,
            hostname_prefix: cli.hostname_prefix,
            hostname_suffix: cli.hostname_suffix,
        },
    );

    match query::run(
        &settings,
        &account,
        cli.fingerprint.as_deref(),
        cli.connection.as_deref(),
    )
    .await
    {
        Ok(outcome) => {
            let stdout = std::io::stdout();
            keys::write_authorized_keys(&outcome.keys, &mut stdout.lock());
            if outcome.cache_write_failed {
                ExitCode::from(exit::CACHE_WRITE)
            } else {
                ExitCode::from(exit::OK)
            }
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::from(exit_code(&err))
        }
    }
}
