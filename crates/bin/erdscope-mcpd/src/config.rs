use clap::{Parser, ValueEnum, builder::BoolishValueParser};
use erdscope_core::render::{DEFAULT_SERVER_URL, RenderBackend};
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

const DEFAULT_OUTPUT_DIR: &str = "erd_output";
const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:4021";
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POOL_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Which MCP transport the daemon serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "erdscope-mcpd", version, about = "erdscope MCP daemon.")]
struct CliArgs {
    #[arg(long, env = "ERDSCOPE_RENDER_URL", default_value = DEFAULT_SERVER_URL)]
    render_url: String,

    /// Local PlantUML command, e.g. `plantuml` or `java -jar plantuml.jar`.
    /// Takes precedence over the render URL when set.
    #[arg(long, env = "ERDSCOPE_RENDER_COMMAND")]
    render_command: Option<String>,

    #[arg(long, env = "ERDSCOPE_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    #[arg(
        long,
        env = "ERDSCOPE_RENDER_TIMEOUT_SECS",
        default_value_t = DEFAULT_RENDER_TIMEOUT_SECS
    )]
    render_timeout_secs: u64,

    #[arg(
        long,
        env = "ERDSCOPE_CONNECT_TIMEOUT_SECS",
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS
    )]
    connect_timeout_secs: u64,

    #[arg(
        long,
        env = "ERDSCOPE_POOL_MAX_CONNECTIONS",
        default_value_t = DEFAULT_POOL_MAX_CONNECTIONS
    )]
    pool_max_connections: u32,

    #[arg(long, env = "ERDSCOPE_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    #[arg(long, env = "ERDSCOPE_TRANSPORT", value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    #[arg(long, env = "ERDSCOPE_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    http_addr: SocketAddr,

    #[arg(
        long,
        env = "ERDSCOPE_HTTP_STATELESS",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    http_stateless: bool,

    #[arg(long, env = "ERDSCOPE_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct ErdscopeConfig {
    pub render_backend: RenderBackend,
    pub output_dir: PathBuf,
    pub render_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_connections: u32,
    pub concurrency: usize,
    pub transport: Transport,
    pub http_addr: SocketAddr,
    pub http_stateless: bool,
    pub log_level: Level,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
        }
    }
}

impl Error for ConfigError {}

impl ErdscopeConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }
}

fn positive_secs(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidSetting {
            name,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn render_backend(url: String, command: Option<String>) -> Result<RenderBackend, ConfigError> {
    if let Some(command) = command.filter(|value| !value.trim().is_empty()) {
        let mut words = command.split_whitespace().map(str::to_string);
        if let Some(program) = words.next() {
            return Ok(RenderBackend::Command {
                program,
                args: words.collect(),
            });
        }
    }

    let url = url.trim().trim_end_matches('/').to_string();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidSetting {
            name: "ERDSCOPE_RENDER_URL",
            value: url,
        });
    }
    Ok(RenderBackend::Http { server_url: url })
}

impl TryFrom<CliArgs> for ErdscopeConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let render_backend = render_backend(args.render_url, args.render_command)?;
        let render_timeout =
            positive_secs("ERDSCOPE_RENDER_TIMEOUT_SECS", args.render_timeout_secs)?;
        let connect_timeout =
            positive_secs("ERDSCOPE_CONNECT_TIMEOUT_SECS", args.connect_timeout_secs)?;

        if args.concurrency == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "ERDSCOPE_CONCURRENCY",
                value: args.concurrency.to_string(),
            });
        }
        if args.pool_max_connections == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "ERDSCOPE_POOL_MAX_CONNECTIONS",
                value: args.pool_max_connections.to_string(),
            });
        }
        if args.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "ERDSCOPE_OUTPUT_DIR",
                value: String::new(),
            });
        }

        let log_level = args
            .log_level
            .trim()
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidSetting {
                name: "ERDSCOPE_LOG_LEVEL",
                value: args.log_level.clone(),
            })?;

        Ok(Self {
            render_backend,
            output_dir: args.output_dir,
            render_timeout,
            connect_timeout,
            pool_max_connections: args.pool_max_connections,
            concurrency: args.concurrency,
            transport: args.transport,
            http_addr: args.http_addr,
            http_stateless: args.http_stateless,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            render_url: DEFAULT_SERVER_URL.to_string(),
            render_command: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            render_timeout_secs: DEFAULT_RENDER_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            pool_max_connections: DEFAULT_POOL_MAX_CONNECTIONS,
            concurrency: DEFAULT_CONCURRENCY,
            transport: Transport::Stdio,
            http_addr: DEFAULT_HTTP_ADDR.parse().expect("valid HTTP addr"),
            http_stateless: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    #[test]
    fn defaults_use_the_public_plantuml_server() {
        let config = ErdscopeConfig::try_from(base_args()).expect("config should parse");

        assert!(matches!(
            config.render_backend,
            RenderBackend::Http { ref server_url } if server_url == DEFAULT_SERVER_URL
        ));
        assert_eq!(config.render_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.transport, Transport::Stdio);
    }

    #[test]
    fn render_command_wins_over_url_and_splits_arguments() {
        let mut args = base_args();
        args.render_command = Some("java -jar /opt/plantuml.jar".to_string());

        let config = ErdscopeConfig::try_from(args).expect("config should parse");

        match config.render_backend {
            RenderBackend::Command { program, args } => {
                assert_eq!(program, "java");
                assert_eq!(args, vec!["-jar", "/opt/plantuml.jar"]);
            }
            RenderBackend::Http { .. } => panic!("expected a command backend"),
        }
    }

    #[test]
    fn blank_render_command_falls_back_to_url() {
        let mut args = base_args();
        args.render_command = Some("   ".to_string());
        args.render_url = "http://localhost:8080/plantuml/".to_string();

        let config = ErdscopeConfig::try_from(args).expect("config should parse");

        assert!(matches!(
            config.render_backend,
            RenderBackend::Http { ref server_url } if server_url == "http://localhost:8080/plantuml"
        ));
    }

    #[test]
    fn rejects_non_http_render_url() {
        let mut args = base_args();
        args.render_url = "ftp://example.com".to_string();

        let err = ErdscopeConfig::try_from(args).expect_err("url should be rejected");
        assert_eq!(err.to_string(), "invalid ERDSCOPE_RENDER_URL value: ftp://example.com");
    }

    #[test]
    fn rejects_zero_concurrency_and_timeouts() {
        let mut args = base_args();
        args.concurrency = 0;
        assert!(ErdscopeConfig::try_from(args).is_err());

        let mut args = base_args();
        args.render_timeout_secs = 0;
        assert!(ErdscopeConfig::try_from(args).is_err());

        let mut args = base_args();
        args.connect_timeout_secs = 0;
        assert!(ErdscopeConfig::try_from(args).is_err());
    }

    #[test]
    fn parses_log_level_case_insensitively() {
        let mut args = base_args();
        args.log_level = "DEBUG".to_string();
        let config = ErdscopeConfig::try_from(args).expect("config should parse");
        assert_eq!(config.log_level, Level::DEBUG);

        let mut args = base_args();
        args.log_level = "loud".to_string();
        let err = ErdscopeConfig::try_from(args).expect_err("level should be rejected");
        assert_eq!(err.to_string(), "invalid ERDSCOPE_LOG_LEVEL value: loud");
    }

    #[test]
    fn cli_flags_select_http_transport() {
        let args = CliArgs::try_parse_from([
            "erdscope-mcpd",
            "--transport",
            "http",
            "--http-addr",
            "0.0.0.0:9000",
        ])
        .expect("flags should parse");

        assert_eq!(args.transport, Transport::Http);
        assert_eq!(args.http_addr, "0.0.0.0:9000".parse().expect("addr"));
    }
}
