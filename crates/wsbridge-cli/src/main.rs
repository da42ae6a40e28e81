//! # wsbridge CLI Entry Point
//!
//! Main binary for the wsbridge request bridge. Runs a JavaScript application
//! against requests built on the command line, evaluates configuration
//! scripts and opens the debug shell.
//!
//! ## Usage
//!
//! ```bash
//! # Run one request
//! wsbridge request app.js --var PATH_INFO=/hello
//!
//! # POST a body, streaming the response through the async engine
//! wsbridge request app.js --var REQUEST_METHOD=POST --body 'payload' --async
//!
//! # Print the options a configuration script produces
//! wsbridge config wsbridge.conf.js
//!
//! # Poke at the interpreter interactively
//! wsbridge shell app.js
//! ```

use anyhow::{bail, Result};
use argh::FromArgs;
use std::path::PathBuf;
use wsbridge_cli::driver::{apply_configurator, build_request, format_response, parse_var, Session, SLOT};
use wsbridge_common::config::{BridgeConfig, GcMode};
use wsbridge_common::protocol::DispatchOutcome;
use wsbridge_server::shell::hijack_worker;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// wsbridge - run JavaScript applications behind a request server
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Request**: dispatch one request and print the response
/// - **Config**: run a configuration script
/// - **Shell**: interactive shell on the application's interpreter
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Request(RequestArgs),
    Config(ConfigArgs),
    Shell(ShellArgs),
}

/// Arguments for dispatching a single request.
///
/// # Example
///
/// ```bash
/// wsbridge request app.js --preload lib.js --var PATH_INFO=/x --gc-freq 1
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "request")]
/// dispatch one request to an application
struct RequestArgs {
    /// application file whose completion value is the entry point
    #[argh(positional)]
    app: Option<String>,

    /// file evaluated before the application (repeatable)
    #[argh(option, short = 'p', long = "preload")]
    preload: Vec<String>,

    /// request variable as KEY=VALUE (repeatable)
    #[argh(option, short = 'v', long = "var")]
    vars: Vec<String>,

    /// request body readable through wsbridge.req_input_read()
    #[argh(option, short = 'b', long = "body")]
    body: Option<String>,

    /// configuration script applied before the flags
    #[argh(option, short = 'c', long = "config")]
    config: Option<String>,

    /// step streamed bodies through the async engine
    #[argh(switch, long = "async")]
    async_enabled: bool,

    /// collect after every Nth request (0 collects after every one)
    #[argh(option, long = "gc-freq")]
    gc_freq: Option<u64>,

    /// run full collections instead of incremental steps
    #[argh(switch, long = "gc-full")]
    gc_full: bool,

    /// give up on a streamed response after this many dispatches
    #[argh(option, long = "max-steps", default = "10000")]
    max_steps: usize,
}

/// Arguments for evaluating a configuration script.
#[derive(FromArgs)]
#[argh(subcommand, name = "config")]
/// run a configuration script and print the options it produces
struct ConfigArgs {
    /// path to the configuration script
    #[argh(positional)]
    script: String,
}

/// Arguments for the interactive shell.
#[derive(FromArgs)]
#[argh(subcommand, name = "shell")]
/// open the debug shell on worker 1
struct ShellArgs {
    /// application file to load before the shell starts
    #[argh(positional)]
    app: Option<String>,

    /// file evaluated before the application (repeatable)
    #[argh(option, short = 'p', long = "preload")]
    preload: Vec<String>,
}

fn base_config(app: Option<&str>, preload: &[String]) -> BridgeConfig {
    let mut config = BridgeConfig::new();
    for file in preload {
        config = config.with_preload(file);
    }
    if let Some(app) = app {
        if !config.claim_app_file(app) {
            config = config.with_app(app);
        }
    }
    config
}

fn run_request(args: RequestArgs) -> Result<()> {
    let mut config = BridgeConfig::new();
    if let Some(script) = &args.config {
        apply_configurator(&PathBuf::from(script), &mut config)?;
    }
    let flags = base_config(args.app.as_deref(), &args.preload);
    if flags.app.is_some() {
        config.app = flags.app;
    }
    config.preload.extend(flags.preload);
    if let Some(freq) = args.gc_freq {
        config.gc_freq = freq;
    }
    if args.gc_full {
        config.gc_mode = GcMode::Full;
    }
    if config.app.is_none() && config.preload.is_empty() {
        bail!("No application configured: pass an application file or --config");
    }

    let vars = args
        .vars
        .iter()
        .map(|raw| parse_var(raw))
        .collect::<Result<Vec<_>>>()?;
    let mut request = build_request(&vars);

    let mut session = Session::new(config, args.async_enabled)?;
    if let Some(body) = &args.body {
        session.host.set_request_body(SLOT, body.as_bytes());
    }
    let outcome = session.run(&mut request, args.max_steps)?;
    print!("{}", format_response(&session.response()));

    if outcome == DispatchOutcome::Error {
        bail!("Request failed");
    }
    Ok(())
}

fn run_config(args: ConfigArgs) -> Result<()> {
    let mut config = BridgeConfig::new();
    let options = apply_configurator(&PathBuf::from(&args.script), &mut config)?;
    for (key, value) in &options {
        println!("{} = {}", key, value);
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn run_shell(args: ShellArgs) -> Result<()> {
    let mut config = base_config(args.app.as_deref(), &args.preload);
    config.shell = true;
    let session = Session::new(config, false)?;
    let stdin = std::io::stdin();
    hijack_worker(session.dispatcher.pool(), SLOT.worker, stdin.lock(), std::io::stdout())?;
    Ok(())
}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Set default log level to INFO, but allow RUST_LOG env var to override
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Request(args) => run_request(args),
        Commands::Config(args) => run_config(args),
        Commands::Shell(args) => run_shell(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_request() {
        let args: Cli = Cli::from_args(&["wsbridge"], &[
            "request",
            "app.js",
            "--var", "PATH_INFO=/x",
            "--var", "QUERY_STRING=a=1",
            "--body", "hello",
        ]).unwrap();
        match args.command {
            Commands::Request(RequestArgs { app, vars, body, async_enabled, max_steps, .. }) => {
                assert_eq!(app.as_deref(), Some("app.js"));
                assert_eq!(vars, vec!["PATH_INFO=/x".to_string(), "QUERY_STRING=a=1".to_string()]);
                assert_eq!(body.as_deref(), Some("hello"));
                assert!(!async_enabled);
                assert_eq!(max_steps, 10000); // default
            }
            _ => panic!("Expected Request command"),
        }
    }

    #[test]
    fn test_cli_parse_request_gc_flags() {
        let args: Cli = Cli::from_args(&["wsbridge"], &[
            "request", "app.js", "--gc-freq", "5", "--gc-full", "--async",
        ]).unwrap();
        match args.command {
            Commands::Request(RequestArgs { gc_freq, gc_full, async_enabled, .. }) => {
                assert_eq!(gc_freq, Some(5));
                assert!(gc_full);
                assert!(async_enabled);
            }
            _ => panic!("Expected Request command"),
        }
    }

    #[test]
    fn test_cli_parse_config() {
        let args: Cli = Cli::from_args(&["wsbridge"], &["config", "conf.js"]).unwrap();
        match args.command {
            Commands::Config(ConfigArgs { script }) => assert_eq!(script, "conf.js"),
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_shell_with_preloads() {
        let args: Cli = Cli::from_args(&["wsbridge"], &[
            "shell", "-p", "a.js", "-p", "b.js",
        ]).unwrap();
        match args.command {
            Commands::Shell(ShellArgs { app, preload }) => {
                assert!(app.is_none());
                assert_eq!(preload, vec!["a.js".to_string(), "b.js".to_string()]);
            }
            _ => panic!("Expected Shell command"),
        }
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::from_args(&["wsbridge"], &[]).is_err());
    }

    #[test]
    fn test_base_config_claims_app_file() {
        let config = base_config(Some("site/app.ws"), &["lib.js".to_string()]);
        assert_eq!(config.app, Some(PathBuf::from("site/app.ws")));
        assert_eq!(config.preload, vec![PathBuf::from("lib.js")]);

        let config = base_config(Some("handler.mjs"), &[]);
        assert_eq!(config.app, Some(PathBuf::from("handler.mjs")));
    }
}
