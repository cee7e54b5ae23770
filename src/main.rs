//! autoprotect - OpenStack backup auto-enrollment
//!
//! This is the main entry point for the `autoprotect` binary.

use anyhow::{Context, Result};
use ap_cli::{Cli, CliError, Commands, ConfigCommands};
use ap_config::ApConfig;
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli, std::io::stderr);

    init_tracing(cli.verbose, config.as_ref().ok())?;

    match config {
        Ok(config) => cli.run_with_config(config).await?,
        Err(_)
            if matches!(
                cli.command,
                Commands::Config {
                    command: ConfigCommands::Paths
                }
            ) =>
        {
            cli.run().await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Load the config under a bootstrap subscriber; the real one needs the
/// config's own log settings.
fn load_config<W>(cli: &Cli, writer: W) -> Result<ApConfig, CliError>
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::registry()
        .with(env_filter(if cli.verbose { "debug" } else { "info" }))
        .with(fmt::layer().with_writer(writer));
    tracing::subscriber::with_default(bootstrap, || cli.load_config())
}

/// Logs go to stderr so stdout stays clean for reports
fn init_tracing(verbose: bool, config: Option<&ApConfig>) -> Result<()> {
    let level = if verbose {
        "debug"
    } else {
        config.map_or("info", |c| c.global.log_level.as_str())
    };
    let filter = env_filter(level);

    let json = config.is_some_and(|c| c.global.json_logs);
    let (text_layer, json_layer) = if json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    let file_layer = match config.and_then(|c| c.global.log_file.as_ref()) {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn rc_cli(verbose: bool) -> (tempfile::NamedTempFile, Cli) {
        let mut rc = tempfile::NamedTempFile::new().unwrap();
        rc.write_all(b"export OS_PROJECT_NAME=admin\n").unwrap();
        let path = rc.path().to_str().unwrap().to_string();
        let mut args = vec!["autoprotect", "--rc-file", path.as_str(), "sweep"];
        if verbose {
            args.push("--verbose");
        }
        let cli = Cli::parse_from(args);
        (rc, cli)
    }

    #[test]
    fn test_loader_events_reach_bootstrap_subscriber() {
        let (_rc, cli) = rc_cli(true);
        let captured = Captured::default();
        let writer = captured.clone();

        // The rc file lacks required settings; only the log output matters here.
        let _ = load_config(&cli, move || writer.clone());

        let logs = captured.text();
        assert!(logs.contains("Ignoring rc variable"), "{logs}");
        assert!(logs.contains("OS_PROJECT_NAME"), "{logs}");
    }

    #[test]
    fn test_bootstrap_subscriber_respects_verbosity() {
        let (_rc, cli) = rc_cli(false);
        let captured = Captured::default();
        let writer = captured.clone();

        let _ = load_config(&cli, move || writer.clone());

        assert!(!captured.text().contains("Ignoring rc variable"));
    }
}
