//! Dockside CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse arguments**: engine endpoint, API version, timeout, logging.
//! 2. **Wire observability**: `tracing-subscriber` with a text or JSON layer
//!    and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OTLP span exporter.
//! 3. **Construct infrastructure**: resolve a [`TransportConfig`] and build
//!    the [`HttpTransport`]. Failure here is fatal (exit code 2).
//! 4. **Run one command** against a [`DockerClient`] and print the resulting
//!    envelope as JSON. A failure envelope exits with code 1.

mod telemetry;

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::{
    AttachMode, DockerClient, ListContainersOptions, LogOptions, LogSink, ResponseEnvelope,
};
use engine::{demultiplex, ContainerId, ContainerName, ImageRef};
use telemetry::LogFormat;
use tracing::{error, info};
use transport::{HttpTransport, TransportConfig};

#[derive(Debug, Parser)]
#[command(name = "dockside", version, about = "Talk to a container engine over its HTTP API")]
struct Cli {
    /// Engine address: unix:///path, /path, tcp://host:port, or http(s)://host:port.
    /// Falls back to DOCKER_HOST, then the default socket.
    #[arg(long, short = 'H', global = true)]
    host: Option<String>,

    /// API version prefix, e.g. 1.41.
    #[arg(long, env = "DOCKER_API_VERSION", global = true)]
    api_version: Option<String>,

    /// Per-request timeout in seconds. 0 disables it. Waits are never limited.
    #[arg(long, default_value_t = 30, global = true)]
    timeout: u64,

    /// Log filter directive when RUST_LOG is unset.
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// System-wide information.
    Info,
    /// Engine version.
    Version,
    /// List images.
    Images,
    /// List containers.
    Ps {
        /// Include stopped containers.
        #[arg(long, short)]
        all: bool,
        #[arg(long, short = 'n')]
        limit: Option<i64>,
    },
    /// Low-level information on a container.
    Inspect { container: String },
    /// Processes running inside a container.
    Top { container: String },
    /// Filesystem changes of a container.
    Diff { container: String },
    /// Print a container's output.
    Logs {
        container: String,
        /// Keep printing new output until interrupted or the container stops.
        #[arg(long, short)]
        follow: bool,
        #[arg(long, short)]
        timestamps: bool,
        #[arg(long, default_value = "all")]
        tail: String,
    },
    /// Create and start a container.
    Run {
        image: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
        #[arg(long)]
        name: Option<String>,
        /// Wait for the container, print its output, then remove it.
        #[arg(long)]
        rm: bool,
    },
    /// Start a created container.
    Start { container: String },
    /// Stop a container.
    Stop {
        container: String,
        /// Seconds to wait before killing.
        #[arg(long, short)]
        time: Option<i64>,
    },
    /// Restart a container.
    Restart {
        container: String,
        #[arg(long, short)]
        time: Option<i64>,
    },
    /// Send a signal to a container.
    Kill {
        container: String,
        #[arg(long, short)]
        signal: Option<String>,
    },
    Pause { container: String },
    Unpause { container: String },
    /// Block until a container stops.
    Wait { container: String },
    /// Remove a container.
    Rm {
        container: String,
        #[arg(long, short)]
        force: bool,
        /// Remove anonymous volumes too.
        #[arg(long, short)]
        volumes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _telemetry = match telemetry::init(&cli.log_level, cli.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("dockside: {e:#}");
            return ExitCode::from(2);
        }
    };

    let transport = match build_transport(&cli) {
        Ok(transport) => transport,
        Err(e) => {
            error!(error = %format!("{e:#}"), "engine transport could not be initialised");
            eprintln!("dockside: {e:#}");
            return ExitCode::from(2);
        }
    };
    info!(endpoint = %engine::Transport::endpoint(&transport), "using engine");

    let client = DockerClient::new(transport);
    let code = match run(&client, cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dockside: {e:#}");
            ExitCode::FAILURE
        }
    };
    client.shutdown().await;
    code
}

fn build_transport(cli: &Cli) -> Result<HttpTransport> {
    let lookup = |key: &str| match key {
        "DOCKER_API_VERSION" if cli.api_version.is_some() => cli.api_version.clone(),
        _ => std::env::var(key).ok(),
    };
    let timeout = (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout));
    let config = TransportConfig::resolve(cli.host.as_deref(), lookup)?.with_timeout(timeout);
    Ok(HttpTransport::new(config)?)
}

fn container(id: &str) -> Result<ContainerId> {
    ContainerId::new(id).ok_or_else(|| anyhow::anyhow!("container ID must not be empty"))
}

async fn run(client: &DockerClient<HttpTransport>, command: Command) -> Result<ExitCode> {
    let envelope = match command {
        Command::Info => client.system_info().await,
        Command::Version => client.version().await,
        Command::Images => client.list_images().await,
        Command::Ps { all, limit } => {
            let options = ListContainersOptions {
                all,
                limit,
                ..ListContainersOptions::default()
            };
            client.list_containers(&options).await
        }
        Command::Inspect { container: id } => client.inspect_container(&container(&id)?).await,
        Command::Top { container: id } => client.top_container(&container(&id)?).await,
        Command::Diff { container: id } => client.container_changes(&container(&id)?).await,
        Command::Logs {
            container: id,
            follow,
            timestamps,
            tail,
        } => {
            let id = container(&id)?;
            if follow {
                return follow_logs(client, &id).await;
            }
            let options = LogOptions {
                timestamps,
                tail,
                ..LogOptions::both_streams(false)
            };
            let envelope = client.container_logs(&id, &options).await;
            if let Some(bytes) = envelope.bytes() {
                print_frames(bytes);
                return Ok(ExitCode::SUCCESS);
            }
            envelope
        }
        Command::Run {
            image,
            command,
            name,
            rm,
        } => return run_container(client, &image, &command, name.as_deref(), rm).await,
        Command::Start { container: id } => client.start_container(&container(&id)?).await,
        Command::Stop { container: id, time } => client.stop_container(&container(&id)?, time).await,
        Command::Restart { container: id, time } => {
            client.restart_container(&container(&id)?, time).await
        }
        Command::Kill { container: id, signal } => {
            client.kill_container(&container(&id)?, signal.as_deref()).await
        }
        Command::Pause { container: id } => client.pause_container(&container(&id)?).await,
        Command::Unpause { container: id } => client.unpause_container(&container(&id)?).await,
        Command::Wait { container: id } => client.wait_container(&container(&id)?).await,
        Command::Rm {
            container: id,
            force,
            volumes,
        } => client.delete_container(&container(&id)?, volumes, force).await,
    };
    print_envelope(&envelope)
}

fn print_envelope(envelope: &ResponseEnvelope) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(if envelope.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_frames(bytes: &[u8]) {
    let mut out = std::io::stdout().lock();
    let mut err = std::io::stderr().lock();
    demultiplex(
        bytes,
        |p| {
            let _ = out.write_all(p);
        },
        |p| {
            let _ = err.write_all(p);
        },
    );
    let _ = out.flush();
}

async fn follow_logs(client: &DockerClient<HttpTransport>, id: &ContainerId) -> Result<ExitCode> {
    let sink = LogSink::callbacks()
        .on_stdout(|p| {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(p);
            let _ = out.flush();
        })
        .on_stderr(|p| {
            let _ = std::io::stderr().write_all(p);
        });

    if !client.attach_log_stream(id.as_str(), sink, AttachMode::Follow).await {
        anyhow::bail!("could not attach to the log of {id}");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!(container = %id.short(), "interrupted"),
        _ = client.wait_container(id) => info!(container = %id.short(), "container stopped"),
    }
    client.detach_log_stream(id.as_str()).await;
    Ok(ExitCode::SUCCESS)
}

async fn run_container(
    client: &DockerClient<HttpTransport>,
    image: &str,
    command: &[String],
    name: Option<&str>,
    remove: bool,
) -> Result<ExitCode> {
    let image = ImageRef::new(image).ok_or_else(|| anyhow::anyhow!("image must not be empty"))?;
    let name = name.and_then(ContainerName::new);

    if !remove {
        let Some(id) = client.run_container_async(&image, command, name.as_ref()).await else {
            anyhow::bail!("container could not be started; rerun with --log-level info for details");
        };
        println!("{id}");
        return Ok(ExitCode::SUCCESS);
    }

    let Some(output) = client.run_and_collect(&image, command, name.as_ref()).await else {
        anyhow::bail!("container run failed; rerun with --log-level info for details");
    };
    let _ = std::io::stdout().write_all(&output.stdout);
    let _ = std::io::stderr().write_all(&output.stderr);
    Ok(match u8::try_from(output.exit_code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    })
}
