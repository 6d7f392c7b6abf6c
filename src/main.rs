use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use drill_engine::{
    DrillConfig, DrillError, DrillEvent, DrillRepeatSummary, DrillSessionController,
    ExpectedDevice, KeyboardInputHandler, SessionCallbacks, SummarySink, Transport,
    TransportCommand, TransportError, TransportEvent,
};
use rand::Rng;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "drill-engine")]
#[command(about = "Run timed shooting drills against simulated targets")]
#[command(version)]
#[command(long_about = "Runs a drill session (readiness check, random start delay, shot \
collection, grace period and scoring for every repeat) against simulated targets that \
acknowledge readiness and stream random shots. Summaries are printed as JSON.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "drill.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Override the number of repeats
    #[arg(short, long, help = "Number of repeats to run")]
    repeats: Option<u32>,

    /// Simulated target names
    #[arg(short, long, value_delimiter = ',', default_value = "target-1,target-2")]
    targets: Vec<String>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without running a drill")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Drive the session from the keyboard instead of automatically
    #[arg(short, long, help = "Control the drill with the keyboard")]
    interactive: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rotated file in this directory
    #[arg(long, value_name = "DIR", help = "Directory for rotated log files")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("# Drill engine configuration");
        println!("# Every option with its default value");
        println!();
        println!("{}", DrillConfig::default().to_toml()?);
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting drill engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match DrillConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(repeats) = args.repeats {
        config.session.repeats = repeats;
    }

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let (transport, inbound) = SimulatedTransport::new(args.targets.clone());
    let controller = DrillSessionController::builder()
        .config(config)
        .devices(args.targets.iter().map(ExpectedDevice::new).collect())
        .transport(transport, inbound)
        .callbacks(Arc::new(LoggingCallbacks))
        .sink(Arc::new(StdoutSink))
        .build()
        .map_err(|e| {
            error!("Failed to start drill session: {}", e);
            e
        })?;

    let exit_code = if args.interactive {
        run_interactive(&controller).await?
    } else {
        run_automatic(&controller).await?
    };

    info!("Drill engine exited with code: {}", exit_code);
    // process::exit skips destructors, flush the file writer first
    drop(log_guard);
    std::process::exit(exit_code);
}

/// Check readiness, start the first repeat and let the session advance on
/// its own until it completes
async fn run_automatic(controller: &DrillSessionController) -> Result<i32> {
    let mut events = controller.subscribe();
    controller.perform_readiness_check().await?;

    loop {
        let event = tokio::select! {
            event = events.recv() => event?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT signal (Ctrl+C)");
                controller.stop_execution();
                return Ok(130);
            }
        };

        match event {
            DrillEvent::ReadinessUpdate { ready, total } if ready == total => {
                // With auto_advance the session arms itself after the pause
                let snapshot = controller.snapshot().await?;
                if snapshot.phase == "idle" {
                    let delay = controller.start_execution().await?;
                    info!("Repeat {} starts in {:.2}s", snapshot.current_repeat, delay);
                }
            }
            DrillEvent::ReadinessTimeout { devices } => {
                eprintln!("Targets not ready: {}", devices.join(", "));
                controller.stop_execution();
                return Ok(2);
            }
            DrillEvent::SessionCompleted { .. } => return Ok(0),
            DrillEvent::SessionFailed { reason } => {
                eprintln!("Drill failed: {}", reason);
                return Ok(1);
            }
            other => debug!("{}", other.description()),
        }
    }
}

async fn run_interactive(controller: &DrillSessionController) -> Result<i32> {
    let keyboard = KeyboardInputHandler::new(controller.clone());
    keyboard.start().await?;
    let mut events = controller.subscribe();

    let exit_code = loop {
        let event = tokio::select! {
            event = events.recv() => event?,
            _ = tokio::signal::ctrl_c() => {
                controller.stop_execution();
                break 130;
            }
        };

        match event {
            DrillEvent::SessionCompleted { .. } => break 0,
            DrillEvent::SessionFailed { .. } => break 1,
            DrillEvent::SessionStopped => break 130,
            other => info!("{}", other.description()),
        }
    };

    keyboard.stop().await?;
    Ok(exit_code)
}

fn init_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("drill_engine={}", log_level)));

    // Logs go to stderr so stdout carries only the summaries
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "drill-engine.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Targets that answer every ready query and shoot a few random hits after
/// each start signal
struct SimulatedTransport {
    targets: Vec<String>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl SimulatedTransport {
    fn new(targets: Vec<String>) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (inbound, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { targets, inbound }), receiver)
    }

    fn deliver_after(&self, delay: Duration, event: TransportEvent) {
        let inbound = self.inbound.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inbound.send(event).is_err() {
                debug!("Session gone, simulated notification dropped");
            }
        });
    }

    fn simulate_repeat(&self, target: &str) {
        let plan = plan_shots();
        let last = plan.last().map(|(offset, _)| *offset).unwrap_or(0.0);

        for (offset, hit_area) in plan {
            // Radio latency on top of the shot time
            let latency = Duration::from_millis(rand::thread_rng().gen_range(20..120));
            self.deliver_after(
                Duration::from_secs_f64(offset) + latency,
                TransportEvent::ShotReceived {
                    device: Some(target.to_string()),
                    raw: json!({
                        "type": "netlink",
                        "action": "forward",
                        "device": target,
                        "content": { "cmd": "shot", "ha": hit_area, "tt": "ipsc", "td": offset },
                    }),
                },
            );
        }

        let drill_duration = last + 0.5;
        self.deliver_after(
            Duration::from_secs_f64(drill_duration),
            TransportEvent::RepeatEnded {
                device: target.to_string(),
                drill_duration: Some(drill_duration),
            },
        );
    }
}

/// Two to four shots with realistic splits
fn plan_shots() -> Vec<(f64, &'static str)> {
    const ZONES: [&str; 5] = ["azone", "azone", "czone", "dzone", "miss"];
    let mut rng = rand::thread_rng();
    let count = rng.gen_range(2..=4);
    let mut offset = rng.gen_range(0.8..1.6);

    (0..count)
        .map(|_| {
            let shot = (offset, ZONES[rng.gen_range(0..ZONES.len())]);
            offset += rng.gen_range(0.18..0.45);
            shot
        })
        .collect()
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send(&self, command: &TransportCommand) -> std::result::Result<(), TransportError> {
        match command.command_name() {
            Some("ready") if self.targets.contains(&command.dest) => {
                let latency = Duration::from_millis(rand::thread_rng().gen_range(100..600));
                self.deliver_after(
                    latency,
                    TransportEvent::DeviceReady {
                        device: command.dest.clone(),
                    },
                );
            }
            Some("start") => {
                for target in &self.targets {
                    self.simulate_repeat(target);
                }
            }
            Some(other) => debug!("Simulated targets ignore {}", other),
            None => warn!("Command without a name: {:?}", command.content),
        }
        Ok(())
    }
}

struct LoggingCallbacks;

impl SessionCallbacks for LoggingCallbacks {
    fn on_readiness_update(&self, ready: usize, total: usize) {
        info!("Targets ready: {}/{}", ready, total);
    }

    fn on_readiness_timeout(&self, devices: &[String]) {
        warn!("Targets did not respond: {}", devices.join(", "));
    }

    fn on_repeat_finalized(&self, summary: &DrillRepeatSummary) {
        info!(
            "Repeat {}: {} shots, first {:.2}s, fastest split {:.2}s, score {}, hit factor {:.2}",
            summary.repeat_index,
            summary.num_shots,
            summary.first_shot,
            summary.fastest,
            summary.score,
            summary.hit_factor()
        );
    }

    fn on_complete(&self, summaries: &[DrillRepeatSummary]) {
        info!("Drill complete: {} repeats", summaries.len());
    }

    fn on_failure(&self, error: &DrillError) {
        error!("{}", error.user_message());
    }
}

/// Writes the finished session to stdout as JSON
struct StdoutSink;

#[async_trait]
impl SummarySink for StdoutSink {
    async fn store(&self, summaries: &[DrillRepeatSummary]) -> drill_engine::Result<()> {
        let rendered = serde_json::to_string_pretty(summaries)
            .map_err(|e| DrillError::component("sink".to_string(), e.to_string()))?;
        println!("{}", rendered);
        Ok(())
    }
}
