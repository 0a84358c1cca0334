// atlib test application -- CLI tool for exercising AT-command modules
// (Wi-Fi, BLE, LoRaWAN, cellular) against real hardware or a mock transport.
//
// Usage:
//   atlib-test-app families
//   atlib-test-app ports
//   atlib-test-app --family lora events
//   atlib-test-app --family wifi --port /dev/ttyUSB0 send AT+GMR
//   atlib-test-app --family wifi --port /dev/ttyUSB0 send AT+CWJAP=\"net\",\"pw\" --timeout long
//   atlib-test-app --family ble --mock send AT+NAME=tag
//   atlib-test-app --family cellular --port /dev/ttyACM0 monitor --duration 60
//   atlib-test-app --family lora --port /dev/ttyUSB1 stress --count 200

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use atlib::ble::BleModule;
use atlib::cellular::CellularModem;
use atlib::families::{event_listing, find_family, Family};
use atlib::lora::LoraModule;
use atlib::wifi::WifiModule;
use atlib::{available_ports, ConfirmationStatus, Session, SessionStats, TimeoutCategory};
use atlib_test_harness::MockTransport;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// atlib test application -- exercises AT-command modules from the command line.
#[derive(Parser)]
#[command(name = "atlib-test-app", version, about)]
struct Cli {
    /// Chip family: wifi, ble, lora, cellular.
    /// Required for all commands except `families` and `ports`.
    #[arg(long)]
    family: Option<String>,

    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    /// Required unless --mock is used.
    #[arg(long)]
    port: Option<String>,

    /// Override the family's default baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Use a mock transport instead of a real serial port.
    /// Every command sent is answered with the family's success token.
    #[arg(long)]
    mock: bool,

    /// Log engine activity at debug level (overridden by RUST_LOG).
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the chip families compiled into this build.
    Families,

    /// List serial ports present on this machine.
    Ports,

    /// Print a family's unsolicited-event table.
    Events,

    /// Send one command and wait for its confirmation.
    Send {
        /// Command text, without the line terminator.
        command: String,

        /// Confirmation to wait for.
        #[arg(long, default_value = "success", value_enum)]
        expect: Expect,

        /// Timeout category.
        #[arg(long, default_value = "standard", value_enum)]
        timeout: Timeout,

        /// Do not append the family's line terminator.
        #[arg(long)]
        raw: bool,
    },

    /// Print unsolicited events as they arrive.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Issue the same command repeatedly and report the success rate.
    Stress {
        /// Number of requests.
        #[arg(long, default_value_t = 100)]
        count: u32,

        /// Command text, without the line terminator.
        #[arg(long, default_value = "AT")]
        command: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Expect {
    Success,
    Failure,
    /// The `>` data prompt.
    Prompt,
}

impl From<Expect> for ConfirmationStatus {
    fn from(expect: Expect) -> Self {
        match expect {
            Expect::Success => ConfirmationStatus::Success,
            Expect::Failure => ConfirmationStatus::Failure,
            Expect::Prompt => ConfirmationStatus::ReadyForData,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Timeout {
    Short,
    Standard,
    Long,
}

impl From<Timeout> for TimeoutCategory {
    fn from(timeout: Timeout) -> Self {
        match timeout {
            Timeout::Short => TimeoutCategory::Short,
            Timeout::Standard => TimeoutCategory::Standard,
            Timeout::Long => TimeoutCategory::Long,
        }
    }
}

// ---------------------------------------------------------------------------
// Session construction
// ---------------------------------------------------------------------------

/// Append the family's terminator unless `raw` is set.
fn command_line<F: Family>(command: &str, raw: bool) -> String {
    let mut line = command.to_string();
    if !raw {
        line.extend(F::info().terminators.as_bytes().iter().map(|&b| b as char));
    }
    line
}

async fn open_session<F: Family>(cli: &Cli, mock_replies: &[String]) -> Result<Session<F::Event>> {
    let info = F::info();
    let mut builder = F::session_builder().context("invalid family definition")?;

    if cli.mock {
        let mut mock = MockTransport::new();
        let mut reply = F::engine_config().vocabulary.success;
        reply.extend(info.terminators.as_bytes().iter().map(|&b| b as char));
        for line in mock_replies {
            mock.expect(line.as_bytes(), reply.as_bytes());
        }
        let session = builder
            .build_with_transport(Box::new(mock))
            .await
            .context("failed to build session with mock transport")?;
        println!("Connected (mock transport) -- {}", info.name);
        return Ok(session);
    }

    let port = cli
        .port
        .as_deref()
        .context("--port is required when not using --mock")?;
    let baud = cli.baud.unwrap_or(info.default_baud_rate);
    builder = builder.serial_port(port).baud_rate(baud);

    let session = builder
        .build()
        .await
        .with_context(|| format!("failed to open serial port {port} at {baud} baud"))?;
    println!("Connected to {port} at {baud} baud -- {}", info.name);
    Ok(session)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_families() -> Result<()> {
    let families = atlib::supported_families();
    if families.is_empty() {
        println!("No families compiled in.");
        return Ok(());
    }

    let name_width = families.iter().map(|f| f.name.len()).max().unwrap_or(4).max(4);
    println!("{:<10}  {:<name_width$}  {:>8}  Terminator", "Id", "Name", "Baud");
    println!(
        "{:<10}  {:<name_width$}  {:>8}  ----------",
        "-".repeat(10),
        "-".repeat(name_width),
        "--------",
    );
    for f in &families {
        println!(
            "{:<10}  {:<name_width$}  {:>8}  {:?}",
            f.id, f.name, f.default_baud_rate, f.terminators
        );
    }
    Ok(())
}

fn cmd_ports() -> Result<()> {
    let ports = available_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn cmd_events<F: Family>() -> Result<()> {
    let entries = event_listing::<F>().context("invalid event table")?;
    let path_width = entries.iter().map(|e| e.path.len()).max().unwrap_or(4).max(4);

    println!("{:<path_width$}  {:<24}  Trailing", "Path", "Event");
    println!("{:<path_width$}  {:<24}  --------", "-".repeat(path_width), "-".repeat(24));
    for e in &entries {
        println!("{:<path_width$}  {:<24}  {}", e.path, e.event, e.trailing_lines);
    }
    Ok(())
}

async fn cmd_send<F: Family>(
    cli: &Cli,
    command: &str,
    expect: Expect,
    timeout: Timeout,
    raw: bool,
) -> Result<()> {
    let line = command_line::<F>(command, raw);
    let mut session = open_session::<F>(cli, std::slice::from_ref(&line)).await?;
    session.register_event_callback(|event, args| println!("[event] {event:?} {args}"));

    let start = Instant::now();
    session.send(&line).await.context("send failed")?;
    let result = session.wait_for(timeout.into(), expect.into()).await;
    let elapsed = start.elapsed();

    let outcome = match result {
        Ok(body) => {
            if !body.is_empty() {
                println!("{body}");
            }
            println!("Confirmed in {:.1} ms", elapsed.as_secs_f64() * 1000.0);
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("{command} failed"))),
    };

    print_stats(&session).await;
    session.shutdown().await.ok();
    outcome
}

async fn cmd_monitor<F: Family>(cli: &Cli, duration_secs: u64) -> Result<()> {
    let mut session = open_session::<F>(cli, &[]).await?;

    println!("Monitoring events (Ctrl-C to stop)...");

    let deadline = if duration_secs > 0 {
        Some(Instant::now() + Duration::from_secs(duration_secs))
    } else {
        None
    };

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = tokio::time::timeout(timeout, session.next_event()) => match next {
                Ok(Some(n)) => println!("[event] {:?} {}", n.event, n.args),
                Ok(None) => {
                    println!("Event channel closed.");
                    break;
                }
                Err(_) => {
                    if deadline.is_some() {
                        println!("Monitor duration elapsed.");
                        break;
                    }
                }
            },
        }
    }

    print_stats(&session).await;
    session.shutdown().await.ok();
    Ok(())
}

async fn cmd_stress<F: Family>(cli: &Cli, count: u32, command: &str) -> Result<()> {
    let line = command_line::<F>(command, false);
    let script = vec![line.clone(); count as usize];
    let mut session = open_session::<F>(cli, &script).await?;

    println!("Stress test: {count} x {command}");

    let mut success = 0u32;
    let mut failures = 0u32;
    let start = Instant::now();

    for i in 1..=count {
        match session.request(&line, ConfirmationStatus::Success).await {
            Ok(_) => success += 1,
            Err(e) => {
                eprintln!("[{i}/{count}] {e}");
                failures += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    println!();
    println!("Results:");
    println!("  Total requests: {count}");
    println!("  Successes:      {success}");
    println!("  Failures:       {failures}");
    println!("  Elapsed:        {:.3} s", elapsed.as_secs_f64());
    println!("  Rate:           {rate:.1} requests/sec");

    print_stats(&session).await;
    session.shutdown().await.ok();

    if failures > 0 {
        bail!("{failures} out of {count} requests failed");
    }
    Ok(())
}

async fn print_stats<E>(session: &Session<E>)
where
    E: Copy + std::fmt::Debug + Send + Sync + 'static,
{
    match session.stats().await {
        Ok(stats) => print_stats_table(&stats),
        Err(e) => eprintln!("Warning: could not read session statistics: {e}"),
    }
}

fn print_stats_table(stats: &SessionStats) {
    println!();
    println!("Session:");
    println!("  Lines:          {}", stats.lines);
    println!("  Confirmations:  {} ({} stray)", stats.confirmations, stats.stray_confirmations);
    println!("  Body lines:     {}", stats.body_lines);
    println!("  Events:         {} ({} lost)", stats.events, stats.events_lost);
    println!("  Unknown events: {}", stats.unknown_events);
    println!("  Dropped lines:  {}", stats.dropped_lines);
    println!("  Overflows:      {}", stats.overflows);
}

async fn run<F: Family>(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Events => cmd_events::<F>(),
        Command::Send {
            command,
            expect,
            timeout,
            raw,
        } => cmd_send::<F>(cli, command, *expect, *timeout, *raw).await,
        Command::Monitor { duration } => cmd_monitor::<F>(cli, *duration).await,
        Command::Stress { count, command } => cmd_stress::<F>(cli, *count, command).await,
        Command::Families | Command::Ports => unreachable!("handled before family lookup"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Families => return cmd_families(),
        Command::Ports => return cmd_ports(),
        _ => {}
    }

    let id = cli
        .family
        .as_deref()
        .context("--family is required for this command")?;
    let Some(family) = find_family(id) else {
        bail!("unknown family '{id}'. Run `atlib-test-app families` for the list");
    };

    match family.id {
        "wifi" => run::<WifiModule>(&cli).await,
        "ble" => run::<BleModule>(&cli).await,
        "lora" => run::<LoraModule>(&cli).await,
        "cellular" => run::<CellularModem>(&cli).await,
        other => bail!("family '{other}' has no command handlers"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_defaults() {
        let cli = Cli::try_parse_from(["atlib-test-app", "--family", "wifi", "--mock", "send", "AT"])
            .unwrap();
        match cli.command {
            Command::Send {
                expect,
                timeout,
                raw,
                ..
            } => {
                assert!(matches!(expect, Expect::Success));
                assert!(matches!(timeout, Timeout::Standard));
                assert!(!raw);
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn terminator_follows_family() {
        assert_eq!(command_line::<WifiModule>("AT", false), "AT\r\n");
        assert_eq!(command_line::<BleModule>("AT", false), "AT\r");
        assert_eq!(command_line::<BleModule>("AT", true), "AT");
    }

    #[tokio::test]
    async fn mock_session_answers_with_success_token() {
        let cli = Cli::try_parse_from(["atlib-test-app", "--family", "ble", "--mock", "events"])
            .unwrap();
        let line = command_line::<BleModule>("AT+NAME=tag", false);
        let mut session = open_session::<BleModule>(&cli, std::slice::from_ref(&line))
            .await
            .unwrap();
        session
            .request(&line, ConfirmationStatus::Success)
            .await
            .unwrap();
        session.shutdown().await.unwrap();
    }
}
