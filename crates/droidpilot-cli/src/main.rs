//! DroidPilot CLI - Command-line interface for Android UI automation
//!
//! Usage:
//!     droidpilot [OPTIONS] <COMMAND>
//!
//! Environment Variables:
//!     DROIDPILOT_DEVICE_ID: ADB device ID for multi-device setups
//!     DROIDPILOT_SNAPSHOT_MAX_AGE_MS: Snapshot cache freshness window
//!     DROIDPILOT_WAIT_TIMEOUT_MS: Default wait timeout
//!     DROIDPILOT_POLL_INTERVAL_MS: Default wait poll interval
//!     RUST_LOG: Log filter (e.g. ui_automation=debug)

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use ui_automation::{
    AdbBridge, FlowPlan, FlowState, MatchMode, Selector, SnapshotOptions, StepResult, UiAutomator,
    WaitOptions,
};

/// DroidPilot - drive Android devices through ADB
#[derive(Parser, Debug)]
#[command(name = "droidpilot")]
#[command(about = "DroidPilot - drive Android devices through ADB")]
#[command(after_help = r#"Examples:
    # List connected devices
    droidpilot devices

    # Run a flow plan against the only connected device
    droidpilot run login-flow.json

    # Run against a specific device, JSON results
    droidpilot -d emulator-5554 --json run checkout.json

    # Dump the current UI hierarchy
    droidpilot dump

    # Tap the first node whose text contains "Sign in"
    droidpilot tap --text "Sign in"

    # Wait up to 10s for a resource id to appear
    droidpilot wait --id com.app:id/home --timeout-ms 10000

    # Classify login controls on the current screen
    droidpilot login-fields
"#)]
struct Cli {
    /// ADB device ID
    #[arg(short = 'd', long, env = "DROIDPILOT_DEVICE_ID", global = true)]
    device_id: Option<String>,

    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    json: bool,

    /// Suppress the system requirements check
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List connected devices and exit
    Devices,
    /// Print the current UI hierarchy
    Dump {
        /// Print raw markup instead of parsed nodes
        #[arg(long)]
        raw: bool,
    },
    /// Run a flow plan JSON file
    Run {
        /// Path to the plan file
        plan: String,
    },
    /// Find a node by selector and tap it
    Tap {
        #[command(flatten)]
        selector: SelectorArgs,
    },
    /// Wait for a node matching the selector to appear (or disappear)
    Wait {
        #[command(flatten)]
        selector: SelectorArgs,

        /// Overall timeout in milliseconds
        #[arg(long, env = "DROIDPILOT_WAIT_TIMEOUT_MS")]
        timeout_ms: Option<u64>,

        /// Poll interval in milliseconds
        #[arg(long, env = "DROIDPILOT_POLL_INTERVAL_MS")]
        interval_ms: Option<u64>,

        /// Wait for the selector to stop matching instead
        #[arg(long)]
        gone: bool,
    },
    /// Classify login controls on the current screen
    LoginFields,
    /// Print the current foreground activity
    Activity,
}

#[derive(clap::Args, Debug)]
struct SelectorArgs {
    /// Match against node text
    #[arg(long, group = "field")]
    text: Option<String>,

    /// Match against resource id
    #[arg(long, group = "field")]
    id: Option<String>,

    /// Match against content description
    #[arg(long, group = "field")]
    desc: Option<String>,

    /// How the value is compared
    #[arg(long, value_enum, default_value_t = MatchArg::Contains)]
    mode: MatchArg,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum MatchArg {
    Exact,
    Contains,
    Regex,
}

impl From<MatchArg> for MatchMode {
    fn from(arg: MatchArg) -> Self {
        match arg {
            MatchArg::Exact => MatchMode::Exact,
            MatchArg::Contains => MatchMode::Contains,
            MatchArg::Regex => MatchMode::Regex,
        }
    }
}

impl SelectorArgs {
    fn build(&self) -> Result<Selector> {
        let selector = if let Some(text) = &self.text {
            Selector::text(text)
        } else if let Some(id) = &self.id {
            Selector::resource_id(id)
        } else if let Some(desc) = &self.desc {
            Selector::content_desc(desc)
        } else {
            bail!("one of --text, --id or --desc is required");
        };
        Ok(selector.with_mode(self.mode.into()))
    }
}

/// Check system requirements before talking to a device
async fn check_system_requirements() -> bool {
    println!("\u{1F50D} Checking system requirements...");
    println!("{}", "-".repeat(50));

    print!("1. Checking ADB installation... ");
    io::stdout().flush().ok();

    if which::which("adb").is_err() {
        println!("\u{274C} FAILED");
        println!("   Error: adb is not installed or not in PATH.");
        println!("   Solution: Install ADB:");
        println!("     - macOS: brew install android-platform-tools");
        println!("     - Linux: sudo apt install android-tools-adb");
        println!(
            "     - Windows: Download from https://developer.android.com/studio/releases/platform-tools"
        );
        println!("{}", "-".repeat(50));
        println!("\u{274C} System check failed. Please fix the issues above.");
        return false;
    }

    let version_result = tokio::time::timeout(
        Duration::from_secs(10),
        Command::new("adb").arg("version").output(),
    )
    .await;

    match version_result {
        Ok(Ok(output)) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version_line = stdout.lines().next().unwrap_or("installed");
            println!("\u{2705} OK ({})", version_line);
        }
        Ok(Ok(_)) | Ok(Err(_)) => {
            println!("\u{274C} FAILED");
            println!("   Error: adb command failed to run.");
            return false;
        }
        Err(_) => {
            println!("\u{274C} FAILED");
            println!("   Error: adb command timed out.");
            return false;
        }
    }

    println!("{}", "-".repeat(50));
    println!("\u{2705} All system checks passed!\n");
    true
}

/// Resolve the target device: the explicit one, or the single connected one
async fn resolve_device(bridge: &AdbBridge, requested: Option<String>) -> Result<String> {
    if let Some(device_id) = requested {
        return Ok(device_id);
    }

    let devices = bridge.list_devices().await?;
    let online: Vec<_> = devices.iter().filter(|d| d.status == "device").collect();
    match online.len() {
        0 => Err(anyhow!(
            "No devices connected. Enable USB debugging and authorize the connection."
        )),
        1 => Ok(online[0].device_id.clone()),
        n => Err(anyhow!(
            "{} devices connected; pick one with --device-id or DROIDPILOT_DEVICE_ID",
            n
        )),
    }
}

async fn cmd_devices(bridge: &AdbBridge, json: bool) -> Result<()> {
    let devices = bridge.list_devices().await?;

    if json {
        let entries: Vec<_> = devices
            .iter()
            .map(|d| {
                serde_json::json!({
                    "device_id": d.device_id,
                    "status": d.status,
                    "model": d.model,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices connected.");
        return Ok(());
    }

    println!("Connected devices:");
    println!("{}", "-".repeat(60));
    for device in devices {
        let status_icon = if device.status == "device" {
            "\u{2713}"
        } else {
            "\u{2717}"
        };
        let model_info = device
            .model
            .map(|m| format!(" ({})", m))
            .unwrap_or_default();
        println!(
            "  {} {:<30} [{}]{}",
            status_icon, device.device_id, device.status, model_info
        );
    }
    Ok(())
}

async fn cmd_dump(engine: &UiAutomator, raw: bool, json: bool) -> Result<()> {
    let snapshot = engine.snapshot(&SnapshotOptions::fresh()).await?;

    if raw {
        println!("{}", snapshot.raw_text);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot.nodes)?);
        return Ok(());
    }

    println!(
        "{} nodes (activity: {})",
        snapshot.nodes.len(),
        snapshot.activity_at_capture.as_deref().unwrap_or("unknown")
    );
    println!("{}", "-".repeat(60));
    for (index, node) in snapshot.nodes.iter().enumerate() {
        println!("  [{:>3}] {}", index, node.describe());
    }
    Ok(())
}

fn print_step_results(results: &[StepResult]) {
    for (index, result) in results.iter().enumerate() {
        let icon = if result.ok { "\u{2713}" } else { "\u{2717}" };
        let label = result.id.as_deref().unwrap_or(&result.step_type);
        let elapsed = result
            .elapsed_ms
            .map(|ms| format!(" ({}ms)", ms))
            .unwrap_or_default();
        match &result.message {
            Some(message) => println!("  {} [{:>3}] {:<24} {}{}", icon, index, label, message, elapsed),
            None => println!("  {} [{:>3}] {}{}", icon, index, label, elapsed),
        }
    }
}

async fn cmd_run(engine: &UiAutomator, plan_path: &str, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(plan_path)
        .map_err(|e| anyhow!("cannot read plan file {}: {}", plan_path, e))?;
    let plan: FlowPlan =
        serde_json::from_str(&raw).map_err(|e| anyhow!("invalid plan file {}: {}", plan_path, e))?;

    let outcome = engine.run_flow_plan(&plan).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("Flow results:");
        println!("{}", "-".repeat(60));
        print_step_results(&outcome.results);
        println!("{}", "-".repeat(60));
        match outcome.state {
            FlowState::Completed => println!("\u{2705} Flow completed"),
            FlowState::HaltedOnFailure => println!("\u{274C} Flow halted on failure"),
        }
    }

    if outcome.state == FlowState::HaltedOnFailure {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_tap(engine: &UiAutomator, args: &SelectorArgs, json: bool) -> Result<()> {
    let selector = args.build()?;
    let report = engine.tap_by_selector(&selector).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "matched": report.is_some(),
                "report": report,
            }))?
        );
        return Ok(());
    }

    match report {
        Some(report) => match report.point {
            Some((x, y)) => println!(
                "\u{2713} Tapped ({}, {}) via {:?}",
                x, y, report.resolution.reason
            ),
            None => println!("\u{2717} Matched, but the node has no usable bounds"),
        },
        None => {
            println!("\u{2717} No node matching {}", selector);
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn cmd_wait(
    engine: &UiAutomator,
    args: &SelectorArgs,
    timeout_ms: Option<u64>,
    interval_ms: Option<u64>,
    gone: bool,
    json: bool,
) -> Result<()> {
    let selector = args.build()?;
    let options = WaitOptions {
        timeout_ms,
        interval_ms,
        cancel: None,
    };

    let result = if gone {
        engine.wait_for_gone(&selector, &options).await?
    } else {
        engine.wait_for(&selector, &options).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.found {
        println!(
            "\u{2713} Condition met after {}ms ({} match(es))",
            result.elapsed_ms, result.matches
        );
    } else {
        println!(
            "\u{2717} Timed out after {}ms ({} match(es) last seen)",
            result.elapsed_ms, result.matches
        );
    }

    if !result.found {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_login_fields(engine: &UiAutomator, json: bool) -> Result<()> {
    let snapshot = engine.snapshot(&SnapshotOptions::fresh()).await?;
    let fields =
        ui_automation::login::detect_login_fields(&snapshot.nodes, &engine.config().login);

    let describe = |index: Option<usize>| index.map(|i| snapshot.nodes[i].describe());

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "email_field": describe(fields.email_field),
                "password_field": describe(fields.password_field),
                "submit_button": describe(fields.submit_button),
            }))?
        );
        return Ok(());
    }

    println!("Login field detection:");
    println!("{}", "-".repeat(60));
    for (label, found) in [
        ("Email/username", describe(fields.email_field)),
        ("Password", describe(fields.password_field)),
        ("Submit", describe(fields.submit_button)),
    ] {
        match found {
            Some(node) => println!("  \u{2713} {:<16} {}", label, node),
            None => println!("  \u{2717} {:<16} not found", label),
        }
    }
    Ok(())
}

async fn cmd_activity(engine: &UiAutomator, json: bool) -> Result<()> {
    let activity = engine.foreground_activity().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "package": activity.as_ref().map(|a| &a.package),
                "component": activity.as_ref().and_then(|a| a.component.as_ref()),
            }))?
        );
        return Ok(());
    }

    match activity {
        Some(fg) => println!("{}", fg.component.unwrap_or(fg.package)),
        None => println!("(unknown)"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Cli::parse();
    let bridge = Arc::new(AdbBridge::new());

    // Device listing needs no target device and no noisy preamble
    if let Commands::Devices = args.command {
        return cmd_devices(&bridge, args.json).await;
    }

    if !args.quiet && !args.json && !check_system_requirements().await {
        std::process::exit(1);
    }

    let device_id = resolve_device(&bridge, args.device_id.clone()).await?;
    let engine = UiAutomator::new(bridge, device_id);

    match &args.command {
        Commands::Devices => unreachable!(),
        Commands::Dump { raw } => cmd_dump(&engine, *raw, args.json).await,
        Commands::Run { plan } => cmd_run(&engine, plan, args.json).await,
        Commands::Tap { selector } => cmd_tap(&engine, selector, args.json).await,
        Commands::Wait {
            selector,
            timeout_ms,
            interval_ms,
            gone,
        } => cmd_wait(&engine, selector, *timeout_ms, *interval_ms, *gone, args.json).await,
        Commands::LoginFields => cmd_login_fields(&engine, args.json).await,
        Commands::Activity => cmd_activity(&engine, args.json).await,
    }
}
