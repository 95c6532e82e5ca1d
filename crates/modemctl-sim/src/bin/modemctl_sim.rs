//! modemctl-sim: run network operations against a simulated modem and print
//! the results as JSON.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use crossbeam_channel::bounded;
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use modemctl_network::pending::CompletionFn;
use modemctl_network::types::{OperatorInfo, SlotId};
use modemctl_network::{
    Completion, EventId, MessageKind, NetworkConfig, NetworkContext, NetworkError, NetworkEvent,
};
use modemctl_sim::{ModemProfile, SimModem};

#[derive(Parser, Debug)]
#[command(
    name = "modemctl-sim",
    about = "Drive network registration and cell search against a simulated modem"
)]
struct Cli {
    /// Modem profile TOML. Uses the built-in two-slot demo when omitted.
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Network configuration TOML.
    #[arg(long)]
    config: Option<PathBuf>,

    /// SIM slot to address.
    #[arg(long, default_value_t = 0)]
    slot: SlotId,

    /// Seconds to wait for each response.
    #[arg(long, default_value_t = 10)]
    wait: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan for available operators.
    Scan,
    /// Let the modem pick the network.
    SelectAuto,
    /// Register on the operator with this identifier.
    SelectManual { id: String },
    /// Serving cell list.
    ServingCells,
    /// Neighbouring cell list.
    NeighbouringCells,
    /// Registration snapshot.
    Registration,
    /// Set the periodic cell report interval (0 disables).
    CellRate { ms: u32 },
    /// Registration and signal summary from the synchronous accessors.
    Status,
    /// Print indications as they arrive.
    Watch {
        #[arg(long, default_value_t = 10)]
        seconds: u64,

        /// Cell report interval requested while watching.
        #[arg(long, default_value_t = 1000)]
        rate_ms: u32,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = match &cli.profile {
        Some(path) => ModemProfile::load(path)?,
        None => ModemProfile::demo(),
    };
    let config = load_config(cli.config.as_deref(), profile.slots.len())?;

    let modem = Arc::new(SimModem::new(profile));
    let ctx = NetworkContext::init(config, modem.clone()).context("initializing network context")?;
    info!(slot = cli.slot, command = ?cli.command, "modemctl-sim starting");

    let output = run(&ctx, &cli)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_config(path: Option<&Path>, profile_slots: usize) -> anyhow::Result<NetworkConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            NetworkConfig::from_toml_str(&text).map_err(anyhow::Error::msg)
        }
        None => Ok(NetworkConfig {
            slots: profile_slots,
            ..Default::default()
        }),
    }
}

fn run(ctx: &NetworkContext, cli: &Cli) -> anyhow::Result<Value> {
    let slot = cli.slot;
    let wait = Duration::from_secs(cli.wait);

    let completion = match &cli.command {
        Command::Scan => await_completion(wait, |cb| ctx.scan(slot, cb))?,
        Command::SelectAuto => await_completion(wait, |cb| ctx.select_auto(slot, cb))?,
        Command::SelectManual { id } => {
            let target = find_operator(ctx, slot, wait, id)?;
            await_completion(wait, |cb| ctx.select_manual(slot, &target, cb))?
        }
        Command::ServingCells => await_completion(wait, |cb| ctx.get_serving_cellinfos(slot, cb))?,
        Command::NeighbouringCells => {
            await_completion(wait, |cb| ctx.get_neighbouring_cellinfos(slot, cb))?
        }
        Command::Registration => await_completion(wait, |cb| ctx.get_registration_info(slot, cb))?,
        Command::CellRate { ms } => {
            await_completion(wait, |cb| ctx.set_cell_info_list_rate(slot, *ms, cb))?
        }
        Command::Status => return status(ctx, slot, wait),
        Command::Watch { seconds, rate_ms } => {
            return watch(ctx, slot, wait, Duration::from_secs(*seconds), *rate_ms)
        }
    };
    Ok(completion_json(&completion))
}

/// Submit one request and block until its callback runs.
fn await_completion<S>(wait: Duration, submit: S) -> anyhow::Result<Completion>
where
    S: FnOnce(CompletionFn) -> Result<EventId, NetworkError>,
{
    let (tx, rx) = bounded(1);
    let event_id = submit(Box::new(move |c: Completion| {
        let _ = tx.send(c);
    }))?;
    debug!(event_id, "waiting for completion");
    rx.recv_timeout(wait)
        .with_context(|| format!("no completion for event {event_id} within {wait:?}"))
}

/// The scanned entry for `id`, so manual selection carries its MCC/MNC.
fn find_operator(
    ctx: &NetworkContext,
    slot: SlotId,
    wait: Duration,
    id: &str,
) -> anyhow::Result<OperatorInfo> {
    let scan = await_completion(wait, |cb| ctx.scan(slot, cb))?;
    let found = match scan.result {
        Ok(NetworkEvent::Operators(ops)) => ops.into_iter().find(|op| op.id == id),
        _ => None,
    };
    Ok(found.unwrap_or_else(|| OperatorInfo {
        id: id.to_string(),
        ..Default::default()
    }))
}

fn status(ctx: &NetworkContext, slot: SlotId, wait: Duration) -> anyhow::Result<Value> {
    // Refresh the cached snapshot first
    let refresh = await_completion(wait, |cb| ctx.get_registration_info(slot, cb))?;
    Ok(json!({
        "slot": slot,
        "refresh_status": refresh.status(),
        "registered": ctx.is_voice_registered(slot).ok(),
        "roaming": ctx.is_voice_roaming(slot).ok(),
        "emergency_only": ctx.is_voice_emergency_only(slot).ok(),
        "network_type": ctx.get_voice_network_type(slot).ok(),
        "display_name": ctx.get_display_name(slot).ok(),
        "mcc": ctx.get_mcc(slot).ok(),
        "mnc": ctx.get_mnc(slot).ok(),
        "signal": ctx.get_signal_strength(slot).ok(),
    }))
}

fn watch(
    ctx: &NetworkContext,
    slot: SlotId,
    wait: Duration,
    duration: Duration,
    rate_ms: u32,
) -> anyhow::Result<Value> {
    let seen = Arc::new(AtomicUsize::new(0));
    let mut watch_ids = Vec::new();
    for kind in [
        MessageKind::RegistrationChanged,
        MessageKind::SignalStrengthChanged,
        MessageKind::CellInfoListChanged,
    ] {
        let seen = seen.clone();
        let id = ctx.register_watcher(slot, kind, move |n| {
            seen.fetch_add(1, Ordering::Relaxed);
            let line = json!({
                "slot": n.slot,
                "watch_id": n.watch_id,
                "kind": n.kind,
                "status": n.status(),
                "result": result_json(n.result),
            });
            println!("{line}");
        })?;
        watch_ids.push(id);
    }

    let rate = await_completion(wait, |cb| ctx.set_cell_info_list_rate(slot, rate_ms, cb))?;
    info!(slot, rate_ms, status = rate.status(), "watching indications");
    thread::sleep(duration);

    let _ = await_completion(wait, |cb| ctx.set_cell_info_list_rate(slot, 0, cb));
    for id in watch_ids {
        ctx.unregister_watcher(id)?;
    }
    Ok(json!({
        "slot": slot,
        "seconds": duration.as_secs(),
        "notifications": seen.load(Ordering::Relaxed),
    }))
}

fn completion_json(c: &Completion) -> Value {
    json!({
        "slot": c.slot,
        "event_id": c.event_id,
        "kind": c.kind,
        "status": c.status(),
        "elapsed_ms": c.elapsed.as_secs_f64() * 1000.0,
        "result": result_json(&c.result),
    })
}

fn result_json(result: &Result<NetworkEvent, NetworkError>) -> Value {
    match result {
        Ok(event) => serde_json::to_value(event).unwrap_or(Value::Null),
        Err(err) => json!({ "error": err.to_string(), "code": err.code() }),
    }
}
