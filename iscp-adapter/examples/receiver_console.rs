//! Receiver Console - watch and control one receiver from the terminal
//!
//! Connects an adapter to the receiver at the given address, prints every
//! event it reports and applies a few writes read from stdin:
//!
//! ```text
//! power on | power off | mute on | mute off | volume 35 | input HDMI 1 | probe
//! ```
//!
//! Run with: cargo run -p iscp-sdk-adapter --example receiver_console -- 192.168.1.20 [port]
//!
//! Set `ISCP_LOG_MODE=debug` for adapter logs.

use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use iscp_adapter::{
    AdapterEvent, ChannelWrite, DeviceDescriptor, ReceiverAdapter, PROBE_CURRENT_INPUT_ACTION,
};
use iscp_state::logging::init_logging_from_env;
use iscp_state::resolve_device_id;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    let mut args = std::env::args().skip(1);
    let Some(ip) = args.next() else {
        eprintln!("usage: receiver_console <ip> [port]");
        return Ok(());
    };
    let mut descriptor = DeviceDescriptor::new(ip);
    if let Some(port) = args.next() {
        descriptor = descriptor.with_port(port.parse()?);
    }
    let device_id = resolve_device_id(&descriptor);

    println!("=== Receiver Console ({}) ===\n", device_id);

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let adapter = ReceiverAdapter::builder(descriptor).start(events_tx)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_cmd_id = 1u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let cmd_id = next_cmd_id;
                next_cmd_id += 1;

                let line = line.trim();
                if line == "probe" {
                    adapter.invoke_action(PROBE_CURRENT_INPUT_ACTION, Map::new(), cmd_id)?;
                    continue;
                }
                match parse_write(line) {
                    Some((channel, value)) => {
                        adapter.write_channel(ChannelWrite::new(&device_id, channel, value, cmd_id))?;
                    }
                    None => println!("?? {}", line),
                }
            }
        }
    }

    println!("\nStopping...");
    adapter.stop().await?;
    Ok(())
}

fn parse_write(line: &str) -> Option<(&str, Value)> {
    let (channel, argument) = line.split_once(' ')?;
    let argument = argument.trim();
    let value = match channel {
        "power" | "mute" => Value::Bool(argument == "on"),
        "volume" => Value::from(argument.parse::<f64>().ok()?),
        "input" => Value::String(argument.to_string()),
        _ => return None,
    };
    Some((channel, value))
}

fn print_event(event: &AdapterEvent) {
    match event {
        AdapterEvent::DeviceUpdated(info) => {
            println!("device   {} ({} {})", info.name, info.manufacturer, info.model);
            for channel in &info.channels {
                println!("  channel {:<12} writable={}", channel.id, channel.writable);
            }
        }
        AdapterEvent::ChannelState(state) => {
            println!("state    {:<12} {}", state.channel, state.value.to_json());
        }
        AdapterEvent::ConnectionStateChanged(connected) => {
            println!("link     {}", if *connected { "up" } else { "down" });
        }
        AdapterEvent::CommandResult(response) => {
            println!(
                "result   #{} {:?} {}",
                response.cmd_id,
                response.status,
                response.error.as_deref().unwrap_or("")
            );
        }
        AdapterEvent::ActionResult(response) => {
            println!(
                "action   #{} {} {:?} {}",
                response.cmd_id,
                response.action_id,
                response.status,
                response.result.clone().unwrap_or(Value::Null)
            );
        }
        AdapterEvent::MetaPatch { patch, .. } => {
            println!("metadata {}", Value::Object(patch.clone()));
        }
        AdapterEvent::ChannelUpdated { channel, .. } => {
            println!("channel  {} updated", channel.id);
        }
        AdapterEvent::FullSyncCompleted { .. } => println!("synced"),
    }
}
