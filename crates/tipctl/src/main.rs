use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use tipd_core::config;
use tipd_core::ipc::{self, ClientMsg, DaemonMsg};

#[derive(Parser)]
#[command(name = "tipctl", about = "Control the tipd tooltip daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show daemon status
    Status,
    /// Let hover and focus start tooltip sessions
    Enable,
    /// Stop hover and focus from starting tooltip sessions
    Disable,
    /// Toggle tooltips on/off
    Toggle,
    /// Dismiss the visible tooltip
    Dismiss,
    /// Print every state transition until interrupted
    Watch,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let socket_path = config::socket_path();
    let stream = UnixStream::connect(&socket_path)
        .with_context(|| format!("connecting to tipd at {}\nIs the daemon running?", socket_path.display()))?;

    let mut writer = stream.try_clone().context("cloning stream")?;
    let reader = BufReader::new(stream);

    let watching = matches!(cli.command, Command::Watch);
    let msg: ClientMsg = match cli.command {
        Command::Status => ClientMsg::GetStatus,
        Command::Enable => ClientMsg::Enable,
        Command::Disable => ClientMsg::Disable,
        Command::Toggle => ClientMsg::Toggle,
        Command::Dismiss => ClientMsg::Dismiss,
        Command::Watch => ClientMsg::Watch,
    };

    let line = ipc::encode(&msg);
    writer
        .write_all(line.as_bytes())
        .context("sending command")?;

    // Read response
    for line in reader.lines() {
        let line = line.context("reading response")?;
        let Some(resp) = ipc::decode_daemon(&line) else {
            continue;
        };
        match resp {
            DaemonMsg::Status {
                enabled,
                mode,
                active_id,
                instances,
                version,
            } => {
                println!("tipd v{}", version);
                println!("  enabled:   {}", enabled);
                println!("  mode:      {:?}", mode);
                match active_id {
                    Some(id) => println!("  active:    {}", id),
                    None => println!("  active:    -"),
                }
                println!("  instances: {}", instances);
            }
            DaemonMsg::Ack { ok, message } => {
                if !ok {
                    eprintln!("error: {}", message);
                    std::process::exit(1);
                }
                if !watching {
                    println!("{}", message);
                }
            }
            DaemonMsg::Transition { mode, active_id } => {
                match active_id {
                    Some(id) => println!("{:?} {}", mode, id),
                    None => println!("{:?}", mode),
                }
                continue;
            }
            _ => continue,
        }
        if !watching {
            break;
        }
    }

    Ok(())
}
