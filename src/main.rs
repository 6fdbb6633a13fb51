use anyhow::{anyhow, Context};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use zendbg::daemon::AcceptMode;
use zendbg::session::location::Location;
use zendbg::session::{Breakpoint, DebuggerEvent, Session};
use zendbg::settings::{PathMapping, Settings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (default: ~/.config/zdb/config.toml)
    #[clap(short, long, env = "ZDB_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to listen on for engine connections
    #[clap(long)]
    host: Option<String>,

    /// Debug port
    #[clap(short, long)]
    port: Option<u16>,

    /// Don't suspend the script on its first line
    #[clap(long)]
    no_break_at_first_line: bool,

    /// Text encoding of the engine (UTF-8 or ISO-8859-1)
    #[clap(long)]
    encoding: Option<String>,

    /// Accept a single engine connection or keep accepting them
    #[clap(long, value_enum)]
    accept: Option<AcceptMode>,

    /// Workspace root for engine file requests
    #[clap(long)]
    local_root: Option<PathBuf>,

    /// Path mapping in form `remote=local`, may be repeated
    #[clap(short, long = "map")]
    mappings: Vec<String>,

    /// Breakpoint in form `file:line`, may be repeated
    #[clap(short, long = "break")]
    breakpoints: Vec<String>,

    /// Step over after each suspend instead of resuming, printing every visited line
    #[clap(long)]
    trace: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) -> anyhow::Result<()> {
        if let Some(host) = &self.host {
            settings.client_host_ip = host.clone();
        }
        if let Some(port) = self.port {
            settings.debug_port = port;
        }
        if self.no_break_at_first_line {
            settings.break_at_first_line = false;
        }
        if let Some(encoding) = &self.encoding {
            settings.transfer_encoding = encoding.clone();
        }
        if let Some(mode) = self.accept {
            settings.accept_mode = mode;
        }
        if let Some(root) = &self.local_root {
            settings.local_root = Some(root.clone());
        }
        for mapping in &self.mappings {
            let (remote, local) = mapping
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid path mapping `{mapping}`, expect `remote=local`"))?;
            settings.path_mappings.push(PathMapping {
                remote: remote.to_string(),
                local: local.to_string(),
            });
        }
        Ok(())
    }

    fn breakpoints(&self) -> anyhow::Result<Vec<Breakpoint>> {
        self.breakpoints
            .iter()
            .map(|bp| {
                let (file, line) = bp
                    .rsplit_once(':')
                    .ok_or_else(|| anyhow!("invalid breakpoint `{bp}`, expect `file:line`"))?;
                let line = line
                    .parse()
                    .with_context(|| format!("invalid breakpoint line `{line}`"))?;
                Ok(Breakpoint::new(Location::new(file, line)))
            })
            .collect()
    }
}

enum Event {
    Debugger(DebuggerEvent),
    Interrupt,
}

fn print_frame(session: &Session) {
    let Some(dump) = zendbg::weak_error!(session.dump_stack_frame(), "dump variables:") else {
        return;
    };
    for var in &dump.variables {
        let value = var.simple_value();
        println!("  {} ({}) = {}", var.name, var.type_name(), value.value);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = Settings::from_file(args.config.as_deref()).context("load settings")?;
    args.apply(&mut settings)?;
    let single = settings.accept_mode == AcceptMode::Single;

    let (tx, events) = mpsc::channel();
    let callback_tx = Mutex::new(tx.clone());
    let session = Session::new(
        settings,
        Arc::new(move |event: DebuggerEvent| {
            _ = callback_tx.lock().unwrap().send(Event::Debugger(event));
        }),
    )?;
    ctrlc::set_handler(move || {
        _ = tx.send(Event::Interrupt);
    })?;

    let addr = session
        .start(args.breakpoints()?)
        .context("start listening for engine connections")?;
    info!(target: "zdb", "waiting for engine connections on {addr}");

    for event in events {
        match event {
            Event::Debugger(DebuggerEvent::Suspend { location }) => {
                println!("suspended at {location}");
                print_frame(&session);
                let resumed = if args.trace {
                    session.step_over()
                } else {
                    session.resume()
                };
                if let Err(e) = resumed {
                    warn!(target: "zdb", "continue execution: {e}");
                }
            }
            Event::Debugger(DebuggerEvent::BreakpointActivated { breakpoint }) => {
                info!(target: "zdb", "breakpoint activated at {}", breakpoint.location);
            }
            Event::Debugger(DebuggerEvent::Output(output)) => print!("{output}"),
            Event::Debugger(DebuggerEvent::EngineError {
                level,
                message,
                location,
            }) => match location {
                Some(location) => error!(target: "zdb", "[{level}] {location}: {message}"),
                None => error!(target: "zdb", "[{level}] {message}"),
            },
            Event::Debugger(DebuggerEvent::Disconnected) => {
                info!(target: "zdb", "engine disconnected");
                if single {
                    break;
                }
            }
            Event::Interrupt => {
                info!(target: "zdb", "interrupted");
                break;
            }
        }
    }

    session.disconnect();
    Ok(())
}
