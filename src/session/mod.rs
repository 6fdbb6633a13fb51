//! Debug session: ties the daemon, the engine connection and the value decoder
//! to debugger commands (steps, breakpoints, variables).

pub mod files;
pub mod location;
pub mod variable;

use crate::connection::message::{
    AddBreakpointRequest, AddFilesRequest, CloseSessionNotification,
    ContinueProcessFileNotification, DebuggerErrorNotification, DeleteAllBreakpointsRequest,
    DeleteBreakpointRequest, GoRequest, Message, ParsingErrorNotification, ReadyNotification,
    Request, SessionStartedNotification, SetProtocolRequest, StartProcessFileNotification,
    StartRequest, StepIntoRequest, StepOutRequest, StepOverRequest, Tagged, Wire,
    BREAKPOINT_LIFETIME_ONCE, BREAKPOINT_LIFETIME_PERMANENT, BREAKPOINT_STATIC, STATUS_OK,
};
use crate::connection::{Connection, EngineMessageHandler};
use crate::daemon::Daemon;
use crate::error::Error;
use crate::expression::evaluator::StackFrame;
use crate::expression::{Expression, ExpressionEvaluator};
use crate::session::files::{local_file_content, LocalFiles, WorkspaceFiles};
use crate::session::location::{Location, LocationMapper};
use crate::session::variable::{SimpleValue, StackFrameDump, VariablePath, VariableStorage};
use crate::settings::Settings;
use crate::weak_error;
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, error, info, warn};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};

/// Most recent protocol version, engines with an older protocol are rejected.
pub const SUPPORTED_PROTOCOL_ID: i32 = 2012121702;

/// User breakpoint, `location` is in the local workspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Breakpoint {
    pub location: Location,
}

impl Breakpoint {
    pub fn new(location: Location) -> Self {
        Self { location }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DebuggerEvent {
    /// Script suspended at a local location.
    Suspend { location: Location },
    /// Breakpoint registered in the running engine.
    BreakpointActivated { breakpoint: Breakpoint },
    /// Script output.
    Output(String),
    /// Error reported by the engine, verbatim.
    EngineError {
        level: i32,
        message: String,
        location: Option<Location>,
    },
    /// Engine connection closed.
    Disconnected,
}

/// Receiver of debugger events. Called from the connection dispatch thread.
pub trait DebuggerCallback: Send + Sync {
    fn on_event(&self, event: DebuggerEvent);
}

impl<F> DebuggerCallback for F
where
    F: Fn(DebuggerEvent) + Send + Sync,
{
    fn on_event(&self, event: DebuggerEvent) {
        self(event)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebuggerInfo {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub version: String,
}

struct EngineBreakpoint {
    breakpoint: Breakpoint,
    remote: Location,
    /// Engine side id, set while the breakpoint is registered in a running script.
    engine_id: Option<i32>,
}

#[derive(Default)]
struct SessionState {
    /// Keyed by local location.
    breakpoints: IndexMap<Location, EngineBreakpoint>,
    start_file: Option<String>,
    /// Engine id of the one-shot breakpoint on the first script line.
    first_line_bp: Option<i32>,
}

struct SessionCore {
    settings: Settings,
    conn: Connection,
    evaluator: ExpressionEvaluator,
    callback: Arc<dyn DebuggerCallback>,
    locations: LocationMapper,
    files: Box<dyn LocalFiles>,
    state: Mutex<SessionState>,
    variables: Mutex<VariableStorage>,
}

fn check_status<R: Tagged, W: Wire>(response: &W) -> Result<(), Error> {
    match response.status() {
        Some(status) if status != STATUS_OK => Err(Error::Status {
            request: R::TYPE,
            status,
        }),
        _ => Ok(()),
    }
}

impl SessionCore {
    fn request<R: Request>(&self, request: R) -> Result<R::Response, Error> {
        let response = self.conn.send_request(request)?;
        check_status::<R, _>(&response)?;
        Ok(response)
    }

    fn close_session(&self) {
        weak_error!(
            self.conn.send_notification(CloseSessionNotification),
            "close session:"
        );
    }

    fn set_protocol(&self) -> Result<(), Error> {
        let response = self.request(SetProtocolRequest::new(SUPPORTED_PROTOCOL_ID))?;
        if response.protocol_id < SUPPORTED_PROTOCOL_ID {
            return Err(Error::ProtocolMismatch {
                engine: response.protocol_id,
                client: SUPPORTED_PROTOCOL_ID,
            });
        }
        Ok(())
    }

    /// Register a breakpoint in the running engine and notify about activation.
    fn register_breakpoint(&self, key: &Location, remote: &Location) -> Result<(), Error> {
        let response = self.request(AddBreakpointRequest::new(
            BREAKPOINT_STATIC,
            BREAKPOINT_LIFETIME_PERMANENT,
            remote.line,
            remote.target.clone(),
        ))?;

        let activated = {
            let mut state = self.state.lock().unwrap();
            state.breakpoints.get_mut(key).map(|bp| {
                bp.engine_id = Some(response.breakpoint_id);
                bp.breakpoint.clone()
            })
        };
        if let Some(breakpoint) = activated {
            debug!(target: "session", "breakpoint {remote} activated, engine id {}", response.breakpoint_id);
            self.callback
                .on_event(DebuggerEvent::BreakpointActivated { breakpoint });
        }
        Ok(())
    }

    fn session_started(&self, notification: SessionStartedNotification) {
        info!(
            target: "session",
            "debug session started: {} ({}), engine protocol {}",
            notification.file_name, notification.uri, notification.protocol_id
        );

        if let Err(e) = self.set_protocol() {
            error!(target: "session", "abort session: {e}");
            self.close_session();
            self.conn.disconnect();
            return;
        }

        let start_file = notification.file_name;
        let first_line_bp = if self.settings.break_at_first_line {
            let request = AddBreakpointRequest::new(
                BREAKPOINT_STATIC,
                BREAKPOINT_LIFETIME_ONCE,
                -1,
                start_file.clone(),
            );
            weak_error!(self.request(request), "first line breakpoint:").map(|r| r.breakpoint_id)
        } else {
            None
        };

        let files = {
            let mut state = self.state.lock().unwrap();
            state.start_file = Some(start_file);
            state.first_line_bp = first_line_bp;
            state
                .breakpoints
                .values()
                .map(|bp| bp.remote.target.clone())
                .unique()
                .collect::<Vec<_>>()
        };

        weak_error!(self.request(AddFilesRequest::new(files)), "add files:");
        weak_error!(self.request(StartRequest::new()), "start:");
    }

    fn start_process_file(&self, notification: StartProcessFileNotification) {
        let file_breakpoints = {
            let state = self.state.lock().unwrap();
            state
                .breakpoints
                .iter()
                .filter(|(_, bp)| bp.remote.target == notification.file_name)
                .map(|(key, bp)| (key.clone(), bp.remote.clone()))
                .collect::<Vec<_>>()
        };

        for (key, remote) in file_breakpoints {
            weak_error!(self.register_breakpoint(&key, &remote), "add breakpoint:");
        }
        weak_error!(
            self.conn.send_notification(ContinueProcessFileNotification),
            "continue process file:"
        );
    }

    fn ready(&self, notification: ReadyNotification) {
        let remote = Location::new(notification.file_name, notification.line);

        let first_line_bp = {
            let mut state = self.state.lock().unwrap();
            if state.start_file.as_deref() == Some(remote.target.as_str()) {
                state.first_line_bp.take()
            } else {
                None
            }
        };
        if let Some(id) = first_line_bp {
            weak_error!(self.request(DeleteBreakpointRequest::new(id)), "delete first line breakpoint:");
        }

        self.variables.lock().unwrap().clear();
        let location = self.locations.to_local(&remote);
        debug!(target: "session", "suspended at {remote}");
        self.callback.on_event(DebuggerEvent::Suspend { location });
    }

    fn engine_error(&self, notification: DebuggerErrorNotification) {
        warn!(target: "session", "engine error ({}): {}", notification.level, notification.message);
        self.callback.on_event(DebuggerEvent::EngineError {
            level: notification.level,
            message: notification.message,
            location: None,
        });
    }

    fn parsing_error(&self, notification: ParsingErrorNotification) {
        let location = self
            .locations
            .to_local(&Location::new(notification.file_name, notification.line));
        warn!(target: "session", "parsing error at {location}: {}", notification.message);
        self.callback.on_event(DebuggerEvent::EngineError {
            level: notification.level,
            message: notification.message,
            location: Some(location),
        });
    }
}

impl EngineMessageHandler for SessionCore {
    fn handle_notification(&self, _: &Connection, msg: Message) {
        match msg {
            Message::SessionStartedNotification(n) => self.session_started(n),
            Message::StartProcessFileNotification(n) => self.start_process_file(n),
            Message::ReadyNotification(n) => self.ready(n),
            Message::ScriptEndedNotification(n) => {
                info!(target: "session", "script ended with status {}", n.status);
                self.close_session();
            }
            Message::OutputNotification(n) => self.callback.on_event(DebuggerEvent::Output(n.output)),
            Message::HeaderOutputNotification(n) => {
                debug!(target: "session", "header output: {}", n.output)
            }
            Message::DebuggerErrorNotification(n) => self.engine_error(n),
            Message::ParsingErrorNotification(n) => self.parsing_error(n),
            Message::IniAlteredNotification(n) => {
                debug!(target: "session", "ini {} altered: {} -> {}", n.name, n.old_value, n.new_value)
            }
            other => debug!(target: "session", "ignore notification {}", other.message_type()),
        }
    }

    fn handle_request(&self, _: &Connection, msg: Message) -> Option<Message> {
        match msg {
            Message::GetLocalFileContentRequest(request) => {
                let local = self.locations.local_path(&request.file_name);
                Some(local_file_content(self.files.as_ref(), &request, &local).into())
            }
            other => {
                warn!(target: "session", "unsupported engine request {}", other.message_type());
                None
            }
        }
    }

    fn connection_closed(&self, _: &Connection) {
        {
            let mut state = self.state.lock().unwrap();
            state.start_file = None;
            state.first_line_bp = None;
            state
                .breakpoints
                .values_mut()
                .for_each(|bp| bp.engine_id = None);
        }
        self.variables.lock().unwrap().clear();
        info!(target: "session", "debug session closed");
        self.callback.on_event(DebuggerEvent::Disconnected);
    }
}

/// Debugger client for a Zend debug engine.
pub struct Session {
    core: Arc<SessionCore>,
    daemon: Daemon,
}

impl Session {
    pub fn new(settings: Settings, callback: Arc<dyn DebuggerCallback>) -> Result<Self, Error> {
        let files = WorkspaceFiles::new(settings.local_root.clone());
        Self::with_files(settings, callback, Box::new(files))
    }

    /// Create a session which answers engine file requests from `files`.
    pub fn with_files(
        settings: Settings,
        callback: Arc<dyn DebuggerCallback>,
        files: Box<dyn LocalFiles>,
    ) -> Result<Self, Error> {
        let conn = Connection::new(settings.connection_options()?);
        let core = Arc::new(SessionCore {
            evaluator: ExpressionEvaluator::new(conn.clone()),
            locations: LocationMapper::new(&settings.path_mappings),
            conn,
            callback,
            files,
            state: Mutex::new(SessionState::default()),
            variables: Mutex::new(VariableStorage::default()),
            settings,
        });

        let acceptor = Arc::new({
            let core = core.clone();
            move |stream: TcpStream| {
                let handler: Arc<dyn EngineMessageHandler> = core.clone();
                if let Err(e) = core.conn.attach(stream, handler) {
                    warn!(target: "session", "reject engine connection: {e}");
                }
            }
        });
        let daemon = Daemon::new(&core.settings, acceptor);

        Ok(Self { core, daemon })
    }

    /// Register initial breakpoints and start waiting for engine connections.
    pub fn start(&self, breakpoints: Vec<Breakpoint>) -> Result<SocketAddr, Error> {
        {
            let mut state = self.core.state.lock().unwrap();
            for breakpoint in breakpoints {
                let remote = self.core.locations.to_remote(&breakpoint.location);
                state.breakpoints.insert(
                    breakpoint.location.clone(),
                    EngineBreakpoint {
                        breakpoint,
                        remote,
                        engine_id: None,
                    },
                );
            }
        }
        self.daemon.start_listen()
    }

    /// Stop listening and close the engine connection.
    pub fn disconnect(&self) {
        self.daemon.stop_listen();
        if self.core.conn.is_connected() {
            self.core.close_session();
        }
        self.core.conn.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.core.conn.is_connected()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.daemon.local_addr()
    }

    pub fn info(&self) -> DebuggerInfo {
        DebuggerInfo {
            host: self.core.settings.client_host_ip.clone(),
            port: self.core.settings.debug_port,
            name: "Zend Debugger".to_string(),
            version: String::new(),
        }
    }

    pub fn add_breakpoint(&self, breakpoint: Breakpoint) -> Result<(), Error> {
        let key = breakpoint.location.clone();
        let remote = self.core.locations.to_remote(&key);
        self.core.state.lock().unwrap().breakpoints.insert(
            key.clone(),
            EngineBreakpoint {
                breakpoint,
                remote: remote.clone(),
                engine_id: None,
            },
        );

        if self.core.conn.is_connected() {
            self.core.register_breakpoint(&key, &remote)?;
        }
        Ok(())
    }

    /// Remove a breakpoint, unregister it in the engine if it was registered.
    pub fn delete_breakpoint(&self, location: &Location) -> Result<(), Error> {
        let removed = self.core.state.lock().unwrap().breakpoints.shift_remove(location);
        if let Some(engine_id) = removed.and_then(|bp| bp.engine_id) {
            self.core.request(DeleteBreakpointRequest::new(engine_id))?;
        }
        Ok(())
    }

    pub fn delete_all_breakpoints(&self) -> Result<(), Error> {
        self.core.state.lock().unwrap().breakpoints.clear();
        if self.core.conn.is_connected() {
            self.core.request(DeleteAllBreakpointsRequest::new())?;
        }
        Ok(())
    }

    pub fn all_breakpoints(&self) -> Vec<Breakpoint> {
        self.core
            .state
            .lock()
            .unwrap()
            .breakpoints
            .values()
            .map(|bp| bp.breakpoint.clone())
            .collect()
    }

    pub fn step_over(&self) -> Result<(), Error> {
        self.core.request(StepOverRequest::new()).map(|_| ())
    }

    pub fn step_into(&self) -> Result<(), Error> {
        self.core.request(StepIntoRequest::new()).map(|_| ())
    }

    pub fn step_out(&self) -> Result<(), Error> {
        self.core.request(StepOutRequest::new()).map(|_| ())
    }

    pub fn resume(&self) -> Result<(), Error> {
        self.core.request(GoRequest::new()).map(|_| ())
    }

    /// Fetch variables of the current scope. Cached until the next suspend.
    pub fn dump_stack_frame(&self) -> Result<StackFrameDump, Error> {
        let scope = self.core.evaluator.value(&Expression::variables(), 1)?;
        let storage = VariableStorage::from_scope(scope);
        let dump = StackFrameDump {
            fields: vec![],
            variables: storage.variables().to_vec(),
        };
        *self.core.variables.lock().unwrap() = storage;
        Ok(dump)
    }

    /// Value of a variable from the last stack frame dump, members are fetched on demand.
    pub fn get_value(&self, path: &VariablePath) -> Result<SimpleValue, Error> {
        let mut variables = self.core.variables.lock().unwrap();
        let var = variables
            .find_mut(path)
            .ok_or_else(|| Error::VariableNotFound(path.to_string()))?;
        var.make_complete(&self.core.evaluator)?;
        Ok(var.simple_value())
    }

    /// Assign `value` (PHP code) to a variable from the last stack frame dump.
    pub fn set_value(&self, path: &VariablePath, value: &str) -> Result<(), Error> {
        let mut variables = self.core.variables.lock().unwrap();
        let var = variables
            .find_mut(path)
            .ok_or_else(|| Error::VariableNotFound(path.to_string()))?;
        var.assign(&self.core.evaluator, value)
    }

    pub fn evaluate(&self, code: &str) -> Result<String, Error> {
        self.core.evaluator.eval(code)
    }

    /// Call stack of the suspended script, locations are converted to the local workspace.
    pub fn call_stack(&self) -> Result<Vec<StackFrame>, Error> {
        let frames = self.core.evaluator.call_stack()?;
        Ok(frames
            .into_iter()
            .map(|mut frame| {
                frame.file = self.core.locations.local_path(&frame.file);
                frame
            })
            .collect())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.daemon.stop_listen();
        self.core.conn.disconnect();
    }
}
