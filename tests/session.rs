mod fake_engine;

use crate::fake_engine::{wait_until, FakeEngine};
use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use zendbg::connection::message::{
    AddBreakpointRequest, AddBreakpointResponse, AddFilesRequest, AddFilesResponse,
    AssignValueRequest, AssignValueResponse, CloseSessionNotification,
    ContinueProcessFileNotification, DeleteBreakpointRequest, DeleteBreakpointResponse,
    EvalRequest, EvalResponse, GetCallStackRequest, GetCallStackResponse,
    GetLocalFileContentRequest, GetLocalFileContentResponse, GetVariableValueRequest,
    GetVariableValueResponse, OutputNotification, ParsingErrorNotification, ReadyNotification,
    ScriptEndedNotification, SessionStartedNotification, SetProtocolRequest, SetProtocolResponse,
    StackLayer, StackParam, StartProcessFileNotification, StartRequest, StartResponse,
    StepOverRequest, StepOverResponse, BREAKPOINT_LIFETIME_ONCE, BREAKPOINT_LIFETIME_PERMANENT,
};
use zendbg::expression::ExpressionValue;
use zendbg::session::files::{adler32, LocalFiles};
use zendbg::session::location::Location;
use zendbg::session::variable::VariablePath;
use zendbg::session::{Breakpoint, DebuggerEvent, Session, SUPPORTED_PROTOCOL_ID};
use zendbg::settings::{PathMapping, Settings};
use zendbg::Error;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const START_FILE: &str = "/var/www/index.php";
const LOCAL_START_FILE: &str = "/home/dev/site/index.php";
const FIRST_LINE_BP: i32 = 100;
const INDEX_CONTENT: &[u8] = b"<?php\necho 'hello';\n";

struct MemFiles(HashMap<&'static str, &'static [u8]>);

impl LocalFiles for MemFiles {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.0
            .get(path)
            .map(|c| c.to_vec())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

fn settings(break_at_first_line: bool) -> Settings {
    Settings {
        debug_port: 0,
        break_at_first_line,
        request_timeout_ms: Some(5000),
        stop_timeout_ms: 1000,
        path_mappings: vec![PathMapping {
            remote: "/var/www".to_string(),
            local: "/home/dev/site".to_string(),
        }],
        ..Settings::default()
    }
}

struct TestSession {
    session: Session,
    events: Receiver<DebuggerEvent>,
    engine: FakeEngine,
}

impl TestSession {
    fn start(settings: Settings, breakpoints: Vec<Breakpoint>) -> anyhow::Result<Self> {
        let (tx, events) = channel();
        let tx = Mutex::new(tx);
        let files = MemFiles(HashMap::from([(LOCAL_START_FILE, INDEX_CONTENT)]));
        let session = Session::with_files(
            settings,
            Arc::new(move |event: DebuggerEvent| {
                _ = tx.lock().unwrap().send(event);
            }),
            Box::new(files),
        )?;
        let addr = session.start(breakpoints)?;
        let engine = FakeEngine::connect(addr)?;
        Ok(Self {
            session,
            events,
            engine,
        })
    }

    fn next_event(&self) -> DebuggerEvent {
        self.events.recv_timeout(EVENT_TIMEOUT).unwrap()
    }

    /// Session start as the engine performs it: protocol negotiation, optional first line
    /// breakpoint, file list and start.
    fn handshake(&mut self, first_line: bool, files: &[&str]) -> anyhow::Result<()> {
        let engine = &mut self.engine;
        engine.send(SessionStartedNotification::new(
            START_FILE,
            "http://localhost/index.php",
            "x=1",
            "",
            SUPPORTED_PROTOCOL_ID,
        ))?;

        let request = engine.expect::<SetProtocolRequest>()?;
        assert_eq!(request.protocol_id, SUPPORTED_PROTOCOL_ID);
        // nothing is sent until the protocol is confirmed
        assert!(engine.is_idle(Duration::from_millis(200))?);
        engine.send(SetProtocolResponse::new(request.id, SUPPORTED_PROTOCOL_ID))?;

        if first_line {
            let request = engine.expect::<AddBreakpointRequest>()?;
            assert_eq!(request.file_name, START_FILE);
            assert_eq!(request.line, -1);
            assert_eq!(request.lifetime, BREAKPOINT_LIFETIME_ONCE);
            engine.send(AddBreakpointResponse::new(request.id, 0, FIRST_LINE_BP))?;
        }

        let request = engine.expect::<AddFilesRequest>()?;
        assert_eq!(request.paths, files);
        engine.send(AddFilesResponse::new(request.id, 0))?;

        let request = engine.expect::<StartRequest>()?;
        engine.send(StartResponse::new(request.id, 0))?;
        Ok(())
    }

    /// Run a session command on a separate thread while the engine side is played here.
    fn call<T: Send>(
        &mut self,
        command: impl FnOnce(&Session) -> Result<T, Error> + Send,
        engine_side: impl FnOnce(&mut FakeEngine) -> anyhow::Result<()>,
    ) -> anyhow::Result<T> {
        let session = &self.session;
        let engine = &mut self.engine;
        thread::scope(|s| {
            let caller = s.spawn(move || command(session));
            engine_side(engine)?;
            Ok(caller.join().unwrap()?)
        })
    }
}

#[test]
fn test_session_start() -> anyhow::Result<()> {
    let mut ts = TestSession::start(settings(false), vec![])?;
    ts.handshake(false, &[])?;
    assert!(ts.session.is_connected());

    ts.session.disconnect();
    assert!(ts.engine.expect::<CloseSessionNotification>().is_ok());
    assert_eq!(ts.next_event(), DebuggerEvent::Disconnected);
    Ok(())
}

#[test]
fn test_protocol_mismatch() -> anyhow::Result<()> {
    let mut ts = TestSession::start(settings(true), vec![])?;
    ts.engine.send(SessionStartedNotification::new(
        START_FILE,
        "http://localhost/index.php",
        "",
        "",
        2006010901,
    ))?;

    let request = ts.engine.expect::<SetProtocolRequest>()?;
    ts.engine.send(SetProtocolResponse::new(request.id, 2006010901))?;

    ts.engine.expect::<CloseSessionNotification>()?;
    assert!(ts.engine.is_closed());
    assert!(wait_until(EVENT_TIMEOUT, || !ts.session.is_connected()));

    // an engine with a supported protocol connects right away
    let addr = ts.session.local_addr().unwrap();
    ts.engine = FakeEngine::connect(addr)?;
    ts.handshake(true, &[])?;
    ts.engine.send(OutputNotification::new("after"))?;

    // rejected session is finished before the next one reports anything
    assert_eq!(ts.next_event(), DebuggerEvent::Disconnected);
    assert_eq!(ts.next_event(), DebuggerEvent::Output("after".into()));
    assert!(ts.session.is_connected());
    Ok(())
}

#[test]
fn test_breakpoints_and_steps() -> anyhow::Result<()> {
    let local = Location::new(LOCAL_START_FILE, 5);
    let mut ts = TestSession::start(settings(true), vec![Breakpoint::new(local.clone())])?;
    ts.handshake(true, &[START_FILE])?;

    // breakpoints of a file are registered when the engine starts to process it
    ts.engine.send(StartProcessFileNotification::new(START_FILE))?;
    let request = ts.engine.expect::<AddBreakpointRequest>()?;
    assert_eq!(request.file_name, START_FILE);
    assert_eq!(request.line, 5);
    assert_eq!(request.lifetime, BREAKPOINT_LIFETIME_PERMANENT);
    ts.engine.send(AddBreakpointResponse::new(request.id, 0, 7))?;
    ts.engine.expect::<ContinueProcessFileNotification>()?;
    assert_eq!(
        ts.next_event(),
        DebuggerEvent::BreakpointActivated {
            breakpoint: Breakpoint::new(local.clone())
        }
    );

    // suspend on the first line removes the one-shot breakpoint
    ts.engine.send(ReadyNotification::new(START_FILE, 1))?;
    let request = ts.engine.expect::<DeleteBreakpointRequest>()?;
    assert_eq!(request.breakpoint_id, FIRST_LINE_BP);
    ts.engine.send(DeleteBreakpointResponse::new(request.id, 0))?;
    assert_eq!(
        ts.next_event(),
        DebuggerEvent::Suspend {
            location: Location::new(LOCAL_START_FILE, 1)
        }
    );

    ts.call(
        |s| s.step_over(),
        |engine| {
            let request = engine.expect::<StepOverRequest>()?;
            engine.send(StepOverResponse::new(request.id, 0))
        },
    )?;
    ts.engine.send(ReadyNotification::new(START_FILE, 5))?;
    assert_eq!(
        ts.next_event(),
        DebuggerEvent::Suspend {
            location: Location::new(LOCAL_START_FILE, 5)
        }
    );

    let err = ts
        .call(
            |s| s.step_over(),
            |engine| {
                let request = engine.expect::<StepOverRequest>()?;
                engine.send(StepOverResponse::new(request.id, -1))
            },
        )
        .unwrap_err();
    assert!(err.to_string().contains("status -1"), "{err}");

    ts.call(
        move |s| s.delete_breakpoint(&local),
        |engine| {
            let request = engine.expect::<DeleteBreakpointRequest>()?;
            assert_eq!(request.breakpoint_id, 7);
            engine.send(DeleteBreakpointResponse::new(request.id, 0))
        },
    )?;
    assert!(ts.session.all_breakpoints().is_empty());
    Ok(())
}

#[test]
fn test_variables() -> anyhow::Result<()> {
    let mut ts = TestSession::start(settings(false), vec![])?;
    ts.handshake(false, &[])?;
    ts.engine.send(ReadyNotification::new(START_FILE, 3))?;
    assert!(matches!(ts.next_event(), DebuggerEvent::Suspend { .. }));

    let dump = ts.call(
        |s| s.dump_stack_frame(),
        |engine| {
            let request = engine.expect::<GetVariableValueRequest>()?;
            assert_eq!(request.var, "get_defined_vars()");
            assert_eq!(request.depth, 1);
            assert!(request.path.is_empty());
            let scope = br#"a:2:{s:1:"a";i:5;s:1:"b";a:2:{}}"#;
            engine.send(GetVariableValueResponse::new(request.id, 0, Bytes::from_static(scope)))
        },
    )?;
    let names: Vec<_> = dump.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["$a", "$b"]);

    // members of `$b` were cut by the depth limit and are fetched on demand
    let value = ts.call(
        |s| s.get_value(&VariablePath::new(["1"])),
        |engine| {
            let request = engine.expect::<GetVariableValueRequest>()?;
            assert_eq!(request.var, "$b");
            assert!(request.path.is_empty());
            let raw = br#"a:2:{i:0;s:1:"x";i:1;i:2;}"#;
            engine.send(GetVariableValueResponse::new(request.id, 0, Bytes::from_static(raw)))
        },
    )?;
    assert_eq!(value.value, "array [2]");
    assert_eq!(value.variables.len(), 2);
    assert_eq!(value.variables[0].expression.text(), "$b[0]");

    ts.call(
        |s| s.set_value(&VariablePath::new(["0"]), "42"),
        |engine| {
            let request = engine.expect::<AssignValueRequest>()?;
            assert_eq!(request.var, "$a");
            assert_eq!(request.value, "42");
            engine.send(AssignValueResponse::new(request.id, 0))?;
            let request = engine.expect::<GetVariableValueRequest>()?;
            assert_eq!(request.var, "$a");
            engine.send(GetVariableValueResponse::new(request.id, 0, Bytes::from_static(b"i:42;")))
        },
    )?;
    // complete values are served from the cache
    assert_eq!(ts.session.get_value(&VariablePath::new(["0"]))?.value, "42");
    assert!(matches!(
        ts.session.get_value(&VariablePath::new(["9"])),
        Err(Error::VariableNotFound(_))
    ));

    let result = ts.call(
        |s| s.evaluate("1+1"),
        |engine| {
            let request = engine.expect::<EvalRequest>()?;
            assert_eq!(request.command, "1+1");
            engine.send(EvalResponse::new(request.id, 0, "2"))
        },
    )?;
    assert_eq!(result, "2");

    let frames = ts.call(
        |s| s.call_stack(),
        |engine| {
            let request = engine.expect::<GetCallStackRequest>()?;
            let layer = StackLayer {
                called_file: "/var/www/lib.php".to_string(),
                called_line: 10,
                called_function: "foo".to_string(),
                caller_file: START_FILE.to_string(),
                caller_line: 3,
                caller_function: "main".to_string(),
                params: vec![StackParam {
                    name: "$x".to_string(),
                    value: Bytes::from_static(b"i:1;"),
                }],
            };
            engine.send(GetCallStackResponse::new(request.id, vec![layer]))
        },
    )?;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].file, "/home/dev/site/lib.php");
    assert_eq!(frames[0].function, "foo");
    assert_eq!(
        frames[0].params,
        vec![("$x".to_string(), ExpressionValue::Int("1".to_string()))]
    );

    // variables are dropped on the next suspend
    ts.engine.send(ReadyNotification::new(START_FILE, 4))?;
    assert!(matches!(ts.next_event(), DebuggerEvent::Suspend { .. }));
    assert!(matches!(
        ts.session.get_value(&VariablePath::new(["0"])),
        Err(Error::VariableNotFound(_))
    ));
    Ok(())
}

#[test]
fn test_local_file_content() -> anyhow::Result<()> {
    struct TestCase {
        file: &'static str,
        size: i32,
        checksum: i32,
        status: i32,
        content: &'static [u8],
    }
    let test_cases = [
        TestCase {
            file: START_FILE,
            size: 0,
            checksum: 0,
            status: GetLocalFileContentResponse::STATUS_SUCCESS,
            content: INDEX_CONTENT,
        },
        TestCase {
            file: START_FILE,
            size: INDEX_CONTENT.len() as i32,
            checksum: adler32(INDEX_CONTENT) as i32,
            status: GetLocalFileContentResponse::STATUS_FILES_IDENTICAL,
            content: b"",
        },
        TestCase {
            file: "/var/www/missing.php",
            size: 0,
            checksum: 0,
            status: GetLocalFileContentResponse::STATUS_FAILURE,
            content: b"",
        },
    ];

    let mut ts = TestSession::start(settings(false), vec![])?;
    ts.handshake(false, &[])?;
    for (i, tc) in test_cases.iter().enumerate() {
        let mut request = GetLocalFileContentRequest::new(tc.file, tc.size, tc.checksum);
        request.id = i as i32 + 1;
        ts.engine.send(request)?;

        let response = ts.engine.expect::<GetLocalFileContentResponse>()?;
        assert_eq!(response.id, i as i32 + 1);
        assert_eq!(response.status, tc.status, "{}", tc.file);
        assert_eq!(&response.content[..], tc.content, "{}", tc.file);
    }
    Ok(())
}

#[test]
fn test_output_and_errors() -> anyhow::Result<()> {
    let mut ts = TestSession::start(settings(false), vec![])?;
    ts.handshake(false, &[])?;

    ts.engine.send(OutputNotification::new("hello"))?;
    ts.engine.send(ParsingErrorNotification::new(
        4,
        "/var/www/broken.php",
        3,
        "syntax error, unexpected '}'",
    ))?;
    assert_eq!(ts.next_event(), DebuggerEvent::Output("hello".to_string()));
    assert_eq!(
        ts.next_event(),
        DebuggerEvent::EngineError {
            level: 4,
            message: "syntax error, unexpected '}'".to_string(),
            location: Some(Location::new("/home/dev/site/broken.php", 3)),
        }
    );

    // script end closes the session, the engine closes the socket
    ts.engine.send(ScriptEndedNotification { status: 0 })?;
    ts.engine.expect::<CloseSessionNotification>()?;
    drop(ts.engine);
    assert_eq!(
        ts.events.recv_timeout(EVENT_TIMEOUT)?,
        DebuggerEvent::Disconnected
    );
    assert!(!ts.session.is_connected());
    Ok(())
}

#[test]
fn test_repeat_sessions() -> anyhow::Result<()> {
    let mut ts = TestSession::start(settings(false), vec![])?;
    ts.handshake(false, &[])?;
    let addr = ts.session.local_addr().unwrap();

    ts.engine.shutdown();
    assert_eq!(ts.next_event(), DebuggerEvent::Disconnected);
    assert!(wait_until(EVENT_TIMEOUT, || !ts.session.is_connected()));

    // the daemon keeps accepting, next engine gets a fresh session
    ts.engine = FakeEngine::connect(addr)?;
    ts.handshake(false, &[])?;
    assert!(ts.session.is_connected());
    Ok(())
}
