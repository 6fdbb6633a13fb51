use crate::connection::message::MessageType;
use std::io::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- wire codec errors -----------------------------------------
    #[error("negative length prefix ({0}) in field `{1}`")]
    NegativeLength(i32, &'static str),
    #[error("truncated field `{field}`: {need} bytes required, {left} left")]
    Truncated {
        field: &'static str,
        need: usize,
        left: usize,
    },
    #[error("negative frame length {0}, possibly SSL is enabled on one side only")]
    NegativeFrameLength(i32),
    #[error("frame length {0} exceeds the limit of {1} bytes")]
    FrameTooLarge(i32, usize),
    #[error("field `{0}` is not valid text")]
    InvalidText(&'static str),
    #[error("unsupported transfer encoding `{0}`")]
    UnsupportedEncoding(String),

    // --------------------------------- message model errors --------------------------------------
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),
    #[error("unexpected response {got} for request {request}, expect {expect}")]
    UnexpectedResponse {
        request: i32,
        expect: MessageType,
        got: MessageType,
    },

    // --------------------------------- expression errors -----------------------------------------
    #[error(transparent)]
    Decode(#[from] crate::expression::DecodeError),

    // --------------------------------- connection errors -----------------------------------------
    #[error("engine is not connected")]
    NotConnected,
    #[error("engine connection already established")]
    AlreadyConnected,
    #[error("no response for request {id}: connection closed")]
    NoResponse { id: i32 },
    #[error("no response for request {id} in {timeout_ms}ms")]
    Timeout { id: i32, timeout_ms: u64 },
    #[error("dispatch queue overflow: {0} messages wait for the handler")]
    DispatchOverflow(usize),

    // --------------------------------- daemon errors ---------------------------------------------
    #[error("port {port} is already in use")]
    BindConflict { port: u16 },
    #[error("daemon is already listening on {0}")]
    AlreadyListening(std::net::SocketAddr),

    // --------------------------------- session errors --------------------------------------------
    #[error("unsupported protocol version {engine}, at least {client} is required")]
    ProtocolMismatch { engine: i32, client: i32 },
    #[error("{request} failed with status {status}")]
    Status { request: MessageType, status: i32 },
    #[error("variable {0} not found")]
    VariableNotFound(String),

    // --------------------------------- configuration errors --------------------------------------
    #[error("configuration parsing error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Return a hint to a connection - keep reading or tear the connection down.
    /// After a fatal error the frame boundary (or the whole transport) can't be trusted.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::IO(_) => true,
            Error::NegativeLength(_, _) => true,
            Error::Truncated { .. } => true,
            Error::NegativeFrameLength(_) => true,
            Error::FrameTooLarge(_, _) => true,
            Error::UnknownMessageType(_) => true,
            Error::DispatchOverflow(_) => true,

            Error::InvalidText(_) => false,
            Error::UnsupportedEncoding(_) => false,
            Error::UnexpectedResponse { .. } => false,
            Error::Decode(_) => false,
            Error::NotConnected => false,
            Error::AlreadyConnected => false,
            Error::NoResponse { .. } => false,
            Error::Timeout { .. } => false,
            Error::BindConflict { .. } => false,
            Error::AlreadyListening(_) => false,
            Error::ProtocolMismatch { .. } => false,
            Error::Status { .. } => false,
            Error::VariableNotFound(_) => false,
            Error::Config(_) => false,
        }
    }

    /// True if error means that the peer has gone (normal end of a debug session).
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::IO(e) => matches!(
                e.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::NotConnected
            ),
            Error::NotConnected | Error::NoResponse { .. } => true,
            _ => false,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "session", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "session", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
