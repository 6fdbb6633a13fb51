//! Closed set of protocol messages.
//!
//! A message is identified on the wire by its 16-bit type tag. [`Message::decode`] is the
//! message factory: tag -> typed message, an unknown tag is a protocol error.

use crate::connection::codec::{TransferEncoding, WireReader, WireWriter};
use crate::error::Error;
use bytes::Bytes;

/// Status of a successful response.
pub const STATUS_OK: i32 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Fire-and-forget, no id.
    Notification,
    /// Carries an id, peer must answer with a response with the same id.
    Request,
    /// Answer to a request.
    Response,
}

/// Field layout of a single message kind. Fields are read and written after the type tag.
pub trait Wire: Sized {
    fn write_fields(&self, w: &mut WireWriter);

    fn read_fields(r: &mut WireReader) -> Result<Self, Error>;

    /// Correlation id, requests and responses only.
    fn id(&self) -> Option<i32> {
        None
    }

    /// Response status, responses only.
    fn status(&self) -> Option<i32> {
        None
    }
}

/// Message with a statically known type tag.
pub trait Tagged {
    const TYPE: MessageType;
}

/// Message which expects an answer of type `Self::Response`.
pub trait Request: Wire + Tagged + Into<Message> {
    type Response: Wire + Tagged + TryFrom<Message, Error = Message>;

    fn set_id(&mut self, id: i32);
}

/// Message without an answer.
pub trait Notification: Wire + Tagged + Into<Message> {}

macro_rules! message_set {
    ($($name: ident: $kind: ident = $tag: literal),+ $(,)?) => {
        /// Type tag of every known message.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::FromRepr)]
        #[repr(u16)]
        pub enum MessageType {
            $($name = $tag),+
        }

        impl MessageType {
            pub fn kind(self) -> MessageKind {
                match self {
                    $(MessageType::$name => MessageKind::$kind),+
                }
            }
        }

        #[derive(Clone, Debug, PartialEq)]
        pub enum Message {
            $($name($name)),+
        }

        $(
            impl Tagged for $name {
                const TYPE: MessageType = MessageType::$name;
            }

            impl From<$name> for Message {
                fn from(m: $name) -> Self {
                    Message::$name(m)
                }
            }

            impl TryFrom<Message> for $name {
                type Error = Message;

                fn try_from(m: Message) -> Result<Self, Message> {
                    match m {
                        Message::$name(m) => Ok(m),
                        other => Err(other),
                    }
                }
            }
        )+

        impl Message {
            pub fn message_type(&self) -> MessageType {
                match self {
                    $(Message::$name(_) => MessageType::$name),+
                }
            }

            pub fn id(&self) -> Option<i32> {
                match self {
                    $(Message::$name(m) => m.id()),+
                }
            }

            pub fn status(&self) -> Option<i32> {
                match self {
                    $(Message::$name(m) => m.status()),+
                }
            }

            fn write_fields(&self, w: &mut WireWriter) {
                match self {
                    $(Message::$name(m) => m.write_fields(w)),+
                }
            }

            fn read_fields(ty: MessageType, r: &mut WireReader) -> Result<Self, Error> {
                let msg = match ty {
                    $(MessageType::$name => Message::$name($name::read_fields(r)?)),+
                };
                Ok(msg)
            }
        }
    };
}

message_set! {
    // client requests
    StartRequest: Request = 1,
    StepIntoRequest: Request = 11,
    StepOverRequest: Request = 12,
    StepOutRequest: Request = 13,
    GoRequest: Request = 14,
    AddBreakpointRequest: Request = 21,
    DeleteBreakpointRequest: Request = 22,
    DeleteAllBreakpointsRequest: Request = 23,
    EvalRequest: Request = 31,
    GetVariableValueRequest: Request = 32,
    AssignValueRequest: Request = 33,
    GetCallStackRequest: Request = 34,
    GetStackVariableValueRequest: Request = 35,
    AddFilesRequest: Request = 38,
    SetProtocolRequest: Request = 10000,
    // client notifications
    CloseSessionNotification: Notification = 3,
    ContinueProcessFileNotification: Notification = 2010,
    // client responses
    GetLocalFileContentResponse: Response = 11001,
    // engine responses
    StartResponse: Response = 1001,
    StepIntoResponse: Response = 1011,
    StepOverResponse: Response = 1012,
    StepOutResponse: Response = 1013,
    GoResponse: Response = 1014,
    AddBreakpointResponse: Response = 1021,
    DeleteBreakpointResponse: Response = 1022,
    DeleteAllBreakpointsResponse: Response = 1023,
    EvalResponse: Response = 1031,
    GetVariableValueResponse: Response = 1032,
    AssignValueResponse: Response = 1033,
    GetCallStackResponse: Response = 1034,
    GetStackVariableValueResponse: Response = 1035,
    AddFilesResponse: Response = 1038,
    SetProtocolResponse: Response = 11000,
    // engine notifications
    ScriptEndedNotification: Notification = 2002,
    ReadyNotification: Notification = 2003,
    OutputNotification: Notification = 2004,
    SessionStartedNotification: Notification = 2005,
    DebuggerErrorNotification: Notification = 2006,
    ParsingErrorNotification: Notification = 2007,
    HeaderOutputNotification: Notification = 2008,
    StartProcessFileNotification: Notification = 2009,
    IniAlteredNotification: Notification = 2011,
    // engine requests
    GetLocalFileContentRequest: Request = 10002,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.message_type().kind()
    }

    /// Serialize a message into a frame body: type tag followed by message fields.
    pub fn encode(&self, encoding: TransferEncoding) -> Bytes {
        let mut w = WireWriter::new(encoding);
        w.put_u16(self.message_type() as u16);
        self.write_fields(&mut w);
        w.into_body()
    }

    /// Deserialize a message from a frame body.
    pub fn decode(frame: Bytes, encoding: TransferEncoding) -> Result<Self, Error> {
        let mut r = WireReader::new(frame, encoding);
        let tag = r.get_u16("type")?;
        let ty = MessageType::from_repr(tag).ok_or(Error::UnknownMessageType(tag))?;
        let msg = Self::read_fields(ty, &mut r)?;
        if r.remaining() > 0 {
            log::warn!(target: "connection", "{ty}: {} unread bytes at the end of frame", r.remaining());
        }
        Ok(msg)
    }
}

/// Implement [`Wire`] and [`Request`] for a request that carries nothing but its id.
macro_rules! id_only_request {
    ($($name: ident => $response: ident),+ $(,)?) => {
        $(
            impl $name {
                pub fn new() -> Self {
                    Self::default()
                }
            }

            impl Wire for $name {
                fn write_fields(&self, w: &mut WireWriter) {
                    w.put_i32(self.id);
                }

                fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
                    Ok(Self { id: r.get_i32("id")? })
                }

                fn id(&self) -> Option<i32> {
                    Some(self.id)
                }
            }

            impl Request for $name {
                type Response = $response;

                fn set_id(&mut self, id: i32) {
                    self.id = id;
                }
            }
        )+
    };
}

/// Implement [`Wire`] for a response that carries only id and status.
macro_rules! status_response {
    ($($name: ident),+ $(,)?) => {
        $(
            impl $name {
                pub fn new(id: i32, status: i32) -> Self {
                    Self { id, status }
                }
            }

            impl Wire for $name {
                fn write_fields(&self, w: &mut WireWriter) {
                    w.put_i32(self.id);
                    w.put_i32(self.status);
                }

                fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
                    Ok(Self {
                        id: r.get_i32("id")?,
                        status: r.get_i32("status")?,
                    })
                }

                fn id(&self) -> Option<i32> {
                    Some(self.id)
                }

                fn status(&self) -> Option<i32> {
                    Some(self.status)
                }
            }
        )+
    };
}

/// Implement [`Wire`] and [`Notification`] for a notification without fields.
macro_rules! empty_notification {
    ($($name: ident),+ $(,)?) => {
        $(
            impl Wire for $name {
                fn write_fields(&self, _: &mut WireWriter) {}

                fn read_fields(_: &mut WireReader) -> Result<Self, Error> {
                    Ok(Self)
                }
            }

            impl Notification for $name {}
        )+
    };
}

pub mod client;
pub mod engine;

pub use client::*;
pub use engine::*;
