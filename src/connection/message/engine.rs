//! Messages originated by the debug engine.

use super::{GetLocalFileContentResponse, Notification, Request, Wire, STATUS_OK};
use crate::connection::codec::{WireReader, WireWriter};
use crate::error::Error;
use bytes::Bytes;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StartResponse {
    pub id: i32,
    pub status: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepIntoResponse {
    pub id: i32,
    pub status: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepOverResponse {
    pub id: i32,
    pub status: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepOutResponse {
    pub id: i32,
    pub status: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GoResponse {
    pub id: i32,
    pub status: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteBreakpointResponse {
    pub id: i32,
    pub status: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteAllBreakpointsResponse {
    pub id: i32,
    pub status: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssignValueResponse {
    pub id: i32,
    pub status: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddFilesResponse {
    pub id: i32,
    pub status: i32,
}

status_response!(
    StartResponse,
    StepIntoResponse,
    StepOverResponse,
    StepOutResponse,
    GoResponse,
    DeleteBreakpointResponse,
    DeleteAllBreakpointsResponse,
    AssignValueResponse,
    AddFilesResponse,
);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddBreakpointResponse {
    pub id: i32,
    pub status: i32,
    /// Engine side breakpoint id, used for deletion.
    pub breakpoint_id: i32,
}

impl AddBreakpointResponse {
    pub fn new(id: i32, status: i32, breakpoint_id: i32) -> Self {
        Self {
            id,
            status,
            breakpoint_id,
        }
    }
}

impl Wire for AddBreakpointResponse {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_i32(self.status);
        w.put_i32(self.breakpoint_id);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            status: r.get_i32("status")?,
            breakpoint_id: r.get_i32("breakpoint id")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }

    fn status(&self) -> Option<i32> {
        Some(self.status)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvalResponse {
    pub id: i32,
    pub status: i32,
    pub result: String,
}

impl EvalResponse {
    pub fn new(id: i32, status: i32, result: impl Into<String>) -> Self {
        Self {
            id,
            status,
            result: result.into(),
        }
    }
}

impl Wire for EvalResponse {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_i32(self.status);
        w.put_text(&self.result);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            status: r.get_i32("status")?,
            result: r.get_text("result")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }

    fn status(&self) -> Option<i32> {
        Some(self.status)
    }
}

/// Serialized variable value, see [`crate::expression::decoder`] for the format.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetVariableValueResponse {
    pub id: i32,
    pub status: i32,
    pub value: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetStackVariableValueResponse {
    pub id: i32,
    pub status: i32,
    pub value: Bytes,
}

macro_rules! value_response {
    ($($name: ident),+) => {
        $(
            impl $name {
                pub fn new(id: i32, status: i32, value: Bytes) -> Self {
                    Self { id, status, value }
                }
            }

            impl Wire for $name {
                fn write_fields(&self, w: &mut WireWriter) {
                    w.put_i32(self.id);
                    w.put_i32(self.status);
                    w.put_blob(&self.value);
                }

                fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
                    Ok(Self {
                        id: r.get_i32("id")?,
                        status: r.get_i32("status")?,
                        value: r.get_blob("value")?,
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

value_response!(GetVariableValueResponse, GetStackVariableValueResponse);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackParam {
    pub name: String,
    /// Serialized value.
    pub value: Bytes,
}

/// One call stack layer: where the function was called from and where it is now.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackLayer {
    pub called_file: String,
    pub called_line: i32,
    pub called_function: String,
    pub caller_file: String,
    pub caller_line: i32,
    pub caller_function: String,
    pub params: Vec<StackParam>,
}

/// Call stack, outermost layer first. Carries no status on the wire.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetCallStackResponse {
    pub id: i32,
    pub layers: Vec<StackLayer>,
}

impl GetCallStackResponse {
    pub fn new(id: i32, layers: Vec<StackLayer>) -> Self {
        Self { id, layers }
    }
}

impl Wire for GetCallStackResponse {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_i32(self.layers.len() as i32);
        for layer in &self.layers {
            w.put_string(&layer.called_file);
            w.put_i32(layer.called_line);
            w.put_string(&layer.called_function);
            w.put_string(&layer.caller_file);
            w.put_i32(layer.caller_line);
            w.put_string(&layer.caller_function);
            w.put_i32(layer.params.len() as i32);
            for param in &layer.params {
                w.put_text(&param.name);
                w.put_blob(&param.value);
            }
        }
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        let id = r.get_i32("id")?;
        let depth = r.get_i32("stack depth")?;
        let depth = usize::try_from(depth).map_err(|_| Error::NegativeLength(depth, "stack depth"))?;

        let mut layers = Vec::with_capacity(depth.min(r.remaining() / 4));
        for _ in 0..depth {
            let mut layer = StackLayer {
                called_file: r.get_string("called file")?,
                called_line: r.get_i32("called line")?,
                called_function: r.get_string("called function")?,
                caller_file: r.get_string("caller file")?,
                caller_line: r.get_i32("caller line")?,
                caller_function: r.get_string("caller function")?,
                params: vec![],
            };
            let params = r.get_i32("params count")?;
            let params =
                usize::try_from(params).map_err(|_| Error::NegativeLength(params, "params count"))?;
            for _ in 0..params {
                layer.params.push(StackParam {
                    name: r.get_text("param name")?,
                    value: r.get_blob("param value")?,
                });
            }
            layers.push(layer);
        }
        Ok(Self { id, layers })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }

    fn status(&self) -> Option<i32> {
        Some(STATUS_OK)
    }
}

/// Protocol version accepted by the engine. Carries no status on the wire.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetProtocolResponse {
    pub id: i32,
    pub protocol_id: i32,
}

impl SetProtocolResponse {
    pub fn new(id: i32, protocol_id: i32) -> Self {
        Self { id, protocol_id }
    }
}

impl Wire for SetProtocolResponse {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_i32(self.protocol_id);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            protocol_id: r.get_i32("protocol id")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }

    fn status(&self) -> Option<i32> {
        Some(STATUS_OK)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScriptEndedNotification {
    pub status: i32,
}

impl Wire for ScriptEndedNotification {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.status);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            status: r.get_i32("status")?,
        })
    }
}

/// Engine is suspended at `file_name:line` and waits for commands.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadyNotification {
    pub file_name: String,
    pub line: i32,
    pub reserved: i32,
}

impl ReadyNotification {
    pub fn new(file_name: impl Into<String>, line: i32) -> Self {
        Self {
            file_name: file_name.into(),
            line,
            reserved: 0,
        }
    }
}

impl Wire for ReadyNotification {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_string(&self.file_name);
        w.put_i32(self.line);
        w.put_i32(self.reserved);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            file_name: r.get_string("file")?,
            line: r.get_i32("line")?,
            reserved: r.get_i32("reserved")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputNotification {
    pub output: String,
}

impl OutputNotification {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl Wire for OutputNotification {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_text(&self.output);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            output: r.get_text("output")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderOutputNotification {
    pub output: String,
}

impl HeaderOutputNotification {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl Wire for HeaderOutputNotification {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_text(&self.output);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            output: r.get_text("output")?,
        })
    }
}

/// First message of every debug session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionStartedNotification {
    pub file_name: String,
    pub uri: String,
    pub query: String,
    pub options: String,
    pub protocol_id: i32,
}

impl SessionStartedNotification {
    pub fn new(
        file_name: impl Into<String>,
        uri: impl Into<String>,
        query: impl Into<String>,
        options: impl Into<String>,
        protocol_id: i32,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            uri: uri.into(),
            query: query.into(),
            options: options.into(),
            protocol_id,
        }
    }
}

impl Wire for SessionStartedNotification {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_string(&self.file_name);
        w.put_string(&self.uri);
        w.put_text(&self.query);
        w.put_string(&self.options);
        w.put_i32(self.protocol_id);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            file_name: r.get_string("file")?,
            uri: r.get_string("uri")?,
            query: r.get_text("query")?,
            options: r.get_string("options")?,
            protocol_id: r.get_i32("protocol id")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DebuggerErrorNotification {
    pub level: i32,
    pub message: String,
}

impl DebuggerErrorNotification {
    pub fn new(level: i32, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl Wire for DebuggerErrorNotification {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.level);
        w.put_text(&self.message);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            level: r.get_i32("level")?,
            message: r.get_text("message")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsingErrorNotification {
    pub level: i32,
    pub file_name: String,
    pub line: i32,
    pub message: String,
}

impl ParsingErrorNotification {
    pub fn new(level: i32, file_name: impl Into<String>, line: i32, message: impl Into<String>) -> Self {
        Self {
            level,
            file_name: file_name.into(),
            line,
            message: message.into(),
        }
    }
}

impl Wire for ParsingErrorNotification {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.level);
        w.put_string(&self.file_name);
        w.put_i32(self.line);
        w.put_text(&self.message);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            level: r.get_i32("level")?,
            file_name: r.get_string("file")?,
            line: r.get_i32("line")?,
            message: r.get_text("message")?,
        })
    }
}

/// Engine is about to execute `file_name`, it waits for `ContinueProcessFile`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StartProcessFileNotification {
    pub file_name: String,
}

impl StartProcessFileNotification {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Wire for StartProcessFileNotification {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_string(&self.file_name);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            file_name: r.get_string("file")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IniAlteredNotification {
    pub name: String,
    pub old_value: String,
    pub new_value: String,
}

impl IniAlteredNotification {
    pub fn new(name: impl Into<String>, old_value: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

impl Wire for IniAlteredNotification {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_string(&self.name);
        w.put_string(&self.old_value);
        w.put_string(&self.new_value);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            name: r.get_string("name")?,
            old_value: r.get_string("old value")?,
            new_value: r.get_string("new value")?,
        })
    }
}

impl Notification for ScriptEndedNotification {}
impl Notification for ReadyNotification {}
impl Notification for OutputNotification {}
impl Notification for HeaderOutputNotification {}
impl Notification for SessionStartedNotification {}
impl Notification for DebuggerErrorNotification {}
impl Notification for ParsingErrorNotification {}
impl Notification for StartProcessFileNotification {}
impl Notification for IniAlteredNotification {}

/// Engine asks for the content of a file it can't find locally.
/// `size` and `checksum` describe the engine copy so that identical files are not transferred.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetLocalFileContentRequest {
    pub id: i32,
    pub file_name: String,
    pub size: i32,
    pub checksum: i32,
}

impl GetLocalFileContentRequest {
    pub fn new(file_name: impl Into<String>, size: i32, checksum: i32) -> Self {
        Self {
            id: 0,
            file_name: file_name.into(),
            size,
            checksum,
        }
    }
}

impl Wire for GetLocalFileContentRequest {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_string(&self.file_name);
        w.put_i32(self.size);
        w.put_i32(self.checksum);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            file_name: r.get_string("file")?,
            size: r.get_i32("size")?,
            checksum: r.get_i32("checksum")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }
}

impl Request for GetLocalFileContentRequest {
    type Response = GetLocalFileContentResponse;

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
}
