//! Messages originated by the debugger client.

use super::{
    AddBreakpointResponse, AddFilesResponse, AssignValueResponse, DeleteAllBreakpointsResponse,
    DeleteBreakpointResponse, EvalResponse, GetCallStackResponse, GetStackVariableValueResponse,
    GetVariableValueResponse, GoResponse, Notification, Request, SetProtocolResponse,
    StartResponse, StepIntoResponse, StepOutResponse, StepOverResponse, Wire,
};
use crate::connection::codec::{WireReader, WireWriter};
use crate::error::Error;
use bytes::Bytes;

/// Breakpoint bound to a file and a line.
pub const BREAKPOINT_STATIC: i16 = 1;
/// Breakpoint removed by the engine after the first hit.
pub const BREAKPOINT_LIFETIME_ONCE: i16 = 1;
/// Breakpoint which lives until it is deleted.
pub const BREAKPOINT_LIFETIME_PERMANENT: i16 = 2;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StartRequest {
    pub id: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepIntoRequest {
    pub id: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepOverRequest {
    pub id: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepOutRequest {
    pub id: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GoRequest {
    pub id: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteAllBreakpointsRequest {
    pub id: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetCallStackRequest {
    pub id: i32,
}

id_only_request! {
    StartRequest => StartResponse,
    StepIntoRequest => StepIntoResponse,
    StepOverRequest => StepOverResponse,
    StepOutRequest => StepOutResponse,
    GoRequest => GoResponse,
    DeleteAllBreakpointsRequest => DeleteAllBreakpointsResponse,
    GetCallStackRequest => GetCallStackResponse,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddBreakpointRequest {
    pub id: i32,
    pub kind: i16,
    pub lifetime: i16,
    pub file_name: String,
    /// Line number, `-1` means the first executable line.
    pub line: i32,
}

impl AddBreakpointRequest {
    pub fn new(kind: i16, lifetime: i16, line: i32, file_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind,
            lifetime,
            file_name: file_name.into(),
            line,
        }
    }
}

impl Wire for AddBreakpointRequest {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_i16(self.kind);
        w.put_i16(self.lifetime);
        w.put_string(&self.file_name);
        w.put_i32(self.line);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            kind: r.get_i16("kind")?,
            lifetime: r.get_i16("lifetime")?,
            file_name: r.get_string("file")?,
            line: r.get_i32("line")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }
}

impl Request for AddBreakpointRequest {
    type Response = AddBreakpointResponse;

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteBreakpointRequest {
    pub id: i32,
    pub breakpoint_id: i32,
}

impl DeleteBreakpointRequest {
    pub fn new(breakpoint_id: i32) -> Self {
        Self {
            id: 0,
            breakpoint_id,
        }
    }
}

impl Wire for DeleteBreakpointRequest {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_i32(self.breakpoint_id);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            breakpoint_id: r.get_i32("breakpoint id")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }
}

impl Request for DeleteBreakpointRequest {
    type Response = DeleteBreakpointResponse;

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvalRequest {
    pub id: i32,
    pub command: String,
}

impl EvalRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: 0,
            command: command.into(),
        }
    }
}

impl Wire for EvalRequest {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_text(&self.command);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            command: r.get_text("command")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }
}

impl Request for EvalRequest {
    type Response = EvalResponse;

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
}

/// Request a value of variable `var`, `path` selects a nested element (array key or member name)
/// and `depth` limits how many levels of children the engine serializes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetVariableValueRequest {
    pub id: i32,
    pub var: String,
    pub depth: i32,
    pub path: Vec<String>,
}

impl GetVariableValueRequest {
    pub fn new(var: impl Into<String>, depth: i32, path: Vec<String>) -> Self {
        Self {
            id: 0,
            var: var.into(),
            depth,
            path,
        }
    }
}

impl Wire for GetVariableValueRequest {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_text(&self.var);
        w.put_i32(self.depth);
        w.put_string_list(&self.path);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            var: r.get_text("var")?,
            depth: r.get_i32("depth")?,
            path: r.get_string_list("path")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }
}

impl Request for GetVariableValueRequest {
    type Response = GetVariableValueResponse;

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssignValueRequest {
    pub id: i32,
    pub var: String,
    pub value: String,
    pub depth: i32,
    pub path: Vec<String>,
}

impl AssignValueRequest {
    pub fn new(
        var: impl Into<String>,
        value: impl Into<String>,
        depth: i32,
        path: Vec<String>,
    ) -> Self {
        Self {
            id: 0,
            var: var.into(),
            value: value.into(),
            depth,
            path,
        }
    }
}

impl Wire for AssignValueRequest {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_text(&self.var);
        w.put_text(&self.value);
        w.put_i32(self.depth);
        w.put_string_list(&self.path);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            var: r.get_text("var")?,
            value: r.get_text("value")?,
            depth: r.get_i32("depth")?,
            path: r.get_string_list("path")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }
}

impl Request for AssignValueRequest {
    type Response = AssignValueResponse;

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetStackVariableValueRequest {
    pub id: i32,
    pub var: String,
    pub depth: i32,
    pub layer_depth: i32,
    pub path: Vec<String>,
}

impl GetStackVariableValueRequest {
    pub fn new(var: impl Into<String>, depth: i32, layer_depth: i32, path: Vec<String>) -> Self {
        Self {
            id: 0,
            var: var.into(),
            depth,
            layer_depth,
            path,
        }
    }
}

impl Wire for GetStackVariableValueRequest {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_text(&self.var);
        w.put_i32(self.depth);
        w.put_i32(self.layer_depth);
        w.put_string_list(&self.path);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            var: r.get_text("var")?,
            depth: r.get_i32("depth")?,
            layer_depth: r.get_i32("layer depth")?,
            path: r.get_string_list("path")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }
}

impl Request for GetStackVariableValueRequest {
    type Response = GetStackVariableValueResponse;

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
}

/// Announce the files that contain breakpoints,
/// the engine stops with `StartProcessFile` before executing each of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddFilesRequest {
    pub id: i32,
    pub paths: Vec<String>,
}

impl AddFilesRequest {
    pub fn new(paths: Vec<String>) -> Self {
        Self { id: 0, paths }
    }
}

impl Wire for AddFilesRequest {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_string_list(&self.paths);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            paths: r.get_string_list("paths")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }
}

impl Request for AddFilesRequest {
    type Response = AddFilesResponse;

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetProtocolRequest {
    pub id: i32,
    pub protocol_id: i32,
}

impl SetProtocolRequest {
    pub fn new(protocol_id: i32) -> Self {
        Self { id: 0, protocol_id }
    }
}

impl Wire for SetProtocolRequest {
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
}

impl Request for SetProtocolRequest {
    type Response = SetProtocolResponse;

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CloseSessionNotification;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContinueProcessFileNotification;

empty_notification!(CloseSessionNotification, ContinueProcessFileNotification);

/// Answer to the engine [`super::GetLocalFileContentRequest`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetLocalFileContentResponse {
    pub id: i32,
    pub status: i32,
    pub content: Bytes,
}

impl GetLocalFileContentResponse {
    pub const STATUS_SUCCESS: i32 = 0;
    pub const STATUS_FILES_IDENTICAL: i32 = 302;
    pub const STATUS_FAILURE: i32 = -1;

    pub fn new(id: i32, status: i32, content: Bytes) -> Self {
        Self {
            id,
            status,
            content,
        }
    }
}

impl Wire for GetLocalFileContentResponse {
    fn write_fields(&self, w: &mut WireWriter) {
        w.put_i32(self.id);
        w.put_i32(self.status);
        w.put_blob(&self.content);
    }

    fn read_fields(r: &mut WireReader) -> Result<Self, Error> {
        Ok(Self {
            id: r.get_i32("id")?,
            status: r.get_i32("status")?,
            content: r.get_blob("content")?,
        })
    }

    fn id(&self) -> Option<i32> {
        Some(self.id)
    }

    fn status(&self) -> Option<i32> {
        Some(self.status)
    }
}
