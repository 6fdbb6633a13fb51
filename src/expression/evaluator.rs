use crate::connection::message::{
    AssignValueRequest, EvalRequest, GetCallStackRequest, GetStackVariableValueRequest,
    GetVariableValueRequest, MessageType, StackLayer, STATUS_OK,
};
use crate::connection::Connection;
use crate::error::Error;
use crate::expression::{decode, Expression, ExpressionValue};

/// Decoded call stack layer.
#[derive(Clone, Debug, PartialEq)]
pub struct StackFrame {
    pub file: String,
    pub line: i32,
    pub function: String,
    pub params: Vec<(String, ExpressionValue)>,
}

/// Evaluates expressions in the engine through a connection.
#[derive(Clone)]
pub struct ExpressionEvaluator {
    conn: Connection,
}

fn check_status(request: MessageType, status: i32) -> Result<(), Error> {
    if status != STATUS_OK {
        return Err(Error::Status { request, status });
    }
    Ok(())
}

impl ExpressionEvaluator {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Fetch the value of `expr`, members deeper than `depth` levels are not transferred.
    pub fn value(&self, expr: &Expression, depth: i32) -> Result<ExpressionValue, Error> {
        let request =
            GetVariableValueRequest::new(expr.root(), depth, expr.path().to_vec());
        let response = self.conn.send_request(request)?;
        check_status(MessageType::GetVariableValueRequest, response.status)?;
        Ok(decode(&response.value, self.conn.options().encoding, Some(expr))?)
    }

    /// Fetch the value of `expr` in the scope of call stack layer `layer`.
    pub fn stack_value(
        &self,
        expr: &Expression,
        depth: i32,
        layer: i32,
    ) -> Result<ExpressionValue, Error> {
        let request =
            GetStackVariableValueRequest::new(expr.root(), depth, layer, expr.path().to_vec());
        let response = self.conn.send_request(request)?;
        check_status(MessageType::GetStackVariableValueRequest, response.status)?;
        Ok(decode(&response.value, self.conn.options().encoding, Some(expr))?)
    }

    /// Execute PHP code, return its textual result.
    pub fn eval(&self, code: &str) -> Result<String, Error> {
        let response = self.conn.send_request(EvalRequest::new(code))?;
        check_status(MessageType::EvalRequest, response.status)?;
        Ok(response.result)
    }

    /// Assign `value` (PHP code) to the variable addressed by `expr`.
    pub fn assign(&self, expr: &Expression, value: &str, depth: i32) -> Result<(), Error> {
        let request = AssignValueRequest::new(expr.root(), value, depth, expr.path().to_vec());
        let response = self.conn.send_request(request)?;
        check_status(MessageType::AssignValueRequest, response.status)
    }

    /// Call stack with decoded parameters, outermost frame first.
    pub fn call_stack(&self) -> Result<Vec<StackFrame>, Error> {
        let response = self.conn.send_request(GetCallStackRequest::new())?;
        let encoding = self.conn.options().encoding;
        response
            .layers
            .into_iter()
            .map(|layer| {
                let StackLayer {
                    called_file,
                    called_line,
                    called_function,
                    params,
                    ..
                } = layer;
                let params = params
                    .into_iter()
                    .map(|p| Ok((p.name, decode(&p.value, encoding, None)?)))
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok(StackFrame {
                    file: called_file,
                    line: called_line,
                    function: called_function,
                    params,
                })
            })
            .collect()
    }
}
