use crate::error::Error;
use crate::expression::{Expression, ExpressionEvaluator, ExpressionKind, ExpressionValue, Member};
use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// Name of the superglobal which duplicates the whole global scope.
const GLOBALS_VARIABLE: &str = "$GLOBALS";

/// Path of a variable in a stack frame dump: index of a top level variable
/// followed by member names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VariablePath(pub Vec<String>);

impl VariablePath {
    pub fn new<S: Into<String>>(path: impl IntoIterator<Item = S>) -> Self {
        Self(path.into_iter().map(Into::into).collect())
    }

    pub fn last(&self) -> Option<&String> {
        self.0.last()
    }

    fn child(&self, name: &str) -> Self {
        let mut path = self.0.clone();
        path.push(name.to_string());
        Self(path)
    }
}

impl Display for VariablePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join("/"))
    }
}

/// Value of a variable as shown to a user: display string and member variables.
#[derive(Clone, Debug, PartialEq)]
pub struct SimpleValue {
    pub value: String,
    pub variables: Vec<Variable>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: String,
    pub path: VariablePath,
    pub expression: Expression,
    pub value: ExpressionValue,
    children: Vec<Variable>,
}

impl Variable {
    pub fn new(path: VariablePath, member: Member) -> Self {
        let mut var = Self {
            name: member.expression.name().to_string(),
            path,
            expression: member.expression,
            value: ExpressionValue::Null,
            children: vec![],
        };
        var.update(member.value);
        var
    }

    fn update(&mut self, value: ExpressionValue) {
        self.children = value
            .children()
            .iter()
            .map(|m| Variable::new(self.path.child(m.expression.name()), m.clone()))
            .collect();
        self.value = value;
    }

    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(
            self.value,
            ExpressionValue::Array { .. } | ExpressionValue::Object { .. }
        )
    }

    /// True if all members of the value are known.
    pub fn is_complete(&self) -> bool {
        !self.value.is_incomplete()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.children
    }

    /// Fetch members which were cut by the depth limit.
    pub fn make_complete(&mut self, evaluator: &ExpressionEvaluator) -> Result<(), Error> {
        if self.is_complete() {
            return Ok(());
        }
        let value = evaluator.value(&self.expression, 1)?;
        self.update(value);
        Ok(())
    }

    /// Assign new value (PHP code) and re-read the variable.
    pub fn assign(&mut self, evaluator: &ExpressionEvaluator, value: &str) -> Result<(), Error> {
        evaluator.assign(&self.expression, value, 1)?;
        let value = evaluator.value(&self.expression, 1)?;
        self.update(value);
        Ok(())
    }

    pub fn simple_value(&self) -> SimpleValue {
        let value = match &self.value {
            ExpressionValue::String(s) => s.clone(),
            ExpressionValue::Array { declared_len, .. } => format!("array [{declared_len}]"),
            other => other.to_string(),
        };
        SimpleValue {
            value,
            variables: self.children.clone(),
        }
    }
}

/// Variables of the current stack frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackFrameDump {
    pub fields: Vec<Variable>,
    pub variables: Vec<Variable>,
}

/// Variables fetched after the last suspend.
#[derive(Debug, Default)]
pub struct VariableStorage {
    variables: Vec<Variable>,
}

impl VariableStorage {
    /// Build top level variables from the value of [`Expression::variables`].
    /// `$GLOBALS` is skipped, `$this` goes first.
    pub fn from_scope(scope: ExpressionValue) -> Self {
        let mut variables = vec![];
        let members = match scope {
            ExpressionValue::Array { children, .. } | ExpressionValue::Object { children, .. } => {
                children
            }
            _ => vec![],
        };

        let mut next_id = 0;
        for member in members {
            if member.expression.text().eq_ignore_ascii_case(GLOBALS_VARIABLE) {
                continue;
            }
            let is_this = member.expression.kind() == ExpressionKind::This;
            let var = Variable::new(VariablePath::new([next_id.to_string()]), member);
            next_id += 1;
            if is_this {
                variables.insert(0, var);
            } else {
                variables.push(var);
            }
        }
        Self { variables }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn find_mut(&mut self, path: &VariablePath) -> Option<&mut Variable> {
        fn find<'a>(vars: &'a mut [Variable], path: &[String]) -> Option<&'a mut Variable> {
            let (first, rest) = path.split_first()?;
            let var = vars.iter_mut().find(|v| v.path.last() == Some(first))?;
            if rest.is_empty() {
                return Some(var);
            }
            find(&mut var.children, rest)
        }
        find(&mut self.variables, &path.0)
    }

    pub fn clear(&mut self) {
        self.variables.clear();
    }
}
