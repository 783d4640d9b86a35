//! Tool descriptors and argument validation
//!
//! A tool declares its parameters as a flat list of named, typed fields. Arguments
//! arrive as a loosely typed JSON object and are validated against the declaration
//! of the tool *as it exists at invocation time*, producing a [`ToolArguments`] map
//! of tagged [`ParamValue`]s.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::InvocationError;

/// JSON type of a declared parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type())
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamField {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ParamField {
    pub fn required(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Validated argument value, tagged by declared kind
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl ParamValue {
    fn from_json(kind: ParamKind, value: &Value) -> Option<Self> {
        match (kind, value) {
            (ParamKind::String, Value::String(s)) => Some(ParamValue::String(s.clone())),
            (ParamKind::Number, Value::Number(n)) => n.as_f64().map(ParamValue::Number),
            (ParamKind::Integer, Value::Number(n)) => n.as_i64().map(ParamValue::Integer),
            (ParamKind::Boolean, Value::Bool(b)) => Some(ParamValue::Boolean(*b)),
            (ParamKind::Object, Value::Object(o)) => Some(ParamValue::Object(o.clone())),
            (ParamKind::Array, Value::Array(a)) => Some(ParamValue::Array(a.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Parameter schema of a tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    pub fields: Vec<ParamField>,
}

impl ParamSchema {
    pub fn new(fields: Vec<ParamField>) -> Self {
        Self { fields }
    }

    /// JSON Schema object advertised in `tools/list`
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    json!({"type": f.kind.json_type(), "description": f.description}),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validate raw call arguments against the declared fields.
    ///
    /// Missing argument object, missing or empty required fields, ill-typed values and
    /// undeclared fields are all invocation errors.
    pub fn validate(&self, arguments: Option<&Value>) -> Result<ToolArguments, InvocationError> {
        let raw = match arguments {
            Some(Value::Object(map)) => map,
            _ => return Err(InvocationError::MissingArguments),
        };

        let mut values = BTreeMap::new();
        for field in &self.fields {
            let value = match raw.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(InvocationError::MissingField(field.name.clone()));
                    }
                    continue;
                }
                Some(value) => value,
            };

            let parsed = ParamValue::from_json(field.kind, value).ok_or_else(|| {
                InvocationError::InvalidField {
                    name: field.name.clone(),
                    expected: field.kind,
                }
            })?;

            if field.required && matches!(&parsed, ParamValue::String(s) if s.is_empty()) {
                return Err(InvocationError::MissingField(field.name.clone()));
            }
            values.insert(field.name.clone(), parsed);
        }

        if let Some(unknown) = raw
            .keys()
            .find(|key| !self.fields.iter().any(|f| &f.name == *key))
        {
            return Err(InvocationError::UnknownField(unknown.clone()));
        }

        Ok(ToolArguments(values))
    }
}

impl Serialize for ParamSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_schema().serialize(serializer)
    }
}

/// Arguments that passed schema validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(BTreeMap<String, ParamValue>);

impl ToolArguments {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, InvocationError> {
        self.get_str(name)
            .ok_or_else(|| InvocationError::MissingField(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Tool as advertised by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: ParamSchema,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: ParamSchema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// One item of tool output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

/// Result of `tools/call`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    pub fn texts(&self) -> Vec<&str> {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect()
    }
}

impl From<InvocationError> for ToolResult {
    fn from(err: InvocationError) -> Self {
        ToolResult::error(err.to_string())
    }
}
