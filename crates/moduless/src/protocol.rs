//! Wire format and type registry for messages exchanged with the driven page.
//!
//! A message travels as a JSON array `["<TypeName>", field0, field1, ...]`.
//! JSON has no way to tell `undefined`, `null` and `NaN` apart from each other
//! (or at all), so those three values are carried as reserved string tokens
//! that both sides substitute on the way out and restore on the way in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::result::{ModulessError, ModulessResult};

/// Wire token standing in for `undefined`
pub const UNDEFINED_TOKEN: &str = "#__value_is_undefined™__#";
/// Wire token standing in for `null`
pub const NULL_TOKEN: &str = "#__value_is_null™__#";
/// Wire token standing in for `NaN`
pub const NAN_TOKEN: &str = "#__value_is_not_a_number™__#";

// ============================================================================
// Values
// ============================================================================

/// A script value as seen on the wire
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number, `NaN` included
    Number(f64),
    /// String
    String(String),
    /// Array
    Array(Vec<Value>),
    /// Plain object
    Object(BTreeMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Encode into JSON, substituting the reserved tokens
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Undefined => Json::String(UNDEFINED_TOKEN.to_string()),
            Self::Null => Json::String(NULL_TOKEN.to_string()),
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) if n.is_nan() => Json::String(NAN_TOKEN.to_string()),
            // Infinities have no JSON form; JSON.stringify writes null for them too
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => Json::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Decode from JSON, restoring the reserved tokens
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => match s.as_str() {
                UNDEFINED_TOKEN => Self::Undefined,
                NULL_TOKEN => Self::Null,
                NAN_TOKEN => Self::Number(f64::NAN),
                _ => Self::String(s),
            },
            Json::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Json::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Encode into JSON without tokens; `undefined` and `NaN` become `null`
    #[must_use]
    pub fn to_plain_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Undefined | Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_plain_json).collect()),
            Self::Object(map) => Json::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_plain_json()))
                    .collect(),
            ),
        }
    }

    /// Borrow the string payload
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric payload
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Look up a property of an object value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Short name of the value's shape, for error messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Typed fields
// ============================================================================

/// A Rust type that can occupy one message field
pub trait Field: Sized {
    /// Encode as a wire value
    fn to_value(&self) -> Value;

    /// Decode from a wire value
    fn from_value(value: Value) -> ModulessResult<Self>;
}

fn shape_error(expected: &str, found: &Value) -> ModulessError {
    ModulessError::protocol(format!("expected {expected}, found {}", found.type_name()))
}

impl Field for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> ModulessResult<Self> {
        Ok(value)
    }
}

impl Field for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> ModulessResult<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(shape_error("string", &other)),
        }
    }
}

impl Field for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> ModulessResult<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(shape_error("boolean", &other)),
        }
    }
}

impl Field for f64 {
    fn to_value(&self) -> Value {
        Value::Number(*self)
    }

    fn from_value(value: Value) -> ModulessResult<Self> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(shape_error("number", &other)),
        }
    }
}

impl Field for usize {
    fn to_value(&self) -> Value {
        Value::Number(*self as f64)
    }

    fn from_value(value: Value) -> ModulessResult<Self> {
        match value {
            Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as Self),
            other => Err(shape_error("index", &other)),
        }
    }
}

impl Field for u64 {
    fn to_value(&self) -> Value {
        Value::Number(*self as f64)
    }

    fn from_value(value: Value) -> ModulessResult<Self> {
        usize::from_value(value).map(|n| n as Self)
    }
}

impl<T: Field> Field for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(Field::to_value).collect())
    }

    fn from_value(value: Value) -> ModulessResult<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(shape_error("array", &other)),
        }
    }
}

impl<T: Field> Field for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Undefined, Field::to_value)
    }

    fn from_value(value: Value) -> ModulessResult<Self> {
        match value {
            Value::Undefined | Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Reads decoded fields in declaration order
#[derive(Debug)]
pub struct FieldReader {
    type_name: &'static str,
    fields: std::vec::IntoIter<Value>,
}

impl FieldReader {
    fn new(type_name: &'static str, fields: Vec<Value>) -> Self {
        Self {
            type_name,
            fields: fields.into_iter(),
        }
    }

    /// Decode the next field
    pub fn next<T: Field>(&mut self, field: &str) -> ModulessResult<T> {
        let value = self.fields.next().unwrap_or_default();
        T::from_value(value).map_err(|err| {
            ModulessError::protocol(format!("{}.{field}: {err}", self.type_name))
        })
    }
}

// ============================================================================
// Verification results
// ============================================================================

/// A single pass/fail judgment reported by the page runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Human-readable expression that was judged
    pub expression: String,
    /// Whether it passed
    pub pass: bool,
    /// Exception message, when the judgment came from a throw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_description: Option<String>,
    /// Filtered stack frames, when the judgment came from a throw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_stack: Option<Vec<String>>,
}

impl VerificationResult {
    /// A passing result
    #[must_use]
    pub fn passed(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            pass: true,
            exception_description: None,
            exception_stack: None,
        }
    }

    /// A failing result
    #[must_use]
    pub fn failed(expression: impl Into<String>) -> Self {
        Self {
            pass: false,
            ..Self::passed(expression)
        }
    }

    /// Attach exception detail
    #[must_use]
    pub fn with_exception(mut self, description: impl Into<String>, stack: Vec<String>) -> Self {
        self.exception_description = Some(description.into());
        self.exception_stack = Some(stack);
        self
    }
}

impl Field for VerificationResult {
    fn to_value(&self) -> Value {
        serde_json::to_value(self).map_or(Value::Undefined, Value::from_json)
    }

    fn from_value(value: Value) -> ModulessResult<Self> {
        if !matches!(value, Value::Object(_)) {
            return Err(shape_error("verification object", &value));
        }
        serde_json::from_value(value.to_plain_json())
            .map_err(|err| ModulessError::protocol(err.to_string()))
    }
}

// ============================================================================
// Message types
// ============================================================================

/// A message struct that has a slot in [`Message`]
pub trait MessageType: Sized + Into<Message> {
    /// Registry entry of this type
    const KIND: MessageKind;

    /// Fields in constructor order
    fn fields(&self) -> Vec<Value>;

    /// Rebuild from fields in constructor order; arity is already checked
    fn from_fields(fields: &mut FieldReader) -> ModulessResult<Self>;

    /// Borrow this type out of a message, when it matches exactly
    fn downcast(message: &Message) -> Option<&Self>;
}

macro_rules! message_registry {
    ($($variant:ident($ty:ident) = $arity:literal),+ $(,)?) => {
        /// Registered message type names
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MessageKind {
            $(
                #[doc = concat!("`", stringify!($ty), "`")]
                $variant,
            )+
        }

        impl MessageKind {
            /// Every registered kind
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire name
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($ty)),+
                }
            }

            /// Number of constructor fields
            #[must_use]
            pub const fn arity(self) -> usize {
                match self {
                    $(Self::$variant => $arity),+
                }
            }

            /// Look up a registered wire name
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($ty) => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn decode(self, fields: &mut FieldReader) -> ModulessResult<Message> {
                match self {
                    $(Self::$variant => $ty::from_fields(fields).map(Message::$variant)),+
                }
            }
        }

        /// Any registered message
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $(
                #[doc = concat!("`", stringify!($ty), "`")]
                $variant($ty),
            )+
        }

        impl Message {
            /// Registry entry of this message
            #[must_use]
            pub const fn kind(&self) -> MessageKind {
                match self {
                    $(Self::$variant(_) => MessageKind::$variant),+
                }
            }

            /// Fields in constructor order
            #[must_use]
            pub fn fields(&self) -> Vec<Value> {
                match self {
                    $(Self::$variant(m) => m.fields()),+
                }
            }
        }

        $(
            impl From<$ty> for Message {
                fn from(message: $ty) -> Self {
                    Self::$variant(message)
                }
            }

            impl MessageType for $ty {
                const KIND: MessageKind = MessageKind::$variant;

                fn fields(&self) -> Vec<Value> {
                    self.field_values()
                }

                fn from_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
                    Self::read_fields(fields)
                }

                fn downcast(message: &Message) -> Option<&Self> {
                    match message {
                        Message::$variant(m) => Some(m),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )+
    };
}

message_registry! {
    Reload(ReloadMessage) = 0,
    StartCover(StartCoverMessage) = 2,
    StartCompleteCoverage(StartCompleteCoverageMessage) = 1,
    ExecuteVoid(ExecuteVoidMessage) = 3,
    VoidResult(VoidResultMessage) = 3,
    EndCover(EndCoverMessage) = 4,
    WindowMetrics(WindowMetricsMessage) = 4,
    SelectCover(SelectCoverMessage) = 2,
    AddCover(AddCoverMessage) = 3,
    RemoveCover(RemoveCoverMessage) = 3,
}

/// Ask every connected page to reload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadMessage;

impl ReloadMessage {
    fn field_values(&self) -> Vec<Value> {
        Vec::new()
    }

    fn read_fields(_: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self)
    }
}

/// Run one cover function of the project that owns a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCoverMessage {
    /// Any path the owning project can be found by
    pub containing_file_path: String,
    /// Cover function name
    pub cover_name: String,
}

impl StartCoverMessage {
    /// Create a start message
    #[must_use]
    pub fn new(containing_file_path: impl Into<String>, cover_name: impl Into<String>) -> Self {
        Self {
            containing_file_path: containing_file_path.into(),
            cover_name: cover_name.into(),
        }
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            self.containing_file_path.to_value(),
            self.cover_name.to_value(),
        ]
    }

    fn read_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self {
            containing_file_path: fields.next("containingFilePath")?,
            cover_name: fields.next("coverName")?,
        })
    }
}

/// Run every cover function of a project, one after another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCompleteCoverageMessage {
    /// Any path the owning project can be found by
    pub containing_file_path: String,
}

impl StartCompleteCoverageMessage {
    /// Create a start-all message
    #[must_use]
    pub fn new(containing_file_path: impl Into<String>) -> Self {
        Self {
            containing_file_path: containing_file_path.into(),
        }
    }

    fn field_values(&self) -> Vec<Value> {
        vec![self.containing_file_path.to_value()]
    }

    fn read_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self {
            containing_file_path: fields.next("containingFilePath")?,
        })
    }
}

/// A remote command issued by a rewritten `void "..."` expression
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteVoidMessage {
    /// Command name, e.g. `click`
    pub void_name: String,
    /// Literal arguments
    pub parameters: Vec<Value>,
    /// Caller context; the runner puts `callId` and `coverName` here
    pub context: Value,
}

impl ExecuteVoidMessage {
    /// Create a command message
    #[must_use]
    pub fn new(void_name: impl Into<String>, parameters: Vec<Value>, context: Value) -> Self {
        Self {
            void_name: void_name.into(),
            parameters,
            context,
        }
    }

    /// `context.callId`, when present
    #[must_use]
    pub fn call_id(&self) -> Option<u64> {
        self.context
            .get("callId")
            .and_then(Value::as_f64)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64)
    }

    /// `context.coverName`, when present
    #[must_use]
    pub fn cover_name(&self) -> Option<&str> {
        self.context.get("coverName").and_then(Value::as_str)
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            self.void_name.to_value(),
            self.parameters.to_value(),
            self.context.clone(),
        ]
    }

    fn read_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self {
            void_name: fields.next("voidName")?,
            parameters: fields.next("parameters")?,
            context: fields.next("context")?,
        })
    }
}

/// Answer to an [`ExecuteVoidMessage`]
#[derive(Debug, Clone, PartialEq)]
pub struct VoidResultMessage {
    /// `callId` of the command being answered
    pub call_id: u64,
    /// Command result
    pub value: Value,
    /// Failure text; absent on success
    pub error: Option<String>,
}

impl VoidResultMessage {
    /// A successful answer
    #[must_use]
    pub const fn ok(call_id: u64, value: Value) -> Self {
        Self {
            call_id,
            value,
            error: None,
        }
    }

    /// A failed answer
    #[must_use]
    pub fn err(call_id: u64, error: impl Into<String>) -> Self {
        Self {
            call_id,
            value: Value::Undefined,
            error: Some(error.into()),
        }
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            self.call_id.to_value(),
            self.value.clone(),
            self.error.to_value(),
        ]
    }

    fn read_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self {
            call_id: fields.next("callId")?,
            value: fields.next("value")?,
            error: fields.next("error")?,
        })
    }
}

/// Outcome of one cover function run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndCoverMessage {
    /// Cover function name
    pub cover_name: String,
    /// Exception message; empty when the cover did not throw
    pub exception_description: String,
    /// Filtered stack frames; empty when the cover did not throw
    pub exception_stack: Vec<String>,
    /// Judgments in the order they were produced
    pub verifications: Vec<VerificationResult>,
}

impl EndCoverMessage {
    /// Whether the cover threw
    #[must_use]
    pub fn has_exception(&self) -> bool {
        !self.exception_description.is_empty() || !self.exception_stack.is_empty()
    }

    /// Whether every verification passed and nothing was thrown
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.has_exception() && self.verifications.iter().all(|v| v.pass)
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            self.cover_name.to_value(),
            self.exception_description.to_value(),
            self.exception_stack.to_value(),
            self.verifications.to_value(),
        ]
    }

    fn read_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self {
            cover_name: fields.next("coverName")?,
            exception_description: fields
                .next::<Option<String>>("exceptionDescription")?
                .unwrap_or_default(),
            exception_stack: fields
                .next::<Option<Vec<String>>>("exceptionStack")?
                .unwrap_or_default(),
            verifications: fields.next("verifications")?,
        })
    }
}

/// Size and position of the page's window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowMetricsMessage {
    /// Window left edge in screen pixels
    pub screen_x: f64,
    /// Window top edge in screen pixels
    pub screen_y: f64,
    /// Outer width
    pub width: f64,
    /// Outer height
    pub height: f64,
}

impl WindowMetricsMessage {
    fn field_values(&self) -> Vec<Value> {
        vec![
            self.screen_x.to_value(),
            self.screen_y.to_value(),
            self.width.to_value(),
            self.height.to_value(),
        ]
    }

    fn read_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self {
            screen_x: fields.next("screenX")?,
            screen_y: fields.next("screenY")?,
            width: fields.next("width")?,
            height: fields.next("height")?,
        })
    }
}

/// The cover a host last pointed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectCoverMessage {
    /// File the cover lives in
    pub containing_file: String,
    /// Cover function name
    pub cover_function_name: String,
}

impl SelectCoverMessage {
    /// Create a selection message
    #[must_use]
    pub fn new(containing_file: impl Into<String>, cover_function_name: impl Into<String>) -> Self {
        Self {
            containing_file: containing_file.into(),
            cover_function_name: cover_function_name.into(),
        }
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            self.containing_file.to_value(),
            self.cover_function_name.to_value(),
        ]
    }

    fn read_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self {
            containing_file: fields.next("containingFile")?,
            cover_function_name: fields.next("coverFunctionName")?,
        })
    }
}

/// A cover function appeared in a project's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCoverMessage {
    /// Config path of the project
    pub project: String,
    /// Cover function name
    pub cover_function_name: String,
    /// Position in the project's cover list
    pub cover_index: usize,
}

impl AddCoverMessage {
    /// Create an addition event
    #[must_use]
    pub fn new(project: impl Into<String>, cover_function_name: impl Into<String>, cover_index: usize) -> Self {
        Self {
            project: project.into(),
            cover_function_name: cover_function_name.into(),
            cover_index,
        }
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            self.project.to_value(),
            self.cover_function_name.to_value(),
            self.cover_index.to_value(),
        ]
    }

    fn read_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self {
            project: fields.next("project")?,
            cover_function_name: fields.next("coverFunctionName")?,
            cover_index: fields.next("coverIndex")?,
        })
    }
}

/// A cover function disappeared from a project's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveCoverMessage {
    /// Config path of the project
    pub project: String,
    /// Cover function name
    pub cover_function_name: String,
    /// Position it held in the previous cover list
    pub cover_index: usize,
}

impl RemoveCoverMessage {
    /// Create a removal event
    #[must_use]
    pub fn new(project: impl Into<String>, cover_function_name: impl Into<String>, cover_index: usize) -> Self {
        Self {
            project: project.into(),
            cover_function_name: cover_function_name.into(),
            cover_index,
        }
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            self.project.to_value(),
            self.cover_function_name.to_value(),
            self.cover_index.to_value(),
        ]
    }

    fn read_fields(fields: &mut FieldReader) -> ModulessResult<Self> {
        Ok(Self {
            project: fields.next("project")?,
            cover_function_name: fields.next("coverFunctionName")?,
            cover_index: fields.next("coverIndex")?,
        })
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Encode a message as wire text
#[must_use]
pub fn serialize(message: &Message) -> String {
    let mut items = Vec::with_capacity(message.kind().arity() + 1);
    items.push(serde_json::Value::String(message.kind().name().to_string()));
    items.extend(message.fields().iter().map(Value::to_json));
    serde_json::Value::Array(items).to_string()
}

/// Decode wire text into a message
pub fn parse(text: &str) -> ModulessResult<Message> {
    let raw: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| ModulessError::protocol(format!("not JSON ({err})")))?;

    let serde_json::Value::Array(mut items) = raw else {
        return Err(ModulessError::protocol("payload is not a list"));
    };
    if items.is_empty() {
        return Err(ModulessError::protocol("payload is empty"));
    }

    let head = items.remove(0);
    let kind = head
        .as_str()
        .and_then(MessageKind::from_name)
        .ok_or_else(|| ModulessError::UnknownMessageType {
            name: head.as_str().map_or_else(|| head.to_string(), str::to_string),
        })?;

    if items.len() != kind.arity() {
        return Err(ModulessError::ArityMismatch {
            name: kind.name().to_string(),
            expected: kind.arity(),
            actual: items.len(),
        });
    }

    let fields = items.into_iter().map(Value::from_json).collect();
    kind.decode(&mut FieldReader::new(kind.name(), fields))
}

impl Message {
    /// Encode as wire text
    #[must_use]
    pub fn serialize(&self) -> String {
        serialize(self)
    }

    /// Decode wire text
    pub fn parse(text: &str) -> ModulessResult<Self> {
        parse(text)
    }

    /// Borrow a concrete message type out of this message
    #[must_use]
    pub fn downcast<M: MessageType>(&self) -> Option<&M> {
        M::downcast(self)
    }
}
