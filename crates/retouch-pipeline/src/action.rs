//! Filter actions: the replayable record of one filter invocation.
//!
//! An action names a filter (`identifier` + `version`) and carries the
//! exact parameters it ran with. Actions are appended to an
//! [`ImageHistory`](crate::ImageHistory) and later handed back to the
//! filter registry to rebuild the filter.
//!
//! Two encodings are supported: serde (JSON in practice) and a flat,
//! line-oriented text form that survives any transport able to carry
//! UTF-8. The text form is lossless for every [`ParamValue`]; doubles are
//! written with Rust's shortest round-trip formatting.
//!
//! ```text
//! action digikam:BCGFilter 1 reproducible
//! name Brightness%20/%20Contrast%20/%20Gamma
//! param brightness double 0.1
//! param channel int 0
//! end
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{ActionDecodeError, Point, Rect};

/// How faithfully an action describes the pixels it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterCategory {
    /// Replaying the action reproduces the result exactly.
    #[default]
    Reproducible,
    /// The result depends on inputs the action does not record (for
    /// example a separate reference image), so replay is not exact.
    Complex,
    /// The action only documents that something happened.
    Documented,
}

impl FilterCategory {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Reproducible => "reproducible",
            Self::Complex => "complex",
            Self::Documented => "documented",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "reproducible" => Some(Self::Reproducible),
            "complex" => Some(Self::Complex),
            "documented" => Some(Self::Documented),
            _ => None,
        }
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Blob(Vec<u8>),
    Points(Vec<Point>),
    Rects(Vec<Rect>),
}

impl ParamValue {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Blob(_) => "blob",
            Self::Points(_) => "points",
            Self::Rects(_) => "rects",
        }
    }

    fn encode(&self, out: &mut String) {
        match self {
            Self::Int(v) => out.push_str(&v.to_string()),
            Self::Double(v) => out.push_str(&format!("{v:?}")),
            Self::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            Self::String(s) => escape_into(s, out),
            Self::Blob(bytes) => {
                for byte in bytes {
                    out.push_str(&format!("{byte:02x}"));
                }
            }
            Self::Points(points) => {
                for (i, p) in points.iter().enumerate() {
                    if i > 0 {
                        out.push(';');
                    }
                    out.push_str(&format!("{},{}", p.x, p.y));
                }
            }
            Self::Rects(rects) => {
                for (i, r) in rects.iter().enumerate() {
                    if i > 0 {
                        out.push(';');
                    }
                    out.push_str(&format!("{},{},{},{}", r.x, r.y, r.width, r.height));
                }
            }
        }
    }

    fn decode(type_name: &str, text: &str) -> Result<Self, String> {
        let value = match type_name {
            "int" => Self::Int(text.parse().map_err(|e| format!("bad int {text:?}: {e}"))?),
            "double" => Self::Double(
                text.parse()
                    .map_err(|e| format!("bad double {text:?}: {e}"))?,
            ),
            "bool" => Self::Bool(text.parse().map_err(|e| format!("bad bool {text:?}: {e}"))?),
            "string" => Self::String(unescape(text)?),
            "blob" => Self::Blob(decode_hex(text)?),
            "points" => Self::Points(
                decode_list::<2>(text)?
                    .into_iter()
                    .map(|[x, y]| Point::new(x, y))
                    .collect(),
            ),
            "rects" => Self::Rects(
                decode_list::<4>(text)?
                    .into_iter()
                    .map(|[x, y, w, h]| Rect::new(x, y, w, h))
                    .collect(),
            ),
            other => return Err(format!("unknown parameter type {other:?}")),
        };
        Ok(value)
    }
}

macro_rules! param_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

param_from! {
    i64 => Int,
    i32 => Int,
    u32 => Int,
    u16 => Int,
    f64 => Double,
    f32 => Double,
    bool => Bool,
    String => String,
    &str => String,
    Vec<u8> => Blob,
    Vec<Point> => Points,
    Vec<Rect> => Rects,
}

/// Extraction of a concrete type from a [`ParamValue`].
///
/// Returns `None` when the stored value has an incompatible type; the
/// caller then falls back to its default.
pub trait FromParam: Sized {
    fn from_param(value: &ParamValue) -> Option<Self>;
}

impl FromParam for i64 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromParam for i32 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        i64::from_param(value).and_then(|v| Self::try_from(v).ok())
    }
}

impl FromParam for u32 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        i64::from_param(value).and_then(|v| Self::try_from(v).ok())
    }
}

impl FromParam for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Double(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as Self),
            _ => None,
        }
    }
}

impl FromParam for bool {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Bool(v) => Some(*v),
            ParamValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl FromParam for String {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromParam for Vec<u8> {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Blob(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl FromParam for Vec<Point> {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Points(p) => Some(p.clone()),
            _ => None,
        }
    }
}

impl FromParam for Vec<Rect> {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Rects(r) => Some(r.clone()),
            _ => None,
        }
    }
}

/// One named parameter of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
}

/// The description of one filter invocation.
///
/// Equality compares identifier, version, category and the parameter
/// set regardless of insertion order. The display name is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterAction {
    identifier: String,
    version: i32,
    #[serde(default)]
    category: FilterCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(default)]
    parameters: Vec<Parameter>,
}

impl FilterAction {
    #[must_use]
    pub fn new(identifier: impl Into<String>, version: i32) -> Self {
        Self {
            identifier: identifier.into(),
            version,
            category: FilterCategory::default(),
            display_name: None,
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_category(mut self, category: FilterCategory) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.add_parameter(key, value);
        self
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub const fn version(&self) -> i32 {
        self.version
    }

    #[must_use]
    pub const fn category(&self) -> FilterCategory {
        self.category
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.identifier.is_empty()
    }

    /// Set `key`, replacing an earlier value but keeping its position.
    pub fn add_parameter(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        let value = value.into();
        match self.parameters.iter_mut().find(|p| p.name == key) {
            Some(existing) => existing.value = value,
            None => self.parameters.push(Parameter { name: key, value }),
        }
    }

    #[must_use]
    pub fn has_parameter(&self, key: &str) -> bool {
        self.raw_parameter(key).is_some()
    }

    #[must_use]
    pub fn raw_parameter(&self, key: &str) -> Option<&ParamValue> {
        self.parameters
            .iter()
            .find(|p| p.name == key)
            .map(|p| &p.value)
    }

    /// Typed lookup; `default` when the key is missing or mistyped.
    #[must_use]
    pub fn parameter<T: FromParam>(&self, key: &str, default: T) -> T {
        self.raw_parameter(key)
            .and_then(T::from_param)
            .unwrap_or(default)
    }

    /// Encode as portable text. See the module docs for the format.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        self.write_text(&mut out);
        out.into_bytes()
    }

    /// Decode a single action from its portable text form.
    ///
    /// # Errors
    ///
    /// Returns [`ActionDecodeError`] if the bytes are not UTF-8, contain
    /// no action, or contain a malformed record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ActionDecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ActionDecodeError::InvalidUtf8)?;
        parse_actions(text)?
            .into_iter()
            .next()
            .ok_or(ActionDecodeError::Empty)
    }

    pub(crate) fn write_text(&self, out: &mut String) {
        out.push_str("action ");
        escape_into(&self.identifier, out);
        out.push_str(&format!(" {} {}\n", self.version, self.category.as_str()));
        if let Some(name) = &self.display_name {
            out.push_str("name ");
            escape_into(name, out);
            out.push('\n');
        }
        for parameter in &self.parameters {
            out.push_str("param ");
            escape_into(&parameter.name, out);
            out.push_str(&format!(" {} ", parameter.value.type_name()));
            parameter.value.encode(out);
            out.push('\n');
        }
        out.push_str("end\n");
    }
}

impl PartialEq for FilterAction {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.version == other.version
            && self.category == other.category
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .all(|p| other.raw_parameter(&p.name) == Some(&p.value))
    }
}

/// Parse every action block in `text`, in order.
pub(crate) fn parse_actions(text: &str) -> Result<Vec<FilterAction>, ActionDecodeError> {
    let mut actions = Vec::new();
    let mut current: Option<FilterAction> = None;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (record, rest) = line.split_once(' ').unwrap_or((line, ""));
        match (record, current.as_mut()) {
            ("action", None) => {
                let mut fields = rest.split(' ');
                let (Some(identifier), Some(version), Some(category), None) =
                    (fields.next(), fields.next(), fields.next(), fields.next())
                else {
                    return Err(ActionDecodeError::malformed(
                        line_no,
                        "expected identifier, version, category",
                    ));
                };
                let identifier =
                    unescape(identifier).map_err(|m| ActionDecodeError::malformed(line_no, m))?;
                let version = version.parse().map_err(|e| {
                    ActionDecodeError::malformed(line_no, format!("bad version: {e}"))
                })?;
                let category = FilterCategory::parse(category).ok_or_else(|| {
                    ActionDecodeError::malformed(line_no, format!("unknown category {category:?}"))
                })?;
                current = Some(FilterAction::new(identifier, version).with_category(category));
            }
            ("name", Some(action)) => {
                action.display_name =
                    Some(unescape(rest).map_err(|m| ActionDecodeError::malformed(line_no, m))?);
            }
            ("param", Some(action)) => {
                let mut fields = rest.splitn(3, ' ');
                let (Some(name), Some(type_name), Some(value)) =
                    (fields.next(), fields.next(), fields.next())
                else {
                    return Err(ActionDecodeError::malformed(line_no, "expected name, type, value"));
                };
                let name = unescape(name).map_err(|m| ActionDecodeError::malformed(line_no, m))?;
                let value = ParamValue::decode(type_name, value)
                    .map_err(|m| ActionDecodeError::malformed(line_no, m))?;
                action.add_parameter(name, value);
            }
            ("end", Some(_)) => {
                if let Some(action) = current.take() {
                    actions.push(action);
                }
            }
            (record, _) => {
                return Err(ActionDecodeError::malformed(
                    line_no,
                    format!("unexpected {record:?} record"),
                ));
            }
        }
    }

    if current.is_some() {
        return Err(ActionDecodeError::malformed(
            text.lines().count(),
            "action block is not terminated by \"end\"",
        ));
    }
    Ok(actions)
}

/// Percent-escape `%`, whitespace, `;`, `,` and control characters.
fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        if ch == '%' || ch == ';' || ch == ',' || ch.is_whitespace() || ch.is_control() {
            let mut buf = [0; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        } else {
            out.push(ch);
        }
    }
}

fn unescape(text: &str) -> Result<String, String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = text
                .get(i + 1..i + 3)
                .ok_or_else(|| format!("truncated escape in {text:?}"))?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| format!("bad escape %{hex}"))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| format!("escaped text {text:?} is not UTF-8"))
}

fn decode_hex(text: &str) -> Result<Vec<u8>, String> {
    if text.len() % 2 != 0 {
        return Err(format!("odd length hex blob ({} digits)", text.len()));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("bad hex byte at offset {i}"))
        })
        .collect()
}

fn decode_list<const N: usize>(text: &str) -> Result<Vec<[i32; N]>, String> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(';')
        .map(|item| {
            let numbers = item
                .split(',')
                .map(|n| n.parse::<i32>().map_err(|e| format!("bad coordinate {n:?}: {e}")))
                .collect::<Result<Vec<_>, _>>()?;
            <[i32; N]>::try_from(numbers)
                .map_err(|v| format!("expected {N} coordinates, found {}", v.len()))
        })
        .collect()
}
