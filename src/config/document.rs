use std::{collections::HashSet, fmt, path::Path};

use serde::{
    Deserialize, Deserializer,
    de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor},
};
use serde_json::Value;

use super::Error;

/// The key `toml` uses to smuggle datetimes through `serde`.
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

/// The text format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// JSON
    #[default]
    Json,
    /// TOML
    Toml,
}

impl Format {
    /// Picks the format from a file name: `.toml` files are TOML, everything
    /// else is JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "JSON"),
            Self::Toml => write!(f, "TOML"),
        }
    }
}

/// A parsed configuration document.
///
/// Object fields keep their document order, and repeated field names are
/// kept rather than merged so that flattening can reject them. Array
/// contents are discarded since arrays are never accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// An object, as an ordered list of fields.
    Object(Vec<(String, Document)>),
    /// An array.
    Array,
    /// A string, number, boolean or null.
    Scalar(Value),
}

impl Default for Document {
    fn default() -> Self {
        Self::Object(Vec::new())
    }
}

impl Document {
    /// Parses a JSON document. Blank input is an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the input is not valid JSON.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Self::parse(text, Format::Json)
    }

    /// Parses a TOML document. Blank input is an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the input is not valid TOML.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Self::parse(text, Format::Toml)
    }

    /// Parses a document in the given format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the input is not valid in that format.
    pub fn parse(text: &str, format: Format) -> Result<Self, Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let parse_error = |message: String| Error::Parse { format, message };
        match format {
            Format::Json => serde_json::from_str(text).map_err(|e| parse_error(e.to_string())),
            Format::Toml => toml::from_str(text).map_err(|e| parse_error(e.to_string())),
        }
    }

    /// Flattens the document into `(dotted path, value)` pairs, in document
    /// order.
    ///
    /// Top-level fields produce bare names; nested fields are joined to their
    /// parent with a `.`. A scalar at the root defines nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedNodeType`] if the document contains an array
    /// - [`Error::DuplicatePath`] if two fields flatten to the same path
    pub fn flatten(&self) -> Result<Vec<(String, Value)>, Error> {
        let fields = match self {
            Self::Object(fields) => fields,
            Self::Array => {
                return Err(Error::UnsupportedNodeType {
                    path: String::new(),
                })
            }
            Self::Scalar(_) => return Ok(Vec::new()),
        };

        let mut flattened = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(String::new(), fields.iter())];

        while let Some((prefix, fields)) = stack.last_mut() {
            let Some((name, child)) = fields.next() else {
                stack.pop();
                continue;
            };

            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };

            match child {
                Self::Object(children) => stack.push((path, children.iter())),
                Self::Array => return Err(Error::UnsupportedNodeType { path }),
                Self::Scalar(value) => {
                    if !seen.insert(path.clone()) {
                        return Err(Error::DuplicatePath(path));
                    }
                    flattened.push((path, value.clone()));
                }
            }
        }

        Ok(flattened)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DocumentVisitor)
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = Document;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a configuration document")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Document, E> {
        Ok(Document::Scalar(Value::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Document, E> {
        Ok(Document::Scalar(Value::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Document, E> {
        Ok(Document::Scalar(Value::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Document, E> {
        Ok(Document::Scalar(Value::from(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Document, E> {
        Ok(Document::Scalar(Value::from(v)))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Document, E> {
        Ok(Document::Scalar(Value::String(v)))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Document, E> {
        Ok(Document::Scalar(Value::Null))
    }

    fn visit_none<E: de::Error>(self) -> Result<Document, E> {
        Ok(Document::Scalar(Value::Null))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Document, D::Error> {
        Document::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Document, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Document::Array)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Document, A::Error> {
        let mut fields = Vec::new();

        while let Some(name) = map.next_key::<String>()? {
            if name == TOML_DATETIME_KEY {
                let datetime: String = map.next_value()?;
                return Ok(Document::Scalar(Value::String(datetime)));
            }
            fields.push((name, map.next_value::<Document>()?));
        }

        Ok(Document::Object(fields))
    }
}
