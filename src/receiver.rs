//! Receivers: declared query and command entry points

use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// A declared entry point whose payloads are registered records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub name: String,
    #[serde(flatten)]
    pub kind: ReceiverKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
}

/// Receiver type and the records it references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReceiverKind {
    /// Request/response: `input` in, `output` back
    #[serde(alias = "method")]
    Query { input: String, output: String },
    /// Fire-and-forget carrying a single `record`
    Command { record: String },
    /// Any type tag this crate does not know
    #[serde(other)]
    Unsupported,
}

impl Receiver {
    pub fn query(
        name: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ReceiverKind::Query {
                input: input.into(),
                output: output.into(),
            },
            description: None,
            deprecated: false,
        }
    }

    pub fn command(name: impl Into<String>, record: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ReceiverKind::Command {
                record: record.into(),
            },
            description: None,
            deprecated: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Records this receiver references, in declaration order
    pub fn referenced_records(&self) -> Vec<&str> {
        match &self.kind {
            ReceiverKind::Query { input, output } => vec![input.as_str(), output.as_str()],
            ReceiverKind::Command { record } => vec![record.as_str()],
            ReceiverKind::Unsupported => Vec::new(),
        }
    }
}

/// Request/reply transport used by an RPC layer built on top of the codec
///
/// Receivers' records travel as encoded bytes: a query's `input` goes out
/// through [`request`](Transporter::request) and its `output` comes back.
pub trait Transporter {
    type Error: std::error::Error;

    fn request(&self, subject: &str, payload: &[u8]) -> Result<Vec<u8>, Self::Error>;

    fn reply(&self, subject: &str, payload: &[u8]) -> Result<(), Self::Error>;
}
