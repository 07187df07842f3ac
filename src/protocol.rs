//! Logical frame shapes exchanged with the client and their encodings.
//!
//! Outbound patch frames are `d|<kind>|<root>|<path>|<payload kind>|<base64 payload>`, where `kind` is one of
//! `c`, `u`, `d`, `root` is `doc` or a component id, `path` is the child indices joined by `>` and the payload kind is
//! `t` (text), `h` (raw markup), `g` (tag, as HTML) or `a` (attribute, `name=value` or bare `name` for deletes).
//! Besides those, `s|<session id>` assigns the session and `r|` asks the client to clear the document root before
//! applying the creates that follow.
//!
//! Inbound text frames are JSON, binary frames carry an upload as `<binding id>\n<bytes>`.

use crate::{
	component::BindingId,
	diff::{Diff, DiffKind, Payload},
	error::ProtocolError,
	session::SessionId,
	snapshot,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A transport-level message. Any `Stream`/`Sink` pair of these can be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	Text(String),
	Binary(Vec<u8>),
	Ping(Vec<u8>),
	Pong(Vec<u8>),
	Close,
}

pub const RESET_FRAME: &str = "r|";

#[must_use]
pub fn session_frame(id: &SessionId) -> String {
	format!("s|{}", id)
}

fn kind_char(kind: DiffKind) -> char {
	match kind {
		DiffKind::Create => 'c',
		DiffKind::Update => 'u',
		DiffKind::Delete => 'd',
	}
}

#[must_use]
pub fn encode_diff(diff: &Diff) -> String {
	let node_delete = diff.kind == DiffKind::Delete && !matches!(diff.payload, Payload::Attribute { .. });
	let (payload_kind, payload) = match &diff.payload {
		Payload::Text(text) => ('t', text.clone()),
		Payload::Raw(markup) => ('h', markup.clone()),
		Payload::Tag(tag) => ('g', if node_delete { String::new() } else { snapshot::tag_to_html(tag) }),
		Payload::Attribute { name, value: Some(value) } => ('a', format!("{}={}", name, value)),
		Payload::Attribute { name, value: None } => ('a', name.clone()),
	};
	let payload = if node_delete { String::new() } else { payload };
	let path = diff.path.iter().map(ToString::to_string).collect::<Vec<_>>().join(">");
	format!("d|{}|{}|{}|{}|{}", kind_char(diff.kind), diff.root, path, payload_kind, STANDARD.encode(payload))
}

/// A decoded outbound frame, as a client would see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchFrame {
	Session(String),
	Reset,
	Patch {
		kind: DiffKind,
		root: String,
		path: Vec<usize>,
		payload_kind: char,
		payload: String,
	},
}

impl PatchFrame {
	/// # Errors
	///
	/// Iff `frame` isn't a well-formed outbound frame.
	pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
		let malformed = || ProtocolError::Malformed(frame.to_owned());
		if frame == RESET_FRAME {
			return Ok(PatchFrame::Reset);
		}
		if let Some(id) = frame.strip_prefix("s|") {
			return Ok(PatchFrame::Session(id.to_owned()));
		}
		let fields: Vec<&str> = frame.strip_prefix("d|").ok_or_else(malformed)?.split('|').collect();
		let [kind, root, path, payload_kind, payload] = fields[..] else {
			return Err(malformed());
		};
		let kind = match kind {
			"c" => DiffKind::Create,
			"u" => DiffKind::Update,
			"d" => DiffKind::Delete,
			_ => return Err(malformed()),
		};
		let path = if path.is_empty() {
			Vec::new()
		} else {
			path.split('>').map(str::parse).collect::<Result<_, _>>().map_err(|_| malformed())?
		};
		let payload_kind = match payload_kind {
			"t" => 't',
			"h" => 'h',
			"g" => 'g',
			"a" => 'a',
			_ => return Err(malformed()),
		};
		let payload = STANDARD.decode(payload).map_err(|_| malformed())?;
		let payload = String::from_utf8(payload).map_err(|_| malformed())?;
		Ok(PatchFrame::Patch { kind, root: root.to_owned(), path, payload_kind, payload })
	}
}

/// A DOM event as reported by the client. Field values are normalized to strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
	pub event_type: String,
	pub value: Option<String>,
	pub key: Option<String>,
	pub key_code: Option<u32>,
	pub char_code: Option<u32>,
	pub alt_key: bool,
	pub ctrl_key: bool,
	pub shift_key: bool,
	pub meta_key: bool,
	/// Every field not covered above.
	pub extra: BTreeMap<String, String>,
	/// Binary data uploaded for this event's binding ahead of it.
	pub upload: Option<Vec<u8>>,
}

impl Event {
	pub fn new(event_type: impl Into<String>) -> Self {
		Self { event_type: event_type.into(), ..Self::default() }
	}

	#[must_use]
	pub fn with_value(mut self, value: impl Into<String>) -> Self {
		self.value = Some(value.into());
		self
	}

	fn from_fields(fields: BTreeMap<String, String>) -> Self {
		let mut event = Event::default();
		for (name, value) in fields {
			match name.as_str() {
				"type" => event.event_type = value,
				"value" => event.value = Some(value),
				"key" => event.key = Some(value),
				"keyCode" => event.key_code = value.parse().ok(),
				"charCode" => event.char_code = value.parse().ok(),
				"altKey" => event.alt_key = value == "true",
				"ctrlKey" => event.ctrl_key = value == "true",
				"shiftKey" => event.shift_key = value == "true",
				"metaKey" => event.meta_key = value == "true",
				_ => {
					event.extra.insert(name, value);
				}
			}
		}
		event
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
	Event { ids: Vec<BindingId>, event: Event },
	/// Client-side diagnostics, forwarded to the log.
	Log { fields: BTreeMap<String, String> },
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum InboundKind {
	Event,
	Log,
}

#[derive(Deserialize)]
struct RawInbound {
	#[serde(rename = "type")]
	kind: InboundKind,
	#[serde(default)]
	ids: String,
	#[serde(default)]
	fields: Map<String, Value>,
}

fn normalize(value: Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(text) => text,
		Value::Bool(flag) => flag.to_string(),
		Value::Number(number) => number.to_string(),
		value @ (Value::Array(_) | Value::Object(_)) => value.to_string(),
	}
}

impl Inbound {
	/// # Errors
	///
	/// Iff `text` isn't a recognized JSON frame or names a malformed binding id.
	pub fn parse(text: &str) -> Result<Self, ProtocolError> {
		let raw: RawInbound = serde_json::from_str(text).map_err(|error| ProtocolError::Malformed(error.to_string()))?;
		let fields = raw.fields.into_iter().map(|(name, value)| (name, normalize(value))).collect();
		Ok(match raw.kind {
			InboundKind::Log => Inbound::Log { fields },
			InboundKind::Event => {
				let ids = raw
					.ids
					.split(',')
					.map(str::trim)
					.filter(|id| !id.is_empty())
					.map(|id| BindingId::new(id).map_err(|_| ProtocolError::UnknownBinding(id.to_owned())))
					.collect::<Result<_, _>>()?;
				Inbound::Event { ids, event: Event::from_fields(fields) }
			}
		})
	}
}

/// Splits a binary frame into its binding id header and the uploaded bytes.
///
/// # Errors
///
/// Iff the header is missing or malformed.
pub fn parse_upload(frame: &[u8]) -> Result<(BindingId, Vec<u8>), ProtocolError> {
	let split = frame.iter().position(|&b| b == b'\n').ok_or(ProtocolError::MissingUploadHeader)?;
	let header = core::str::from_utf8(&frame[..split]).map_err(|_| ProtocolError::MissingUploadHeader)?;
	let id = BindingId::new(header.trim()).map_err(|_| ProtocolError::UnknownBinding(header.to_owned()))?;
	Ok((id, frame[split + 1..].to_vec()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::diff::Selector;

	#[test]
	fn text_update_round_trips_through_the_wire_shape() {
		let diff = Diff { root: Selector::Document, path: vec![0, 2], kind: DiffKind::Update, payload: Payload::Text("Count: 1".into()) };
		let frame = encode_diff(&diff);
		assert!(frame.starts_with("d|u|doc|0>2|t|"));
		assert_eq!(
			PatchFrame::parse(&frame).unwrap(),
			PatchFrame::Patch { kind: DiffKind::Update, root: "doc".into(), path: vec![0, 2], payload_kind: 't', payload: "Count: 1".into() }
		);
	}

	#[test]
	fn attribute_delete_is_a_bare_name() {
		let diff = Diff {
			root: Selector::Document,
			path: vec![],
			kind: DiffKind::Delete,
			payload: Payload::Attribute { name: "disabled".into(), value: None },
		};
		let PatchFrame::Patch { payload, payload_kind, .. } = PatchFrame::parse(&encode_diff(&diff)).unwrap() else { panic!() };
		assert_eq!((payload_kind, payload.as_str()), ('a', "disabled"));
	}

	#[test]
	fn inbound_event_normalizes_fields() {
		let inbound = Inbound::parse(r#"{"type":"event","ids":"b1, b2","fields":{"type":"keydown","keyCode":13,"shiftKey":true,"value":null,"x":1.5}}"#).unwrap();
		let Inbound::Event { ids, event } = inbound else { panic!() };
		assert_eq!(ids, vec![BindingId::new("b1").unwrap(), BindingId::new("b2").unwrap()]);
		assert_eq!(event.event_type, "keydown");
		assert_eq!(event.key_code, Some(13));
		assert!(event.shift_key);
		assert_eq!(event.value.as_deref(), Some(""));
		assert_eq!(event.extra.get("x").map(String::as_str), Some("1.5"));
	}

	#[test]
	fn malformed_inbound_is_an_error() {
		assert!(matches!(Inbound::parse("{"), Err(ProtocolError::Malformed(_))));
		assert!(matches!(Inbound::parse(r#"{"type":"other"}"#), Err(ProtocolError::Malformed(_))));
	}

	#[test]
	fn upload_needs_a_header() {
		let (id, bytes) = parse_upload(b"b1\n\x00\x01").unwrap();
		assert_eq!((id.as_str(), bytes.as_slice()), ("b1", &[0, 1][..]));
		assert_eq!(parse_upload(b"nothing"), Err(ProtocolError::MissingUploadHeader));
	}
}
