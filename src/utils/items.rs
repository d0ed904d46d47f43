use indexmap::IndexMap;

use crate::protocol::value::Value;
use crate::protocol::value::encoding::{
	decode_labels, decode_properties, encode_labels, encode_properties,
};
use crate::protocol::value_error::ValueError;
use crate::utils::id::{ELEMENT_ID_LEN, ElementId};

/// Insertion-ordered property map with unique keys.
pub type Properties = IndexMap<String, Value>;

/// Builds a [`Properties`] map from `"key" => value` pairs; values go
/// through `Into<Value>`.
#[macro_export]
macro_rules! props {
	() => {
		$crate::utils::items::Properties::new()
	};
	($($key:expr => $value:expr),+ $(,)?) => {{
		let mut map = $crate::utils::items::Properties::new();
		$(
			map.insert(($key).to_string(), $crate::protocol::value::Value::from($value));
		)+
		map
	}};
}

/// A graph node: labels carry set semantics but are stored in insertion
/// order; property keys are unique and iterate in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
	pub id: ElementId,
	pub labels: Vec<String>,
	pub properties: IndexMap<String, Value>,
}

impl Node {
	pub fn new(
		id: ElementId,
		labels: Vec<String>,
		properties: IndexMap<String, Value>,
	) -> Node {
		Self {
			id,
			labels,
			properties,
		}
	}

	#[inline]
	pub fn has_label(&self, label: &str) -> bool {
		self.labels.iter().any(|l| l == label)
	}

	#[inline]
	pub fn get_property(&self, key: &str) -> Option<&Value> {
		self.properties.get(key)
	}

	/// value = `labels` | `properties`
	pub fn encode_into(&self, buf: &mut Vec<u8>) {
		encode_labels(buf, &self.labels);
		encode_properties(buf, &self.properties);
	}

	pub fn from_bytes(id: ElementId, data: &[u8]) -> Result<Node, ValueError> {
		let mut input = data;
		let labels = decode_labels(&mut input)?;
		let properties = decode_properties(&mut input)?;
		Ok(Node {
			id,
			labels,
			properties,
		})
	}
}

/// A graph edge. The endpoint pair is always recorded in order; for
/// undirected edges the direction carries no query semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
	pub id: ElementId,
	pub src: ElementId,
	pub dst: ElementId,
	pub directed: bool,
	pub labels: Vec<String>,
	pub properties: IndexMap<String, Value>,
}

impl Edge {
	pub fn new(
		id: ElementId,
		src: ElementId,
		dst: ElementId,
		directed: bool,
		labels: Vec<String>,
		properties: IndexMap<String, Value>,
	) -> Edge {
		Self {
			id,
			src,
			dst,
			directed,
			labels,
			properties,
		}
	}

	#[inline]
	pub fn has_label(&self, label: &str) -> bool {
		self.labels.iter().any(|l| l == label)
	}

	#[inline]
	pub fn get_property(&self, key: &str) -> Option<&Value> {
		self.properties.get(key)
	}

	/// value = `src(12)` | `dst(12)` | `directed(1)` | `labels` | `properties`
	pub fn encode_into(&self, buf: &mut Vec<u8>) {
		buf.extend_from_slice(self.src.as_bytes());
		buf.extend_from_slice(self.dst.as_bytes());
		buf.push(self.directed as u8);
		encode_labels(buf, &self.labels);
		encode_properties(buf, &self.properties);
	}

	pub fn from_bytes(id: ElementId, data: &[u8]) -> Result<Edge, ValueError> {
		let mut input = data;
		let src = take_id(&mut input)?;
		let dst = take_id(&mut input)?;
		let directed = match take_byte(&mut input)? {
			0 => false,
			1 => true,
			other => return Err(ValueError::InvalidBool(other)),
		};
		let labels = decode_labels(&mut input)?;
		let properties = decode_properties(&mut input)?;
		Ok(Edge {
			id,
			src,
			dst,
			directed,
			labels,
			properties,
		})
	}
}

/// Direction slot of an adjacency entry. The numeric order (`Out` <
/// `Simple` < `In`) is load-bearing: it is the byte that follows the node
/// id in adjacency keys, so contiguous ranges of it select direction
/// slices of one node's neighbourhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Inout {
	Out = 0,
	Simple = 1,
	In = 2,
}

impl Inout {
	#[inline]
	pub fn as_u8(self) -> u8 {
		self as u8
	}

	#[inline]
	pub fn from_u8(byte: u8) -> Option<Inout> {
		match byte {
			0 => Some(Inout::Out),
			1 => Some(Inout::Simple),
			2 => Some(Inout::In),
			_ => None,
		}
	}

	/// `Out` and `In` swap; `Simple` is its own inverse.
	#[inline]
	pub fn inverse(self) -> Inout {
		match self {
			Inout::Out => Inout::In,
			Inout::Simple => Inout::Simple,
			Inout::In => Inout::Out,
		}
	}
}

/// One record of the adjacency index: from `src`, following `edge` in
/// direction `inout`, you reach `dst`. Every entry is matched by exactly
/// one counterpart under [`AdjEntry::reverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjEntry {
	pub src: ElementId,
	pub inout: Inout,
	pub edge: ElementId,
	pub dst: ElementId,
}

impl AdjEntry {
	#[inline]
	pub fn reverse(self) -> AdjEntry {
		AdjEntry {
			src: self.dst,
			inout: self.inout.inverse(),
			edge: self.edge,
			dst: self.src,
		}
	}
}

#[inline]
fn take_id(input: &mut &[u8]) -> Result<ElementId, ValueError> {
	if input.len() < ELEMENT_ID_LEN {
		return Err(ValueError::Truncated {
			wanted: ELEMENT_ID_LEN,
			remaining: input.len(),
		});
	}
	let (head, tail) = input.split_at(ELEMENT_ID_LEN);
	*input = tail;
	Ok(ElementId::from_bytes(head.try_into().unwrap()))
}

#[inline]
fn take_byte(input: &mut &[u8]) -> Result<u8, ValueError> {
	if input.is_empty() {
		return Err(ValueError::Truncated {
			wanted: 1,
			remaining: 0,
		});
	}
	let byte = input[0];
	*input = &input[1..];
	Ok(byte)
}
