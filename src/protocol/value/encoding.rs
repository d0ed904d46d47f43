//! Canonical binary encoding for values, label sets, and property maps.
//!
//! One tag byte followed by a big-endian payload:
//!
//! | tag | variant  | payload                                |
//! | --- | -------- | -------------------------------------- |
//! | 1   | string   | `len(u32 BE)` then raw bytes           |
//! | 2   | int64    | 8 bytes, big-endian two's complement   |
//! | 3   | float64  | IEEE-754 bits as u64, big-endian       |
//! | 4   | node_ref | 12-byte element id                     |
//! | 5   | edge_ref | 12-byte element id                     |
//! | 6   | id       | 12-byte element id                     |
//! | 7   | bool     | one byte, 0 or 1                       |
//! | 8   | null     | empty                                  |
//!
//! Label sets and property maps are prefixed with a `u32 BE` count and
//! written in insertion order. Decoding is strict: an unknown tag is
//! `InvalidValueTag` and truncated input is corruption.

use indexmap::IndexMap;

use crate::protocol::value::Value;
use crate::protocol::value_error::ValueError;
use crate::utils::id::{ELEMENT_ID_LEN, ElementId};

pub const TAG_STRING: u8 = 1;
pub const TAG_I64: u8 = 2;
pub const TAG_F64: u8 = 3;
pub const TAG_NODE_REF: u8 = 4;
pub const TAG_EDGE_REF: u8 = 5;
pub const TAG_ID: u8 = 6;
pub const TAG_BOOL: u8 = 7;
pub const TAG_NULL: u8 = 8;

pub fn encode_value(buf: &mut Vec<u8>, value: &Value) {
	match value {
		Value::String(s) => {
			buf.push(TAG_STRING);
			encode_bytes(buf, s.as_bytes());
		}
		Value::I64(i) => {
			buf.push(TAG_I64);
			buf.extend_from_slice(&i.to_be_bytes());
		}
		Value::F64(f) => {
			buf.push(TAG_F64);
			buf.extend_from_slice(&f.to_bits().to_be_bytes());
		}
		Value::NodeRef(id) => {
			buf.push(TAG_NODE_REF);
			buf.extend_from_slice(id.as_bytes());
		}
		Value::EdgeRef(id) => {
			buf.push(TAG_EDGE_REF);
			buf.extend_from_slice(id.as_bytes());
		}
		Value::Id(id) => {
			buf.push(TAG_ID);
			buf.extend_from_slice(id.as_bytes());
		}
		Value::Boolean(b) => {
			buf.push(TAG_BOOL);
			buf.push(*b as u8);
		}
		Value::Empty => buf.push(TAG_NULL),
	}
}

pub fn decode_value(input: &mut &[u8]) -> Result<Value, ValueError> {
	let tag = take(input, 1)?[0];
	match tag {
		TAG_STRING => Ok(Value::String(decode_string(input, "string value")?)),
		TAG_I64 => {
			let raw = take(input, 8)?;
			Ok(Value::I64(i64::from_be_bytes(raw.try_into().unwrap())))
		}
		TAG_F64 => {
			let raw = take(input, 8)?;
			Ok(Value::F64(f64::from_bits(u64::from_be_bytes(
				raw.try_into().unwrap(),
			))))
		}
		TAG_NODE_REF => Ok(Value::NodeRef(decode_id(input)?)),
		TAG_EDGE_REF => Ok(Value::EdgeRef(decode_id(input)?)),
		TAG_ID => Ok(Value::Id(decode_id(input)?)),
		TAG_BOOL => match take(input, 1)?[0] {
			0 => Ok(Value::Boolean(false)),
			1 => Ok(Value::Boolean(true)),
			other => Err(ValueError::InvalidBool(other)),
		},
		TAG_NULL => Ok(Value::Empty),
		other => Err(ValueError::InvalidValueTag(other)),
	}
}

pub fn encode_labels(buf: &mut Vec<u8>, labels: &[String]) {
	buf.extend_from_slice(&(labels.len() as u32).to_be_bytes());
	for label in labels {
		encode_bytes(buf, label.as_bytes());
	}
}

pub fn decode_labels(input: &mut &[u8]) -> Result<Vec<String>, ValueError> {
	let count = decode_u32(input)? as usize;
	let mut labels = Vec::with_capacity(count.min(MAX_PREALLOC));
	for _ in 0..count {
		labels.push(decode_string(input, "label")?);
	}
	Ok(labels)
}

pub fn encode_properties(buf: &mut Vec<u8>, properties: &IndexMap<String, Value>) {
	buf.extend_from_slice(&(properties.len() as u32).to_be_bytes());
	for (key, value) in properties {
		encode_bytes(buf, key.as_bytes());
		encode_value(buf, value);
	}
}

pub fn decode_properties(input: &mut &[u8]) -> Result<IndexMap<String, Value>, ValueError> {
	let count = decode_u32(input)? as usize;
	let mut properties = IndexMap::with_capacity(count.min(MAX_PREALLOC));
	for _ in 0..count {
		let key = decode_string(input, "property key")?;
		let value = decode_value(input)?;
		properties.insert(key, value);
	}
	Ok(properties)
}

// Corrupt counts must not translate into huge up-front allocations.
const MAX_PREALLOC: usize = 1024;

#[inline]
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
	buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
	buf.extend_from_slice(bytes);
}

#[inline]
fn decode_string(input: &mut &[u8], what: &'static str) -> Result<String, ValueError> {
	let len = decode_u32(input)? as usize;
	let raw = take(input, len)?;
	String::from_utf8(raw.to_vec()).map_err(|_| ValueError::InvalidUtf8 { what })
}

#[inline]
fn decode_u32(input: &mut &[u8]) -> Result<u32, ValueError> {
	let raw = take(input, 4)?;
	Ok(u32::from_be_bytes(raw.try_into().unwrap()))
}

#[inline]
fn decode_id(input: &mut &[u8]) -> Result<ElementId, ValueError> {
	let raw = take(input, ELEMENT_ID_LEN)?;
	Ok(ElementId::from_bytes(raw.try_into().unwrap()))
}

#[inline]
fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], ValueError> {
	if input.len() < n {
		return Err(ValueError::Truncated {
			wanted: n,
			remaining: input.len(),
		});
	}
	let (head, tail) = input.split_at(n);
	*input = tail;
	Ok(head)
}
