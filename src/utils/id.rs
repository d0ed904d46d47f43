use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use thiserror::Error;

/// Number of bytes in an encoded element id.
pub const ELEMENT_ID_LEN: usize = 12;

/// Opaque 96-bit identifier for nodes and edges.
///
/// Generated uniformly at random at insert time and never reused; two
/// entities with distinct lifetimes share an id only by random collision,
/// which is treated as negligible rather than prevented.
///
/// Encoded as 12 big-endian bytes on disk and rendered as 16 base64url
/// characters for display.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId([u8; ELEMENT_ID_LEN]);

#[derive(Debug, Error)]
#[error("malformed element id: {0:?}")]
pub struct ParseElementIdError(String);

impl ElementId {
	/// Generates a fresh id from the thread-local RNG.
	pub fn random() -> Self {
		Self(rand::random())
	}

	#[must_use]
	#[inline(always)]
	pub const fn from_bytes(bytes: [u8; ELEMENT_ID_LEN]) -> Self {
		Self(bytes)
	}

	#[must_use]
	#[inline(always)]
	pub const fn as_bytes(&self) -> &[u8; ELEMENT_ID_LEN] {
		&self.0
	}

	#[must_use]
	#[inline(always)]
	pub const fn to_bytes(self) -> [u8; ELEMENT_ID_LEN] {
		self.0
	}

	/// Reads an id from the front of a key or value slice.
	#[inline]
	pub fn from_slice(slice: &[u8]) -> Option<Self> {
		let bytes: [u8; ELEMENT_ID_LEN] = slice.get(..ELEMENT_ID_LEN)?.try_into().ok()?;
		Some(Self(bytes))
	}
}

impl fmt::Display for ElementId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		// 12 bytes encode to exactly 16 characters without padding
		f.write_str(&URL_SAFE_NO_PAD.encode(self.0))
	}
}

impl fmt::Debug for ElementId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "ElementId({self})")
	}
}

impl FromStr for ElementId {
	type Err = ParseElementIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let decoded = URL_SAFE_NO_PAD
			.decode(s)
			.map_err(|_| ParseElementIdError(s.to_string()))?;
		let bytes: [u8; ELEMENT_ID_LEN] = decoded
			.try_into()
			.map_err(|_| ParseElementIdError(s.to_string()))?;
		Ok(Self(bytes))
	}
}
