//! Access and refresh token values that never show up in logs.

// self
use crate::_prelude::*;

/// Opaque token value.
///
/// `Debug` and `Display` print a placeholder; [`expose`](Self::expose) is the only way to read
/// the value, so call sites that put it on the wire stay easy to audit.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps `value`.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw value for request construction.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` for an empty or whitespace-only value.
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenSecret(<redacted>)")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn formatting_never_leaks_the_value() {
		let secret = TokenSecret::from(String::from("at-live-123"));

		assert_eq!(format!("{secret:?}"), "TokenSecret(<redacted>)");
		assert_eq!(secret.to_string(), "<redacted>");
		assert_eq!(secret.expose(), "at-live-123");
		assert!(!format!("{:?}", Some(&secret)).contains("at-live"));
	}

	#[test]
	fn blank_values_are_detected() {
		assert!(TokenSecret::new("  ").is_blank());
		assert!(!TokenSecret::new("rt").is_blank());
	}

	#[test]
	fn serializes_as_a_plain_string() {
		let json = serde_json::to_string(&TokenSecret::new("rt")).expect("Secret should serialize.");

		assert_eq!(json, "\"rt\"");
	}
}
