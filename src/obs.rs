//! Optional observability helpers for token flows and event streams.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_events.flow` with the `flow` and
//!   `stage` (call site) fields, plus `warn` events for retried and non-fatal failures.
//! - Enable `metrics` to increment the `oauth2_events_flow_total` counter for every
//!   attempt/success/failure/retry, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Initial token acquisition.
	Acquire,
	/// Refresh of an expiring or rejected token.
	Refresh,
	/// Token revocation.
	Revoke,
	/// One-shot downscoping exchange.
	Exchange,
	/// User event long-poll stream.
	UserEvents,
	/// Enterprise event polling stream.
	EnterpriseEvents,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Acquire => "acquire",
			FlowKind::Refresh => "refresh",
			FlowKind::Revoke => "revoke",
			FlowKind::Exchange => "exchange",
			FlowKind::UserEvents => "user_events",
			FlowKind::EnterpriseEvents => "enterprise_events",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Failure that will be retried.
	Retry,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Retry => "retry",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
