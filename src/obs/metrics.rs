// self
use crate::{
	_prelude::*,
	obs::{FlowKind, FlowOutcome},
};

/// Increments `oauth2_events_flow_total` for `kind` + `outcome` when the `metrics` feature is
/// enabled.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_events_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records the terminal outcome of a finished flow.
pub fn record_flow_result<T>(kind: FlowKind, result: &Result<T>) {
	let outcome = match result {
		Ok(_) => FlowOutcome::Success,
		Err(_) => FlowOutcome::Failure,
	};

	record_flow_outcome(kind, outcome);
}
