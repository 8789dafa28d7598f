//! Single-flight bookkeeping shared by a manager's callers.
//!
//! One lock guards the cached token, the in-flight marker, and the revocation epoch, so the
//! leader can commit its result, clear the marker, and wake followers in one critical
//! section.

// crates.io
use tokio::sync::watch;
// self
use crate::{_prelude::*, auth::Token};

/// Outcome slot broadcast by the leader; `None` until the refresh finishes.
pub(crate) type Outcome = Option<Result<Token>>;

#[derive(Debug, Default)]
pub(crate) struct ManagerState {
	pub(crate) cached: Option<Token>,
	pub(crate) inflight: Option<Inflight>,
	/// Bumped by every revoke; results of flights started under an older epoch are discarded.
	pub(crate) epoch: u64,
	pub(crate) revoked: bool,
	next_flight: u64,
}
impl ManagerState {
	/// Joins the in-flight refresh or becomes its leader.
	pub(crate) fn join_or_lead(&mut self) -> Role {
		if let Some(inflight) = self.inflight.as_ref() {
			return Role::Follower(inflight.receiver.clone());
		}

		let (sender, receiver) = watch::channel(None);
		let id = self.next_flight;

		self.next_flight += 1;
		self.inflight = Some(Inflight { id, receiver });

		Role::Leader(Flight { id, epoch: self.epoch, sender: Some(sender) })
	}
}

#[derive(Debug)]
pub(crate) struct Inflight {
	id: u64,
	receiver: watch::Receiver<Outcome>,
}

pub(crate) enum Role {
	Leader(Flight),
	Follower(watch::Receiver<Outcome>),
}

/// Leadership of one refresh.
///
/// Dropping an unfinished flight (leader future cancelled) clears the marker and closes the
/// channel so followers elect a new leader.
#[derive(Debug)]
pub(crate) struct Flight {
	id: u64,
	pub(crate) epoch: u64,
	sender: Option<watch::Sender<Outcome>>,
}
impl Flight {
	/// Clears the marker and broadcasts `outcome`; call with the state lock held.
	pub(crate) fn complete(mut self, state: &mut ManagerState, outcome: Result<Token>) {
		release(state, self.id);

		if let Some(sender) = self.sender.take() {
			sender.send_replace(Some(outcome));
		}
	}

	/// Releases the marker without an outcome.
	pub(crate) fn abandon(mut self, state: &Mutex<ManagerState>) {
		release(&mut state.lock(), self.id);
		self.sender.take();
	}

	pub(crate) fn is_pending(&self) -> bool {
		self.sender.is_some()
	}
}

fn release(state: &mut ManagerState, id: u64) {
	if state.inflight.as_ref().is_some_and(|inflight| inflight.id == id) {
		state.inflight = None;
	}
}

/// Guard pairing a [`Flight`] with the state it must clean up on cancellation.
pub(crate) struct FlightGuard<'a> {
	state: &'a Mutex<ManagerState>,
	flight: Option<Flight>,
}
impl<'a> FlightGuard<'a> {
	pub(crate) fn new(state: &'a Mutex<ManagerState>, flight: Flight) -> Self {
		Self { state, flight: Some(flight) }
	}

	pub(crate) fn epoch(&self) -> u64 {
		self.flight.as_ref().map(|flight| flight.epoch).unwrap_or_default()
	}

	pub(crate) fn take(&mut self) -> Option<Flight> {
		self.flight.take()
	}
}
impl Drop for FlightGuard<'_> {
	fn drop(&mut self) {
		if let Some(flight) = self.flight.take().filter(Flight::is_pending) {
			flight.abandon(self.state);
		}
	}
}

/// Waits for the leader's outcome; `None` means the leader went away without one.
pub(crate) async fn wait_for_leader(mut receiver: watch::Receiver<Outcome>) -> Outcome {
	match receiver.wait_for(Option::is_some).await {
		Ok(outcome) => outcome.clone(),
		Err(_) => None,
	}
}
