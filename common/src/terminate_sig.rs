// Copyright (C) 2023 QuerentAI LLC.
// This file is part of Querent.

// The Licensed Work is licensed under the Business Source License 1.1 (BSL 1.1).
// You may use this file in compliance with the BSL 1.1, subject to the following restrictions:
// 1. You may not use the Licensed Work for AI-related services, database services,
//    or any service or product offering that provides database, big data, or analytics
//    services to third parties unless explicitly authorized by QuerentAI LLC.
// 2. For more details, see the LICENSE file or visit https://mariadb.com/bsl11/.

// For inquiries about alternative licensing arrangements, please contact contact@querent.xyz.

// The Licensed Work is provided "AS IS", WITHOUT WARRANTY OF ANY KIND, express or implied,
// including but not limited to the warranties of merchantability, fitness for a particular purpose,
// and non-infringement. See the Business Source License for more details.

// This software includes code developed by QuerentAI LLC (https://querent.xyz).

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc, Mutex, Weak,
};

use tracing::debug;

/// Ambient cancellation signal handed down to accessors. Killing a parent
/// kills every child, so cancelling a connection aborts all of its
/// in-flight backend calls. Network-facing operations check the signal
/// before and during I/O and bail out with a `Cancelled` error; partial
/// results are never returned.
#[derive(Clone, Default, Debug)]
pub struct TerminateSignal {
	state: Arc<State>,
}

#[derive(Debug)]
struct State {
	alive: AtomicBool,
	children: Mutex<Vec<Weak<State>>>,
}

impl Default for State {
	fn default() -> Self {
		State { alive: AtomicBool::new(true), children: Mutex::default() }
	}
}

impl TerminateSignal {
	pub fn is_alive(&self) -> bool {
		self.state.alive.load(Ordering::Acquire)
	}

	pub fn is_dead(&self) -> bool {
		!self.is_alive()
	}

	pub fn kill(&self) {
		State::kill(&self.state);
	}

	/// Creates a child signal that dies with this one. A child of an
	/// already-dead signal is born dead.
	pub fn child(&self) -> TerminateSignal {
		let child = TerminateSignal::default();
		// Registration and the liveness check share the children lock, so a
		// concurrent kill either sees the child registered or the child sees
		// the kill.
		let mut children = self.state.children.lock().unwrap();
		if self.is_dead() {
			child.state.alive.store(false, Ordering::Release);
		} else {
			children.retain(|weak| weak.strong_count() > 0);
			children.push(Arc::downgrade(&child.state));
		}
		child
	}
}

impl State {
	fn kill(state: &Arc<State>) {
		if state.alive.swap(false, Ordering::AcqRel) {
			debug!("terminate-signal-activated");
			let children: Vec<Weak<State>> =
				state.children.lock().unwrap().drain(..).collect();
			// Cascade outside the lock; each child guards its own subtree.
			for weak in children {
				if let Some(child) = weak.upgrade() {
					State::kill(&child);
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::TerminateSignal;

	#[test]
	fn test_terminate_signal() {
		let signal = TerminateSignal::default();
		assert!(signal.is_alive());
		assert!(!signal.is_dead());
		signal.kill();
		assert!(!signal.is_alive());
		assert!(signal.is_dead());
		signal.kill();
		assert!(signal.is_dead());
	}

	#[test]
	fn test_terminate_signal_child() {
		let signal = TerminateSignal::default();
		let child = signal.child();
		let child2 = signal.child();
		assert!(child.is_alive());
		assert!(child2.is_alive());
		signal.kill();
		assert!(child.is_dead());
		assert!(child2.is_dead());
	}

	#[test]
	fn test_grandchildren_cascade() {
		let signal = TerminateSignal::default();
		let child = signal.child();
		let grandchild = child.child();
		signal.kill();
		assert!(grandchild.is_dead());
	}

	#[test]
	fn test_child_of_dead_signal_is_dead() {
		let signal = TerminateSignal::default();
		signal.kill();
		let child = signal.child();
		assert!(child.is_dead());
	}

	#[test]
	fn test_killing_child_leaves_parent_alive() {
		let signal = TerminateSignal::default();
		let child = signal.child();
		child.kill();
		assert!(child.is_dead());
		assert!(signal.is_alive());
	}

	#[test]
	fn test_dropped_children_are_pruned_on_registration() {
		let signal = TerminateSignal::default();
		for _ in 0..16 {
			let _short_lived = signal.child();
		}
		let survivor = signal.child();
		signal.kill();
		assert!(survivor.is_dead());
	}
}
