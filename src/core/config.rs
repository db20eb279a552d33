// Copyright 2022 Parity Technologies (UK) Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Mixnet configuration. All values are immutable once a node or scheduler
//! is constructed; runtime rate changes go through the typed
//! [`TrafficRates`] channel, never through shared mutable state.

use std::time::Duration;

/// Default TCP connect/read deadline.
const DEFAULT_NET_TIMEOUT: Duration = Duration::from_secs(5);

/// Poisson rates (events per second) of the client traffic streams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficRates {
	/// Send pump rate. The externally observable emission rate on the
	/// egress socket whether or not real traffic is present.
	pub message_sending: f64,
	/// Loop cover stream rate.
	pub loop_cover: f64,
	/// Drop cover stream rate.
	pub drop_cover: f64,
	/// Mailbox fetch rate.
	pub fetch: f64,
}

impl TrafficRates {
	pub fn validate(&self) -> bool {
		let all = [self.message_sending, self.loop_cover, self.drop_cover, self.fetch];
		all.iter().all(|r| r.is_finite() && *r > 0.0)
	}
}

impl Default for TrafficRates {
	fn default() -> Self {
		Self { message_sending: 10.0, loop_cover: 10.0, drop_cover: 1.0, fetch: 10.0 }
	}
}

/// Configuration for the client traffic scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
	/// Initial stream rates.
	pub rates: TrafficRates,
	/// Substitute a loop cover packet when the send pump finds the queue
	/// empty. Disabling this leaks traffic volume; explicit opt-out only.
	pub rate_compliant_cover: bool,
	/// Mean of the per-hop delay drawn for each hop of an authored packet.
	pub average_hop_delay: Duration,
	/// Number of interior mix layers a route traverses.
	pub num_mix_hops: usize,
	/// Pause between registration attempts until the provider answers.
	pub registration_retry: Duration,
	/// Age beyond which the cached network view is refreshed before a send.
	pub topology_max_age: Duration,
	/// Capacity of the real-traffic outgoing queue.
	pub out_queue_capacity: usize,
	/// TCP dial deadline.
	pub connect_timeout: Duration,
	/// TCP read deadline.
	pub read_timeout: Duration,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			rates: TrafficRates::default(),
			rate_compliant_cover: true,
			average_hop_delay: Duration::from_millis(100),
			num_mix_hops: 3,
			registration_retry: Duration::from_secs(5),
			topology_max_age: Duration::from_secs(60),
			out_queue_capacity: 1024,
			connect_timeout: DEFAULT_NET_TIMEOUT,
			read_timeout: DEFAULT_NET_TIMEOUT,
		}
	}
}

/// Configuration for a mix node processor.
#[derive(Debug, Clone)]
pub struct MixnodeConfig {
	/// Identifier published in the topology.
	pub id: String,
	/// Host to listen on and to announce.
	pub host: String,
	/// Port to listen on; 0 binds an ephemeral port.
	pub port: u16,
	/// Interior mix layer this node serves, or the provider sentinel.
	pub layer: u64,
	/// Period of the presence announcement.
	pub presence_interval: Duration,
	/// Period of the metrics snapshot.
	pub metrics_interval: Duration,
	/// TCP dial deadline for relayed packets.
	pub connect_timeout: Duration,
	/// TCP read deadline for inbound frames.
	pub read_timeout: Duration,
}

impl MixnodeConfig {
	pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16, layer: u64) -> Self {
		Self {
			id: id.into(),
			host: host.into(),
			port,
			layer,
			presence_interval: Duration::from_secs(2),
			metrics_interval: Duration::from_secs(1),
			connect_timeout: DEFAULT_NET_TIMEOUT,
			read_timeout: DEFAULT_NET_TIMEOUT,
		}
	}
}
