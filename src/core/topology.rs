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

//! Mixnet topology: node descriptors, the client-side cached network view,
//! and route selection over it. Views are immutable snapshots; a refresh
//! replaces the whole structure, never mutates it in place.

use std::{
	collections::HashMap,
	time::{Duration, Instant},
};

use base64::Engine;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

use crate::core::{
	error::Error,
	sphinx::{crypto::PublicKey, Destination, PathHop},
	wire::{ClientRecord, MixRecord},
};

/// Sentinel layer denoting provider nodes in the topology.
pub const PROVIDER_LAYER: u64 = 1_000_000;

/// Listening address published for topology-derived clients. Clients are
/// reached through their provider's mailbox, so the address is nominal.
const DEFAULT_CLIENT_HOST: &str = "0.0.0.0";
const DEFAULT_CLIENT_PORT: &str = "42";

/// Immutable public snapshot of a mix or provider node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixnodeDescriptor {
	pub id: String,
	pub host: String,
	pub port: String,
	pub pub_key: PublicKey,
	pub layer: u64,
}

impl MixnodeDescriptor {
	pub fn address(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}

	pub fn to_path_hop(&self) -> PathHop {
		PathHop { id: self.id.clone(), address: self.address(), public_key: self.pub_key.clone() }
	}

	pub fn to_record(&self) -> MixRecord {
		MixRecord {
			id: self.id.clone(),
			host: self.host.clone(),
			port: self.port.clone(),
			pub_key: self.pub_key.to_vec(),
			layer: self.layer,
		}
	}

	pub fn from_record(record: &MixRecord) -> Result<Self, Error> {
		Ok(Self {
			id: record.id.clone(),
			host: record.host.clone(),
			port: record.port.clone(),
			pub_key: PublicKey::try_from_slice(&record.pub_key)?,
			layer: record.layer,
		})
	}
}

/// Public address of a client, including the provider fronting its mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress {
	pub id: String,
	pub host: String,
	pub port: String,
	pub pub_key: PublicKey,
	pub provider: MixnodeDescriptor,
}

impl ClientAddress {
	/// Two clients share a provider iff the provider key bytes are equal.
	pub fn shares_provider(&self, other: &ClientAddress) -> bool {
		self.provider.pub_key == other.provider.pub_key
	}

	pub fn destination(&self) -> Destination {
		Destination { id: self.id.clone(), address: format!("{}:{}", self.host, self.port) }
	}

	pub fn to_record(&self) -> ClientRecord {
		ClientRecord {
			id: self.id.clone(),
			host: self.host.clone(),
			port: self.port.clone(),
			pub_key: self.pub_key.to_vec(),
			provider: Some(self.provider.to_record()),
		}
	}
}

/// A full route from the sender's provider to the recipient, prior to
/// header encryption: `[ingress, mix_1 … mix_L, egress]` plus the terminal
/// recipient.
#[derive(Clone)]
pub struct RoutePath {
	pub ingress: MixnodeDescriptor,
	pub mixes: Vec<MixnodeDescriptor>,
	pub egress: MixnodeDescriptor,
	pub recipient: ClientAddress,
}

impl RoutePath {
	/// Number of processing hops, `L + 2`.
	pub fn num_hops(&self) -> usize {
		self.mixes.len() + 2
	}

	pub fn hops(&self) -> Vec<PathHop> {
		let mut hops = Vec::with_capacity(self.num_hops());
		hops.push(self.ingress.to_path_hop());
		hops.extend(self.mixes.iter().map(MixnodeDescriptor::to_path_hop));
		hops.push(self.egress.to_path_hop());
		hops
	}

	pub fn destination(&self) -> Destination {
		self.recipient.destination()
	}
}

////////////////////////////////////////////////////////////////////////////////
// Directory document models
////////////////////////////////////////////////////////////////////////////////

/// `GET /api/presence/topology` response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyDocument {
	#[serde(rename = "MixNodes", default)]
	pub mix_nodes: HashMap<String, MixNodePresence>,
	#[serde(rename = "MixProviderNodes", default)]
	pub mix_provider_nodes: HashMap<String, MixProviderPresence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixNodePresence {
	/// `ip:port`.
	pub host: String,
	/// base64url-encoded public key.
	pub pub_key: String,
	pub layer: u64,
	#[serde(default)]
	pub last_seen: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixProviderPresence {
	pub host: String,
	pub pub_key: String,
	#[serde(default)]
	pub registered_clients: Vec<RegisteredClient>,
	#[serde(default)]
	pub last_seen: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredClient {
	pub host: String,
	pub pub_key: String,
}

fn decode_key(b64: &str) -> Option<PublicKey> {
	let bytes = base64::engine::general_purpose::URL_SAFE.decode(b64).ok()?;
	PublicKey::try_from_slice(&bytes).ok()
}

fn split_host_port(host: &str) -> Option<(String, String)> {
	let (h, p) = host.rsplit_once(':')?;
	if h.is_empty() || p.is_empty() {
		return None
	}
	Some((h.to_string(), p.to_string()))
}

impl MixProviderPresence {
	pub fn to_descriptor(&self) -> Option<MixnodeDescriptor> {
		let pub_key = decode_key(&self.pub_key)?;
		let (host, port) = split_host_port(&self.host)?;
		Some(MixnodeDescriptor { id: self.pub_key.clone(), host, port, pub_key, layer: PROVIDER_LAYER })
	}
}

////////////////////////////////////////////////////////////////////////////////
// Network view
////////////////////////////////////////////////////////////////////////////////

/// Client-side cached topology. Constructed from a directory document and
/// swapped atomically on refresh.
pub struct NetworkView {
	/// Interior mixes grouped by layer.
	pub mixes: HashMap<u64, Vec<MixnodeDescriptor>>,
	/// All registered clients, with their providers attached.
	pub clients: Vec<ClientAddress>,
	/// All known providers.
	pub providers: Vec<MixnodeDescriptor>,
	/// When the view was built; `None` until the first refresh succeeds.
	pub last_updated: Option<Instant>,
}

impl NetworkView {
	/// An empty view, stale from the start.
	pub fn empty() -> Self {
		Self {
			mixes: HashMap::new(),
			clients: Vec::new(),
			providers: Vec::new(),
			last_updated: None,
		}
	}

	/// Build a view from a directory document. Entries with malformed keys
	/// or addresses are skipped, as the directory is not a trusted input.
	pub fn from_document(doc: &TopologyDocument) -> Self {
		let mut mixes: HashMap<u64, Vec<MixnodeDescriptor>> = HashMap::new();
		for presence in doc.mix_nodes.values() {
			let Some(pub_key) = decode_key(&presence.pub_key) else { continue };
			let Some((host, port)) = split_host_port(&presence.host) else { continue };
			mixes.entry(presence.layer).or_default().push(MixnodeDescriptor {
				id: presence.pub_key.clone(),
				host,
				port,
				pub_key,
				layer: presence.layer,
			});
		}

		let mut providers = Vec::new();
		let mut clients = Vec::new();
		for presence in doc.mix_provider_nodes.values() {
			let Some(provider) = presence.to_descriptor() else { continue };
			for client in &presence.registered_clients {
				let Some(pub_key) = decode_key(&client.pub_key) else { continue };
				clients.push(ClientAddress {
					id: client.pub_key.clone(),
					host: DEFAULT_CLIENT_HOST.to_string(),
					port: DEFAULT_CLIENT_PORT.to_string(),
					pub_key,
					provider: provider.clone(),
				});
			}
			providers.push(provider);
		}

		Self { mixes, clients, providers, last_updated: Some(Instant::now()) }
	}

	/// True once the view is older than `max_age`.
	pub fn should_refresh(&self, max_age: Duration) -> bool {
		self.last_updated.map_or(true, |at| at.elapsed() > max_age)
	}

	/// One random mix per interior layer `1..=num_hops`, in layer order.
	pub fn random_mix_sequence(
		&self,
		rng: &mut (impl Rng + CryptoRng),
		num_hops: usize,
	) -> Result<Vec<MixnodeDescriptor>, Error> {
		let mut sequence = Vec::with_capacity(num_hops);
		for layer in 1..=num_hops as u64 {
			let candidates =
				self.mixes.get(&layer).filter(|m| !m.is_empty()).ok_or(Error::NoRoute(
					"no active mixes for layer",
				))?;
			sequence.push(candidates[rng.gen_range(0..candidates.len())].clone());
		}
		Ok(sequence)
	}

	/// Uniformly random registered client, used as drop-cover recipient.
	pub fn random_client(&self, rng: &mut (impl Rng + CryptoRng)) -> Option<&ClientAddress> {
		if self.clients.is_empty() {
			return None
		}
		Some(&self.clients[rng.gen_range(0..self.clients.len())])
	}

	/// Build a route from `ingress` to `recipient` through one mix per layer.
	pub fn random_route(
		&self,
		rng: &mut (impl Rng + CryptoRng),
		ingress: &MixnodeDescriptor,
		recipient: &ClientAddress,
		num_hops: usize,
	) -> Result<RoutePath, Error> {
		let mixes = self.random_mix_sequence(rng, num_hops)?;
		Ok(RoutePath {
			ingress: ingress.clone(),
			mixes,
			egress: recipient.provider.clone(),
			recipient: recipient.clone(),
		})
	}
}
