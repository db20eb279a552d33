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

//! Shared helpers for the integration tests: an in-memory directory, a
//! scripted provider endpoint, and loopback network assembly.

#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use base64::Engine;
use parking_lot::{Mutex, RwLock};
use prost::Message;
use tokio::net::TcpListener;

use loopix_mixnet::{
	core::{
		sphinx::{crypto::PrivateKey, unwrap_packet, Unwrapped},
		topology::{
			MixNodePresence, MixProviderPresence, MixnodeDescriptor, RegisteredClient,
			TopologyDocument,
		},
		wire::{GeneralPacket, PacketFlag, PullRequest},
	},
	generate_keypair, ClientAddress, Directory, Error, PublicKey, PROVIDER_LAYER,
};

pub fn init_logging() {
	let _ = env_logger::try_init();
}

pub fn b64(key: &PublicKey) -> String {
	base64::engine::general_purpose::URL_SAFE.encode(key.as_bytes())
}

/// In-memory directory collaborator. The document can be swapped at any
/// point to simulate topology churn.
#[derive(Default)]
pub struct MockDirectory {
	doc: RwLock<TopologyDocument>,
	pub presence_posts: Mutex<Vec<String>>,
	pub metric_posts: Mutex<u64>,
}

impl MockDirectory {
	pub fn set_document(&self, doc: TopologyDocument) {
		*self.doc.write() = doc;
	}
}

#[async_trait::async_trait]
impl Directory for MockDirectory {
	async fn topology(&self) -> Result<TopologyDocument, Error> {
		Ok(self.doc.read().clone())
	}

	async fn register_mix_presence(&self, presence: MixNodePresence) -> Result<(), Error> {
		self.presence_posts.lock().push(presence.host);
		Ok(())
	}

	async fn register_provider_presence(
		&self,
		presence: MixProviderPresence,
	) -> Result<(), Error> {
		self.presence_posts.lock().push(presence.host);
		Ok(())
	}

	async fn post_mix_metrics(
		&self,
		_metrics: loopix_mixnet::network::MixMetrics,
	) -> Result<(), Error> {
		*self.metric_posts.lock() += 1;
		Ok(())
	}
}

/// A keypair plus the descriptor other parties see.
pub struct TestNode {
	pub descriptor: MixnodeDescriptor,
	pub secret: PrivateKey,
}

pub fn test_node(id: &str, host: &str, port: u16, layer: u64) -> TestNode {
	let (secret, public) = generate_keypair(&mut rand::rngs::OsRng);
	TestNode {
		descriptor: MixnodeDescriptor {
			id: id.to_string(),
			host: host.to_string(),
			port: port.to_string(),
			pub_key: public,
			layer,
		},
		secret,
	}
}

pub fn client_address(id: &str, provider: &MixnodeDescriptor) -> (ClientAddress, PrivateKey) {
	let (secret, public) = generate_keypair(&mut rand::rngs::OsRng);
	(
		ClientAddress {
			id: id.to_string(),
			host: "0.0.0.0".into(),
			port: "42".into(),
			pub_key: public,
			provider: provider.clone(),
		},
		secret,
	)
}

/// Build the directory document matching a provider and a set of interior
/// mixes, with the given clients registered at the provider.
pub fn document_for(
	provider: &MixnodeDescriptor,
	mixes: &[&MixnodeDescriptor],
	clients: &[&ClientAddress],
) -> TopologyDocument {
	let mut doc = TopologyDocument::default();
	for mix in mixes {
		doc.mix_nodes.insert(
			mix.id.clone(),
			MixNodePresence {
				host: mix.address(),
				pub_key: b64(&mix.pub_key),
				layer: mix.layer,
				last_seen: 0,
			},
		);
	}
	doc.mix_provider_nodes.insert(
		provider.id.clone(),
		MixProviderPresence {
			host: provider.address(),
			pub_key: b64(&provider.pub_key),
			registered_clients: clients
				.iter()
				.map(|c| RegisteredClient { host: "0.0.0.0:42".into(), pub_key: b64(&c.pub_key) })
				.collect(),
			last_seen: 0,
		},
	);
	doc
}

/// Unwrap a COMM payload through the given chain of secrets and return the
/// terminal plaintext.
pub fn unwrap_chain(secrets: &[&PrivateKey], packet: &[u8]) -> Vec<u8> {
	let mut packet = packet.to_vec();
	for (i, secret) in secrets.iter().enumerate() {
		match unwrap_packet(secret, &packet).unwrap() {
			Unwrapped::Forward { packet: next, .. } => {
				assert!(i < secrets.len() - 1, "relay flag at terminal hop");
				packet = next;
			},
			Unwrapped::Deliver { payload, .. } => {
				assert_eq!(i, secrets.len() - 1, "last hop flag mid-path");
				return payload
			},
		}
	}
	panic!("chain ended without delivery");
}

/// What a scripted provider observed, by flag.
#[derive(Default)]
pub struct ProviderLog {
	/// Sphinx packet bytes from COMM frames.
	pub comm: Vec<Vec<u8>>,
	/// Decoded PULL requests.
	pub pulls: Vec<PullRequest>,
	/// Raw ASSIGN payloads.
	pub assigns: Vec<Vec<u8>>,
}

/// Minimal provider endpoint honoring the wire contract: ASSIGN is
/// answered with a fixed TOKEN, COMM and PULL are recorded. The mailbox
/// semantics themselves stay out of scope.
pub struct ScriptedProvider {
	pub address: String,
	pub log: Arc<Mutex<ProviderLog>>,
}

impl ScriptedProvider {
	pub async fn spawn(token: Vec<u8>) -> ScriptedProvider {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let address = listener.local_addr().unwrap().to_string();
		let log: Arc<Mutex<ProviderLog>> = Arc::default();
		let task_log = log.clone();
		tokio::spawn(async move {
			loop {
				let Ok((mut stream, _)) = listener.accept().await else { break };
				let token = token.clone();
				let log = task_log.clone();
				tokio::spawn(async move {
					use tokio::io::{AsyncReadExt, AsyncWriteExt};
					let mut buf = Vec::new();
					// One-shot exchange: the peer half-closes after the
					// request, so read to EOF then answer.
					let mut chunk = [0u8; 4096];
					loop {
						match stream.read(&mut chunk).await {
							Ok(0) => break,
							Ok(n) => {
								buf.extend_from_slice(&chunk[..n]);
								if frame_complete(&buf) {
									break
								}
							},
							Err(_) => return,
						}
					}
					let Some(packet) = decode_frame(&buf) else { return };
					match packet.flag() {
						Some(PacketFlag::Assign) => {
							log.lock().assigns.push(packet.data);
							let reply = GeneralPacket::wrap(PacketFlag::Token, token);
							let _ = stream
								.write_all(&reply.encode_length_delimited_to_vec())
								.await;
						},
						Some(PacketFlag::Comm) => {
							log.lock().comm.push(packet.data);
						},
						Some(PacketFlag::Pull) => {
							if let Ok(pull) = PullRequest::decode(packet.data.as_slice()) {
								log.lock().pulls.push(pull);
							}
						},
						_ => {},
					}
					let _ = stream.shutdown().await;
				});
			}
		});
		ScriptedProvider { address, log }
	}
}

fn frame_complete(buf: &[u8]) -> bool {
	decode_frame(buf).is_some()
}

fn decode_frame(buf: &[u8]) -> Option<GeneralPacket> {
	GeneralPacket::decode_length_delimited(buf).ok()
}

/// Poll until `condition` holds or the deadline passes.
pub async fn wait_until(
	deadline: std::time::Duration,
	mut condition: impl FnMut() -> bool,
) -> bool {
	let start = std::time::Instant::now();
	while start.elapsed() < deadline {
		if condition() {
			return true
		}
		tokio::time::sleep(std::time::Duration::from_millis(25)).await;
	}
	condition()
}

/// Descriptor pointing at a bound mixnode listener.
pub fn descriptor_for(
	id: &str,
	addr: std::net::SocketAddr,
	public: &PublicKey,
	layer: u64,
) -> MixnodeDescriptor {
	MixnodeDescriptor {
		id: id.to_string(),
		host: addr.ip().to_string(),
		port: addr.port().to_string(),
		pub_key: public.clone(),
		layer,
	}
}

/// Providers use the sentinel layer.
pub fn provider_layer() -> u64 {
	PROVIDER_LAYER
}

/// Map of stored inbox messages keyed by client id.
pub type InboxStore = Arc<Mutex<HashMap<String, Vec<Vec<u8>>>>>;

/// Trivial in-memory inbox collaborator.
pub struct TestInbox {
	pub store: InboxStore,
	pub clients: Vec<RegisteredClient>,
}

impl loopix_mixnet::ProviderInbox for TestInbox {
	fn store(&self, client_id: &str, message: Vec<u8>) -> Result<(), Error> {
		self.store.lock().entry(client_id.to_string()).or_default().push(message);
		Ok(())
	}

	fn registered_clients(&self) -> Vec<RegisteredClient> {
		self.clients.clone()
	}
}
