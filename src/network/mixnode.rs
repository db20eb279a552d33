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

//! Mix node processor. One task per inbound connection runs
//! read -> unmarshal -> MAC check -> delay -> relay or terminate; any
//! failure jumps to drop, which looks identical on the wire to success
//! because nothing is ever written back. Connections are one-shot in both
//! directions.

use std::{
	collections::HashMap,
	net::SocketAddr,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use base64::Engine;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::{
	core::{
		config::MixnodeConfig,
		error::Error,
		sphinx::{self, crypto::PrivateKey, crypto::PublicKey, Unwrapped},
		topology::{MixNodePresence, MixProviderPresence, RegisteredClient, PROVIDER_LAYER},
		wire::{GeneralPacket, PacketFlag},
	},
	network::{
		connection,
		directory::{Directory, MixMetrics},
	},
};

/// Mailbox collaborator a provider node hands terminal payloads to.
/// Storage semantics are external; the processor only routes into it.
pub trait ProviderInbox: Send + Sync + 'static {
	/// Store one delivered message for the client with the given id.
	fn store(&self, client_id: &str, message: Vec<u8>) -> Result<(), Error>;
	/// Clients to announce in the provider's presence record.
	fn registered_clients(&self) -> Vec<RegisteredClient>;
}

#[derive(Default)]
struct Window {
	received: u64,
	sent: HashMap<String, u64>,
}

/// Packet counters. The reporting window is snapshot-and-reset atomically
/// under one mutex, taken only around integer arithmetic; cumulative
/// totals stay readable for observation.
#[derive(Default)]
pub struct Metrics {
	window: Mutex<Window>,
	total_received: AtomicU64,
	total_dropped: AtomicU64,
}

impl Metrics {
	fn note_received(&self) {
		self.total_received.fetch_add(1, Ordering::Relaxed);
		self.window.lock().received += 1;
	}

	fn note_dropped(&self) {
		self.total_dropped.fetch_add(1, Ordering::Relaxed);
	}

	fn note_sent(&self, address: &str) {
		*self.window.lock().sent.entry(address.to_string()).or_insert(0) += 1;
	}

	fn snapshot_and_reset(&self) -> Window {
		std::mem::take(&mut *self.window.lock())
	}

	pub fn received(&self) -> u64 {
		self.total_received.load(Ordering::Relaxed)
	}

	pub fn dropped(&self) -> u64 {
		self.total_dropped.load(Ordering::Relaxed)
	}
}

struct Inner {
	config: MixnodeConfig,
	secret: PrivateKey,
	public: PublicKey,
	/// `host:port` announced to the directory; resolved at bind time so an
	/// ephemeral listen port announces its real value.
	announce_addr: String,
	metrics: Arc<Metrics>,
	directory: Arc<dyn Directory>,
	inbox: Option<Arc<dyn ProviderInbox>>,
}

/// A bound mix node, ready to run.
pub struct Mixnode {
	inner: Arc<Inner>,
	listener: TcpListener,
}

impl Mixnode {
	/// Bind the listening socket. Failure here is fatal at startup.
	pub async fn bind(
		config: MixnodeConfig,
		secret: PrivateKey,
		directory: Arc<dyn Directory>,
		inbox: Option<Arc<dyn ProviderInbox>>,
	) -> Result<Self, Error> {
		let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
		let port = listener.local_addr()?.port();
		let announce_addr = format!("{}:{}", config.host, port);
		let public = PublicKey::from(&secret);
		log::info!(target: "mixnet", "{}: listening on {}", config.id, announce_addr);
		Ok(Self {
			inner: Arc::new(Inner {
				config,
				secret,
				public,
				announce_addr,
				metrics: Arc::new(Metrics::default()),
				directory,
				inbox,
			}),
			listener,
		})
	}

	pub fn local_addr(&self) -> Result<SocketAddr, Error> {
		Ok(self.listener.local_addr()?)
	}

	pub fn public_key(&self) -> PublicKey {
		self.inner.public.clone()
	}

	pub fn metrics(&self) -> Arc<Metrics> {
		self.inner.metrics.clone()
	}

	/// Run the accept loop until the shutdown token fires. Presence and
	/// metrics reporting run on their own periodic tasks.
	pub async fn run(self, shutdown: CancellationToken) {
		let Self { inner, listener } = self;

		tokio::spawn(presence_loop(inner.clone(), shutdown.clone()));
		tokio::spawn(metrics_loop(inner.clone(), shutdown.clone()));

		loop {
			let accepted = tokio::select! {
				_ = shutdown.cancelled() => break,
				accepted = listener.accept() => accepted,
			};
			match accepted {
				Ok((stream, peer)) => {
					log::trace!(target: "mixnet", "{}: connection from {}", inner.config.id, peer);
					let inner = inner.clone();
					let shutdown = shutdown.clone();
					tokio::spawn(async move {
						if let Err(e) = handle_connection(&inner, stream, shutdown).await {
							log::debug!(target: "mixnet", "{}: packet dropped: {}", inner.config.id, e);
						}
					});
				},
				Err(e) => {
					log::error!(target: "mixnet", "{}: accept failed: {}", inner.config.id, e);
				},
			}
		}
		log::info!(target: "mixnet", "{}: shut down", inner.config.id);
	}
}

/// Process one inbound connection: one frame in, nothing out.
async fn handle_connection(
	inner: &Inner,
	mut stream: TcpStream,
	shutdown: CancellationToken,
) -> Result<(), Error> {
	let frame = match tokio::time::timeout(
		inner.config.read_timeout,
		connection::read_frame(&mut stream),
	)
	.await
	{
		Ok(frame) => frame?,
		Err(_) => return Err(Error::Timeout),
	};
	drop(stream);

	match frame.flag() {
		Some(PacketFlag::Comm) => ingest(inner, &frame.data, shutdown).await,
		_ => {
			log::info!(target: "mixnet", "{}: packet flag not recognised, dropped", inner.config.id);
			Err(Error::InvalidFlag)
		},
	}
}

/// Unwrap one Sphinx layer and carry out its routing command.
async fn ingest(inner: &Inner, packet: &[u8], shutdown: CancellationToken) -> Result<(), Error> {
	inner.metrics.note_received();

	let unwrapped = match sphinx::unwrap_packet(&inner.secret, packet) {
		Ok(unwrapped) => unwrapped,
		Err(e) => {
			// MAC and decode failures are indistinguishable from outside.
			inner.metrics.note_dropped();
			return Err(e.into())
		},
	};

	match unwrapped {
		Unwrapped::Forward { next_hop, delay, packet } => {
			tokio::select! {
				_ = shutdown.cancelled() => return Err(Error::Shutdown),
				_ = tokio::time::sleep(delay) => {},
			}
			let frame = GeneralPacket::wrap(PacketFlag::Comm, packet);
			connection::send_one(&next_hop.address, &frame, inner.config.connect_timeout)
				.await?;
			inner.metrics.note_sent(&next_hop.address);
			log::trace!(target: "mixnet", "{}: relayed to {}", inner.config.id, next_hop.address);
		},
		Unwrapped::Deliver { recipient, delay, payload } => {
			tokio::select! {
				_ = shutdown.cancelled() => return Err(Error::Shutdown),
				_ = tokio::time::sleep(delay) => {},
			}
			match &inner.inbox {
				Some(inbox) => {
					inbox.store(&recipient.id, payload)?;
					log::trace!(target: "mixnet", "{}: stored message for {}", inner.config.id, recipient.id);
				},
				None => {
					// Terminal packet at a node with no mailbox: misrouted.
					inner.metrics.note_dropped();
					log::info!(target: "mixnet", "{}: terminal packet but no inbox, dropped", inner.config.id);
				},
			}
		},
	}
	Ok(())
}

async fn presence_loop(inner: Arc<Inner>, shutdown: CancellationToken) {
	let pub_key =
		base64::engine::general_purpose::URL_SAFE.encode(inner.public.as_bytes());
	let mut tick = tokio::time::interval(inner.config.presence_interval);
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => return,
			_ = tick.tick() => {},
		}
		let result = if inner.config.layer == PROVIDER_LAYER {
			let registered_clients = inner
				.inbox
				.as_ref()
				.map(|inbox| inbox.registered_clients())
				.unwrap_or_default();
			inner
				.directory
				.register_provider_presence(MixProviderPresence {
					host: inner.announce_addr.clone(),
					pub_key: pub_key.clone(),
					registered_clients,
					last_seen: 0,
				})
				.await
		} else {
			inner
				.directory
				.register_mix_presence(MixNodePresence {
					host: inner.announce_addr.clone(),
					pub_key: pub_key.clone(),
					layer: inner.config.layer,
					last_seen: 0,
				})
				.await
		};
		if let Err(e) = result {
			log::error!(target: "mixnet", "{}: failed to register presence: {}", inner.config.id, e);
		}
	}
}

async fn metrics_loop(inner: Arc<Inner>, shutdown: CancellationToken) {
	let pub_key =
		base64::engine::general_purpose::URL_SAFE.encode(inner.public.as_bytes());
	let mut tick = tokio::time::interval(inner.config.metrics_interval);
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => return,
			_ = tick.tick() => {},
		}
		let window = inner.metrics.snapshot_and_reset();
		let report = MixMetrics {
			pub_key: pub_key.clone(),
			sent: window.sent,
			received: window.received,
		};
		// Ship asynchronously so a slow directory never stalls the tick.
		let inner = inner.clone();
		tokio::spawn(async move {
			if let Err(e) = inner.directory.post_mix_metrics(report).await {
				log::error!(target: "mixnet", "{}: failed to send metrics: {}", inner.config.id, e);
			}
		});
	}
}
