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

//! Client traffic scheduler.
//!
//! Four independent Poisson-paced streams feed the ingress provider: the
//! send pump draining the real-traffic queue (substituting loop cover when
//! it is empty), the loop cover stream, the drop cover stream, and the
//! mailbox fetch stream. Each runs on its own task and never blocks on the
//! others; the observable emission rate of the pump stays Poisson whether
//! or not real traffic is present. Packets are never coalesced, batched or
//! reordered.

use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

use parking_lot::RwLock;
use prost::Message;
use rand::thread_rng;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
	core::{
		config::{SchedulerConfig, TrafficRates},
		cover::{self, CoverKind},
		delay::poisson_interval,
		error::Error,
		topology::{ClientAddress, NetworkView},
		wire::{GeneralPacket, PacketFlag, PullRequest},
	},
	network::{connection, directory::Directory},
};

/// Pause between barrier polls while the view has no clients yet.
const BARRIER_POLL: std::time::Duration = std::time::Duration::from_secs(2);

/// Counters for the outbound streams. Purely observational.
#[derive(Default)]
pub struct ClientMetrics {
	pub real_sent: AtomicU64,
	pub cover_sent: AtomicU64,
	pub fetches: AtomicU64,
}

struct Shared {
	config: SchedulerConfig,
	/// This client's own public address, provider attached.
	address: ClientAddress,
	view: RwLock<NetworkView>,
	directory: Arc<dyn Directory>,
	metrics: ClientMetrics,
}

impl Shared {
	fn provider_addr(&self) -> String {
		self.address.provider.address()
	}

	/// Refresh the cached view if it has gone stale. Failures log and
	/// leave the stale view in place; sending is never blocked on the
	/// directory.
	async fn maybe_refresh_view(&self) {
		if !self.view.read().should_refresh(self.config.topology_max_age) {
			return
		}
		match self.directory.topology().await {
			Ok(doc) => {
				let fresh = NetworkView::from_document(&doc);
				*self.view.write() = fresh;
				log::debug!(target: "mixnet", "network view refreshed");
			},
			Err(e) => {
				log::warn!(target: "mixnet", "topology refresh failed, using stale view: {}", e);
			},
		}
	}
}

/// Producer handle onto the real-traffic queue. The queue carries frames
/// already serialized for the wire.
#[derive(Clone)]
pub struct MessageSender {
	shared: Arc<Shared>,
	queue: mpsc::Sender<Vec<u8>>,
}

impl MessageSender {
	fn encode(&self, message: &[u8], recipient: &ClientAddress) -> Result<Vec<u8>, Error> {
		let view = self.shared.view.read();
		let frame = cover::encode_message(
			&mut thread_rng(),
			&view,
			&self.shared.address.provider,
			recipient,
			self.shared.config.num_mix_hops,
			self.shared.config.average_hop_delay,
			message,
		)?;
		Ok(frame.encode_length_delimited_to_vec())
	}

	/// Queue a message, waiting for capacity. Returns [`Error::Shutdown`]
	/// once the scheduler has exited.
	pub async fn send(&self, message: &[u8], recipient: &ClientAddress) -> Result<(), Error> {
		let frame = self.encode(message, recipient)?;
		self.queue.send(frame).await.map_err(|_| Error::Shutdown)
	}

	/// Queue a message without waiting; full queue is an error.
	pub fn try_send(&self, message: &[u8], recipient: &ClientAddress) -> Result<(), Error> {
		let frame = self.encode(message, recipient)?;
		self.queue.try_send(frame).map_err(|e| match e {
			mpsc::error::TrySendError::Full(_) => Error::QueueFull,
			mpsc::error::TrySendError::Closed(_) => Error::Shutdown,
		})
	}
}

/// Typed control-plane handle for runtime rate overrides.
pub struct RateControl {
	rates: watch::Sender<TrafficRates>,
}

impl RateControl {
	/// Replace the stream rates. Each stream applies the new rates on its
	/// next iteration.
	pub fn set_rates(&self, rates: TrafficRates) -> Result<(), Error> {
		if !rates.validate() {
			return Err(Error::Config("rates must be positive and finite"))
		}
		self.rates.send(rates).map_err(|_| Error::Shutdown)
	}
}

/// Handles returned alongside a new [`Client`].
pub struct ClientHandles {
	pub sender: MessageSender,
	pub control: RateControl,
	/// Payloads fetched from the provider mailbox.
	pub incoming: mpsc::Receiver<Vec<u8>>,
}

/// The scheduler. [`Client::run`] drives the handshake and the four
/// streams until the shutdown token fires.
pub struct Client {
	shared: Arc<Shared>,
	queue_rx: mpsc::Receiver<Vec<u8>>,
	rates_rx: watch::Receiver<TrafficRates>,
	incoming_tx: mpsc::Sender<Vec<u8>>,
}

impl Client {
	pub fn new(
		config: SchedulerConfig,
		address: ClientAddress,
		directory: Arc<dyn Directory>,
	) -> (Self, ClientHandles) {
		let (queue_tx, queue_rx) = mpsc::channel(config.out_queue_capacity);
		let (rates_tx, rates_rx) = watch::channel(config.rates);
		let (incoming_tx, incoming_rx) = mpsc::channel(64);
		let shared = Arc::new(Shared {
			config,
			address,
			view: RwLock::new(NetworkView::empty()),
			directory,
			metrics: ClientMetrics::default(),
		});
		let client = Client { shared: shared.clone(), queue_rx, rates_rx, incoming_tx };
		let handles = ClientHandles {
			sender: MessageSender { shared, queue: queue_tx },
			control: RateControl { rates: rates_tx },
			incoming: incoming_rx,
		};
		(client, handles)
	}

	pub fn metrics(&self) -> &ClientMetrics {
		&self.shared.metrics
	}

	/// Register with the provider, wait for the topology to contain at
	/// least one client, then run the traffic streams to completion.
	pub async fn run(self, shutdown: CancellationToken) -> Result<(), Error> {
		let Self { shared, queue_rx, rates_rx, incoming_tx } = self;

		let Some(token) = register(&shared, &shutdown).await else {
			return Ok(())
		};

		// Fetching needs only the token; cover traffic additionally needs
		// a drop-cover recipient, hence the barrier below.
		let fetch = tokio::spawn(fetch_stream(
			shared.clone(),
			token,
			rates_rx.clone(),
			incoming_tx,
			shutdown.clone(),
		));

		if !wait_for_clients(&shared, &shutdown).await {
			fetch.abort();
			return Ok(())
		}

		let pump = tokio::spawn(send_pump(
			shared.clone(),
			queue_rx,
			rates_rx.clone(),
			shutdown.clone(),
		));
		let loop_cover = tokio::spawn(cover_stream(
			shared.clone(),
			CoverKind::Loop,
			rates_rx.clone(),
			shutdown.clone(),
		));
		let drop_cover = tokio::spawn(cover_stream(
			shared.clone(),
			CoverKind::Drop,
			rates_rx,
			shutdown.clone(),
		));

		let _ = tokio::join!(pump, loop_cover, drop_cover, fetch);
		Ok(())
	}
}

/// Send ASSIGN frames to the provider every retry interval until a TOKEN
/// frame comes back. Returns `None` on shutdown.
async fn register(shared: &Arc<Shared>, shutdown: &CancellationToken) -> Option<Vec<u8>> {
	let record = shared.address.to_record();
	let request = GeneralPacket::wrap(PacketFlag::Assign, record.encode_to_vec());
	loop {
		log::info!(target: "mixnet", "sending registration request to provider");
		match connection::exchange(
			&shared.provider_addr(),
			&request,
			shared.config.connect_timeout,
			shared.config.read_timeout,
		)
		.await
		{
			Ok(response) if response.flag() == Some(PacketFlag::Token) => {
				log::info!(target: "mixnet", "registered with provider, token received");
				return Some(response.data)
			},
			Ok(_) => {
				log::error!(target: "mixnet", "registration response had unexpected flag");
			},
			Err(e) => {
				log::error!(target: "mixnet", "registration failed: {}", e);
			},
		}
		tokio::select! {
			_ = shutdown.cancelled() => return None,
			_ = tokio::time::sleep(shared.config.registration_retry) => {},
		}
	}
}

/// Block cover traffic until the view holds at least one client; a drop
/// cover packet has no recipient before that. Returns false on shutdown.
async fn wait_for_clients(shared: &Arc<Shared>, shutdown: &CancellationToken) -> bool {
	loop {
		match shared.directory.topology().await {
			Ok(doc) => {
				let fresh = NetworkView::from_document(&doc);
				let ready = !fresh.clients.is_empty();
				*shared.view.write() = fresh;
				if ready {
					log::info!(target: "mixnet", "topology has clients, cover traffic starting");
					return true
				}
				log::debug!(target: "mixnet", "topology has no clients yet, waiting");
			},
			Err(e) => {
				log::warn!(target: "mixnet", "topology fetch failed during startup: {}", e);
			},
		}
		tokio::select! {
			_ = shutdown.cancelled() => return false,
			_ = tokio::time::sleep(BARRIER_POLL) => {},
		}
	}
}

/// The only consumer of the real-traffic queue. One packet per Poisson
/// tick: a queued frame if there is one, a fresh loop cover otherwise.
async fn send_pump(
	shared: Arc<Shared>,
	mut queue: mpsc::Receiver<Vec<u8>>,
	rates: watch::Receiver<TrafficRates>,
	shutdown: CancellationToken,
) {
	log::info!(target: "mixnet", "queue controller started");
	loop {
		let wait = poisson_interval(&mut thread_rng(), rates.borrow().message_sending);
		tokio::select! {
			_ = shutdown.cancelled() => break,
			_ = tokio::time::sleep(wait) => {},
		}
		shared.maybe_refresh_view().await;

		let frame = match queue.try_recv() {
			Ok(frame) => {
				shared.metrics.real_sent.fetch_add(1, Ordering::Relaxed);
				Some(frame)
			},
			// A closed queue only means every sender handle is gone; the
			// pump keeps emitting rate-compliant cover regardless.
			Err(mpsc::error::TryRecvError::Empty) |
			Err(mpsc::error::TryRecvError::Disconnected) =>
				if shared.config.rate_compliant_cover {
					build_cover(&shared, CoverKind::Loop)
				} else {
					None
				},
		};
		let Some(frame) = frame else { continue };
		if let Err(e) = connection::send_raw(
			&shared.provider_addr(),
			&frame,
			shared.config.connect_timeout,
		)
		.await
		{
			log::debug!(target: "mixnet", "send pump: packet dropped: {}", e);
		}
	}
	log::info!(target: "mixnet", "queue controller stopped");
}

/// Freestanding loop or drop cover stream.
async fn cover_stream(
	shared: Arc<Shared>,
	kind: CoverKind,
	rates: watch::Receiver<TrafficRates>,
	shutdown: CancellationToken,
) {
	log::info!(target: "mixnet", "stream of {:?} cover traffic started", kind);
	loop {
		let rate = match kind {
			CoverKind::Loop => rates.borrow().loop_cover,
			CoverKind::Drop => rates.borrow().drop_cover,
		};
		let wait = poisson_interval(&mut thread_rng(), rate);
		tokio::select! {
			_ = shutdown.cancelled() => break,
			_ = tokio::time::sleep(wait) => {},
		}
		shared.maybe_refresh_view().await;
		let Some(frame) = build_cover(&shared, kind) else { continue };
		if let Err(e) = connection::send_raw(
			&shared.provider_addr(),
			&frame,
			shared.config.connect_timeout,
		)
		.await
		{
			log::debug!(target: "mixnet", "{:?} cover: packet dropped: {}", kind, e);
		}
	}
}

/// Build one cover frame against the current view. The view lock is held
/// only for the synchronous packet construction, never across an await.
fn build_cover(shared: &Shared, kind: CoverKind) -> Option<Vec<u8>> {
	let view = shared.view.read();
	match cover::gen_cover_packet(
		&mut thread_rng(),
		&view,
		&shared.address.provider,
		&shared.address,
		kind,
		shared.config.num_mix_hops,
		shared.config.average_hop_delay,
	) {
		Ok(frame) => {
			shared.metrics.cover_sent.fetch_add(1, Ordering::Relaxed);
			Some(frame.encode_length_delimited_to_vec())
		},
		Err(e) => {
			log::warn!(target: "mixnet", "could not build {:?} cover packet: {}", kind, e);
			None
		},
	}
}

/// Poisson-paced mailbox fetch. Every response frame's payload is handed
/// to the application; the mailbox protocol itself is the provider's.
async fn fetch_stream(
	shared: Arc<Shared>,
	token: Vec<u8>,
	rates: watch::Receiver<TrafficRates>,
	incoming: mpsc::Sender<Vec<u8>>,
	shutdown: CancellationToken,
) {
	log::info!(target: "mixnet", "mailbox fetch stream started");
	let request = PullRequest { client_id: shared.address.id.clone(), token };
	let frame = GeneralPacket::wrap(PacketFlag::Pull, request.encode_to_vec());
	loop {
		let wait = poisson_interval(&mut thread_rng(), rates.borrow().fetch);
		tokio::select! {
			_ = shutdown.cancelled() => break,
			_ = tokio::time::sleep(wait) => {},
		}
		match connection::exchange_all(
			&shared.provider_addr(),
			&frame,
			shared.config.connect_timeout,
			shared.config.read_timeout,
		)
		.await
		{
			Ok(frames) => {
				shared.metrics.fetches.fetch_add(1, Ordering::Relaxed);
				for response in frames {
					// Drop on backpressure: the mailbox redelivers.
					let _ = incoming.try_send(response.data);
				}
			},
			Err(e) => {
				log::debug!(target: "mixnet", "mailbox fetch failed: {}", e);
			},
		}
	}
}
