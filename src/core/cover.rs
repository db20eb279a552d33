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

//! Packet authoring: real messages and the two cover streams. A cover
//! packet is a full Sphinx packet along a full route; at the cryptographic
//! layer it differs from a real one only in its plaintext and ephemeral.

use rand::{CryptoRng, Rng};
use std::time::Duration;

use crate::core::{
	delay::delay_sequence,
	error::Error,
	sphinx,
	topology::{ClientAddress, MixnodeDescriptor, NetworkView},
	wire::{GeneralPacket, PacketFlag},
};

/// Plaintext of a loop cover packet, addressed back to the sender.
pub const LOOP_COVER_PAYLOAD: &[u8] = b"LoopCoverMessage";
/// Plaintext of a drop cover packet, addressed to a random client.
pub const DROP_COVER_PAYLOAD: &[u8] = b"DummyPayloadMessage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverKind {
	/// Recipient is the sender itself.
	Loop,
	/// Recipient is a uniformly random client from the view.
	Drop,
}

/// Pack `message` for `recipient` along a fresh random route and wrap it
/// as a COMM frame for the ingress provider.
pub fn encode_message(
	rng: &mut (impl Rng + CryptoRng),
	view: &NetworkView,
	ingress: &MixnodeDescriptor,
	recipient: &ClientAddress,
	num_mix_hops: usize,
	average_hop_delay: Duration,
	message: &[u8],
) -> Result<GeneralPacket, Error> {
	let route = view.random_route(rng, ingress, recipient, num_mix_hops)?;
	let delays = delay_sequence(rng, average_hop_delay, route.num_hops());
	let packet =
		sphinx::new_packet(rng, &route.hops(), &delays, &route.destination(), message)?;
	Ok(GeneralPacket::wrap(PacketFlag::Comm, packet))
}

/// Author a cover packet of the given kind.
pub fn gen_cover_packet(
	rng: &mut (impl Rng + CryptoRng),
	view: &NetworkView,
	ingress: &MixnodeDescriptor,
	self_address: &ClientAddress,
	kind: CoverKind,
	num_mix_hops: usize,
	average_hop_delay: Duration,
) -> Result<GeneralPacket, Error> {
	let (recipient, payload) = match kind {
		CoverKind::Loop => (self_address.clone(), LOOP_COVER_PAYLOAD),
		CoverKind::Drop => {
			let recipient =
				view.random_client(rng).ok_or(Error::NoRoute("no clients in view"))?;
			(recipient.clone(), DROP_COVER_PAYLOAD)
		},
	};
	encode_message(rng, view, ingress, &recipient, num_mix_hops, average_hop_delay, payload)
}
