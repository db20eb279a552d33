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

//! Sphinx packet format.
//!
//! A packet is a header `(alpha, beta, mac)` plus a layered payload. Beta is
//! an onion of protobuf-encoded [`RoutingInfo`] blocks, one per hop; each
//! hop authenticates its layer, peels it, blinds alpha for the next hop and
//! strips one AES-CTR layer off the payload. Beta carries no filler, so its
//! length shrinks by exactly one routing block per hop; the length at a
//! given layer is a function of the path shape only and never of the
//! message.

pub mod crypto;
#[cfg(test)]
mod tests;

use std::time::Duration;

use rand::{CryptoRng, Rng};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::core::wire::{
	self, Commands, Header, Hop, RoutingInfo, SphinxFlag, SphinxPacket,
};
use self::crypto::{
	aes_ctr, base_mult, compute_blinding_factor, expo, hmac, kdf, random_field_element,
	scalar_mult, shared_secret, FieldElement, PrivateKey, PublicKey, KEY_SIZE,
};

/// Upper bound on a single hop delay accepted off the wire. A decrypted
/// delay beyond this is treated as a decode failure rather than slept on.
const MAX_HOP_DELAY_SECS: f64 = 3600.0;

/// Sphinx engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// A path descriptor carried a public key of the wrong length.
	#[error("invalid public key length")]
	InvalidPublicKey,
	/// Header MAC mismatch: tampering or wrong private key.
	#[error("header MAC mismatch")]
	Mac,
	/// The decrypted routing block did not parse. Handled exactly like a
	/// MAC failure to avoid a decryption-oracle side channel.
	#[error("malformed routing info")]
	Decode,
	/// The outer packet did not parse.
	#[error("malformed packet")]
	Malformed,
}

/// One hop of a route prior to header encryption.
#[derive(Clone)]
pub struct PathHop {
	/// Node identifier, as published in the topology.
	pub id: String,
	/// `host:port` the packet is relayed to.
	pub address: String,
	/// Static DH public key of the node.
	pub public_key: PublicKey,
}

/// Terminal recipient of a packet.
#[derive(Clone)]
pub struct Destination {
	pub id: String,
	pub address: String,
}

/// Result of unwrapping one layer at a hop.
pub enum Unwrapped {
	/// Relay the re-assembled packet to the next hop after the delay.
	Forward { next_hop: Hop, delay: Duration, packet: Vec<u8> },
	/// Terminal hop: hand the peeled payload to the recipient's mailbox
	/// after the delay. The payload is the exact byte string the sender
	/// encapsulated.
	Deliver { recipient: Hop, delay: Duration, payload: Vec<u8> },
}

/// Per-hop key material derived by the sender. Zeroized on drop.
struct HopSecrets {
	/// The group element the hop will see as `alpha`.
	alpha: FieldElement,
	/// 16-byte secret hash shared with the hop.
	secret_hash: [u8; KEY_SIZE],
}

impl Drop for HopSecrets {
	fn drop(&mut self) {
		self.alpha.zeroize();
		self.secret_hash.zeroize();
	}
}

/// Derive `(alpha_i, aes_s_i)` for every hop from a fresh ephemeral.
///
/// The composite exponent is never formed in the field: each shared secret
/// is computed by iterated X25519, multiplying the hop's public key by the
/// ephemeral and then by every preceding blinding factor in order. This is
/// bit-for-bit what each hop recomputes on its side of the exchange.
fn derive_hop_secrets(
	rng: &mut (impl Rng + CryptoRng),
	hops: &[PathHop],
) -> Vec<HopSecrets> {
	let x = random_field_element(rng);
	let mut alpha = base_mult(&x);
	let mut blind_factors = vec![x];
	let mut tuples = Vec::with_capacity(hops.len());
	for hop in hops {
		let mut secret = expo(&hop.public_key, &blind_factors);
		let secret_hash = kdf(secret.as_bytes());
		secret.zeroize();
		let blinder = compute_blinding_factor(&secret_hash);
		tuples.push(HopSecrets { alpha: alpha.clone(), secret_hash });
		alpha = scalar_mult(&blinder, &alpha);
		blind_factors.push(blinder);
	}
	for factor in blind_factors.iter_mut() {
		factor.zeroize();
	}
	tuples
}

/// Build beta and the outer MAC, inside-out.
fn encapsulate_header(
	tuples: &[HopSecrets],
	hops: &[PathHop],
	delays: &[Duration],
	destination: &Destination,
) -> Header {
	let last = tuples.len() - 1;
	let final_info = RoutingInfo {
		next_hop: Some(Hop {
			id: destination.id.clone(),
			address: destination.address.clone(),
			pub_key: Vec::new(),
		}),
		commands: Some(Commands {
			delay: delays[last].as_secs_f64(),
			flag: SphinxFlag::LastHop.to_bytes(),
		}),
		next_hop_meta_data: Vec::new(),
		mac: Vec::new(),
	};

	let key = kdf(&tuples[last].secret_hash);
	let mut beta = aes_ctr(&key, &wire::encode(&final_info));
	let mut mac = hmac(&key, &beta);

	for i in (0..last).rev() {
		let next = &hops[i + 1];
		let info = RoutingInfo {
			next_hop: Some(Hop {
				id: next.id.clone(),
				address: next.address.clone(),
				pub_key: next.public_key.to_vec(),
			}),
			commands: Some(Commands {
				delay: delays[i].as_secs_f64(),
				flag: SphinxFlag::Relay.to_bytes(),
			}),
			next_hop_meta_data: beta,
			mac: mac.to_vec(),
		};
		let key = kdf(&tuples[i].secret_hash);
		beta = aes_ctr(&key, &wire::encode(&info));
		mac = hmac(&key, &beta);
	}

	Header { alpha: tuples[0].alpha.as_bytes().to_vec(), beta, mac: mac.to_vec() }
}

/// Apply the payload layers, outermost keyed for hop 0.
fn encapsulate_payload(tuples: &[HopSecrets], message: &[u8]) -> Vec<u8> {
	let mut enc = message.to_vec();
	for tuple in tuples.iter().rev() {
		enc = aes_ctr(&kdf(&tuple.secret_hash), &enc);
	}
	enc
}

/// Construct a Sphinx packet for `message` along `hops`, terminating at
/// `destination`. One delay per hop; the hop at index `i` sleeps
/// `delays[i]` before acting on the packet.
pub fn new_packet(
	rng: &mut (impl Rng + CryptoRng),
	hops: &[PathHop],
	delays: &[Duration],
	destination: &Destination,
	message: &[u8],
) -> Result<Vec<u8>, Error> {
	debug_assert_eq!(hops.len(), delays.len());
	if hops.is_empty() || hops.len() != delays.len() {
		return Err(Error::Malformed)
	}
	let tuples = derive_hop_secrets(rng, hops);
	let header = encapsulate_header(&tuples, hops, delays, destination);
	let payload = encapsulate_payload(&tuples, message);
	Ok(wire::encode(&SphinxPacket { header: Some(header), payload }))
}

/// Unwrap one layer of a packet with the hop's private key.
///
/// The MAC is verified in constant time before anything is decrypted; on
/// mismatch nothing of the payload has been touched.
pub fn unwrap_packet(private: &PrivateKey, packet: &[u8]) -> Result<Unwrapped, Error> {
	let packet: SphinxPacket = wire::decode(packet).map_err(|_| Error::Malformed)?;
	let header = packet.header.ok_or(Error::Malformed)?;
	let alpha = FieldElement::try_from_slice(&header.alpha)?;

	let mut secret = shared_secret(private, &alpha);
	let mut secret_hash = kdf(secret.as_bytes());
	secret.zeroize();
	let key = kdf(&secret_hash);

	let expected = hmac(&key, &header.beta);
	if expected.ct_eq(&header.mac).unwrap_u8() == 0 {
		secret_hash.zeroize();
		return Err(Error::Mac)
	}

	let blinder = compute_blinding_factor(&secret_hash);
	secret_hash.zeroize();
	let next_alpha = scalar_mult(&blinder, &alpha);

	let decrypted = aes_ctr(&key, &header.beta);
	let routing: RoutingInfo = wire::decode(&decrypted).map_err(|_| Error::Decode)?;
	let next_hop = routing.next_hop.ok_or(Error::Decode)?;
	let commands = routing.commands.ok_or(Error::Decode)?;
	let flag = SphinxFlag::from_bytes(&commands.flag).ok_or(Error::Decode)?;
	if !commands.delay.is_finite() ||
		!(0.0..=MAX_HOP_DELAY_SECS).contains(&commands.delay)
	{
		return Err(Error::Decode)
	}
	let delay = Duration::from_secs_f64(commands.delay);

	let payload = aes_ctr(&key, &packet.payload);

	match flag {
		SphinxFlag::Relay => {
			let new_header = Header {
				alpha: next_alpha.as_bytes().to_vec(),
				beta: routing.next_hop_meta_data,
				mac: routing.mac,
			};
			let packet =
				wire::encode(&SphinxPacket { header: Some(new_header), payload });
			Ok(Unwrapped::Forward { next_hop, delay, packet })
		},
		SphinxFlag::LastHop =>
			Ok(Unwrapped::Deliver { recipient: next_hop, delay, payload }),
	}
}
