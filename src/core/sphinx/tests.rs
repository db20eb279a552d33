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

use super::{
	crypto::{
		aes_ctr, base_mult, compute_blinding_factor, generate_keypair, kdf,
		random_field_element, scalar_mult, PrivateKey,
	},
	new_packet, unwrap_packet, Destination, Error, PathHop, Unwrapped,
};
use crate::core::wire::{self, SphinxPacket};
use rand::rngs::OsRng;
use std::time::Duration;

const MAX_TEST_HOPS: usize = 6;

struct NodeParams {
	hop: PathHop,
	private_key: PrivateKey,
}

fn new_path(num_hops: usize) -> Vec<NodeParams> {
	(0..num_hops)
		.map(|i| {
			let (private_key, public_key) = generate_keypair(&mut OsRng);
			NodeParams {
				hop: PathHop {
					id: format!("node-{i}"),
					address: format!("127.0.0.1:{}", 9000 + i),
					public_key,
				},
				private_key,
			}
		})
		.collect()
}

fn hops(nodes: &[NodeParams]) -> Vec<PathHop> {
	nodes.iter().map(|n| n.hop.clone()).collect()
}

fn destination() -> Destination {
	Destination { id: "recipient".into(), address: "127.0.0.1:9999".into() }
}

/// Process at every hop in order, checking the relayed routing data, and
/// return the terminal payload.
fn unwrap_all(nodes: &[NodeParams], mut packet: Vec<u8>) -> Vec<u8> {
	for (i, node) in nodes.iter().enumerate() {
		match unwrap_packet(&node.private_key, &packet).unwrap() {
			Unwrapped::Forward { next_hop, packet: next, .. } => {
				assert!(i < nodes.len() - 1, "relay flag at terminal hop");
				assert_eq!(next_hop.id, nodes[i + 1].hop.id);
				assert_eq!(next_hop.address, nodes[i + 1].hop.address);
				packet = next;
			},
			Unwrapped::Deliver { recipient, payload, .. } => {
				assert_eq!(i, nodes.len() - 1, "last hop flag mid-path");
				assert_eq!(recipient.id, "recipient");
				return payload
			},
		}
	}
	panic!("no terminal hop reached");
}

#[test]
fn forward_round_trip() {
	let payload = b"We must defend our own privacy if we expect to have any. \
		We must come together and create systems which allow anonymous transactions \
		to take place. People have been defending their own privacy for centuries \
		with whispers, darkness, envelopes, closed doors, secret handshakes, and \
		couriers.";

	for num_hops in 1..=MAX_TEST_HOPS {
		let nodes = new_path(num_hops);
		let delays = vec![Duration::ZERO; num_hops];
		let packet =
			new_packet(&mut OsRng, &hops(&nodes), &delays, &destination(), payload)
				.unwrap();
		assert_eq!(unwrap_all(&nodes, packet), payload.to_vec());
	}
}

#[test]
fn round_trip_large_message() {
	let payload = vec![0x5c; 2048];
	let nodes = new_path(5);
	let delays = vec![Duration::from_millis(100); 5];
	let packet =
		new_packet(&mut OsRng, &hops(&nodes), &delays, &destination(), &payload).unwrap();
	assert_eq!(unwrap_all(&nodes, packet), payload);
}

#[test]
fn delays_survive_the_onion() {
	let nodes = new_path(3);
	let delays: Vec<_> = (1..=3u64).map(Duration::from_millis).collect();
	let mut packet =
		new_packet(&mut OsRng, &hops(&nodes), &delays, &destination(), b"x").unwrap();
	for (i, node) in nodes.iter().enumerate() {
		match unwrap_packet(&node.private_key, &packet).unwrap() {
			Unwrapped::Forward { delay, packet: next, .. } => {
				assert_eq!(delay, delays[i]);
				packet = next;
			},
			Unwrapped::Deliver { delay, .. } => {
				assert_eq!(delay, delays[i]);
			},
		}
	}
}

#[test]
fn mac_flip_rejected() {
	let nodes = new_path(3);
	let delays = vec![Duration::ZERO; 3];
	let packet =
		new_packet(&mut OsRng, &hops(&nodes), &delays, &destination(), b"ping").unwrap();

	// Flip one bit in each byte of beta and of the MAC in turn; every
	// mutation must be rejected before any payload processing.
	let decoded: SphinxPacket = wire::decode(&packet).unwrap();
	let header = decoded.header.clone().unwrap();
	for pos in 0..header.beta.len() {
		let mut tampered = decoded.clone();
		tampered.header.as_mut().unwrap().beta[pos] ^= 0x01;
		let bytes = wire::encode(&tampered);
		assert_eq!(
			unwrap_packet(&nodes[0].private_key, &bytes).err(),
			Some(Error::Mac),
			"beta flip at {pos} accepted",
		);
	}
	for pos in 0..header.mac.len() {
		let mut tampered = decoded.clone();
		tampered.header.as_mut().unwrap().mac[pos] ^= 0x80;
		let bytes = wire::encode(&tampered);
		assert_eq!(
			unwrap_packet(&nodes[0].private_key, &bytes).err(),
			Some(Error::Mac),
			"mac flip at {pos} accepted",
		);
	}
}

#[test]
fn wrong_key_rejected() {
	let nodes = new_path(2);
	let delays = vec![Duration::ZERO; 2];
	let packet =
		new_packet(&mut OsRng, &hops(&nodes), &delays, &destination(), b"ping").unwrap();
	// Processing with the second hop's key first must fail the MAC.
	assert_eq!(unwrap_packet(&nodes[1].private_key, &packet).err(), Some(Error::Mac));
}

#[test]
fn garbage_is_malformed_not_panic() {
	let (private, _) = generate_keypair(&mut OsRng);
	assert_eq!(unwrap_packet(&private, &[]).err(), Some(Error::Malformed));
	assert_eq!(
		unwrap_packet(&private, &[0xde, 0xad, 0xbe, 0xef]).err(),
		Some(Error::Malformed)
	);
}

#[test]
fn beta_length_is_message_independent() {
	// Beta carries routing data only: two packets along the same path with
	// different messages must expose identical header lengths at every hop.
	let nodes = new_path(4);
	let delays = vec![Duration::ZERO; 4];
	let short =
		new_packet(&mut OsRng, &hops(&nodes), &delays, &destination(), b"a").unwrap();
	let long = new_packet(&mut OsRng, &hops(&nodes), &delays, &destination(), &[0u8; 1024])
		.unwrap();

	let mut short = short;
	let mut long = long;
	for node in &nodes {
		let a: SphinxPacket = wire::decode(&short).unwrap();
		let b: SphinxPacket = wire::decode(&long).unwrap();
		assert_eq!(
			a.header.as_ref().unwrap().beta.len(),
			b.header.as_ref().unwrap().beta.len()
		);
		match (
			unwrap_packet(&node.private_key, &short).unwrap(),
			unwrap_packet(&node.private_key, &long).unwrap(),
		) {
			(
				Unwrapped::Forward { packet: next_short, .. },
				Unwrapped::Forward { packet: next_long, .. },
			) => {
				short = next_short;
				long = next_long;
			},
			(Unwrapped::Deliver { .. }, Unwrapped::Deliver { .. }) => break,
			_ => panic!("packets disagree on terminal hop"),
		}
	}
}

#[test]
fn blinding_factors_commute() {
	let g = base_mult(&random_field_element(&mut OsRng));
	for _ in 0..8 {
		let b1 = compute_blinding_factor(&kdf(random_field_element(&mut OsRng).as_bytes()));
		let b2 = compute_blinding_factor(&kdf(random_field_element(&mut OsRng).as_bytes()));
		assert_eq!(scalar_mult(&b1, &scalar_mult(&b2, &g)), scalar_mult(&b2, &scalar_mult(&b1, &g)));
	}
}

#[test]
fn aes_ctr_is_an_involution() {
	let key = kdf(b"some seed material");
	let data = b"arbitrary plaintext of odd length.".to_vec();
	assert_eq!(aes_ctr(&key, &aes_ctr(&key, &data)), data);
}

#[test]
fn kdf_truncates_sha256() {
	assert_eq!(kdf(b"seed").len(), 16);
	assert_eq!(kdf(b"seed"), kdf(b"seed"));
	assert_ne!(kdf(b"seed"), kdf(b"seed2"));
}

#[test]
fn blinding_factor_high_half_is_zero() {
	let factor = compute_blinding_factor(&kdf(b"seed"));
	assert!(factor.as_bytes()[16..].iter().all(|b| *b == 0));
}

#[test]
fn cover_and_real_same_size() {
	// A cover payload and a real payload of the same length produce
	// packets of identical size along the same path: nothing but the
	// plaintext and the ephemeral differ.
	let nodes = new_path(5);
	let delays = vec![Duration::from_millis(50); 5];
	let real = new_packet(&mut OsRng, &hops(&nodes), &delays, &destination(), b"hello, world310x")
		.unwrap();
	let cover =
		new_packet(&mut OsRng, &hops(&nodes), &delays, &destination(), b"LoopCoverMessage")
			.unwrap();
	assert_eq!(real.len(), cover.len());
}
