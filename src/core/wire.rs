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

//! On-wire message schema. Protobuf wire format for compatibility with the
//! legacy implementation; field tags below are part of the stable contract.
//!
//! ```text
//! GeneralPacket { flag: bytes = 1, data: bytes = 2 }
//! SphinxPacket  { header: Header = 1, payload: bytes = 2 }
//! Header        { alpha: bytes = 1, beta: bytes = 2, mac: bytes = 3 }
//! RoutingInfo   { next_hop: Hop = 1, commands: Commands = 2,
//!                 next_hop_meta_data: bytes = 3, mac: bytes = 4 }
//! Hop           { id: string = 1, address: string = 2, pub_key: bytes = 3 }
//! Commands      { delay: double = 1, flag: bytes = 2 }
//! PullRequest   { client_id: string = 1, token: bytes = 2 }
//! MixRecord     { id: string = 1, host: string = 2, port: string = 3,
//!                 pub_key: bytes = 4, layer: uint64 = 5 }
//! ClientRecord  { id: string = 1, host: string = 2, port: string = 3,
//!                 pub_key: bytes = 4, provider: MixRecord = 5 }
//! ```
//!
//! Every TCP frame is `uvarint length || GeneralPacket`; see
//! [`crate::network::connection`].

use prost::Message;

use crate::core::error::Error;

/// Packet-type flag carried in every [`GeneralPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFlag {
	/// Client to provider: register this client.
	Assign,
	/// Provider to client: authentication token.
	Token,
	/// Any to any: the data is a Sphinx packet.
	Comm,
	/// Client to provider: fetch mailbox, token attached.
	Pull,
}

impl PacketFlag {
	pub const fn byte(self) -> u8 {
		match self {
			PacketFlag::Assign => 0xa2,
			PacketFlag::Token => 0xa9,
			PacketFlag::Comm => 0xc6,
			PacketFlag::Pull => 0xff,
		}
	}

	pub fn to_bytes(self) -> Vec<u8> {
		vec![self.byte()]
	}

	pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
		match bytes {
			[0xa2] => Some(PacketFlag::Assign),
			[0xa9] => Some(PacketFlag::Token),
			[0xc6] => Some(PacketFlag::Comm),
			[0xff] => Some(PacketFlag::Pull),
			_ => None,
		}
	}
}

/// Per-hop routing flag inside the Sphinx commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SphinxFlag {
	/// Forward the packet to the next hop.
	Relay,
	/// The packet has reached its terminal hop.
	LastHop,
}

impl SphinxFlag {
	pub const fn byte(self) -> u8 {
		match self {
			SphinxFlag::Relay => 0xf1,
			SphinxFlag::LastHop => 0xf0,
		}
	}

	pub fn to_bytes(self) -> Vec<u8> {
		vec![self.byte()]
	}

	pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
		match bytes {
			[0xf1] => Some(SphinxFlag::Relay),
			[0xf0] => Some(SphinxFlag::LastHop),
			_ => None,
		}
	}
}

/// Envelope for everything that crosses a TCP connection.
#[derive(Clone, PartialEq, Message)]
pub struct GeneralPacket {
	#[prost(bytes = "vec", tag = "1")]
	pub flag: Vec<u8>,
	#[prost(bytes = "vec", tag = "2")]
	pub data: Vec<u8>,
}

impl GeneralPacket {
	/// Pack `data` under the given flag.
	pub fn wrap(flag: PacketFlag, data: Vec<u8>) -> Self {
		Self { flag: flag.to_bytes(), data }
	}

	pub fn flag(&self) -> Option<PacketFlag> {
		PacketFlag::from_bytes(&self.flag)
	}
}

/// A complete Sphinx packet: header plus layered payload.
#[derive(Clone, PartialEq, Message)]
pub struct SphinxPacket {
	#[prost(message, optional, tag = "1")]
	pub header: Option<Header>,
	#[prost(bytes = "vec", tag = "2")]
	pub payload: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Header {
	/// Curve25519 element blinded at each hop (alpha in the Sphinx paper).
	#[prost(bytes = "vec", tag = "1")]
	pub alpha: Vec<u8>,
	/// Onion-encrypted routing stack (beta).
	#[prost(bytes = "vec", tag = "2")]
	pub beta: Vec<u8>,
	/// HMAC-SHA256 over beta under the current hop's key (gamma).
	#[prost(bytes = "vec", tag = "3")]
	pub mac: Vec<u8>,
}

/// One decrypted layer of beta.
#[derive(Clone, PartialEq, Message)]
pub struct RoutingInfo {
	#[prost(message, optional, tag = "1")]
	pub next_hop: Option<Hop>,
	#[prost(message, optional, tag = "2")]
	pub commands: Option<Commands>,
	/// The next layer's encrypted routing info; empty at the final hop.
	#[prost(bytes = "vec", tag = "3")]
	pub next_hop_meta_data: Vec<u8>,
	/// The next layer's MAC; empty at the final hop.
	#[prost(bytes = "vec", tag = "4")]
	pub mac: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Hop {
	#[prost(string, tag = "1")]
	pub id: String,
	/// `host:port` of the hop.
	#[prost(string, tag = "2")]
	pub address: String,
	#[prost(bytes = "vec", tag = "3")]
	pub pub_key: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Commands {
	/// Hop delay in seconds. Converted to a `Duration` at the wire edge.
	#[prost(double, tag = "1")]
	pub delay: f64,
	#[prost(bytes = "vec", tag = "2")]
	pub flag: Vec<u8>,
}

/// Mailbox fetch request; the token must be the one issued at registration.
#[derive(Clone, PartialEq, Message)]
pub struct PullRequest {
	#[prost(string, tag = "1")]
	pub client_id: String,
	#[prost(bytes = "vec", tag = "2")]
	pub token: Vec<u8>,
}

/// Public record of a mix or provider node.
#[derive(Clone, PartialEq, Message)]
pub struct MixRecord {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(string, tag = "2")]
	pub host: String,
	#[prost(string, tag = "3")]
	pub port: String,
	#[prost(bytes = "vec", tag = "4")]
	pub pub_key: Vec<u8>,
	#[prost(uint64, tag = "5")]
	pub layer: u64,
}

/// Public record of a client; the payload of an ASSIGN request.
#[derive(Clone, PartialEq, Message)]
pub struct ClientRecord {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(string, tag = "2")]
	pub host: String,
	#[prost(string, tag = "3")]
	pub port: String,
	#[prost(bytes = "vec", tag = "4")]
	pub pub_key: Vec<u8>,
	#[prost(message, optional, tag = "5")]
	pub provider: Option<MixRecord>,
}

/// Encode any wire message to its plain (unframed) byte form.
pub fn encode<M: Message>(message: &M) -> Vec<u8> {
	message.encode_to_vec()
}

/// Decode a wire message, mapping malformed input to [`Error::Decode`].
pub fn decode<M: Message + Default>(bytes: &[u8]) -> Result<M, Error> {
	M::decode(bytes).map_err(|_| Error::Decode)
}
