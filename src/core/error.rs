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

//! Error handling.

use crate::core::sphinx::Error as SphinxError;

/// Mixnet generic error.
///
/// Per-packet errors are recovered at the boundary of the task that hit
/// them; nothing here terminates a long-lived loop, and nothing is ever
/// reported back over the wire.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Sphinx format error: MAC mismatch, malformed layer, bad key.
	#[error("sphinx packet format error: {0}")]
	Sphinx(#[from] SphinxError),
	/// A wire message failed to decode.
	#[error("malformed wire message")]
	Decode,
	/// A wire message failed to encode. Indicates a bug.
	#[error("wire message encoding failed")]
	Encode,
	/// Transport failure: dial, read or write.
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	/// A dial or read exceeded its deadline. The packet is dropped;
	/// mixnets tolerate loss and never retry Sphinx traffic.
	#[error("operation timed out")]
	Timeout,
	/// The topology cannot supply a path or recipient.
	#[error("no route available: {0}")]
	NoRoute(&'static str),
	/// The outgoing message queue is at capacity.
	#[error("outgoing queue is full")]
	QueueFull,
	/// Cooperative shutdown in progress.
	#[error("shutting down")]
	Shutdown,
	/// Directory collaborator failure.
	#[error("directory error: {0}")]
	Directory(String),
	/// An inbound frame carried an unrecognised packet-type flag.
	#[error("unrecognised packet flag")]
	InvalidFlag,
	/// A configuration value failed validation.
	#[error("invalid configuration: {0}")]
	Config(&'static str),
}
