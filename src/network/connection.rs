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

//! Framed one-shot connections. Every frame on the wire is
//! `uvarint length || GeneralPacket`; a connection carries one request and,
//! for the provider exchanges, a short response stream, then closes.

use std::time::Duration;

use prost::Message;
use tokio::{
	io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
	net::TcpStream,
};

use crate::core::{error::Error, wire::GeneralPacket};

/// Hard cap on an accepted frame. Anything larger is treated as malformed
/// rather than buffered.
const MAX_FRAME_SIZE: u64 = 1 << 20;

async fn read_uvarint(stream: &mut (impl AsyncRead + Unpin)) -> Result<u64, Error> {
	let mut value = 0u64;
	for shift in (0..64).step_by(7) {
		let byte = stream.read_u8().await?;
		value |= u64::from(byte & 0x7f) << shift;
		if byte & 0x80 == 0 {
			return Ok(value)
		}
	}
	Err(Error::Decode)
}

/// Read one frame. Errors on EOF; use [`read_frame_or_eof`] where a closed
/// peer is an expected outcome.
pub async fn read_frame(stream: &mut (impl AsyncRead + Unpin)) -> Result<GeneralPacket, Error> {
	let len = read_uvarint(stream).await?;
	if len > MAX_FRAME_SIZE {
		return Err(Error::Decode)
	}
	let mut buf = vec![0u8; len as usize];
	stream.read_exact(&mut buf).await?;
	GeneralPacket::decode(buf.as_slice()).map_err(|_| Error::Decode)
}

/// Read one frame, or `None` if the peer closed the connection cleanly
/// before the first length byte.
pub async fn read_frame_or_eof(
	stream: &mut (impl AsyncRead + Unpin),
) -> Result<Option<GeneralPacket>, Error> {
	match read_frame(stream).await {
		Ok(packet) => Ok(Some(packet)),
		Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
		Err(e) => Err(e),
	}
}

/// Write one frame.
pub async fn write_frame(
	stream: &mut (impl AsyncWrite + Unpin),
	packet: &GeneralPacket,
) -> Result<(), Error> {
	let bytes = packet.encode_length_delimited_to_vec();
	stream.write_all(&bytes).await?;
	stream.flush().await?;
	Ok(())
}

/// Dial with a deadline.
pub async fn connect(address: &str, deadline: Duration) -> Result<TcpStream, Error> {
	match tokio::time::timeout(deadline, TcpStream::connect(address)).await {
		Ok(stream) => Ok(stream?),
		Err(_) => Err(Error::Timeout),
	}
}

/// One-shot send: dial, write one frame, close. Nothing is read back.
pub async fn send_one(
	address: &str,
	packet: &GeneralPacket,
	connect_timeout: Duration,
) -> Result<(), Error> {
	let mut stream = connect(address, connect_timeout).await?;
	write_frame(&mut stream, packet).await?;
	stream.shutdown().await?;
	Ok(())
}

/// One-shot send of an already-framed byte string, as queued by the client
/// scheduler.
pub async fn send_raw(
	address: &str,
	framed: &[u8],
	connect_timeout: Duration,
) -> Result<(), Error> {
	let mut stream = connect(address, connect_timeout).await?;
	stream.write_all(framed).await?;
	stream.flush().await?;
	stream.shutdown().await?;
	Ok(())
}

/// Request/response exchange: dial, write one frame, read one frame back
/// under the read deadline.
pub async fn exchange(
	address: &str,
	packet: &GeneralPacket,
	connect_timeout: Duration,
	read_timeout: Duration,
) -> Result<GeneralPacket, Error> {
	let mut stream = connect(address, connect_timeout).await?;
	write_frame(&mut stream, packet).await?;
	match tokio::time::timeout(read_timeout, read_frame(&mut stream)).await {
		Ok(result) => result,
		Err(_) => Err(Error::Timeout),
	}
}

/// Request/response-stream exchange: dial, write one frame, read frames
/// until the peer closes, all under one read deadline.
pub async fn exchange_all(
	address: &str,
	packet: &GeneralPacket,
	connect_timeout: Duration,
	read_timeout: Duration,
) -> Result<Vec<GeneralPacket>, Error> {
	let mut stream = connect(address, connect_timeout).await?;
	write_frame(&mut stream, packet).await?;
	let read_all = async {
		let mut frames = Vec::new();
		while let Some(frame) = read_frame_or_eof(&mut stream).await? {
			frames.push(frame);
		}
		Ok(frames)
	};
	match tokio::time::timeout(read_timeout, read_all).await {
		Ok(result) => result,
		Err(_) => Err(Error::Timeout),
	}
}
