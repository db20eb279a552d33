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

//! Loopix-style mixnet core: the Sphinx packet engine, the per-hop mix
//! processing pipeline, and the client cover-traffic scheduler.
//!
//! The crate is a library; discovery directory, provider mailbox storage
//! and user front-ends are external collaborators reached through the
//! [`network::Directory`] and [`network::ProviderInbox`] seams and the
//! wire contracts in [`core::wire`].

pub mod core;
pub mod network;

pub use crate::core::{
	generate_keypair, ClientAddress, Error, MixnodeConfig, MixnodeDescriptor, NetworkView,
	PrivateKey, PublicKey, SchedulerConfig, SphinxError, TrafficRates, PROVIDER_LAYER,
	PUBLIC_KEY_LEN,
};
pub use network::{Client, ClientHandles, Directory, HttpDirectory, MessageSender, Mixnode, ProviderInbox};
