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

// Mixnet core logic. This module is network agnostic; everything that
// dials, listens or sleeps lives under crate::network.

pub mod config;
pub mod cover;
pub mod delay;
pub mod error;
pub mod sphinx;
pub mod topology;
pub mod wire;

pub use config::{MixnodeConfig, SchedulerConfig, TrafficRates};
pub use error::Error;
pub use sphinx::{
	crypto::{generate_keypair, PrivateKey, PublicKey},
	Error as SphinxError, Unwrapped,
};
pub use topology::{ClientAddress, MixnodeDescriptor, NetworkView, PROVIDER_LAYER};

/// Length of an encoded public or private key.
pub const PUBLIC_KEY_LEN: usize = sphinx::crypto::PUBLIC_KEY_SIZE;
