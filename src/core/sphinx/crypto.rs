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

//! Key exchange, secret derivation, MAC computation, and encryption.
//!
//! Every group operation goes through the RFC 7748 X25519 function, so the
//! usual clamping applies to private keys and blinding factors alike. The
//! stream cipher is AES-128-CTR under a fixed IV: each layer's key is
//! derived fresh, so a key/IV pair never encrypts two different streams.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::Error;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Size in bytes of a Curve25519 field element encoding.
pub const FIELD_ELEMENT_SIZE: usize = 32;
/// Size in bytes of a private key.
pub const PRIVATE_KEY_SIZE: usize = FIELD_ELEMENT_SIZE;
/// Size in bytes of a public key.
pub const PUBLIC_KEY_SIZE: usize = FIELD_ELEMENT_SIZE;
/// Size in bytes of a derived symmetric key.
pub const KEY_SIZE: usize = 16;
/// Size in bytes of a header MAC.
pub const MAC_SIZE: usize = 32;

/// Fixed IV for the header/payload stream cipher (ASCII zeros).
const STREAM_IV: [u8; 16] = *b"0000000000000000";
/// IV under which blinding factors are derived from a secret hash.
const BLINDING_IV: [u8; 16] = *b"initialvector000";
/// Block encrypted to produce blinding factors.
const ZERO_BLOCK: [u8; 16] = *b"0000000000000000";

/// A Curve25519 group or scalar element, little-endian encoded.
#[derive(Clone, Debug, Zeroize)]
pub struct FieldElement([u8; FIELD_ELEMENT_SIZE]);

impl FieldElement {
	pub fn from_bytes(bytes: [u8; FIELD_ELEMENT_SIZE]) -> Self {
		Self(bytes)
	}

	pub fn try_from_slice(bytes: &[u8]) -> Result<Self, Error> {
		let bytes: [u8; FIELD_ELEMENT_SIZE] =
			bytes.try_into().map_err(|_| Error::Malformed)?;
		Ok(Self(bytes))
	}

	pub fn as_bytes(&self) -> &[u8; FIELD_ELEMENT_SIZE] {
		&self.0
	}
}

impl PartialEq for FieldElement {
	fn eq(&self, other: &Self) -> bool {
		self.0.ct_eq(&other.0).into()
	}
}

impl Eq for FieldElement {}

/// Static DH secret key. Zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; PRIVATE_KEY_SIZE]);

impl PrivateKey {
	pub fn from_bytes(bytes: [u8; PRIVATE_KEY_SIZE]) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_SIZE] {
		&self.0
	}
}

/// Static DH public key, derived from a [`PrivateKey`] by base-point
/// multiplication.
#[derive(Clone, Debug)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
	pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
		Self(bytes)
	}

	/// Accept a key received from the network. The only malformation the
	/// encoding admits is a wrong length.
	pub fn try_from_slice(bytes: &[u8]) -> Result<Self, Error> {
		let bytes: [u8; PUBLIC_KEY_SIZE] =
			bytes.try_into().map_err(|_| Error::InvalidPublicKey)?;
		Ok(Self(bytes))
	}

	pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
		&self.0
	}

	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	fn as_element(&self) -> FieldElement {
		FieldElement(self.0)
	}
}

impl From<&PrivateKey> for PublicKey {
	fn from(private: &PrivateKey) -> Self {
		Self(x25519_dalek::x25519(private.0, x25519_dalek::X25519_BASEPOINT_BYTES))
	}
}

impl PartialEq for PublicKey {
	fn eq(&self, other: &Self) -> bool {
		self.0.ct_eq(&other.0).into()
	}
}

impl Eq for PublicKey {}

/// Generate a fresh DH keypair from the given RNG.
pub fn generate_keypair(rng: &mut (impl Rng + CryptoRng)) -> (PrivateKey, PublicKey) {
	let mut secret = [0u8; PRIVATE_KEY_SIZE];
	rng.fill_bytes(&mut secret);
	let private = PrivateKey(secret);
	let public = PublicKey::from(&private);
	(private, public)
}

/// Uniformly random scalar, used as the sender's ephemeral.
pub fn random_field_element(rng: &mut (impl Rng + CryptoRng)) -> FieldElement {
	let mut bytes = [0u8; FIELD_ELEMENT_SIZE];
	rng.fill_bytes(&mut bytes);
	FieldElement(bytes)
}

/// X25519 of `point` by `scalar`.
pub fn scalar_mult(scalar: &FieldElement, point: &FieldElement) -> FieldElement {
	FieldElement(x25519_dalek::x25519(scalar.0, point.0))
}

/// X25519 of the Curve25519 base point by `scalar`.
pub fn base_mult(scalar: &FieldElement) -> FieldElement {
	FieldElement(x25519_dalek::x25519(scalar.0, x25519_dalek::X25519_BASEPOINT_BYTES))
}

/// Diffie-Hellman between a hop's private key and the header alpha.
pub fn shared_secret(private: &PrivateKey, alpha: &FieldElement) -> FieldElement {
	FieldElement(x25519_dalek::x25519(private.0, alpha.0))
}

/// Raise a public key by a chain of scalars, one X25519 at a time. The
/// composite exponent is never formed in the field; X25519 clamping makes
/// the iterated form the canonical one for this packet format.
pub fn expo(base: &PublicKey, scalars: &[FieldElement]) -> FieldElement {
	let mut acc = base.as_element();
	for scalar in scalars {
		acc = scalar_mult(scalar, &acc);
	}
	acc
}

/// Raise the base point by a chain of scalars.
pub fn expo_base(scalars: &[FieldElement]) -> FieldElement {
	let mut acc = base_mult(&scalars[0]);
	for scalar in &scalars[1..] {
		acc = scalar_mult(scalar, &acc);
	}
	acc
}

/// SHA-256 of `seed`, truncated to [`KEY_SIZE`] bytes.
pub fn kdf(seed: &[u8]) -> [u8; KEY_SIZE] {
	let digest = Sha256::digest(seed);
	let mut key = [0u8; KEY_SIZE];
	key.copy_from_slice(&digest[..KEY_SIZE]);
	key
}

/// AES-128-CTR keystream XOR under the fixed IV. Applying it twice with the
/// same key restores the input.
pub fn aes_ctr(key: &[u8; KEY_SIZE], data: &[u8]) -> Vec<u8> {
	let mut out = data.to_vec();
	let mut cipher = Aes128Ctr::new(key.into(), &STREAM_IV.into());
	cipher.apply_keystream(&mut out);
	out
}

/// HMAC-SHA256 tag over `data`.
pub fn hmac(key: &[u8; KEY_SIZE], data: &[u8]) -> [u8; MAC_SIZE] {
	let mut mac =
		HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
	mac.update(data);
	mac.finalize().into_bytes().into()
}

/// Derive the blinding factor for the next alpha from a hop's secret hash.
/// The 16-byte AES-CTR output becomes the low half of the scalar; the high
/// half is zero. Clamping happens inside X25519 when the factor is used.
pub fn compute_blinding_factor(secret_hash: &[u8; KEY_SIZE]) -> FieldElement {
	let mut block = ZERO_BLOCK;
	let mut cipher = Aes128Ctr::new(secret_hash.into(), &BLINDING_IV.into());
	cipher.apply_keystream(&mut block);
	let mut scalar = [0u8; FIELD_ELEMENT_SIZE];
	scalar[..KEY_SIZE].copy_from_slice(&block);
	block.zeroize();
	FieldElement(scalar)
}
