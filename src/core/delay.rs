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

//! Exponentially distributed delays. Delays are `Duration`s (nanosecond
//! precision) from the moment they are drawn; only the Sphinx wire format
//! converts them to seconds.

use rand::{CryptoRng, Rng};
use rand_distr::Distribution;
use std::time::Duration;

/// Draw a delay from Exp with the given mean.
pub fn exp_delay(rng: &mut (impl Rng + CryptoRng), mean: Duration) -> Duration {
	let exp = rand_distr::Exp::new(1.0 / mean.as_nanos() as f64)
		.expect("mean durations are validated positive");
	let delay = Duration::from_nanos(exp.sample(rng).round() as u64);
	log::trace!(target: "mixnet", "delay {:?} for {:?}", delay, mean);
	delay
}

/// Draw a Poisson-process inter-arrival interval for a stream emitting at
/// `rate` events per second, i.e. `-ln(U) / rate`.
pub fn poisson_interval(rng: &mut (impl Rng + CryptoRng), rate: f64) -> Duration {
	let exp = rand_distr::Exp::new(rate).expect("rates are validated positive");
	Duration::from_secs_f64(exp.sample(rng))
}

/// Draw one per-hop delay for each hop of a path.
pub fn delay_sequence(
	rng: &mut (impl Rng + CryptoRng),
	mean: Duration,
	len: usize,
) -> Vec<Duration> {
	(0..len).map(|_| exp_delay(rng, mean)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::OsRng;

	#[test]
	fn exp_delay_mean_is_close() {
		let mean = Duration::from_millis(100);
		let n: u32 = 20_000;
		let total: Duration = (0..n).map(|_| exp_delay(&mut OsRng, mean)).sum();
		let observed = total / n;
		// 20k samples put the sample mean well within 10% of the true mean.
		assert!(observed > mean.mul_f64(0.9), "mean too low: {observed:?}");
		assert!(observed < mean.mul_f64(1.1), "mean too high: {observed:?}");
	}

	#[test]
	fn poisson_interval_mean_is_reciprocal_rate() {
		let n = 20_000u32;
		let total: Duration = (0..n).map(|_| poisson_interval(&mut OsRng, 10.0)).sum();
		let observed = total / n;
		assert!(observed > Duration::from_millis(90), "mean too low: {observed:?}");
		assert!(observed < Duration::from_millis(110), "mean too high: {observed:?}");
	}

	#[test]
	fn delay_sequence_length() {
		assert_eq!(delay_sequence(&mut OsRng, Duration::from_millis(1), 5).len(), 5);
	}
}
