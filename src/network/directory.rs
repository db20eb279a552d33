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

//! Topology directory collaborator. The directory itself is external; this
//! module carries the trait seam the node roles program against and the
//! HTTP client for the real service.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{
	error::Error,
	topology::{MixNodePresence, MixProviderPresence, TopologyDocument},
};

/// `POST /api/metrics/mixes` request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixMetrics {
	/// base64url key of the reporting node.
	pub pub_key: String,
	/// Packets relayed per next-hop address since the last report.
	pub sent: HashMap<String, u64>,
	/// Packets received since the last report.
	pub received: u64,
}

/// Read/write access to the topology directory.
#[async_trait]
pub trait Directory: Send + Sync + 'static {
	/// Fetch the current topology document.
	async fn topology(&self) -> Result<TopologyDocument, Error>;
	/// Announce a mix node's presence.
	async fn register_mix_presence(&self, presence: MixNodePresence) -> Result<(), Error>;
	/// Announce a provider's presence, with its registered clients.
	async fn register_provider_presence(
		&self,
		presence: MixProviderPresence,
	) -> Result<(), Error>;
	/// Ship one metrics snapshot.
	async fn post_mix_metrics(&self, metrics: MixMetrics) -> Result<(), Error>;
}

/// HTTP client for the directory endpoints of the reference deployment.
pub struct HttpDirectory {
	base_url: String,
	http: reqwest::Client,
}

impl HttpDirectory {
	pub fn new(base_url: impl Into<String>) -> Self {
		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(5))
			.build()
			.expect("default TLS backend is available");
		Self { base_url: base_url.into(), http }
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url.trim_end_matches('/'), path)
	}

	async fn post_json<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), Error> {
		self.http
			.post(self.url(path))
			.json(body)
			.send()
			.await
			.and_then(|response| response.error_for_status())
			.map_err(|e| Error::Directory(e.to_string()))?;
		Ok(())
	}
}

#[async_trait]
impl Directory for HttpDirectory {
	async fn topology(&self) -> Result<TopologyDocument, Error> {
		let response = self
			.http
			.get(self.url("/api/presence/topology"))
			.send()
			.await
			.and_then(|response| response.error_for_status())
			.map_err(|e| Error::Directory(e.to_string()))?;
		response
			.json::<TopologyDocument>()
			.await
			.map_err(|e| Error::Directory(e.to_string()))
	}

	async fn register_mix_presence(&self, presence: MixNodePresence) -> Result<(), Error> {
		self.post_json("/api/presence/mixnodes", &presence).await
	}

	async fn register_provider_presence(
		&self,
		presence: MixProviderPresence,
	) -> Result<(), Error> {
		self.post_json("/api/presence/mixproviders", &presence).await
	}

	async fn post_mix_metrics(&self, metrics: MixMetrics) -> Result<(), Error> {
		self.post_json("/api/metrics/mixes", &metrics).await
	}
}
