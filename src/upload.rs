//! Placing a file in the ring: hash it to a key, find the key's owner through any peer, and
//! store it there.

use crate::chord::peer::Rendezvous;
use crate::chord::types::{Identifier, RingId};
use crate::discovery::client::DiscoveryClient;
use crate::error::{MessageError, RingletError};
use crate::network::messages::Header;
use crate::network::transport::client::PeerClient;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// The 16-bit ring key of some content: the first two bytes of its SHA-256 digest.
pub fn file_key(bytes: &[u8]) -> RingId {
    let digest = Sha256::digest(bytes);
    RingId::new(u16::from_be_bytes([digest[0], digest[1]]))
}

/// Where an uploaded file ended up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub key: RingId,
    pub name: String,
    pub owner: Identifier,
}

pub struct Uploader {
    discovery: DiscoveryClient,
    client: PeerClient,
}

impl Uploader {
    pub fn new(discovery_addr: &str, header: Header) -> Self {
        Self {
            discovery: DiscoveryClient::new(discovery_addr, header.clone()),
            client: PeerClient::new(header),
        }
    }

    pub async fn upload_file(&self, path: &Path) -> Result<UploadReceipt, RingletError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                MessageError::InvalidFormat(format!("{} does not name a file", path.display()))
            })?;
        let bytes = tokio::fs::read(path).await?;
        self.upload(&name, bytes).await
    }

    pub async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, RingletError> {
        let key = file_key(&bytes);
        let entry = self.discovery.random_peer().await?;
        info!(%key, name, entry = ?entry, "looking up owner");

        let owner = self.client.lookup(&entry, key).await?;
        info!(%key, owner = ?owner, bytes = bytes.len(), "storing file");
        self.client.store_file(&owner, key, name, bytes).await?;

        Ok(UploadReceipt {
            key,
            name: name.to_string(),
            owner,
        })
    }
}
