//! Signed heartbeats.
//!
//! The signing secret is derived from the agent id and its construction time.
//! That gives tamper evidence inside a trusted deployment. It is not
//! authentication: anyone who can guess both inputs can forge a beat.

use crate::status::AgentStatus;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use concord_core::{CoreResult, Hash, Timestamp, VectorClock, canonical};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Liveness and identity broadcast from one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBeat {
    /// When the beat was generated
    pub timestamp: Timestamp,
    /// Sending agent
    pub agent_id: String,
    /// Sender's status
    pub status: AgentStatus,
    /// Sender's clock after ticking for this beat
    pub vector_clock: VectorClock,
    /// Hash over the sender's snapshot count, mode and status
    pub state_hash: Hash,
    /// Base64 HMAC-SHA256 over every other field
    pub signature: String,
    /// Strictly increasing per sender
    pub sequence_number: u64,
}

#[derive(Serialize)]
struct UnsignedBeat<'a> {
    timestamp: Timestamp,
    agent_id: &'a str,
    status: AgentStatus,
    vector_clock: &'a VectorClock,
    state_hash: &'a Hash,
    sequence_number: u64,
}

impl SyncBeat {
    /// Canonical encoding of all fields except the signature
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be canonically encoded
    pub fn signing_payload(&self) -> CoreResult<String> {
        canonical::encode(&UnsignedBeat {
            timestamp: self.timestamp,
            agent_id: &self.agent_id,
            status: self.status,
            vector_clock: &self.vector_clock,
            state_hash: &self.state_hash,
            sequence_number: self.sequence_number,
        })
    }
}

/// HMAC signer for beats
#[derive(Clone)]
pub struct BeatSigner {
    secret: [u8; 32],
    mac: HmacSha256,
}

impl BeatSigner {
    /// Derive the per-instance secret as `SHA-256(agent_id || created_millis)`
    #[must_use]
    pub fn derive(agent_id: &str, created: Timestamp) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(agent_id.as_bytes());
        hasher.update(created.as_millis().to_string().as_bytes());
        Self::from_secret(hasher.finalize().into())
    }

    /// Use a known secret, e.g. one shared by a peer
    #[must_use]
    pub fn from_secret(secret: [u8; 32]) -> Self {
        // Infallible for HMAC: any key length is accepted.
        let mac = HmacSha256::new_from_slice(&secret).expect("HMAC can take key of any size");
        Self { secret, mac }
    }

    /// The raw secret, for handing to peers that verify our beats
    #[must_use]
    pub fn secret(&self) -> [u8; 32] {
        self.secret
    }

    /// Base64 HMAC over `message`
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(message);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Fill in `beat.signature`
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be canonically encoded
    pub fn sign_beat(&self, beat: &mut SyncBeat) -> CoreResult<()> {
        beat.signature = self.sign(beat.signing_payload()?.as_bytes());
        Ok(())
    }

    /// Check `beat.signature` in constant time
    #[must_use]
    pub fn verify(&self, beat: &SyncBeat) -> bool {
        let Ok(signature) = STANDARD.decode(&beat.signature) else {
            return false;
        };
        let Ok(payload) = beat.signing_payload() else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }
}

impl std::fmt::Debug for BeatSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeatSigner").finish_non_exhaustive()
    }
}
