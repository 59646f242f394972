use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use tokio::sync::{Mutex, mpsc};

use super::wormhole::{
    ClosedSnafu, DecodeMessageSnafu, EncodeMessageSnafu, Error, Rendezvous, UnknownCodeSnafu,
    Wormhole, WormholeCode,
};

const CODE_WORDS: &[&str] = &[
    "aardvark", "absurd", "adrift", "almighty", "banjo", "beehive", "blackjack", "blowtorch",
    "bookshelf", "chisel", "clockwork", "cobra", "crumpled", "dashboard", "deadbolt", "dragnet",
    "drumbeat", "eyeglass", "facial", "flagpole", "glitter", "goldfish", "hamlet", "hockey",
    "indoors", "jawbone", "kickoff", "klaxon", "lockup", "merit", "minnow", "musket", "necklace",
    "offload", "peachy", "pheasant", "puppy", "quadrant", "ratchet", "rebirth", "ruffled",
    "scallion", "snowcap", "spearhead", "stairway", "tactics", "tempest", "tracker", "uncut",
    "upset", "vapor", "waffle", "wallet", "woodlark", "yearbook", "zulu",
];

/// Highest channel number used in generated codes.
const MAX_CHANNEL: u16 = 999;

fn random_code() -> WormholeCode {
    let mut rng = rand::rng();
    let channel = rng.random_range(1..=MAX_CHANNEL);
    let first = CODE_WORDS[rng.random_range(0..CODE_WORDS.len())];
    let second = CODE_WORDS[rng.random_range(0..CODE_WORDS.len())];
    WormholeCode::new(format!("{channel}-{first}-{second}"))
}

/// One end of an in-process wormhole.
///
/// Messages travel as serialized JSON, so both ends see exactly the bytes a
/// real transport would carry.
#[derive(Debug)]
pub struct MemoryWormhole {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl MemoryWormhole {
    fn pair() -> (Self, Self) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        (
            Self {
                outgoing: left_tx,
                incoming: right_rx,
            },
            Self {
                outgoing: right_tx,
                incoming: left_rx,
            },
        )
    }

    /// Sends `message` as is, without checking that it is JSON.
    pub fn send_raw(&mut self, message: impl Into<String>) -> Result<(), Error> {
        self.outgoing.send(message.into()).ok().context(ClosedSnafu)
    }

    /// Whether the other end has been dropped.
    fn is_abandoned(&self) -> bool {
        self.outgoing.is_closed()
    }

    /// Receives the next message without decoding it.
    pub async fn receive_raw(&mut self) -> Result<String, Error> {
        self.incoming.recv().await.context(ClosedSnafu)
    }
}

#[async_trait]
impl Wormhole for MemoryWormhole {
    async fn send_json(&mut self, message: &Value) -> Result<(), Error> {
        let message = serde_json::to_string(message).context(EncodeMessageSnafu)?;
        self.send_raw(message)
    }

    async fn receive_json(&mut self) -> Result<Value, Error> {
        let message = self.receive_raw().await?;
        serde_json::from_str(&message).context(DecodeMessageSnafu)
    }
}

/// A rendezvous server living in the current process, for tests and local
/// runs.
///
/// Every opened wormhole waits until a client [claims](Self::claim) its code
/// or the code is [revoked](Self::revoke). There is no expiry. Codes whose
/// server end has been dropped are forgotten the next time the server is
/// used.
#[derive(Clone, Debug, Default)]
pub struct MemoryWormholeServer {
    pending: Arc<Mutex<HashMap<WormholeCode, MemoryWormhole>>>,
}

impl MemoryWormholeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects to the wormhole identified by `code`. Every code can be
    /// claimed exactly once.
    pub async fn claim(&self, code: &WormholeCode) -> Result<MemoryWormhole, Error> {
        let mut pending = self.pending.lock().await;
        forget_abandoned(&mut pending);
        pending
            .remove(code)
            .context(UnknownCodeSnafu { code: code.clone() })
    }

    /// Withdraws an unclaimed `code`. The server end then sees the wormhole
    /// as closed. Returns whether the code was pending.
    pub async fn revoke(&self, code: &WormholeCode) -> bool {
        self.pending.lock().await.remove(code).is_some()
    }
}

fn forget_abandoned(pending: &mut HashMap<WormholeCode, MemoryWormhole>) {
    pending.retain(|code, client| {
        let abandoned = client.is_abandoned();
        if abandoned {
            tracing::debug!(%code, "forgetting abandoned wormhole");
        }
        !abandoned
    });
}

#[async_trait]
impl Rendezvous for MemoryWormholeServer {
    async fn open(&self) -> Result<(WormholeCode, Box<dyn Wormhole>), Error> {
        let (ours, theirs) = MemoryWormhole::pair();
        let mut pending = self.pending.lock().await;
        forget_abandoned(&mut pending);

        let code = loop {
            let code = random_code();
            if !pending.contains_key(&code) {
                break code;
            }
        };
        pending.insert(code.clone(), theirs);

        Ok((code, Box::new(ours)))
    }
}
