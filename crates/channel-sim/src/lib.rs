//! host-side simulation of the settlement protocol's environment
//!
//! wires `channel-core`'s trait seams to in-memory doubles so integration
//! tests (and anyone exploring the protocol off-chain) can drive the full
//! open/join/close/challenge/redeem lifecycle without a PolkaVM runtime.

use std::collections::BTreeMap;

use channel_core::{Address, Balance, Channel, ChannelEvent, ChannelId, ChannelStore, Clock, EventSink, TokenLedger, Timestamp};
use thiserror::Error;

pub use channel_crypto::{public_key_to_address, sign_prehash, EcdsaEcrecover, Keccak256Hasher};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: {have} available, {want} requested")]
    InsufficientBalance { have: Balance, want: Balance },
}

/// a bare-bones multi-token ledger keyed by `(token, holder)`, for tests and
/// the `demo` CLI's dry-run mode. Not a model of any real token standard —
/// just enough bookkeeping for `pull`/`push` to have somewhere to move
/// funds to and from.
#[derive(Debug, Default)]
pub struct MockLedger {
    balances: BTreeMap<(Address, Address), Balance>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, token: Address, holder: Address, amount: Balance) {
        let entry = self.balances.entry((token, holder)).or_insert_with(Balance::zero);
        *entry = entry.saturating_add(amount);
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> Balance {
        self.balances.get(&(token, holder)).copied().unwrap_or_else(Balance::zero)
    }
}

impl TokenLedger for MockLedger {
    type Error = LedgerError;

    fn pull(&mut self, token: Address, from: Address, amount: Balance) -> Result<(), Self::Error> {
        let entry = self.balances.entry((token, from)).or_insert_with(Balance::zero);
        if *entry < amount {
            return Err(LedgerError::InsufficientBalance { have: *entry, want: amount });
        }
        *entry -= amount;
        Ok(())
    }

    fn push(&mut self, token: Address, to: Address, amount: Balance) -> Result<(), Self::Error> {
        self.credit(token, to, amount);
        Ok(())
    }
}

/// a single-channel-record store, keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    channels: BTreeMap<ChannelId, Channel>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelStore for InMemoryStore {
    fn get(&self, id: ChannelId) -> Option<Channel> {
        self.channels.get(&id).cloned()
    }

    fn put(&mut self, channel: Channel) {
        self.channels.insert(channel.id, channel);
    }
}

/// logs every lifecycle event at `info`, and keeps a copy for assertions.
#[derive(Debug, Default)]
pub struct TracingEventSink {
    pub events: Vec<ChannelEvent>,
}

impl TracingEventSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for TracingEventSink {
    fn emit(&mut self, event: ChannelEvent) {
        tracing::info!(channel_id = ?event.channel_id(), ?event, "channel event");
        self.events.push(event);
    }
}

/// a clock under explicit test control; advances only when told to.
#[derive(Debug, Clone, Copy)]
pub struct SimClock(pub Timestamp);

impl SimClock {
    pub fn new(start: Timestamp) -> Self {
        Self(start)
    }

    pub fn advance(&mut self, delta: Timestamp) {
        self.0 += delta;
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
