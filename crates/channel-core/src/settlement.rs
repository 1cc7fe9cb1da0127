//! the five entrypoints of the settlement protocol (spec §3/§4)
//!
//! every function here takes `&mut` references to the trait objects it
//! needs rather than a single "context" struct, so `channel-contract` and
//! `channel-sim` can each wire up only the pieces a given call actually
//! touches. All functions follow check-effects-interactions: the store is
//! written (and status flipped) before any token transfer is attempted, so
//! a reentrant call during `push`/`pull` observes the post-state.

use crate::channel;
use crate::encoding::receipt_digest_preimage;
use crate::error::Error;
use crate::guards;
use crate::traits::{recover_signer, ChannelStore, Clock, Ecrecover, EventSink, Hasher, TokenLedger};
use crate::types::{Address, Balance, Channel, ChannelEvent, ChannelId, ChannelStatus, Receipt, Signature65, Timestamp};

fn receipt_digest<H: Hasher>(hasher: &H, receipt: &Receipt) -> [u8; 32] {
    let preimage = receipt_digest_preimage(receipt.channel_id, receipt.balance_a, receipt.balance_b, receipt.nonce);
    hasher.keccak256(&preimage)
}

/// verify `sig` was produced by `expected` over `receipt`.
fn verify_receipt_signature<H: Hasher, E: Ecrecover>(
    hasher: &H,
    ecrecover: &E,
    receipt: &Receipt,
    sig: &Signature65,
    expected: Address,
) -> Result<(), Error> {
    let digest = receipt_digest(hasher, receipt);
    let signer = recover_signer(hasher, ecrecover, digest, sig).ok_or(Error::InvalidSignature)?;
    if signer == expected {
        Ok(())
    } else {
        Err(Error::InvalidSignature)
    }
}

/// verify both `sig_a` and `sig_b` were produced by the channel's `party_a`
/// and `party_b` respectively, over the identical receipt. `close`/
/// `challenge` are accepted only once both hold (spec §4.F, §8 property 3):
/// there is no off-by-one between whose signature is checked and whose
/// balances get stored.
fn verify_both_signatures<H: Hasher, E: Ecrecover>(
    hasher: &H,
    ecrecover: &E,
    channel: &Channel,
    receipt: &Receipt,
    sig_a: &Signature65,
    sig_b: &Signature65,
) -> Result<(), Error> {
    verify_receipt_signature(hasher, ecrecover, receipt, sig_a, channel.party_a)?;
    verify_receipt_signature(hasher, ecrecover, receipt, sig_b, channel.party_b)
}

fn check_conservation(channel: &Channel, receipt: &Receipt) -> Result<(), Error> {
    let claimed = receipt
        .balance_a
        .checked_add(receipt.balance_b)
        .ok_or(Error::Overflow)?;
    if claimed == channel.total() {
        Ok(())
    } else {
        Err(Error::ConservationViolation)
    }
}

/// finalize a channel and pay out its current balances. Shared by `redeem`
/// and by `close` on a zero-length challenge period. Sets status to CLOSED
/// *before* issuing pushes, so a reentrant call observes a closed channel
/// (check-effects-interactions).
fn distribute_funds<L, S, V>(ledger: &mut L, store: &mut S, events: &mut V, mut channel: Channel) -> Result<(), Error>
where
    L: TokenLedger,
    S: ChannelStore,
    V: EventSink,
{
    guards::not_closed(&channel)?;

    let id = channel.id;
    let token = channel.token;
    let party_a = channel.party_a;
    let party_b = channel.party_b;
    let payout_a = channel.balance_a;
    let payout_b = channel.balance_b;

    channel.status = ChannelStatus::Closed;
    store.put(channel);

    if !payout_a.is_zero() {
        ledger.push(token, party_a, payout_a).map_err(|_| Error::TokenTransferFailed)?;
    }
    if !payout_b.is_zero() {
        ledger.push(token, party_b, payout_b).map_err(|_| Error::TokenTransferFailed)?;
    }
    events.emit(ChannelEvent::ChannelClosed { id });
    Ok(())
}

/// open a new channel: `caller` becomes party A and escrows `deposit_a` of
/// `token`. Party B is fixed at open time but may join with any deposit
/// (including zero) exactly once.
pub fn open<H, L, S, V>(
    hasher: &H,
    ledger: &mut L,
    store: &mut S,
    events: &mut V,
    caller: Address,
    counterparty: Address,
    token: Address,
    deposit_a: Balance,
    block_number: u64,
    challenge_period: Timestamp,
) -> Result<ChannelId, Error>
where
    H: Hasher,
    L: TokenLedger,
    S: ChannelStore,
    V: EventSink,
{
    let id = channel::derive_channel_id(hasher, token, caller, counterparty, block_number);
    if store.exists(id) {
        return Err(Error::IdCollision);
    }
    let new = channel::new_channel(id, token, caller, counterparty, deposit_a, challenge_period)?;

    store.put(new);
    ledger.pull(token, caller, deposit_a).map_err(|_| Error::TokenTransferFailed)?;
    events.emit(ChannelEvent::ChannelOpened {
        id,
        party_a: caller,
        party_b: counterparty,
    });
    Ok(id)
}

/// join an existing channel as party B, escrowing `deposit_b` (may be zero).
pub fn join<L, S, V>(
    ledger: &mut L,
    store: &mut S,
    events: &mut V,
    id: ChannelId,
    caller: Address,
    deposit_b: Balance,
) -> Result<(), Error>
where
    L: TokenLedger,
    S: ChannelStore,
    V: EventSink,
{
    let existing = store.get(id);
    let mut channel = guards::valid_channel(existing.as_ref())?.clone();
    guards::not_closed(&channel)?;
    guards::is_open(&channel)?;
    if caller != channel.party_b {
        return Err(Error::NotAParticipant);
    }
    if channel.joined {
        return Err(Error::DoubleJoin);
    }

    channel.joined = true;
    channel.balance_b = channel.balance_b.checked_add(deposit_b).ok_or(Error::Overflow)?;
    let token = channel.token;
    store.put(channel);

    if !deposit_b.is_zero() {
        ledger.pull(token, caller, deposit_b).map_err(|_| Error::TokenTransferFailed)?;
    }
    events.emit(ChannelEvent::CounterPartyJoined { id });
    Ok(())
}

/// start the dispute window with a receipt co-signed by both parties.
/// `caller` must be a party to the channel; both `sig_a` and `sig_b` are
/// verified against the stored `party_a`/`party_b` regardless of which one
/// submits the call, so an accepted receipt always carries both parties'
/// consent, not just the non-caller's.
///
/// routes through `update_receipt`'s ON_CHALLENGE transition regardless of
/// `challenge_period`; when it is zero, `distribute_funds` immediately
/// overrides that to CLOSED in the same transaction, so the intermediate
/// ON_CHALLENGE status and its event are never externally observable.
pub fn close<H, E, L, S, V>(
    hasher: &H,
    ecrecover: &E,
    ledger: &mut L,
    store: &mut S,
    events: &mut V,
    clock: &impl Clock,
    id: ChannelId,
    caller: Address,
    receipt: Receipt,
    sig_a: Signature65,
    sig_b: Signature65,
) -> Result<(), Error>
where
    H: Hasher,
    E: Ecrecover,
    L: TokenLedger,
    S: ChannelStore,
    V: EventSink,
{
    let existing = store.get(id);
    let mut channel = guards::valid_channel(existing.as_ref())?.clone();
    guards::not_closed(&channel)?;
    guards::is_open(&channel)?;
    guards::only_parties(&channel, caller)?;
    if receipt.channel_id != id {
        return Err(Error::NoSuchChannel);
    }
    check_conservation(&channel, &receipt)?;
    if receipt.nonce <= channel.nonce {
        return Err(Error::StaleNonce);
    }

    verify_both_signatures(hasher, ecrecover, &channel, &receipt, &sig_a, &sig_b)?;

    channel.balance_a = receipt.balance_a;
    channel.balance_b = receipt.balance_b;
    channel.nonce = receipt.nonce;
    channel.status = ChannelStatus::OnChallenge;
    if channel.close_time == 0 {
        channel.close_time = clock.now();
    }

    if channel.challenge_period == 0 {
        return distribute_funds(ledger, store, events, channel);
    }

    store.put(channel);
    events.emit(ChannelEvent::ChannelOnChallenge { id });
    Ok(())
}

/// override the pending close with a fresher receipt co-signed by both
/// parties, while the dispute window is still open.
pub fn challenge<H, E, S, V>(
    hasher: &H,
    ecrecover: &E,
    store: &mut S,
    events: &mut V,
    clock: &impl Clock,
    id: ChannelId,
    caller: Address,
    receipt: Receipt,
    sig_a: Signature65,
    sig_b: Signature65,
) -> Result<(), Error>
where
    H: Hasher,
    E: Ecrecover,
    S: ChannelStore,
    V: EventSink,
{
    let existing = store.get(id);
    let mut channel = guards::valid_channel(existing.as_ref())?.clone();
    guards::only_parties(&channel, caller)?;
    guards::is_on_challenge(&channel)?;
    guards::is_during_challenge_period(&channel, clock.now())?;
    if receipt.channel_id != id {
        return Err(Error::NoSuchChannel);
    }
    if receipt.nonce <= channel.nonce {
        return Err(Error::StaleNonce);
    }
    check_conservation(&channel, &receipt)?;

    verify_both_signatures(hasher, ecrecover, &channel, &receipt, &sig_a, &sig_b)?;

    channel.balance_a = receipt.balance_a;
    channel.balance_b = receipt.balance_b;
    channel.nonce = receipt.nonce;
    store.put(channel);

    events.emit(ChannelEvent::ChannelChallenged { id });
    Ok(())
}

/// finalize the channel once the dispute window has elapsed, paying out the
/// last-accepted balances.
pub fn redeem<L, S, V>(
    ledger: &mut L,
    store: &mut S,
    events: &mut V,
    clock: &impl Clock,
    id: ChannelId,
    caller: Address,
) -> Result<(), Error>
where
    L: TokenLedger,
    S: ChannelStore,
    V: EventSink,
{
    let existing = store.get(id);
    let channel = guards::valid_channel(existing.as_ref())?.clone();
    guards::only_parties(&channel, caller)?;
    guards::is_on_challenge(&channel)?;
    guards::challenge_period_was_over(&channel, clock.now())?;

    distribute_funds(ledger, store, events, channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::U256;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;

    struct FakeHasher;
    impl Hasher for FakeHasher {
        fn keccak256(&self, input: &[u8]) -> [u8; 32] {
            let mut out = [0u8; 32];
            for (i, b) in input.iter().enumerate() {
                out[i % 32] ^= *b;
            }
            out
        }
    }

    /// recovers to whichever address was registered for that exact digest+sig pair
    struct FakeEcrecover {
        registry: BTreeMap<([u8; 32], [u8; 65]), Address>,
    }

    impl FakeEcrecover {
        fn new() -> Self {
            Self { registry: BTreeMap::new() }
        }

        fn register(&mut self, digest: [u8; 32], sig: Signature65, signer: Address) {
            self.registry.insert((digest, sig.to_bytes()), signer);
        }
    }

    impl Ecrecover for FakeEcrecover {
        fn ecrecover(&self, prefixed_digest: [u8; 32], sig: &Signature65) -> Option<Address> {
            self.registry.get(&(prefixed_digest, sig.to_bytes())).copied()
        }
    }

    struct MemStore(BTreeMap<ChannelId, Channel>);
    impl ChannelStore for MemStore {
        fn get(&self, id: ChannelId) -> Option<Channel> {
            self.0.get(&id).cloned()
        }
        fn put(&mut self, channel: Channel) {
            self.0.insert(channel.id, channel);
        }
    }

    struct MemLedger;
    impl TokenLedger for MemLedger {
        type Error = ();
        fn pull(&mut self, _token: Address, _from: Address, _amount: Balance) -> Result<(), ()> {
            Ok(())
        }
        fn push(&mut self, _token: Address, _to: Address, _amount: Balance) -> Result<(), ()> {
            Ok(())
        }
    }

    struct VecSink(Vec<ChannelEvent>);
    impl EventSink for VecSink {
        fn emit(&mut self, event: ChannelEvent) {
            self.0.push(event);
        }
    }

    struct FixedClock(Timestamp);
    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            self.0
        }
    }

    fn sign_for(hasher: &FakeHasher, ecrecover: &mut FakeEcrecover, receipt: &Receipt, signer: Address, tag: u8) -> Signature65 {
        let digest = receipt_digest(hasher, receipt);
        let prefixed = hasher.keccak256(&crate::encoding::prefixed_digest_preimage(digest));
        let sig = Signature65 { r: [tag; 32], s: [tag; 32], v: 27 };
        ecrecover.register(prefixed, sig, signer);
        sig
    }

    #[test]
    fn full_lifecycle_happy_path() {
        let hasher = FakeHasher;
        let mut ecrecover = FakeEcrecover::new();
        let mut ledger = MemLedger;
        let mut store = MemStore(BTreeMap::new());
        let mut events = VecSink(Vec::new());

        let party_a = Address::repeat_byte(1);
        let party_b = Address::repeat_byte(2);
        let token = Address::repeat_byte(9);

        let id = open(
            &hasher,
            &mut ledger,
            &mut store,
            &mut events,
            party_a,
            party_b,
            token,
            U256::from(100),
            1,
            50,
        )
        .unwrap();

        join(&mut ledger, &mut store, &mut events, id, party_b, U256::from(50)).unwrap();
        let channel = store.get(id).unwrap();
        assert_eq!(channel.total(), U256::from(150));

        let receipt = Receipt {
            channel_id: id,
            nonce: U256::from(1),
            balance_a: U256::from(40),
            balance_b: U256::from(110),
        };
        let sig_a = sign_for(&hasher, &mut ecrecover, &receipt, party_a, 0x01);
        let sig_b = sign_for(&hasher, &mut ecrecover, &receipt, party_b, 0xaa);

        close(
            &hasher,
            &ecrecover,
            &mut ledger,
            &mut store,
            &mut events,
            &FixedClock(1_000),
            id,
            party_a,
            receipt,
            sig_a,
            sig_b,
        )
        .unwrap();

        let disputed = store.get(id).unwrap();
        assert_eq!(disputed.status, ChannelStatus::OnChallenge);

        assert!(redeem(&mut ledger, &mut store, &mut events, &FixedClock(1_010), id, party_a).is_err());

        redeem(&mut ledger, &mut store, &mut events, &FixedClock(1_051), id, party_a).unwrap();
        let closed = store.get(id).unwrap();
        assert_eq!(closed.status, ChannelStatus::Closed);
        assert_eq!(events.0.len(), 4);
    }

    #[test]
    fn challenge_with_stale_nonce_is_rejected() {
        let hasher = FakeHasher;
        let mut ecrecover = FakeEcrecover::new();
        let mut ledger = MemLedger;
        let mut store = MemStore(BTreeMap::new());
        let mut events = VecSink(Vec::new());

        let party_a = Address::repeat_byte(1);
        let party_b = Address::repeat_byte(2);
        let token = Address::repeat_byte(9);

        let id = open(&hasher, &mut ledger, &mut store, &mut events, party_a, party_b, token, U256::from(100), 1, 50).unwrap();
        join(&mut ledger, &mut store, &mut events, id, party_b, U256::zero()).unwrap();

        let receipt = Receipt { channel_id: id, nonce: U256::from(5), balance_a: U256::from(60), balance_b: U256::from(40) };
        let sig_a = sign_for(&hasher, &mut ecrecover, &receipt, party_a, 0x01);
        let sig_b = sign_for(&hasher, &mut ecrecover, &receipt, party_b, 0x02);
        close(&hasher, &ecrecover, &mut ledger, &mut store, &mut events, &FixedClock(100), id, party_a, receipt, sig_a, sig_b).unwrap();

        let stale = Receipt { channel_id: id, nonce: U256::from(5), balance_a: U256::from(70), balance_b: U256::from(30) };
        let stale_sig_a = sign_for(&hasher, &mut ecrecover, &stale, party_a, 0x03);
        let stale_sig_b = sign_for(&hasher, &mut ecrecover, &stale, party_b, 0x04);
        let err = challenge(&hasher, &ecrecover, &mut store, &mut events, &FixedClock(120), id, party_b, stale, stale_sig_a, stale_sig_b).unwrap_err();
        assert_eq!(err, Error::StaleNonce);
    }

    #[test]
    fn conservation_violation_is_rejected() {
        let hasher = FakeHasher;
        let mut ecrecover = FakeEcrecover::new();
        let mut ledger = MemLedger;
        let mut store = MemStore(BTreeMap::new());
        let mut events = VecSink(Vec::new());

        let party_a = Address::repeat_byte(1);
        let party_b = Address::repeat_byte(2);
        let token = Address::repeat_byte(9);

        let id = open(&hasher, &mut ledger, &mut store, &mut events, party_a, party_b, token, U256::from(100), 1, 50).unwrap();
        join(&mut ledger, &mut store, &mut events, id, party_b, U256::zero()).unwrap();

        let bad = Receipt { channel_id: id, nonce: U256::from(1), balance_a: U256::from(999), balance_b: U256::from(1) };
        let sig_a = sign_for(&hasher, &mut ecrecover, &bad, party_a, 0x05);
        let sig_b = sign_for(&hasher, &mut ecrecover, &bad, party_b, 0x03);
        let err = close(&hasher, &ecrecover, &mut ledger, &mut store, &mut events, &FixedClock(1), id, party_a, bad, sig_a, sig_b).unwrap_err();
        assert_eq!(err, Error::ConservationViolation);
    }

    /// §8 property 3: `close` accepted only with BOTH signatures valid — a
    /// receipt co-signed by the caller alone (forging the counterparty's
    /// signature) is rejected, not silently accepted because the caller is
    /// already authenticated on-chain.
    #[test]
    fn close_rejects_when_counterparty_signature_is_missing() {
        let hasher = FakeHasher;
        let mut ecrecover = FakeEcrecover::new();
        let mut ledger = MemLedger;
        let mut store = MemStore(BTreeMap::new());
        let mut events = VecSink(Vec::new());

        let party_a = Address::repeat_byte(1);
        let party_b = Address::repeat_byte(2);
        let token = Address::repeat_byte(9);

        let id = open(&hasher, &mut ledger, &mut store, &mut events, party_a, party_b, token, U256::from(100), 1, 50).unwrap();
        join(&mut ledger, &mut store, &mut events, id, party_b, U256::zero()).unwrap();

        let receipt = Receipt { channel_id: id, nonce: U256::from(1), balance_a: U256::from(60), balance_b: U256::from(40) };
        let sig_a = sign_for(&hasher, &mut ecrecover, &receipt, party_a, 0x06);
        // sig_b is never registered for party_b, so recovery fails.
        let unregistered_sig_b = Signature65 { r: [0xff; 32], s: [0xff; 32], v: 27 };
        let err = close(&hasher, &ecrecover, &mut ledger, &mut store, &mut events, &FixedClock(1), id, party_a, receipt, sig_a, unregistered_sig_b).unwrap_err();
        assert_eq!(err, Error::InvalidSignature);
    }

    /// S1: with a zero challenge period, `close` distributes immediately —
    /// the channel is CLOSED and funds paid out within the same call, with
    /// no separate `redeem` needed and no `ChannelOnChallenge` observed.
    #[test]
    fn zero_challenge_period_close_distributes_immediately() {
        let hasher = FakeHasher;
        let mut ecrecover = FakeEcrecover::new();
        let mut ledger = MemLedger;
        let mut store = MemStore(BTreeMap::new());
        let mut events = VecSink(Vec::new());

        let party_a = Address::repeat_byte(1);
        let party_b = Address::repeat_byte(2);
        let token = Address::repeat_byte(9);

        let id = open(&hasher, &mut ledger, &mut store, &mut events, party_a, party_b, token, U256::from(100), 1, 0).unwrap();
        join(&mut ledger, &mut store, &mut events, id, party_b, U256::from(50)).unwrap();

        let receipt = Receipt { channel_id: id, nonce: U256::from(1), balance_a: U256::from(40), balance_b: U256::from(110) };
        let sig_a = sign_for(&hasher, &mut ecrecover, &receipt, party_a, 0x07);
        let sig_b = sign_for(&hasher, &mut ecrecover, &receipt, party_b, 0xbb);

        close(&hasher, &ecrecover, &mut ledger, &mut store, &mut events, &FixedClock(1_000), id, party_a, receipt, sig_a, sig_b).unwrap();

        let channel = store.get(id).unwrap();
        assert_eq!(channel.status, ChannelStatus::Closed);
        assert_eq!(channel.close_time, 1_000);
        assert!(!events.0.iter().any(|e| matches!(e, ChannelEvent::ChannelOnChallenge { .. })));
        assert!(matches!(events.0.last(), Some(ChannelEvent::ChannelClosed { id: closed_id }) if *closed_id == id));
    }

    /// S5-equivalent for `redeem`: an outsider cannot trigger distribution
    /// even once the challenge deadline has elapsed.
    #[test]
    fn redeem_rejects_non_participant() {
        let hasher = FakeHasher;
        let mut ecrecover = FakeEcrecover::new();
        let mut ledger = MemLedger;
        let mut store = MemStore(BTreeMap::new());
        let mut events = VecSink(Vec::new());

        let party_a = Address::repeat_byte(1);
        let party_b = Address::repeat_byte(2);
        let outsider = Address::repeat_byte(3);
        let token = Address::repeat_byte(9);

        let id = open(&hasher, &mut ledger, &mut store, &mut events, party_a, party_b, token, U256::from(100), 1, 50).unwrap();
        join(&mut ledger, &mut store, &mut events, id, party_b, U256::zero()).unwrap();

        let receipt = Receipt { channel_id: id, nonce: U256::from(1), balance_a: U256::from(60), balance_b: U256::from(40) };
        let sig_a = sign_for(&hasher, &mut ecrecover, &receipt, party_a, 0x08);
        let sig_b = sign_for(&hasher, &mut ecrecover, &receipt, party_b, 0x09);
        close(&hasher, &ecrecover, &mut ledger, &mut store, &mut events, &FixedClock(1), id, party_a, receipt, sig_a, sig_b).unwrap();

        let err = redeem(&mut ledger, &mut store, &mut events, &FixedClock(1_000), id, outsider).unwrap_err();
        assert_eq!(err, Error::NotAParticipant);
    }
}
