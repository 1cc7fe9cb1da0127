//! Bilateral payment channel settlement contract for Revive/PolkaVM
//!
//! Flow:
//! 1. party A opens a channel against a counterparty, escrowing a deposit
//! 2. party B joins once, escrowing its own deposit (may be zero)
//! 3. either party closes with a receipt signed by the other, starting the
//!    challenge period
//! 4. either party may challenge with a fresher signed receipt before the
//!    period elapses
//! 5. anyone may redeem once the period has elapsed, paying out the last
//!    accepted balances

#![feature(alloc_error_handler)]
#![no_main]
#![no_std]
#![allow(static_mut_refs)]

extern crate alloc;

use channel_core::{
    settlement, Address, Balance, Channel, ChannelEvent, ChannelId, ChannelStore, Clock, Ecrecover, Error, EventSink, Hasher,
    Receipt, Signature65, TokenLedger, U256,
};
use parity_scale_codec::{Decode, Encode};
use uapi::{HostFn, HostFnImpl as api, ReturnFlags, StorageFlags};

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe {
        core::arch::asm!("unimp");
        core::hint::unreachable_unchecked();
    }
}

mod alloc_support {
    use core::{
        alloc::{GlobalAlloc, Layout},
        sync::atomic::{AtomicUsize, Ordering},
    };

    pub struct BumpAllocator {
        offset: AtomicUsize,
    }

    const HEAP_SIZE: usize = 64 * 1024;

    #[link_section = ".bss.heap"]
    static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

    unsafe impl GlobalAlloc for BumpAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let align = layout.align().max(8);
            let size = layout.size();
            let mut offset = self.offset.load(Ordering::Relaxed);
            loop {
                let aligned = (offset + align - 1) & !(align - 1);
                if aligned + size > HEAP_SIZE {
                    return core::ptr::null_mut();
                }
                match self.offset.compare_exchange_weak(
                    offset,
                    aligned + size,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let heap_ptr = HEAP.as_ptr() as *mut u8;
                        return heap_ptr.add(aligned);
                    }
                    Err(o) => offset = o,
                }
            }
        }
        unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {}
    }

    #[global_allocator]
    static GLOBAL: BumpAllocator = BumpAllocator {
        offset: AtomicUsize::new(0),
    };

    #[alloc_error_handler]
    fn alloc_error(_layout: Layout) -> ! {
        unsafe {
            core::arch::asm!("unimp");
            core::hint::unreachable_unchecked();
        }
    }
}

// ============================================================================
// ENVIRONMENT: channel-core's trait seams, backed by hostcalls
// ============================================================================

struct HostHasher;
impl Hasher for HostHasher {
    fn keccak256(&self, input: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        api::hash_keccak_256(input, &mut out);
        out
    }
}

struct HostEcrecover;
impl Ecrecover for HostEcrecover {
    fn ecrecover(&self, prefixed_digest: [u8; 32], sig: &Signature65) -> Option<Address> {
        let mut raw_sig = [0u8; 65];
        raw_sig[..32].copy_from_slice(&sig.r);
        raw_sig[32..64].copy_from_slice(&sig.s);
        // hostcall wants a bare recovery id (0/1); off-chain tooling signs
        // Ethereum-style (27/28).
        raw_sig[64] = if sig.v >= 27 { sig.v - 27 } else { sig.v };
        let mut pubkey = [0u8; 33];
        if api::ecdsa_recover(&raw_sig, &prefixed_digest, &mut pubkey).is_err() {
            return None;
        }
        let mut hash = [0u8; 32];
        api::hash_keccak_256(&pubkey[1..], &mut hash);
        Some(Address::from_slice(&hash[12..32]))
    }
}

struct HostClock;
impl Clock for HostClock {
    fn now(&self) -> channel_core::Timestamp {
        api::block_number() as u64
    }
}

/// the native asset. all deposits/payouts in this deployment use it — the
/// `token` field is carried end-to-end so a future cross-contract ERC20
/// gateway can specialize the same settlement core without changing the
/// storage layout (see DESIGN.md).
const NATIVE_TOKEN: Address = Address::zero();

struct HostLedger {
    /// value attached to the current call, read once at entry.
    attached_value: Balance,
}

impl TokenLedger for HostLedger {
    type Error = ();

    fn pull(&mut self, _token: Address, _from: Address, amount: Balance) -> Result<(), ()> {
        // native value arrives atomically with the call; "pulling" it is
        // just confirming the caller attached exactly what they claim.
        if self.attached_value == amount {
            Ok(())
        } else {
            Err(())
        }
    }

    fn push(&mut self, _token: Address, to: Address, amount: Balance) -> Result<(), ()> {
        let mut amount_be = [0u8; 32];
        amount.to_big_endian(&mut amount_be);
        api::transfer(&to.to_fixed_bytes(), &amount_be).map_err(|_| ())
    }
}

struct HostStore;

const CHANNEL_PREFIX: u8 = 0x10;

fn channel_key(id: ChannelId) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = CHANNEL_PREFIX;
    key[1..33].copy_from_slice(id.as_bytes());
    key
}

/// channels SCALE-encode to a fixed width (no variable-length fields), so a
/// generously-sized fixed buffer avoids relying on the hostcall reporting
/// back how many bytes it actually wrote.
const CHANNEL_BUF_LEN: usize = 256;

impl ChannelStore for HostStore {
    fn get(&self, id: ChannelId) -> Option<Channel> {
        let key = channel_key(id);
        let mut buf = [0u8; CHANNEL_BUF_LEN];
        let mut slice = &mut buf[..];
        if api::get_storage(StorageFlags::empty(), &key, &mut slice).is_err() {
            return None;
        }
        Channel::decode(&mut &buf[..]).ok()
    }

    fn put(&mut self, channel: Channel) {
        let key = channel_key(channel.id);
        let encoded = channel.encode();
        let _ = api::set_storage(StorageFlags::empty(), &key, &encoded);
    }
}

struct HostEventSink;
impl EventSink for HostEventSink {
    fn emit(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::ChannelOpened { id, party_a, party_b } => {
                emit2(b"ChannelOpened(bytes32,address,address)", id, party_a, Some(party_b))
            }
            ChannelEvent::CounterPartyJoined { id } => emit1(b"CounterPartyJoined(bytes32)", id),
            ChannelEvent::ChannelOnChallenge { id } => emit1(b"ChannelOnChallenge(bytes32)", id),
            ChannelEvent::ChannelChallenged { id } => emit1(b"ChannelChallenged(bytes32)", id),
            ChannelEvent::ChannelClosed { id } => emit1(b"ChannelClosed(bytes32)", id),
        }
    }
}

fn emit1(signature: &[u8], id: ChannelId) {
    let mut topic0 = [0u8; 32];
    api::hash_keccak_256(signature, &mut topic0);
    let topics = [topic0, *id.as_fixed_bytes()];
    api::deposit_event(&topics, &[]);
}

fn emit2(signature: &[u8], id: ChannelId, addr_a: Address, addr_b: Option<Address>) {
    let mut topic0 = [0u8; 32];
    api::hash_keccak_256(signature, &mut topic0);
    let mut data = alloc::vec::Vec::with_capacity(64);
    let mut padded = [0u8; 32];
    padded[12..32].copy_from_slice(addr_a.as_bytes());
    data.extend_from_slice(&padded);
    if let Some(b) = addr_b {
        let mut padded_b = [0u8; 32];
        padded_b[12..32].copy_from_slice(b.as_bytes());
        data.extend_from_slice(&padded_b);
    }
    let topics = [topic0, *id.as_fixed_bytes()];
    api::deposit_event(&topics, &data);
}

// ============================================================================
// CALLDATA HELPERS
// ============================================================================

#[inline(always)]
fn sel(signature: &str) -> [u8; 4] {
    let mut h = [0u8; 32];
    api::hash_keccak_256(signature.as_bytes(), &mut h);
    [h[0], h[1], h[2], h[3]]
}

fn read_u256(buf: &[u8], word: usize) -> U256 {
    U256::from_big_endian(&buf[word * 32..word * 32 + 32])
}

fn read_address(buf: &[u8], word: usize) -> Address {
    Address::from_slice(&buf[word * 32 + 12..word * 32 + 32])
}

fn read_u64(buf: &[u8], word: usize) -> u64 {
    u64::from_be_bytes(buf[word * 32 + 24..word * 32 + 32].try_into().unwrap())
}

fn read_signature(buf: &[u8], first_word: usize) -> Signature65 {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&buf[first_word * 32..first_word * 32 + 32]);
    s.copy_from_slice(&buf[(first_word + 1) * 32..(first_word + 1) * 32 + 32]);
    let v = buf[(first_word + 2) * 32 + 31];
    Signature65 { r, s, v }
}

fn caller_address() -> Address {
    let mut caller = [0u8; 20];
    api::caller(&mut caller);
    Address::from(caller)
}

fn attached_value() -> Balance {
    let mut value_bytes = [0u8; 32];
    api::value_transferred(&mut value_bytes);
    U256::from_big_endian(&value_bytes)
}

fn revert_with(err: Error) -> ! {
    api::return_value(ReturnFlags::REVERT, &[err.revert_code()]);
    unreachable!()
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

#[polkavm_derive::polkavm_export]
pub extern "C" fn deploy() {}

#[polkavm_derive::polkavm_export]
pub extern "C" fn call() {
    let input_len = api::call_data_size() as usize;
    if input_len < 4 {
        revert_with(Error::NoSuchChannel);
    }

    let mut selector = [0u8; 4];
    api::call_data_copy(&mut selector, 0);

    let hasher = HostHasher;
    let ecrecover = HostEcrecover;
    let clock = HostClock;
    let mut store = HostStore;
    let mut events = HostEventSink;

    // openChannel(address counterparty, uint64 challengePeriod) payable
    if selector == sel("openChannel(address,uint64)") {
        if input_len < 4 + 64 {
            revert_with(Error::NoSuchChannel);
        }
        let mut body = [0u8; 64];
        api::call_data_copy(&mut body, 4);
        let counterparty = read_address(&body, 0);
        let challenge_period = read_u64(&body, 1);

        let caller = caller_address();
        let deposit = attached_value();
        let mut ledger = HostLedger { attached_value: deposit };
        let block_number = api::block_number() as u64;

        match settlement::open(
            &hasher,
            &mut ledger,
            &mut store,
            &mut events,
            caller,
            counterparty,
            NATIVE_TOKEN,
            deposit,
            block_number,
            challenge_period,
        ) {
            Ok(id) => api::return_value(ReturnFlags::empty(), id.as_bytes()),
            Err(e) => revert_with(e),
        }
    }
    // join(bytes32 channelId) payable
    else if selector == sel("join(bytes32)") {
        if input_len < 4 + 32 {
            revert_with(Error::NoSuchChannel);
        }
        let mut body = [0u8; 32];
        api::call_data_copy(&mut body, 4);
        let id = ChannelId::from_slice(&body);

        let caller = caller_address();
        let deposit = attached_value();
        let mut ledger = HostLedger { attached_value: deposit };

        match settlement::join(&mut ledger, &mut store, &mut events, id, caller, deposit) {
            Ok(()) => api::return_value(ReturnFlags::empty(), &[]),
            Err(e) => revert_with(e),
        }
    }
    // close(bytes32 channelId, uint256 nonce, uint256 balanceA, uint256 balanceB,
    //       bytes32 rA, bytes32 sA, uint8 vA, bytes32 rB, bytes32 sB, uint8 vB)
    else if selector == sel("close(bytes32,uint256,uint256,uint256,bytes32,bytes32,uint8,bytes32,bytes32,uint8)") {
        if input_len < 4 + 32 * 10 {
            revert_with(Error::NoSuchChannel);
        }
        let mut body = [0u8; 32 * 10];
        api::call_data_copy(&mut body, 4);
        let id = ChannelId::from_slice(&body[0..32]);
        let receipt = Receipt {
            channel_id: id,
            nonce: read_u256(&body, 1),
            balance_a: read_u256(&body, 2),
            balance_b: read_u256(&body, 3),
        };
        let sig_a = read_signature(&body, 4);
        let sig_b = read_signature(&body, 7);
        let caller = caller_address();
        let mut ledger = HostLedger { attached_value: Balance::zero() };

        match settlement::close(&hasher, &ecrecover, &mut ledger, &mut store, &mut events, &clock, id, caller, receipt, sig_a, sig_b) {
            Ok(()) => api::return_value(ReturnFlags::empty(), &[]),
            Err(e) => revert_with(e),
        }
    }
    // challenge(bytes32 channelId, uint256 nonce, uint256 balanceA, uint256 balanceB,
    //           bytes32 rA, bytes32 sA, uint8 vA, bytes32 rB, bytes32 sB, uint8 vB)
    else if selector == sel("challenge(bytes32,uint256,uint256,uint256,bytes32,bytes32,uint8,bytes32,bytes32,uint8)") {
        if input_len < 4 + 32 * 10 {
            revert_with(Error::NoSuchChannel);
        }
        let mut body = [0u8; 32 * 10];
        api::call_data_copy(&mut body, 4);
        let id = ChannelId::from_slice(&body[0..32]);
        let receipt = Receipt {
            channel_id: id,
            nonce: read_u256(&body, 1),
            balance_a: read_u256(&body, 2),
            balance_b: read_u256(&body, 3),
        };
        let sig_a = read_signature(&body, 4);
        let sig_b = read_signature(&body, 7);
        let caller = caller_address();

        match settlement::challenge(&hasher, &ecrecover, &mut store, &mut events, &clock, id, caller, receipt, sig_a, sig_b) {
            Ok(()) => api::return_value(ReturnFlags::empty(), &[]),
            Err(e) => revert_with(e),
        }
    }
    // redeem(bytes32 channelId)
    else if selector == sel("redeem(bytes32)") {
        let mut body = [0u8; 32];
        api::call_data_copy(&mut body, 4);
        let id = ChannelId::from_slice(&body);
        let caller = caller_address();
        let mut ledger = HostLedger { attached_value: Balance::zero() };

        match settlement::redeem(&mut ledger, &mut store, &mut events, &clock, id, caller) {
            Ok(()) => api::return_value(ReturnFlags::empty(), &[]),
            Err(e) => revert_with(e),
        }
    }
    // getChannel(bytes32 channelId) -> scale-encoded Channel
    else if selector == sel("getChannel(bytes32)") {
        let mut body = [0u8; 32];
        api::call_data_copy(&mut body, 4);
        let id = ChannelId::from_slice(&body);
        match store.get(id) {
            Some(channel) => api::return_value(ReturnFlags::empty(), &channel.encode()),
            None => revert_with(Error::NoSuchChannel),
        }
    } else {
        api::return_value(ReturnFlags::REVERT, &[0xff]);
    }
}
