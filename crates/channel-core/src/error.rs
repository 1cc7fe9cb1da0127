//! rejection reasons for the settlement protocol (spec §7)
//!
//! every error aborts the enclosing operation with no partial effects; the
//! core never retries or swallows an error into a success path.

use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    NoSuchChannel,
    NotAParticipant,
    NotOpen,
    NotOnChallenge,
    AlreadyClosed,
    ChallengePeriodExpired,
    ChallengePeriodActive,
    SelfChannel,
    ZeroDeposit,
    IdCollision,
    DoubleJoin,
    StaleNonce,
    ConservationViolation,
    InvalidSignature,
    TokenTransferFailed,
    Overflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NoSuchChannel => "no channel with that id",
            Error::NotAParticipant => "caller is not a party to this channel",
            Error::NotOpen => "channel is not OPEN",
            Error::NotOnChallenge => "channel is not ON_CHALLENGE",
            Error::AlreadyClosed => "channel is CLOSED",
            Error::ChallengePeriodExpired => "challenge period has elapsed",
            Error::ChallengePeriodActive => "challenge period has not elapsed",
            Error::SelfChannel => "partyA and counterparty must differ",
            Error::ZeroDeposit => "open requires a nonzero deposit",
            Error::IdCollision => "synthesized channel id already exists",
            Error::DoubleJoin => "join has already been called for this channel",
            Error::StaleNonce => "nonce must be strictly greater than the stored nonce",
            Error::ConservationViolation => "receipt balances do not sum to the escrowed total",
            Error::InvalidSignature => "signature does not recover to the expected party",
            Error::TokenTransferFailed => "token ledger rejected a transfer",
            Error::Overflow => "checked arithmetic overflowed",
        };
        f.write_str(msg)
    }
}

/// revert byte used on-chain, matching the teacher contracts' single-byte
/// numbered revert-code convention.
impl Error {
    pub fn revert_code(&self) -> u8 {
        match self {
            Error::NoSuchChannel => 0x01,
            Error::NotAParticipant => 0x02,
            Error::NotOpen => 0x03,
            Error::NotOnChallenge => 0x04,
            Error::AlreadyClosed => 0x05,
            Error::ChallengePeriodExpired => 0x06,
            Error::ChallengePeriodActive => 0x07,
            Error::SelfChannel => 0x08,
            Error::ZeroDeposit => 0x09,
            Error::IdCollision => 0x0a,
            Error::DoubleJoin => 0x0b,
            Error::StaleNonce => 0x0c,
            Error::ConservationViolation => 0x0d,
            Error::InvalidSignature => 0x0e,
            Error::TokenTransferFailed => 0x0f,
            Error::Overflow => 0x10,
        }
    }
}
