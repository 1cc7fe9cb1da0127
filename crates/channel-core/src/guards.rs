//! composable precondition checks (spec §4, Design Note)
//!
//! each guard borrows a `Channel` and returns `Result<(), Error>` so
//! `settlement` operations read as a straight-line chain of `?`s instead of
//! nested `if`s repeated across every entrypoint.

use crate::error::Error;
use crate::types::{Address, Channel, ChannelStatus, Timestamp};

pub fn valid_channel(channel: Option<&Channel>) -> Result<&Channel, Error> {
    channel.ok_or(Error::NoSuchChannel)
}

pub fn only_parties(channel: &Channel, caller: Address) -> Result<(), Error> {
    if channel.is_party(caller) {
        Ok(())
    } else {
        Err(Error::NotAParticipant)
    }
}

pub fn is_open(channel: &Channel) -> Result<(), Error> {
    match channel.status {
        ChannelStatus::Open => Ok(()),
        _ => Err(Error::NotOpen),
    }
}

pub fn is_on_challenge(channel: &Channel) -> Result<(), Error> {
    match channel.status {
        ChannelStatus::OnChallenge => Ok(()),
        _ => Err(Error::NotOnChallenge),
    }
}

pub fn not_closed(channel: &Channel) -> Result<(), Error> {
    match channel.status {
        ChannelStatus::Closed => Err(Error::AlreadyClosed),
        _ => Ok(()),
    }
}

/// the dispute window is still open: `now <= close_time + challenge_period`.
pub fn is_during_challenge_period(channel: &Channel, now: Timestamp) -> Result<(), Error> {
    let deadline = channel.challenge_deadline().ok_or(Error::Overflow)?;
    if now <= deadline {
        Ok(())
    } else {
        Err(Error::ChallengePeriodExpired)
    }
}

/// the dispute window has elapsed: `now > close_time + challenge_period`.
pub fn challenge_period_was_over(channel: &Channel, now: Timestamp) -> Result<(), Error> {
    let deadline = channel.challenge_deadline().ok_or(Error::Overflow)?;
    if now > deadline {
        Ok(())
    } else {
        Err(Error::ChallengePeriodActive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelId, U256};

    fn sample(status: ChannelStatus) -> Channel {
        Channel {
            id: ChannelId::zero(),
            token: Address::zero(),
            party_a: Address::repeat_byte(1),
            party_b: Address::repeat_byte(2),
            balance_a: U256::from(10),
            balance_b: U256::from(10),
            nonce: U256::zero(),
            close_time: 100,
            challenge_period: 50,
            status,
            joined: true,
        }
    }

    #[test]
    fn only_parties_rejects_strangers() {
        let channel = sample(ChannelStatus::Open);
        assert!(only_parties(&channel, Address::repeat_byte(1)).is_ok());
        assert!(only_parties(&channel, Address::repeat_byte(9)).is_err());
    }

    #[test]
    fn challenge_window_boundaries() {
        let channel = sample(ChannelStatus::OnChallenge);
        assert!(is_during_challenge_period(&channel, 150).is_ok());
        assert!(is_during_challenge_period(&channel, 151).is_err());
        assert!(challenge_period_was_over(&channel, 151).is_ok());
        assert!(challenge_period_was_over(&channel, 150).is_err());
    }

    #[test]
    fn status_guards() {
        let open = sample(ChannelStatus::Open);
        let disputed = sample(ChannelStatus::OnChallenge);
        let closed = sample(ChannelStatus::Closed);

        assert!(is_open(&open).is_ok());
        assert!(is_open(&disputed).is_err());
        assert!(is_on_challenge(&disputed).is_ok());
        assert!(is_on_challenge(&open).is_err());
        assert!(not_closed(&open).is_ok());
        assert!(not_closed(&closed).is_err());
    }
}
