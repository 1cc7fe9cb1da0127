//! Channel Demo CLI
//!
//! Off-chain companion to the on-chain settlement core: derive channel ids,
//! and sign/verify the receipts that `close`/`challenge` consume. Produces
//! the exact same byte layout and banner as `channel-core::encoding`, so
//! signatures generated here verify on-chain without modification.

use anyhow::{bail, Context, Result};
use channel_core::encoding::{channel_id_preimage, prefixed_digest_preimage, receipt_digest_preimage};
use channel_core::{Address, ChannelId, Ecrecover, Hasher, Signature65, U256};
use channel_crypto::{public_key_to_address, sign_prehash, EcdsaEcrecover, Keccak256Hasher};
use clap::{Parser, Subcommand};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;

#[derive(Parser)]
#[command(name = "channel-demo")]
#[command(about = "off-chain signer for the bilateral payment channel core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// generate a fresh secp256k1 keypair and its derived address
    Keygen,

    /// derive the deterministic channel id from its opening parameters
    ChannelId {
        #[arg(long)]
        token: String,
        #[arg(long)]
        party_a: String,
        #[arg(long)]
        party_b: String,
        #[arg(long)]
        block_number: u64,
    },

    /// sign a receipt `(channel_id, balance_a, balance_b, nonce)` with a raw private key
    SignReceipt {
        #[arg(long)]
        private_key: String,
        #[arg(long)]
        channel_id: String,
        #[arg(long)]
        nonce: String,
        #[arg(long)]
        balance_a: String,
        #[arg(long)]
        balance_b: String,
    },

    /// recover the signer of a receipt signature and compare it to an expected address
    VerifyReceipt {
        #[arg(long)]
        channel_id: String,
        #[arg(long)]
        nonce: String,
        #[arg(long)]
        balance_a: String,
        #[arg(long)]
        balance_b: String,
        #[arg(long)]
        signature: String,
        #[arg(long)]
        expected_signer: String,
    },
}

fn parse_hex32(label: &str, s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s.trim_start_matches("0x")).with_context(|| format!("{label}: invalid hex"))?;
    bytes.try_into().map_err(|_| anyhow::anyhow!("{label}: expected 32 bytes"))
}

fn parse_address(label: &str, s: &str) -> Result<Address> {
    let bytes = hex::decode(s.trim_start_matches("0x")).with_context(|| format!("{label}: invalid hex"))?;
    if bytes.len() != 20 {
        bail!("{label}: expected 20 bytes, got {}", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}

fn parse_u256(label: &str, s: &str) -> Result<U256> {
    U256::from_dec_str(s).or_else(|_| U256::from_str_radix(s.trim_start_matches("0x"), 16)).with_context(|| format!("{label}: invalid integer"))
}

fn receipt_prefixed_digest(hasher: &Keccak256Hasher, channel_id: ChannelId, balance_a: U256, balance_b: U256, nonce: U256) -> [u8; 32] {
    let preimage = receipt_digest_preimage(channel_id, balance_a, balance_b, nonce);
    let digest = hasher.keccak256(&preimage);
    hasher.keccak256(&prefixed_digest_preimage(digest))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let hasher = Keccak256Hasher;

    match cli.command {
        Commands::Keygen => {
            let signing_key = SigningKey::random(&mut OsRng);
            let address = public_key_to_address(signing_key.verifying_key());
            println!("private_key: 0x{}", hex::encode(signing_key.to_bytes()));
            println!("address:     0x{}", hex::encode(address.as_bytes()));
        }

        Commands::ChannelId { token, party_a, party_b, block_number } => {
            let token = parse_address("token", &token)?;
            let party_a = parse_address("party_a", &party_a)?;
            let party_b = parse_address("party_b", &party_b)?;
            let preimage = channel_id_preimage(token, party_a, party_b, block_number);
            let id = hasher.keccak256(&preimage);
            println!("channel_id: 0x{}", hex::encode(id));
        }

        Commands::SignReceipt { private_key, channel_id, nonce, balance_a, balance_b } => {
            let key_bytes = parse_hex32("private_key", &private_key)?;
            let signing_key = SigningKey::from_slice(&key_bytes).context("invalid secp256k1 private key")?;

            let channel_id = ChannelId::from(parse_hex32("channel_id", &channel_id)?);
            let nonce = parse_u256("nonce", &nonce)?;
            let balance_a = parse_u256("balance_a", &balance_a)?;
            let balance_b = parse_u256("balance_b", &balance_b)?;

            let prefixed = receipt_prefixed_digest(&hasher, channel_id, balance_a, balance_b, nonce);
            let sig = sign_prehash(&signing_key, prefixed);

            println!("r: 0x{}", hex::encode(sig.r));
            println!("s: 0x{}", hex::encode(sig.s));
            println!("v: {}", sig.v);
            println!("signer: 0x{}", hex::encode(public_key_to_address(signing_key.verifying_key()).as_bytes()));
        }

        Commands::VerifyReceipt { channel_id, nonce, balance_a, balance_b, signature, expected_signer } => {
            let channel_id = ChannelId::from(parse_hex32("channel_id", &channel_id)?);
            let nonce = parse_u256("nonce", &nonce)?;
            let balance_a = parse_u256("balance_a", &balance_a)?;
            let balance_b = parse_u256("balance_b", &balance_b)?;
            let expected = parse_address("expected_signer", &expected_signer)?;

            let sig_bytes = hex::decode(signature.trim_start_matches("0x")).context("signature: invalid hex")?;
            if sig_bytes.len() != 65 {
                bail!("signature: expected 65 bytes, got {}", sig_bytes.len());
            }
            let sig_array: [u8; 65] = sig_bytes.try_into().unwrap();
            let sig = Signature65::from_bytes(&sig_array);

            let prefixed = receipt_prefixed_digest(&hasher, channel_id, balance_a, balance_b, nonce);
            let recovered = EcdsaEcrecover.ecrecover(prefixed, &sig);

            match recovered {
                Some(addr) if addr == expected => println!("VALID: recovered 0x{}", hex::encode(addr.as_bytes())),
                Some(addr) => println!("INVALID: recovered 0x{} does not match expected", hex::encode(addr.as_bytes())),
                None => println!("INVALID: signature does not recover"),
            }
        }
    }

    Ok(())
}
