//! Sponsor keypair: the single server-owned account that signs and pays for
//! every submitted transaction.
//!
//! Three secret encodings are accepted:
//! - a 12/24-word BIP-39 mnemonic, derived along Sui's default path
//!   `m/44'/784'/0'/0'/0'` (SLIP-0010 ed25519);
//! - a bech32 string prefixed `suiprivkey` (flag byte + 32-byte secret);
//! - 64 hex characters, optionally `0x`-prefixed.

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bech32::FromBase32;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey};
use hmac::{Hmac, Mac};
use sha2::Sha512;

type Blake2b256 = Blake2b<U32>;
type HmacSha512 = Hmac<Sha512>;

/// Sui scheme flag for ed25519 keys, used in both the serialized signature
/// and the address preimage.
const ED25519_FLAG: u8 = 0x00;
const BECH32_HRP: &str = "suiprivkey";
/// m/44'/784'/0'/0'/0'; every segment hardened.
const DERIVATION_PATH: [u32; 5] = [44, 784, 0, 0, 0];

const ACCEPTED_FORMS: &str = "expected one of: a 12/24-word mnemonic, \
     a bech32 string prefixed 'suiprivkey', or 64 hex characters (optional 0x prefix)";

#[derive(Debug)]
pub struct SponsorKeypair {
    signing_key: SigningKey,
    address: String,
}

impl SponsorKeypair {
    /// Decode a sponsor secret in any of the three accepted encodings.
    pub fn from_encoded(secret: &str) -> Result<Self> {
        let s = secret.trim();

        let seed = if s.starts_with(BECH32_HRP) {
            decode_bech32(s).with_context(|| format!("invalid sponsor secret; {ACCEPTED_FORMS}"))?
        } else if looks_like_hex(s) {
            decode_hex(s).with_context(|| format!("invalid sponsor secret; {ACCEPTED_FORMS}"))?
        } else if s.split_whitespace().count() >= 12 {
            derive_from_mnemonic(s)
                .with_context(|| format!("invalid sponsor secret; {ACCEPTED_FORMS}"))?
        } else {
            bail!("unrecognized sponsor secret encoding; {ACCEPTED_FORMS}");
        };

        let signing_key = SigningKey::from_bytes(&seed);
        let address = derive_address(&signing_key);

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// 0x-prefixed 32-byte Sui address derived from the public key.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign base64 transaction bytes the way Sui expects: blake2b-256 over
    /// the intent-prefixed payload, serialized as `flag || sig || pubkey`
    /// in base64.
    pub fn sign_transaction(&self, tx_bytes_b64: &str) -> Result<String> {
        let tx_bytes = BASE64
            .decode(tx_bytes_b64)
            .context("transaction bytes are not valid base64")?;

        // IntentScope::TransactionData, version 0, app id Sui.
        let mut message = vec![0u8, 0u8, 0u8];
        message.extend_from_slice(&tx_bytes);

        let mut hasher = Blake2b256::new();
        hasher.update(&message);
        let digest = hasher.finalize();

        let signature = self.signing_key.sign(digest.as_slice());

        let mut serialized = Vec::with_capacity(1 + 64 + 32);
        serialized.push(ED25519_FLAG);
        serialized.extend_from_slice(&signature.to_bytes());
        serialized.extend_from_slice(self.signing_key.verifying_key().as_bytes());

        Ok(BASE64.encode(serialized))
    }
}

fn derive_address(signing_key: &SigningKey) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update([ED25519_FLAG]);
    hasher.update(signing_key.verifying_key().as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

fn looks_like_hex(s: &str) -> bool {
    let h = s.strip_prefix("0x").unwrap_or(s);
    h.len() == 64 && h.chars().all(|c| c.is_ascii_hexdigit())
}

fn decode_hex(s: &str) -> Result<[u8; 32]> {
    let h = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(h).context("invalid hex secret")?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("hex secret must decode to exactly 32 bytes"))
}

fn decode_bech32(s: &str) -> Result<[u8; 32]> {
    let (hrp, data, _variant) = bech32::decode(s).context("bech32 decode failed")?;
    if hrp != BECH32_HRP {
        bail!("bech32 prefix must be '{BECH32_HRP}' (got '{hrp}')");
    }
    let bytes = Vec::<u8>::from_base32(&data).context("bech32 payload decode failed")?;
    // flag byte + 32-byte secret
    if bytes.len() != 33 || bytes[0] != ED25519_FLAG {
        bail!("bech32 payload must be an ed25519 flag byte plus a 32-byte secret");
    }
    bytes[1..]
        .try_into()
        .map_err(|_| anyhow!("bech32 secret must be 32 bytes"))
}

fn derive_from_mnemonic(phrase: &str) -> Result<[u8; 32]> {
    let mnemonic = bip39::Mnemonic::parse(phrase).context("invalid mnemonic")?;
    let seed = mnemonic.to_seed("");

    // SLIP-0010 ed25519 master key, then hardened child derivation.
    let mut mac =
        HmacSha512::new_from_slice(b"ed25519 seed").expect("hmac accepts any key length");
    mac.update(&seed);
    let out = mac.finalize().into_bytes();

    let mut key: [u8; 32] = out[..32].try_into().expect("hmac output is 64 bytes");
    let mut chain_code: [u8; 32] = out[32..].try_into().expect("hmac output is 64 bytes");

    for segment in DERIVATION_PATH {
        let hardened = 0x8000_0000u32 | segment;
        let mut mac =
            HmacSha512::new_from_slice(&chain_code).expect("hmac accepts any key length");
        mac.update(&[0u8]);
        mac.update(&key);
        mac.update(&hardened.to_be_bytes());
        let out = mac.finalize().into_bytes();
        key = out[..32].try_into().expect("hmac output is 64 bytes");
        chain_code = out[32..].try_into().expect("hmac output is 64 bytes");
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_SECRET: &str = "9bf49a6a0755f953811fce125f2683d50429c3bb49e074147e0089a52eae155f";

    #[test]
    fn hex_secret_with_and_without_prefix_agree() {
        let a = SponsorKeypair::from_encoded(HEX_SECRET).unwrap();
        let b = SponsorKeypair::from_encoded(&format!("0x{HEX_SECRET}")).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(a.address().starts_with("0x"));
        // 32 bytes of hex after the prefix.
        assert_eq!(a.address().len(), 2 + 64);
    }

    #[test]
    fn mnemonic_is_accepted_and_deterministic() {
        let phrase =
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        let a = SponsorKeypair::from_encoded(phrase).unwrap();
        let b = SponsorKeypair::from_encoded(phrase).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn malformed_secret_enumerates_accepted_forms() {
        let err = SponsorKeypair::from_encoded("definitely-not-a-key").unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("mnemonic"));
        assert!(msg.contains("suiprivkey"));
        assert!(msg.contains("64 hex"));
    }

    #[test]
    fn bad_mnemonic_word_fails() {
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon zzzz";
        assert!(SponsorKeypair::from_encoded(phrase).is_err());
    }

    #[test]
    fn wrong_bech32_hrp_fails() {
        // Valid bech32, wrong human-readable prefix.
        let err = SponsorKeypair::from_encoded("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
            .unwrap_err();
        assert!(format!("{err:#}").contains("suiprivkey") || format!("{err:#}").contains("forms"));
    }

    #[test]
    fn signature_is_flag_sig_pubkey() {
        let kp = SponsorKeypair::from_encoded(HEX_SECRET).unwrap();
        let sig_b64 = kp.sign_transaction(&BASE64.encode(b"tx-bytes")).unwrap();
        let raw = BASE64.decode(sig_b64).unwrap();
        assert_eq!(raw.len(), 1 + 64 + 32);
        assert_eq!(raw[0], ED25519_FLAG);
    }

    #[test]
    fn non_base64_tx_bytes_rejected() {
        let kp = SponsorKeypair::from_encoded(HEX_SECRET).unwrap();
        assert!(kp.sign_transaction("%%%not-base64%%%").is_err());
    }
}
