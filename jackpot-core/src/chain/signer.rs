use crate::chain::abi::keccak256;
use crate::chain::rlp;
use crate::error::{JackpotError, Result};
use crate::types::{Address, Wei};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

/// Pre-EIP-1559 transaction, signed with EIP-155 replay protection.
#[derive(Debug, Clone)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: Wei,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn base_fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp::encode_uint(self.nonce as u128),
            rlp::encode_uint(self.gas_price),
            rlp::encode_uint(self.gas_limit as u128),
            rlp::encode_bytes(&self.to.0),
            rlp::encode_uint(self.value.as_wei()),
            rlp::encode_bytes(&self.data),
        ]
    }

    pub fn signing_payload(&self) -> Vec<u8> {
        let mut fields = self.base_fields();
        fields.push(rlp::encode_uint(self.chain_id as u128));
        fields.push(rlp::encode_uint(0));
        fields.push(rlp::encode_uint(0));
        rlp::encode_list(&fields)
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.signing_payload())
    }
}

/// Signing key held in memory for the lifetime of the process.
pub struct LocalSigner {
    secp: Secp256k1<All>,
    secret: SecretKey,
    address: Address,
}

impl LocalSigner {
    pub fn from_hex(key: &str) -> Result<Self> {
        let trimmed = key.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(hex_part)
            .map_err(|e| JackpotError::signing(format!("Invalid private key hex: {}", e)))?;

        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| JackpotError::signing(format!("Invalid private key: {}", e)))?;

        let public = PublicKey::from_secret_key(&secp, &secret);
        let uncompressed = public.serialize_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..]);

        Ok(Self {
            secp,
            secret,
            address: Address(addr),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// RLP-encoded signed transaction, ready for `eth_sendRawTransaction`.
    pub fn sign_legacy(&self, tx: &LegacyTransaction) -> Result<Vec<u8>> {
        let message = Message::from_digest(tx.signing_hash());
        let signature = self.secp.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();

        let v = recovery_id.to_i32() as u128 + 35 + 2 * tx.chain_id as u128;

        let mut fields = tx.base_fields();
        fields.push(rlp::encode_uint(v));
        fields.push(rlp::encode_scalar(&compact[..32]));
        fields.push(rlp::encode_scalar(&compact[32..]));
        Ok(rlp::encode_list(&fields))
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eip155_example() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Address([0x35; 20]),
            value: Wei(1_000_000_000_000_000_000),
            data: Vec::new(),
            chain_id: 1,
        }
    }

    #[test]
    fn derives_address_from_key() {
        let signer =
            LocalSigner::from_hex("0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318")
                .unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn signing_payload_matches_eip155() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.signing_payload()),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn signs_eip155_example() {
        let signer = LocalSigner::from_hex(&"46".repeat(32)).unwrap();
        let raw = signer.sign_legacy(&eip155_example()).unwrap();
        assert_eq!(
            hex::encode(raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(LocalSigner::from_hex("not-hex").is_err());
        assert!(LocalSigner::from_hex("00").is_err());
    }
}
