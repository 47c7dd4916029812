//! Minimal Solidity ABI support: function selectors, static argument
//! encoding and decoding of the return shapes the jackpot contracts use.

use crate::error::{JackpotError, Result};
use crate::types::{Address, Wei};
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// First four bytes of `keccak256("name(types)")`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

#[derive(Debug, Clone, Copy)]
pub enum Token {
    Uint(u128),
    Address(Address),
}

/// Selector followed by one 32-byte word per static argument.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        let mut word = [0u8; WORD];
        match arg {
            Token::Uint(v) => word[16..].copy_from_slice(&v.to_be_bytes()),
            Token::Address(a) => word[12..].copy_from_slice(&a.0),
        }
        data.extend_from_slice(&word);
    }
    data
}

/// Read-only view over ABI-encoded return data.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at_byte(&self, offset: usize) -> Result<&'a [u8]> {
        let end = offset
            .checked_add(WORD)
            .ok_or_else(|| JackpotError::abi("offset out of range"))?;
        self.data.get(offset..end).ok_or_else(|| {
            JackpotError::abi(format!(
                "return data too short: need {} bytes, have {}",
                end,
                self.data.len()
            ))
        })
    }

    fn uint_at_byte(&self, offset: usize) -> Result<u128> {
        let word = self.word_at_byte(offset)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(JackpotError::abi("uint256 value exceeds 128 bits"));
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(buf))
    }

    fn u64_at_byte(&self, offset: usize) -> Result<u64> {
        let value = self.uint_at_byte(offset)?;
        u64::try_from(value).map_err(|_| JackpotError::abi("value exceeds 64 bits"))
    }

    pub fn u128(&self, index: usize) -> Result<u128> {
        self.uint_at_byte(index * WORD)
    }

    pub fn u64(&self, index: usize) -> Result<u64> {
        self.u64_at_byte(index * WORD)
    }

    pub fn wei(&self, index: usize) -> Result<Wei> {
        self.u128(index).map(Wei)
    }

    pub fn bool(&self, index: usize) -> Result<bool> {
        match self.u64(index)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(JackpotError::abi(format!("invalid bool word: {}", other))),
        }
    }

    pub fn address(&self, index: usize) -> Result<Address> {
        let word = self.word_at_byte(index * WORD)?;
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&word[12..]);
        Ok(Address(addr))
    }

    fn dynamic_start(&self, index: usize) -> Result<(usize, usize)> {
        let offset = usize::try_from(self.u64(index)?)
            .map_err(|_| JackpotError::abi("offset out of range"))?;
        let len = usize::try_from(self.u64_at_byte(offset)?)
            .map_err(|_| JackpotError::abi("length out of range"))?;
        // offset points at a word that was just read, so this cannot overflow
        Ok((offset + WORD, len))
    }

    /// Checks that `len` items of `stride` bytes fit after `start`.
    fn check_fits(&self, start: usize, len: usize, stride: usize) -> Result<()> {
        let available = self.data.len().saturating_sub(start);
        if stride == 0 || len > available / stride {
            return Err(JackpotError::abi(format!(
                "array of {} items exceeds return data",
                len
            )));
        }
        Ok(())
    }

    /// `uint256[]` whose head sits at word `index`.
    pub fn u64_array(&self, index: usize) -> Result<Vec<u64>> {
        let (start, len) = self.dynamic_start(index)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        self.check_fits(start, len, WORD)?;
        (0..len)
            .map(|i| self.u64_at_byte(start + i * WORD))
            .collect()
    }

    /// Array of static tuples, `width` words each.
    pub fn tuple_array(&self, index: usize, width: usize) -> Result<Vec<Decoder<'a>>> {
        let (start, len) = self.dynamic_start(index)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let stride = width
            .checked_mul(WORD)
            .ok_or_else(|| JackpotError::abi("tuple width out of range"))?;
        self.check_fits(start, len, stride)?;
        Ok((0..len)
            .map(|i| Decoder::new(&self.data[start + i * stride..start + (i + 1) * stride]))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Encoders for building fake return data in tests.
    use super::*;

    pub fn word_u128(v: u128) -> [u8; WORD] {
        let mut word = [0u8; WORD];
        word[16..].copy_from_slice(&v.to_be_bytes());
        word
    }

    pub fn word_address(a: &Address) -> [u8; WORD] {
        let mut word = [0u8; WORD];
        word[12..].copy_from_slice(&a.0);
        word
    }

    pub fn encode_u64_array(values: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&word_u128(WORD as u128));
        out.extend_from_slice(&word_u128(values.len() as u128));
        for v in values {
            out.extend_from_slice(&word_u128(*v as u128));
        }
        out
    }
}
