//! Minimal EVM call-data encoding and return-word decoding for view calls

use sha3::{Digest, Keccak256};

use crate::shared::errors::RpcError;

pub const WORD: usize = 32;

/// First four bytes of keccak256 of the function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Call data for a function without arguments
pub fn encode_call(signature: &str) -> Vec<u8> {
    selector(signature).to_vec()
}

/// Call data for a function taking a single address
pub fn encode_call_address(signature: &str, address: &str) -> Result<Vec<u8>, RpcError> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode_address(address)?);
    Ok(data)
}

/// Call data for a function taking a single uint256
pub fn encode_call_uint(signature: &str, value: u128) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode_uint(value));
    data
}

pub fn encode_address(address: &str) -> Result<[u8; WORD], RpcError> {
    let body = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    let bytes = hex::decode(body).map_err(|e| RpcError::Decode(format!("bad address {}: {}", address, e)))?;
    if bytes.len() != 20 {
        return Err(RpcError::Decode(format!("address {} is not 20 bytes", address)));
    }
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

pub fn encode_uint(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_at(data: &[u8], index: usize) -> Result<&[u8], RpcError> {
    let start = index * WORD;
    data.get(start..start + WORD).ok_or_else(|| {
        RpcError::Decode(format!("return data has {} bytes, word {} missing", data.len(), index))
    })
}

/// Decode word `index` as an unsigned integer that must fit in 128 bits
pub fn decode_uint(data: &[u8], index: usize) -> Result<u128, RpcError> {
    let word = word_at(data, index)?;
    if word[..16].iter().any(|b| *b != 0) {
        return Err(RpcError::Decode(format!("word {} overflows u128", index)));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(buf))
}

/// Decode word `index` as an address, returned as 0x-prefixed lowercase hex
pub fn decode_address(data: &[u8], index: usize) -> Result<String, RpcError> {
    let word = word_at(data, index)?;
    if word[..12].iter().any(|b| *b != 0) {
        return Err(RpcError::Decode(format!("word {} is not an address", index)));
    }
    Ok(format!("0x{}", hex::encode(&word[12..])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector("decimals()")), "313ce567");
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
        assert_eq!(hex::encode(selector("totalAssets()")), "01e1d114");
    }

    #[test]
    fn test_encode_call_address() {
        let data = encode_call_address("balanceOf(address)", "0x73E4C11B670Ef9C025A030A20b72CB9150E54523").unwrap();
        assert_eq!(data.len(), 4 + WORD);
        assert_eq!(hex::encode(&data[16..]), "73e4c11b670ef9c025a030a20b72cb9150e54523");
        assert!(encode_call_address("balanceOf(address)", "0x1234").is_err());
    }

    #[test]
    fn test_decode_words() {
        let mut data = encode_uint(1_000_000).to_vec();
        data.extend_from_slice(&encode_address("0x6311fF24fb15310eD3d2180D3d0507A21a8e5227").unwrap());
        assert_eq!(decode_uint(&data, 0).unwrap(), 1_000_000);
        assert_eq!(
            decode_address(&data, 1).unwrap(),
            "0x6311ff24fb15310ed3d2180d3d0507a21a8e5227"
        );
        assert!(decode_uint(&data, 2).is_err());
    }

    #[test]
    fn test_decode_uint_rejects_overflow() {
        let data = [0xffu8; WORD];
        assert!(decode_uint(&data, 0).is_err());
    }
}
