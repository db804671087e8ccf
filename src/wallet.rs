use crate::{BlockchainError, Result};
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>, // 原生的公钥，未压缩的曲线点
}

impl Wallet {
    /// 创建一个钱包
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::new_key_pair()?;
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref())
            .map_err(|_| BlockchainError::Crypto)?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    /// 获取钱包地址 ( version + pub_key_hash + checksum 的 base58 编码 )
    pub fn get_address(&self) -> String {
        let pub_key_hash = hash_pub_key(self.public_key.as_slice());
        convert_address(pub_key_hash.as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

/// 计算公钥哈希 ( RIPEMD160(SHA256(pub_key)) )
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = crate::sha256_digest(pub_key);
    crate::ripemd160_digest(pub_key_sha256.as_slice())
}

/// 计算校验和，取两次 sha256 的前 4 个字节
fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = crate::sha256_digest(payload);
    let second_sha = crate::sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// 通过公钥哈希计算地址
pub fn convert_address(pub_key_hash: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![VERSION];
    payload.extend(pub_key_hash);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    crate::base58_encode(payload.as_slice())
}

/// 验证地址有效
pub fn validate_address(address: &str) -> bool {
    pub_key_hash_from_address(address).is_ok()
}

/// 从地址还原公钥哈希，校验长度与校验和
pub fn pub_key_hash_from_address(address: &str) -> Result<Vec<u8>> {
    let payload = crate::base58_decode(address)?;
    if payload.len() <= ADDRESS_CHECK_SUM_LEN + 1 {
        return Err(BlockchainError::InvalidAddress(address.to_string()));
    }
    let (versioned, actual_checksum) = payload.split_at(payload.len() - ADDRESS_CHECK_SUM_LEN);
    if checksum(versioned) != actual_checksum {
        return Err(BlockchainError::InvalidAddress(address.to_string()));
    }
    Ok(versioned[1..].to_vec())
}
