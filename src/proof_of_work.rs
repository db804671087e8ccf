use crate::{Block, Result};
use data_encoding::HEXLOWER;
use num_bigint::{BigInt, Sign};
use std::borrow::Borrow;
use std::ops::ShlAssign;

pub struct ProofOfWork {
    block: Block,
    target: BigInt,
}

/// 难度值，哈希解释为大端序整数后必须小于 2^(255 - DIFFICULTY)
const DIFFICULTY: i64 = 12;
/// 限制 nonce 避免整型溢出
const MAX_NONCE: i64 = i64::MAX;

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> ProofOfWork {
        let mut target = BigInt::from(1);
        target.shl_assign(255 - DIFFICULTY);
        ProofOfWork { block, target }
    }

    /// 工作量证明用到的数据：前块哈希 || 交易序列化 || nonce || 难度
    fn prepare_data(&self, nonce: i64) -> Result<Vec<u8>> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.block.get_pre_block_hash());
        data_bytes.extend(bincode::serialize(self.block.get_transactions())?);
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes.extend(DIFFICULTY.to_be_bytes());
        Ok(data_bytes)
    }

    /// 工作量证明的核心：从零递增 nonce，寻找第一个小于目标的哈希
    pub fn run(&self) -> Result<(i64, Vec<u8>)> {
        let mut nonce = 0;
        let mut hash = Vec::new();
        log::info!(
            "Mining the block containing {} transactions",
            self.block.get_transactions().len()
        );
        while nonce < MAX_NONCE {
            let data = self.prepare_data(nonce)?;
            hash = crate::sha256_digest(data.as_slice());
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
            if hash_int.lt(self.target.borrow()) {
                log::info!("Block mined: {}", HEXLOWER.encode(hash.as_slice()));
                break;
            }
            nonce += 1;
        }
        Ok((nonce, hash))
    }

    /// 用区块存储的 nonce 重算哈希并校验不等式，仅用于诊断
    pub fn validate(&self) -> Result<bool> {
        let data = self.prepare_data(self.block.get_nonce())?;
        let hash = crate::sha256_digest(data.as_slice());
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
        Ok(hash_int.lt(self.target.borrow()))
    }
}

#[cfg(test)]
mod tests {
    use super::{ProofOfWork, DIFFICULTY};
    use crate::{Block, Transaction, Wallet};
    use num_bigint::{BigInt, Sign};
    use std::ops::ShlAssign;

    #[test]
    fn test_target() {
        let mut target = BigInt::from(1);
        target.shl_assign(255 - DIFFICULTY);
        // 2^243 占 244 位，对应 31 个字节
        let (sign, bytes) = target.to_bytes_be();
        assert_eq!(sign, Sign::Plus);
        assert_eq!(bytes.len(), 31);
    }

    #[test]
    fn test_mined_block_validates() {
        let tx = Transaction::new_coinbase_tx(Wallet::new().unwrap().get_address().as_str())
            .unwrap();
        let block = Block::generate_genesis_block(&tx).unwrap();

        let mut target = BigInt::from(1);
        target.shl_assign(255 - DIFFICULTY);
        let hash_int = BigInt::from_bytes_be(Sign::Plus, block.get_hash());
        assert!(hash_int < target);

        let pow = ProofOfWork::new_proof_of_work(block);
        assert!(pow.validate().unwrap());
    }
}
