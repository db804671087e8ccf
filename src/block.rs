use crate::{ProofOfWork, Result, Transaction};
use serde::{Deserialize, Serialize};

/// 区块，挖矿成功后不可变
#[derive(Clone, Serialize, Deserialize)]
pub struct Block {
    pre_block_hash: Vec<u8>,        // 上一区块的哈希值，创世块为空
    hash: Vec<u8>,                  // 当前区块的哈希值，由工作量证明产出
    transactions: Vec<Transaction>, // 交易数据
    nonce: i64,                     // 计数器
}

impl Block {
    /// 新建一个区块，同步挖矿，返回时哈希与 nonce 已经就绪
    pub fn new_block(pre_block_hash: Vec<u8>, transactions: &[Transaction]) -> Result<Block> {
        let mut block = Block {
            pre_block_hash,
            hash: vec![],
            transactions: transactions.to_vec(),
            nonce: 0,
        };
        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let (nonce, hash) = pow.run()?;
        block.nonce = nonce;
        block.hash = hash;
        Ok(block)
    }

    /// 生成创世块，前块哈希为空
    pub fn generate_genesis_block(coinbase: &Transaction) -> Result<Block> {
        Block::new_block(vec![], &[coinbase.clone()])
    }

    /// 从字节数组反序列化
    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// 区块序列化
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }
}
