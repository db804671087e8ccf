use crate::{hash_pub_key, Blockchain, BlockchainError, Result, Wallet};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 挖矿奖励金
const SUBSIDY: i32 = 100;

/// 交易输入
#[derive(Clone, Serialize, Deserialize)]
pub struct TXInput {
    txid: Vec<u8>,      // 引用的上一笔交易的 ID
    vout: i32,          // 引用输出的索引，coinbase 为 -1
    signature: Vec<u8>, // 解锁输出的签名 ( r || s )
    pub_key: Vec<u8>,   // 花费方原生的公钥
}

impl TXInput {
    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i32 {
        self.vout
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }
}

/// 交易输出
#[derive(Clone, Serialize, Deserialize)]
pub struct TXOutput {
    value: i32,            // 币的数量
    pub_key_hash: Vec<u8>, // 锁定输出的公钥哈希
}

impl TXOutput {
    /// 新建一笔锁定到地址的输出
    pub fn new(value: i32, address: &str) -> Result<TXOutput> {
        let pub_key_hash = crate::pub_key_hash_from_address(address)?;
        Ok(TXOutput {
            value,
            pub_key_hash,
        })
    }

    pub fn get_value(&self) -> i32 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    /// 检查输出是否被指定公钥哈希锁定
    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// 交易
#[derive(Clone, Serialize, Deserialize)]
pub struct Transaction {
    id: Vec<u8>,         // 交易 ID，ID 置空后序列化的哈希
    vin: Vec<TXInput>,   // 输入
    vout: Vec<TXOutput>, // 输出
}

impl Transaction {
    /// 创建一个 coinbase 交易：没有真实输入，只有一笔奖励输出
    pub fn new_coinbase_tx(to: &str) -> Result<Transaction> {
        let txin = TXInput {
            txid: vec![],
            vout: -1,
            signature: vec![],
            pub_key: format!("Reward to {}", to).into_bytes(),
        };
        let txout = TXOutput::new(SUBSIDY, to)?;
        let mut tx = Transaction {
            id: vec![],
            vin: vec![txin],
            vout: vec![txout],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// 创建一笔 UTXO 交易：选取可花费输出，产生找零，并对每个输入签名
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: i32,
        blockchain: &Blockchain,
    ) -> Result<Transaction> {
        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        let (accumulated, valid_outputs) =
            blockchain.find_spendable_outputs(pub_key_hash.as_slice(), amount)?;
        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                available: accumulated,
                required: amount,
            });
        }
        // 交易的输入
        let mut inputs = vec![];
        for (txid, outs) in valid_outputs {
            for out in outs {
                inputs.push(TXInput {
                    txid: txid.clone(),
                    vout: out as i32,
                    signature: vec![],
                    pub_key: wallet.get_public_key().to_vec(),
                });
            }
        }
        // 交易的输出，UTXO 总数超过所需时产生找零
        let mut outputs = vec![TXOutput::new(amount, to)?];
        if accumulated > amount {
            outputs.push(TXOutput {
                value: accumulated - amount,
                pub_key_hash: pub_key_hash.clone(),
            });
        }
        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;
        let prev_txs = blockchain.find_prev_transactions(&tx)?;
        tx.sign(wallet.get_pkcs8(), &prev_txs)?;
        Ok(tx)
    }

    /// 判断是否是 coinbase 交易
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == -1
    }

    /// 计算交易哈希：ID 置空后序列化再取 sha256
    fn hash(&self) -> Result<Vec<u8>> {
        let mut tx_copy = self.clone();
        tx_copy.id = vec![];
        let data = bincode::serialize(&tx_copy)?;
        Ok(crate::sha256_digest(data.as_slice()))
    }

    /// 生成签名专用的修剪副本：清空所有输入的签名和公钥，输出原样复制
    fn trimmed_copy(&self) -> Transaction {
        let mut inputs = vec![];
        for input in &self.vin {
            inputs.push(TXInput {
                txid: input.txid.clone(),
                vout: input.vout,
                signature: vec![],
                pub_key: vec![],
            });
        }
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    /// 重建第 idx 个输入的签名摘要：只把该输入引用输出的公钥哈希临时填入
    /// 修剪副本，重算交易哈希后再清空，因此不同输入可能签不同的摘要
    fn input_digest(
        &mut self,
        idx: usize,
        input: &TXInput,
        prev_txs: &HashMap<Vec<u8>, Transaction>,
    ) -> Result<Vec<u8>> {
        let prev_tx = prev_txs.get(input.txid.as_slice()).ok_or_else(|| {
            BlockchainError::PreviousTransactionNotFound(HEXLOWER.encode(input.txid.as_slice()))
        })?;
        let prev_out = prev_tx.vout.get(input.vout as usize).ok_or_else(|| {
            BlockchainError::PreviousTransactionNotFound(HEXLOWER.encode(input.txid.as_slice()))
        })?;
        self.vin[idx].signature = vec![];
        self.vin[idx].pub_key = prev_out.pub_key_hash.clone();
        let digest = self.hash()?;
        self.vin[idx].pub_key = vec![];
        Ok(digest)
    }

    /// 对交易的每个输入签名，coinbase 交易不做任何修改
    pub fn sign(
        &mut self,
        pkcs8: &[u8],
        prev_txs: &HashMap<Vec<u8>, Transaction>,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }
        let mut tx_copy = self.trimmed_copy();
        for idx in 0..self.vin.len() {
            let input = self.vin[idx].clone();
            let digest = tx_copy.input_digest(idx, &input, prev_txs)?;
            let signature = crate::ecdsa_p256_sha256_sign_digest(pkcs8, digest.as_slice())?;
            self.vin[idx].signature = signature;
        }
        Ok(())
    }

    /// 验证交易所有输入的签名，任何一个输入验签失败即返回 false
    pub fn verify(&self, prev_txs: &HashMap<Vec<u8>, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }
        let mut tx_copy = self.trimmed_copy();
        for (idx, input) in self.vin.iter().enumerate() {
            let digest = tx_copy.input_digest(idx, input, prev_txs)?;
            if !crate::ecdsa_p256_sha256_sign_verify(
                input.pub_key.as_slice(),
                input.signature.as_slice(),
                digest.as_slice(),
            ) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }
}
