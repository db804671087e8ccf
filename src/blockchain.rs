use crate::{Block, BlockchainError, Result, TXOutput, Transaction};
use data_encoding::HEXLOWER;
use sled::transaction::TransactionError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const BLOCKS_TREE: &str = "blocks";
const TIP_BLOCK_HASH_KEY: &str = "tip_block_hash";

/// 区块链，持有底层存储的显式句柄
#[derive(Clone)]
pub struct Blockchain {
    blocks_tree: sled::Tree,
}

impl Blockchain {
    /// 创建区块链并挖出创世块，coinbase 奖励给 genesis_address
    pub fn create_blockchain<P: AsRef<Path>>(path: P, genesis_address: &str) -> Result<Blockchain> {
        let db = sled::open(path)?;
        let blocks_tree = db.open_tree(BLOCKS_TREE)?;
        if blocks_tree.get(TIP_BLOCK_HASH_KEY)?.is_some() {
            return Err(BlockchainError::AlreadyExists);
        }
        let coinbase_tx = Transaction::new_coinbase_tx(genesis_address)?;
        let genesis_block = Block::generate_genesis_block(&coinbase_tx)?;
        let blockchain = Blockchain { blocks_tree };
        blockchain.write_block(&genesis_block)?;
        Ok(blockchain)
    }

    /// 打开已经初始化的区块链
    pub fn open_blockchain<P: AsRef<Path>>(path: P) -> Result<Blockchain> {
        let db = sled::open(path)?;
        let blocks_tree = db.open_tree(BLOCKS_TREE)?;
        if blocks_tree.get(TIP_BLOCK_HASH_KEY)?.is_none() {
            return Err(BlockchainError::NotInitialized);
        }
        Ok(Blockchain { blocks_tree })
    }

    /// 在当前 tip 上挖出新块并入链
    pub fn add_block(&self, transactions: &[Transaction]) -> Result<Block> {
        let tip_hash = self
            .get_tip_hash()?
            .ok_or(BlockchainError::NotInitialized)?;
        let block = Block::new_block(tip_hash, transactions)?;
        self.write_block(&block)?;
        Ok(block)
    }

    /// 区块记录与 tip 指针在同一个存储事务里提交，要么都成功要么都失败
    fn write_block(&self, block: &Block) -> Result<()> {
        // 编码失败发生在事务提交点之前
        let block_bytes = block.serialize()?;
        let block_hash = block.get_hash().to_vec();
        let result: std::result::Result<(), TransactionError<BlockchainError>> =
            self.blocks_tree.transaction(|tx_db| {
                tx_db.insert(block_hash.as_slice(), block_bytes.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, block_hash.as_slice())?;
                Ok(())
            });
        result?;
        self.blocks_tree.flush()?;
        Ok(())
    }

    /// 当前 tip 的哈希
    pub fn get_tip_hash(&self) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blocks_tree
            .get(TIP_BLOCK_HASH_KEY)?
            .map(|v| v.to_vec()))
    }

    /// 从 tip 向创世块方向的一次性遍历
    pub fn iterator(&self) -> Result<BlockchainIterator> {
        let current_hash = self.get_tip_hash()?.unwrap_or_default();
        Ok(BlockchainIterator {
            blocks_tree: self.blocks_tree.clone(),
            current_hash,
        })
    }

    /// 按交易 ID 在整条链上查找交易
    pub fn find_transaction(&self, txid: &[u8]) -> Result<Option<Transaction>> {
        for item in self.iterator()? {
            let block = item?;
            for tx in block.get_transactions() {
                if tx.get_id().eq(txid) {
                    return Ok(Some(tx.clone()));
                }
            }
        }
        Ok(None)
    }

    /// 收集一笔交易所有输入引用的前置交易，任何一笔缺失都是致命错误
    pub(crate) fn find_prev_transactions(
        &self,
        tx: &Transaction,
    ) -> Result<HashMap<Vec<u8>, Transaction>> {
        let mut prev_txs = HashMap::new();
        for input in tx.get_vin() {
            let prev_tx = self.find_transaction(input.get_txid())?.ok_or_else(|| {
                BlockchainError::PreviousTransactionNotFound(HEXLOWER.encode(input.get_txid()))
            })?;
            prev_txs.insert(prev_tx.get_id().to_vec(), prev_tx);
        }
        Ok(prev_txs)
    }

    /// 验证一笔交易的全部签名
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.find_prev_transactions(tx)?;
        tx.verify(&prev_txs)
    }

    /// 找到包含未花费输出的交易。从 tip 向创世块扫描，已花费集合以
    /// ( 交易 ID, 输出索引 ) 复合键记录；一笔交易每命中一个未花费输出
    /// 就追加一次，因此可能重复出现
    pub fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<Transaction>> {
        let mut spent_outputs: HashSet<(Vec<u8>, i32)> = HashSet::new();
        let mut unspent_txs = vec![];
        for item in self.iterator()? {
            let block = item?;
            for tx in block.get_transactions() {
                for (idx, txout) in tx.get_vout().iter().enumerate() {
                    if spent_outputs.contains(&(tx.get_id().to_vec(), idx as i32)) {
                        continue;
                    }
                    if txout.is_locked_with_key(pub_key_hash) {
                        unspent_txs.push(tx.clone());
                    }
                }
                // coinbase 没有真实输入，不进入已花费集合
                if !tx.is_coinbase() {
                    for txin in tx.get_vin() {
                        spent_outputs.insert((txin.get_txid().to_vec(), txin.get_vout()));
                    }
                }
            }
        }
        Ok(unspent_txs)
    }

    /// 通过公钥哈希查找所有未花费输出，每个 ( 交易 ID, 索引 ) 只计一次
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let mut seen: HashSet<(Vec<u8>, usize)> = HashSet::new();
        let mut utxos = vec![];
        for tx in self.find_unspent_transactions(pub_key_hash)? {
            for (idx, txout) in tx.get_vout().iter().enumerate() {
                if txout.is_locked_with_key(pub_key_hash)
                    && seen.insert((tx.get_id().to_vec(), idx))
                {
                    utxos.push(txout.clone());
                }
            }
        }
        Ok(utxos)
    }

    /// 贪心选取可花费输出：按解析顺序累加，直到总额不小于 amount。
    /// 总额不足时原样返回，由调用方判定资金不足
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: i32,
    ) -> Result<(i32, HashMap<Vec<u8>, Vec<usize>>)> {
        let mut accumulated = 0;
        let mut spendable_outputs: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
        'outer: for tx in self.find_unspent_transactions(pub_key_hash)? {
            for (idx, txout) in tx.get_vout().iter().enumerate() {
                if !txout.is_locked_with_key(pub_key_hash) {
                    continue;
                }
                let outs = spendable_outputs.entry(tx.get_id().to_vec()).or_default();
                // 同一交易重复出现时不能重复选取同一个输出
                if outs.contains(&idx) {
                    continue;
                }
                outs.push(idx);
                accumulated += txout.get_value();
                if accumulated >= amount {
                    break 'outer;
                }
            }
        }
        Ok((accumulated, spendable_outputs))
    }
}

/// 区块链游标：惰性产出从 tip 到创世块的区块序列，互相独立、不可重置
pub struct BlockchainIterator {
    blocks_tree: sled::Tree,
    current_hash: Vec<u8>,
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Result<Block>> {
        if self.current_hash.is_empty() {
            return None;
        }
        let data = match self.blocks_tree.get(self.current_hash.as_slice()) {
            Ok(Some(data)) => data,
            Ok(None) => {
                self.current_hash.clear();
                return None;
            }
            Err(e) => {
                self.current_hash.clear();
                return Some(Err(e.into()));
            }
        };
        match Block::deserialize(data.as_ref()) {
            Ok(block) => {
                self.current_hash = block.get_pre_block_hash().to_vec();
                Some(Ok(block))
            }
            Err(e) => {
                self.current_hash.clear();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Blockchain;
    use crate::{hash_pub_key, BlockchainError, Transaction, Wallet};
    use std::path::PathBuf;
    use std::process;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_db_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("chain_{}_{}_{}", tag, process::id(), nanos))
    }

    fn balance(blockchain: &Blockchain, wallet: &Wallet) -> i32 {
        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        blockchain
            .find_utxo(pub_key_hash.as_slice())
            .unwrap()
            .iter()
            .map(|out| out.get_value())
            .sum()
    }

    #[test]
    fn test_open_uninitialized_fails() {
        let result = Blockchain::open_blockchain(test_db_path("uninit"));
        assert!(matches!(result, Err(BlockchainError::NotInitialized)));
    }

    #[test]
    fn test_genesis_spendable_outputs() {
        let alice = Wallet::new().unwrap();
        let blockchain =
            Blockchain::create_blockchain(test_db_path("genesis"), alice.get_address().as_str())
                .unwrap();
        let pub_key_hash = hash_pub_key(alice.get_public_key());

        let genesis = blockchain.iterator().unwrap().last().unwrap().unwrap();
        let coinbase_txid = genesis.get_transactions()[0].get_id().to_vec();

        let (accumulated, outputs) = blockchain
            .find_spendable_outputs(pub_key_hash.as_slice(), 50)
            .unwrap();
        assert_eq!(accumulated, 100);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get(&coinbase_txid).unwrap(), &vec![0]);

        // 总额不足时原样返回，由调用方判定
        let (accumulated, outputs) = blockchain
            .find_spendable_outputs(pub_key_hash.as_slice(), 150)
            .unwrap();
        assert_eq!(accumulated, 100);
        assert_eq!(outputs.get(&coinbase_txid).unwrap(), &vec![0]);
    }

    #[test]
    fn test_send_updates_balances() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let blockchain =
            Blockchain::create_blockchain(test_db_path("send"), alice.get_address().as_str())
                .unwrap();

        let tx =
            Transaction::new_utxo_transaction(&alice, bob.get_address().as_str(), 30, &blockchain)
                .unwrap();
        assert!(blockchain.verify_transaction(&tx).unwrap());
        blockchain.add_block(&[tx]).unwrap();

        assert_eq!(balance(&blockchain, &alice), 70);
        assert_eq!(balance(&blockchain, &bob), 30);
    }

    #[test]
    fn test_insufficient_funds() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let blockchain =
            Blockchain::create_blockchain(test_db_path("poor"), alice.get_address().as_str())
                .unwrap();

        let result =
            Transaction::new_utxo_transaction(&alice, bob.get_address().as_str(), 150, &blockchain);
        assert!(matches!(
            result,
            Err(BlockchainError::InsufficientFunds {
                available: 100,
                required: 150,
            })
        ));
    }

    #[test]
    fn test_iterator_runs_tip_to_genesis() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let blockchain =
            Blockchain::create_blockchain(test_db_path("iter"), alice.get_address().as_str())
                .unwrap();
        let tx =
            Transaction::new_utxo_transaction(&alice, bob.get_address().as_str(), 30, &blockchain)
                .unwrap();
        blockchain.add_block(&[tx]).unwrap();

        let blocks: Vec<_> = blockchain
            .iterator()
            .unwrap()
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0].get_hash(),
            blockchain.get_tip_hash().unwrap().unwrap().as_slice()
        );
        assert_eq!(blocks[0].get_pre_block_hash(), blocks[1].get_hash());
        assert!(blocks[1].get_pre_block_hash().is_empty());

        // 两个游标互不影响
        let mut first = blockchain.iterator().unwrap();
        let second = blockchain.iterator().unwrap();
        first.next();
        assert_eq!(second.count(), 2);
    }

    #[test]
    fn test_self_transfer_keeps_balance() {
        let alice = Wallet::new().unwrap();
        let blockchain =
            Blockchain::create_blockchain(test_db_path("selfpay"), alice.get_address().as_str())
                .unwrap();

        // 给自己转账会产生两个都锁定到 alice 的输出
        let tx = Transaction::new_utxo_transaction(
            &alice,
            alice.get_address().as_str(),
            30,
            &blockchain,
        )
        .unwrap();
        let txid = tx.get_id().to_vec();
        blockchain.add_block(&[tx]).unwrap();

        // 解析结果保留重复条目，但余额只统计一次
        let pub_key_hash = hash_pub_key(alice.get_public_key());
        let unspent = blockchain
            .find_unspent_transactions(pub_key_hash.as_slice())
            .unwrap();
        let occurrences = unspent
            .iter()
            .filter(|tx| tx.get_id() == txid.as_slice())
            .count();
        assert_eq!(occurrences, 2);
        assert_eq!(balance(&blockchain, &alice), 100);
    }

    #[test]
    fn test_find_transaction() {
        let alice = Wallet::new().unwrap();
        let blockchain =
            Blockchain::create_blockchain(test_db_path("find"), alice.get_address().as_str())
                .unwrap();
        let genesis = blockchain.iterator().unwrap().last().unwrap().unwrap();
        let coinbase_txid = genesis.get_transactions()[0].get_id().to_vec();

        let found = blockchain
            .find_transaction(coinbase_txid.as_slice())
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().get_id(), coinbase_txid.as_slice());

        let missing = blockchain.find_transaction("nope".as_bytes()).unwrap();
        assert!(missing.is_none());
    }
}
