use thiserror::Error;

/// 区块链操作的错误类型
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("not enough funds: available {available}, required {required}")]
    InsufficientFunds { available: i32, required: i32 },
    #[error("previous transaction {0} does not exist")]
    PreviousTransactionNotFound(String),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("serialization failure: {0}")]
    Codec(#[from] bincode::Error),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("no wallet for address: {0}")]
    WalletNotFound(String),
    #[error("wallet file i/o failure: {0}")]
    WalletIo(#[from] std::io::Error),
    #[error("key pair rejected or signing failed")]
    Crypto,
    #[error("blockchain not initialized, run createblockchain first")]
    NotInitialized,
    #[error("blockchain already exists")]
    AlreadyExists,
}

impl From<sled::transaction::TransactionError<BlockchainError>> for BlockchainError {
    fn from(e: sled::transaction::TransactionError<BlockchainError>) -> Self {
        match e {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => BlockchainError::Storage(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, BlockchainError>;
