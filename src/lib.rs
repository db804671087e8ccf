mod block;
pub use block::Block;

mod blockchain;
pub use blockchain::{Blockchain, BlockchainIterator};

mod config;
pub use config::{Config, GLOBAL_CONFIG};

mod error;
pub use error::{BlockchainError, Result};

mod proof_of_work;
pub use proof_of_work::ProofOfWork;

mod transaction;
pub use transaction::{TXInput, TXOutput, Transaction};

pub mod utils;
pub use utils::{
    base58_decode, base58_encode, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, ripemd160_digest, sha256_digest,
};

mod wallet;
pub use wallet::{
    convert_address, hash_pub_key, pub_key_hash_from_address, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};

mod wallets;
pub use wallets::Wallets;
