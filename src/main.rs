use data_encoding::HEXLOWER;
use log::LevelFilter;
use std::process;
use structopt::StructOpt;
use utxo_chain::{
    convert_address, hash_pub_key, pub_key_hash_from_address, validate_address, Blockchain,
    BlockchainError, ProofOfWork, Result, Transaction, Wallets, GLOBAL_CONFIG,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "utxo_chain")]
struct Opt {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    #[structopt(
        name = "createblockchain",
        about = "Create a new blockchain and send the genesis reward to address"
    )]
    Createblockchain {
        #[structopt(name = "address", help = "The address rewarded by the genesis block")]
        address: String,
    },
    #[structopt(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[structopt(
        name = "getbalance",
        about = "Get the wallet balance of the target address"
    )]
    GetBalance {
        #[structopt(name = "address", help = "The wallet address")]
        address: String,
    },
    #[structopt(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[structopt(name = "send", about = "Send amount of coins from one address to another")]
    Send {
        #[structopt(name = "from", help = "Source wallet address")]
        from: String,
        #[structopt(name = "to", help = "Destination wallet address")]
        to: String,
        #[structopt(name = "amount", help = "Amount to send")]
        amount: i32,
    },
    #[structopt(name = "printchain", about = "Print all blocks, newest first")]
    Printchain,
}

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();
    let opt = Opt::from_args();
    if let Err(e) = run(opt.command) {
        eprintln!("ERROR: {}", e);
        process::exit(exit_code(&e));
    }
}

/// 每类错误对应一个独立的退出码
fn exit_code(e: &BlockchainError) -> i32 {
    match e {
        BlockchainError::InsufficientFunds { .. } => 2,
        BlockchainError::InvalidAddress(_) => 3,
        BlockchainError::PreviousTransactionNotFound(_) => 4,
        BlockchainError::NotInitialized => 5,
        BlockchainError::AlreadyExists => 6,
        BlockchainError::Codec(_) => 7,
        BlockchainError::WalletNotFound(_) => 8,
        _ => 1,
    }
}

fn run(command: Command) -> Result<()> {
    let data_dir = GLOBAL_CONFIG.get_data_dir();
    match command {
        Command::Createblockchain { address } => {
            if !validate_address(address.as_str()) {
                return Err(BlockchainError::InvalidAddress(address));
            }
            Blockchain::create_blockchain(data_dir.as_str(), address.as_str())?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::new()?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {}", address);
        }
        Command::GetBalance { address } => {
            let pub_key_hash = pub_key_hash_from_address(address.as_str())?;
            let blockchain = Blockchain::open_blockchain(data_dir.as_str())?;
            let utxos = blockchain.find_utxo(pub_key_hash.as_slice())?;
            let balance: i32 = utxos.iter().map(|out| out.get_value()).sum();
            println!("Balance of {}: {}", address, balance);
        }
        Command::ListAddresses => {
            let wallets = Wallets::new()?;
            for address in wallets.get_addresses() {
                println!("{}", address);
            }
        }
        Command::Send { from, to, amount } => {
            if !validate_address(from.as_str()) {
                return Err(BlockchainError::InvalidAddress(from));
            }
            if !validate_address(to.as_str()) {
                return Err(BlockchainError::InvalidAddress(to));
            }
            let wallets = Wallets::new()?;
            let wallet = wallets
                .get_wallet(from.as_str())
                .ok_or_else(|| BlockchainError::WalletNotFound(from.clone()))?;
            let blockchain = Blockchain::open_blockchain(data_dir.as_str())?;
            let transaction =
                Transaction::new_utxo_transaction(wallet, to.as_str(), amount, &blockchain)?;
            blockchain.add_block(&[transaction])?;
            println!("Success!");
        }
        Command::Printchain => {
            let blockchain = Blockchain::open_blockchain(data_dir.as_str())?;
            for item in blockchain.iterator()? {
                let block = item?;
                println!(
                    "Pre block hash: {}",
                    HEXLOWER.encode(block.get_pre_block_hash())
                );
                println!("Cur block hash: {}", HEXLOWER.encode(block.get_hash()));
                let pow = ProofOfWork::new_proof_of_work(block.clone());
                println!("PoW: {}", pow.validate()?);
                for tx in block.get_transactions() {
                    println!("- Transaction txid_hex: {}", HEXLOWER.encode(tx.get_id()));
                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let pub_key_hash = hash_pub_key(input.get_pub_key());
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                                convert_address(pub_key_hash.as_slice()),
                            );
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_value(),
                            convert_address(output.get_pub_key_hash()),
                        );
                    }
                }
                println!();
            }
        }
    }
    Ok(())
}
