use once_cell::sync::Lazy;
use std::env;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

/// 默认的数据目录
static DEFAULT_DATA_DIR: &str = "data";
/// 默认的钱包文件
static DEFAULT_WALLET_FILE: &str = "wallet.dat";

const DATA_DIR_ENV_KEY: &str = "BLOCKCHAIN_DATA_DIR";
const WALLET_FILE_ENV_KEY: &str = "BLOCKCHAIN_WALLET_FILE";

/// 进程配置，可通过环境变量覆盖默认值
pub struct Config {
    data_dir: String,
    wallet_file: String,
}

impl Config {
    pub fn new() -> Config {
        let data_dir =
            env::var(DATA_DIR_ENV_KEY).unwrap_or_else(|_| String::from(DEFAULT_DATA_DIR));
        let wallet_file =
            env::var(WALLET_FILE_ENV_KEY).unwrap_or_else(|_| String::from(DEFAULT_WALLET_FILE));
        Config {
            data_dir,
            wallet_file,
        }
    }

    /// 获取区块数据目录
    pub fn get_data_dir(&self) -> String {
        self.data_dir.clone()
    }

    /// 获取钱包文件路径
    pub fn get_wallet_file(&self) -> String {
        self.wallet_file.clone()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
