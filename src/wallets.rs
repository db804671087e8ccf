use crate::{Result, Wallet, GLOBAL_CONFIG};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

/// 本地钱包集，以地址为键持久化到单个文件
pub struct Wallets {
    path: PathBuf,
    wallets: HashMap<String, Wallet>,
}

impl Wallets {
    /// 从配置的钱包文件加载钱包集，文件不存在时为空集
    pub fn new() -> Result<Wallets> {
        Wallets::from_file(PathBuf::from(GLOBAL_CONFIG.get_wallet_file()))
    }

    pub fn from_file(path: PathBuf) -> Result<Wallets> {
        let mut wallets = Wallets {
            path,
            wallets: HashMap::new(),
        };
        wallets.load_from_file()?;
        Ok(wallets)
    }

    /// 创建一个钱包并立即落盘
    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    /// 通过钱包地址查询钱包
    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut file = File::open(self.path.as_path())?;
        let mut buf = vec![];
        file.read_to_end(&mut buf)?;
        self.wallets = bincode::deserialize(buf.as_slice())?;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path.as_path())?;
        let mut writer = BufWriter::new(file);
        let bytes = bincode::serialize(&self.wallets)?;
        writer.write_all(bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Wallets;
    use std::process;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_create_and_reload_wallet() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("wallets_{}_{}.dat", process::id(), nanos));

        let mut wallets = Wallets::from_file(path.clone()).unwrap();
        let address = wallets.create_wallet().unwrap();
        assert!(wallets.get_wallet(address.as_str()).is_some());

        let reloaded = Wallets::from_file(path.clone()).unwrap();
        assert_eq!(reloaded.get_addresses(), vec![address.clone()]);
        assert!(reloaded.get_wallet(address.as_str()).is_some());

        let _ = std::fs::remove_file(path);
    }
}
