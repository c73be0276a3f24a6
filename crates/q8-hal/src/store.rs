//! 已配对地址的持久化存储
//!
//! 只有一个 6 字节槽位。文件格式：`MAGIC(4) + mac(6)`。

use crate::{MacAddress, StorageError};
use q8_protocol::MAC_LEN;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 对端地址存储
pub trait PeerStore: Send {
    fn save(&mut self, peer: MacAddress) -> Result<(), StorageError>;
    /// 读取保存的地址；全零或不存在时返回 `None`
    fn load(&self) -> Result<Option<MacAddress>, StorageError>;
    fn clear(&mut self) -> Result<(), StorageError>;
}

/// 内存存储（重启后丢失）
#[derive(Debug, Clone, Default)]
pub struct MemoryPeerStore {
    slot: Option<MacAddress>,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(peer: MacAddress) -> Self {
        Self { slot: Some(peer) }
    }
}

impl PeerStore for MemoryPeerStore {
    fn save(&mut self, peer: MacAddress) -> Result<(), StorageError> {
        self.slot = Some(peer);
        Ok(())
    }

    fn load(&self) -> Result<Option<MacAddress>, StorageError> {
        Ok(self.slot.filter(|mac| !mac.is_zero()))
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.slot = None;
        Ok(())
    }
}

/// 文件存储
#[derive(Debug, Clone)]
pub struct FilePeerStore {
    path: PathBuf,
}

impl FilePeerStore {
    /// 文件魔数
    pub const MAGIC: &'static [u8; 4] = b"Q8PR";

    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PeerStore for FilePeerStore {
    fn save(&mut self, peer: MacAddress) -> Result<(), StorageError> {
        let mut buf = Vec::with_capacity(Self::MAGIC.len() + MAC_LEN);
        buf.extend_from_slice(Self::MAGIC);
        buf.extend_from_slice(&peer.octets());
        fs::write(&self.path, buf)?;
        debug!("Saved peer {} to {}", peer, self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Option<MacAddress>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() != Self::MAGIC.len() + MAC_LEN || &bytes[..4] != Self::MAGIC {
            return Err(StorageError::Corrupt(format!(
                "{}: unexpected header or length {}",
                self.path.display(),
                bytes.len()
            )));
        }

        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&bytes[4..]);
        let mac = MacAddress(mac);
        Ok((!mac.is_zero()).then_some(mac))
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<S: PeerStore + ?Sized> PeerStore for Box<S> {
    fn save(&mut self, peer: MacAddress) -> Result<(), StorageError> {
        (**self).save(peer)
    }
    fn load(&self) -> Result<Option<MacAddress>, StorageError> {
        (**self).load()
    }
    fn clear(&mut self) -> Result<(), StorageError> {
        (**self).clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PEER: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0x01, 0x02, 0x03]);

    #[test]
    fn test_memory_store() {
        let mut store = MemoryPeerStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(PEER).unwrap();
        assert_eq!(store.load().unwrap(), Some(PEER));
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_memory_store_zero_is_empty() {
        let store = MemoryPeerStore::with_peer(MacAddress::ZERO);
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peer.bin");

        let mut store = FilePeerStore::new(&path);
        assert_eq!(store.load().unwrap(), None);
        store.save(PEER).unwrap();

        let reopened = FilePeerStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(PEER));

        store.clear().unwrap();
        assert!(!path.exists());
        // 重复清除不报错
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peer.bin");
        fs::write(&path, b"garbage").unwrap();

        let store = FilePeerStore::new(&path);
        assert!(matches!(store.load(), Err(StorageError::Corrupt(_))));
    }
}
