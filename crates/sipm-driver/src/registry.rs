//! 序列号 → 句柄注册表
//!
//! 每个已注册的序列号对应且只对应一个打开的句柄，序列号按字典序排列。

use std::collections::BTreeMap;

/// 设备注册表
#[derive(Debug)]
pub struct DeviceRegistry<H> {
    handles: BTreeMap<String, H>,
}

impl<H> Default for DeviceRegistry<H> {
    fn default() -> Self {
        Self {
            handles: BTreeMap::new(),
        }
    }
}

impl<H> DeviceRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册句柄
    ///
    /// 序列号已存在时不覆盖，原样交还句柄，由调用方负责关闭。
    pub fn insert(&mut self, serial: String, handle: H) -> Result<(), H> {
        if self.handles.contains_key(&serial) {
            return Err(handle);
        }
        self.handles.insert(serial, handle);
        Ok(())
    }

    pub fn get_mut(&mut self, serial: &str) -> Option<&mut H> {
        self.handles.get_mut(serial)
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.handles.contains_key(serial)
    }

    /// 注销并取回句柄
    pub fn remove(&mut self, serial: &str) -> Option<H> {
        self.handles.remove(serial)
    }

    /// 已注册序列号（字典序）
    pub fn serials(&self) -> Vec<String> {
        self.handles.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 取出全部句柄，注册表变为空
    pub fn drain(&mut self) -> Vec<(String, H)> {
        std::mem::take(&mut self.handles).into_iter().collect()
    }
}
