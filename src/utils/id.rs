//! ID 生成
//!
//! 事件 ID 与订阅 ID 使用 10 位 62 进制字符串（0-9, a-z, A-Z）。

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// 62 进制字符集
const BASE62_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// ID 长度
const ID_LENGTH: usize = 10;

/// 订阅 ID 前缀
const SUBSCRIPTION_PREFIX: &str = "sub_";

/// 生成 10 位 62 进制 ID
///
/// 使用时间戳与随机数组合
///
/// # Example
///
/// ```
/// use module_framework::utils::id::generate_id;
///
/// let id = generate_id();
/// assert_eq!(id.len(), 10);
/// ```
pub fn generate_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let random: u64 = rand::thread_rng().gen();
    let mut value = timestamp ^ random;

    let mut chars = [0u8; ID_LENGTH];
    for slot in chars.iter_mut().rev() {
        *slot = BASE62_CHARS[(value % 62) as usize];
        value /= 62;
    }

    chars.iter().map(|&b| char::from(b)).collect()
}

/// 生成订阅 ID（`sub_` + 10 位 62 进制）
pub fn generate_subscription_id() -> String {
    format!("{}{}", SUBSCRIPTION_PREFIX, generate_id())
}

/// 验证 ID 格式是否有效
///
/// # Example
///
/// ```
/// use module_framework::utils::id::is_valid_id;
///
/// assert!(is_valid_id("a1B2c3D4e5"));
/// assert!(!is_valid_id("too-short"));
/// ```
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH && id.chars().all(|c| c.is_ascii_alphanumeric())
}
