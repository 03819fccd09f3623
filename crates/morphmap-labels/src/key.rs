//! 标注身份键
//!
//! 采用 64 位 FNV-1a 风格的混合，键只由内容决定，与承载它的瓦片无关。

/// FNV 偏移基
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV 质数
pub const FNV_PRIME: u64 = 1_099_511_628_211;

#[inline]
fn mix(hash: u64, value: u64) -> u64 {
    (hash ^ value).wrapping_mul(FNV_PRIME)
}

/// 由要素 ID、图层名和文字生成标注键
pub fn label_key(feature_id: u64, layer: &str, text: &str) -> u64 {
    let mut hash = mix(FNV_OFFSET_BASIS, feature_id);
    for byte in layer.bytes().chain(text.bytes()) {
        hash = mix(hash, byte as u64);
    }
    hash
}

/// 同一道路上序号为 `index` 的标注实例的键，序号从路径中点向外排
pub fn instance_key(base: u64, index: u32) -> u64 {
    let hash = mix(FNV_OFFSET_BASIS, base);
    mix(hash, index as u64)
}
