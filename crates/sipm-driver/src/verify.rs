//! 寄存器回读校验

use sipm_protocol::Register;

/// 回读值与写入值不一致的寄存器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterMismatch<R> {
    pub index: usize,
    pub expected: R,
    pub actual: R,
}

/// 逐个比较寄存器，返回不一致的项
///
/// 使用 `PartialEq` 比较，浮点 NaN 总是记为不一致。
pub fn compare_registers<R: Register, const N: usize>(
    expected: &[R; N],
    actual: &[R; N],
) -> Vec<RegisterMismatch<R>> {
    expected
        .iter()
        .zip(actual.iter())
        .enumerate()
        .filter(|(_, (e, a))| e != a)
        .map(|(index, (&expected, &actual))| RegisterMismatch {
            index,
            expected,
            actual,
        })
        .collect()
}
