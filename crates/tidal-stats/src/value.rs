use std::fmt::Write;

/// 可写入明细行的测量值类型。
///
/// 整数按十进制原样输出；浮点固定六位小数。
pub trait DetailValue: Copy + PartialOrd {
    fn as_f64(self) -> f64;

    /// 追加 `,value` 到行缓冲。
    fn append_to(self, row: &mut String);

    /// `last - first`；整数在 `last < first` 时饱和为零。
    fn difference(first: Self, last: Self) -> Self;
}

impl DetailValue for u32 {
    fn as_f64(self) -> f64 {
        f64::from(self)
    }

    fn append_to(self, row: &mut String) {
        let _ = write!(row, ",{self}");
    }

    fn difference(first: Self, last: Self) -> Self {
        last.saturating_sub(first)
    }
}

impl DetailValue for u64 {
    fn as_f64(self) -> f64 {
        self as f64
    }

    fn append_to(self, row: &mut String) {
        let _ = write!(row, ",{self}");
    }

    fn difference(first: Self, last: Self) -> Self {
        last.saturating_sub(first)
    }
}

impl DetailValue for f64 {
    fn as_f64(self) -> f64 {
        self
    }

    fn append_to(self, row: &mut String) {
        let _ = write!(row, ",{self:.6}");
    }

    fn difference(first: Self, last: Self) -> Self {
        last - first
    }
}
