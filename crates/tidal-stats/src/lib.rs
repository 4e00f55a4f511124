#![deny(unsafe_code)]
#![doc = "tidal-stats: 把模式累计的测量向量汇总为逐行 CSV 描述统计。"]
#![doc = ""]
#![doc = "模式在 `print_stats` 中持有一个 [`DetailsWriter`]，按 `(类名, 计数器名)` 逐行追加；"]
#![doc = "写出失败以 `tidal_core::CoreError` 向上传播。"]

pub mod math;
pub mod value;
pub mod writer;

pub use math::{interquartile_range, median, sampled_standard_deviation};
pub use value::DetailValue;
pub use writer::DetailsWriter;
