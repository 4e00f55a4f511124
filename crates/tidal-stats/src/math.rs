//! 描述统计的纯函数实现。
//!
//! 所有函数都要求输入已按升序排序；空输入由调用方过滤，这里返回全零。

use crate::value::DetailValue;

/// 样本标准差区间：`(mean - std, mean, mean + std)`。
///
/// 使用 `n - 1` 作为分母；少于两个样本时标准差视为零。
pub fn sampled_standard_deviation<T: DetailValue>(sorted: &[T]) -> (f64, f64, f64) {
    let count = sorted.len();
    if count == 0 {
        return (0.0, 0.0, 0.0);
    }
    let mean = sorted.iter().map(|value| value.as_f64()).sum::<f64>() / count as f64;
    if count < 2 {
        return (mean, mean, mean);
    }
    let variance = sorted
        .iter()
        .map(|value| {
            let delta = value.as_f64() - mean;
            delta * delta
        })
        .sum::<f64>()
        / (count - 1) as f64;
    let deviation = variance.sqrt();
    (mean - deviation, mean, mean + deviation)
}

/// 中位数；偶数个样本取中间两值的平均。
pub fn median<T: DetailValue>(sorted: &[T]) -> f64 {
    let count = sorted.len();
    match count {
        0 => 0.0,
        _ if count % 2 == 1 => sorted[count / 2].as_f64(),
        _ => (sorted[count / 2 - 1].as_f64() + sorted[count / 2].as_f64()) / 2.0,
    }
}

/// 四分位区间：`(Q1, median, Q3)`。
///
/// 下半区为 `sorted[..n/2]`，上半区为 `sorted[(n+1)/2..]`（奇数个样本时排除中位数本身）；
/// 半区为空时退化为中位数。
pub fn interquartile_range<T: DetailValue>(sorted: &[T]) -> (f64, f64, f64) {
    let count = sorted.len();
    let middle = median(sorted);
    let lower = &sorted[..count / 2];
    let upper = &sorted[(count + 1) / 2..];
    let quartile = |half: &[T]| if half.is_empty() { middle } else { median(half) };
    (quartile(lower), middle, quartile(upper))
}
