//! 明细 CSV 写出器。
//!
//! # 教案式注释
//!
//! ## 契约（What）
//! - 构造时写出表头：完整模式为
//!   `Name,Instance,TotalCount,Min,Max,-1Std,Mean,+1Std,-1IQR,Median,+1IQR`，
//!   仅均值模式为 `Name,Instance,TotalCount,Min,Max,Mean`；
//! - 每行以 `类名,计数器名` 开头，其后每个字段以逗号前缀追加，以换行结束；
//! - 空数据（或不满足最小长度）不写任何内容；
//! - 写出失败包装为 [`CoreError`]，携带类名与底层 OS 错误码。
//!
//! ## 逻辑（How）
//! - 整行先在内存中拼好再一次性 `write_all`，避免失败时留下半行。

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tidal_core::{CoreError, Result, StatsConfig, codes};

use crate::math::{interquartile_range, sampled_standard_deviation};
use crate::value::DetailValue;

const FULL_HEADER: &str = "Name,Instance,TotalCount,Min,Max,-1Std,Mean,+1Std,-1IQR,Median,+1IQR\n";
const MEAN_ONLY_HEADER: &str = "Name,Instance,TotalCount,Min,Max,Mean\n";

/// 按 `(类名, 计数器名)` 逐行追加描述统计的写出器。
#[derive(Debug)]
pub struct DetailsWriter<W: Write> {
    sink: W,
    mean_only: bool,
}

impl DetailsWriter<BufWriter<File>> {
    /// 创建（截断）明细文件并写出表头。
    pub fn create(path: impl AsRef<Path>, mean_only: bool) -> Result<Self> {
        let file = File::create(path)
            .map_err(|err| CoreError::from_io(codes::STATS_WRITE, "stats.create", err))?;
        Self::new(BufWriter::new(file), mean_only)
    }

    /// 按 `[stats]` 配置创建写出器；未配置路径时返回 `None`。
    pub fn from_config(config: &StatsConfig) -> Result<Option<Self>> {
        config
            .details_path
            .as_deref()
            .map(|path| Self::create(path, config.mean_only))
            .transpose()
    }
}

impl<W: Write> DetailsWriter<W> {
    pub fn new(mut sink: W, mean_only: bool) -> Result<Self> {
        let header = if mean_only {
            MEAN_ONLY_HEADER
        } else {
            FULL_HEADER
        };
        sink.write_all(header.as_bytes())
            .map_err(|err| CoreError::from_io(codes::STATS_WRITE, "stats.header", err))?;
        Ok(Self { sink, mean_only })
    }

    pub fn mean_only(&self) -> bool {
        self.mean_only
    }

    /// 写出 `TotalCount,Min,Max,-1Std,Mean,+1Std,-1IQR,Median,+1IQR`。
    ///
    /// `data` 会被就地排序，调用方随后看到的是升序结果。
    pub fn write_details<T: DetailValue>(
        &mut self,
        class_name: &str,
        counter_name: &str,
        data: &mut [T],
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        data.sort_by(|left, right| left.partial_cmp(right).unwrap_or(std::cmp::Ordering::Equal));
        let (low, mean, high) = sampled_standard_deviation(data);
        let (lower, median, upper) = interquartile_range(data);

        let mut row = start_row(class_name, counter_name);
        (data.len() as u64).append_to(&mut row);
        for value in [data[0], data[data.len() - 1]] {
            value.append_to(&mut row);
        }
        for value in [low, mean, high, lower, median, upper] {
            value.append_to(&mut row);
        }
        self.end_row(row, class_name, "stats.write_details")
    }

    /// 输入约定 `[count, first, last, ..]`，写出 `count,last-first`；少于三个元素时不写。
    pub fn write_difference<T: DetailValue>(
        &mut self,
        class_name: &str,
        counter_name: &str,
        data: &[T],
    ) -> Result<()> {
        let [count, first, last, ..] = data else {
            return Ok(());
        };
        let mut row = start_row(class_name, counter_name);
        (*count).append_to(&mut row);
        T::difference(*first, *last).append_to(&mut row);
        self.end_row(row, class_name, "stats.write_difference")
    }

    /// 输入约定 `[count, min, max, mean, ..]`，原样写出前四项；少于四个元素时不写。
    pub fn write_mean<T: DetailValue>(
        &mut self,
        class_name: &str,
        counter_name: &str,
        data: &[T],
    ) -> Result<()> {
        let [count, min, max, mean, ..] = data else {
            return Ok(());
        };
        let mut row = start_row(class_name, counter_name);
        for value in [*count, *min, *max, *mean] {
            value.append_to(&mut row);
        }
        self.end_row(row, class_name, "stats.write_mean")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink
            .flush()
            .map_err(|err| CoreError::from_io(codes::STATS_WRITE, "stats.flush", err))
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn end_row(&mut self, mut row: String, class_name: &str, operation: &'static str) -> Result<()> {
        row.push('\n');
        self.sink
            .write_all(row.as_bytes())
            .map_err(|err| write_failure(operation, class_name, err))?;
        tracing::trace!(class = class_name, row = row.trim_end(), "stats row written");
        Ok(())
    }
}

fn start_row(class_name: &str, counter_name: &str) -> String {
    format!("{class_name},{counter_name}")
}

fn write_failure(operation: &'static str, class_name: &str, err: io::Error) -> CoreError {
    CoreError::from_io(codes::STATS_WRITE, operation, err).with_class_name(class_name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(writer: DetailsWriter<Vec<u8>>) -> Vec<String> {
        String::from_utf8(writer.into_inner())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn header_follows_mode() {
        let full = DetailsWriter::new(Vec::new(), false).unwrap();
        assert_eq!(rows(full), vec![FULL_HEADER.trim_end()]);
        let mean_only = DetailsWriter::new(Vec::new(), true).unwrap();
        assert!(mean_only.mean_only());
        assert_eq!(rows(mean_only), vec![MEAN_ONLY_HEADER.trim_end()]);
    }

    #[test]
    fn details_row_has_descriptive_columns() {
        let mut writer = DetailsWriter::new(Vec::new(), false).unwrap();
        let mut data = vec![5u32, 3, 1, 4, 2];
        writer.write_details("Push", "Latency", &mut data).unwrap();

        assert_eq!(data, vec![1, 2, 3, 4, 5], "数据应被就地排序");
        assert_eq!(
            rows(writer)[1],
            "Push,Latency,5,1,5,1.418861,3.000000,4.581139,1.500000,3.000000,4.500000"
        );
    }

    #[test]
    fn short_inputs_write_nothing() {
        let mut writer = DetailsWriter::new(Vec::new(), true).unwrap();
        writer.write_details::<u64>("Pull", "Bytes", &mut []).unwrap();
        writer.write_difference("Pull", "Bytes", &[2u64, 10]).unwrap();
        writer.write_mean("Pull", "Bytes", &[2u64, 1, 9]).unwrap();
        assert_eq!(rows(writer).len(), 1);
    }

    #[test]
    fn difference_and_mean_rows() {
        let mut writer = DetailsWriter::new(Vec::new(), true).unwrap();
        writer.write_difference("Pull", "Bytes", &[3u64, 100, 250]).unwrap();
        writer.write_mean("Pull", "Rtt", &[4.0f64, 1.0, 9.0, 4.25]).unwrap();
        let rows = rows(writer);
        assert_eq!(rows[1], "Pull,Bytes,3,150");
        assert_eq!(rows[2], "Pull,Rtt,4.000000,1.000000,9.000000,4.250000");
    }

    #[derive(Debug)]
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(28))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_carries_class_name() {
        let err = DetailsWriter::new(BrokenSink, false).unwrap_err();
        assert_eq!(err.code(), codes::STATS_WRITE);

        let mut writer = DetailsWriter {
            sink: BrokenSink,
            mean_only: false,
        };
        let err = writer
            .write_details("Duplex", "Jitter", &mut [1.0f64, 2.0])
            .unwrap_err();
        assert_eq!(err.class_name(), Some("Duplex"));
        assert_eq!(err.os_code(), Some(28));
    }
}
