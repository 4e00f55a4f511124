//! 明细统计的性质测试。
//!
//! - **Why**：统计列的相对大小关系（Min ≤ Q1 ≤ Median ≤ Q3 ≤ Max、均值落在区间内）
//!   与具体数据无关，适合用 proptest 覆盖。
//! - **What**：只依赖公开 API，行格式的精确值见 `writer.rs` 内的单元测试。

use proptest::prelude::*;
use tidal_stats::{DetailsWriter, interquartile_range, sampled_standard_deviation};

proptest! {
    #[test]
    fn quartiles_are_ordered(mut data in prop::collection::vec(0u64..1_000_000, 1..200)) {
        data.sort_unstable();
        let min = data[0] as f64;
        let max = data[data.len() - 1] as f64;
        let (lower, median, upper) = interquartile_range(&data);
        prop_assert!(min <= lower);
        prop_assert!(lower <= median);
        prop_assert!(median <= upper);
        prop_assert!(upper <= max);
    }

    #[test]
    fn mean_lies_within_range_and_deviation_is_symmetric(
        mut data in prop::collection::vec(0u32..100_000, 1..200),
    ) {
        data.sort_unstable();
        let (low, mean, high) = sampled_standard_deviation(&data);
        prop_assert!(f64::from(data[0]) <= mean + 1e-6);
        prop_assert!(mean <= f64::from(data[data.len() - 1]) + 1e-6);
        prop_assert!(low <= mean && mean <= high);
        prop_assert!(((mean - low) - (high - mean)).abs() < 1e-6);
    }

    #[test]
    fn every_row_has_eleven_columns(data in prop::collection::vec(any::<u32>(), 1..64)) {
        let mut writer = DetailsWriter::new(Vec::new(), false).expect("内存写出不会失败");
        let mut data = data;
        writer.write_details("Prop", "Samples", &mut data).expect("内存写出不会失败");
        let text = String::from_utf8(writer.into_inner()).expect("输出必须是 UTF-8");
        let lines: Vec<&str> = text.lines().collect();
        prop_assert_eq!(lines.len(), 2);
        prop_assert_eq!(lines[1].split(',').count(), 11);
        prop_assert!(data.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}

#[test]
fn writer_follows_stats_configuration() {
    let dir = std::env::temp_dir().join(format!("tidal-stats-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("details.csv");

    let disabled = tidal_core::StatsConfig::default();
    assert!(DetailsWriter::from_config(&disabled).unwrap().is_none());

    let config = tidal_core::StatsConfig {
        details_path: Some(path.clone()),
        mean_only: true,
    };
    let mut writer = DetailsWriter::from_config(&config).unwrap().expect("已配置路径");
    writer.write_mean("Push", "Bytes", &[2u64, 10, 30, 20]).unwrap();
    writer.flush().unwrap();
    drop(writer);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, "Name,Instance,TotalCount,Min,Max,Mean\nPush,Bytes,2,10,30,20\n");
    std::fs::remove_dir_all(&dir).unwrap();
}
