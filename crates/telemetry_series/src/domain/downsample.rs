use chrono::{DateTime, Utc};
use common::domain::{DownsampledPoint, Metric, Reading};

/// Maximum number of points in a dashboard series
pub const SERIES_CAP: usize = 200;

/// Round to two decimals, halves away from zero
pub fn round_to_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Half-open index range `[start, end)` of bucket `index` when splitting `len` entries into `cap` buckets
fn bucket_bounds(index: usize, len: usize, cap: usize) -> (usize, usize) {
    let start = index * len / cap;
    let end = if index + 1 == cap {
        len
    } else {
        (index + 1) * len / cap
    };
    (start, end)
}

#[derive(Default)]
struct BucketAccumulator {
    value_sum: f64,
    time_sum_ms: i128,
    count: usize,
}

impl BucketAccumulator {
    fn push(&mut self, value: f64, timestamp: DateTime<Utc>) {
        self.value_sum += value;
        self.time_sum_ms += i128::from(timestamp.timestamp_millis());
        self.count += 1;
    }

    fn finish(self) -> Option<DownsampledPoint> {
        if self.count == 0 {
            return None;
        }

        let count = self.count as i128;
        let mean_ms = self.time_sum_ms.div_euclid(count) as i64;
        let timestamp = DateTime::from_timestamp_millis(mean_ms)?;

        Some(DownsampledPoint::new(
            timestamp,
            round_to_two(self.value_sum / self.count as f64),
        ))
    }
}

/// Compress time-ordered readings into at most `cap` points of `metric`.
///
/// Up to `cap` readings map one to one, a missing value plotting as `0.0`.
/// Longer sequences are split into `cap` contiguous index buckets; each
/// bucket yields the mean value and the floored mean timestamp of its entries
/// that carry the metric. There, readings without a value are skipped and
/// buckets left empty produce no point. Non-finite values never plot.
pub fn downsample(readings: &[Reading], metric: Metric, cap: usize) -> Vec<DownsampledPoint> {
    if cap == 0 {
        return Vec::new();
    }

    if readings.len() <= cap {
        return readings
            .iter()
            .filter_map(|reading| {
                metric
                    .value_or_zero(reading)
                    .map(|value| DownsampledPoint::new(reading.created_at, round_to_two(value)))
            })
            .collect();
    }

    let len = readings.len();
    (0..cap)
        .filter_map(|index| {
            let (start, end) = bucket_bounds(index, len, cap);
            let mut bucket = BucketAccumulator::default();
            for reading in &readings[start..end] {
                if let Some(value) = metric.value_of(reading) {
                    bucket.push(value, reading.created_at);
                }
            }
            bucket.finish()
        })
        .collect()
}
