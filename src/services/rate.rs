//! 累计计数器速率换算
//!
//! 把单调递增的累计值（磁盘读写字节、网卡收发字节）换算为每秒速率。
//!
//! 每个 `RateSampler` 对应一条独立的计数流，状态属于实例本身。
//! `sample` 需要 `&mut self`，因此同一条流只能有一个写入者（采集器），内部不加锁。

use chrono::{DateTime, Utc};
use std::time::Duration;

/// 1 MiB
pub const MIB: f64 = 1024.0 * 1024.0;

/// 1 KiB
pub const KIB: f64 = 1024.0;

/// 单条计数流的速率换算器
#[derive(Debug, Clone)]
pub struct RateSampler {
    /// 名义采样周期，时间差异常（<= 0）时用它代替
    nominal_period: Duration,
    /// 单位换算除数（如 MiB）
    unit_divisor: f64,
    /// 上一次的读数和时间，None 表示尚未建立基线
    last: Option<(u64, DateTime<Utc>)>,
}

impl RateSampler {
    pub fn new(nominal_period: Duration, unit_divisor: f64) -> Self {
        Self {
            nominal_period,
            unit_divisor,
            last: None,
        }
    }

    /// 是否已记录基线
    pub fn has_baseline(&self) -> bool {
        self.last.is_some()
    }

    /// 输入一次读数，返回 `unit/s` 速率
    ///
    /// 首次调用只记录基线并返回 0；读数回退视为计数器重置，返回 0。
    /// 无论结果如何都会以本次读数作为新的基线。
    pub fn sample(&mut self, value: u64, at: DateTime<Utc>) -> f64 {
        let rate = match self.last {
            None => 0.0,
            Some((last_value, last_at)) => {
                if value < last_value {
                    0.0
                } else {
                    let elapsed = (at - last_at)
                        .to_std()
                        .ok()
                        .filter(|d| !d.is_zero())
                        .unwrap_or(self.nominal_period);
                    let secs = elapsed.as_secs_f64();
                    if secs > 0.0 {
                        (value - last_value) as f64 / self.unit_divisor / secs
                    } else {
                        0.0
                    }
                }
            }
        };

        self.last = Some((value, at));
        rate
    }
}
