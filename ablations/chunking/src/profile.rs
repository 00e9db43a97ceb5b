//! 运行统计.

use std::time::{Duration, Instant};

use spot_berry::pipeline::Stage;

/// 可暂停的累计计时器.
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器, 并视为已经开始计时.
    #[inline]
    fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
            since: Instant::now(),
        }
    }

    #[inline]
    fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时, 并将这一区间的时间累加. 返回本轮计时时长.
    ///
    /// # 注意
    ///
    /// 上一次调用必须是 `self.start()`, 否则计算时间值无意义.
    #[inline]
    fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    #[inline]
    fn total_us(&self) -> u64 {
        self.consumed.as_micros() as u64
    }
}

/// 单个分块大小下的运行统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 分块大小.
    chunk_size: usize,

    /// 各阶段耗时. 下标依次为检测, 追踪, 特征提取.
    stages: [AccTimer; 3],

    /// 当前所处阶段.
    current: Option<Stage>,

    /// 整个任务花费的自然时间.
    real_time: AccTimer,

    /// 检测到的 spot 体素数.
    voxels: usize,

    /// 轨迹条数.
    tracks: usize,

    /// 结果是否与不分块时一致.
    consistent: bool,
}

#[inline]
fn stage_index(s: Stage) -> usize {
    match s {
        Stage::Detect => 0,
        Stage::Track => 1,
        Stage::Extract => 2,
    }
}

impl Profile {
    /// 初始化. 总计时随即开始.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            stages: [AccTimer::new(), AccTimer::new(), AccTimer::new()],
            current: None,
            real_time: AccTimer::new(),
            voxels: 0,
            tracks: 0,
            consistent: false,
        }
    }

    /// 收到阶段 `stage` 的进度通知. 阶段切换时结束上一阶段的计时.
    pub fn observe(&mut self, stage: Stage) {
        if self.current == Some(stage) {
            return;
        }
        if let Some(prev) = self.current {
            self.stages[stage_index(prev)].elapsed();
        }
        self.stages[stage_index(stage)].start();
        self.current = Some(stage);
    }

    /// 记录结果规模.
    pub fn record(&mut self, voxels: usize, tracks: usize, consistent: bool) {
        self.voxels = voxels;
        self.tracks = tracks;
        self.consistent = consistent;
    }

    /// 结束全部计时.
    pub fn finish(mut self) -> Self {
        if let Some(prev) = self.current.take() {
            self.stages[stage_index(prev)].elapsed();
        }
        self.real_time.elapsed();
        self
    }

    /// 分块大小.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 以微秒为单位获得阶段 `stage` 的耗时.
    #[inline]
    pub fn stage_us(&self, stage: Stage) -> u64 {
        self.stages[stage_index(stage)].total_us()
    }

    /// 以微秒为单位获得总自然时间.
    #[inline]
    pub fn real_time_us(&self) -> u64 {
        self.real_time.total_us()
    }

    /// spot 体素数.
    #[inline]
    pub fn voxels(&self) -> usize {
        self.voxels
    }

    /// 轨迹条数.
    #[inline]
    pub fn tracks(&self) -> usize {
        self.tracks
    }

    /// 结果是否与不分块时一致.
    #[inline]
    pub fn consistent(&self) -> bool {
        self.consistent
    }
}
