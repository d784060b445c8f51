// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 任务编排
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex, mpsc},
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  config::PipelineConfig,
  display::DisplayContext,
  frame::Frame,
  input::{FrameSource, spawn_capture},
  model::Detector,
  output::DisplaySurface,
  scheduler::{InferenceOutcome, InferenceScheduler, infer_once},
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(self, input: I, detector: D, output: O) -> Result<(), Self::Error>;
}

/// 静态图像：显示一帧，推理一次，绘制一次
#[derive(Debug, Clone, Copy)]
pub struct OneShotTask {
  config: PipelineConfig,
}

impl OneShotTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self { config }
  }
}

impl<I, D, O> Task<I, D, O> for OneShotTask
where
  I: FrameSource,
  D: Detector,
  O: DisplaySurface,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, detector: D, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功: {}x{}", frame.width(), frame.height());

    let mut context = DisplayContext::new(self.config, output);
    context.show_frame(&frame)?;

    let now = Instant::now();
    let outcome = infer_once(&detector, frame, self.config.max_detections);
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    context.apply(outcome)?;
    info!("任务完成: {}", context.status());
    Ok(())
  }
}

/// 实时画面：采集线程推送帧，推理线程忙碌时丢帧，显示线程应用结果
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuousTask {
  config: PipelineConfig,
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self {
      config,
      frame_number: None,
    }
  }

  /// 应用指定数量的结果后退出
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

/// 已接受但结果尚未显示的帧，按序号排列
type Backdrops = Arc<Mutex<VecDeque<(u64, Frame)>>>;

/// 取出与结果同一序号的帧作为底图，更早的帧一并丢弃
fn take_backdrop(backdrops: &Backdrops, sequence: u64) -> Option<Frame> {
  let mut pending = backdrops.lock().ok()?;
  while let Some((accepted, frame)) = pending.pop_front() {
    match accepted.cmp(&sequence) {
      std::cmp::Ordering::Less => continue,
      std::cmp::Ordering::Equal => return Some(frame),
      std::cmp::Ordering::Greater => {
        pending.push_front((accepted, frame));
        return None;
      }
    }
  }
  None
}

/// 先显示结果对应的底图，再应用叠加层
fn present<S>(
  context: &mut DisplayContext<S>,
  backdrops: &Backdrops,
  outcome: InferenceOutcome,
) -> Result<(), S::Error>
where
  S: DisplaySurface,
{
  match take_backdrop(backdrops, outcome.sequence()) {
    Some(frame) => context.show_frame(&frame)?,
    None => warn!("第 {} 帧没有对应的底图", outcome.sequence()),
  }
  context.apply(outcome)
}

impl<I, D, O> Task<I, D, O> for ContinuousTask
where
  I: FrameSource + 'static,
  D: Detector + 'static,
  O: DisplaySurface,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, detector: D, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::channel();

    if let Err(e) = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    }) {
      warn!("无法注册中断处理: {}", e);
    }

    let (scheduler, inbox) = InferenceScheduler::spawn(detector, self.config.max_detections)?;
    let scheduler = Arc::new(scheduler);
    let backdrops: Backdrops = Arc::new(Mutex::new(VecDeque::new()));

    let capture = {
      let scheduler = scheduler.clone();
      let backdrops = backdrops.clone();
      spawn_capture(input, move |frame| {
        // 底图在帧交给推理线程之前入队，结果到达时一定能取到
        scheduler.submit_with(frame, |sequence, frame| {
          if let Ok(mut pending) = backdrops.lock() {
            pending.push_back((sequence, frame.clone()));
          }
        });
      })?
    };

    let mut context = DisplayContext::new(self.config, output);
    let mut applied = 0usize;
    loop {
      match inbox.recv_timeout(POLL_INTERVAL) {
        Ok(Some(outcome)) => {
          present(&mut context, &backdrops, outcome)?;
          applied += 1;
          if self.frame_number.is_some_and(|n| applied >= n) {
            info!("达到指定帧数 {}, 退出任务循环", applied);
            break;
          }
        }
        Ok(None) => {}
        Err(e) => {
          warn!("{}，退出任务循环", e);
          break;
        }
      }

      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if capture.is_finished() && !scheduler.is_busy() {
        info!("输入结束，退出任务循环");
        break;
      }
    }

    let captured = capture.join();
    let stats = scheduler.stats();
    drop(scheduler);
    let mut remaining = 0usize;
    while let Some(outcome) = inbox.try_recv() {
      present(&mut context, &backdrops, outcome)?;
      remaining += 1;
    }
    debug!("退出时处理剩余结果 {} 个", remaining);

    info!(
      "任务完成: 采集 {} 帧，接受 {}，丢弃 {}，完成 {}，失败 {}",
      captured, stats.accepted, stats.dropped, stats.completed, stats.failed
    );
    Ok(())
  }
}
