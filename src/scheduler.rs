// 该文件是 Kanjian （看见） 项目的一部分。
// src/scheduler.rs - 推理调度
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

//! # 推理调度
//!
//! 调度器只有两个状态：空闲与忙碌。空闲时到达的帧被接受并交给推理线程，
//! 忙碌时到达的帧直接丢弃，不排队也不缓存。同一时刻最多只有一次推理在进行，
//! 因此结果按帧被接受的顺序送达显示线程。
//!
//! 推理线程先把结果投递到显示线程的收件箱，再把状态切回空闲。

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::{
  frame::Frame,
  mapper::Size,
  model::{Detection, Detector, InferenceError},
};

/// 提交一帧的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
  /// 已接受，附带该帧的序号
  Accepted(u64),
  /// 推理进行中，该帧被丢弃
  Dropped,
}

/// 一次推理的结果，投递给显示线程
#[derive(Debug)]
pub enum InferenceOutcome {
  Detected {
    sequence: u64,
    frame_size: Size,
    detections: Vec<Detection>,
  },
  Failed {
    sequence: u64,
    error: InferenceError,
  },
}

impl InferenceOutcome {
  pub fn sequence(&self) -> u64 {
    match self {
      InferenceOutcome::Detected { sequence, .. } | InferenceOutcome::Failed { sequence, .. } => {
        *sequence
      }
    }
  }
}

/// 调度器计数快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
  pub accepted: u64,
  pub dropped: u64,
  pub completed: u64,
  pub failed: u64,
}

#[derive(Default)]
struct Counters {
  accepted: AtomicU64,
  dropped: AtomicU64,
  completed: AtomicU64,
  failed: AtomicU64,
}

impl Counters {
  fn snapshot(&self) -> SchedulerStats {
    SchedulerStats {
      accepted: self.accepted.load(Ordering::Relaxed),
      dropped: self.dropped.load(Ordering::Relaxed),
      completed: self.completed.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
    }
  }
}

/// 推理线程已退出，收件箱不会再有新结果
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("推理线程已退出")]
pub struct InboxClosed;

/// 显示线程持有的单消费者收件箱
pub struct Inbox {
  rx: Receiver<InferenceOutcome>,
}

impl Inbox {
  pub fn try_recv(&self) -> Option<InferenceOutcome> {
    self.rx.try_recv().ok()
  }

  /// 等待下一个结果，超时返回 `None`
  pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<InferenceOutcome>, InboxClosed> {
    match self.rx.recv_timeout(timeout) {
      Ok(outcome) => Ok(Some(outcome)),
      Err(RecvTimeoutError::Timeout) => Ok(None),
      Err(RecvTimeoutError::Disconnected) => Err(InboxClosed),
    }
  }
}

/// 对模型原始输出做整理：限制坐标和置信度；配置了上限时按置信度取前 K 个
pub fn decode(mut detections: Vec<Detection>, max_detections: Option<usize>) -> Vec<Detection> {
  for detection in detections.iter_mut() {
    detection.bbox = detection.bbox.clamped();
    detection.confidence = if detection.confidence.is_nan() {
      0.0
    } else {
      detection.confidence.clamp(0.0, 1.0)
    };
  }

  if let Some(k) = max_detections {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections.truncate(k);
  }
  detections
}

/// 静态模式：一次请求，一次完成
pub fn infer_once<D: Detector + ?Sized>(
  detector: &D,
  frame: Frame,
  max_detections: Option<usize>,
) -> InferenceOutcome {
  run_inference(detector, 0, frame, max_detections)
}

fn run_inference<D: Detector + ?Sized>(
  detector: &D,
  sequence: u64,
  frame: Frame,
  max_detections: Option<usize>,
) -> InferenceOutcome {
  let frame_size = frame.size();
  let now = Instant::now();
  let result = detector.detect(&frame);
  drop(frame);
  let elapsed = now.elapsed();

  match result {
    Ok(detections) => {
      let detections = decode(detections, max_detections);
      debug!(
        "第 {} 帧推理完成，耗时: {:.2?}，目标数: {}",
        sequence,
        elapsed,
        detections.len()
      );
      InferenceOutcome::Detected {
        sequence,
        frame_size,
        detections,
      }
    }
    Err(error) => {
      warn!("第 {} 帧推理失败，耗时: {:.2?}: {}", sequence, elapsed, error);
      InferenceOutcome::Failed { sequence, error }
    }
  }
}

struct Job {
  sequence: u64,
  frame: Frame,
}

/// 实时模式的推理调度器
pub struct InferenceScheduler {
  busy: Arc<AtomicBool>,
  jobs: Option<SyncSender<Job>>,
  next_sequence: AtomicU64,
  counters: Arc<Counters>,
  worker: Option<JoinHandle<()>>,
}

impl InferenceScheduler {
  /// 启动推理线程，返回调度器和显示线程的收件箱
  pub fn spawn<D>(detector: D, max_detections: Option<usize>) -> std::io::Result<(Self, Inbox)>
  where
    D: Detector + 'static,
  {
    let busy = Arc::new(AtomicBool::new(false));
    let counters = Arc::new(Counters::default());
    let (job_tx, job_rx) = mpsc::sync_channel::<Job>(1);
    let (outcome_tx, outcome_rx) = mpsc::channel();

    let worker = {
      let busy = busy.clone();
      let counters = counters.clone();
      thread::Builder::new()
        .name("inference".to_string())
        .spawn(move || {
          Self::worker_loop(detector, max_detections, job_rx, outcome_tx, busy, counters)
        })?
    };

    info!("推理线程已启动");
    Ok((
      Self {
        busy,
        jobs: Some(job_tx),
        next_sequence: AtomicU64::new(0),
        counters,
        worker: Some(worker),
      },
      Inbox { rx: outcome_rx },
    ))
  }

  fn worker_loop<D: Detector>(
    detector: D,
    max_detections: Option<usize>,
    jobs: Receiver<Job>,
    inbox: Sender<InferenceOutcome>,
    busy: Arc<AtomicBool>,
    counters: Arc<Counters>,
  ) {
    for Job { sequence, frame } in jobs {
      let outcome = run_inference(&detector, sequence, frame, max_detections);
      match outcome {
        InferenceOutcome::Detected { .. } => counters.completed.fetch_add(1, Ordering::Relaxed),
        InferenceOutcome::Failed { .. } => counters.failed.fetch_add(1, Ordering::Relaxed),
      };
      if inbox.send(outcome).is_err() {
        warn!("显示线程已退出，丢弃第 {} 帧结果", sequence);
      }
      busy.store(false, Ordering::Release);
    }
    info!("推理线程退出");
  }

  /// 提交一帧。空闲时接受并切换到忙碌，忙碌时丢弃。
  pub fn submit(&self, frame: Frame) -> Submission {
    self.submit_with(frame, |_, _| {})
  }

  /// 同 `submit`，帧被接受后、交给推理线程之前调用 `on_accept`。
  /// 该帧的结果一定在 `on_accept` 返回之后才会到达收件箱。
  pub fn submit_with<F>(&self, frame: Frame, on_accept: F) -> Submission
  where
    F: FnOnce(u64, &Frame),
  {
    if self
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      self.counters.dropped.fetch_add(1, Ordering::Relaxed);
      trace!("推理进行中，丢弃一帧");
      return Submission::Dropped;
    }

    let Some(jobs) = self.jobs.as_ref() else {
      self.busy.store(false, Ordering::Release);
      return Submission::Dropped;
    };

    let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
    on_accept(sequence, &frame);
    match jobs.try_send(Job { sequence, frame }) {
      Ok(()) => {
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        trace!("接受第 {} 帧", sequence);
        Submission::Accepted(sequence)
      }
      Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
        warn!("推理线程不可用，丢弃第 {} 帧", sequence);
        self.busy.store(false, Ordering::Release);
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        Submission::Dropped
      }
    }
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }

  pub fn stats(&self) -> SchedulerStats {
    self.counters.snapshot()
  }
}

impl Drop for InferenceScheduler {
  fn drop(&mut self) {
    // 关闭任务通道，推理线程处理完当前帧后退出
    self.jobs.take();
    if let Some(worker) = self.worker.take()
      && worker.join().is_err()
    {
      warn!("推理线程异常退出");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::PixelFormat, model::NormalizedRect};
  use std::sync::{
    Mutex,
    atomic::AtomicUsize,
    mpsc::{Receiver as StdReceiver, channel},
  };

  fn frame() -> Frame {
    Frame::new(vec![0; 12], 2, 2, PixelFormat::Rgb8).unwrap()
  }

  fn detection(label: &str, confidence: f32) -> Detection {
    Detection::new(label, confidence, NormalizedRect::new(0.1, 0.1, 0.2, 0.2))
  }

  /// 记录并发调用数，每次调用等待放行信号
  struct GatedDetector {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    gate: Mutex<StdReceiver<()>>,
  }

  impl Detector for GatedDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.max_in_flight.fetch_max(now, Ordering::SeqCst);
      let call = self.calls.fetch_add(1, Ordering::SeqCst);
      let _ = self.gate.lock().unwrap().recv();
      self.in_flight.fetch_sub(1, Ordering::SeqCst);
      Ok(vec![detection(&format!("call-{}", call), 0.5)])
    }
  }

  struct SleepyDetector {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
  }

  impl Detector for SleepyDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.max_in_flight.fetch_max(now, Ordering::SeqCst);
      thread::sleep(Duration::from_micros(fastrand::u64(0..500)));
      self.in_flight.fetch_sub(1, Ordering::SeqCst);
      Ok(Vec::new())
    }
  }

  #[test]
  fn decode_caps_by_confidence() {
    let detections = vec![
      detection("a", 0.3),
      detection("b", 0.9),
      detection("c", f32::NAN),
      detection("d", 1.7),
    ];
    let labels: Vec<_> = decode(detections.clone(), Some(2))
      .into_iter()
      .map(|d| (d.label, d.confidence))
      .collect();
    assert_eq!(labels, vec![("d".to_string(), 1.0), ("b".to_string(), 0.9)]);

    // 未配置上限时保持模型顺序
    let labels: Vec<_> = decode(detections, None)
      .into_iter()
      .map(|d| d.label)
      .collect();
    assert_eq!(labels, vec!["a", "b", "c", "d"]);
  }

  #[test]
  fn busy_frames_are_dropped() {
    let (gate_tx, gate_rx) = channel();
    let detector = GatedDetector {
      in_flight: Arc::default(),
      max_in_flight: Arc::default(),
      calls: Arc::default(),
      gate: Mutex::new(gate_rx),
    };
    let calls = detector.calls.clone();
    let (scheduler, inbox) = InferenceScheduler::spawn(detector, None).unwrap();

    assert_eq!(scheduler.submit(frame()), Submission::Accepted(0));
    assert_eq!(scheduler.submit(frame()), Submission::Dropped);
    assert!(scheduler.is_busy());

    gate_tx.send(()).unwrap();
    let outcome = inbox
      .recv_timeout(Duration::from_secs(5))
      .unwrap()
      .unwrap();
    assert_eq!(outcome.sequence(), 0);

    // 结果送达后调度器回到空闲
    while scheduler.is_busy() {
      thread::yield_now();
    }
    assert_eq!(scheduler.submit(frame()), Submission::Accepted(1));
    gate_tx.send(()).unwrap();
    let outcome = inbox
      .recv_timeout(Duration::from_secs(5))
      .unwrap()
      .unwrap();
    assert_eq!(outcome.sequence(), 1);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let stats = scheduler.stats();
    assert_eq!((stats.accepted, stats.dropped, stats.completed), (2, 1, 2));
  }

  #[test]
  fn never_more_than_one_inference_in_flight() {
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let detector = SleepyDetector {
      in_flight: Arc::default(),
      max_in_flight: max_in_flight.clone(),
    };
    let (scheduler, inbox) = InferenceScheduler::spawn(detector, None).unwrap();
    let scheduler = Arc::new(scheduler);

    let producers: Vec<_> = (0..4)
      .map(|_| {
        let scheduler = scheduler.clone();
        thread::spawn(move || {
          let mut accepted = Vec::new();
          for _ in 0..200 {
            if let Submission::Accepted(seq) = scheduler.submit(frame()) {
              accepted.push(seq);
            }
            if fastrand::bool() {
              thread::yield_now();
            }
          }
          accepted
        })
      })
      .collect();
    let mut accepted: Vec<u64> = producers
      .into_iter()
      .flat_map(|p| p.join().unwrap())
      .collect();
    accepted.sort_unstable();

    let mut received = Vec::new();
    while received.len() < accepted.len() {
      if let Some(outcome) = inbox.recv_timeout(Duration::from_secs(5)).unwrap() {
        received.push(outcome.sequence());
      }
    }

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    // 结果按接受顺序送达
    assert_eq!(received, accepted);
    let stats = scheduler.stats();
    assert_eq!(stats.accepted + stats.dropped, 800);
  }

  #[test]
  fn failures_return_to_idle() {
    struct Failing;
    impl Detector for Failing {
      fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
        Err(InferenceError::Backend("boom".to_string()))
      }
    }

    let (scheduler, inbox) = InferenceScheduler::spawn(Failing, None).unwrap();
    assert_eq!(scheduler.submit(frame()), Submission::Accepted(0));
    let outcome = inbox
      .recv_timeout(Duration::from_secs(5))
      .unwrap()
      .unwrap();
    assert!(matches!(outcome, InferenceOutcome::Failed { sequence: 0, .. }));
    while scheduler.is_busy() {
      thread::yield_now();
    }
    assert_eq!(scheduler.submit(frame()), Submission::Accepted(1));
    drop(scheduler);
    assert_eq!(scheduler_failed_count(&inbox), 1);
  }

  fn scheduler_failed_count(inbox: &Inbox) -> usize {
    let mut failed = 0;
    while let Some(outcome) = inbox.try_recv() {
      if matches!(outcome, InferenceOutcome::Failed { .. }) {
        failed += 1;
      }
    }
    failed
  }

  #[test]
  fn accept_hook_runs_only_for_accepted_frames() {
    let (release, gate) = channel();
    let detector = GatedDetector {
      in_flight: Arc::new(AtomicUsize::new(0)),
      max_in_flight: Arc::new(AtomicUsize::new(0)),
      calls: Arc::new(AtomicUsize::new(0)),
      gate: Mutex::new(gate),
    };
    let (scheduler, inbox) = InferenceScheduler::spawn(detector, None).unwrap();
    let hooked = Mutex::new(Vec::new());

    let accepted = scheduler.submit_with(frame(), |sequence, frame| {
      hooked.lock().unwrap().push((sequence, frame.width()));
    });
    assert_eq!(accepted, Submission::Accepted(0));
    let dropped = scheduler.submit_with(frame(), |sequence, _| {
      hooked.lock().unwrap().push((sequence, 0));
    });
    assert_eq!(dropped, Submission::Dropped);
    assert_eq!(*hooked.lock().unwrap(), vec![(0, 2)]);

    release.send(()).unwrap();
    let outcome = inbox
      .recv_timeout(Duration::from_secs(5))
      .unwrap()
      .unwrap();
    assert_eq!(outcome.sequence(), 0);
  }

  #[test]
  fn infer_once_reports_frame_size() {
    struct One;
    impl Detector for One {
      fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
        Ok(vec![detection("cat", 0.91)])
      }
    }
    match infer_once(&One, frame(), Some(3)) {
      InferenceOutcome::Detected {
        frame_size,
        detections,
        ..
      } => {
        assert_eq!(frame_size, Size::new(2.0, 2.0));
        assert_eq!(detections.len(), 1);
      }
      other => panic!("unexpected outcome: {:?}", other),
    }
  }
}
