// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The FrameScheduler divides the animation among sibling workers and
//! makes sure their frames reach the sink in order.
//!
//! Each worker gets a contiguous block of frame indexes.  The workers
//! run side by side as scoped threads; the only thing they share that
//! can change is the hand-off chain from `token`, which lets worker
//! k+1 store frames only once worker k has stored all of its own.
//! Within each frame the FrameRenderer fans out again across rows, so
//! the run has two levels of parallelism.

use crate::config::RenderRequest;
use crate::errors::{panic_reason, RenderError, Result};
use crate::frames::{FrameNamer, FrameTask};
use crate::render::{FrameRenderer, Raster};
use crate::store::FrameSink;
use crate::token::{token_chain, Handoff};
use crossbeam::thread::ScopedJoinHandle;
use log::{debug, error, info};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long a worker waits for its turn before giving up, unless
/// told otherwise.
pub const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_secs(600);

/// The frames one worker is responsible for, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessAssignment {
    /// Which worker.
    pub process_id: u32,
    /// The frame indexes it renders, ascending and contiguous.
    pub frame_indexes: Vec<u32>,
}

/// Split `frame_count` frames into `workers` contiguous blocks of
/// `frame_count / workers` frames.  The leftover frames go one apiece
/// to the trailing workers, so 50 frames over 3 workers come out as
/// 16, 17, 17.
pub fn assign_frames(frame_count: u32, workers: u32) -> Result<Vec<ProcessAssignment>> {
    if workers == 0 {
        return Err(RenderError::Configuration(
            "frames cannot be assigned to zero workers".to_string(),
        ));
    }
    let base = frame_count / workers;
    let remainder = frame_count % workers;
    let first_long = workers - remainder;

    let mut start = 0;
    Ok((0..workers)
        .map(|process_id| {
            let size = if process_id >= first_long { base + 1 } else { base };
            let frame_indexes: Vec<u32> = (start..start + size).collect();
            start += size;
            ProcessAssignment {
                process_id,
                frame_indexes,
            }
        })
        .collect())
}

/// When a worker may compute, as opposed to when it may store.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandoffPolicy {
    /// A worker computes and stores its block only while it holds the
    /// token.  One worker is busy at a time.
    Serial,
    /// Every worker computes its block at once and waits for the token
    /// only to store it.  Frames still reach the sink in order.
    Pipelined,
}

impl Default for HandoffPolicy {
    fn default() -> Self {
        HandoffPolicy::Pipelined
    }
}

impl FromStr for HandoffPolicy {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "serial" => Ok(HandoffPolicy::Serial),
            "pipelined" => Ok(HandoffPolicy::Pipelined),
            other => Err(RenderError::Configuration(format!(
                "unknown policy '{}', expected 'serial' or 'pipelined'",
                other
            ))),
        }
    }
}

/// Where a worker is in its life.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Blocked until the previous worker passes the token.
    WaitingForToken,
    /// Computing (and, under the serial policy, storing) frames.
    Rendering,
    /// Finished with its frames, passing the token on.
    SignalNext,
    /// Nothing left to do.
    Done,
}

impl WorkerState {
    fn may_become(self, next: WorkerState) -> bool {
        use self::WorkerState::*;
        match (self, next) {
            (WaitingForToken, Rendering) => true,
            (Rendering, WaitingForToken) => true,
            (Rendering, SignalNext) => true,
            (SignalNext, Done) => true,
            _ => false,
        }
    }
}

/// What a worker accomplished.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerReport {
    /// Which worker.
    pub process_id: u32,
    /// How many frames it stored.
    pub frames_stored: usize,
    /// The output ids it stored, in order.
    pub output_ids: Vec<String>,
    /// The state it ended in.
    pub final_state: WorkerState,
}

/// What the whole run accomplished.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    /// One report per worker, in worker order.
    pub workers: Vec<WorkerReport>,
}

impl RunReport {
    /// Number of frames stored across all workers.
    pub fn frames_stored(&self) -> usize {
        self.workers.iter().map(|w| w.frames_stored).sum()
    }
}

// Everything a worker thread needs, borrowed from the scheduler.
struct Worker<'s, S: FrameSink> {
    scheduler: &'s FrameScheduler<'s, S>,
    cancelled: &'s AtomicBool,
    assignment: ProcessAssignment,
    state: WorkerState,
    output_ids: Vec<String>,
}

impl<'s, S: FrameSink> Worker<'s, S> {
    fn process_id(&self) -> u32 {
        self.assignment.process_id
    }

    fn advance(&mut self, next: WorkerState) {
        debug_assert!(
            self.state.may_become(next),
            "worker {}: {:?} -> {:?}",
            self.process_id(),
            self.state,
            next
        );
        debug!("worker {}: {:?} -> {:?}", self.process_id(), self.state, next);
        self.state = next;
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(RenderError::Cancelled {
                process_id: self.process_id(),
            });
        }
        Ok(())
    }

    fn render(&self, link: &Handoff, index: u32) -> Result<Raster> {
        self.check_cancelled()?;
        self.scheduler.sink.started(&self.scheduler.namer.output_id(index));
        let raster = FrameRenderer::new(self.scheduler.request).render(&FrameTask::new(index))?;
        link.heartbeat();
        Ok(raster)
    }

    fn store(&mut self, link: &Handoff, index: u32, raster: &Raster) -> Result<()> {
        let output_id = self.scheduler.namer.output_id(index);
        self.scheduler.sink.store(&output_id, raster)?;
        info!("worker {} stored {}", self.process_id(), output_id);
        self.output_ids.push(output_id);
        link.heartbeat();
        Ok(())
    }

    // Block until it is this worker's turn, then start working.
    fn take_turn(&mut self, link: &mut Handoff) -> Result<()> {
        link.acquire(self.scheduler.handoff_timeout)?;
        if self.state == WorkerState::WaitingForToken {
            self.advance(WorkerState::Rendering);
        }
        Ok(())
    }

    fn finish(mut self, link: Handoff) -> WorkerReport {
        self.advance(WorkerState::SignalNext);
        link.release();
        self.advance(WorkerState::Done);
        WorkerReport {
            process_id: self.process_id(),
            frames_stored: self.output_ids.len(),
            output_ids: self.output_ids,
            final_state: self.state,
        }
    }

    // Wait, then compute and store each frame in turn.
    fn run_serial(mut self, mut link: Handoff) -> Result<WorkerReport> {
        self.take_turn(&mut link)?;
        for index in self.assignment.frame_indexes.clone() {
            let raster = self.render(&link, index)?;
            self.store(&link, index, &raster)?;
        }
        Ok(self.finish(link))
    }

    // Compute straight away.  Frames finished before the token arrives
    // are held back; once it is here, each frame is stored as soon as
    // it is computed.
    fn run_pipelined(mut self, mut link: Handoff) -> Result<WorkerReport> {
        let mut pending: Vec<(u32, Raster)> = vec![];
        let mut computed = Ok(());
        for index in self.assignment.frame_indexes.clone() {
            let raster = match self.render(&link, index) {
                Ok(raster) => raster,
                Err(failure) => {
                    computed = Err(failure);
                    break;
                }
            };
            if link.try_acquire()? {
                for (held, frame) in pending.drain(..) {
                    self.store(&link, held, &frame)?;
                }
                self.store(&link, index, &raster)?;
            } else {
                pending.push((index, raster));
            }
        }

        // The token is taken even when computing failed, so that
        // dropping it lets the next worker carry on.
        if !link.holds_token() {
            debug!(
                "worker {} computed {} frames, waiting to store them",
                self.process_id(),
                pending.len()
            );
            self.advance(WorkerState::WaitingForToken);
            self.take_turn(&mut link)?;
        }
        computed?;
        for (index, raster) in pending {
            self.check_cancelled()?;
            self.store(&link, index, &raster)?;
        }
        Ok(self.finish(link))
    }
}

/// Drives a whole run: assigns frames, starts one worker per block,
/// and waits for every one of them.
pub struct FrameScheduler<'a, S: FrameSink> {
    request: &'a RenderRequest,
    namer: FrameNamer,
    sink: &'a S,
    policy: HandoffPolicy,
    handoff_timeout: Option<Duration>,
}

impl<'a, S: FrameSink> FrameScheduler<'a, S> {
    /// A scheduler for `request`, naming frames with `namer` and
    /// handing them to `sink`.
    pub fn new(request: &'a RenderRequest, namer: FrameNamer, sink: &'a S) -> Self {
        FrameScheduler {
            request,
            namer,
            sink,
            policy: HandoffPolicy::default(),
            handoff_timeout: Some(DEFAULT_HANDOFF_TIMEOUT),
        }
    }

    /// Choose when workers may compute.
    pub fn policy(mut self, policy: HandoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound how long a worker waits for its turn; `None` waits
    /// forever.
    pub fn handoff_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handoff_timeout = timeout;
        self
    }

    /// Render and store every frame of the request.  Returns once all
    /// workers have finished; if any of them failed, every failure is
    /// reported together.
    pub fn run(&self) -> Result<RunReport> {
        self.request.validate()?;
        let assignments = assign_frames(self.request.frame_count, self.request.worker_processes)?;
        let chain = token_chain(self.request.worker_processes);
        let cancelled = AtomicBool::new(false);

        info!(
            "generating {} frames using {} workers of {} threads ({:?})",
            self.request.frame_count,
            self.request.worker_processes,
            self.request.worker_threads,
            self.policy
        );

        let outcome = crossbeam::scope(|spawner| -> Result<Vec<Result<WorkerReport>>> {
            let mut handles: Vec<(u32, ScopedJoinHandle<Result<WorkerReport>>)> = vec![];
            for (assignment, handoff) in assignments.into_iter().zip(chain) {
                let process_id = assignment.process_id;
                if let (Some(first), Some(last)) =
                    (assignment.frame_indexes.first(), assignment.frame_indexes.last())
                {
                    info!("worker {} assigned frames {} to {}", process_id, first + 1, last + 1);
                }
                let policy = self.policy;
                let worker = Worker {
                    scheduler: self,
                    cancelled: &cancelled,
                    state: if policy == HandoffPolicy::Serial && !handoff.holds_token() {
                        WorkerState::WaitingForToken
                    } else {
                        WorkerState::Rendering
                    },
                    assignment,
                    output_ids: vec![],
                };
                let spawned = spawner
                    .builder()
                    .name(format!("worker-{}", process_id))
                    .spawn(move |_| match policy {
                        HandoffPolicy::Serial => worker.run_serial(handoff),
                        HandoffPolicy::Pipelined => worker.run_pipelined(handoff),
                    });
                match spawned {
                    Ok(handle) => handles.push((process_id, handle)),
                    Err(cause) => {
                        error!("could not start worker {}, cancelling the run", process_id);
                        cancelled.store(true, Ordering::SeqCst);
                        return Err(RenderError::Resource {
                            what: format!("worker {}", process_id),
                            cause,
                        });
                    }
                }
            }

            Ok(handles
                .into_iter()
                .map(|(process_id, handle)| {
                    handle.join().unwrap_or_else(|payload| {
                        Err(RenderError::PartialExit {
                            what: format!("worker {}", process_id),
                            reason: panic_reason(payload),
                        })
                    })
                })
                .collect())
        });

        let results = match outcome {
            Ok(results) => results?,
            Err(payload) => {
                return Err(RenderError::PartialExit {
                    what: "the scheduler".to_string(),
                    reason: panic_reason(payload),
                })
            }
        };

        let mut workers = vec![];
        let mut failures = vec![];
        for result in results {
            match result {
                Ok(report) => workers.push(report),
                Err(failure) => {
                    error!("{}", failure);
                    failures.push(failure);
                }
            }
        }
        if !failures.is_empty() {
            return Err(RenderError::run_failed(failures));
        }

        info!("all {} frames generated", self.request.frame_count);
        Ok(RunReport { workers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        stored: Mutex<Vec<String>>,
        busy: AtomicUsize,
        overlapped: AtomicBool,
    }

    impl FrameSink for RecordingSink {
        fn store(&self, output_id: &str, _raster: &Raster) -> Result<()> {
            if self.busy.fetch_add(1, Ordering::SeqCst) != 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.stored.lock().unwrap().push(output_id.to_string());
            self.busy.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink {
        fail_on: &'static str,
        panic: bool,
        stored: Mutex<Vec<String>>,
    }

    impl FrameSink for FailingSink {
        fn store(&self, output_id: &str, _raster: &Raster) -> Result<()> {
            if output_id == self.fail_on {
                if self.panic {
                    panic!("sink blew up on {}", output_id);
                }
                return Err(RenderError::Encode {
                    output_id: output_id.to_string(),
                    cause: io::Error::new(io::ErrorKind::Other, "disk full"),
                });
            }
            self.stored.lock().unwrap().push(output_id.to_string());
            Ok(())
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Event {
        Started(String),
        Stored(String),
    }

    // Records when each frame starts computing and when it is stored,
    // optionally taking its time over each store.
    #[derive(Default)]
    struct EventSink {
        events: Mutex<Vec<Event>>,
        delay: Duration,
    }

    impl EventSink {
        fn slow(delay: Duration) -> Self {
            EventSink {
                delay,
                ..Default::default()
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn stored(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Stored(id) => Some(id),
                    Event::Started(_) => None,
                })
                .collect()
        }
    }

    impl FrameSink for EventSink {
        fn started(&self, output_id: &str) {
            self.events.lock().unwrap().push(Event::Started(output_id.to_string()));
        }

        fn store(&self, output_id: &str, _raster: &Raster) -> Result<()> {
            std::thread::sleep(self.delay);
            self.events.lock().unwrap().push(Event::Stored(output_id.to_string()));
            Ok(())
        }
    }

    fn one_at_a_time(range: std::ops::Range<u32>) -> Vec<Event> {
        names(range)
            .into_iter()
            .flat_map(|id| vec![Event::Started(id.clone()), Event::Stored(id)])
            .collect()
    }

    fn tiny(frames: u32, workers: u32, threads: u32) -> RenderRequest {
        RenderRequest {
            center_x: -0.5,
            center_y: 0.0,
            width: 16,
            height: 12,
            max_iterations: 50,
            frame_count: frames,
            worker_processes: workers,
            worker_threads: threads,
            ..Default::default()
        }
    }

    fn names(range: std::ops::Range<u32>) -> Vec<String> {
        let namer = FrameNamer::new("mandel");
        range.map(|i| namer.output_id(i)).collect()
    }

    fn sizes(assignments: &[ProcessAssignment]) -> Vec<usize> {
        assignments.iter().map(|a| a.frame_indexes.len()).collect()
    }

    #[test]
    fn fifty_frames_over_three_workers() {
        let assignments = assign_frames(50, 3).unwrap();
        assert_eq!(sizes(&assignments), vec![16, 17, 17]);
        assert_eq!(assignments[0].frame_indexes, (0..16).collect::<Vec<_>>());
        assert_eq!(assignments[1].frame_indexes, (16..33).collect::<Vec<_>>());
        assert_eq!(assignments[2].frame_indexes, (33..50).collect::<Vec<_>>());
    }

    #[test]
    fn even_division_has_equal_blocks() {
        assert_eq!(sizes(&assign_frames(50, 5).unwrap()), vec![10; 5]);
        assert_eq!(sizes(&assign_frames(50, 1).unwrap()), vec![50]);
    }

    #[test]
    fn more_workers_than_frames() {
        let assignments = assign_frames(2, 5).unwrap();
        assert_eq!(sizes(&assignments), vec![0, 0, 0, 1, 1]);
        assert_eq!(assignments[4].frame_indexes, vec![1]);
    }

    #[test]
    fn assignments_cover_every_frame_once() {
        for frames in 1..40 {
            for workers in 1..12 {
                let all: Vec<u32> = assign_frames(frames, workers)
                    .unwrap()
                    .into_iter()
                    .flat_map(|a| a.frame_indexes)
                    .collect();
                assert_eq!(all, (0..frames).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn zero_workers_is_refused() {
        assert!(assign_frames(50, 0).is_err());
    }

    #[test]
    fn policies_parse() {
        assert_eq!("serial".parse::<HandoffPolicy>().unwrap(), HandoffPolicy::Serial);
        assert_eq!("pipelined".parse::<HandoffPolicy>().unwrap(), HandoffPolicy::Pipelined);
        assert!("chaotic".parse::<HandoffPolicy>().is_err());
    }

    #[test]
    fn state_transitions() {
        use super::WorkerState::*;
        assert!(WaitingForToken.may_become(Rendering));
        assert!(Rendering.may_become(SignalNext));
        assert!(SignalNext.may_become(Done));
        assert!(!WaitingForToken.may_become(Done));
        assert!(!Done.may_become(Rendering));
    }

    #[test]
    fn frames_arrive_in_order_under_both_policies() {
        for policy in [HandoffPolicy::Serial, HandoffPolicy::Pipelined].iter() {
            for workers in 1..6 {
                let request = tiny(11, workers, 3);
                let sink = RecordingSink::default();
                let report = FrameScheduler::new(&request, FrameNamer::new("mandel"), &sink)
                    .policy(*policy)
                    .run()
                    .unwrap();
                assert_eq!(*sink.stored.lock().unwrap(), names(0..11), "{:?} {}", policy, workers);
                assert!(!sink.overlapped.load(Ordering::SeqCst));
                assert_eq!(report.frames_stored(), 11);
                assert_eq!(report.workers.len(), workers as usize);
                assert!(report.workers.iter().all(|w| w.final_state == WorkerState::Done));
            }
        }
    }

    #[test]
    fn report_lists_each_workers_block() {
        let request = tiny(50, 3, 2);
        let sink = RecordingSink::default();
        let report = FrameScheduler::new(&request, FrameNamer::new("mandel"), &sink)
            .run()
            .unwrap();
        assert_eq!(report.workers[0].output_ids, names(0..16));
        assert_eq!(report.workers[1].output_ids, names(16..33));
        assert_eq!(report.workers[2].output_ids, names(33..50));
        assert_eq!(report.workers[1].frames_stored, 17);
    }

    #[test]
    fn serial_workers_never_compute_side_by_side() {
        let request = tiny(9, 3, 2);
        let sink = EventSink::default();
        FrameScheduler::new(&request, FrameNamer::new("mandel"), &sink)
            .policy(HandoffPolicy::Serial)
            .run()
            .unwrap();
        // Every frame starts only after the one before it was stored,
        // across worker boundaries too.
        assert_eq!(sink.events(), one_at_a_time(0..9));
    }

    #[test]
    fn pipelined_token_holder_stores_as_it_goes() {
        let request = tiny(9, 3, 2);
        let sink = EventSink::default();
        FrameScheduler::new(&request, FrameNamer::new("mandel"), &sink)
            .policy(HandoffPolicy::Pipelined)
            .run()
            .unwrap();
        let first_block = names(0..3);
        let worker_zero: Vec<Event> = sink
            .events()
            .into_iter()
            .filter(|e| match e {
                Event::Started(id) | Event::Stored(id) => first_block.contains(id),
            })
            .collect();
        assert_eq!(worker_zero, one_at_a_time(0..3));
        assert_eq!(sink.stored(), names(0..9));
    }

    #[test]
    fn a_slow_but_steady_predecessor_does_not_time_out() {
        for policy in [HandoffPolicy::Serial, HandoffPolicy::Pipelined].iter() {
            let request = tiny(8, 2, 1);
            let sink = EventSink::slow(Duration::from_millis(40));
            // Worker 0 needs about 160ms for its block, well past the
            // timeout, but finishes a frame every 40ms.
            let report = FrameScheduler::new(&request, FrameNamer::new("mandel"), &sink)
                .policy(*policy)
                .handoff_timeout(Some(Duration::from_millis(100)))
                .run()
                .unwrap();
            assert_eq!(report.frames_stored(), 8, "{:?}", policy);
            assert_eq!(sink.stored(), names(0..8));
        }
    }

    #[test]
    fn a_stalled_predecessor_still_times_out() {
        let request = tiny(4, 2, 1);
        let sink = EventSink::slow(Duration::from_millis(300));
        let result = FrameScheduler::new(&request, FrameNamer::new("mandel"), &sink)
            .policy(HandoffPolicy::Serial)
            .handoff_timeout(Some(Duration::from_millis(100)))
            .run();
        match result {
            Err(RenderError::RunFailed { failures, .. }) => {
                assert_eq!(failures.len(), 1);
                match &failures[0] {
                    RenderError::HandoffTimeout { process_id, .. } => assert_eq!(*process_id, 1),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sink.stored(), names(0..2));
    }

    #[test]
    fn a_failed_frame_does_not_stall_the_others() {
        for policy in [HandoffPolicy::Serial, HandoffPolicy::Pipelined].iter() {
            let request = tiny(9, 3, 2);
            let sink = FailingSink {
                fail_on: "mandel_2.jpg",
                panic: false,
                stored: Mutex::new(vec![]),
            };
            let result = FrameScheduler::new(&request, FrameNamer::new("mandel"), &sink)
                .policy(*policy)
                .handoff_timeout(Some(Duration::from_secs(30)))
                .run();
            match result {
                Err(RenderError::RunFailed { failures, .. }) => {
                    assert_eq!(failures.len(), 1);
                    match &failures[0] {
                        RenderError::Encode { output_id, .. } => assert_eq!(output_id, "mandel_2.jpg"),
                        other => panic!("unexpected {:?}", other),
                    }
                }
                other => panic!("unexpected {:?}", other),
            }
            let mut expected = names(0..1);
            expected.extend(names(3..9));
            assert_eq!(*sink.stored.lock().unwrap(), expected);
        }
    }

    #[test]
    fn a_panicking_worker_is_reported() {
        let request = tiny(6, 2, 1);
        let sink = FailingSink {
            fail_on: "mandel_1.jpg",
            panic: true,
            stored: Mutex::new(vec![]),
        };
        let result = FrameScheduler::new(&request, FrameNamer::new("mandel"), &sink)
            .policy(HandoffPolicy::Serial)
            .run();
        match result {
            Err(RenderError::RunFailed { failures, .. }) => {
                assert_eq!(failures.len(), 1);
                match &failures[0] {
                    RenderError::PartialExit { what, reason } => {
                        assert_eq!(what, "worker 0");
                        assert!(reason.contains("mandel_1.jpg"));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(*sink.stored.lock().unwrap(), names(3..6));
    }

    #[test]
    fn invalid_requests_fail_before_any_work() {
        let request = tiny(5, 2, 0);
        let sink = RecordingSink::default();
        let result = FrameScheduler::new(&request, FrameNamer::new("mandel"), &sink).run();
        match result {
            Err(RenderError::Configuration(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(sink.stored.lock().unwrap().is_empty());
    }
}
