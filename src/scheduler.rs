//! Cooperative frame loop: one pending frame request at a time, driven by
//! the host's redraw callback rather than a timer.

use std::time::Instant;

/// Something that can be asked for one more frame callback.
pub trait FrameHost {
    fn request_frame(&self);
}

impl FrameHost for winit::window::Window {
    fn request_frame(&self) {
        self.request_redraw();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Stopped,
    Running,
}

/// Start/stop/reschedule bookkeeping for the render loop.
///
/// The host coalesces redraw requests, so "cancelling" a frame means
/// forgetting the pending request: a callback that arrives with nothing
/// pending, or after `stop`, is rejected by `begin_frame`.
#[derive(Debug)]
pub struct FrameScheduler {
    state: LoopState,
    pending: bool,
    visible: bool,
    frames: u64,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: LoopState::Stopped,
            pending: false,
            visible: true,
            frames: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Frames accepted since construction.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Start (or restart) the loop. Any pending request is dropped before a
    /// fresh one is made, so two loops never run side by side.
    pub fn start(&mut self, host: &dyn FrameHost) {
        self.cancel();
        self.state = LoopState::Running;
        self.schedule(host);
    }

    /// Teardown: drop the pending request and refuse further frames.
    pub fn stop(&mut self) {
        self.cancel();
        self.state = LoopState::Stopped;
    }

    fn cancel(&mut self) {
        if self.pending {
            log::debug!("[Render] Cancelled pending frame");
        }
        self.pending = false;
    }

    fn schedule(&mut self, host: &dyn FrameHost) {
        if self.state != LoopState::Running || !self.visible || self.pending {
            return;
        }
        self.pending = true;
        host.request_frame();
    }

    /// Called from the host's redraw callback. Returns whether this frame
    /// should be drawn.
    pub fn begin_frame(&mut self) -> bool {
        if self.state != LoopState::Running || !self.pending {
            return false;
        }
        self.pending = false;
        self.frames += 1;
        true
    }

    /// Request the next frame from within the current one.
    pub fn end_frame(&mut self, host: &dyn FrameHost) {
        self.schedule(host);
    }

    /// Hidden windows stop asking for frames; showing resumes without backlog.
    pub fn set_visible(&mut self, visible: bool, host: &dyn FrameHost) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        if visible {
            log::debug!("[Render] Resumed");
            self.schedule(host);
        } else {
            log::debug!("[Render] Paused");
            self.cancel();
        }
    }
}

/// Wall-clock time since the loop started, plus the last frame's duration.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last: Option<f32>,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last: None,
        }
    }

    /// Returns `(elapsed, dt)` in seconds. The first tick has `dt == 0`.
    pub fn tick(&mut self) -> (f32, f32) {
        let elapsed = self.start.elapsed().as_secs_f32();
        let dt = self.last.map(|l| (elapsed - l).max(0.0)).unwrap_or(0.0);
        self.last = Some(elapsed);
        (elapsed, dt)
    }

    /// Forget the previous frame so a resume does not report one huge `dt`.
    pub fn reset_delta(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
impl FrameScheduler {
    fn is_pending(&self) -> bool {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingHost {
        requests: Cell<u32>,
    }

    impl FrameHost for CountingHost {
        fn request_frame(&self) {
            self.requests.set(self.requests.get() + 1);
        }
    }

    #[test]
    fn loop_reschedules_from_within_frame() {
        let host = CountingHost::default();
        let mut sched = FrameScheduler::new();
        sched.start(&host);
        for _ in 0..5 {
            assert!(sched.begin_frame());
            sched.end_frame(&host);
        }
        assert_eq!(host.requests.get(), 6);
        assert_eq!(sched.frames(), 5);
    }

    #[test]
    fn restart_does_not_duplicate_the_loop() {
        let host = CountingHost::default();
        let mut sched = FrameScheduler::new();
        sched.start(&host);
        sched.start(&host);
        sched.start(&host);
        // Only one frame is ever accepted per pending request.
        assert!(sched.begin_frame());
        assert!(!sched.begin_frame());
    }

    #[test]
    fn stop_cancels_pending_frame() {
        let host = CountingHost::default();
        let mut sched = FrameScheduler::new();
        sched.start(&host);
        sched.stop();
        assert!(!sched.is_pending());
        assert!(!sched.begin_frame());
        sched.end_frame(&host);
        assert_eq!(host.requests.get(), 1);
    }

    #[test]
    fn spurious_redraws_are_rejected() {
        let mut sched = FrameScheduler::new();
        assert!(!sched.begin_frame());
        let host = CountingHost::default();
        sched.start(&host);
        assert!(sched.begin_frame());
        // Host redraw without a request (e.g. expose event).
        assert!(!sched.begin_frame());
    }

    #[test]
    fn hidden_loop_pauses_and_resumes_without_backlog() {
        let host = CountingHost::default();
        let mut sched = FrameScheduler::new();
        sched.start(&host);
        assert!(sched.begin_frame());
        sched.set_visible(false, &host);
        sched.end_frame(&host);
        assert_eq!(host.requests.get(), 1);
        assert!(!sched.begin_frame());

        sched.set_visible(true, &host);
        assert_eq!(host.requests.get(), 2);
        assert!(sched.begin_frame());
    }

    #[test]
    fn clock_reports_zero_delta_first() {
        let mut clock = FrameClock::new();
        let (_, dt) = clock.tick();
        assert_eq!(dt, 0.0);
        let (elapsed, dt) = clock.tick();
        assert!(elapsed >= 0.0 && dt >= 0.0);
        clock.reset_delta();
        assert_eq!(clock.tick().1, 0.0);
    }
}
