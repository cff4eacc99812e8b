use std::time::{Duration, Instant};

use crate::types::HandRole;

pub const MIN_CAPTURE: Duration = Duration::from_millis(300);
pub const DEFAULT_CAPTURE: Duration = Duration::from_secs(2);
pub const DEFAULT_RATE_HZ: u32 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureStep {
    /// Session elapsed; drop it.
    Finished,
    Wait,
    Sample,
}

/// Timed sampling window for one (role, label), paced by wall-clock rather than frame rate.
#[derive(Clone, Debug)]
pub struct CaptureSession {
    pub role: HandRole,
    pub label: String,
    until: Instant,
    interval: Duration,
    next: Option<Instant>,
    collected: usize,
}

impl CaptureSession {
    pub fn new(now: Instant, role: HandRole, label: &str, duration: Duration, rate_hz: u32) -> Self {
        let rate = rate_hz.max(1);
        Self {
            role,
            label: label.to_string(),
            until: now + duration.max(MIN_CAPTURE),
            interval: Duration::from_secs(1) / rate,
            next: None,
            collected: 0,
        }
    }

    pub fn collected(&self) -> usize {
        self.collected
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.until.saturating_duration_since(now)
    }

    pub fn step(&mut self, now: Instant) -> CaptureStep {
        if now >= self.until {
            return CaptureStep::Finished;
        }
        let deadline = *self.next.get_or_insert(now);
        if now < deadline {
            return CaptureStep::Wait;
        }
        let mut next = deadline + self.interval;
        if next <= now {
            // Stalled for more than one interval; resume pacing from now.
            next = now + self.interval;
        }
        self.next = Some(next);
        CaptureStep::Sample
    }

    pub fn record_sample(&mut self) {
        self.collected += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_at_rate_not_frame_rate() {
        let t0 = Instant::now();
        let mut session = CaptureSession::new(t0, HandRole::Primary, "FIST", Duration::from_secs(1), 10);
        let mut samples = 0;
        // 100 fps for 1 second.
        for ms in (0..1000).step_by(10) {
            if session.step(t0 + Duration::from_millis(ms)) == CaptureStep::Sample {
                samples += 1;
            }
        }
        assert_eq!(samples, 10);
        assert_eq!(session.step(t0 + Duration::from_millis(1000)), CaptureStep::Finished);
    }

    #[test]
    fn duration_has_a_floor() {
        let t0 = Instant::now();
        let session = CaptureSession::new(t0, HandRole::Secondary, "FIST", Duration::ZERO, 0);
        assert_eq!(session.remaining(t0), MIN_CAPTURE);
    }
}
