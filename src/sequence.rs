//! Time based playback of a joint space trajectory.
//!
//! The sequence does not own a clock. The caller (a UI timer, a simulation loop) calls
//! [`Sequence::tick`] with the time elapsed since [`Sequence::start`], and the sequence
//! emits every new frame to the frame callback followed by the frame-changed observers.

use std::time::Duration;

use tracing::warn;

use crate::kinematics_error::KinematicsError;
use crate::trajectory::{joint_space_trajectory, Trajectory};

type FrameObserver = Box<dyn FnMut(usize)>;

/// Animation from a start to a stop configuration, typically moving the positioner with
/// `chain.move_to(row, &FkOptions::intermediate())` in the frame callback.
pub struct Sequence<F: FnMut(&[f64])> {
    frame: F,
    trajectory: Trajectory,
    duration: Duration,
    current_time: Duration,
    current_frame: Option<usize>,
    running: bool,
    observers: Vec<FrameObserver>,
}

impl<F: FnMut(&[f64])> Sequence<F> {
    /// Creates the animation from `start` to `stop` (both inclusive) over `steps` frames.
    /// The new sequence is at its final time, as if it already finished, and emits
    /// nothing until started.
    pub fn new(
        frame: F,
        start: &[f64],
        stop: &[f64],
        duration: Duration,
        steps: usize,
    ) -> Result<Self, KinematicsError> {
        let trajectory = joint_space_trajectory(start, stop, steps)?;
        let mut sequence = Sequence {
            frame,
            trajectory,
            duration,
            current_time: duration,
            current_frame: None,
            running: false,
            observers: Vec::new(),
        };
        sequence.current_frame = sequence.frame_at(duration);
        Ok(sequence)
    }

    /// Registers an observer called with the frame index after every frame change.
    pub fn connect_frame_changed(&mut self, observer: impl FnMut(usize) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Starts (or restarts) playback from time zero, emitting the first frame.
    pub fn start(&mut self) {
        if self.trajectory.is_empty() {
            warn!("Animation sequence started with empty trajectory");
        }
        self.running = true;
        self.current_frame = None;
        self.set_current_time(Duration::ZERO);
    }

    /// Jumps to the final frame if not yet there, and halts playback.
    pub fn stop(&mut self) {
        if self.current_time < self.duration {
            self.set_current_time(self.duration);
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advances playback to `elapsed` time since start. Playback stops once the
    /// duration is reached. Does nothing if the sequence is not running.
    pub fn tick(&mut self, elapsed: Duration) {
        if !self.running {
            return;
        }
        let elapsed = elapsed.min(self.duration);
        self.set_current_time(elapsed);
        if elapsed >= self.duration {
            self.running = false;
        }
    }

    /// Index of the frame last emitted (or the final frame of a sequence not started).
    /// None if the trajectory is empty.
    pub fn current_frame(&self) -> Option<usize> {
        self.current_frame
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Frame shown at the given time: `floor((steps - 1) * t / duration)`, clamped.
    fn frame_at(&self, time: Duration) -> Option<usize> {
        let steps = self.trajectory.steps();
        if steps == 0 {
            return None;
        }
        let last = steps - 1;
        if self.duration.is_zero() || time >= self.duration {
            return Some(last);
        }
        let fraction = time.as_secs_f64() / self.duration.as_secs_f64();
        let frame = (last as f64 * fraction).floor() as usize;
        Some(frame.min(last))
    }

    fn set_current_time(&mut self, time: Duration) {
        self.current_time = time;
        let frame = self.frame_at(time);
        if frame != self.current_frame {
            self.current_frame = frame;
            if let Some(index) = frame {
                self.animate(index);
            }
        }
    }

    fn animate(&mut self, index: usize) {
        let row = self.trajectory.row(index);
        (self.frame)(&row);
        for observer in self.observers.iter_mut() {
            observer(index);
        }
    }
}

impl<F: FnMut(&[f64])> std::fmt::Debug for Sequence<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("steps", &self.trajectory.steps())
            .field("duration", &self.duration)
            .field("current_time", &self.current_time)
            .field("current_frame", &self.current_frame)
            .field("running", &self.running)
            .finish()
    }
}
