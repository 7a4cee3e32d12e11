//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner` which owns a [`Simulation`] on
//! a background thread. Control calls (start, pause, resume, stop) flip a
//! shared state; parameter and bounds edits are queued as commands and
//! applied between frames. After every frame the thread copies the position
//! snapshot into shared state for readers such as a renderer.

use pbf_kernel::{Aabb, AnimationType, Simulation, SimulationParameters};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Runner state enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Simulation paused
    Paused,
    /// Simulation finished (stopped or reached max_frames)
    Finished,
    /// Simulation encountered an error
    Error,
}

/// Edits applied by the simulation thread between frames.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerCommand {
    /// Replace solver constants
    SetParameters(SimulationParameters),
    /// Replace the current domain
    SetBounds(Aabb),
    /// Restore the original domain
    ResetBounds,
    /// Turn domain animation on or off
    AnimateBounds(bool),
    /// Animate the min-X face as well
    AnimateBothSides(bool),
    /// Select the animation shape
    SetAnimationType(AnimationType),
    /// Set the animation period
    SetAnimationPeriod(f32),
    /// Set the animation amplitude
    SetAnimationAmplitude(f32),
    /// Return the simulation to its construction-time state
    Reset,
}

/// Shared state between the runner thread and control interface
struct SharedState {
    /// Current runner state
    state: RunnerState,
    /// Number of frames executed
    frame_count: u64,
    /// Positions after the last frame
    positions: Vec<[f32; 3]>,
    /// Most recent error message (if state is Error)
    error_message: Option<String>,
}

type Shared = Arc<Mutex<SharedState>>;

/// A poisoned lock only means a reader panicked; the state is still usable.
fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    /// Shared state (protected by mutex)
    shared: Shared,
    /// Queue of edits for the simulation thread
    commands: Sender<RunnerCommand>,
    /// Handle to the background thread
    thread_handle: Option<thread::JoinHandle<Simulation>>,
}

impl SimulationRunner {
    /// Create a new simulation runner
    ///
    /// # Arguments
    /// * `simulation` - The simulation to run, moved to the background thread
    /// * `max_frames` - Optional number of frames after which the runner finishes
    pub fn new(simulation: Simulation, max_frames: Option<u64>) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            state: RunnerState::Created,
            frame_count: simulation.frame_number(),
            positions: simulation.positions().to_vec(),
            error_message: None,
        }));
        let (commands, inbox) = mpsc::channel();

        let shared_clone = Arc::clone(&shared);

        // Spawn background thread
        let thread_handle = thread::spawn(move || {
            let mut simulation = simulation;
            run_simulation_loop(&mut simulation, &shared_clone, &inbox, max_frames);
            simulation
        });

        Self {
            shared,
            commands,
            thread_handle: Some(thread_handle),
        }
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        lock(&self.shared).state.clone()
    }

    /// Get number of frames executed
    pub fn frame_count(&self) -> u64 {
        lock(&self.shared).frame_count
    }

    /// Get error message if state is Error
    pub fn error_message(&self) -> Option<String> {
        lock(&self.shared).error_message.clone()
    }

    /// Copy of the positions after the most recent frame
    pub fn latest_positions(&self) -> Vec<[f32; 3]> {
        lock(&self.shared).positions.clone()
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Created {
            state.state = RunnerState::Running;
            tracing::info!("Runner started");
        }
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Running {
            state.state = RunnerState::Paused;
            tracing::info!("Runner paused at frame {}", state.frame_count);
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Paused {
            state.state = RunnerState::Running;
            tracing::info!("Runner resumed");
        }
    }

    /// Stop the simulation; the thread exits after the current frame
    pub fn stop(&self) {
        let mut state = lock(&self.shared);
        if matches!(state.state, RunnerState::Created | RunnerState::Running | RunnerState::Paused) {
            state.state = RunnerState::Finished;
            tracing::info!("Runner stopped at frame {}", state.frame_count);
        }
    }

    /// Queue an edit for the next frame boundary
    pub fn send(&self, command: RunnerCommand) -> Result<(), String> {
        self.commands
            .send(command)
            .map_err(|_| "Simulation thread has exited".to_string())
    }

    /// Validate and queue new solver constants
    pub fn set_parameters(&self, params: SimulationParameters) -> Result<(), String> {
        params.validate().map_err(|e| e.to_string())?;
        self.send(RunnerCommand::SetParameters(params))
    }

    /// Validate and queue a new current domain
    pub fn set_bounds(&self, domain: Aabb) -> Result<(), String> {
        domain.validate().map_err(|e| e.to_string())?;
        self.send(RunnerCommand::SetBounds(domain))
    }

    /// Queue a bounds reset
    pub fn reset_bounds(&self) -> Result<(), String> {
        self.send(RunnerCommand::ResetBounds)
    }

    /// Turn domain animation on
    pub fn enable_bounds_animation(&self) -> Result<(), String> {
        self.send(RunnerCommand::AnimateBounds(true))
    }

    /// Turn domain animation off
    pub fn disable_bounds_animation(&self) -> Result<(), String> {
        self.send(RunnerCommand::AnimateBounds(false))
    }

    /// Animate both X faces
    pub fn enable_both_sides_animation(&self) -> Result<(), String> {
        self.send(RunnerCommand::AnimateBothSides(true))
    }

    /// Animate the max-X face only
    pub fn disable_both_sides_animation(&self) -> Result<(), String> {
        self.send(RunnerCommand::AnimateBothSides(false))
    }

    /// Queue an animation shape change
    pub fn set_animation_type(&self, kind: AnimationType) -> Result<(), String> {
        self.send(RunnerCommand::SetAnimationType(kind))
    }

    /// Queue an animation period change
    pub fn set_animation_period(&self, period: f32) -> Result<(), String> {
        if !(period.is_finite() && period > 0.0) {
            return Err(format!("Animation period must be positive, got {}", period));
        }
        self.send(RunnerCommand::SetAnimationPeriod(period))
    }

    /// Queue an animation amplitude change
    pub fn set_animation_amplitude(&self, amplitude: f32) -> Result<(), String> {
        if !(amplitude.is_finite() && amplitude >= 0.0) {
            return Err(format!("Animation amplitude must be non-negative, got {}", amplitude));
        }
        self.send(RunnerCommand::SetAnimationAmplitude(amplitude))
    }

    /// Queue a full simulation reset
    pub fn reset(&self) -> Result<(), String> {
        self.send(RunnerCommand::Reset)
    }

    /// Wait for the simulation thread to complete and take the simulation back
    pub fn join(mut self) -> Result<Simulation, String> {
        let handle = self
            .thread_handle
            .take()
            .ok_or_else(|| "Simulation thread already joined".to_string())?;
        handle.join().map_err(|_| "Thread panicked".to_string())
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Set state to Finished to signal thread to exit
        let mut state = lock(&self.shared);
        if matches!(state.state, RunnerState::Created | RunnerState::Running | RunnerState::Paused) {
            state.state = RunnerState::Finished;
        }
    }
}

/// Apply one queued edit. Returns an error message for edits the simulation
/// rejects.
fn apply_command(sim: &mut Simulation, command: RunnerCommand) -> Result<(), String> {
    match command {
        RunnerCommand::SetParameters(params) => sim.set_parameters(params).map_err(|e| e.to_string()),
        RunnerCommand::SetBounds(domain) => sim.set_bounds(domain).map_err(|e| e.to_string()),
        RunnerCommand::ResetBounds => {
            sim.reset_bounds();
            Ok(())
        }
        RunnerCommand::AnimateBounds(on) => {
            if on {
                sim.enable_bounds_animation();
            } else {
                sim.disable_bounds_animation();
            }
            Ok(())
        }
        RunnerCommand::AnimateBothSides(on) => {
            if on {
                sim.enable_both_sides_animation();
            } else {
                sim.disable_both_sides_animation();
            }
            Ok(())
        }
        RunnerCommand::SetAnimationType(kind) => {
            sim.set_animation_type(kind);
            Ok(())
        }
        RunnerCommand::SetAnimationPeriod(period) => sim.set_animation_period(period).map_err(|e| e.to_string()),
        RunnerCommand::SetAnimationAmplitude(amplitude) => {
            sim.set_animation_amplitude(amplitude).map_err(|e| e.to_string())
        }
        RunnerCommand::Reset => {
            sim.reset();
            Ok(())
        }
    }
}

/// Drain the command queue. Returns true if anything was applied.
fn drain_commands(sim: &mut Simulation, inbox: &Receiver<RunnerCommand>) -> bool {
    let mut applied = false;
    while let Ok(command) = inbox.try_recv() {
        tracing::debug!("Applying {:?}", command);
        if let Err(e) = apply_command(sim, command) {
            tracing::warn!("Runner command rejected: {}", e);
        }
        applied = true;
    }
    applied
}

fn publish(sim: &Simulation, shared: &Mutex<SharedState>) {
    let mut guard = lock(shared);
    guard.frame_count = sim.frame_number();
    guard.positions.clear();
    guard.positions.extend_from_slice(sim.positions());
}

/// Main simulation loop executed in background thread
fn run_simulation_loop(
    sim: &mut Simulation,
    shared: &Mutex<SharedState>,
    inbox: &Receiver<RunnerCommand>,
    max_frames: Option<u64>,
) {
    let start_wall_time = Instant::now();

    loop {
        // Edits land between frames regardless of state
        if drain_commands(sim, inbox) {
            publish(sim, shared);
        }

        // Check state
        let current_state = lock(shared).state.clone();

        match current_state {
            RunnerState::Created => {
                // Wait a bit and check again
                thread::sleep(Duration::from_millis(10));
            }
            RunnerState::Paused => {
                // Wait while paused
                thread::sleep(Duration::from_millis(20));
            }
            RunnerState::Finished | RunnerState::Error => {
                // Exit loop
                break;
            }
            RunnerState::Running => {
                sim.step();
                let frame = sim.frame_number();

                if let Some(fault) = sim.fault() {
                    let message = format!("Backend failed after frame {}: {}", frame, fault);
                    tracing::error!("{}", message);
                    let mut guard = lock(shared);
                    guard.state = RunnerState::Error;
                    guard.error_message = Some(message);
                    break;
                }

                if let Some(bad) = sim.positions().iter().position(|p| p.iter().any(|v| !v.is_finite())) {
                    let message = format!("Non-finite position for particle {} at frame {}", bad, frame);
                    tracing::error!("{}", message);
                    let mut guard = lock(shared);
                    guard.state = RunnerState::Error;
                    guard.error_message = Some(message);
                    break;
                }

                publish(sim, shared);

                // Check stopping conditions
                if let Some(max) = max_frames {
                    if frame >= max {
                        tracing::info!("Simulation finished: reached max_frames = {}", max);
                        let mut guard = lock(shared);
                        if guard.state == RunnerState::Running {
                            guard.state = RunnerState::Finished;
                        }
                        break;
                    }
                }

                // Log progress periodically
                if frame % 100 == 0 {
                    tracing::debug!(
                        "Frame {}: wall_time={:.2}s",
                        frame,
                        start_wall_time.elapsed().as_secs_f64()
                    );
                }
            }
        }
    }

    tracing::info!(
        "Simulation thread exiting: {} frames in {:.2}s",
        sim.frame_number(),
        start_wall_time.elapsed().as_secs_f64()
    );
}
