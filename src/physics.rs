use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Velocity damping applied per integration step while the tether is engaged.
const TETHER_DAMPING: f64 = 0.95;

/// One per-second snapshot of the simulated body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhysicsSample {
    pub time: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
}

/// Lazy, finite, restartable zero-gravity integration.
///
/// Demonstration collaborator only: it consumes the engagement state it was
/// built with and feeds no safety decision. The body starts at the origin
/// with a random velocity in [-1, 1] per axis; while engaged, the tether
/// damps velocity each step, keeping the drift bounded. Iteration yields one
/// snapshot per whole second of simulated time and ends at `duration`.
#[derive(Debug, Clone)]
pub struct ZeroGravitySimulation {
    engaged: bool,
    duration: f64,
    time_step: f64,
    initial_velocity: [f64; 3],
    step: usize,
    position: [f64; 3],
    velocity: [f64; 3],
}

impl ZeroGravitySimulation {
    pub fn new(engaged: bool, duration: f64, time_step: f64) -> Self {
        Self::with_rng(engaged, duration, time_step, &mut rand::rng())
    }

    /// Deterministic variant for tests.
    pub fn seeded(engaged: bool, duration: f64, time_step: f64, seed: u64) -> Self {
        Self::with_rng(engaged, duration, time_step, &mut StdRng::seed_from_u64(seed))
    }

    fn with_rng<R: Rng>(engaged: bool, duration: f64, time_step: f64, rng: &mut R) -> Self {
        let initial_velocity = [
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        ];
        Self {
            engaged,
            duration: duration.max(0.0),
            time_step: time_step.max(f64::EPSILON),
            initial_velocity,
            step: 0,
            position: [0.0; 3],
            velocity: initial_velocity,
        }
    }

    /// Rewind to the initial conditions so the sequence can be replayed.
    pub fn restart(&mut self) {
        self.step = 0;
        self.position = [0.0; 3];
        self.velocity = self.initial_velocity;
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    fn is_whole_second(time: f64) -> bool {
        let frac = time.fract();
        frac < 1e-6 || frac > 1.0 - 1e-6
    }
}

impl Iterator for ZeroGravitySimulation {
    type Item = PhysicsSample;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let time = self.step as f64 * self.time_step;
            if time >= self.duration {
                return None;
            }
            if self.engaged {
                for axis in &mut self.velocity {
                    *axis *= TETHER_DAMPING;
                }
            }
            for (position, velocity) in self.position.iter_mut().zip(self.velocity) {
                *position += velocity * self.time_step;
            }
            self.step += 1;

            if Self::is_whole_second(time) {
                return Some(PhysicsSample {
                    time,
                    position: self.position,
                    velocity: self.velocity,
                });
            }
        }
    }
}

fn speed(velocity: [f64; 3]) -> f64 {
    velocity.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Peak speed over the whole run, for quick stability summaries.
pub fn max_speed(simulation: ZeroGravitySimulation) -> f64 {
    simulation.map(|sample| speed(sample.velocity)).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_one_snapshot_per_whole_second() {
        let samples: Vec<_> = ZeroGravitySimulation::seeded(true, 3.0, 0.1, 7).collect();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].time, 0.0);
        assert!((samples[1].time - 1.0).abs() < 1e-9);
        assert!((samples[2].time - 2.0).abs() < 1e-9);
    }

    #[test]
    fn engaged_tether_damps_velocity() {
        let engaged = ZeroGravitySimulation::seeded(true, 10.0, 0.1, 7);
        let free = ZeroGravitySimulation::seeded(false, 10.0, 0.1, 7);

        let last_engaged = engaged.last().unwrap();
        let last_free = free.last().unwrap();
        assert!(speed(last_engaged.velocity) < speed(last_free.velocity));
        // 90 damping steps from the same |v| <= sqrt(3) start: essentially at rest
        assert!(speed(last_engaged.velocity) < 0.05);
    }

    #[test]
    fn free_drift_keeps_its_velocity() {
        let mut simulation = ZeroGravitySimulation::seeded(false, 5.0, 0.1, 7);
        let initial = simulation.next().unwrap().velocity;
        let last = simulation.last().unwrap().velocity;
        assert_eq!(initial, last);
    }

    #[test]
    fn restart_replays_the_same_sequence() {
        let mut simulation = ZeroGravitySimulation::seeded(true, 4.0, 0.1, 21);
        let first_run: Vec<_> = simulation.by_ref().collect();
        assert!(simulation.next().is_none());

        simulation.restart();
        let second_run: Vec<_> = simulation.collect();
        assert_eq!(first_run, second_run);
    }

    #[test]
    fn max_speed_is_lower_under_tether() {
        let tethered = max_speed(ZeroGravitySimulation::seeded(true, 10.0, 0.1, 7));
        let free = max_speed(ZeroGravitySimulation::seeded(false, 10.0, 0.1, 7));
        assert!(tethered > 0.0);
        assert!(tethered < free);
    }

    #[test]
    fn zero_duration_yields_nothing() {
        let mut simulation = ZeroGravitySimulation::seeded(true, 0.0, 0.1, 3);
        assert!(simulation.next().is_none());
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let a: Vec<_> = ZeroGravitySimulation::seeded(true, 3.0, 0.1, 99).collect();
        let b: Vec<_> = ZeroGravitySimulation::seeded(true, 3.0, 0.1, 99).collect();
        assert_eq!(a, b);
    }
}
