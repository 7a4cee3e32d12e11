//! Count conservation and containment across steps, animation and bounds edits.

use pbf_kernel::{Aabb, AnimationType, Simulation, SimulationParameters, DEFAULT_DT};

const TOLERANCE: f32 = 1e-4;

fn assert_contained(sim: &Simulation) {
    let domain = sim.bounds();
    let r = sim.parameters().particle_radius;
    for (i, p) in sim.positions().iter().enumerate() {
        for axis in 0..3 {
            let (lo, hi) = domain.inset_limits(axis, r);
            assert!(
                p[axis] >= lo - TOLERANCE && p[axis] <= hi + TOLERANCE,
                "particle {i} at {p:?} outside {domain:?} on axis {axis} (frame {})",
                sim.frame_number()
            );
        }
    }
}

fn tank(count: usize) -> Simulation {
    let domain = Aabb::new([0.0; 3], [6.0, 4.0, 3.0]);
    Simulation::new(domain, count, SimulationParameters::default(), DEFAULT_DT, None).unwrap()
}

#[test]
fn count_is_conserved_and_particles_stay_inside() {
    let mut sim = tank(1200);
    for _ in 0..60 {
        sim.step();
        assert_eq!(sim.positions().len(), 1200);
        assert_eq!(sim.particles().len(), 1200);
        assert_eq!(sim.densities().len(), 1200);
        assert_contained(&sim);
    }
    assert_eq!(sim.frame_number(), 60);
}

#[test]
fn positions_stay_finite() {
    let mut sim = tank(800);
    for _ in 0..40 {
        sim.step();
    }
    assert!(sim.positions().iter().flatten().all(|v| v.is_finite()));
    assert!(sim.densities().iter().all(|d| d.is_finite() && *d > 0.0));
}

#[test]
fn sine_wave_animation_keeps_particles_inside() {
    let mut sim = tank(1000);
    sim.set_animation_amplitude(2.0).unwrap();
    sim.set_animation_period(4.0).unwrap();
    sim.enable_both_sides_animation();
    sim.enable_bounds_animation();
    let original = sim.original_bounds();
    let mut moved = false;
    for _ in 0..90 {
        sim.step();
        moved |= sim.bounds() != original;
        assert_contained(&sim);
    }
    assert!(moved, "animation never moved the domain");
    assert_eq!(sim.original_bounds(), original);
}

#[test]
fn compress_animation_keeps_particles_inside() {
    let mut sim = tank(1000);
    sim.set_animation_type(AnimationType::Compress);
    sim.enable_bounds_animation();
    for _ in 0..30 {
        sim.step();
        assert_contained(&sim);
    }
    assert!(sim.bounds().max[0] < sim.original_bounds().max[0]);
}

#[test]
fn shrinking_bounds_pulls_particles_in_immediately() {
    let mut sim = tank(600);
    for _ in 0..5 {
        sim.step();
    }
    let smaller = Aabb::new([1.0, 0.0, 0.5], [4.0, 3.0, 2.5]);
    sim.set_bounds(smaller).unwrap();
    assert_eq!(sim.bounds(), smaller);
    assert_contained(&sim);

    sim.step();
    assert_contained(&sim);

    sim.reset_bounds();
    assert_eq!(sim.bounds(), sim.original_bounds());
}

#[test]
fn invalid_bounds_are_rejected_without_side_effects() {
    let mut sim = tank(100);
    let before = sim.bounds();
    assert!(sim.set_bounds(Aabb::new([2.0; 3], [1.0; 3])).is_err());
    assert_eq!(sim.bounds(), before);
}

#[test]
fn one_sided_wave_after_set_bounds_keeps_a_positive_width() {
    let domain = Aabb::new([0.0; 3], [10.0; 3]);
    let mut sim = Simulation::new(domain, 500, SimulationParameters::default(), DEFAULT_DT, None).unwrap();
    sim.set_bounds(Aabb::new([6.0, 0.0, 0.0], [10.0, 10.0, 10.0])).unwrap();
    sim.enable_bounds_animation();

    // 10 * (1 - 0.66) of the original width survives beyond the moved min face
    let min_width = 3.4 - TOLERANCE;
    for kind in [AnimationType::SineWave, AnimationType::LinearRamp] {
        sim.set_animation_type(kind);
        for _ in 0..200 {
            sim.step();
            let b = sim.bounds();
            assert!(b.validate().is_ok(), "{kind:?} collapsed the domain to {b:?}");
            assert!(b.width() >= min_width, "{kind:?} width {} at frame {}", b.width(), sim.frame_number());
            assert_contained(&sim);
        }
    }
}
