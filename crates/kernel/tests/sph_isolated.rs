//! SPH step: closed-form behaviour of an isolated particle, and basic sanity
//! of a small particle block.

use simkernels::sph::poly6;
use simkernels::{KernelError, ParticleSystem, SphFields, SphParams, SphProvider};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1.0e-12 * (1.0 + a.abs().max(b.abs()))
}

#[test]
fn isolated_particle_falls_freely() {
    let sph = SphProvider::cpu();
    let params = SphParams {
        dt: 0.01,
        mass: 0.5,
        smoothing_radius: 0.2,
        gravity: [0.0, -9.81, 0.0],
        ..SphParams::default()
    };

    let x0 = [0.1, 2.0, -0.3];
    let v0 = [0.4, 0.0, 0.2];
    let mut ps = ParticleSystem::new();
    ps.push_particle(x0, v0, params.mass);

    let steps = 25;
    for _ in 0..steps {
        let mut fields = ps.sph_fields().unwrap();
        sph.step(&mut fields, &params).unwrap();
    }

    let expected_density = params.mass * poly6(0.0, params.smoothing_radius);
    assert!(close(ps.densities[0], expected_density));
    assert!(close(
        ps.pressures[0],
        params.stiffness * (expected_density - params.rest_density)
    ));

    let k = steps as f64;
    let dt = params.dt;
    for axis in 0..3 {
        let g = params.gravity[axis];
        let v = v0[axis] + k * dt * g;
        let x = x0[axis] + k * dt * v0[axis] + dt * dt * g * k * (k + 1.0) / 2.0;
        assert!(close(ps.velocity(0)[axis], v), "axis {axis} velocity");
        assert!(close(ps.position(0)[axis], x), "axis {axis} position");
        assert!(close(ps.forces[axis], expected_density * g), "axis {axis} force");
    }
}

#[test]
fn distant_particles_do_not_interact() {
    let sph = SphProvider::cpu();
    let params = SphParams {
        smoothing_radius: 0.1,
        gravity: [0.0; 3],
        ..SphParams::default()
    };
    let mut ps = ParticleSystem::new();
    ps.push_particle([0.0; 3], [0.0; 3], params.mass);
    ps.push_particle([1.0, 0.0, 0.0], [0.0; 3], params.mass);

    let mut fields = ps.sph_fields().unwrap();
    sph.step(&mut fields, &params).unwrap();

    assert_eq!(ps.forces, vec![0.0; 6]);
    assert_eq!(ps.velocities, vec![0.0; 6]);
    assert!(close(ps.densities[0], params.mass * poly6(0.0, 0.1)));
}

#[test]
fn block_conserves_momentum_without_gravity() {
    let sph = SphProvider::cpu();
    let spacing = 0.02;
    let params = SphParams {
        dt: 1.0e-4,
        smoothing_radius: 2.0 * spacing,
        gravity: [0.0; 3],
        ..SphParams::default()
    };

    let mut ps = ParticleSystem::new();
    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                let pos = [i as f64 * spacing, j as f64 * spacing, k as f64 * spacing];
                ps.push_particle(pos, [0.0; 3], params.mass);
            }
        }
    }

    for _ in 0..5 {
        let mut fields = ps.sph_fields().unwrap();
        sph.step(&mut fields, &params).unwrap();
    }

    assert!(ps.positions.iter().all(|x| x.is_finite()));
    assert!(ps.densities.iter().all(|rho| *rho > 0.0));
    // Corner and centre particles see different neighbourhoods.
    assert!(ps.densities[0] < ps.densities[21]);
}

#[test]
fn step_rejects_bad_input_before_writing() {
    let sph = SphProvider::cpu();
    let mut x = vec![0.0; 6];
    let mut v = vec![0.0; 6];
    let mut rho = vec![7.0; 2];
    let mut p = vec![0.0; 1];
    let mut f = vec![0.0; 6];
    let mut fields = SphFields {
        positions: &mut x,
        velocities: &mut v,
        densities: &mut rho,
        pressures: &mut p,
        forces: &mut f,
    };
    let result = sph.step(&mut fields, &SphParams::default());
    assert!(matches!(
        result,
        Err(KernelError::LengthMismatch { buffer: "pressures", .. })
    ));
    assert_eq!(rho, vec![7.0; 2]);

    let mut ps = ParticleSystem::new();
    ps.push_particle([0.0; 3], [0.0; 3], 1.0);
    let bad = SphParams {
        smoothing_radius: -1.0,
        ..SphParams::default()
    };
    let mut fields = ps.sph_fields().unwrap();
    assert!(sph.step(&mut fields, &bad).is_err());
}
