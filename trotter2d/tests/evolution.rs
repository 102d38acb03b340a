use std::{ f64::consts::TAU, time::Duration };
use ndarray as nd;
use num_complex::Complex64 as C64;
use trotter2d::{
    error::{ CommError, ConfigError, NumericalError, TsError },
    Communicator,
    Geometry,
    Hamiltonian,
    KernelKind,
    Lattice,
    Solo,
    Solver,
    State,
    ThreadGroup,
};

fn gaussian(x0: f64, y0: f64, sigma: f64, kx: f64, ky: f64)
    -> impl Fn(f64, f64) -> C64 + Copy
{
    move |x, y| {
        let r2 = (x - x0).powi(2) + (y - y0).powi(2);
        C64::cis(kx * x + ky * y) * (-r2 / (2.0 * sigma.powi(2))).exp()
    }
}

fn harmonic(center: (f64, f64)) -> impl Fn(f64, f64) -> f64 + Copy {
    move |x, y| 0.5 * ((x - center.0).powi(2) + (y - center.1).powi(2))
}

fn max_diff(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> f64 {
    nd::Zip::from(a).and(b)
        .fold(0.0, |acc: f64, ak, bk| acc.max((ak - bk).norm()))
}

#[test]
fn plane_wave_advances_by_discrete_kinetic_phase() {
    let geometry = Geometry::square(64, 64.0, 64.0).with_periodic(true, true);
    let lattice = Lattice::single(geometry).unwrap();
    let k = TAU * 2.0 / 64.0;
    let dt = 0.01;
    for kernel in ["cpu", "parallel"] {
        let state
            = State::from_fn(&lattice, |x, _| C64::cis(k * x) / 64.0).unwrap();
        let hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
        let mut solver
            = Solver::new(&lattice, state, hamiltonian, dt, kernel, &Solo).unwrap();
        let before = solver.state().interior().to_owned();
        solver.evolve(1, false).unwrap();

        assert!((solver.norm2().unwrap() - 1.0).abs() < 1e-9);
        // dx = 1, m = 1
        let energy = 1.0 - k.cos();
        let advance = C64::cis(energy * dt);
        nd::Zip::from(&before).and(solver.state().interior())
            .for_each(|b, a| {
                let ratio = a / b * advance;
                assert!(ratio.arg().abs() < 1e-8, "phase error {}", ratio.arg());
                assert!((ratio.norm() - 1.0).abs() < 1e-7);
            });
        assert_eq!(solver.elapsed_time(), dt);
    }
}

#[test]
fn harmonic_ground_state_converges() {
    let lattice = Lattice::single(Geometry::square(32, 16.0, 16.0)).unwrap();
    let (xc, yc) = lattice.center();
    let state
        = State::from_fn(&lattice, gaussian(xc + 1.0, yc - 0.5, 1.5, 0.0, 0.0))
        .unwrap();
    let mut hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
    hamiltonian.initialize_potential(harmonic((xc, yc))).unwrap();
    let mut solver
        = Solver::new(&lattice, state, hamiltonian, 0.02, "cpu", &Solo).unwrap();

    let e0 = solver.energies().unwrap().total;
    solver.evolve(400, true).unwrap();
    let e1 = solver.energies().unwrap().total;
    solver.evolve(50, true).unwrap();
    let e2 = solver.energies().unwrap().total;

    assert!(e1 < e0);
    assert!(e2 - e1 <= 1e-9);
    assert!((e2 - e1).abs() < 1e-6);
    // discrete ground state of the trap, slightly above the continuum ħω = 1
    assert!((e2 - 0.98412).abs() < 1e-4);
    assert!((solver.norm2().unwrap() - 1.0).abs() < 1e-12);
    let (x, y) = solver.mean_position().unwrap();
    assert!((x - xc).abs() < 1e-2 && (y - yc).abs() < 1e-2);
}

#[test]
fn real_time_conserves_norm_and_energy() {
    let geometry
        = Geometry::square(24, 12.0, 12.0).with_angular_velocity(0.4);
    let lattice = Lattice::single(geometry).unwrap();
    let (xc, yc) = lattice.center();
    for kernel in ["cpu", "parallel"] {
        let state
            = State::from_fn(&lattice, gaussian(xc + 1.0, yc, 1.0, 0.0, 0.3))
            .unwrap();
        let mut hamiltonian = Hamiltonian::new(&lattice, 1.0, 5.0).unwrap();
        hamiltonian.initialize_potential(harmonic((xc, yc))).unwrap();
        let mut solver
            = Solver::new(&lattice, state, hamiltonian, 0.01, kernel, &Solo).unwrap();
        let n0 = solver.norm2().unwrap();
        let e0 = solver.energies().unwrap();
        solver.evolve(50, false).unwrap();
        let n1 = solver.norm2().unwrap();
        let e1 = solver.energies().unwrap();
        assert!((n1 - n0).abs() < 1e-12 * n0);
        assert!(e0.rotation != 0.0);
        assert!((e1.total - e0.total).abs() < 1e-4 * e0.total.abs());
    }
}

#[test]
fn imaginary_time_renormalizes() {
    let lattice = Lattice::single(Geometry::square(16, 8.0, 8.0)).unwrap();
    let (xc, yc) = lattice.center();
    let state
        = State::from_fn(&lattice, |x, y| 5.0 * gaussian(xc, yc, 1.0, 0.0, 0.0)(x, y))
        .unwrap();
    let mut hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
    hamiltonian.initialize_potential(harmonic((xc, yc))).unwrap();
    let mut solver
        = Solver::new(&lattice, state, hamiltonian, 0.05, "cpu", &Solo).unwrap()
        .with_normalization_period(3).unwrap();
    for iterations in [3, 7, 1] {
        solver.evolve(iterations, true).unwrap();
        assert!((solver.norm2().unwrap() - 1.0).abs() < 1e-12);
    }
    assert_eq!(solver.iterations(), 11);
    assert_eq!(solver.imaginary_time(), Some(true));
}

#[test]
fn zero_step_evolve_leaves_state_untouched() {
    let lattice = Lattice::single(Geometry::square(16, 8.0, 8.0)).unwrap();
    let state = State::from_fn(&lattice, gaussian(3.0, 4.0, 1.0, 0.5, 0.0)).unwrap();
    let hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
    let mut solver
        = Solver::new(&lattice, state, hamiltonian, 0.05, "cpu", &Solo).unwrap();
    let before = solver.state().tile().to_owned();
    solver.evolve(0, true).unwrap();
    solver.evolve(0, false).unwrap();
    assert_eq!(solver.state().tile(), before);
    assert_eq!(solver.iterations(), 0);
    assert_eq!(solver.elapsed_time(), 0.0);
    assert_eq!(solver.imaginary_time(), None);
}

#[test]
fn elapsed_time_accumulates_across_calls() {
    let lattice = Lattice::single(Geometry::square(16, 8.0, 8.0)).unwrap();
    let state = State::from_fn(&lattice, gaussian(4.0, 4.0, 1.0, 0.0, 0.0)).unwrap();
    let hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
    let mut solver
        = Solver::new(&lattice, state, hamiltonian, 0.25, "cpu", &Solo).unwrap();
    solver.evolve(5, false).unwrap();
    solver.evolve(3, true).unwrap();
    solver.evolve(2, false).unwrap();
    assert_eq!(solver.iterations(), 10);
    assert_eq!(solver.elapsed_time(), 2.5);
    assert_eq!(solver.state().time(), 2.5);
}

#[test]
fn kernels_agree() {
    let geometry
        = Geometry::square(20, 10.0, 10.0)
        .with_periodic(true, false)
        .with_angular_velocity(0.2);
    let lattice = Lattice::single(geometry).unwrap();
    let (xc, yc) = lattice.center();
    let run = |kernel: &str, imaginary_time: bool| {
        let state
            = State::from_fn(&lattice, gaussian(xc, yc + 1.0, 1.5, 0.7, 0.0))
            .unwrap();
        let mut hamiltonian = Hamiltonian::new(&lattice, 1.0, 3.0).unwrap();
        hamiltonian.initialize_potential(harmonic((xc, yc))).unwrap();
        let mut solver
            = Solver::new(&lattice, state, hamiltonian, 0.02, kernel, &Solo).unwrap();
        solver.evolve(20, imaginary_time).unwrap();
        solver.state().interior().to_owned()
    };
    for imaginary_time in [false, true] {
        let cpu = run("cpu", imaginary_time);
        let parallel = run("parallel", imaginary_time);
        let scale = cpu.iter().map(|z| z.norm()).fold(0.0, f64::max);
        assert!(max_diff(&cpu, &parallel) <= 1e-9 * scale);
    }
}

// Run the same real-time problem on `size` workers and gather the result.
fn partitioned_run(geometry: Geometry, size: usize, kernel: &str) -> nd::Array2<C64> {
    let center = (geometry.length_x / 2.0, geometry.length_y / 2.0);
    let init = gaussian(center.0 - 2.0, center.1 + 1.0, 2.0, 0.6, -0.4);
    let results = ThreadGroup::new(size).run(|comm| {
        let lattice = Lattice::new(geometry, comm.rank(), size).unwrap();
        let state = State::from_fn(&lattice, init).unwrap();
        let mut hamiltonian = Hamiltonian::new(&lattice, 0.8, 2.0).unwrap();
        hamiltonian.initialize_potential(harmonic(center)).unwrap();
        let mut solver
            = Solver::new(&lattice, state, hamiltonian, 0.02, kernel, &comm).unwrap();
        solver.evolve(15, false).unwrap();
        solver.gather(0, "partitioned").unwrap()
    });
    results.into_iter().next().flatten().unwrap().amplitudes
}

#[test]
fn partitioned_runs_match_a_single_worker() {
    for periodic in [false, true] {
        let geometry
            = Geometry::square(24, 16.0, 16.0)
            .with_periodic(periodic, periodic)
            .with_angular_velocity(0.3);
        let reference = partitioned_run(geometry, 1, "cpu");
        for (size, kernel) in [(2, "cpu"), (3, "parallel"), (4, "cpu"), (6, "cpu")] {
            let psi = partitioned_run(geometry, size, kernel);
            assert!(
                max_diff(&reference, &psi) < 1e-12,
                "size {size}, periodic {periodic}"
            );
        }
    }
}

#[test]
fn kernel_selection_is_validated() {
    let lattice = Lattice::single(Geometry::square(16, 8.0, 8.0)).unwrap();
    let make = |kernel: &str| {
        let state = State::from_fn(&lattice, gaussian(4.0, 4.0, 1.0, 0.0, 0.0)).unwrap();
        let hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
        Solver::new(&lattice, state, hamiltonian, 0.05, kernel, &Solo)
    };
    assert!(matches!(
        make("fpga").err(),
        Some(TsError::Config(ConfigError::UnknownKernel(_)))
    ));
    assert!(matches!(
        make("GPU").err(),
        Some(TsError::Config(ConfigError::KernelUnavailable(_)))
    ));

    let mut solver = make("cpu").unwrap();
    solver.set_kernel("parallel").unwrap();
    assert_eq!(solver.kernel_kind(), KernelKind::Parallel);
    solver.evolve(2, false).unwrap();
    solver.set_kernel("parallel").unwrap();
    let err = solver.set_kernel("cpu").unwrap_err();
    assert!(matches!(
        err,
        TsError::Config(ConfigError::KernelSwitch { from: "parallel", to: "cpu", iterations: 2 })
    ));
    assert_eq!(solver.kernel_name(), "parallel");
}

#[test]
fn solver_setup_is_validated() {
    let geometry = Geometry::square(16, 8.0, 8.0);
    let lattice = Lattice::single(geometry).unwrap();
    let other = Lattice::single(geometry).unwrap();
    let state = || State::from_fn(&lattice, gaussian(4.0, 4.0, 1.0, 0.0, 0.0)).unwrap();
    let hamiltonian = || Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();

    let err = Solver::new(&other, state(), hamiltonian(), 0.05, "cpu", &Solo).err();
    assert!(matches!(err, Some(TsError::Config(ConfigError::LatticeMismatch("state")))));

    let foreign = Hamiltonian::new(&other, 1.0, 0.0).unwrap();
    let err = Solver::new(&lattice, state(), foreign, 0.05, "cpu", &Solo).err();
    assert!(matches!(
        err,
        Some(TsError::Config(ConfigError::LatticeMismatch("hamiltonian")))
    ));

    let err = Solver::new(&lattice, state(), hamiltonian(), 0.0, "cpu", &Solo).err();
    assert!(matches!(err, Some(TsError::Config(ConfigError::BadTimeStep(_)))));

    let err
        = Solver::new(&lattice, state(), hamiltonian(), 0.05, "cpu", &Solo).unwrap()
        .with_normalization_period(0).err();
    assert!(matches!(err, Some(TsError::Config(ConfigError::BadNormalizationPeriod))));

    assert!(matches!(
        Hamiltonian::new(&lattice, 0.0, 0.0).err(),
        Some(TsError::Config(ConfigError::BadMass(_)))
    ));

    let quarter = Lattice::new(geometry, 0, 4).unwrap();
    let quarter_state = State::new(&quarter);
    let quarter_ham = Hamiltonian::new(&quarter, 1.0, 0.0).unwrap();
    let err = Solver::new(&quarter, quarter_state, quarter_ham, 0.05, "cpu", &Solo).err();
    assert!(matches!(err, Some(TsError::Config(ConfigError::GroupMismatch { .. }))));
}

#[test]
fn divergence_is_a_numerical_error() {
    let lattice = Lattice::single(Geometry::square(16, 8.0, 8.0)).unwrap();
    let state = State::from_fn(&lattice, gaussian(4.0, 4.0, 1.0, 0.0, 0.0)).unwrap();
    let mut hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
    hamiltonian.constant_potential(-1e5).unwrap();
    let mut solver
        = Solver::new(&lattice, state, hamiltonian, 0.1, "cpu", &Solo).unwrap();
    let err = solver.evolve(5, true).unwrap_err();
    assert!(matches!(
        err,
        TsError::Numerical(NumericalError::NonFinite { rank: 0, iteration: 1, .. })
    ));
}

#[test]
fn failure_on_one_worker_fails_every_worker() {
    let geometry = Geometry::square(32, 16.0, 16.0);
    let outcomes
        = ThreadGroup::new(4).with_timeout(Duration::from_secs(10))
        .run(|comm| {
            let lattice = Lattice::new(geometry, comm.rank(), 4).unwrap();
            let state
                = State::from_fn(&lattice, gaussian(8.0, 8.0, 3.0, 0.0, 0.0)).unwrap();
            let mut hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
            // a deep well only inside rank 0's block
            hamiltonian.initialize_potential(|x, y| {
                if x < 4.0 && y < 4.0 { -1e5 } else { 0.0 }
            }).unwrap();
            let mut solver
                = Solver::new(&lattice, state, hamiltonian, 0.1, "cpu", &comm)
                .unwrap();
            solver.evolve(10, true)
        });
    assert!(matches!(
        outcomes[0],
        Err(TsError::Numerical(NumericalError::NonFinite { rank: 0, .. }))
    ));
    // the well stays inside rank 0's tile for the first step, so every other
    // worker learns of the failure from rank 0's abort
    for outcome in outcomes.iter().skip(1) {
        assert!(
            matches!(outcome, Err(TsError::Comm(CommError::Aborted { origin: 0, .. }))),
            "{outcome:?}"
        );
    }
}

#[test]
fn plane_wave_snapshot_has_mean_momentum_k() {
    let geometry = Geometry::square(32, 32.0, 16.0).with_periodic(true, true);
    let lattice = Lattice::single(geometry).unwrap();
    let kx = TAU * 3.0 / 32.0;
    let ky = -TAU * 1.0 / 16.0;
    let state
        = State::from_fn(&lattice, |x, y| C64::cis(kx * x + ky * y)).unwrap();
    let hamiltonian = Hamiltonian::new(&lattice, 1.0, 0.0).unwrap();
    let mut solver
        = Solver::new(&lattice, state, hamiltonian, 0.05, "cpu", &Solo).unwrap();

    let (mx, my) = solver.gather(0, "initial").unwrap().unwrap().mean_momentum();
    assert!((mx - kx).abs() < 1e-10);
    assert!((my - ky).abs() < 1e-10);

    solver.evolve(4, false).unwrap();
    let snapshot = solver.gather(0, "plane").unwrap().unwrap();
    assert_eq!(snapshot.label, "plane");
    assert_eq!((snapshot.rows(), snapshot.cols()), (32, 32));
    assert_eq!(snapshot.iterations, 4);
    assert_eq!(snapshot.elapsed_time, 0.2);
    assert_eq!(snapshot.dy, 0.5);
    // the even/odd bond splitting leaks O(dt²) weight into the staggered
    // mode at k + π/d, so the mean drifts by the splitting error
    let (mx, my) = snapshot.mean_momentum();
    assert!((mx - kx).abs() < 2e-5);
    assert!((my - ky).abs() < 2e-5);
    let norm2 = solver.norm2().unwrap();
    assert!((snapshot.norm2() - norm2).abs() < 1e-9 * norm2);
}
