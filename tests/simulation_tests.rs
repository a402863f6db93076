
use autocall_lib::{
    simulate_paths, DayCount, Error, HestonParameters, SimulationConfig, SimulationGrid,
    VarianceScheme,
};
use test_utils::{five_year_schedule, flat_curves, valuation_date, SPOT};

fn grid() -> SimulationGrid {
    SimulationGrid::for_schedule(valuation_date(), &five_year_schedule(), DayCount::Actual360)
        .unwrap()
}

/// Feller-violating parameters similar to a fit on a flat 35% surface.
fn params() -> HestonParameters {
    HestonParameters::new(0.127, 0.8, 0.13, 0.9, -0.7).unwrap()
}

#[test]
fn test_paths_are_aligned_with_schedule() {
    let (curve, dividends) = flat_curves();
    let grid = grid();
    assert_eq!(grid.len(), 11);

    let paths = simulate_paths(
        &grid,
        &params(),
        SPOT,
        &curve,
        &dividends,
        64,
        &SimulationConfig::default(),
    )
    .unwrap();

    assert_eq!(paths.len(), 64);
    for (i, path) in paths.iter().enumerate() {
        assert_eq!(path.index, i);
        assert_eq!(path.levels.len(), grid.len());
        assert_eq!(path.levels[0], SPOT);
        assert!(path.anomaly.is_none());
        assert!(path.levels.iter().all(|l| l.is_finite() && *l > 0.0));
    }
}

#[test]
fn test_same_seed_same_paths_different_seed_different_paths() {
    let (curve, dividends) = flat_curves();
    let grid = grid();
    let config = SimulationConfig::default();

    let a = simulate_paths(&grid, &params(), SPOT, &curve, &dividends, 100, &config).unwrap();
    let b = simulate_paths(&grid, &params(), SPOT, &curve, &dividends, 100, &config).unwrap();
    assert_eq!(a, b);

    let reseeded = SimulationConfig {
        seed: config.seed + 1,
        ..config
    };
    let c = simulate_paths(&grid, &params(), SPOT, &curve, &dividends, 100, &reseeded).unwrap();
    assert_ne!(a[0].levels, c[0].levels);
}

#[test]
fn test_path_depends_only_on_seed_and_index() {
    let (curve, dividends) = flat_curves();
    let grid = grid();
    let config = SimulationConfig::default();

    let many = simulate_paths(&grid, &params(), SPOT, &curve, &dividends, 50, &config).unwrap();
    let one = simulate_paths(&grid, &params(), SPOT, &curve, &dividends, 1, &config).unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0], many[0]);
}

#[test]
fn test_results_independent_of_thread_count() {
    let (curve, dividends) = flat_curves();
    let grid = grid();
    let config = SimulationConfig {
        chunk_size: 8,
        ..SimulationConfig::default()
    };

    let run = |threads: usize| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
            .install(|| {
                simulate_paths(&grid, &params(), SPOT, &curve, &dividends, 200, &config).unwrap()
            })
    };

    assert_eq!(run(1), run(4));
}

#[test]
fn test_every_scheme_produces_positive_levels() {
    let (curve, dividends) = flat_curves();
    let grid = grid();
    for scheme in [
        VarianceScheme::FullTruncation,
        VarianceScheme::Reflection,
        VarianceScheme::QuadraticExponential,
    ] {
        let config = SimulationConfig {
            scheme,
            ..SimulationConfig::default()
        };
        let paths =
            simulate_paths(&grid, &params(), SPOT, &curve, &dividends, 500, &config).unwrap();
        assert!(
            paths
                .iter()
                .all(|p| p.anomaly.is_none() && p.levels.iter().all(|l| *l > 0.0)),
            "{scheme:?} produced a non-positive or non-finite level"
        );
    }
}

#[test]
fn test_rejects_zero_paths_and_short_grids() {
    let (curve, dividends) = flat_curves();
    let err = simulate_paths(
        &grid(),
        &params(),
        SPOT,
        &curve,
        &dividends,
        0,
        &SimulationConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidPathCount { requested: 0 }));

    let err = SimulationGrid::new(vec![valuation_date()], DayCount::Actual360).unwrap_err();
    assert!(matches!(err, Error::InvalidGrid { .. }));
}
