use autocall_lib::{
    build_optimizer, calibrate_heston, default_configs, AutocallableNote, CalibrationParams,
    CouponSchedule, DayCount, FlatForward, MonteCarloEngine, PastFixings, ProductSpec,
    VolatilitySurface,
};
use chrono::NaiveDate;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("Athena / Phoenix Autocallable Pricing");
    println!("=====================================");

    let today = date(2024, 7, 20);
    let spot = 79.98;
    let curve = FlatForward::new(today, 0.02, DayCount::Actual360)?;
    let dividends = FlatForward::new(today, 0.028, DayCount::Actual360)?;

    // Flat 35.65% vol across five yearly expiries and strikes at 70%..110%
    let expiries: Vec<NaiveDate> = (2025..=2029).map(|y| date(y, 7, 20)).collect();
    let strikes: Vec<f64> = [0.7, 0.8, 0.9, 1.0, 1.1].iter().map(|m| spot * m).collect();
    let vols = vec![vec![0.3565; strikes.len()]; expiries.len()];
    let surface = VolatilitySurface::from_grid(&expiries, &strikes, &vols)?;

    let optimizer = build_optimizer(&default_configs::differential_evolution());
    let fit = calibrate_heston(
        &curve,
        &dividends,
        spot,
        &surface,
        optimizer.as_ref(),
        CalibrationParams::default(),
    )?;

    let p = fit.params;
    println!("\nCalibrated Heston parameters ({:?}):", fit.status);
    println!("  v0    = {:.6}", p.v0);
    println!("  kappa = {:.6}", p.kappa);
    println!("  theta = {:.6}", p.theta);
    println!("  sigma = {:.6}", p.sigma);
    println!("  rho   = {:.6}", p.rho);
    println!("  residual {:.3e} after {} evaluations", fit.residual, fit.evaluations);
    println!("  Feller condition satisfied: {}", p.satisfies_feller());

    // Semiannual observations from 6M to 5Y
    let schedule = CouponSchedule::periodic(date(2025, 1, 20), date(2029, 7, 20), 6)?;
    let engine = MonteCarloEngine::default();

    println!("\nValuation ({} paths):", engine.simulation.num_paths);
    for (name, spec) in [
        ("Athena", ProductSpec::athena(spot)),
        ("Phoenix", ProductSpec::phoenix(spot)),
    ] {
        let note = AutocallableNote::new(spec, schedule.clone())?;
        let value = engine.price(&note, &p, spot, &curve, &dividends, &PastFixings::new(), today)?;
        println!(
            "  {:<8} PV = {:>14.2}  ({:.2}% of notional)",
            name,
            value.present_value,
            value.percent_of_notional()
        );
    }

    Ok(())
}
