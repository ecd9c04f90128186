use gridflow::prelude::*;

macro_rules! timeit {
    ($name:expr, $times:expr, $block:expr) => {{
        use std::time::{Duration, Instant};
        let mut total = Duration::ZERO;
        let mut best = Duration::MAX;
        for _ in 0..$times {
            let start = Instant::now();
            let _result = $block();
            let elapsed = start.elapsed();
            total += elapsed;
            best = best.min(elapsed);
        }
        println!(
            " {} loops, {} - Average: {:?}, Min: {:?}",
            $times,
            $name,
            total / $times,
            best
        );
    }};
}

fn main() -> Result<(), PfError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let mut grid = case14()?;
    let v0 = grid.flat_start();
    let mut computers = Computers::from_grid(&mut grid)?;

    // daily load curve, one scenario per 15 minutes
    let n = 96;
    let mut batch = ScenarioBatch::repeat_base(computers.setpoints(), n);
    for i in 0..n {
        let hour = i as f64 / 4.0;
        let scale = 0.75 + 0.35 * (std::f64::consts::PI * (hour - 6.0) / 12.0).sin().max(0.0);
        batch.load_p.row_mut(i).scale_mut(scale);
        batch.load_q.row_mut(i).scale_mut(scale);
        batch.gen_p.row_mut(i).scale_mut(scale);
    }

    let config = SolverConfig::new(SolverType::NewtonRaphson);
    for threads in [1, 2, 4] {
        let batch_config = BatchConfig::default().with_threads(threads);
        timeit!(format!("{threads} thread(s)"), 10u32, || {
            computers.compute_vs(&batch, &v0, &config, &batch_config)
        });
    }

    let status = computers.compute_vs(&batch, &v0, &config, &BatchConfig::default())?;
    println!("{}/{} scenarios solved", status.nb_solved, status.n_scenarios);
    let flows = computers.compute_flows()?;
    let (i_max, f_max) = flows
        .column(0)
        .iter()
        .copied()
        .enumerate()
        .fold((0, 0.0), |best, (i, f)| if f > best.1 { (i, f) } else { best });
    println!("line 1-2 carries at most {f_max:.4} kA (scenario {i_max})");
    println!("timers {:?}", computers.timers());

    let mut security = SecurityAnalysis::new(&grid);
    security.add_all_n1()?;
    let status = security.compute(&v0, &config, &BatchConfig::default())?;
    let flows = security.compute_flows()?;
    let worst = flows.iter().copied().fold(0.0, f64::max);
    println!(
        "N-1: {}/{} contingencies solved, highest branch current {worst:.4} kA",
        status.nb_solved, status.n_scenarios
    );
    Ok(())
}
