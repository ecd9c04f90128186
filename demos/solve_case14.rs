use gridflow::prelude::*;

fn main() -> Result<(), PfError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut grid = case14()?;
    let v0 = grid.flat_start();
    for (algorithm, backend) in grid.available_solvers() {
        let mut config = SolverConfig::new(algorithm);
        if let Some(kind) = backend {
            config = config.with_linear_solver(kind);
        }
        let res = grid.ac_pf(&v0, &config)?;
        println!(
            "{:<28} {:>10} {:>5} iterations in {:?}",
            format!("{algorithm:?}/{}", backend.map_or("-", |k| k.name())),
            res.status,
            res.iterations,
            res.elapsed
        );
    }

    let vm = grid.get_vm()?;
    let va = grid.get_va()?;
    println!("\n bus      vm [pu]    va [deg]");
    for (k, (m, a)) in vm.iter().zip(va.iter()).enumerate() {
        println!("{:>4} {:>12.6} {:>11.4}", k + 1, m, a);
    }

    let v = grid.get_v()?.clone();
    let mismatch = grid.check_solution(&v, false)?;
    let worst = mismatch.iter().map(|s| s.norm()).fold(0.0, f64::max);
    println!("\nlargest mismatch {worst:.3e} pu");
    Ok(())
}
