use gridflow::{prelude::*, testcases};

fn main() -> Result<()> {
    env_logger::init();

    let mut pf = PowerFlow::<DefaultSolver>::new(testcases::two_bus(50.0)?);
    let res = pf.solve(&PowerFlowConfig::new(StartMode::Flat))?;
    println!(
        "two bus: {:?} after {} iterations, max mismatch {:.3e}",
        res.status, res.iterations, res.max_mismatch
    );
    for (i, bus) in res.results.buses.iter().enumerate() {
        println!("bus {i}: {:.5} p.u. {:8.4} deg", bus.vm_pu, bus.va_degree);
    }

    let mut pf = PowerFlow::<DefaultSolver>::new(testcases::feeder()?);
    pf.solve(&PowerFlowConfig::new(StartMode::Dc))?;
    pf.grid_mut().set_load_pq(1, 8.0, 2.5)?;
    let res = pf.solve(&PowerFlowConfig::new(StartMode::Warm))?;
    println!("feeder, warm start after a load change: {:?}", res.timings.total);
    match serde_json::to_string_pretty(&res.results) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("could not serialize results: {e}"),
    }
    Ok(())
}
