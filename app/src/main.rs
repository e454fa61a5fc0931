use std::{sync::Arc, thread, time::Duration};

use mimalloc::MiMalloc;
use neurite::{
    Morphology,
    channel::{GatingVariable, IonChannel},
    solver::DiffusionSolver,
};
use rand::Rng;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const TICKS: u64 = 2000;
const TICK_INTERVAL: Duration = Duration::from_millis(2);
const FRAME_INTERVAL: Duration = Duration::from_millis(50);
const DIFFUSION_CONST: f64 = 0.05;

fn potassium_channel() -> IonChannel {
    let mut channel = IonChannel::new("K", 2.0, -70.0);
    channel.add_gating_variable(
        GatingVariable::new("n", |v: f64| 0.01 * (v + 55.0), |v: f64| 0.125 * (v / 80.0))
            .with_coefficients(vec![0.4]),
    );
    channel
}

fn main() {
    tracing_subscriber::fmt().init();

    let morphology = Arc::new(Morphology::bifurcation(12, 8));
    info!(
        nodes = morphology.node_count(),
        caps = morphology.boundary_nodes().count(),
        "built morphology"
    );

    match morphology.to_neato_png() {
        Ok(png) => std::fs::write("morphology.png", png).unwrap(),
        Err(e) => warn!("skipping morphology render (is graphviz installed?): {e}"),
    }

    let mut solver = DiffusionSolver::new(Arc::clone(&morphology), DIFFUSION_CONST);
    let reader = solver.reader();

    // Simulation schedule: steps at its own cadence, publishing every tick.
    let sim = thread::spawn(move || {
        let mut rng = rand::rng();
        let channel = potassium_channel();
        let soma = 0usize;

        solver.pre_solve().expect("builder graphs are in range");
        solver.set_inputs(&[(soma, 1.0)]).unwrap();

        for tick in 0..TICKS {
            // every so often, poke a random compartment and let the
            // channel's current at the soma feed back as a source term
            if tick % 250 == 0 {
                let site = rng.random_range(0..solver.node_count());
                let amplitude: f64 = rng.random_range(0.5..1.5);
                let v_soma = solver.values()[soma];
                let injected = v_soma + 1e-3 * channel.current(v_soma);
                solver
                    .set_inputs(&[(site, amplitude), (soma, injected)])
                    .unwrap();
                info!(tick, site, amplitude, "stimulus");
            }

            solver.solve_step(tick).unwrap();
            solver.set_output_values().unwrap();
            thread::sleep(TICK_INTERVAL);
        }
    });

    // Presentation schedule: samples whatever tick is published, at its
    // own slower cadence; skipped ticks are expected.
    while !sim.is_finished() {
        let snapshot = reader.read();
        if !snapshot.is_empty() {
            let total: f64 = snapshot.iter().sum();
            let peak = snapshot.iter().cloned().fold(f64::MIN, f64::max);
            info!(total, peak, "frame");
        }
        thread::sleep(FRAME_INTERVAL);
    }
    sim.join().unwrap();

    info!("simulation finished");
}
