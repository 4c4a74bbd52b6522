use std::convert::TryFrom;

use factorflow::api::properties::{EngineProperties, Properties};
use factorflow::metrics::global_metrics;
use factorflow::runtime::{init_log, LogTarget};
use factorflow::schedule::SchedulerKind;
use factorflow::{EngineConfig, FactorGraph, FactorTable, NodeId, Solver, SolverKind};
use metrics_util::debugging::{DebuggingRecorder, Snapshotter};

const CHAIN_LEN: usize = 8;

/// A chain of binary variables that prefer to agree with their neighbours,
/// closed by a parity check over the first, middle and last variables.
fn build_graph() -> anyhow::Result<(FactorGraph, Vec<NodeId>)> {
    let mut graph = FactorGraph::new();
    let vars: Vec<NodeId> = (0..CHAIN_LEN).map(|_| graph.add_variable(2)).collect();

    let agree = FactorTable::new(vec![2, 2], vec![0.8, 0.2, 0.2, 0.8])?;
    for pair in vars.windows(2) {
        graph.add_factor(agree.clone(), pair)?;
    }
    graph.add_factor(
        FactorTable::xor(3),
        &[vars[0], vars[CHAIN_LEN / 2], vars[CHAIN_LEN - 1]],
    )?;

    graph.set_input(vars[0], &[0.3, 0.7])?;
    graph.set_input(vars[CHAIN_LEN - 1], &[0.6, 0.4])?;
    Ok((graph, vars))
}

fn load_properties(path: Option<String>) -> anyhow::Result<Properties> {
    match path {
        Some(path) => Properties::load_yaml(path),
        None => {
            let mut properties = Properties::new();
            properties.set_num_workers(4);
            properties.set_iterations(20);
            properties.set_seed(7);
            properties.set_log_level("INFO");
            Ok(properties)
        }
    }
}

pub fn run(properties_path: Option<String>) -> anyhow::Result<()> {
    let properties = load_properties(properties_path)?;
    let config = EngineConfig::try_from(&properties)?;
    init_log(&LogTarget::Console, config.log_level.as_str())?;
    info!("factorflow {}, engine config: {:?}", factorflow::utils::VERSION, config);
    let snapshotter = install_recorder()?;

    let (mut graph, vars) = build_graph()?;

    for kind in [SolverKind::SumProduct, SolverKind::MinSum] {
        let mut solver = Solver::new(kind, config.clone());
        solver.initialize(&graph);
        solver.solve(&graph)?;
        for v in &vars {
            info!(
                "{} {} belief={:?} value={}",
                kind.name(),
                v,
                solver.belief(&graph, *v)?,
                solver.value(&graph, *v)?
            );
        }
    }

    // flooding lets every variable sample in the same sweep
    graph.set_scheduler(SchedulerKind::Flooding);
    let mut solver = Solver::new(SolverKind::Gibbs, config);
    solver.initialize(&graph);
    solver.solve(&graph)?;
    for v in &vars {
        info!("Gibbs {} belief={:?}", v, solver.belief(&graph, *v)?);
    }

    report_metrics(&snapshotter);
    Ok(())
}

fn install_recorder() -> anyhow::Result<Snapshotter> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .map_err(|_| anyhow::anyhow!("a metrics recorder is already installed"))?;
    Ok(snapshotter)
}

fn report_metrics(snapshotter: &Snapshotter) {
    info!(
        "graph builds={}, cache hits={}, tasks completed={}, tasks failed={}",
        global_metrics::graph_builds(),
        global_metrics::cache_hits(),
        global_metrics::tasks_completed(),
        global_metrics::tasks_failed()
    );
    for (key, _unit, _description, value) in snapshotter.snapshot().into_vec() {
        info!("metric {:?} {:?}", key.key(), value);
    }
}
