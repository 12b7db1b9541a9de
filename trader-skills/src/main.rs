// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Main executable to run a simulation of the trader agent service.

use abci_lib::{base_types::Duration, simulator};
use clap::{App, Arg};
use log::{info, warn};
use std::sync::Arc;
use trader_skills::{
    params::TraderParams,
    simulated_context::{make_agents, SimulatedMarket},
};

fn main() -> anyhow::Result<()> {
    let args = get_arguments();

    env_logger::init();
    let params = match &args.config {
        Some(path) => TraderParams::read(path)?,
        None => TraderParams::default(),
    };
    let market_seed = args.seed;
    let failure_every = args.failure_every;
    let agents = make_agents(Arc::new(params), args.nodes, |_| {
        let market = SimulatedMarket::new(market_seed);
        match failure_every {
            Some(n) => market.with_failure_every(n),
            None => market,
        }
    })?;
    let delay_distribution = simulator::RandomDelay::new(args.mean, args.variance)
        .ok_or_else(|| anyhow::anyhow!("Invalid network delay distribution"))?;
    let mut sim = simulator::Simulator::new(
        agents,
        delay_distribution,
        args.retry_delay,
        args.seed,
    );
    for index in args.silent {
        sim.silence(index);
    }
    let agents = sim.loop_until(
        simulator::GlobalTime(args.max_clock),
        args.output_data_files,
    )?;
    warn!("Periods completed per agent: {:#?}", {
        let x: Vec<_> = agents
            .iter()
            .map(|agent| agent.synchronized_data().period_count())
            .collect();
        x
    });
    for agent in agents {
        info!(
            "{}: {} transitions, now in {}, data digest {}",
            agent.address(),
            agent.history().len(),
            agent.sequence().current_round_id(),
            agent.synchronized_data().digest()?
        );
        info!("Benchmarks of {}: {}", agent.address(), agent.benchmark().to_json()?);
    }
    Ok(())
}

struct CliArguments {
    max_clock: i64,
    mean: f64,
    variance: f64,
    nodes: usize,
    seed: u64,
    retry_delay: Duration,
    failure_every: Option<usize>,
    silent: Vec<usize>,
    config: Option<String>,
    output_data_files: Option<String>,
}

fn get_arguments() -> CliArguments {
    let matches = App::new("Trader service simulator")
        .about("A simulation of the trader agent service over deterministic market APIs")
        .arg(
            Arg::with_name("max_clock")
                .long("max_clock")
                .help("Time at which to stop the simulation, in milliseconds")
                .default_value("600000"),
        )
        .arg(
            Arg::with_name("mean")
                .long("mean")
                .help("The mean value of the log-normal distribution of the network delay")
                .default_value("10.0"),
        )
        .arg(
            Arg::with_name("variance")
                .long("variance")
                .help("The variance of the log-normal distribution of the network delay")
                .default_value("4.0"),
        )
        .arg(
            Arg::with_name("nodes")
                .long("nodes")
                .help("The number of agents to simulate")
                .default_value("4"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .help("Seed of the network delays and of the simulated market")
                .default_value("0"),
        )
        .arg(
            Arg::with_name("retry_delay")
                .long("retry_delay")
                .help("Delay before an agent retries a local phase that was not ready")
                .default_value("100"),
        )
        .arg(
            Arg::with_name("failure_every")
                .long("failure_every")
                .help("Make every n-th market request of an agent fail")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("silent")
                .long("silent")
                .help("Index of an agent that never sends payloads")
                .takes_value(true)
                .multiple(true),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .help("JSON file with the trader parameters")
                .takes_value(true),
        )
        .arg(Arg::with_name("create_csv").long("create_csv").help(
            "If given this argument, csv files will be generated with data on the simulation"
        ).takes_value(true))
        .get_matches();

    CliArguments {
        max_clock: matches
            .value_of("max_clock")
            .unwrap()
            .parse::<i64>()
            .unwrap(),
        mean: matches.value_of("mean").unwrap().parse::<f64>().unwrap(),
        variance: matches
            .value_of("variance")
            .unwrap()
            .parse::<f64>()
            .unwrap(),
        nodes: matches.value_of("nodes").unwrap().parse::<usize>().unwrap(),
        seed: matches.value_of("seed").unwrap().parse::<u64>().unwrap(),
        retry_delay: Duration(
            matches
                .value_of("retry_delay")
                .unwrap()
                .parse::<i64>()
                .unwrap(),
        ),
        failure_every: matches
            .value_of("failure_every")
            .map(|x| x.parse::<usize>().unwrap()),
        silent: matches
            .values_of("silent")
            .map(|values| values.map(|x| x.parse::<usize>().unwrap()).collect())
            .unwrap_or_default(),
        config: matches.value_of("config").map(|x| x.to_string()),
        output_data_files: matches.value_of("create_csv").map(|x| x.to_string()),
    }
}
