// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::simulator::{Event, GlobalTime, Simulator};
use anyhow::Context as _;
use std::{fs, path::Path};

/// Collects round switches and payload counts during a simulation, then writes them as
/// csv files.
pub struct DataWriter {
    data_files_path: String,
    agents_len: usize,
    // Variables for monitoring round switches
    max_round_per_agent: Vec<u64>,
    agents_round_switch: Vec<Vec<(u64, GlobalTime)>>,
    payload_counter: usize, // Counts the number of submitted payloads
}

impl DataWriter {
    pub fn new(agents_num: usize, path: String) -> anyhow::Result<DataWriter> {
        let data_writer = DataWriter {
            agents_len: agents_num,
            max_round_per_agent: vec![0; agents_num],
            agents_round_switch: vec![Vec::new(); agents_num],
            data_files_path: path,
            payload_counter: 0,
        };
        if !Path::new(&data_writer.data_files_path).exists() {
            fs::create_dir_all(&data_writer.data_files_path).with_context(|| {
                format!("could not create result dir {}", data_writer.data_files_path)
            })?;
        }
        Ok(data_writer)
    }

    pub fn update_round_number<Context: Send>(
        &mut self,
        simulator: &Simulator<Context>,
        clock: GlobalTime,
    ) {
        for agent_num in 0..self.agents_len {
            let round_count = match simulator.simulated_agent(agent_num) {
                Some(simulated) => simulated.agent().sequence().round_count().0,
                None => continue,
            };
            if round_count > self.max_round_per_agent[agent_num] {
                self.max_round_per_agent[agent_num] = round_count;
                self.agents_round_switch[agent_num].push((round_count, clock))
            }
        }
    }

    pub fn add_payload_counter(&mut self, event: &Event) {
        if let Event::SubmitEvent { .. } = event {
            self.payload_counter += 1;
        }
    }

    pub fn write_to_file(&self) -> anyhow::Result<()> {
        let path = format!("{}/{}", self.data_files_path, "round_switches.txt");
        let mut wtr = csv::Writer::from_path(&path)
            .with_context(|| format!("could not open {}", path))?;

        // CSV of the round switch
        let headers: Vec<String> = (0..self.agents_len)
            .map(|x| format!("agent {}", x))
            .collect();
        wtr.serialize(&headers)?;

        let max_round = self.max_round_per_agent.iter().max().copied().unwrap_or(0);
        for round_num in 1..=max_round {
            let time_row: Vec<Option<i64>> = self
                .agents_round_switch
                .iter()
                .map(|switches| {
                    switches
                        .iter()
                        .find(|switch| switch.0 == round_num)
                        .map(|switch| (switch.1).0)
                })
                .collect();
            wtr.serialize(time_row)?;
        }
        wtr.flush()?;

        let path = format!("{}/{}", self.data_files_path, "number_of_payloads.txt");
        let mut wtr = csv::Writer::from_path(&path)
            .with_context(|| format!("could not open {}", path))?;
        wtr.serialize(Some(self.payload_counter))?;
        wtr.flush()?;
        Ok(())
    }
}
