// SPDX-License-Identifier: Apache-2.0

//! Stand-in for the production engine client binding. The simulation
//! engine library is an opaque external collaborator this repository does
//! not implement (spec's engine client is specified only through
//! `initialize`/`run_loop`/`shutdown`); this type exists only so the
//! worker binary has a concrete, constructible `EngineClient` to wire up
//! outside of tests, where `FakeEngineClient` is used instead.

use async_trait::async_trait;
use nrp_harness::{EngineClient, EngineClientArgs, HarnessError};
use serde_json::Value;

pub struct StubEngineClient {
    args: EngineClientArgs,
}

impl StubEngineClient {
    pub fn new(args: EngineClientArgs) -> Self {
        Self { args }
    }
}

#[async_trait]
impl EngineClient for StubEngineClient {
    async fn initialize(&mut self) -> Result<(), HarnessError> {
        tracing::info!(
            address = %self.args.address,
            config_file = %self.args.config_file.display(),
            sim_id = %self.args.sim_id,
            "engine client stub initialized"
        );
        Ok(())
    }

    async fn run_loop(&mut self, n: u64, data: Option<Value>) -> Result<Option<Value>, HarnessError> {
        tracing::trace!(n, "engine client stub advanced n timesteps");
        Ok(data)
    }

    async fn shutdown(&mut self) -> Result<(), HarnessError> {
        tracing::info!(sim_id = %self.args.sim_id, "engine client stub shut down");
        Ok(())
    }
}
