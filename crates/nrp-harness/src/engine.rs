// SPDX-License-Identifier: Apache-2.0

//! The simulation engine client collaborator — an opaque dependency per
//! spec §1/§6, specified only through `initialize / run_loop / shutdown`.

use crate::error::HarnessError;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn initialize(&mut self) -> Result<(), HarnessError>;
    async fn run_loop(&mut self, n: u64, data: Option<Value>) -> Result<Option<Value>, HarnessError>;
    async fn shutdown(&mut self) -> Result<(), HarnessError>;
}

/// Constructor arguments for a production engine client (spec §6):
/// address, config file path, and argument overrides injecting `sim_id`
/// and (for the data-transfer engine) the broker address.
#[derive(Debug, Clone)]
pub struct EngineClientArgs {
    pub address: String,
    pub config_file: std::path::PathBuf,
    pub sim_id: String,
    pub broker_address: Option<String>,
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct FakeEngineClient {
        pub initialized: Mutex<bool>,
        pub shutdown_calls: Mutex<u32>,
        pub run_loop_calls: Mutex<Vec<u64>>,
        pub fail_initialize: bool,
    }

    impl FakeEngineClient {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl EngineClient for FakeEngineClient {
        async fn initialize(&mut self) -> Result<(), HarnessError> {
            if self.fail_initialize {
                return Err(HarnessError::Engine("simulated engine init failure".to_string()));
            }
            *self.initialized.lock() = true;
            Ok(())
        }

        async fn run_loop(&mut self, n: u64, _data: Option<Value>) -> Result<Option<Value>, HarnessError> {
            self.run_loop_calls.lock().push(n);
            Ok(None)
        }

        async fn shutdown(&mut self) -> Result<(), HarnessError> {
            *self.shutdown_calls.lock() += 1;
            Ok(())
        }
    }
}
