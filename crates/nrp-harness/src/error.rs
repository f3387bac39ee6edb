// SPDX-License-Identifier: Apache-2.0

use nrp_core::HookError;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("script compile error at line {line}: {message}")]
    Compile { line: usize, message: String },
    #[error("engine error: {0}")]
    Engine(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<HarnessError> for HookError {
    fn from(e: HarnessError) -> Self {
        HookError::new(e.to_string())
    }
}
