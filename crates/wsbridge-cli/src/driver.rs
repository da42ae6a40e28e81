// Copyright 2025 wsbridge Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Host-side helpers used by the `wsbridge` binary.

use anyhow::{anyhow, bail, Result};
use std::path::Path;
use std::rc::Rc;
use wsbridge_common::config::{BridgeConfig, WorkerLayout};
use wsbridge_common::host::memory::{CapturedResponse, Wait};
use wsbridge_common::host::MemoryHost;
use wsbridge_common::protocol::{DispatchOutcome, Request, SlotRef};
use wsbridge_server::configurator::load_options;
use wsbridge_server::{Dispatcher, SlotPool};

/// The slot every CLI request runs on.
pub const SLOT: SlotRef = SlotRef { worker: 1, slot: 0 };

/// Parses a `KEY=VALUE` request variable.
///
/// # Errors
///
/// Returns an error if there is no `=` or the key is empty.
pub fn parse_var(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(anyhow!("Invalid request variable '{}': expected KEY=VALUE", raw)),
    }
}

/// Builds a request from `KEY=VALUE` pairs. `REQUEST_METHOD` and
/// `PATH_INFO` default to `GET` and `/` when not given.
pub fn build_request(vars: &[(String, String)]) -> Request {
    let mut request = Request::new();
    let given = |name: &str| vars.iter().any(|(k, _)| k == name);
    if !given("REQUEST_METHOD") {
        request = request.with_var("REQUEST_METHOD", "GET");
    }
    if !given("PATH_INFO") {
        request = request.with_var("PATH_INFO", "/");
    }
    for (key, value) in vars {
        request = request.with_var(key, value);
    }
    request
}

/// Applies every option produced by the configurator at `path` to `config`.
/// Options meant for someone else are logged and skipped.
pub fn apply_configurator(path: &Path, config: &mut BridgeConfig) -> Result<Vec<(String, String)>> {
    let mut options = Vec::new();
    load_options(path, &mut options)?;
    for (key, value) in &options {
        if !config.apply_option(key, value)? {
            tracing::debug!("ignoring option {} = {}", key, value);
        }
    }
    Ok(options)
}

/// A single-worker bridge backed by the in-memory host.
pub struct Session {
    pub dispatcher: Dispatcher,
    pub host: Rc<MemoryHost>,
}

impl Session {
    pub fn new(config: BridgeConfig, async_enabled: bool) -> Result<Self> {
        let host = Rc::new(MemoryHost::new());
        let layout = WorkerLayout {
            async_enabled,
            ..WorkerLayout::default()
        };
        let mut pool = SlotPool::new(config, layout, host.clone())?;
        pool.initialize_worker(SLOT.worker)?;
        Ok(Self {
            dispatcher: Dispatcher::new(pool),
            host,
        })
    }

    /// Dispatches `request` until the cycle completes, at most `max_steps`
    /// times. Waits registered between steps are logged and treated as
    /// already satisfied.
    pub fn run(&mut self, request: &mut Request, max_steps: usize) -> Result<DispatchOutcome> {
        for step in 1..=max_steps {
            let outcome = self.dispatcher.dispatch(SLOT, request);
            for wait in self.host.take_waits(SLOT) {
                match wait {
                    Wait::Timeout(timeout) => tracing::debug!("step {}: timeout {:?}", step, timeout),
                    Wait::Fd { fd, interest, .. } => {
                        tracing::debug!("step {}: waiting on fd {} ({:?})", step, fd, interest)
                    }
                }
            }
            if outcome != DispatchOutcome::Again {
                return Ok(outcome);
            }
        }
        self.dispatcher.recycle(SLOT)?;
        bail!("Response still streaming after {} steps", max_steps)
    }

    pub fn response(&self) -> CapturedResponse {
        self.host.response(SLOT)
    }
}

/// Renders a captured response the way it would go over the wire: status
/// line, headers, a blank line, then the body.
pub fn format_response(response: &CapturedResponse) -> String {
    let mut out = String::new();
    if let Some(status) = response.status() {
        out.push_str(&String::from_utf8_lossy(status));
        out.push('\n');
    }
    for (name, value) in response.headers() {
        out.push_str(&format!(
            "{}: {}\n",
            String::from_utf8_lossy(name),
            String::from_utf8_lossy(value)
        ));
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&response.body()));
    out
}
