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

//! # wsbridge CLI
//!
//! Command-line driver for the wsbridge JavaScript request bridge.
//!
//! The binary plays the part of the host server: it owns an in-memory host,
//! builds a slot pool for one worker and dispatches requests built from the
//! command line, re-entering the dispatcher for as long as it answers
//! `Again`.
//!
//! ## Key Commands
//!
//! - `wsbridge request`: run one request against an application file
//! - `wsbridge config`: evaluate a configuration script and print the options
//! - `wsbridge shell`: interactive shell on worker 1's interpreter

pub mod driver;

#[cfg(test)]
mod tests;
