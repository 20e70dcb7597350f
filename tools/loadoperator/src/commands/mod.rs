/*
Copyright 2024-2025 The Spice.ai OSS Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use load_framework::{anyhow, policy::ScenarioFile};

use crate::args::ScenarioArgs;

pub(crate) mod invoke;
pub(crate) mod mock;
pub(crate) mod run;
pub(crate) mod util;

/// Prints the scenario file that `run` would execute for the same arguments.
pub(crate) fn export(args: &ScenarioArgs) -> anyhow::Result<()> {
    let (url, policy) = args.resolve()?;
    print!("{}", ScenarioFile::from_policy(url, &policy).to_yaml()?);
    Ok(())
}
