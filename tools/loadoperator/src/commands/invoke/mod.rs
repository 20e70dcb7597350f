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

use load_framework::{
    anyhow,
    emitter::{http_client, RequestEmitter, RequestTemplate},
};

use super::util::Color;
use crate::args::InvokeArgs;

/// Sends a single invoke request and prints the response.
pub(crate) async fn run(args: &InvokeArgs) -> anyhow::Result<()> {
    let template = RequestTemplate::default()
        .with_url(args.url.clone())
        .with_authorization(args.authorization.clone());
    let emitter = RequestEmitter::new(http_client()?, &template)?;

    println!("{}", Color::Blue.paint(format!("POST {}", emitter.url())));
    println!("{}", serde_json::to_string_pretty(template.body())?);

    let response = emitter.send().await?;
    let status = response.status();
    let body = response.text().await?;

    println!("{}", Color::from(status).paint(status));

    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{body}"),
    }

    Ok(())
}
