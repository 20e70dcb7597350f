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
use std::fmt::Display;

use load_framework::{metrics::IterationStatus, reqwest::StatusCode};

/// ANSI colours used for the summary lines printed around the result tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    Red,
    Green,
    Blue,
}

impl Color {
    fn code(self) -> &'static str {
        match self {
            Color::Red => "\x1b[1;31m",
            Color::Green => "\x1b[32m",
            Color::Blue => "\x1b[34m",
        }
    }

    pub(crate) fn paint(self, text: impl Display) -> String {
        format!("{}{text}\x1b[0m", self.code())
    }
}

impl From<IterationStatus> for Color {
    fn from(status: IterationStatus) -> Self {
        match status {
            IterationStatus::Passed => Color::Green,
            IterationStatus::Failed => Color::Red,
        }
    }
}

impl From<StatusCode> for Color {
    fn from(status: StatusCode) -> Self {
        if status.is_success() {
            Color::Green
        } else {
            Color::Red
        }
    }
}

pub(crate) fn separator() -> String {
    "-".repeat(30)
}
