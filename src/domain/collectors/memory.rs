/*
Copyright 2024 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Memory/DIMM collector

use super::{CollectionContext, Collector, Requirement, SectionLog};
use crate::domain::parsers::{parse_dmidecode_memory, parse_max_capacity, summarize_dimms};
use crate::domain::MemoryReport;
use async_trait::async_trait;

/// Populated DIMM slots and the summary derived from them
pub struct MemoryCollector;

#[async_trait]
impl Collector for MemoryCollector {
    type Output = MemoryReport;

    fn section(&self) -> &'static str {
        "memory"
    }

    fn requirements(&self) -> Vec<Requirement> {
        vec![Requirement::Tool("dmidecode"), Requirement::Privilege]
    }

    async fn collect(&self, ctx: &CollectionContext, log: &mut SectionLog) -> MemoryReport {
        let output = match ctx.run_privileged("dmidecode", &["-t", "memory"]).await {
            Ok(output) => output,
            Err(e) => {
                log.command_failed("dmidecode -t memory", &e);
                return MemoryReport::default();
            }
        };

        let dimms = parse_dmidecode_memory(&output);
        if dimms.is_empty() {
            log.parse_miss("dimms", "no populated Memory Device blocks");
        }
        let max_capacity = parse_max_capacity(&output);
        if max_capacity.is_none() {
            log.parse_miss("max capacity", "no Physical Memory Array block");
        }

        MemoryReport {
            summary: summarize_dimms(&dimms, max_capacity),
            dimms,
        }
    }
}
