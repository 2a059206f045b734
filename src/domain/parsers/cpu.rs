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

//! CPU information parsing functions

use super::common::{clean_value, extract_field, normalize_frequency};
use crate::domain::{is_unknown, unknown, CpuProfile};
use std::collections::BTreeSet;

/// Parse the CPU profile from Linux lscpu output
///
/// Fields lscpu does not print stay unknown. `CPU max MHz` is preferred over
/// the instantaneous `CPU MHz`.
///
/// # Arguments
/// * `lscpu_output` - Raw output from lscpu command
pub fn parse_lscpu_output(lscpu_output: &str) -> CpuProfile {
    let count = |label: &str| {
        let value = clean_value(&extract_field(lscpu_output, label));
        match value.parse::<u32>() {
            Ok(n) => n.to_string(),
            Err(_) => crate::domain::unknown(),
        }
    };

    let mut max_speed = normalize_frequency(&extract_field(lscpu_output, "CPU max MHz"));
    if is_unknown(&max_speed) {
        max_speed = normalize_frequency(&extract_field(lscpu_output, "CPU MHz"));
    }

    CpuProfile {
        architecture: clean_value(&extract_field(lscpu_output, "Architecture")),
        model: clean_value(&extract_field(lscpu_output, "Model name")),
        logical_cpus: count("CPU(s)"),
        cores_per_socket: count("Core(s) per socket"),
        sockets: count("Socket(s)"),
        max_speed,
    }
}

/// Parse `/proc/cpuinfo`
///
/// Logical CPUs are counted from `processor` entries and sockets from distinct
/// `physical id` values. Architecture and clock speed stay unknown.
pub fn parse_proc_cpuinfo(cpuinfo: &str) -> CpuProfile {
    let mut logical = 0usize;
    let mut sockets = BTreeSet::new();
    for line in cpuinfo.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "processor" => logical += 1,
            "physical id" => {
                sockets.insert(value.trim().to_string());
            }
            _ => {}
        }
    }

    let model = ["model name", "cpu model"]
        .iter()
        .map(|label| clean_value(&extract_field(cpuinfo, label)))
        .find(|value| !is_unknown(value))
        .unwrap_or_else(unknown);
    let cores_per_socket = match extract_field(cpuinfo, "cpu cores").parse::<u32>() {
        Ok(cores) if cores > 0 => cores.to_string(),
        _ => unknown(),
    };

    CpuProfile {
        model,
        logical_cpus: if logical > 0 {
            logical.to_string()
        } else {
            unknown()
        },
        cores_per_socket,
        sockets: if sockets.is_empty() {
            unknown()
        } else {
            sockets.len().to_string()
        },
        ..CpuProfile::default()
    }
}

/// Fill the gaps of `primary` with values from `fallback`
pub fn merge_cpu_profiles(primary: CpuProfile, fallback: CpuProfile) -> CpuProfile {
    let pick = |a: String, b: String| if is_unknown(&a) { b } else { a };
    CpuProfile {
        architecture: pick(primary.architecture, fallback.architecture),
        model: pick(primary.model, fallback.model),
        logical_cpus: pick(primary.logical_cpus, fallback.logical_cpus),
        cores_per_socket: pick(primary.cores_per_socket, fallback.cores_per_socket),
        sockets: pick(primary.sockets, fallback.sockets),
        max_speed: pick(primary.max_speed, fallback.max_speed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UNKNOWN;

    const LSCPU: &str = r#"Architecture:                       x86_64
CPU op-mode(s):                     32-bit, 64-bit
Byte Order:                         Little Endian
CPU(s):                             224
On-line CPU(s) list:                0-223
Vendor ID:                          GenuineIntel
Model name:                         Intel(R) Xeon(R) Platinum 8480+
Thread(s) per core:                 2
Core(s) per socket:                 56
Socket(s):                          2
CPU max MHz:                        3800.0000
CPU min MHz:                        800.0000
NUMA node0 CPU(s):                  0-55,112-167
"#;

    #[test]
    fn test_parse_lscpu_output() {
        let cpu = parse_lscpu_output(LSCPU);
        assert_eq!(cpu.architecture, "x86_64");
        assert_eq!(cpu.model, "Intel(R) Xeon(R) Platinum 8480+");
        assert_eq!(cpu.logical_cpus, "224");
        assert_eq!(cpu.cores_per_socket, "56");
        assert_eq!(cpu.sockets, "2");
        assert_eq!(cpu.max_speed, "3800 MHz");
    }

    #[test]
    fn test_parse_lscpu_falls_back_to_current_mhz() {
        let cpu = parse_lscpu_output("Architecture: aarch64\nCPU(s): 8\nCPU MHz: 2000.000\n");
        assert_eq!(cpu.max_speed, "2000 MHz");
        assert_eq!(cpu.sockets, UNKNOWN);
        assert_eq!(cpu.model, UNKNOWN);
    }

    #[test]
    fn test_parse_lscpu_empty() {
        assert_eq!(parse_lscpu_output(""), CpuProfile::default());
    }

    #[test]
    fn test_parse_proc_cpuinfo() {
        let cpuinfo = "processor\t: 0\nmodel name\t: AMD EPYC 9654 96-Core Processor\nphysical id\t: 0\ncpu cores\t: 96\n\nprocessor\t: 1\nmodel name\t: AMD EPYC 9654 96-Core Processor\nphysical id\t: 1\ncpu cores\t: 96\n";
        let cpu = parse_proc_cpuinfo(cpuinfo);
        assert_eq!(cpu.model, "AMD EPYC 9654 96-Core Processor");
        assert_eq!(cpu.logical_cpus, "2");
        assert_eq!(cpu.sockets, "2");
        assert_eq!(cpu.cores_per_socket, "96");
        assert_eq!(cpu.architecture, UNKNOWN);
        assert_eq!(parse_proc_cpuinfo(""), CpuProfile::default());
    }

    #[test]
    fn test_merge_cpu_profiles_keeps_primary() {
        let primary = parse_lscpu_output("CPU(s): 8\n");
        let fallback = CpuProfile {
            model: "Fallback Model".into(),
            logical_cpus: "4".into(),
            ..CpuProfile::default()
        };
        let merged = merge_cpu_profiles(primary, fallback);
        assert_eq!(merged.logical_cpus, "8");
        assert_eq!(merged.model, "Fallback Model");
    }
}
