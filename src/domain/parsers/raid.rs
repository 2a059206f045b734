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

//! Software RAID status parsing functions

use super::common::{clean_value, extract_field};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref MD_NAME_RE: Regex = Regex::new(r"^md\d+$").unwrap();
    static ref MEMBER_SUFFIX_RE: Regex = Regex::new(r"\[\d+\](\([A-Z]\))?$").unwrap();
}

/// One array line of /proc/mdstat
#[derive(Debug, Clone, PartialEq)]
pub struct MdstatArray {
    pub name: String,
    pub state: String,
    pub level: String,
    pub members: Vec<String>,
}

/// Parse the array lines of /proc/mdstat
///
/// Only names matching `md<N>` count as arrays; `Personalities` and
/// `unused devices` lines are skipped.
pub fn parse_mdstat(mdstat: &str) -> Vec<MdstatArray> {
    let mut arrays = Vec::new();

    for line in mdstat.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if !MD_NAME_RE.is_match(name) {
            continue;
        }

        let mut tokens = rest.split_whitespace().peekable();
        let state = tokens.next().unwrap_or("unknown").to_string();
        while tokens.peek().is_some_and(|t| t.starts_with('(')) {
            tokens.next();
        }
        let level = match tokens.peek() {
            Some(t) if t.starts_with("raid") || *t == "linear" || *t == "multipath" => {
                tokens.next().unwrap_or_default().to_string()
            }
            _ => crate::domain::unknown(),
        };
        let members = tokens
            .map(|t| MEMBER_SUFFIX_RE.replace(t, "").to_string())
            .collect();

        arrays.push(MdstatArray {
            name: name.to_string(),
            state,
            level,
            members,
        });
    }

    arrays
}

/// Level, state and member devices from `mdadm --detail`
#[derive(Debug, Clone, PartialEq)]
pub struct MdadmDetail {
    pub level: String,
    pub state: String,
    pub devices: Vec<String>,
}

pub fn parse_mdadm_detail(output: &str) -> MdadmDetail {
    let devices = output
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .filter(|token| token.starts_with("/dev/") && !token.ends_with(':'))
        .map(|token| token.trim_start_matches("/dev/").to_string())
        .collect();

    MdadmDetail {
        level: clean_value(&extract_field(output, "Raid Level")),
        state: clean_value(&extract_field(output, "State")),
        devices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UNKNOWN;

    const MDSTAT: &str = r#"Personalities : [raid1] [raid6] [raid5] [raid4]
md127 : active raid1 sdb1[1] sda1[0]
      976630464 blocks super 1.2 [2/2] [UU]
      bitmap: 0/8 pages [0KB], 65536KB chunk

md1 : active (auto-read-only) raid5 sdc[0] sdd[1] sde[3](F)
      1953260544 blocks super 1.2 level 5, 512k chunk, algorithm 2 [3/2] [UU_]

unused devices: <none>
"#;

    #[test]
    fn test_parse_mdstat() {
        let arrays = parse_mdstat(MDSTAT);
        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0].name, "md127");
        assert_eq!(arrays[0].state, "active");
        assert_eq!(arrays[0].level, "raid1");
        assert_eq!(arrays[0].members, vec!["sdb1", "sda1"]);
        assert_eq!(arrays[1].level, "raid5");
        assert_eq!(arrays[1].members, vec!["sdc", "sdd", "sde"]);
    }

    #[test]
    fn test_parse_mdstat_without_arrays() {
        let mdstat = "Personalities : \nunused devices: <none>\n";
        assert!(parse_mdstat(mdstat).is_empty());
        assert!(parse_mdstat("").is_empty());
    }

    #[test]
    fn test_parse_mdadm_detail() {
        let output = r#"/dev/md127:
           Version : 1.2
        Raid Level : raid1
        Array Size : 976630464 (931.39 GiB 1000.07 GB)
             State : clean
    Number   Major   Minor   RaidDevice State
       0       8        1        0      active sync   /dev/sda1
       1       8       17        1      active sync   /dev/sdb1
"#;
        let detail = parse_mdadm_detail(output);
        assert_eq!(detail.level, "raid1");
        assert_eq!(detail.state, "clean");
        assert_eq!(detail.devices, vec!["sda1", "sdb1"]);

        let empty = parse_mdadm_detail("");
        assert_eq!(empty.level, UNKNOWN);
        assert!(empty.devices.is_empty());
    }
}
