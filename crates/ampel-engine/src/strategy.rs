//! Lookup table over the solver's exported scheduler.
//!
//! The scheduler file carries one line per reachable model state. Only
//! lines taken on the shield's decision turn (`move=2`) matter; from
//! those we extract the occupancy of every lane group in the fixed label
//! order, the claimed action, and the chosen next action encoded in the
//! bracketed choice label.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::errors::EngineError;

/// Strategy state as handed to a lookup: the clipped occupancy vector
/// plus the action the controller currently claims.
type StateKey = (Vec<u32>, usize);

#[derive(Debug, Clone)]
pub struct Strategy {
    labels: Vec<String>,
    table: BTreeMap<StateKey, usize>,
}

impl Strategy {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            table: BTreeMap::new(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn insert(&mut self, state: Vec<u32>, current_action: usize, next_action: usize) {
        self.table.insert((state, current_action), next_action);
    }

    /// Look up the action synthesized for `state` under `current_action`.
    ///
    /// The all-zero occupancy vector means there is nothing to shield and
    /// is never actionable. On an exact miss, degraded matches decrement
    /// one non-zero dimension at a time, in label order, and the first hit
    /// wins. `None` means the controller's own choice stands.
    pub fn action(&self, state: &[u32], current_action: usize) -> Option<usize> {
        if state.iter().all(|&occupancy| occupancy == 0) {
            return None;
        }

        if let Some(&next) = self.table.get(&(state.to_vec(), current_action)) {
            return Some(next);
        }

        debug!(?state, current_action, "no exact strategy entry, degrading");
        for i in 0..state.len() {
            if state[i] != 0 {
                let mut degraded = state.to_vec();
                degraded[i] -= 1;
                if let Some(&next) = self.table.get(&(degraded, current_action)) {
                    return Some(next);
                }
            }
        }
        None
    }

    /// Parse a scheduler export and replace the table.
    ///
    /// The table is swapped in only after the whole file parsed; a lookup
    /// never observes a half-loaded strategy. Returns the entry count.
    pub fn load_scheduler(&mut self, path: &Path) -> Result<usize, EngineError> {
        let raw = fs::read_to_string(path)?;
        let mut table = BTreeMap::new();
        for line in raw.lines() {
            if let Some((state, current_action, next_action)) = self.parse_line(line) {
                table.insert((state, current_action), next_action);
            }
        }
        self.table = table;
        Ok(self.table.len())
    }

    fn parse_line(&self, line: &str) -> Option<(Vec<u32>, usize, usize)> {
        if value_for_token(line, "move")? != "2" {
            return None;
        }

        let mut state = Vec::with_capacity(self.labels.len());
        for label in &self.labels {
            state.push(value_for_token(line, label)?.parse().ok()?);
        }

        let current_action: usize = value_for_token(line, "action")?.parse().ok()?;

        let choice_label = between(line, '{', '}')?;
        let digits: String = choice_label
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let next_action: usize = digits.parse().ok()?;

        Some((state, current_action, next_action))
    }

    /// Write the parsed table to a plain text file for inspection.
    pub fn export(&self, path: &Path) -> io::Result<()> {
        let mut out = String::new();
        for ((state, current_action), next_action) in &self.table {
            let occupancies: Vec<String> = state.iter().map(u32::to_string).collect();
            out.push_str(&format!(
                "{};{current_action} -> {next_action}\n",
                occupancies.join(",")
            ));
        }
        fs::write(path, out)
    }
}

/// Value of `token=value` in a scheduler line; values end at the next
/// `\t&` separator or at the end of the line.
fn value_for_token<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let pattern = format!("{token}=");
    let start = line.find(&pattern)? + pattern.len();
    let rest = &line[start..];
    let end = rest.find("\t&").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn between(line: &str, open: char, close: char) -> Option<&str> {
    let start = line.find(open)? + open.len_utf8();
    let end = start + line[start..].find(close)?;
    Some(&line[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["laneA".to_string(), "laneB".to_string()]
    }

    #[test]
    fn exact_degraded_and_zero_lookups() {
        let mut strategy = Strategy::new(labels());
        strategy.insert(vec![0, 0], 0, 1);
        strategy.insert(vec![1, 0], 0, 2);

        assert_eq!(strategy.action(&[1, 0], 0), Some(2));
        // miss at [2,0] degrades dimension 0 and hits [1,0]
        assert_eq!(strategy.action(&[2, 0], 0), Some(2));
        // the all-zero state is never actionable, even though mapped
        assert_eq!(strategy.action(&[0, 0], 0), None);
        // degraded probing stops after one decrement per dimension
        assert_eq!(strategy.action(&[3, 0], 0), None);
    }

    #[test]
    fn degrading_walks_dimensions_in_label_order() {
        let mut strategy = Strategy::new(labels());
        strategy.insert(vec![1, 2], 1, 0);
        strategy.insert(vec![2, 1], 1, 1);
        // both neighbors exist; dimension 0 is probed first
        assert_eq!(strategy.action(&[2, 2], 1), Some(0));
    }

    #[test]
    fn scheduler_lines_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sched = dir.path().join("J1.sched");
        let contents = "\
move=0\t& laneA=1\t& laneB=0\t& action=0\t& choice={env}\n\
move=2\t& laneA=1\t& laneB=0\t& action=0\t& choice={action2 }\n\
move=2\t& laneA=0\t& laneB=1\t& action=1\t& choice={action0 }\n\
move=2\t& laneA=bogus\t& laneB=1\t& action=1\t& choice={action0 }\n";
        fs::write(&sched, contents).unwrap();

        let mut strategy = Strategy::new(labels());
        let entries = strategy.load_scheduler(&sched).unwrap();
        // the env-turn line and the malformed line are skipped
        assert_eq!(entries, 2);
        assert_eq!(strategy.action(&[1, 0], 0), Some(2));
        assert_eq!(strategy.action(&[0, 1], 1), Some(0));

        let strat = dir.path().join("J1.strat");
        strategy.export(&strat).unwrap();
        let exported = fs::read_to_string(&strat).unwrap();
        assert_eq!(exported, "0,1;1 -> 0\n1,0;0 -> 2\n");
    }

    #[test]
    fn reload_replaces_the_whole_table() {
        let dir = tempfile::tempdir().unwrap();
        let sched = dir.path().join("J1.sched");
        let mut strategy = Strategy::new(labels());
        strategy.insert(vec![5, 5], 0, 1);

        fs::write(
            &sched,
            "move=2\t& laneA=1\t& laneB=1\t& action=0\t& choice={action1 }\n",
        )
        .unwrap();
        strategy.load_scheduler(&sched).unwrap();
        assert_eq!(strategy.len(), 1);
        assert_eq!(strategy.action(&[5, 5], 0), None);
        assert_eq!(strategy.action(&[1, 1], 0), Some(1));
    }

    #[test]
    fn missing_scheduler_file_is_an_error() {
        let mut strategy = Strategy::new(labels());
        assert!(strategy
            .load_scheduler(Path::new("/nonexistent/J1.sched"))
            .is_err());
    }
}
