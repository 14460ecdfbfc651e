//! Interactive resolver for conflicting duplicate sets.

use archive_dedup::core::cluster::ConflictCluster;
use archive_dedup::core::record::Observation;
use archive_dedup::core::resolver::{Resolution, Resolver};
use console::{style, Term};

/// Asks on the terminal which cluster's metadata is right
pub struct ConsoleResolver {
    term: Term,
}

impl ConsoleResolver {
    pub fn new(term: Term) -> Self {
        Self { term }
    }

    fn show(&self, clusters: &[ConflictCluster]) {
        let term = &self.term;
        term.write_line("").ok();
        term.write_line(&format!(
            "{} These copies are identical but disagree on when or where they were taken:",
            style("?").yellow().bold()
        ))
        .ok();

        for (i, cluster) in clusters.iter().enumerate() {
            term.write_line(&format!(
                "  {} {}",
                style(format!("[{}]", i + 1)).cyan(),
                describe(&cluster.resolved())
            ))
            .ok();
            for path in cluster.paths() {
                term.write_line(&format!("      {}", path.display())).ok();
            }
        }
    }
}

impl Resolver for ConsoleResolver {
    /// A cluster number keeps that cluster; `s` or an empty line skips the set
    fn resolve(&mut self, clusters: &[ConflictCluster]) -> Option<Resolution> {
        self.show(clusters);

        loop {
            self.term
                .write_str(&format!("  Keep which [1-{}], or (s)kip? ", clusters.len()))
                .ok();
            let answer = match self.term.read_line() {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Cannot read answer, deferring set: {}", e);
                    return None;
                }
            };

            match parse_choice(&answer, clusters.len()) {
                Choice::Skip => return None,
                Choice::Keep(index) => return Resolution::keep_cluster(clusters, index),
                Choice::Invalid => {
                    self.term
                        .write_line(&format!("  {}", style("Please enter a listed number or s").red()))
                        .ok();
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Choice {
    Keep(usize),
    Skip,
    Invalid,
}

fn parse_choice(answer: &str, clusters: usize) -> Choice {
    let answer = answer.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("s") || answer.eq_ignore_ascii_case("skip") {
        return Choice::Skip;
    }
    match answer.parse::<usize>() {
        Ok(n) if (1..=clusters).contains(&n) => Choice::Keep(n - 1),
        _ => Choice::Invalid,
    }
}

/// One-line summary of a cluster's timestamp and place
pub fn describe(observation: &Observation) -> String {
    let when = observation
        .timestamp
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "no date".to_string());
    let at = observation
        .geotag
        .map(|g| g.to_string())
        .unwrap_or_else(|| "no location".to_string());
    format!("{} @ {}", when, at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_are_one_based() {
        assert_eq!(parse_choice("1\n", 2), Choice::Keep(0));
        assert_eq!(parse_choice(" 2 ", 2), Choice::Keep(1));
        assert_eq!(parse_choice("3", 2), Choice::Invalid);
        assert_eq!(parse_choice("0", 2), Choice::Invalid);
    }

    #[test]
    fn empty_or_s_skips() {
        assert_eq!(parse_choice("", 2), Choice::Skip);
        assert_eq!(parse_choice("S", 2), Choice::Skip);
        assert_eq!(parse_choice("skip", 2), Choice::Skip);
        assert_eq!(parse_choice("keep", 2), Choice::Invalid);
    }

    #[test]
    fn describe_handles_missing_fields() {
        assert_eq!(describe(&Observation::default()), "no date @ no location");
    }
}
