//! Bootstrap script assembly and the `PROGRESS:<pct>:<msg>` / `DONE` protocol.

use super::steps::Step;

pub const DONE: &str = "DONE";

/// First and last percentages reported by the script itself. The provisioner
/// reports below the first before the script runs and 100 once validated.
pub const SCRIPT_START: u8 = 10;
pub const SCRIPT_END: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLine<'a> {
    Progress { percent: u8, message: &'a str },
    Done,
    Log(&'a str),
}

pub fn parse_line(line: &str) -> ScriptLine<'_> {
    let trimmed = line.trim_end();
    if trimmed == DONE {
        return ScriptLine::Done;
    }
    let progress = trimmed.strip_prefix("PROGRESS:").and_then(|rest| {
        let (pct, message) = rest.split_once(':').unwrap_or((rest, ""));
        let percent = pct.trim().parse::<u8>().ok().filter(|p| *p <= 100)?;
        Some(ScriptLine::Progress { percent, message })
    });
    progress.unwrap_or(ScriptLine::Log(line))
}

fn percent_for(index: usize, total: usize) -> u8 {
    let span = (SCRIPT_END - SCRIPT_START) as usize;
    SCRIPT_START + (span * index / total.max(1)) as u8
}

/// One `bash` script running every step in order. Stops at the first failing
/// step; prints `DONE` only when all of them succeeded.
pub fn render(steps: &[Step]) -> String {
    let mut script = String::from("set -e\nexport DEBIAN_FRONTEND=noninteractive\n");
    for (i, step) in steps.iter().enumerate() {
        script.push_str(&format!(
            "echo 'PROGRESS:{}:{}'\n{}\n",
            percent_for(i, steps.len()),
            step.kind.describe(),
            step.script
        ));
    }
    script.push_str(&format!(
        "echo 'PROGRESS:{}:Bootstrap finished'\necho {}\n",
        SCRIPT_END, DONE
    ));
    script
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::provision::steps::StepKind;

    fn markers(script: &str) -> Vec<u8> {
        script
            .lines()
            .filter_map(|l| l.strip_prefix("echo '"))
            .filter_map(|l| match parse_line(l.trim_end_matches('\'')) {
                ScriptLine::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_protocol_lines() {
        assert_eq!(
            parse_line("PROGRESS:40:Installing git"),
            ScriptLine::Progress {
                percent: 40,
                message: "Installing git"
            }
        );
        assert_eq!(parse_line("DONE"), ScriptLine::Done);
        assert_eq!(parse_line("DONE\r"), ScriptLine::Done);
        assert_eq!(parse_line("Reading package lists..."), ScriptLine::Log("Reading package lists..."));
    }

    #[test]
    fn malformed_markers_are_log_lines() {
        assert_eq!(parse_line("PROGRESS:abc:x"), ScriptLine::Log("PROGRESS:abc:x"));
        assert_eq!(parse_line("PROGRESS:250:x"), ScriptLine::Log("PROGRESS:250:x"));
        assert_eq!(parse_line("  DONE with apt"), ScriptLine::Log("  DONE with apt"));
    }

    #[test]
    fn script_ends_with_done() {
        let steps = vec![Step {
            kind: StepKind::Git,
            script: "true".into(),
        }];
        let script = render(&steps);
        assert!(script.starts_with("set -e\n"));
        assert_eq!(script.lines().last(), Some("echo DONE"));
    }

    proptest! {
        #[test]
        fn rendered_progress_is_non_decreasing(n in 1usize..20) {
            let steps: Vec<Step> = (0..n)
                .map(|_| Step { kind: StepKind::Directories, script: "true".into() })
                .collect();
            let seen = markers(&render(&steps));
            prop_assert_eq!(seen.len(), n + 1);
            prop_assert!(seen.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(seen[0], SCRIPT_START);
            prop_assert_eq!(*seen.last().unwrap(), SCRIPT_END);
        }
    }
}
