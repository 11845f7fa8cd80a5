//! Operator prompts
//!
//! Every question has a fixed set of answers. Empty input takes the shown
//! default; anything unrecognised asks again.

use console::Term;
use nodekeeper_common::Network;
use owo_colors::OwoColorize;
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

/// What to do about a service that did not turn healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationChoice {
    Retry,
    ProceedAnyway,
    Quit,
}

/// What to do after a step's command failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureChoice {
    Retry,
    Quit,
}

pub trait Prompter: Send + Sync {
    fn choose_network(&self, default: Network) -> io::Result<Network>;
    fn confirm(&self, question: &str, default: bool) -> io::Result<bool>;
    fn verification_choice(&self, service: &str, last_status: &str) -> io::Result<VerificationChoice>;
    fn failure_choice(&self, what: &str, reason: &str) -> io::Result<FailureChoice>;
}

pub fn parse_yes_no(input: &str, default: bool) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Number from the printed list, or a network name
pub fn parse_network(input: &str, default: Network) -> Option<Network> {
    let input = input.trim();
    if input.is_empty() {
        return Some(default);
    }
    if let Ok(n) = input.parse::<usize>() {
        return Network::ALL.get(n.checked_sub(1)?).copied();
    }
    input.parse().ok()
}

pub fn parse_verification_choice(input: &str) -> Option<VerificationChoice> {
    match input.trim().to_lowercase().as_str() {
        "" | "r" | "retry" => Some(VerificationChoice::Retry),
        "p" | "proceed" => Some(VerificationChoice::ProceedAnyway),
        "q" | "quit" => Some(VerificationChoice::Quit),
        _ => None,
    }
}

pub fn parse_failure_choice(input: &str) -> Option<FailureChoice> {
    match input.trim().to_lowercase().as_str() {
        "" | "r" | "retry" => Some(FailureChoice::Retry),
        "q" | "quit" => Some(FailureChoice::Quit),
        _ => None,
    }
}

/// Prompts on the controlling terminal
pub struct ConsolePrompter {
    term: Term,
}

impl ConsolePrompter {
    pub fn new() -> Self {
        Self { term: Term::stdout() }
    }

    fn ask<T>(&self, prompt: &str, parse: impl Fn(&str) -> Option<T>) -> io::Result<T> {
        loop {
            self.term.write_str(&format!("{} ", prompt))?;
            let input = self.term.read_line()?;
            if let Some(answer) = parse(&input) {
                return Ok(answer);
            }
            self.term
                .write_line(&format!("   {}", "Please pick one of the listed answers.".yellow()))?;
        }
    }
}

impl Default for ConsolePrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for ConsolePrompter {
    fn choose_network(&self, default: Network) -> io::Result<Network> {
        self.term.write_line("")?;
        self.term
            .write_line(&format!("{}  {}", "?".bright_cyan().bold(), "Which network should the node follow?".bold()))?;
        for (i, network) in Network::ALL.iter().enumerate() {
            let marker = if *network == default { " (default)" } else { "" };
            self.term
                .write_line(&format!("   {}  {}{}", format!("[{}]", i + 1).cyan(), network, marker.dimmed()))?;
        }
        self.ask(">", |input| parse_network(input, default))
    }

    fn confirm(&self, question: &str, default: bool) -> io::Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        self.ask(&format!("{}  {} {}", "?".bright_cyan().bold(), question, hint.dimmed()), |input| {
            parse_yes_no(input, default)
        })
    }

    fn verification_choice(&self, service: &str, last_status: &str) -> io::Result<VerificationChoice> {
        self.term.write_line("")?;
        self.term.write_line(&format!(
            "{}  {} {}",
            "!".yellow().bold(),
            service.bold(),
            "did not report healthy.".yellow()
        ))?;
        if !last_status.is_empty() {
            self.term.write_line(&format!("   last status: {}", last_status.dimmed()))?;
        }
        self.term.write_line(&format!(
            "   {} retry   {} proceed anyway   {} quit",
            "[r]".cyan(),
            "[p]".cyan(),
            "[q]".cyan()
        ))?;
        self.ask(">", parse_verification_choice)
    }

    fn failure_choice(&self, what: &str, reason: &str) -> io::Result<FailureChoice> {
        self.term.write_line("")?;
        self.term
            .write_line(&format!("{}  {} {}", "✗".red().bold(), what.bold(), "failed.".red()))?;
        if !reason.is_empty() {
            self.term.write_line(&format!("   {}", reason.dimmed()))?;
        }
        self.term
            .write_line(&format!("   {} retry   {} quit", "[r]".cyan(), "[q]".cyan()))?;
        self.ask(">", parse_failure_choice)
    }
}

/// Answers from a fixed script, for runs without a terminal
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    networks: Mutex<VecDeque<Network>>,
    confirms: Mutex<VecDeque<bool>>,
    choices: Mutex<VecDeque<VerificationChoice>>,
    failures: Mutex<VecDeque<FailureChoice>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(self, network: Network) -> Self {
        if let Ok(mut q) = self.networks.lock() {
            q.push_back(network);
        }
        self
    }

    pub fn confirm_answer(self, answer: bool) -> Self {
        if let Ok(mut q) = self.confirms.lock() {
            q.push_back(answer);
        }
        self
    }

    pub fn choice(self, choice: VerificationChoice) -> Self {
        if let Ok(mut q) = self.choices.lock() {
            q.push_back(choice);
        }
        self
    }

    pub fn on_failure(self, choice: FailureChoice) -> Self {
        if let Ok(mut q) = self.failures.lock() {
            q.push_back(choice);
        }
        self
    }

    fn next<T>(queue: &Mutex<VecDeque<T>>, what: &str) -> io::Result<T> {
        queue
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, format!("no scripted {} left", what)))
    }
}

impl Prompter for ScriptedPrompter {
    fn choose_network(&self, _default: Network) -> io::Result<Network> {
        Self::next(&self.networks, "network")
    }

    fn confirm(&self, _question: &str, _default: bool) -> io::Result<bool> {
        Self::next(&self.confirms, "confirmation")
    }

    fn verification_choice(&self, _service: &str, _last_status: &str) -> io::Result<VerificationChoice> {
        Self::next(&self.choices, "verification choice")
    }

    fn failure_choice(&self, _what: &str, _reason: &str) -> io::Result<FailureChoice> {
        Self::next(&self.failures, "failure choice")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_no() {
        assert_eq!(parse_yes_no("", true), Some(true));
        assert_eq!(parse_yes_no(" N ", true), Some(false));
        assert_eq!(parse_yes_no("maybe", true), None);
    }

    #[test]
    fn test_network_by_number_or_name() {
        assert_eq!(parse_network("", Network::Holesky), Some(Network::Holesky));
        assert_eq!(parse_network("1", Network::Holesky), Some(Network::Mainnet));
        assert_eq!(parse_network("sepolia", Network::Mainnet), Some(Network::Sepolia));
        assert_eq!(parse_network("0", Network::Mainnet), None);
        assert_eq!(parse_network("9", Network::Mainnet), None);
    }

    #[test]
    fn test_verification_choice() {
        assert_eq!(parse_verification_choice(""), Some(VerificationChoice::Retry));
        assert_eq!(parse_verification_choice("P"), Some(VerificationChoice::ProceedAnyway));
        assert_eq!(parse_verification_choice("quit"), Some(VerificationChoice::Quit));
        assert_eq!(parse_verification_choice("x"), None);
    }

    #[test]
    fn test_failure_choice() {
        assert_eq!(parse_failure_choice(""), Some(FailureChoice::Retry));
        assert_eq!(parse_failure_choice(" Q "), Some(FailureChoice::Quit));
        assert_eq!(parse_failure_choice("proceed"), None);
    }

    #[test]
    fn test_scripted_runs_out() {
        let p = ScriptedPrompter::new().confirm_answer(true);
        assert!(p.confirm("?", false).unwrap());
        assert!(p.confirm("?", false).is_err());
    }
}
