//! Structured command lines
//!
//! `systemctl show --property=ExecStart` renders the live command line as
//!
//! ```text
//! { path=/usr/bin/geth ; argv[]=/usr/bin/geth --mainnet --authrpc.jwtsecret /var/lib/ethereum/jwttoken ; ignore_errors=no ; ... }
//! ```
//!
//! [`ExecCommandLine::from_exec_start`] turns that into `{path, argv}`, and
//! the flag lookups answer "is this flag configured" without scraping text.
//! Flags match with one or two leading dashes, as `--flag value` or
//! `--flag=value`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCommandLine {
    pub path: String,
    /// Full argument vector, `argv[0]` included
    pub argv: Vec<String>,
}

/// Split a command string into words, honouring single and double quotes
pub fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) if c == '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            Some(_) => current.push(c),
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        in_word = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

fn flag_name(token: &str) -> Option<&str> {
    if !token.starts_with('-') || token == "-" || token == "--" {
        return None;
    }
    let name = token.trim_start_matches('-');
    Some(name.split_once('=').map(|(n, _)| n).unwrap_or(name))
}

impl ExecCommandLine {
    pub fn new(path: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            path: path.into(),
            argv,
        }
    }

    /// Parse systemd's `ExecStart` property value. Returns `None` when the
    /// value has no `argv[]` entry (unit without ExecStart, or not loaded).
    pub fn from_exec_start(value: &str) -> Option<Self> {
        let body = value
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .trim();

        let mut path = None;
        let mut argv = None;
        for field in body.split(" ; ") {
            let field = field.trim();
            if let Some(p) = field.strip_prefix("path=") {
                path = Some(p.trim().to_string());
            } else if let Some(a) = field.strip_prefix("argv[]=") {
                argv = Some(split_words(a));
            }
        }

        let argv = argv.filter(|a| !a.is_empty())?;
        let path = path.unwrap_or_else(|| argv[0].clone());
        Some(Self { path, argv })
    }

    /// Parse a plain command string such as `/usr/bin/geth --mainnet`
    pub fn from_command(command: &str) -> Option<Self> {
        let argv = split_words(command);
        let path = argv.first()?.clone();
        Some(Self { path, argv })
    }

    /// Arguments after `argv[0]`
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    /// `--flag`, `-flag`, `--flag=...` all count as present
    pub fn has_flag(&self, flag: &str) -> bool {
        let wanted = flag.trim_start_matches('-');
        self.args().iter().any(|t| flag_name(t) == Some(wanted))
    }

    /// Value given as `--flag=value` or `--flag value`
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let wanted = flag.trim_start_matches('-');
        let args = self.args();
        for (i, token) in args.iter().enumerate() {
            if flag_name(token) != Some(wanted) {
                continue;
            }
            if let Some((_, value)) = token.split_once('=') {
                return Some(value);
            }
            return args
                .get(i + 1)
                .filter(|next| flag_name(next).is_none())
                .map(String::as_str);
        }
        None
    }

    /// The command line as a single shell-ish string
    pub fn display(&self) -> String {
        self.argv
            .iter()
            .map(|a| {
                if a.contains(char::is_whitespace) {
                    format!("\"{}\"", a)
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GETH_EXEC: &str = "{ path=/usr/bin/geth ; argv[]=/usr/bin/geth --mainnet --http --authrpc.jwtsecret /var/lib/ethereum/jwttoken --datadir=/var/lib/goethereum ; ignore_errors=no ; start_time=[Mon 2022-04-18 10:00:00 UTC] ; stop_time=[n/a] ; pid=1234 ; code=(null) ; status=0/0 }";

    #[test]
    fn test_parse_exec_start() {
        let cmd = ExecCommandLine::from_exec_start(GETH_EXEC).unwrap();
        assert_eq!(cmd.path, "/usr/bin/geth");
        assert_eq!(cmd.argv[0], "/usr/bin/geth");
        assert_eq!(cmd.args().len(), 5);
    }

    #[test]
    fn test_flag_lookup_forms() {
        let cmd = ExecCommandLine::from_exec_start(GETH_EXEC).unwrap();
        assert!(cmd.has_flag("--authrpc.jwtsecret"));
        assert!(cmd.has_flag("--http"));
        assert!(!cmd.has_flag("--http.api"));
        assert_eq!(cmd.flag_value("--authrpc.jwtsecret"), Some("/var/lib/ethereum/jwttoken"));
        assert_eq!(cmd.flag_value("datadir"), Some("/var/lib/goethereum"));
        // next token is another flag, not a value
        assert_eq!(cmd.flag_value("--http"), None);
    }

    #[test]
    fn test_single_dash_flag_counts() {
        let cmd = ExecCommandLine::from_command("/usr/bin/geth -authrpc.jwtsecret=/tmp/jwt").unwrap();
        assert!(cmd.has_flag("--authrpc.jwtsecret"));
        assert_eq!(cmd.flag_value("--authrpc.jwtsecret"), Some("/tmp/jwt"));
    }

    #[test]
    fn test_flag_only_matches_arguments() {
        let cmd = ExecCommandLine::from_command("--execution-jwt").unwrap();
        assert!(!cmd.has_flag("--execution-jwt"));
    }

    #[test]
    fn test_empty_exec_start() {
        assert!(ExecCommandLine::from_exec_start("").is_none());
        assert!(ExecCommandLine::from_exec_start("{ path= ; argv[]= }").is_none());
    }

    #[test]
    fn test_split_words_quotes() {
        assert_eq!(
            split_words(r#"/bin/app --name "two words" --x='a b' plain"#),
            vec!["/bin/app", "--name", "two words", "--x=a b", "plain"]
        );
    }

    #[test]
    fn test_display_quotes_spaced_args() {
        let cmd = ExecCommandLine::from_command(r#"/usr/bin/geth --datadir "/var/lib/my node" --http"#).unwrap();
        assert_eq!(cmd.display(), r#"/usr/bin/geth --datadir "/var/lib/my node" --http"#);
    }
}
