//! Target and Argument Validation
//!
//! This module turns untrusted caller strings into data that can safely be
//! handed to process creation. Nothing here is ever interpreted by a shell;
//! the checks exist so that a wrapped utility only ever sees in-scope
//! targets and a narrow, predictable argument grammar.
//!
//! # Rules
//!
//! 1. **Targets**: an IPv4 address or CIDR fully inside RFC1918 space, or a
//!    hostname under the internal-lab suffix
//! 2. **Tokens**: shell-word split, then every token restricted to letters,
//!    digits and `. : / = + - , @ %`
//! 3. **Metacharacters**: rejected on the raw string, so quoting cannot hide them
//! 4. **Flags**: when a tool declares allowed prefixes, every `-` token must
//!    start with one of them

use super::invocation::ErrorKind;
use std::fmt;
use std::net::Ipv4Addr;

/// Default internal-lab hostname suffix
pub const DEFAULT_LAB_SUFFIX: &str = ".lab.internal";

/// Default cap on the raw argument string, in characters
pub const DEFAULT_MAX_ARGUMENT_LENGTH: usize = 2048;

/// Characters that are never accepted, quoted or not
///
/// - ; : Command separator
/// - & : Background execution
/// - | : Pipe
/// - ` : Command substitution
/// - $ : Variable expansion
/// - < > : Redirection
/// - \n \r : Line separators
const DENYLISTED_METACHARACTERS: [char; 9] = [';', '&', '|', '`', '$', '>', '<', '\n', '\r'];

/// Punctuation allowed inside a token besides ASCII letters and digits
const ALLOWED_PUNCTUATION: [char; 9] = ['.', ':', '/', '=', '+', '-', ',', '@', '%'];

/// RFC1918 blocks as (network, prefix length)
const PRIVATE_BLOCKS: [(Ipv4Addr, u8); 3] = [
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
];

/// Error types for target and argument validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Target '{0}' is outside the approved address space")]
    TargetNotAllowed(String),

    #[error("Target '{target}' {reason}")]
    TargetShape { target: String, reason: String },

    #[error("Network range /{prefix} is larger than the allowed /{min_prefix}")]
    RangeTooLarge { prefix: u8, min_prefix: u8 },

    #[error("Argument string contains shell metacharacter {0:?}")]
    ShellMetacharacter(char),

    #[error("Argument '{token}' contains disallowed character {ch:?}")]
    DisallowedCharacter { token: String, ch: char },

    #[error("Argument string contains an empty token")]
    EmptyToken,

    #[error("Argument string has unbalanced quotes or a trailing escape")]
    UnbalancedQuotes,

    #[error("Argument string is {len} characters, limit is {max}")]
    ArgumentsTooLong { len: usize, max: usize },

    #[error("Flag '{0}' is not in the allowed set for this tool")]
    FlagNotAllowed(String),

    #[error("One of the flags {0} is required")]
    MissingRequiredFlag(String),

    #[error("Mode '{0}' is not allowed for this tool")]
    ModeNotAllowed(String),

    #[error("A mode is required; allowed modes are {0}")]
    MissingMode(String),

    #[error("Mode '{second}' given after mode '{first}'")]
    DuplicateMode { first: String, second: String },

    #[error("Exactly one service is required; allowed services are {0}")]
    MissingService(String),
}

impl ValidationError {
    /// Map onto the gateway error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::TargetNotAllowed(_)
            | ValidationError::TargetShape { .. }
            | ValidationError::RangeTooLarge { .. } => ErrorKind::InvalidTarget,
            ValidationError::ShellMetacharacter(_)
            | ValidationError::DisallowedCharacter { .. }
            | ValidationError::EmptyToken
            | ValidationError::UnbalancedQuotes
            | ValidationError::ArgumentsTooLong { .. } => ErrorKind::DisallowedToken,
            ValidationError::FlagNotAllowed(_) | ValidationError::MissingRequiredFlag(_) => {
                ErrorKind::FlagNotAllowed
            }
            ValidationError::ModeNotAllowed(_)
            | ValidationError::MissingMode(_)
            | ValidationError::DuplicateMode { .. }
            | ValidationError::MissingService(_) => ErrorKind::ModeNotAllowed,
        }
    }
}

/// Shape of a target that passed policy checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    Address(Ipv4Addr),
    Network { address: Ipv4Addr, prefix: u8 },
    Hostname(String),
}

impl TargetKind {
    pub fn is_hostname(&self) -> bool {
        matches!(self, TargetKind::Hostname(_))
    }
}

/// Which targets the gateway may touch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPolicy {
    lab_suffix: String,
}

impl Default for TargetPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LAB_SUFFIX)
    }
}

impl TargetPolicy {
    /// Create a policy for a lab suffix; a missing leading dot is added
    pub fn new(lab_suffix: &str) -> Self {
        let suffix = lab_suffix.trim().to_ascii_lowercase();
        let lab_suffix = if suffix.starts_with('.') {
            suffix
        } else {
            format!(".{}", suffix)
        };
        Self { lab_suffix }
    }

    pub fn lab_suffix(&self) -> &str {
        &self.lab_suffix
    }

    /// Whether the target is in scope
    pub fn allows(&self, target: &str) -> bool {
        self.check(target).is_ok()
    }

    /// Classify the target, failing with `TargetNotAllowed` when out of scope
    pub fn check(&self, target: &str) -> Result<TargetKind, ValidationError> {
        let rejected = || ValidationError::TargetNotAllowed(target.to_string());

        if let Some((address, prefix)) = target.split_once('/') {
            let address: Ipv4Addr = address.parse().map_err(|_| rejected())?;
            let prefix: u8 = parse_prefix(prefix).ok_or_else(rejected)?;
            if !within_private_space(address, prefix) {
                return Err(rejected());
            }
            return Ok(TargetKind::Network { address, prefix });
        }

        if let Ok(address) = target.parse::<Ipv4Addr>() {
            if !within_private_space(address, 32) {
                return Err(rejected());
            }
            return Ok(TargetKind::Address(address));
        }

        if self.is_lab_hostname(target) {
            return Ok(TargetKind::Hostname(target.to_ascii_lowercase()));
        }

        Err(rejected())
    }

    fn is_lab_hostname(&self, target: &str) -> bool {
        if target.is_empty() || target.len() > 253 {
            return false;
        }
        let lowered = target.to_ascii_lowercase();
        let Some(host) = lowered.strip_suffix(self.lab_suffix.as_str()) else {
            return false;
        };
        !host.is_empty() && lowered.split('.').all(is_valid_label)
    }
}

fn parse_prefix(raw: &str) -> Option<u8> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u8>().ok().filter(|prefix| *prefix <= 32)
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn network_bits(address: Ipv4Addr, prefix: u8) -> u32 {
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    u32::from(address) & mask
}

/// Whether every address of `address/prefix` lies in one RFC1918 block
fn within_private_space(address: Ipv4Addr, prefix: u8) -> bool {
    PRIVATE_BLOCKS.iter().any(|(block, block_prefix)| {
        prefix >= *block_prefix && network_bits(address, *block_prefix) == u32::from(*block)
    })
}

/// Check a target against the default lab policy
///
/// # Example
///
/// ```
/// use scangate::tools::validate_target;
///
/// assert!(validate_target("10.1.2.3"));
/// assert!(validate_target("192.168.0.0/24"));
/// assert!(validate_target("web01.lab.internal"));
/// assert!(!validate_target("8.8.8.8"));
/// assert!(!validate_target("10.0.0.0/7"));
/// ```
pub fn validate_target(target: &str) -> bool {
    TargetPolicy::default().allows(target)
}

/// Tokenize and check a caller argument string with the default length cap
pub fn validate_arguments(
    arguments: &str,
    allowed_flag_prefixes: Option<&[String]>,
) -> Result<Vec<String>, ValidationError> {
    validate_arguments_with_limit(arguments, allowed_flag_prefixes, DEFAULT_MAX_ARGUMENT_LENGTH)
}

/// Tokenize and check a caller argument string
///
/// # Example
///
/// ```
/// use scangate::tools::validate_arguments;
///
/// let allowed = vec!["-p".to_string()];
/// assert!(validate_arguments("-p80 value", Some(&allowed)).is_ok());
/// assert!(validate_arguments("-x", Some(&allowed)).is_err());
/// ```
pub fn validate_arguments_with_limit(
    arguments: &str,
    allowed_flag_prefixes: Option<&[String]>,
    max_length: usize,
) -> Result<Vec<String>, ValidationError> {
    let length = arguments.chars().count();
    if length > max_length {
        return Err(ValidationError::ArgumentsTooLong {
            len: length,
            max: max_length,
        });
    }

    if let Some(ch) = arguments
        .chars()
        .find(|c| DENYLISTED_METACHARACTERS.contains(c))
    {
        return Err(ValidationError::ShellMetacharacter(ch));
    }

    // Splitter syntax (quotes, escapes, blanks) is the only thing allowed
    // besides token characters; this keeps comment markers and globs out.
    if let Some(ch) = arguments
        .chars()
        .find(|c| !is_token_char(*c) && !matches!(c, ' ' | '\t' | '\'' | '"' | '\\'))
    {
        return Err(ValidationError::DisallowedCharacter {
            token: arguments.to_string(),
            ch,
        });
    }

    let tokens = shlex::split(arguments).ok_or(ValidationError::UnbalancedQuotes)?;

    for token in &tokens {
        check_token(token)?;
        if let Some(prefixes) = allowed_flag_prefixes {
            if is_flag(token) && !prefixes.iter().any(|p| token.starts_with(p.as_str())) {
                return Err(ValidationError::FlagNotAllowed(token.clone()));
            }
        }
    }

    Ok(tokens)
}

/// Whether a token is flag-like
pub fn is_flag(token: &str) -> bool {
    token.starts_with('-')
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ALLOWED_PUNCTUATION.contains(&c)
}

fn check_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        return Err(ValidationError::EmptyToken);
    }
    if let Some(ch) = token.chars().find(|c| !is_token_char(*c)) {
        return Err(ValidationError::DisallowedCharacter {
            token: token.to_string(),
            ch,
        });
    }
    Ok(())
}

/// A fully resolved command line that passed validation
///
/// Only the specialization layer builds these, so the executor never sees
/// an argument vector that skipped the checks above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCommand {
    program: String,
    args: Vec<String>,
    target: String,
}

impl ValidatedCommand {
    pub(crate) fn new(program: impl Into<String>, args: Vec<String>, target: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            target: target.into(),
        }
    }

    /// Executable name, resolved against the sandbox path at spawn time
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for ValidatedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn prefixes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_private_addresses_accepted() {
        for target in [
            "10.0.0.1",
            "10.255.255.255",
            "172.16.0.1",
            "172.31.255.254",
            "192.168.1.10",
        ] {
            assert!(validate_target(target), "should accept {}", target);
        }
    }

    #[test]
    fn test_public_and_edge_addresses_rejected() {
        for target in [
            "8.8.8.8",
            "172.15.255.255",
            "172.32.0.1",
            "192.169.0.1",
            "127.0.0.1",
            "0.0.0.0",
            "11.0.0.1",
        ] {
            assert!(!validate_target(target), "should reject {}", target);
        }
    }

    #[test]
    fn test_cidr_must_fit_inside_one_block() {
        assert!(validate_target("10.0.0.0/8"));
        assert!(validate_target("10.20.0.0/16"));
        assert!(validate_target("172.16.0.0/12"));
        assert!(validate_target("192.168.10.0/24"));
        assert!(validate_target("192.168.10.7/32"));

        assert!(!validate_target("10.0.0.0/7"));
        assert!(!validate_target("172.16.0.0/11"));
        assert!(!validate_target("192.168.0.0/15"));
        assert!(!validate_target("0.0.0.0/0"));
        assert!(!validate_target("10.0.0.0/33"));
        assert!(!validate_target("10.0.0.0/"));
        assert!(!validate_target("10.0.0.0/+8"));
    }

    #[test]
    fn test_lab_hostnames() {
        assert!(validate_target("host.lab.internal"));
        assert!(validate_target("WEB-01.Dmz.lab.internal"));

        assert!(!validate_target("lab.internal"));
        assert!(!validate_target(".lab.internal"));
        assert!(!validate_target("host.lab.internal.evil.com"));
        assert!(!validate_target("hostlab.internal"));
        assert!(!validate_target("-bad.lab.internal"));
        assert!(!validate_target("a..b.lab.internal"));
        assert!(!validate_target("under_score.lab.internal"));
        assert!(!validate_target("example.com"));
        assert!(!validate_target(""));
    }

    #[test]
    fn test_custom_lab_suffix() {
        let policy = TargetPolicy::new("corp.test");
        assert_eq!(policy.lab_suffix(), ".corp.test");
        assert!(policy.allows("db.corp.test"));
        assert!(!policy.allows("db.lab.internal"));
    }

    #[test]
    fn test_check_classifies_targets() {
        let policy = TargetPolicy::default();
        assert_eq!(
            policy.check("10.0.0.9").unwrap(),
            TargetKind::Address(Ipv4Addr::new(10, 0, 0, 9))
        );
        assert_eq!(
            policy.check("10.0.0.0/24").unwrap(),
            TargetKind::Network {
                address: Ipv4Addr::new(10, 0, 0, 0),
                prefix: 24
            }
        );
        assert!(policy.check("Host.Lab.Internal").unwrap().is_hostname());
        assert_eq!(
            policy.check("1.1.1.1").unwrap_err().kind(),
            ErrorKind::InvalidTarget
        );
    }

    #[test]
    fn test_arguments_tokenized_with_quotes() {
        let tokens = validate_arguments("-p 80,443 'http://10.0.0.1/a' \"x y\"", None);
        // The space inside the double-quoted token is not a token character.
        assert_eq!(tokens.unwrap_err().kind(), ErrorKind::DisallowedToken);

        let tokens = validate_arguments("-p 80,443 'http://10.0.0.1/a'", None).unwrap();
        assert_eq!(tokens, vec!["-p", "80,443", "http://10.0.0.1/a"]);
    }

    #[test]
    fn test_metacharacters_rejected_even_when_quoted() {
        for args in [
            "'a;b'",
            "\"a&b\"",
            "'x|y'",
            "'`id`'",
            "'$HOME'",
            "'a>b'",
            "'a<b'",
            "'a\nb'",
            "'a\rb'",
            "-p 80; id",
        ] {
            let err = validate_arguments(args, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DisallowedToken, "args: {:?}", args);
        }
    }

    #[test]
    fn test_disallowed_characters() {
        for args in ["a*b", "#comment", "x_y", "(a)", "a!b", "~/x"] {
            let err = validate_arguments(args, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DisallowedToken, "args: {:?}", args);
        }
    }

    #[test]
    fn test_empty_token_and_unbalanced_quotes() {
        assert_eq!(
            validate_arguments("-p ''", None).unwrap_err(),
            ValidationError::EmptyToken
        );
        assert_eq!(
            validate_arguments("-p '80", None).unwrap_err(),
            ValidationError::UnbalancedQuotes
        );
    }

    #[test]
    fn test_length_cap() {
        let long = "a".repeat(DEFAULT_MAX_ARGUMENT_LENGTH + 1);
        assert!(matches!(
            validate_arguments(&long, None),
            Err(ValidationError::ArgumentsTooLong { .. })
        ));
        let exact = "a".repeat(DEFAULT_MAX_ARGUMENT_LENGTH);
        assert!(validate_arguments(&exact, None).is_ok());
        assert!(validate_arguments_with_limit("abcdef", None, 5).is_err());
    }

    #[test]
    fn test_allowed_flag_prefixes() {
        let allowed = prefixes(&["-p"]);
        let err = validate_arguments("-x", Some(&allowed)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FlagNotAllowed);

        assert_eq!(
            validate_arguments("-p80", Some(&allowed)).unwrap(),
            vec!["-p80"]
        );
        assert_eq!(
            validate_arguments("value", Some(&allowed)).unwrap(),
            vec!["value"]
        );
    }

    #[test]
    fn test_no_prefix_set_accepts_any_flag() {
        let tokens = validate_arguments("-x --anything=1", None).unwrap();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_empty_argument_string() {
        assert!(validate_arguments("", None).unwrap().is_empty());
        assert!(validate_arguments("   ", None).unwrap().is_empty());
    }

    #[test]
    fn test_validated_command_display() {
        let command = ValidatedCommand::new(
            "nmap",
            vec!["-sV".to_string(), "10.0.0.1".to_string()],
            "10.0.0.1",
        );
        assert_eq!(command.to_string(), "nmap -sV 10.0.0.1");
        assert_eq!(command.target(), "10.0.0.1");
    }

    proptest! {
        #[test]
        fn prop_public_addresses_rejected(raw in any::<u32>()) {
            let address = Ipv4Addr::from(raw);
            prop_assume!(!address.is_private());
            prop_assert!(!validate_target(&address.to_string()));
        }

        #[test]
        fn prop_non_lab_hostnames_rejected(host in "[a-z][a-z0-9-]{0,20}\\.(com|net|org|local|internal)") {
            prop_assert!(!validate_target(&host));
        }

        #[test]
        fn prop_metacharacter_anywhere_rejected(
            prefix in "[a-z0-9-]{0,10}",
            meta in prop::sample::select(DENYLISTED_METACHARACTERS.to_vec()),
            suffix in "[a-z0-9-]{0,10}",
        ) {
            let quoted = format!("'{}{}{}'", prefix, meta, suffix);
            let err = validate_arguments(&quoted, None).unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::DisallowedToken);
        }

        #[test]
        fn prop_safe_tokens_roundtrip(tokens in prop::collection::vec("[a-zA-Z0-9./:=+,@%-]{1,12}", 0..6)) {
            let joined = tokens.join(" ");
            let parsed = validate_arguments(&joined, None).unwrap();
            prop_assert_eq!(parsed, tokens);
        }
    }
}
