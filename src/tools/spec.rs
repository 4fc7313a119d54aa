//! Tool Specialization
//!
//! Each wrapped utility is described by a `ToolSpec`: its executable, the
//! flags it may receive, defaults, budgets, and how the validated target is
//! placed on its command line. The per-utility behavior is a tagged
//! `Specialization` chosen when the registry is built.
//!
//! # Patterns
//!
//! - **Simple**: the target goes at the end, behind a flag, or into a
//!   `service://target` URI
//! - **MultiMode**: the utility needs a sub-command (mode) first; the mode
//!   decides which flag carries the target, and that flag is injected when
//!   the caller left it out

use super::circuit_breaker::BreakerConfig;
use super::governor::DEFAULT_CONCURRENCY;
use super::invocation::{ErrorKind, InvocationRequest};
use super::validator::{
    is_flag, validate_arguments_with_limit, TargetKind, TargetPolicy, ValidatedCommand,
    ValidationError,
};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default per-call budget when a tool does not declare one
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// How a target value is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// As given
    Host,
    /// As given, but only hostnames qualify
    Domain,
    /// `http://<target>/`, single hosts only
    HttpUrl,
}

impl TargetFormat {
    fn render(&self, target: &str, kind: &TargetKind) -> Result<String, ValidationError> {
        match self {
            TargetFormat::Host => Ok(target.to_string()),
            TargetFormat::Domain => {
                if kind.is_hostname() {
                    Ok(target.to_string())
                } else {
                    Err(ValidationError::TargetShape {
                        target: target.to_string(),
                        reason: "must be a domain name for this mode".to_string(),
                    })
                }
            }
            TargetFormat::HttpUrl => {
                if matches!(kind, TargetKind::Network { .. }) {
                    Err(ValidationError::TargetShape {
                        target: target.to_string(),
                        reason: "is a network range and cannot be used as a URL".to_string(),
                    })
                } else {
                    Ok(format!("http://{}/", target))
                }
            }
        }
    }
}

/// Where the target lands for a simple tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPlacement {
    /// Appended as the final argument
    Positional,
    /// `<flag> <value>`, injected unless one of `names` is already present
    Flag { names: Vec<String>, format: TargetFormat },
    /// One service token is consumed and `service://target` appended
    ServiceUri { services: Vec<String> },
}

/// One sub-command of a multi-mode tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSpec {
    pub name: String,
    /// Flag names carrying the target in this mode; the first is injected
    pub target_flags: Vec<String>,
    pub format: TargetFormat,
}

impl ModeSpec {
    pub fn new(name: &str, target_flags: &[&str], format: TargetFormat) -> Self {
        Self {
            name: name.to_string(),
            target_flags: target_flags.iter().map(|s| s.to_string()).collect(),
            format,
        }
    }
}

/// Domain-specific checks run after generic validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreCheck {
    /// Target, and any address operand, must be an IPv4 address or a range
    /// no wider than `/min_prefix`
    AddressRange { min_prefix: u8 },
    /// At least one flag starting with one of `prefixes` must be present
    RequireFlag { prefixes: Vec<String> },
    /// Every operand is read by the utility as a target and must be in
    /// scope. Tokens right after one of `value_flags` and the `keywords`
    /// are not operands.
    OperandsAreTargets {
        value_flags: Vec<String>,
        keywords: Vec<String>,
    },
}

impl PreCheck {
    fn apply(&self, ctx: &CommandContext<'_>) -> Result<(), ValidationError> {
        match self {
            PreCheck::AddressRange { min_prefix } => {
                check_address_range(ctx.target, &ctx.target_kind, *min_prefix)?;
                for token in ctx.tokens.iter().filter(|t| !is_flag(t)) {
                    if let Some(address) = embedded_address(token) {
                        let kind = ctx.policy.check(address)?;
                        check_address_range(address, &kind, *min_prefix)?;
                    }
                }
                Ok(())
            }
            PreCheck::RequireFlag { prefixes } => {
                let present = ctx
                    .tokens
                    .iter()
                    .any(|t| is_flag(t) && prefixes.iter().any(|p| t.starts_with(p.as_str())));
                if present {
                    Ok(())
                } else {
                    Err(ValidationError::MissingRequiredFlag(prefixes.join(", ")))
                }
            }
            PreCheck::OperandsAreTargets {
                value_flags,
                keywords,
            } => operands(&ctx.tokens, value_flags)
                .filter(|operand| !keywords.iter().any(|k| k == *operand))
                .try_for_each(|operand| {
                    ctx.policy
                        .check(operand)
                        .map(|_| ())
                        .map_err(|_| ValidationError::TargetNotAllowed(operand.to_string()))
                }),
        }
    }
}

fn check_address_range(
    target: &str,
    kind: &TargetKind,
    min_prefix: u8,
) -> Result<(), ValidationError> {
    match *kind {
        TargetKind::Address(_) => Ok(()),
        TargetKind::Network { prefix, .. } if prefix >= min_prefix => Ok(()),
        TargetKind::Network { prefix, .. } => {
            Err(ValidationError::RangeTooLarge { prefix, min_prefix })
        }
        TargetKind::Hostname(_) => Err(ValidationError::TargetShape {
            target: target.to_string(),
            reason: "must be an IPv4 address or range for this tool".to_string(),
        }),
    }
}

/// Non-flag tokens that are not the value of a preceding `value_flags` flag
fn operands<'t>(
    tokens: &'t [String],
    value_flags: &'t [String],
) -> impl Iterator<Item = &'t str> + 't {
    let mut takes_value = false;
    tokens.iter().filter_map(move |token| {
        if is_flag(token) {
            takes_value = value_flags.iter().any(|f| f == token);
            return None;
        }
        if std::mem::take(&mut takes_value) {
            return None;
        }
        Some(token.as_str())
    })
}

/// The address or CIDR part of a token that starts with an IPv4 address
fn embedded_address(token: &str) -> Option<&str> {
    let candidate = token.split(':').next().unwrap_or(token);
    let address = candidate.split('/').next().unwrap_or(candidate);
    address.parse::<Ipv4Addr>().ok().map(|_| candidate)
}

/// Dotted-quad shapes a scanner expands into many hosts, like `10.0.0.1-50`
fn is_octet_range(token: &str) -> bool {
    token.matches('.').count() >= 3
        && token.bytes().any(|b| matches!(b, b'-' | b',' | b'*'))
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b',' | b'*' | b'/'))
}

/// Addresses, ranges and URLs hidden in the arguments must be in scope
/// like the target itself. Inline `--flag=value` values are included.
fn check_embedded_targets(tokens: &[String], policy: &TargetPolicy) -> Result<(), ValidationError> {
    for token in tokens {
        let value = if is_flag(token) {
            match token.split_once('=') {
                Some((_, value)) => value,
                None => continue,
            }
        } else {
            token.as_str()
        };

        let rejected = || ValidationError::TargetNotAllowed(value.to_string());
        if value.contains("://") {
            policy.check(host_of(value)).map_err(|_| rejected())?;
        } else if let Some(address) = embedded_address(value) {
            policy.check(address).map_err(|_| rejected())?;
        } else if is_octet_range(value) {
            return Err(rejected());
        }
    }
    Ok(())
}

/// Everything the specialization needs to assemble a command
#[derive(Debug, Clone)]
pub struct CommandContext<'a> {
    pub command: &'a str,
    pub target: &'a str,
    pub target_kind: TargetKind,
    pub tokens: Vec<String>,
    pub policy: &'a TargetPolicy,
}

/// Per-tool capabilities
pub trait ToolBehavior {
    /// Checks beyond the generic token grammar
    fn validate_extra(&self, ctx: &CommandContext<'_>) -> Result<(), ValidationError>;

    /// Assemble the final argument vector
    fn build_command(&self, ctx: CommandContext<'_>) -> Result<ValidatedCommand, ValidationError>;
}

/// Tagged per-tool behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specialization {
    Simple { target: TargetPlacement },
    MultiMode { modes: Vec<ModeSpec> },
}

impl Specialization {
    /// Sub-commands or services a caller chooses between, if any
    pub fn allowed_modes(&self) -> Option<Vec<String>> {
        match self {
            Specialization::Simple {
                target: TargetPlacement::ServiceUri { services },
            } => Some(services.clone()),
            Specialization::Simple { .. } => None,
            Specialization::MultiMode { modes } => {
                Some(modes.iter().map(|m| m.name.clone()).collect())
            }
        }
    }
}

impl ToolBehavior for Specialization {
    fn validate_extra(&self, ctx: &CommandContext<'_>) -> Result<(), ValidationError> {
        match self {
            Specialization::Simple { target } => match target {
                TargetPlacement::Positional => Ok(()),
                TargetPlacement::Flag { names, format } => {
                    check_target_flag(ctx, names, *format)
                }
                TargetPlacement::ServiceUri { services } => {
                    find_service(&ctx.tokens, services).map(|_| ())
                }
            },
            Specialization::MultiMode { modes } => {
                let (_, mode) = resolve_mode(&ctx.tokens, modes)?;
                check_target_flag(ctx, &mode.target_flags, mode.format)
            }
        }
    }

    fn build_command(&self, ctx: CommandContext<'_>) -> Result<ValidatedCommand, ValidationError> {
        let CommandContext {
            command,
            target,
            target_kind,
            mut tokens,
            ..
        } = ctx;

        match self {
            Specialization::Simple { target: placement } => match placement {
                TargetPlacement::Positional => tokens.push(target.to_string()),
                TargetPlacement::Flag { names, format } => {
                    inject_target_flag(&mut tokens, names, *format, target, &target_kind)?;
                }
                TargetPlacement::ServiceUri { services } => {
                    let index = find_service(&tokens, services)?;
                    let service = tokens.remove(index);
                    tokens.push(format!("{}://{}", service, target));
                }
            },
            Specialization::MultiMode { modes } => {
                let (index, mode) = resolve_mode(&tokens, modes)?;
                let mode = mode.clone();
                let mode_token = tokens.remove(index);
                tokens.insert(0, mode_token);
                inject_target_flag(&mut tokens, &mode.target_flags, mode.format, target, &target_kind)?;
            }
        }

        Ok(ValidatedCommand::new(command, tokens, target))
    }
}

/// Find the mode token
///
/// The mode is the first non-flag token naming an allowed mode. A non-flag
/// token right after a flag is taken as that flag's value and skipped; any
/// other stray non-flag token before the mode is rejected. A second allowed
/// mode anywhere after the first is rejected.
pub fn resolve_mode<'m>(
    tokens: &[String],
    modes: &'m [ModeSpec],
) -> Result<(usize, &'m ModeSpec), ValidationError> {
    let lookup = |token: &str| modes.iter().find(|m| m.name == token);

    let mut found: Option<(usize, &ModeSpec)> = None;
    let mut previous_was_flag = false;
    for (index, token) in tokens.iter().enumerate() {
        if is_flag(token) {
            previous_was_flag = !token.contains('=');
            continue;
        }
        let value_position = previous_was_flag;
        previous_was_flag = false;

        match lookup(token) {
            Some(mode) => {
                if let Some((_, first)) = found {
                    return Err(ValidationError::DuplicateMode {
                        first: first.name.clone(),
                        second: token.clone(),
                    });
                }
                found = Some((index, mode));
            }
            None if found.is_none() && !value_position => {
                return Err(ValidationError::ModeNotAllowed(token.clone()));
            }
            None => {}
        }
    }

    found.ok_or_else(|| {
        ValidationError::MissingMode(
            modes
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    })
}

fn find_service(tokens: &[String], services: &[String]) -> Result<usize, ValidationError> {
    let mut matches = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !is_flag(t) && services.iter().any(|s| s == *t))
        .map(|(index, _)| index);

    match (matches.next(), matches.next()) {
        (Some(index), None) => Ok(index),
        _ => Err(ValidationError::MissingService(services.join(", "))),
    }
}

/// Where an explicit target flag sits and what value it carries
fn find_target_flag<'t>(tokens: &'t [String], names: &[String]) -> Option<Option<&'t str>> {
    for (index, token) in tokens.iter().enumerate() {
        for name in names {
            if token == name {
                return Some(tokens.get(index + 1).map(String::as_str).filter(|v| !is_flag(v)));
            }
            let inline = if name.starts_with("--") {
                token.strip_prefix(&format!("{}=", name))
            } else {
                token
                    .strip_prefix(name.as_str())
                    .map(|rest| rest.strip_prefix('=').unwrap_or(rest))
            };
            if let Some(value) = inline {
                return Some(Some(value).filter(|v| !v.is_empty()));
            }
        }
    }
    None
}

/// Host portion of a URL-or-host flag value
fn host_of(value: &str) -> &str {
    let rest = value.split_once("://").map_or(value, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    host_port.split(':').next().unwrap_or(host_port)
}

/// An explicit target flag is allowed, but its host must still be in scope;
/// an absent one must be injectable in the required format.
fn check_target_flag(
    ctx: &CommandContext<'_>,
    names: &[String],
    format: TargetFormat,
) -> Result<(), ValidationError> {
    match find_target_flag(&ctx.tokens, names) {
        Some(Some(value)) => {
            let host = host_of(value);
            ctx.policy
                .check(host)
                .map(|_| ())
                .map_err(|_| ValidationError::TargetNotAllowed(value.to_string()))
        }
        Some(None) => Err(ValidationError::TargetShape {
            target: ctx.target.to_string(),
            reason: format!("flag {} was given without a value", names.join("/")),
        }),
        None => format.render(ctx.target, &ctx.target_kind).map(|_| ()),
    }
}

fn inject_target_flag(
    tokens: &mut Vec<String>,
    names: &[String],
    format: TargetFormat,
    target: &str,
    kind: &TargetKind,
) -> Result<(), ValidationError> {
    if find_target_flag(tokens, names).is_some() {
        return Ok(());
    }
    let Some(flag) = names.first() else {
        return Ok(());
    };
    tokens.push(flag.clone());
    tokens.push(format.render(target, kind)?);
    Ok(())
}

/// Declarative contract for one wrapped utility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub command: String,
    pub allowed_flag_prefixes: Option<Vec<String>>,
    /// Used when the caller passes an empty argument string
    pub default_arguments: Option<String>,
    /// Appended when absent from the caller's tokens
    pub required_arguments: Vec<String>,
    pub default_timeout: Duration,
    pub default_concurrency: usize,
    pub breaker: BreakerConfig,
    /// Outcome kinds that count as this utility's failure
    pub counted_failures: Vec<ErrorKind>,
    pub specialization: Specialization,
    pub pre_checks: Vec<PreCheck>,
}

impl ToolSpec {
    fn base(name: &str, command: &str, specialization: Specialization) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            allowed_flag_prefixes: None,
            default_arguments: None,
            required_arguments: Vec::new(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            default_concurrency: DEFAULT_CONCURRENCY,
            breaker: BreakerConfig::default(),
            counted_failures: vec![
                ErrorKind::Timeout,
                ErrorKind::NotFound,
                ErrorKind::ExecutionFailed,
            ],
            specialization,
            pre_checks: Vec::new(),
        }
    }

    /// A tool taking the target as its final argument
    pub fn simple(name: &str, command: &str) -> Self {
        Self::base(
            name,
            command,
            Specialization::Simple {
                target: TargetPlacement::Positional,
            },
        )
    }

    /// A tool whose first positional argument selects a mode
    pub fn multi_mode(name: &str, command: &str, modes: Vec<ModeSpec>) -> Self {
        Self::base(name, command, Specialization::MultiMode { modes })
    }

    pub fn with_target(mut self, placement: TargetPlacement) -> Self {
        if let Specialization::Simple { target } = &mut self.specialization {
            *target = placement;
        }
        self
    }

    pub fn with_allowed_flags(mut self, prefixes: &[&str]) -> Self {
        self.allowed_flag_prefixes = Some(prefixes.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_default_arguments(mut self, arguments: &str) -> Self {
        self.default_arguments = Some(arguments.to_string());
        self
    }

    pub fn with_required_argument(mut self, argument: &str) -> Self {
        self.required_arguments.push(argument.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.default_concurrency = concurrency;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_pre_check(mut self, check: PreCheck) -> Self {
        self.pre_checks.push(check);
        self
    }

    pub fn with_counted_failures(mut self, kinds: &[ErrorKind]) -> Self {
        self.counted_failures = kinds.to_vec();
        self
    }

    /// Whether an outcome of this kind counts against the breaker
    pub fn counts_as_failure(&self, kind: ErrorKind) -> bool {
        self.counted_failures.contains(&kind)
    }

    /// Turn a request into the exact command to run
    pub fn prepare(
        &self,
        request: &InvocationRequest,
        policy: &TargetPolicy,
        max_argument_length: usize,
    ) -> Result<ValidatedCommand, ValidationError> {
        let target_kind = policy.check(&request.target)?;

        let arguments = if request.arguments.trim().is_empty() {
            self.default_arguments.as_deref().unwrap_or("")
        } else {
            request.arguments.as_str()
        };
        let mut tokens = validate_arguments_with_limit(
            arguments,
            self.allowed_flag_prefixes.as_deref(),
            max_argument_length,
        )?;
        for required in &self.required_arguments {
            if !tokens.contains(required) {
                tokens.push(required.clone());
            }
        }
        check_embedded_targets(&tokens, policy)?;

        let ctx = CommandContext {
            command: &self.command,
            target: &request.target,
            target_kind,
            tokens,
            policy,
        };
        for check in &self.pre_checks {
            check.apply(&ctx)?;
        }
        self.specialization.validate_extra(&ctx)?;
        self.specialization.build_command(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::validator::DEFAULT_MAX_ARGUMENT_LENGTH;

    fn tokens(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(|s| s.to_string()).collect()
    }

    fn gobuster() -> ToolSpec {
        ToolSpec::multi_mode(
            "gobuster",
            "gobuster",
            vec![
                ModeSpec::new("dir", &["-u", "--url"], TargetFormat::HttpUrl),
                ModeSpec::new("dns", &["-d", "--domain"], TargetFormat::Domain),
            ],
        )
        .with_allowed_flags(&["-w", "-u", "--url", "-d", "--domain", "-t", "-q", "-k"])
    }

    fn prepare(spec: &ToolSpec, target: &str, args: &str) -> Result<ValidatedCommand, ValidationError> {
        spec.prepare(
            &InvocationRequest::new(target, args),
            &TargetPolicy::default(),
            DEFAULT_MAX_ARGUMENT_LENGTH,
        )
    }

    fn modes() -> Vec<ModeSpec> {
        vec![
            ModeSpec::new("dir", &["-u"], TargetFormat::HttpUrl),
            ModeSpec::new("dns", &["-d"], TargetFormat::Domain),
        ]
    }

    #[test]
    fn test_resolve_mode_skips_flag_values() {
        let modes = modes();
        let (index, mode) =
            resolve_mode(&tokens("-w list.txt dir -u http://target/"), &modes).unwrap();
        assert_eq!(index, 2);
        assert_eq!(mode.name, "dir");
    }

    #[test]
    fn test_resolve_mode_after_boolean_flag() {
        let modes = modes();
        let (_, mode) = resolve_mode(&tokens("-q dns"), &modes).unwrap();
        assert_eq!(mode.name, "dns");
    }

    #[test]
    fn test_resolve_mode_rejects_unknown_mode() {
        let modes = modes();
        let err = resolve_mode(&tokens("fuzz -u x"), &modes).unwrap_err();
        assert_eq!(err, ValidationError::ModeNotAllowed("fuzz".to_string()));
        assert_eq!(err.kind(), ErrorKind::ModeNotAllowed);
    }

    #[test]
    fn test_resolve_mode_rejects_second_mode() {
        let modes = modes();
        let err = resolve_mode(&tokens("dir -w dns"), &modes).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateMode { .. }));
        assert_eq!(err.kind(), ErrorKind::ModeNotAllowed);
    }

    #[test]
    fn test_resolve_mode_requires_a_mode() {
        let modes = modes();
        let err = resolve_mode(&tokens("-w list.txt"), &modes).unwrap_err();
        assert!(matches!(err, ValidationError::MissingMode(_)));
        assert_eq!(err.kind(), ErrorKind::ModeNotAllowed);
    }

    #[test]
    fn test_multi_mode_keeps_explicit_target_flag() {
        let command = prepare(
            &gobuster(),
            "10.0.0.5",
            "-w list.txt dir -u http://web.lab.internal/",
        )
        .unwrap();
        assert_eq!(command.program(), "gobuster");
        assert_eq!(
            command.args(),
            &["dir", "-w", "list.txt", "-u", "http://web.lab.internal/"]
        );
    }

    #[test]
    fn test_multi_mode_injects_domain_flag() {
        let command = prepare(&gobuster(), "host.lab.internal", "dns").unwrap();
        assert_eq!(command.args(), &["dns", "-d", "host.lab.internal"]);
    }

    #[test]
    fn test_multi_mode_injects_url_flag() {
        let command = prepare(&gobuster(), "10.0.0.8", "dir -w list.txt").unwrap();
        assert_eq!(
            command.args(),
            &["dir", "-w", "list.txt", "-u", "http://10.0.0.8/"]
        );
    }

    #[test]
    fn test_multi_mode_rejects_wrong_target_shape() {
        let err = prepare(&gobuster(), "10.0.0.8", "dns").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);

        let err = prepare(&gobuster(), "10.0.0.0/24", "dir").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn test_explicit_target_flag_must_stay_in_scope() {
        let err = prepare(&gobuster(), "10.0.0.5", "dir -u http://example.com/").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);

        let err = prepare(&gobuster(), "10.0.0.5", "dir --url=http://8.8.8.8:8080/x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);

        let ok = prepare(&gobuster(), "10.0.0.5", "dir --url=http://user@10.0.0.9:8080/x");
        assert!(ok.is_ok());
    }

    #[test]
    fn test_explicit_target_flag_without_value() {
        let err = prepare(&gobuster(), "10.0.0.5", "dir -u").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn test_simple_positional_appends_target() {
        let nmap = ToolSpec::simple("nmap", "nmap").with_allowed_flags(&["-sV", "-p"]);
        let command = prepare(&nmap, "192.168.1.0/24", "-sV -p 22,80").unwrap();
        assert_eq!(command.args(), &["-sV", "-p", "22,80", "192.168.1.0/24"]);
    }

    #[test]
    fn test_default_and_required_arguments() {
        let sqlmap = ToolSpec::simple("sqlmap", "sqlmap")
            .with_target(TargetPlacement::Flag {
                names: vec!["-u".to_string(), "--url".to_string()],
                format: TargetFormat::HttpUrl,
            })
            .with_allowed_flags(&["-u", "--url", "--batch", "--level"])
            .with_default_arguments("--level=1")
            .with_required_argument("--batch");

        let command = prepare(&sqlmap, "10.0.0.7", "").unwrap();
        assert_eq!(command.args(), &["--level=1", "--batch", "-u", "http://10.0.0.7/"]);

        let command = prepare(&sqlmap, "10.0.0.7", "--batch --level=2").unwrap();
        assert_eq!(command.args(), &["--batch", "--level=2", "-u", "http://10.0.0.7/"]);
    }

    #[test]
    fn test_service_uri_placement() {
        let hydra = ToolSpec::simple("hydra", "hydra")
            .with_target(TargetPlacement::ServiceUri {
                services: vec!["ssh".to_string(), "ftp".to_string()],
            })
            .with_allowed_flags(&["-l", "-P"]);

        let command = prepare(&hydra, "10.0.0.3", "-l admin -P pass.txt ssh").unwrap();
        assert_eq!(command.args(), &["-l", "admin", "-P", "pass.txt", "ssh://10.0.0.3"]);

        let err = prepare(&hydra, "10.0.0.3", "-l admin").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModeNotAllowed);

        let err = prepare(&hydra, "10.0.0.3", "ssh ftp").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModeNotAllowed);
    }

    #[test]
    fn test_address_range_pre_check() {
        let masscan = ToolSpec::simple("masscan", "masscan")
            .with_pre_check(PreCheck::AddressRange { min_prefix: 16 });

        assert!(prepare(&masscan, "10.1.0.0/16", "").is_ok());
        assert!(prepare(&masscan, "10.1.2.3", "").is_ok());

        let err = prepare(&masscan, "10.0.0.0/8", "").unwrap_err();
        assert_eq!(err, ValidationError::RangeTooLarge { prefix: 8, min_prefix: 16 });
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);

        let err = prepare(&masscan, "db.lab.internal", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn test_address_range_applies_to_operands() {
        let masscan = ToolSpec::simple("masscan", "masscan")
            .with_pre_check(PreCheck::AddressRange { min_prefix: 16 });

        assert!(prepare(&masscan, "10.1.0.0/16", "10.2.3.0/24").is_ok());
        let err = prepare(&masscan, "10.1.0.0/16", "172.16.0.0/12").unwrap_err();
        assert_eq!(err, ValidationError::RangeTooLarge { prefix: 12, min_prefix: 16 });
    }

    #[test]
    fn test_operands_are_targets_pre_check() {
        let scanner = ToolSpec::simple("scanner", "scanner")
            .with_allowed_flags(&["-p", "-v"])
            .with_pre_check(PreCheck::OperandsAreTargets {
                value_flags: vec!["-p".to_string()],
                keywords: vec!["fast".to_string()],
            });

        assert!(prepare(&scanner, "10.0.0.1", "-p 22 fast").is_ok());
        assert!(prepare(&scanner, "10.0.0.1", "-v db.lab.internal").is_ok());

        let err = prepare(&scanner, "10.0.0.1", "-v example.org").unwrap_err();
        assert_eq!(err, ValidationError::TargetNotAllowed("example.org".to_string()));
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn test_embedded_addresses_are_checked_for_every_tool() {
        let plain = ToolSpec::simple("plain", "plain");

        assert!(prepare(&plain, "10.0.0.1", "words.txt 10.0.0.2:8080").is_ok());
        for arguments in [
            "8.8.8.8",
            "--resolver=1.1.1.1",
            "0.0.0.0/0",
            "8.8.8.8:53",
            "https://example.com/login",
            "192.168.1.1-254",
        ] {
            let err = prepare(&plain, "10.0.0.1", arguments).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTarget, "{}", arguments);
        }
    }

    #[test]
    fn test_operands_skip_flag_values() {
        let tokens = tokens("-p 22 -v 10.0.0.2 --rate=5 x");
        let value_flags = vec!["-p".to_string()];
        let found: Vec<&str> = operands(&tokens, &value_flags).collect();
        assert_eq!(found, vec!["10.0.0.2", "x"]);
    }

    #[test]
    fn test_require_flag_pre_check() {
        let masscan = ToolSpec::simple("masscan", "masscan")
            .with_allowed_flags(&["-p", "--ports", "--rate"])
            .with_pre_check(PreCheck::RequireFlag {
                prefixes: vec!["-p".to_string(), "--ports".to_string()],
            });

        assert!(prepare(&masscan, "10.1.2.3", "-p80").is_ok());
        assert!(prepare(&masscan, "10.1.2.3", "--ports=1-100").is_ok());
        let err = prepare(&masscan, "10.1.2.3", "--rate 100").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FlagNotAllowed);
    }

    #[test]
    fn test_generic_validation_runs_first() {
        let err = prepare(&gobuster(), "8.8.8.8", "dir").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);

        let err = prepare(&gobuster(), "10.0.0.1", "dir -x php").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FlagNotAllowed);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("http://a.lab.internal/x"), "a.lab.internal");
        assert_eq!(host_of("https://u:p@10.0.0.1:8443/?q"), "10.0.0.1");
        assert_eq!(host_of("10.0.0.2"), "10.0.0.2");
        assert_eq!(host_of("db.lab.internal:5432"), "db.lab.internal");
    }

    #[test]
    fn test_allowed_modes() {
        assert_eq!(
            gobuster().specialization.allowed_modes(),
            Some(vec!["dir".to_string(), "dns".to_string()])
        );
        assert_eq!(ToolSpec::simple("nmap", "nmap").specialization.allowed_modes(), None);
    }
}
