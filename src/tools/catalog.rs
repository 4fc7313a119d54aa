//! Built-in tool catalog
//!
//! Contracts for the scanners shipped with the gateway. Flag allowlists are
//! deliberately narrow: options that read target lists from files, write
//! output files, or open interactive shells are left out.

use super::spec::{ModeSpec, PreCheck, TargetFormat, TargetPlacement, ToolSpec};
use std::time::Duration;

/// Port scanner, one scan at a time
pub fn nmap() -> ToolSpec {
    ToolSpec::simple("nmap", "nmap")
        .with_allowed_flags(&[
            "-sS",
            "-sT",
            "-sU",
            "-sV",
            "-sC",
            "-sn",
            "-Pn",
            "-p",
            "-T",
            "-O",
            "-A",
            "-F",
            "-n",
            "-v",
            "--top-ports",
            "--open",
            "--reason",
            "--version-intensity",
            "--max-retries",
            "--host-timeout",
        ])
        .with_default_arguments("-sV -T4 --top-ports 1000")
        .with_timeout(Duration::from_secs(600))
        .with_concurrency(1)
        .with_pre_check(PreCheck::OperandsAreTargets {
            value_flags: strings(&[
                "-p",
                "-T",
                "--top-ports",
                "--version-intensity",
                "--max-retries",
                "--host-timeout",
            ]),
            keywords: Vec::new(),
        })
}

/// Asynchronous port scanner; ranges capped at /16 and ports required
pub fn masscan() -> ToolSpec {
    ToolSpec::simple("masscan", "masscan")
        .with_allowed_flags(&[
            "-p",
            "--ports",
            "--rate",
            "--banners",
            "--wait",
            "--retries",
            "--open-only",
        ])
        .with_concurrency(1)
        .with_pre_check(PreCheck::OperandsAreTargets {
            value_flags: strings(&["-p", "--ports", "--rate", "--wait", "--retries"]),
            keywords: Vec::new(),
        })
        .with_pre_check(PreCheck::AddressRange { min_prefix: 16 })
        .with_pre_check(PreCheck::RequireFlag {
            prefixes: vec!["-p".to_string(), "--ports".to_string()],
        })
}

/// Web content brute-forcer with dir/vhost/fuzz/dns modes
pub fn gobuster() -> ToolSpec {
    let url_flags = ["-u", "--url"];
    ToolSpec::multi_mode(
        "gobuster",
        "gobuster",
        vec![
            ModeSpec::new("dir", &url_flags, TargetFormat::HttpUrl),
            ModeSpec::new("vhost", &url_flags, TargetFormat::HttpUrl),
            ModeSpec::new("fuzz", &url_flags, TargetFormat::HttpUrl),
            ModeSpec::new("dns", &["-d", "--domain"], TargetFormat::Domain),
        ],
    )
    .with_allowed_flags(&[
        "-u",
        "--url",
        "-d",
        "--domain",
        "-w",
        "--wordlist",
        "-t",
        "--threads",
        "-x",
        "--extensions",
        "-s",
        "--status-codes",
        "-b",
        "--status-codes-blacklist",
        "-k",
        "--no-tls-validation",
        "-q",
        "--quiet",
        "-r",
        "--follow-redirect",
        "-a",
        "--useragent",
        "-z",
        "--no-progress",
        "--timeout",
        "--delay",
        "--exclude-length",
        "--append-domain",
    ])
}

/// Credential tester; the service token becomes `service://target`
pub fn hydra() -> ToolSpec {
    let services = [
        "ssh",
        "ftp",
        "telnet",
        "smb",
        "rdp",
        "mysql",
        "postgres",
        "http-get",
        "http-post-form",
    ];
    ToolSpec::simple("hydra", "hydra")
        .with_target(TargetPlacement::ServiceUri {
            services: strings(&services),
        })
        .with_allowed_flags(&[
            "-l", "-L", "-p", "-P", "-e", "-s", "-t", "-T", "-w", "-W", "-f", "-F", "-I", "-u",
            "-v", "-V",
        ])
        .with_pre_check(PreCheck::OperandsAreTargets {
            value_flags: strings(&["-l", "-L", "-p", "-P", "-e", "-s", "-t", "-T", "-w", "-W"]),
            keywords: strings(&services),
        })
}

/// SQL injection tester, always non-interactive
pub fn sqlmap() -> ToolSpec {
    ToolSpec::simple("sqlmap", "sqlmap")
        .with_target(TargetPlacement::Flag {
            names: vec!["-u".to_string(), "--url".to_string()],
            format: TargetFormat::HttpUrl,
        })
        .with_allowed_flags(&[
            "-u",
            "--url",
            "-p",
            "--batch",
            "--level",
            "--risk",
            "--technique",
            "--threads",
            "--dbms",
            "--dbs",
            "--tables",
            "--banner",
            "--current-db",
            "--current-user",
            "--forms",
            "--crawl",
            "--random-agent",
            "--timeout",
            "--retries",
        ])
        .with_required_argument("--batch")
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Every built-in tool, in a stable order
pub fn builtin() -> Vec<ToolSpec> {
    vec![nmap(), masscan(), gobuster(), hydra(), sqlmap()]
}
