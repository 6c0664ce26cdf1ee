//! Tests for daemon, cancel, status, inspect and generator subcommands.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

#[test]
fn cli_parse_daemon() {
    assert!(matches!(parse(&["tvrec", "daemon"]), CliCommand::Daemon));
}

#[test]
fn cli_parse_cancel() {
    match parse(&["tvrec", "cancel", "1700000000000"]) {
        CliCommand::Cancel { id, requester } => {
            assert_eq!(id, "1700000000000");
            assert_eq!(requester, 0);
        }
        _ => panic!("expected Cancel"),
    }
    match parse(&["tvrec", "cancel", "42", "--requester", "9"]) {
        CliCommand::Cancel { requester, .. } => assert_eq!(requester, 9),
        _ => panic!("expected Cancel with --requester"),
    }
}

#[test]
fn cli_parse_status() {
    assert!(matches!(parse(&["tvrec", "status"]), CliCommand::Status));
}

#[test]
fn cli_parse_inspect() {
    match parse(&["tvrec", "inspect", "/tmp/a.mkv"]) {
        CliCommand::Inspect { path } => assert_eq!(path, std::path::PathBuf::from("/tmp/a.mkv")),
        _ => panic!("expected Inspect"),
    }
}

#[test]
fn cli_parse_completions() {
    match parse(&["tvrec", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        _ => panic!("expected Completions"),
    }
    assert!(Cli::try_parse_from(["tvrec", "completions", "cmd"]).is_err());
}

#[test]
fn cli_parse_manpage() {
    assert!(matches!(parse(&["tvrec", "manpage"]), CliCommand::Manpage));
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["tvrec", "pause", "1"]).is_err());
}
