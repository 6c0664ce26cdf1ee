//! Tests for the record and schedule subcommands.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use tvrec_core::job::{ChatId, OwnerId};

#[test]
fn cli_parse_record_defaults() {
    match parse(&["tvrec", "record", "https://tv.example/live.m3u8"]) {
        CliCommand::Record { stream, job } => {
            assert_eq!(stream, "https://tv.example/live.m3u8");
            assert_eq!(job.duration, 0);
            assert!(job.split.is_none());
            assert_eq!(job.title, "Untitled");
            assert_eq!(job.channel, "Direct Stream");
            assert!(!job.daemon);
        }
        _ => panic!("expected Record"),
    }
}

#[test]
fn cli_parse_record_with_options() {
    match parse(&[
        "tvrec",
        "record",
        "https://tv.example/live.m3u8",
        "--duration",
        "01:30:00",
        "--split",
        "30:00",
        "--title",
        "Final",
        "--channel",
        "Sports",
        "--owner",
        "5",
        "--chat",
        "-100",
        "--id",
        "job-1",
    ]) {
        CliCommand::Record { stream, job } => {
            assert_eq!(job.duration, 5400);
            assert_eq!(job.split, Some(1800));
            let spec = job.to_spec(&stream);
            assert_eq!(spec.id.as_str(), "job-1");
            assert_eq!(spec.owner, OwnerId(5));
            assert_eq!(spec.chat, ChatId(-100));
            assert_eq!(spec.title, "Final");
            assert_eq!(spec.segment_secs, Some(1800));
            assert!(spec.validate().is_ok());
        }
        _ => panic!("expected Record"),
    }
}

#[test]
fn cli_parse_record_short_duration_flag() {
    match parse(&["tvrec", "record", "u", "-d", "90", "--daemon"]) {
        CliCommand::Record { job, .. } => {
            assert_eq!(job.duration, 90);
            assert!(job.daemon);
        }
        _ => panic!("expected Record"),
    }
}

#[test]
fn cli_rejects_bad_duration() {
    assert!(Cli::try_parse_from(["tvrec", "record", "u", "--duration", "1:75"]).is_err());
    assert!(Cli::try_parse_from(["tvrec", "record", "u", "--split", "soon"]).is_err());
}

#[test]
fn generated_id_when_missing() {
    match parse(&["tvrec", "record", "u"]) {
        CliCommand::Record { stream, job } => {
            let spec = job.to_spec(&stream);
            assert!(spec.id.as_str().parse::<i64>().is_ok());
        }
        _ => panic!("expected Record"),
    }
}

#[test]
fn cli_parse_schedule() {
    match parse(&[
        "tvrec",
        "schedule",
        "https://tv.example/live.m3u8",
        "24-12-2030",
        "21:30:00",
        "--duration",
        "600",
    ]) {
        CliCommand::Schedule {
            stream,
            date,
            time,
            job,
        } => {
            assert_eq!(stream, "https://tv.example/live.m3u8");
            assert_eq!(date, "24-12-2030");
            assert_eq!(time, "21:30:00");
            assert_eq!(job.duration, 600);
        }
        _ => panic!("expected Schedule"),
    }
}

#[test]
fn cli_schedule_needs_date_and_time() {
    assert!(Cli::try_parse_from(["tvrec", "schedule", "u", "24-12-2030"]).is_err());
}
